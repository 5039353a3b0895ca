//! Newline-delimited JSON codecs for worker communication.
//!
//! Uses LinesCodec for framing + serde_json for serialization.
//! Works over any AsyncRead/AsyncWrite (child pipes, duplex streams in tests).
//!
//! Decoding never fails on content: a line that does not parse becomes a
//! `Malformed`/`Invalid` item so one bad line cannot end the stream.

use std::io;

use serde::Serialize;
use tokio_util::bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use super::protocol::{READY_SENTINEL, RequestLine, ScoreRequest, ScoreResponse, WorkerOutput};

/// Longest line either side will buffer before discarding it.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Cap on how much of a bad line is kept for logging.
const MALFORMED_PREVIEW_CHARS: usize = 200;

fn encode_json_line<T: Serialize>(
    item: &T,
    max_length: usize,
    dst: &mut BytesMut,
) -> Result<(), io::Error> {
    let json =
        serde_json::to_vec(item).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    tracing::trace!(json_size_bytes = json.len(), "Encoding line");
    if json.len() > max_length {
        return Err(line_too_long(json.len(), max_length));
    }
    dst.reserve(json.len() + 1);
    dst.put_slice(&json);
    dst.put_u8(b'\n');
    Ok(())
}

fn line_too_long(len: usize, max_length: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("line of {len} bytes exceeds the {max_length} byte limit"),
    )
}

struct ByteCount(usize);

impl io::Write for ByteCount {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Encoded size of `item` as one line, newline excluded. Fails when the
/// reading side would discard the line as over-long.
pub fn check_line_length<T: Serialize>(item: &T, max_length: usize) -> Result<usize, io::Error> {
    let mut count = ByteCount(0);
    serde_json::to_writer(&mut count, item)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if count.0 > max_length {
        return Err(line_too_long(count.0, max_length));
    }
    Ok(count.0)
}

fn preview(line: &str) -> String {
    if line.chars().count() <= MALFORMED_PREVIEW_CHARS {
        line.to_string()
    } else {
        let mut cut: String = line.chars().take(MALFORMED_PREVIEW_CHARS).collect();
        cut.push_str("...");
        cut
    }
}

/// Pull the next non-blank line out of `src`, mapping framing failures to a
/// description instead of an error.
fn next_line(
    inner: &mut LinesCodec,
    src: &mut BytesMut,
    eof: bool,
) -> Option<Result<String, String>> {
    loop {
        let decoded = if eof {
            inner.decode_eof(src)
        } else {
            inner.decode(src)
        };
        match decoded {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => return Some(Ok(line)),
            Ok(None) => return None,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                return Some(Err(format!(
                    "line exceeds maximum length of {} bytes",
                    inner.max_length()
                )));
            }
            // LinesCodec only reports Io for undecodable UTF-8; reads happen
            // outside the codec.
            Err(LinesCodecError::Io(e)) => return Some(Err(e.to_string())),
        }
    }
}

/// Codec for worker stdout: sentinel and response lines.
#[derive(Debug)]
pub struct WorkerOutputCodec {
    inner: LinesCodec,
}

impl Default for WorkerOutputCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerOutputCodec {
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(max_length),
        }
    }

    fn classify(line: Result<String, String>) -> WorkerOutput {
        let line = match line {
            Ok(line) => line,
            Err(reason) => {
                return WorkerOutput::Malformed {
                    line: String::new(),
                    reason,
                };
            }
        };
        let trimmed = line.trim();
        if trimmed == READY_SENTINEL {
            return WorkerOutput::Ready;
        }
        match serde_json::from_str::<ScoreResponse>(trimmed) {
            Ok(response) => WorkerOutput::Response(response),
            Err(e) => WorkerOutput::Malformed {
                line: preview(trimmed),
                reason: e.to_string(),
            },
        }
    }
}

impl Decoder for WorkerOutputCodec {
    type Item = WorkerOutput;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(next_line(&mut self.inner, src, false).map(Self::classify))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(next_line(&mut self.inner, src, true).map(Self::classify))
    }
}

impl Encoder<WorkerOutput> for WorkerOutputCodec {
    type Error = io::Error;

    fn encode(&mut self, item: WorkerOutput, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            WorkerOutput::Ready => {
                dst.reserve(READY_SENTINEL.len() + 1);
                dst.put_slice(READY_SENTINEL.as_bytes());
                dst.put_u8(b'\n');
                Ok(())
            }
            WorkerOutput::Response(response) => encode_json_line(&response, usize::MAX, dst),
            WorkerOutput::Malformed { line, .. } => {
                dst.reserve(line.len() + 1);
                dst.put_slice(line.as_bytes());
                dst.put_u8(b'\n');
                Ok(())
            }
        }
    }
}

/// Codec for worker stdin: score requests.
#[derive(Debug)]
pub struct RequestLineCodec {
    inner: LinesCodec,
    max_length: usize,
}

impl Default for RequestLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestLineCodec {
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(max_length),
            max_length,
        }
    }

    fn classify(line: Result<String, String>) -> RequestLine {
        let line = match line {
            Ok(line) => line,
            Err(reason) => return RequestLine::Invalid { id: None, reason },
        };
        let value = match serde_json::from_str::<serde_json::Value>(line.trim()) {
            Ok(value) => value,
            Err(e) => {
                return RequestLine::Invalid {
                    id: None,
                    reason: format!("Invalid JSON request: {}", e),
                };
            }
        };
        let id = value.get("id").and_then(serde_json::Value::as_u64);
        match serde_json::from_value::<ScoreRequest>(value) {
            Ok(request) => RequestLine::Request(request),
            Err(e) => RequestLine::Invalid {
                id,
                reason: format!("Invalid score request: {}", e),
            },
        }
    }
}

impl Decoder for RequestLineCodec {
    type Item = RequestLine;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(next_line(&mut self.inner, src, false).map(Self::classify))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(next_line(&mut self.inner, src, true).map(Self::classify))
    }
}

impl Encoder<ScoreRequest> for RequestLineCodec {
    type Error = io::Error;

    fn encode(&mut self, item: ScoreRequest, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_json_line(&item, self.max_length, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::protocol::ScoreResult;
    use crate::lesson::LessonPlan;

    fn drain(codec: &mut WorkerOutputCodec, buf: &mut BytesMut) -> Vec<WorkerOutput> {
        let mut out = Vec::new();
        while let Some(item) = codec.decode(buf).unwrap() {
            out.push(item);
        }
        out
    }

    #[test]
    fn ready_sentinel_decodes() {
        let mut codec = WorkerOutputCodec::new();
        let mut buf = BytesMut::from("READY\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(WorkerOutput::Ready));
    }

    #[test]
    fn coalesced_chunk_yields_every_line() {
        let mut codec = WorkerOutputCodec::new();
        let mut buf = BytesMut::from(
            "READY\n{\"id\":1,\"result\":{\"score\":6.0}}\n{\"id\":2,\"error\":\"nope\"}\n",
        );
        let items = drain(&mut codec, &mut buf);
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], WorkerOutput::Ready);
        match &items[1] {
            WorkerOutput::Response(r) => assert_eq!(r.id, Some(1)),
            other => panic!("unexpected {:?}", other),
        }
        match &items[2] {
            WorkerOutput::Response(r) => assert_eq!(r.error.as_deref(), Some("nope")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn partial_line_waits_for_newline() {
        let mut codec = WorkerOutputCodec::new();
        let mut buf = BytesMut::from("{\"id\":5,\"res");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"ult\":{\"score\":4.5}}\r\n");
        match codec.decode(&mut buf).unwrap() {
            Some(WorkerOutput::Response(r)) => {
                assert_eq!(r.id, Some(5));
                assert_eq!(r.into_outcome().unwrap().score, 4.5);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn malformed_line_does_not_poison_stream() {
        let mut codec = WorkerOutputCodec::new();
        let mut buf = BytesMut::from("not json {\n\n{\"id\":9,\"result\":{\"score\":3.0}}\n");
        let items = drain(&mut codec, &mut buf);
        assert_eq!(items.len(), 2);
        assert!(matches!(&items[0], WorkerOutput::Malformed { line, .. } if line == "not json {"));
        assert!(matches!(&items[1], WorkerOutput::Response(r) if r.id == Some(9)));
    }

    #[test]
    fn overlong_line_is_reported_then_skipped() {
        let mut codec = WorkerOutputCodec::with_max_length(16);
        let mut buf = BytesMut::from("xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx\nREADY\n");
        let items = drain(&mut codec, &mut buf);
        assert!(matches!(&items[0], WorkerOutput::Malformed { reason, .. } if reason.contains("maximum length")));
        assert_eq!(items.last(), Some(&WorkerOutput::Ready));
    }

    #[test]
    fn invalid_utf8_is_malformed() {
        let mut codec = WorkerOutputCodec::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0xff, 0xfe, b'\n']);
        buf.extend_from_slice(b"READY\n");
        let items = drain(&mut codec, &mut buf);
        assert!(matches!(items[0], WorkerOutput::Malformed { .. }));
        assert_eq!(items[1], WorkerOutput::Ready);
    }

    #[test]
    fn trailing_line_without_newline_decodes_at_eof() {
        let mut codec = WorkerOutputCodec::new();
        let mut buf = BytesMut::from("{\"id\":3,\"error\":\"late\"}");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        match codec.decode_eof(&mut buf).unwrap() {
            Some(WorkerOutput::Response(r)) => assert_eq!(r.id, Some(3)),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }

    #[test]
    fn worker_output_encodes_one_line_each() {
        let mut codec = WorkerOutputCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(WorkerOutput::Ready, &mut buf).unwrap();
        codec
            .encode(
                WorkerOutput::Response(ScoreResponse::failure(Some(1), "x")),
                &mut buf,
            )
            .unwrap();
        assert_eq!(&buf[..], b"READY\n{\"id\":1,\"error\":\"x\"}\n");
    }

    #[test]
    fn request_encodes_as_single_line() {
        let mut codec = RequestLineCodec::new();
        let mut buf = BytesMut::new();
        let mut plan = LessonPlan::new("Line\nbreaks", "Art");
        plan.objectives.push("draw\nthings".to_string());
        codec
            .encode(
                ScoreRequest {
                    id: 1,
                    lesson_plan: plan.clone(),
                },
                &mut buf,
            )
            .unwrap();

        assert_eq!(buf.iter().filter(|b| **b == b'\n').count(), 1);
        match codec.decode(&mut buf).unwrap() {
            Some(RequestLine::Request(req)) => {
                assert_eq!(req.id, 1);
                assert_eq!(req.lesson_plan, plan);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn request_over_limit_is_refused() {
        let request = ScoreRequest {
            id: 3,
            lesson_plan: LessonPlan::new("a fairly long title", "History"),
        };
        let len = check_line_length(&request, usize::MAX).unwrap();
        assert_eq!(len, serde_json::to_vec(&request).unwrap().len());

        let err = check_line_length(&request, len - 1).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        let mut codec = RequestLineCodec::with_max_length(len - 1);
        let mut buf = BytesMut::new();
        assert!(codec.encode(request.clone(), &mut buf).is_err());
        assert!(buf.is_empty());

        let mut codec = RequestLineCodec::with_max_length(len);
        codec.encode(request, &mut buf).unwrap();
        assert_eq!(buf.len(), len + 1);
    }

    #[test]
    fn request_with_bad_payload_keeps_its_id() {
        let mut codec = RequestLineCodec::new();
        let mut buf = BytesMut::from("{\"id\":12,\"lesson_plan\":\"oops\"}\n");
        match codec.decode(&mut buf).unwrap() {
            Some(RequestLine::Invalid { id, .. }) => assert_eq!(id, Some(12)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn request_that_is_not_json_has_no_id() {
        let mut codec = RequestLineCodec::new();
        let mut buf = BytesMut::from("hello\n");
        match codec.decode(&mut buf).unwrap() {
            Some(RequestLine::Invalid { id, reason }) => {
                assert_eq!(id, None);
                assert!(reason.starts_with("Invalid JSON request"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn result_roundtrips_through_output_codec() {
        let mut codec = WorkerOutputCodec::new();
        let mut buf = BytesMut::new();
        let result = ScoreResult {
            score: 8.2,
            features: Default::default(),
            reasoning: vec!["ok".to_string()],
        };
        codec
            .encode(
                WorkerOutput::Response(ScoreResponse::success(4, result.clone())),
                &mut buf,
            )
            .unwrap();
        match codec.decode(&mut buf).unwrap() {
            Some(WorkerOutput::Response(r)) => assert_eq!(r.into_outcome(), Ok(result)),
            other => panic!("unexpected {:?}", other),
        }
    }
}
