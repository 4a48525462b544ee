//! Response body decoding: single JSON documents and NDJSON streams.
//!
//! The server frames streaming bodies as one JSON object per line and ends
//! the stream by closing the connection. Records are decoded lazily as the
//! body arrives; nothing buffers the whole body.
//!
//! A line that is not valid JSON is a protocol violation: the stream yields
//! one `Streaming` error and then ends. Records yielded before it stay valid.
//! Dropping a [`RecordStream`] or [`RecordIter`] drops the underlying
//! response, which releases the connection however enumeration ended.

use std::io::{BufRead, BufReader, Read};
use std::iter::FusedIterator;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde_json::Value;

use super::error::{ErrorKind, OllamaError, Result};

/// Longest line excerpt quoted in a decode error.
const MAX_LINE_PREVIEW: usize = 120;

/// Decode one NDJSON line. Blank lines yield `None`.
pub(crate) fn decode_line(line: &[u8]) -> Option<Result<Value>> {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return None;
    }

    Some(serde_json::from_slice(trimmed).map_err(|e| {
        let text = String::from_utf8_lossy(trimmed);
        let preview: String = text.chars().take(MAX_LINE_PREVIEW).collect();
        OllamaError::new(
            ErrorKind::Streaming,
            format!("malformed NDJSON line {preview:?}: {e}"),
        )
        .with_source(e)
    }))
}

/// Accumulates body chunks and hands out complete lines.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub(crate) fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete line, without its `\n`.
    pub(crate) fn next_line(&mut self) -> Option<Vec<u8>> {
        let end = self.buf.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=end).collect();
        line.pop();
        Some(line)
    }

    /// Trailing bytes after the last `\n`, once the body has ended.
    pub(crate) fn take_rest(&mut self) -> Option<Vec<u8>> {
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }
}

/// Map a body read failure to the error surfaced by the stream.
pub(crate) fn body_read_error(err: reqwest::Error) -> OllamaError {
    if err.is_timeout() {
        OllamaError::new(ErrorKind::Timeout, format!("stream stalled: {err}")).with_source(err)
    } else {
        OllamaError::new(
            ErrorKind::Streaming,
            format!("stream terminated prematurely: {err}"),
        )
        .with_source(err)
    }
}

fn io_read_error(err: std::io::Error) -> OllamaError {
    let timed_out = matches!(
        err.kind(),
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
    ) || err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<reqwest::Error>())
        .is_some_and(reqwest::Error::is_timeout);

    if timed_out {
        OllamaError::new(ErrorKind::Timeout, format!("stream stalled: {err}")).with_source(err)
    } else {
        OllamaError::new(
            ErrorKind::Streaming,
            format!("stream terminated prematurely: {err}"),
        )
        .with_source(err)
    }
}

/// Decode a single-shot response body. An empty body is `Value::Null`.
pub(crate) fn parse_json_body(body: &str) -> Result<Value> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|e| {
        OllamaError::new(ErrorKind::Parse, format!("response body is not valid JSON: {e}"))
            .with_source(e)
    })
}

struct DecoderState<S> {
    body: Pin<Box<S>>,
    lines: LineBuffer,
    finished: bool,
}

/// Lazy sequence of records decoded from a streaming response.
///
/// Finite, ordered by arrival, single-consumer, not restartable.
pub struct RecordStream {
    inner: BoxStream<'static, Result<Value>>,
}

impl RecordStream {
    pub(crate) fn from_response(response: reqwest::Response) -> Self {
        Self::from_chunks(response.bytes_stream().map(|chunk| chunk.map_err(body_read_error)))
    }

    /// Decode a stream of raw body chunks. Chunk boundaries need not align
    /// with line boundaries.
    pub fn from_chunks<S, B>(body: S) -> Self
    where
        S: Stream<Item = Result<B>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
    {
        let state = DecoderState {
            body: Box::pin(body),
            lines: LineBuffer::default(),
            finished: false,
        };

        let inner = stream::unfold(state, |mut state| async move {
            loop {
                if state.finished {
                    return None;
                }

                if let Some(line) = state.lines.next_line() {
                    match decode_line(&line) {
                        None => continue,
                        Some(Ok(record)) => return Some((Ok(record), state)),
                        Some(Err(e)) => {
                            state.finished = true;
                            return Some((Err(e), state));
                        }
                    }
                }

                match state.body.next().await {
                    Some(Ok(chunk)) => state.lines.push(chunk.as_ref()),
                    Some(Err(e)) => {
                        state.finished = true;
                        return Some((Err(e), state));
                    }
                    None => {
                        state.finished = true;
                        let rest = state.lines.take_rest();
                        if let Some(item) = rest.as_deref().and_then(decode_line) {
                            return Some((item, state));
                        }
                        return None;
                    }
                }
            }
        });

        Self {
            inner: inner.boxed(),
        }
    }

    /// Drain the stream, stopping at the first error.
    pub async fn collect_records(mut self) -> Result<Vec<Value>> {
        let mut records = Vec::new();
        while let Some(record) = self.inner.next().await {
            records.push(record?);
        }
        Ok(records)
    }
}

impl Stream for RecordStream {
    type Item = Result<Value>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for RecordStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStream").finish_non_exhaustive()
    }
}

/// Blocking counterpart of [`RecordStream`].
pub struct RecordIter {
    reader: BufReader<Box<dyn Read + Send>>,
    line: Vec<u8>,
    finished: bool,
}

impl RecordIter {
    pub(crate) fn from_response(response: reqwest::blocking::Response) -> Self {
        Self::from_reader(response)
    }

    /// Decode records from any byte reader.
    pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
        Self {
            reader: BufReader::new(Box::new(reader)),
            line: Vec::new(),
            finished: false,
        }
    }

    /// Drain the iterator, stopping at the first error.
    pub fn collect_records(self) -> Result<Vec<Value>> {
        self.collect()
    }
}

impl Iterator for RecordIter {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            self.line.clear();
            match self.reader.read_until(b'\n', &mut self.line) {
                Ok(0) => self.finished = true,
                Ok(_) => match decode_line(&self.line) {
                    None => continue,
                    Some(Ok(record)) => return Some(Ok(record)),
                    Some(Err(e)) => {
                        self.finished = true;
                        return Some(Err(e));
                    }
                },
                Err(e) => {
                    self.finished = true;
                    return Some(Err(io_read_error(e)));
                }
            }
        }
        None
    }
}

impl FusedIterator for RecordIter {}

impl std::fmt::Debug for RecordIter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordIter")
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    fn chunks(parts: &[&str]) -> RecordStream {
        let owned: Vec<Result<Vec<u8>>> = parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        RecordStream::from_chunks(stream::iter(owned))
    }

    #[test]
    fn test_decode_line_blank() {
        assert!(decode_line(b"").is_none());
        assert!(decode_line(b"  \r").is_none());
        assert_eq!(decode_line(b"{\"a\":1}\r").unwrap().unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_parse_json_body() {
        assert_eq!(parse_json_body("").unwrap(), Value::Null);
        assert_eq!(parse_json_body("{\"version\":\"0.5.1\"}").unwrap()["version"], "0.5.1");
        assert_eq!(parse_json_body("<html>").unwrap_err().kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_line_buffer_split_lines() {
        let mut buf = LineBuffer::default();
        buf.push(b"{\"a\":1}\n{\"b\"");
        assert_eq!(buf.next_line().unwrap(), b"{\"a\":1}");
        assert!(buf.next_line().is_none());
        buf.push(b":2}");
        assert_eq!(buf.take_rest().unwrap(), b"{\"b\":2}");
        assert!(buf.take_rest().is_none());
    }

    #[tokio::test]
    async fn test_stream_skips_blank_lines() {
        let records = chunks(&["{\"a\":1}\n\n{\"b\":2}\n"])
            .collect_records()
            .await
            .unwrap();
        assert_eq!(records, vec![json!({"a": 1}), json!({"b": 2})]);
    }

    #[tokio::test]
    async fn test_stream_malformed_line_is_fatal() {
        let mut stream = chunks(&["{\"a\":1}\nNOTJSON\n{\"c\":3}\n"]);

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, json!({"a": 1}));

        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Streaming);

        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_reassembles_split_chunks() {
        let records = chunks(&["{\"resp", "onse\":\"he\"}\n{\"response\"", ":\"llo\",\"done\":true}"])
            .collect_records()
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["response"], "he");
        assert_eq!(records[1]["done"], true);
    }

    #[tokio::test]
    async fn test_stream_body_error_ends_stream() {
        let parts: Vec<Result<Vec<u8>>> = vec![
            Ok(b"{\"a\":1}\n".to_vec()),
            Err(OllamaError::new(ErrorKind::Streaming, "connection reset")),
            Ok(b"{\"b\":2}\n".to_vec()),
        ];
        let mut stream = RecordStream::from_chunks(stream::iter(parts));

        assert!(stream.next().await.unwrap().is_ok());
        assert_eq!(stream.next().await.unwrap().unwrap_err().kind(), ErrorKind::Streaming);
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn test_iter_skips_blank_lines() {
        let iter = RecordIter::from_reader(Cursor::new(b"{\"a\":1}\n\n{\"b\":2}\n".to_vec()));
        let records = iter.collect_records().unwrap();
        assert_eq!(records, vec![json!({"a": 1}), json!({"b": 2})]);
    }

    #[test]
    fn test_iter_malformed_line_is_fatal() {
        let mut iter = RecordIter::from_reader(Cursor::new(b"{\"a\":1}\nNOTJSON\n".to_vec()));
        assert_eq!(iter.next().unwrap().unwrap(), json!({"a": 1}));
        assert_eq!(iter.next().unwrap().unwrap_err().kind(), ErrorKind::Streaming);
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_iter_last_line_without_newline() {
        let iter = RecordIter::from_reader(Cursor::new(b"{\"done\":true}".to_vec()));
        assert_eq!(iter.collect_records().unwrap(), vec![json!({"done": true})]);
    }
}
