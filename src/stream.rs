//! Incremental decoding of streamed model responses
//!
//! The streaming endpoint writes one or more JSON values back to back with no
//! delimiter, and the network splits them at arbitrary byte offsets. The
//! decoder keeps a text buffer, appends every received chunk and repeatedly
//! parses one JSON value from the start of the buffer. A parse failure means
//! the buffer holds an incomplete value: the bytes stay buffered until the next
//! chunk arrives.
//!
//! [`FragmentStream`] wraps any byte stream and yields the text fragments of
//! `candidates[0].content.parts[*].text` as they become available.

use crate::models::types::GenerateContentResponse;
use futures::Stream;
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

/// Failure reading the underlying byte stream
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Upstream read failed after {bytes_received} bytes: {message}")]
    Read {
        bytes_received: usize,
        message: String,
    },
}

/// Positional decoder for concatenated JSON values
#[derive(Debug, Default)]
pub struct ConcatenatedJsonDecoder {
    buffer: String,
    /// Trailing bytes of a UTF-8 sequence split across chunks
    pending: Vec<u8>,
}

impl ConcatenatedJsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text received but not yet decoded
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    /// Append `chunk` and return every JSON value now complete, in order
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Value> {
        self.append_utf8(chunk);

        let mut values = Vec::new();
        while !self.buffer.is_empty() {
            let (result, consumed) = {
                let mut iter = serde_json::Deserializer::from_str(&self.buffer).into_iter::<Value>();
                let result = iter.next();
                (result, iter.byte_offset())
            };

            match result {
                Some(Ok(value)) => {
                    let rest = &self.buffer[consumed..];
                    let whitespace = rest.len() - rest.trim_start().len();
                    self.buffer.drain(..consumed + whitespace);
                    values.push(value);
                }
                Some(Err(e)) if e.is_eof() => {
                    tracing::debug!(
                        buffered_bytes = self.buffer.len(),
                        "Incomplete JSON value buffered, waiting for more bytes"
                    );
                    break;
                }
                Some(Err(e)) => {
                    tracing::warn!(
                        error = %e,
                        buffered_bytes = self.buffer.len(),
                        buffer = %self.buffer,
                        "Failed to parse streamed JSON, waiting for more bytes"
                    );
                    break;
                }
                None => {
                    self.buffer.clear();
                }
            }
        }

        values
    }

    fn append_utf8(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    self.pending.clear();
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    self.buffer
                        .push_str(std::str::from_utf8(&self.pending[..valid]).unwrap_or_default());
                    match e.error_len() {
                        // Truncated sequence at the end: keep it for the next chunk
                        None => {
                            self.pending.drain(..valid);
                            return;
                        }
                        Some(invalid) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + invalid);
                        }
                    }
                }
            }
        }
    }
}

/// Text fragments carried by one decoded value
///
/// Arrays are flattened one level; values that are not response objects
/// contribute nothing.
pub fn fragments(value: &Value) -> Vec<String> {
    let items: &[Value] = match value {
        Value::Array(items) => items,
        other => std::slice::from_ref(other),
    };

    items
        .iter()
        .filter(|item| item.is_object())
        .filter_map(|item| GenerateContentResponse::deserialize(item).ok())
        .flat_map(|response| {
            response
                .first_candidate_texts()
                .into_iter()
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Stream of text fragments decoded from a concatenated-JSON byte stream
///
/// Ends when the byte stream ends. A read error is yielded once and ends the
/// stream. Dropping it drops the underlying connection.
pub struct FragmentStream<S> {
    inner: S,
    decoder: ConcatenatedJsonDecoder,
    ready: VecDeque<String>,
    bytes_received: usize,
    finished: bool,
}

impl<S> FragmentStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            decoder: ConcatenatedJsonDecoder::new(),
            ready: VecDeque::new(),
            bytes_received: 0,
            finished: false,
        }
    }

    /// Total bytes read from the underlying stream so far
    pub fn bytes_received(&self) -> usize {
        self.bytes_received
    }
}

impl<S, B, E> Stream for FragmentStream<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    type Item = Result<String, StreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(fragment) = this.ready.pop_front() {
                return Poll::Ready(Some(Ok(fragment)));
            }
            if this.finished {
                return Poll::Ready(None);
            }

            match ready!(Pin::new(&mut this.inner).poll_next(cx)) {
                Some(Ok(chunk)) => {
                    let bytes = chunk.as_ref();
                    this.bytes_received += bytes.len();
                    for value in this.decoder.push(bytes) {
                        this.ready.extend(fragments(&value));
                    }
                }
                Some(Err(e)) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(StreamError::Read {
                        bytes_received: this.bytes_received,
                        message: e.to_string(),
                    })));
                }
                None => {
                    this.finished = true;
                    let leftover = this.decoder.buffered().trim();
                    if !leftover.is_empty() {
                        tracing::warn!(
                            leftover_bytes = leftover.len(),
                            bytes_received = this.bytes_received,
                            "Upstream closed with an incomplete JSON value buffered"
                        );
                    }
                }
            }
        }
    }
}
