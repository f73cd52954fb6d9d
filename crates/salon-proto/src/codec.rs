//! Newline-delimited JSON framing for tokio transports.
//!
//! One frame per line. The decoder enforces a maximum frame length so a
//! client cannot buffer unbounded garbage. Lines that fail to parse are
//! yielded in-band as [`Decoded::Malformed`] rather than as decoder
//! errors: `tokio_util`'s `Framed` treats any `Err` from `decode` as
//! fatal and stops polling the transport, so a decoder error here would
//! turn one bad line into a disconnect. `Err` is reserved for genuinely
//! fatal conditions (transport failure, oversized frame).

use crate::event::ServerEvent;
use crate::request::RequestFrame;
use bytes::{BufMut, BytesMut};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Default maximum frame length in bytes.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Framing errors. Every variant tears the connection down.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Underlying transport failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A single frame exceeded the length limit.
    #[error("frame exceeds {0} bytes")]
    FrameTooLong(usize),
    /// An outbound value failed to serialize.
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),
}

/// One decoded inbound item.
///
/// A line that is not valid JSON for the expected frame type surfaces
/// here as [`Decoded::Malformed`], leaving the stream readable so the
/// peer can be answered with an error envelope and keep going.
#[derive(Debug)]
pub enum Decoded<Rx> {
    /// A well-formed frame.
    Frame(Rx),
    /// A complete line that failed to parse. The line was consumed.
    Malformed(serde_json::Error),
}

impl<Rx> Decoded<Rx> {
    /// The parsed frame, discarding malformed lines.
    pub fn frame(self) -> Option<Rx> {
        match self {
            Decoded::Frame(frame) => Some(frame),
            Decoded::Malformed(_) => None,
        }
    }
}

/// A `\n`-delimited JSON codec decoding `Rx` frames and encoding `Tx`.
#[derive(Debug)]
pub struct JsonLineCodec<Rx, Tx> {
    max_frame: usize,
    _marker: PhantomData<(Rx, Tx)>,
}

/// Server-side alias: reads requests, writes events.
pub type ServerCodec = JsonLineCodec<RequestFrame, ServerEvent>;

/// Client-side alias: reads events, writes requests.
pub type ClientCodec = JsonLineCodec<ServerEvent, RequestFrame>;

impl<Rx, Tx> JsonLineCodec<Rx, Tx> {
    /// Create a codec with the default frame limit.
    pub fn new() -> Self {
        Self::with_max_frame(MAX_FRAME_LEN)
    }

    /// Create a codec with an explicit frame limit.
    pub fn with_max_frame(max_frame: usize) -> Self {
        Self { max_frame, _marker: PhantomData }
    }
}

impl<Rx, Tx> Default for JsonLineCodec<Rx, Tx> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Rx: DeserializeOwned, Tx> Decoder for JsonLineCodec<Rx, Tx> {
    type Item = Decoded<Rx>;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Decoded<Rx>>, CodecError> {
        loop {
            let Some(pos) = src.iter().position(|&b| b == b'\n') else {
                if src.len() > self.max_frame {
                    return Err(CodecError::FrameTooLong(self.max_frame));
                }
                return Ok(None);
            };

            if pos > self.max_frame {
                return Err(CodecError::FrameTooLong(self.max_frame));
            }

            let line = src.split_to(pos + 1);
            let line = &line[..pos];
            // Tolerate \r\n line endings.
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.iter().all(|b| b.is_ascii_whitespace()) {
                // Blank keepalive line; keep scanning.
                continue;
            }

            return Ok(Some(match serde_json::from_slice(line) {
                Ok(frame) => Decoded::Frame(frame),
                Err(e) => Decoded::Malformed(e),
            }));
        }
    }
}

impl<Rx: DeserializeOwned, Tx: Serialize> Encoder<&Tx> for JsonLineCodec<Rx, Tx> {
    type Error = CodecError;

    fn encode(&mut self, item: &Tx, dst: &mut BytesMut) -> Result<(), CodecError> {
        let payload = serde_json::to_vec(item).map_err(CodecError::Encode)?;
        dst.reserve(payload.len() + 1);
        dst.put_slice(&payload);
        dst.put_u8(b'\n');
        Ok(())
    }
}
