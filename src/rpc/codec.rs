//! `Content-Length` framing codec.
//!
//! Each message on the wire is an LSP-style header block, a blank line, and
//! exactly `N` bytes of UTF-8 JSON:
//!
//! ```text
//! Content-Length: <N>\r\n
//! \r\n
//! <N bytes of JSON>
//! ```
//!
//! Use [`ContentLengthCodec`] with [`tokio_util::codec::FramedRead`]
//! (inbound) and [`tokio_util::codec::FramedWrite`] (outbound). The decoder
//! buffers partial input, so fragmented chunks and several messages in one
//! chunk both decode to the same message sequence.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::rpc::message::Message;
use crate::{AppError, Result};

/// Largest body accepted by the decoder: 64 MiB.
///
/// A header announcing more than this fails with [`AppError::Framing`]
/// before any body bytes are buffered.
pub const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Largest header block accepted before the blank-line terminator: 8 KiB.
pub const MAX_HEADER_BYTES: usize = 8 * 1024;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Decoder position within the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Waiting for a complete header block.
    Header,
    /// Header consumed; waiting for this many body bytes.
    Body(usize),
}

/// Codec turning a byte stream into [`Message`]s and back.
#[derive(Debug)]
pub struct ContentLengthCodec {
    state: State,
}

impl ContentLengthCodec {
    /// Create a codec positioned at the start of a frame.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: State::Header,
        }
    }
}

impl Default for ContentLengthCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ContentLengthCodec {
    type Item = Message;
    type Error = AppError;

    /// Decode the next complete message from `src`.
    ///
    /// Returns `Ok(None)` while the header or body is still incomplete;
    /// surplus bytes stay in `src` for the next call.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let length = match self.state {
            State::Body(length) => length,
            State::Header => {
                let Some(end) = find_terminator(src) else {
                    if src.len() > MAX_HEADER_BYTES {
                        return Err(AppError::Framing(format!(
                            "header block exceeds {MAX_HEADER_BYTES} bytes"
                        )));
                    }
                    return Ok(None);
                };
                let header = src.split_to(end + HEADER_TERMINATOR.len());
                let length = parse_content_length(&header[..end])?;
                if length > MAX_BODY_BYTES {
                    return Err(AppError::Framing(format!(
                        "Content-Length {length} exceeds {MAX_BODY_BYTES} bytes"
                    )));
                }
                self.state = State::Body(length);
                length
            }
        };

        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        let body = src.split_to(length);
        self.state = State::Header;
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| AppError::Framing(format!("malformed json body: {e}")))
    }

    /// Decode at end of stream; a partially received frame is a framing error.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if src.is_empty() && self.state == State::Header => Ok(None),
            None => Err(AppError::Framing(
                "stream closed in the middle of a message".into(),
            )),
        }
    }
}

impl Encoder<Message> for ContentLengthCodec {
    type Error = AppError;

    /// Serialise `item` and write the header and body into `dst`.
    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        let body = serde_json::to_vec(&item)
            .map_err(|e| AppError::Framing(format!("failed to serialise message: {e}")))?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        dst.reserve(header.len() + body.len());
        dst.put_slice(header.as_bytes());
        dst.put_slice(&body);
        Ok(())
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)
}

/// Extract the `Content-Length` value from a header block (terminator excluded).
///
/// Header names are matched case-insensitively; other headers such as
/// `Content-Type` are ignored.
fn parse_content_length(block: &[u8]) -> Result<usize> {
    let text = std::str::from_utf8(block)
        .map_err(|_| AppError::Framing("header block is not valid utf-8".into()))?;

    let mut content_length = None;
    for line in text.split("\r\n") {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| AppError::Framing(format!("malformed header line: {line:?}")))?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            let value = value.trim();
            let parsed = value.parse::<usize>().map_err(|_| {
                AppError::Framing(format!("non-numeric Content-Length: {value:?}"))
            })?;
            content_length = Some(parsed);
        }
    }

    content_length.ok_or_else(|| AppError::Framing("missing Content-Length header".into()))
}
