//! NETCONF message framing (RFC 6242).
//!
//! Base 1.0 sessions delimit messages with the `]]>]]>` end-of-message
//! marker. Base 1.1 sessions use chunked framing:
//!
//! ```text
//! \n#<chunk-size>\n<chunk-data>...\n##\n
//! ```
//!
//! [`FrameDecoder`] owns the receive buffer and can be called after every
//! read; it returns a message only once the whole of it has arrived.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use memchr::memmem;

use crate::error::TransportError;

/// End-of-message marker for base 1.0 framing.
pub const END_OF_MESSAGE: &[u8] = b"]]>]]>";

/// Largest chunk size allowed by RFC 6242.
const MAX_CHUNK_SIZE: u64 = 4_294_967_295;

/// Message framing mode of a NETCONF session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// `]]>]]>` delimited (base 1.0, always used for `<hello>`).
    #[default]
    EndOfMessage,

    /// Chunked framing (base 1.1).
    Chunked,
}

impl Framing {
    /// Append one framed message to `dst`.
    pub fn encode(&self, message: &[u8], dst: &mut BytesMut) {
        match self {
            Framing::EndOfMessage => {
                dst.reserve(message.len() + END_OF_MESSAGE.len());
                dst.put_slice(message);
                dst.put_slice(END_OF_MESSAGE);
            }
            Framing::Chunked => {
                let header = format!("\n#{}\n", message.len());
                dst.reserve(header.len() + message.len() + 4);
                dst.put_slice(header.as_bytes());
                dst.put_slice(message);
                dst.put_slice(b"\n##\n");
            }
        }
    }
}

/// Incremental decoder over a session's receive buffer.
///
/// Keeps its place between calls: the end-of-message search resumes where
/// the previous one stopped, and complete chunks are moved out of the
/// buffer as soon as they arrive. Each received byte is inspected once.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    framing: Framing,
    buffer: BytesMut,
    /// Bytes at the front of `buffer` already searched for `]]>]]>`.
    scanned: usize,
    /// Chunk data of the message being assembled.
    partial: BytesMut,
}

impl FrameDecoder {
    /// Create a decoder for `framing`.
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            buffer: BytesMut::with_capacity(8192),
            scanned: 0,
            partial: BytesMut::new(),
        }
    }

    /// Framing currently in use.
    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Switch framing. Bytes already buffered are decoded with the new mode.
    pub fn set_framing(&mut self, framing: Framing) {
        self.framing = framing;
        self.scanned = 0;
        self.partial.clear();
    }

    /// Append received bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Number of received bytes not yet returned as part of a message.
    pub fn buffered(&self) -> usize {
        self.buffer.len() + self.partial.len()
    }

    /// Take the next complete message, if one is available.
    pub fn decode(&mut self) -> Result<Option<Bytes>, TransportError> {
        match self.framing {
            Framing::EndOfMessage => Ok(self.decode_end_of_message()),
            Framing::Chunked => self.decode_chunked(),
        }
    }

    fn decode_end_of_message(&mut self) -> Option<Bytes> {
        // The marker may straddle the previous scan boundary
        let from = self.scanned.saturating_sub(END_OF_MESSAGE.len() - 1);
        let Some(offset) = memmem::find(&self.buffer[from..], END_OF_MESSAGE) else {
            self.scanned = self.buffer.len();
            return None;
        };

        let message = self.buffer.split_to(from + offset).freeze();
        self.buffer.advance(END_OF_MESSAGE.len());
        self.scanned = 0;
        Some(trim_ascii(message))
    }

    fn decode_chunked(&mut self) -> Result<Option<Bytes>, TransportError> {
        // Whitespace between messages (e.g. trailing newlines) is not part of
        // the framing.
        if self.partial.is_empty() {
            match self.buffer.iter().position(|b| !matches!(b, b'\n' | b'\r' | b' ')) {
                Some(first) if first > 0 => self.buffer.advance(first - 1),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        loop {
            let src = &self.buffer;
            // Need at least "\n#" plus one more byte to tell a chunk from the end
            if src.len() < 3 {
                return Ok(None);
            }
            if &src[..2] != b"\n#" {
                return Err(framing_error("expected chunk header"));
            }

            if src[2] == b'#' {
                if src.len() < 4 {
                    return Ok(None);
                }
                if src[3] != b'\n' {
                    return Err(framing_error("malformed end-of-chunks marker"));
                }
                self.buffer.advance(4);
                return Ok(Some(self.partial.split().freeze()));
            }

            let Some(newline) = memchr::memchr(b'\n', &src[2..]) else {
                if src.len() - 2 > 10 {
                    return Err(framing_error("chunk size too long"));
                }
                return Ok(None);
            };
            let size = parse_chunk_size(&src[2..2 + newline])?;

            let data_start = 2 + newline + 1;
            let data_end = data_start + size;
            if src.len() < data_end {
                return Ok(None);
            }

            self.partial
                .extend_from_slice(&self.buffer[data_start..data_end]);
            self.buffer.advance(data_end);
        }
    }
}

fn parse_chunk_size(digits: &[u8]) -> Result<usize, TransportError> {
    if digits.is_empty() || digits[0] == b'0' || !digits.iter().all(u8::is_ascii_digit) {
        return Err(framing_error("invalid chunk size"));
    }
    let size: u64 = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|size| *size <= MAX_CHUNK_SIZE)
        .ok_or_else(|| framing_error("chunk size out of range"))?;
    usize::try_from(size).map_err(|_| framing_error("chunk size out of range"))
}

fn trim_ascii(message: Bytes) -> Bytes {
    let start = message
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(message.len());
    let end = message
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |p| p + 1);
    message.slice(start..end)
}

fn framing_error(message: &str) -> TransportError {
    TransportError::Framing {
        message: message.to_string(),
    }
}
