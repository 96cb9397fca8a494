//! Content-type header framing.
//!
//! Every serialized message is prefixed with its MIME type so the receiver
//! can pick a codec before touching the payload:
//!
//! ```text
//! +--------+---------------------------+----------------
//! | len:u8 | MIME type (len bytes)     | payload ...
//! +--------+---------------------------+----------------
//! ```
//!
//! `len` is the UTF-8 byte length of the MIME string. There is no
//! terminator.

use crate::error::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::sync::OnceLock;

/// Canonical MIME type of the binary codec.
pub const MIME_GRAPHBINARY_V4: &str = "graphbinary-v4";
/// Canonical MIME type of the text codec.
pub const MIME_GRAPHSON_V4: &str = "graphson-v4";

/// Long-form alias of [`MIME_GRAPHBINARY_V4`].
pub const MIME_GRAPHBINARY_V4_FULL: &str = "application/vnd.graphbinary-v4.0";
/// Long-form alias of [`MIME_GRAPHSON_V4`].
pub const MIME_GRAPHSON_V4_FULL: &str = "application/vnd.gremlin-v4.0+json";
/// Generic JSON, served by the text codec.
pub const MIME_JSON: &str = "application/json";

/// Maximum MIME type length representable by the length byte.
pub const MAX_MIME_LEN: usize = u8::MAX as usize;

/// Decoded content-type header.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Header {
    mime: String,
}

impl Header {
    pub fn new(mime: impl Into<String>) -> Result<Self, ProtocolError> {
        let mime = mime.into();
        if mime.is_empty() {
            return Err(ProtocolError::EmptyMimeType);
        }
        if mime.len() > MAX_MIME_LEN {
            return Err(ProtocolError::MimeTypeTooLong(mime.len()));
        }
        Ok(Self { mime })
    }

    pub fn mime_type(&self) -> &str {
        &self.mime
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        1 + self.mime.len()
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    pub fn encode_into(&self, buf: &mut BytesMut) {
        // Length is bounded by `new`.
        buf.put_u8(self.mime.len() as u8);
        buf.put_slice(self.mime.as_bytes());
    }

    /// Decodes a header from the front of `buf`.
    ///
    /// Returns `Ok(None)` if more data is needed. On success exactly the
    /// header bytes are consumed and the payload is left in `buf`.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        let Some(&len) = buf.first() else {
            return Ok(None);
        };
        let len = len as usize;
        if buf.len() < 1 + len {
            return Ok(None);
        }
        let header = Self::parse(&buf[1..1 + len])?;
        buf.advance(1 + len);
        Ok(Some(header))
    }

    /// Splits a complete message into its header and payload.
    pub fn split(data: &[u8]) -> Result<(Self, &[u8]), ProtocolError> {
        let Some(&len) = data.first() else {
            return Err(ProtocolError::IncompleteHeader { needed: 1 });
        };
        let len = len as usize;
        if data.len() < 1 + len {
            return Err(ProtocolError::IncompleteHeader {
                needed: 1 + len - data.len(),
            });
        }
        let header = Self::parse(&data[1..1 + len])?;
        Ok((header, &data[1 + len..]))
    }

    fn parse(mime: &[u8]) -> Result<Self, ProtocolError> {
        let mime = std::str::from_utf8(mime).map_err(|_| ProtocolError::InvalidUtf8)?;
        Self::new(mime)
    }
}

/// Encoded header for a built-in MIME constant, built once per process.
pub(crate) fn cached(cell: &'static OnceLock<Bytes>, mime: &'static str) -> &'static [u8] {
    debug_assert!(!mime.is_empty() && mime.len() <= MAX_MIME_LEN);
    cell.get_or_init(|| {
        Header {
            mime: mime.to_string(),
        }
        .encode()
    })
}
