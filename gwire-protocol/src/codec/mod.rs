//! Message serializers and MIME-type negotiation.

pub mod graphbinary;
pub mod graphson;

use crate::error::{ProtocolError, SerializationError};
use crate::header::Header;
use crate::message::{RequestMessage, ResponseMessage};
use bytes::{Bytes, BytesMut};
use graphbinary::GraphBinarySerializer;
use graphson::GraphSonSerializer;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// A wire codec for request and response messages.
///
/// Implementations provide the payload encoding; the provided
/// `serialize_*`/`deserialize_*` methods add and check the content-type
/// header.
pub trait MessageSerializer: Send + Sync {
    /// Canonical MIME type, written into every header.
    fn mime_type(&self) -> &'static str;

    /// Every MIME type this codec accepts, canonical first.
    fn mime_types_supported(&self) -> &'static [&'static str];

    /// Encoded header for [`MessageSerializer::mime_type`].
    fn header(&self) -> &'static [u8];

    fn write_request(
        &self,
        request: &RequestMessage,
        buf: &mut BytesMut,
    ) -> Result<(), SerializationError>;

    fn read_request(&self, payload: &[u8]) -> Result<RequestMessage, SerializationError>;

    fn write_response(
        &self,
        response: &ResponseMessage,
        buf: &mut BytesMut,
    ) -> Result<(), SerializationError>;

    fn read_response(&self, payload: &[u8]) -> Result<ResponseMessage, SerializationError>;

    fn serialize_request(&self, request: &RequestMessage) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::from(self.header());
        self.write_request(request, &mut buf)?;
        Ok(buf.freeze())
    }

    fn serialize_response(&self, response: &ResponseMessage) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::from(self.header());
        self.write_response(response, &mut buf)?;
        Ok(buf.freeze())
    }

    fn deserialize_request(&self, data: &[u8]) -> Result<RequestMessage, ProtocolError> {
        let payload = strip_header(self, data)?;
        Ok(self.read_request(payload)?)
    }

    fn deserialize_response(&self, data: &[u8]) -> Result<ResponseMessage, ProtocolError> {
        let payload = strip_header(self, data)?;
        Ok(self.read_response(payload)?)
    }
}

/// Checks that `data` starts with a header this codec accepts and returns
/// the payload after it.
fn strip_header<'a, S: MessageSerializer + ?Sized>(
    serializer: &S,
    data: &'a [u8],
) -> Result<&'a [u8], ProtocolError> {
    let (header, payload) = Header::split(data)?;
    let supported = serializer.mime_types_supported();
    if !supported.iter().any(|m| *m == header.mime_type()) {
        return Err(ProtocolError::HeaderMismatch {
            expected: supported.join(", "),
            actual: header.mime_type().to_string(),
        });
    }
    Ok(payload)
}

/// The set of available codecs, keyed by every MIME type they accept.
#[derive(Clone, Default)]
pub struct Codecs {
    serializers: Vec<Arc<dyn MessageSerializer>>,
    by_mime: HashMap<String, usize>,
}

impl Codecs {
    pub fn new() -> Self {
        Self::default()
    }

    /// GraphSON and GraphBinary with their default registries.
    pub fn with_defaults() -> Self {
        let mut codecs = Self::new();
        codecs.register(Arc::new(GraphSonSerializer::new()));
        codecs.register(Arc::new(GraphBinarySerializer::new()));
        codecs
    }

    /// Process-wide default codec set.
    pub fn global() -> &'static Codecs {
        static GLOBAL: OnceLock<Codecs> = OnceLock::new();
        GLOBAL.get_or_init(Codecs::with_defaults)
    }

    /// Adds a codec. A MIME type already claimed by an earlier codec moves
    /// to this one.
    pub fn register(&mut self, serializer: Arc<dyn MessageSerializer>) {
        let index = self.serializers.len();
        for mime in serializer.mime_types_supported() {
            tracing::debug!("Codec for {} registered", mime);
            self.by_mime.insert((*mime).to_string(), index);
        }
        self.serializers.push(serializer);
    }

    pub fn negotiate(&self, mime: &str) -> Result<&dyn MessageSerializer, ProtocolError> {
        self.by_mime
            .get(mime)
            .and_then(|&index| self.serializers.get(index))
            .map(|s| &**s)
            .ok_or_else(|| ProtocolError::UnsupportedMimeType(mime.to_string()))
    }

    /// Encoded header of the codec serving `mime`.
    pub fn negotiate_header(&self, mime: &str) -> Result<&'static [u8], ProtocolError> {
        Ok(self.negotiate(mime)?.header())
    }

    /// Picks the codec named by the header at the front of `data`.
    pub fn detect(&self, data: &[u8]) -> Result<&dyn MessageSerializer, ProtocolError> {
        let (header, _) = Header::split(data)?;
        self.negotiate(header.mime_type())
    }

    pub fn encode_request(
        &self,
        request: &RequestMessage,
        mime: &str,
    ) -> Result<Bytes, ProtocolError> {
        self.negotiate(mime)?.serialize_request(request)
    }

    pub fn encode_response(
        &self,
        response: &ResponseMessage,
        mime: &str,
    ) -> Result<Bytes, ProtocolError> {
        self.negotiate(mime)?.serialize_response(response)
    }

    pub fn decode_request(&self, data: &[u8], mime: &str) -> Result<RequestMessage, ProtocolError> {
        self.negotiate(mime)?.deserialize_request(data)
    }

    pub fn decode_response(
        &self,
        data: &[u8],
        mime: &str,
    ) -> Result<ResponseMessage, ProtocolError> {
        self.negotiate(mime)?.deserialize_response(data)
    }

    /// A copy serving only `mimes`, each of which must already be served.
    pub fn restrict_to<S: AsRef<str>>(&self, mimes: &[S]) -> Result<Codecs, ProtocolError> {
        let mut by_mime = HashMap::new();
        for mime in mimes {
            let mime = mime.as_ref();
            let index = self
                .by_mime
                .get(mime)
                .ok_or_else(|| ProtocolError::UnsupportedMimeType(mime.to_string()))?;
            by_mime.insert(mime.to_string(), *index);
        }
        Ok(Codecs {
            serializers: self.serializers.clone(),
            by_mime,
        })
    }

    /// Every accepted MIME type, sorted.
    pub fn mime_types(&self) -> Vec<&str> {
        let mut mimes: Vec<&str> = self.by_mime.keys().map(String::as_str).collect();
        mimes.sort_unstable();
        mimes
    }
}

impl std::fmt::Debug for Codecs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codecs")
            .field("mime_types", &self.mime_types())
            .finish()
    }
}

/// Encoded header of the default codec serving `mime`.
pub fn negotiate_header(mime: &str) -> Result<&'static [u8], ProtocolError> {
    Codecs::global().negotiate_header(mime)
}
