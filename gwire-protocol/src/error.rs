//! Protocol, serialization and value construction errors.

use crate::value::TypeTag;
use thiserror::Error;

/// Errors raised while constructing typed values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("unsupported value type: {0}")]
    UnsupportedType(String),

    #[error("binding name must be a non-empty string")]
    InvalidBindingName,

    #[error("value of type {actual} cannot be used as {expected}")]
    TypeMismatch { expected: TypeTag, actual: TypeTag },

    #[error("invalid number: {0}")]
    InvalidNumber(String),

    #[error("custom type table already installed")]
    CustomTypesInstalled,
}

/// Errors raised while encoding or decoding message payloads.
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("no serializer registered for type {0}")]
    UnregisteredType(TypeTag),

    #[error("unknown type identifier: {0}")]
    UnknownTypeId(String),

    #[error("unexpected end of input: need {needed} more bytes")]
    UnexpectedEof { needed: usize },

    #[error("malformed {what}: {reason}")]
    Malformed { what: &'static str, reason: String },

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("unsupported message version: {0:#x}")]
    UnsupportedVersion(u8),

    #[error("invalid UTF-8 in payload")]
    InvalidUtf8,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid value: {0}")]
    Value(#[from] ValueError),
}

impl SerializationError {
    pub(crate) fn malformed(what: &'static str, reason: impl Into<String>) -> Self {
        SerializationError::Malformed {
            what,
            reason: reason.into(),
        }
    }
}

/// Errors raised by header framing and codec negotiation.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("MIME type must not be empty")]
    EmptyMimeType,

    #[error("MIME type too long: {0} bytes (max 255)")]
    MimeTypeTooLong(usize),

    #[error("incomplete header: need {needed} more bytes")]
    IncompleteHeader { needed: usize },

    #[error("invalid UTF-8 in header")]
    InvalidUtf8,

    #[error("unsupported MIME type: {0}")]
    UnsupportedMimeType(String),

    #[error("header mismatch: expected one of [{expected}], got '{actual}'")]
    HeaderMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] SerializationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_error_display() {
        let err = ValueError::UnsupportedType("acme:Widget".to_string());
        assert!(err.to_string().contains("acme:Widget"));

        let err = ValueError::TypeMismatch {
            expected: TypeTag::Integer,
            actual: TypeTag::String,
        };
        assert_eq!(
            err.to_string(),
            "value of type STRING cannot be used as INTEGER"
        );
    }

    #[test]
    fn test_serialization_error_display() {
        let err = SerializationError::UnregisteredType(TypeTag::Custom("acme:Widget".into()));
        assert!(err.to_string().contains("acme:Widget"));

        let err = SerializationError::UnexpectedEof { needed: 4 };
        assert!(err.to_string().contains('4'));

        let err = SerializationError::UnsupportedVersion(0x81);
        assert!(err.to_string().contains("0x81"));

        let err = SerializationError::malformed("map", "odd number of entries");
        assert_eq!(err.to_string(), "malformed map: odd number of entries");
    }

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::MimeTypeTooLong(300);
        assert!(err.to_string().contains("300"));

        let err = ProtocolError::UnsupportedMimeType("text/plain".into());
        assert!(err.to_string().contains("text/plain"));

        let err = ProtocolError::IncompleteHeader { needed: 3 };
        assert!(err.to_string().contains('3'));

        let err: ProtocolError = SerializationError::InvalidUtf8.into();
        assert!(err.to_string().contains("UTF-8"));
    }
}
