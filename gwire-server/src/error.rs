//! Server error types.

use crate::executor::ExecutionError;
use gwire_protocol::{
    ErrorRecord, ProtocolError, RequestMessage, SerializationError, ValueError,
};
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: usize, max: usize },

    #[error("request rejected: {0}")]
    Rejected(ErrorRecord),

    #[error("execution failed: {0}")]
    Execution(#[from] ExecutionError),

    #[error("unsupported result value: {0}")]
    ResultValue(#[from] ValueError),

    #[error("failed to serialize response: {0}")]
    ResponseSerialization(ProtocolError),

    #[error("response for request {0} already completed")]
    StreamClosed(String),

    #[error("response carries request id {actual:?}, expected {expected:?}")]
    RequestIdMismatch {
        expected: Option<String>,
        actual: Option<String>,
    },

    #[error("response sink closed")]
    SinkClosed,
}

impl ServerError {
    /// Converts to the error reported to the client.
    pub fn to_record(&self, request: Option<&RequestMessage>) -> ErrorRecord {
        match self {
            ServerError::Protocol(e) => ErrorRecord::malformed_request(e),
            ServerError::FrameTooLarge { .. } => ErrorRecord::long_frame(self),
            ServerError::Rejected(record) => record.clone(),
            ServerError::Execution(e) => match request {
                Some(request) => e.to_record(request),
                None => ErrorRecord::general(e),
            },
            ServerError::ResultValue(e) => ErrorRecord::serialization(e),
            ServerError::ResponseSerialization(e) => match e {
                ProtocolError::Serialization(SerializationError::UnregisteredType(_)) => {
                    ErrorRecord::wrong_serializer(e)
                }
                _ => ErrorRecord::serialization(e),
            },
            ServerError::StreamClosed(_)
            | ServerError::RequestIdMismatch { .. }
            | ServerError::SinkClosed => ErrorRecord::general(self),
        }
    }

    /// Returns whether the client may retry the request.
    pub fn is_retryable(&self) -> bool {
        self.to_record(None).code().is_retryable()
    }
}
