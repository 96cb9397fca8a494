//! Response status codes and the client-facing error taxonomy.
//!
//! Every failure that crosses the wire is reported as an [`ErrorRecord`]:
//! a status code, a human-readable message built from a fixed template,
//! and a stable machine-readable kind. The constructors here are pure;
//! the same inputs always produce the same record.

use crate::message::RequestMessage;
use crate::tokens::{ARGS_G, ARGS_GREMLIN, OPS_BYTECODE, OPS_EVAL, VAL_TRAVERSAL_SOURCE_ALIAS};
use crate::MAX_REQUEST_SNIPPET;
use std::collections::BTreeSet;
use std::fmt;

/// Response status codes.
///
/// The numeric values are part of the protocol contract and must remain
/// stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Success,
    NoContent,
    PartialContent,
    BadRequest,
    Unauthorized,
    Forbidden,
    PayloadTooLarge,
    TooManyRequests,
    ServerError,
}

impl StatusCode {
    pub fn as_u16(self) -> u16 {
        match self {
            StatusCode::Success => 200,
            StatusCode::NoContent => 204,
            StatusCode::PartialContent => 206,
            StatusCode::BadRequest => 400,
            StatusCode::Unauthorized => 401,
            StatusCode::Forbidden => 403,
            StatusCode::PayloadTooLarge => 413,
            StatusCode::TooManyRequests => 429,
            StatusCode::ServerError => 500,
        }
    }

    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            200 => Some(StatusCode::Success),
            204 => Some(StatusCode::NoContent),
            206 => Some(StatusCode::PartialContent),
            400 => Some(StatusCode::BadRequest),
            401 => Some(StatusCode::Unauthorized),
            403 => Some(StatusCode::Forbidden),
            413 => Some(StatusCode::PayloadTooLarge),
            429 => Some(StatusCode::TooManyRequests),
            500 => Some(StatusCode::ServerError),
            _ => None,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(
            self,
            StatusCode::Success | StatusCode::NoContent | StatusCode::PartialContent
        )
    }

    /// Returns whether a response with this code ends its response sequence.
    pub fn is_final(self) -> bool {
        self != StatusCode::PartialContent
    }

    /// Returns whether a request failing with this code may succeed if resent.
    pub fn is_retryable(self) -> bool {
        matches!(self, StatusCode::TooManyRequests | StatusCode::ServerError)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusCode::Success => "SUCCESS",
            StatusCode::NoContent => "NO_CONTENT",
            StatusCode::PartialContent => "PARTIAL_CONTENT",
            StatusCode::BadRequest => "BAD_REQUEST",
            StatusCode::Unauthorized => "UNAUTHORIZED",
            StatusCode::Forbidden => "FORBIDDEN",
            StatusCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            StatusCode::TooManyRequests => "TOO_MANY_REQUESTS",
            StatusCode::ServerError => "SERVER_ERROR",
        };
        f.write_str(name)
    }
}

/// Stable machine-readable error category.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidRequest,
    ServerTimeoutExceeded,
    ServerSerialization,
    TooManyRequests,
    RequestEntityTooLarge,
    ServerFailStep,
    ServerEvaluation,
    ServerError,
    /// Category reported by a peer that this version does not know.
    Other(String),
}

impl ErrorKind {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorKind::InvalidRequest => "InvalidRequestException",
            ErrorKind::ServerTimeoutExceeded => "ServerTimeoutExceededException",
            ErrorKind::ServerSerialization => "ServerSerializationException",
            ErrorKind::TooManyRequests => "TooManyRequestsException",
            ErrorKind::RequestEntityTooLarge => "RequestEntityTooLargeException",
            ErrorKind::ServerFailStep => "ServerFailStepException",
            ErrorKind::ServerEvaluation => "ServerEvaluationException",
            ErrorKind::ServerError => "ServerErrorException",
            ErrorKind::Other(kind) => kind,
        }
    }
}

impl From<&str> for ErrorKind {
    fn from(kind: &str) -> Self {
        match kind {
            "InvalidRequestException" => ErrorKind::InvalidRequest,
            "ServerTimeoutExceededException" => ErrorKind::ServerTimeoutExceeded,
            "ServerSerializationException" => ErrorKind::ServerSerialization,
            "TooManyRequestsException" => ErrorKind::TooManyRequests,
            "RequestEntityTooLargeException" => ErrorKind::RequestEntityTooLarge,
            "ServerFailStepException" => ErrorKind::ServerFailStep,
            "ServerEvaluationException" => ErrorKind::ServerEvaluation,
            "ServerErrorException" => ErrorKind::ServerError,
            other => ErrorKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reportable failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    code: StatusCode,
    message: String,
    kind: ErrorKind,
}

impl ErrorRecord {
    pub fn new(code: StatusCode, message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            code,
            message: message.into(),
            kind,
        }
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    fn bad_request(message: String) -> Self {
        Self::new(StatusCode::BadRequest, message, ErrorKind::InvalidRequest)
    }

    // ------------ request validation errors

    /// The request could not be interpreted at all.
    pub fn invalid_gremlin_type(request: &RequestMessage) -> Self {
        Self::malformed_request(request)
    }

    /// The payload could not be decoded into a request.
    pub fn malformed_request(reason: impl fmt::Display) -> Self {
        Self::bad_request(format!(
            "Message could not be parsed. Check the format of the request. [{reason}]"
        ))
    }

    pub fn unknown_gremlin_type(request: &RequestMessage) -> Self {
        Self::bad_request(format!(
            "Message with gremlin of type [{}] is not recognized.",
            request.gremlin_type
        ))
    }

    /// A binding key is null or not a string.
    pub fn binding() -> Self {
        Self::bad_request(format!(
            "The [{OPS_EVAL}] message is using one or more invalid binding keys - they must be of type String and cannot be null"
        ))
    }

    pub fn reserved_bindings(bad_bindings: &BTreeSet<String>) -> Self {
        let names = bad_bindings
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        Self::bad_request(format!(
            "The [{OPS_EVAL}] message supplies one or more invalid parameters key of [[{names}]] - these are reserved names."
        ))
    }

    pub fn too_many_bindings(bindings_count: usize, allowed_size: usize) -> Self {
        Self::bad_request(format!(
            "The [{OPS_EVAL}] message contains {bindings_count} bindings which is more than is allowed by the server {allowed_size} configuration"
        ))
    }

    pub fn unknown_alias(aliased: &str) -> Self {
        Self::bad_request(format!(
            "Could not alias [{ARGS_G}] to [{aliased}] as [{aliased}] not in the Graph or TraversalSource global bindings"
        ))
    }

    /// A bytecode request without a bytecode `gremlin` argument.
    pub fn gremlin_argument() -> Self {
        Self::bad_request(format!(
            "A [{OPS_BYTECODE}] message requires a gremlin argument that is of type {ARGS_GREMLIN}."
        ))
    }

    pub fn traversal_source_missing() -> Self {
        Self::bad_request(format!(
            "A [{OPS_BYTECODE}] message requires a [{ARGS_G}] argument."
        ))
    }

    pub fn traversal_source_unknown(traversal_source_name: &str) -> Self {
        Self::bad_request(format!(
            "The traversal source [{traversal_source_name}] for alias [{VAL_TRAVERSAL_SOURCE_ALIAS}] is not configured on the server."
        ))
    }

    pub fn lambda_not_supported(reason: impl fmt::Display) -> Self {
        Self::bad_request(reason.to_string())
    }

    pub fn deserialize_traversal(reason: impl fmt::Display) -> Self {
        Self::bad_request(reason.to_string())
    }

    // ------------ execution errors

    pub fn timeout(request: &RequestMessage) -> Self {
        Self::new(
            StatusCode::ServerError,
            format!(
                "A timeout occurred during traversal evaluation of [{request}] - consider increasing the limit given to evaluationTimeout"
            ),
            ErrorKind::ServerTimeoutExceeded,
        )
    }

    pub fn timed_interrupt_timeout() -> Self {
        Self::new(
            StatusCode::ServerError,
            "Timeout during script evaluation triggered by TimedInterruptCustomizerProvider",
            ErrorKind::ServerTimeoutExceeded,
        )
    }

    pub fn rate_limiting() -> Self {
        Self::new(
            StatusCode::TooManyRequests,
            "Too many requests have been sent in a given amount of time.",
            ErrorKind::TooManyRequests,
        )
    }

    pub fn serialization(err: &dyn std::error::Error) -> Self {
        Self::new(
            StatusCode::ServerError,
            format!("Error during serialization: {}", message_or_cause(err)),
            ErrorKind::ServerSerialization,
        )
    }

    /// The negotiated serializer cannot handle the response.
    pub fn wrong_serializer(err: &dyn std::error::Error) -> Self {
        Self::serialization(err)
    }

    pub fn long_frame(reason: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::PayloadTooLarge,
            format!("{reason} - increase the maxContentLength"),
            ErrorKind::RequestEntityTooLarge,
        )
    }

    /// The request is too large to compile. Embeds at most
    /// [`MAX_REQUEST_SNIPPET`] characters of the request.
    pub fn long_request(request: &RequestMessage) -> Self {
        Self::new(
            StatusCode::PayloadTooLarge,
            format!(
                "The Gremlin statement that was submitted exceeds the maximum compilation size allowed by the server, please split it into multiple smaller statements - {}",
                request.trim_message(MAX_REQUEST_SNIPPET)
            ),
            ErrorKind::RequestEntityTooLarge,
        )
    }

    /// Internal fault that may not recur on retry.
    pub fn temporary(reason: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::ServerError,
            reason.to_string(),
            ErrorKind::ServerEvaluation,
        )
    }

    /// Failure raised by an explicit fail step in the traversal.
    pub fn fail_step(message: &str, formatted: &str) -> Self {
        Self::new(
            StatusCode::ServerError,
            format!("{message}. {formatted}"),
            ErrorKind::ServerFailStep,
        )
    }

    pub fn general(reason: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::ServerError,
            reason.to_string(),
            ErrorKind::ServerError,
        )
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.code, self.kind, self.message)
    }
}

fn message_or_cause(err: &dyn std::error::Error) -> String {
    let message = err.to_string();
    match err.source() {
        Some(cause) if message.is_empty() => cause.to_string(),
        _ => message,
    }
}
