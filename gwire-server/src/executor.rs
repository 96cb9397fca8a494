//! Seam to the traversal engine.
//!
//! The pipeline never evaluates traversals itself. It hands a validated
//! request to an [`Executor`] and streams whatever the returned iterator
//! yields.

use crate::validate::ValidatedRequest;
use gwire_protocol::{ErrorRecord, RequestMessage, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Lazily produced traversal results.
pub type ResultIter<'a> = Box<dyn Iterator<Item = Result<Value, ExecutionError>> + 'a>;

/// Evaluates validated requests.
pub trait Executor: Send + Sync {
    fn execute<'a>(&'a self, request: &'a ValidatedRequest)
        -> Result<ResultIter<'a>, ExecutionError>;
}

/// Any function returning the full result list is an executor.
impl<F> Executor for F
where
    F: Fn(&ValidatedRequest) -> Result<Vec<Value>, ExecutionError> + Send + Sync,
{
    fn execute<'a>(
        &'a self,
        request: &'a ValidatedRequest,
    ) -> Result<ResultIter<'a>, ExecutionError> {
        let results = self(request)?;
        Ok(Box::new(results.into_iter().map(Ok)))
    }
}

/// Details of a traversal stopped by a fail step.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Failure {
    pub message: String,
    /// Rendering of the failing step.
    pub step: String,
    /// Traverser that reached the step, if known.
    pub traverser: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl Failure {
    pub fn new(message: impl Into<String>, step: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            step: step.into(),
            ..Default::default()
        }
    }

    pub fn with_traverser(mut self, traverser: impl Into<String>) -> Self {
        self.traverser = Some(traverser.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Multi-line report of the failure.
    pub fn format(&self) -> String {
        let mut lines = vec![
            "fail() step triggered".to_string(),
            format!("Message  > {}", self.message),
        ];
        if let Some(traverser) = &self.traverser {
            lines.push(format!("Traverser> {}", traverser));
        }
        if !self.metadata.is_empty() {
            let metadata = self
                .metadata
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("Metadata > {{{}}}", metadata));
        }
        lines.push(format!("Step     > {}", self.step));
        lines.join("\n")
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.step)
    }
}

/// Errors raised by an executor.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error("evaluation exceeded its time budget")]
    Timeout,

    #[error("evaluation interrupted by timed interrupt")]
    TimedInterrupt,

    #[error("rate limited")]
    RateLimited,

    #[error("fail step: {0}")]
    FailStep(Failure),

    #[error("{0}")]
    Temporary(String),

    #[error("{0}")]
    LambdaRejected(String),

    #[error("{0}")]
    Deserialize(String),

    #[error("{0}")]
    General(String),
}

impl ExecutionError {
    /// Converts to the client-facing error for `request`.
    pub fn to_record(&self, request: &RequestMessage) -> ErrorRecord {
        match self {
            ExecutionError::Timeout => ErrorRecord::timeout(request),
            ExecutionError::TimedInterrupt => ErrorRecord::timed_interrupt_timeout(),
            ExecutionError::RateLimited => ErrorRecord::rate_limiting(),
            ExecutionError::FailStep(failure) => {
                ErrorRecord::fail_step(&failure.message, &failure.format())
            }
            ExecutionError::Temporary(reason) => ErrorRecord::temporary(reason),
            ExecutionError::LambdaRejected(reason) => ErrorRecord::lambda_not_supported(reason),
            ExecutionError::Deserialize(reason) => ErrorRecord::deserialize_traversal(reason),
            ExecutionError::General(reason) => ErrorRecord::general(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gwire_protocol::{ErrorKind, StatusCode};

    #[test]
    fn test_failure_format() {
        let failure = Failure::new("no person found", "FailStep(no person found)")
            .with_traverser("v[1]")
            .with_metadata("name", "marko");
        let formatted = failure.format();
        assert!(formatted.starts_with("fail() step triggered\n"));
        assert!(formatted.contains("Message  > no person found"));
        assert!(formatted.contains("Traverser> v[1]"));
        assert!(formatted.contains("Metadata > {name=marko}"));
        assert!(formatted.ends_with("Step     > FailStep(no person found)"));

        let bare = Failure::new("boom", "fail()").format();
        assert_eq!(bare.lines().count(), 3);
    }

    #[test]
    fn test_error_records() {
        let request = RequestMessage::eval("g.V()").with_id("r1");
        let cases = [
            (
                ExecutionError::Timeout,
                StatusCode::ServerError,
                ErrorKind::ServerTimeoutExceeded,
            ),
            (
                ExecutionError::TimedInterrupt,
                StatusCode::ServerError,
                ErrorKind::ServerTimeoutExceeded,
            ),
            (
                ExecutionError::RateLimited,
                StatusCode::TooManyRequests,
                ErrorKind::TooManyRequests,
            ),
            (
                ExecutionError::FailStep(Failure::new("boom", "fail()")),
                StatusCode::ServerError,
                ErrorKind::ServerFailStep,
            ),
            (
                ExecutionError::Temporary("retry later".into()),
                StatusCode::ServerError,
                ErrorKind::ServerEvaluation,
            ),
            (
                ExecutionError::LambdaRejected("no lambdas".into()),
                StatusCode::BadRequest,
                ErrorKind::InvalidRequest,
            ),
            (
                ExecutionError::Deserialize("bad step".into()),
                StatusCode::BadRequest,
                ErrorKind::InvalidRequest,
            ),
            (
                ExecutionError::General("oops".into()),
                StatusCode::ServerError,
                ErrorKind::ServerError,
            ),
        ];

        for (error, code, kind) in cases {
            let record = error.to_record(&request);
            assert_eq!(record.code(), code, "{error}");
            assert_eq!(record.kind(), &kind, "{error}");
        }
    }

    #[test]
    fn test_fail_step_message() {
        let request = RequestMessage::eval("g.V()");
        let record =
            ExecutionError::FailStep(Failure::new("boom", "fail()")).to_record(&request);
        assert!(record.message().starts_with("boom. fail() step triggered"));
    }

    #[test]
    fn test_timeout_message_names_request() {
        let request = RequestMessage::eval("g.V()").with_id("r9");
        let record = ExecutionError::Timeout.to_record(&request);
        assert!(record.message().contains("requestId=r9"));
    }
}
