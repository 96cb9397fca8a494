//! Request pipeline: parse, validate, dispatch, stream.
//!
//! Every request moves through
//!
//! ```text
//! Received -> Parsed -> Dispatched -> Executing -> Responded
//! ```
//!
//! and may jump to `Responded` from any state with an error. Exactly one
//! final response is produced per request; results beyond a batch are
//! sent ahead of it as partial responses.

use crate::config::{Config, ConfigError};
use crate::error::ServerError;
use crate::executor::Executor;
use crate::validate::{RequestValidator, SourceTable, StaticSources, ValidatedRequest};
use bytes::Bytes;
use gwire_protocol::{
    Codecs, ErrorRecord, ProtocolError, RequestMessage, ResponseMessage, TypedValue,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Request lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    Parsed,
    Dispatched,
    Executing,
    Responded,
}

impl RequestState {
    /// Next state on the success path.
    pub fn next(self) -> Option<RequestState> {
        match self {
            RequestState::Received => Some(RequestState::Parsed),
            RequestState::Parsed => Some(RequestState::Dispatched),
            RequestState::Dispatched => Some(RequestState::Executing),
            RequestState::Executing => Some(RequestState::Responded),
            RequestState::Responded => None,
        }
    }

    pub fn can_transition_to(self, to: RequestState) -> bool {
        self.next() == Some(to) || (to == RequestState::Responded && self != RequestState::Responded)
    }
}

/// Destination of responses for one connection.
pub trait ResponseSink {
    fn send(&mut self, response: ResponseMessage) -> Result<(), ServerError>;
}

impl ResponseSink for Vec<ResponseMessage> {
    fn send(&mut self, response: ResponseMessage) -> Result<(), ServerError> {
        self.push(response);
        Ok(())
    }
}

/// Writes the response stream of a single request.
///
/// Rejects responses for another request id and anything after the final
/// response.
pub struct ResponseWriter<'a, S: ResponseSink + ?Sized> {
    request_id: Option<String>,
    sink: &'a mut S,
    finished: bool,
    sent: usize,
}

impl<'a, S: ResponseSink + ?Sized> ResponseWriter<'a, S> {
    pub fn new(request_id: Option<String>, sink: &'a mut S) -> Self {
        Self {
            request_id,
            sink,
            finished: false,
            sent: 0,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of responses written so far.
    pub fn sent(&self) -> usize {
        self.sent
    }

    pub fn send(&mut self, response: ResponseMessage) -> Result<(), ServerError> {
        if self.finished {
            return Err(ServerError::StreamClosed(
                self.request_id.clone().unwrap_or_default(),
            ));
        }
        if response.request_id() != self.request_id.as_deref() {
            return Err(ServerError::RequestIdMismatch {
                expected: self.request_id.clone(),
                actual: response.request_id().map(str::to_string),
            });
        }
        let is_final = response.is_final();
        self.sink.send(response)?;
        self.sent += 1;
        self.finished = is_final;
        Ok(())
    }

    /// Sends a non-final batch.
    pub fn partial(&mut self, results: Vec<TypedValue>) -> Result<(), ServerError> {
        let id = self.id()?;
        self.send(ResponseMessage::partial_response(id, results))
    }

    /// Sends the final batch.
    pub fn finish(&mut self, results: Vec<TypedValue>) -> Result<(), ServerError> {
        let id = self.id()?;
        self.send(ResponseMessage::build_response(id, results))
    }

    /// Terminates the stream with an error.
    pub fn fail(&mut self, record: ErrorRecord) -> Result<(), ServerError> {
        self.send(ResponseMessage::build_error_response(
            self.request_id.clone(),
            record,
        ))
    }

    fn id(&self) -> Result<String, ServerError> {
        self.request_id
            .clone()
            .ok_or(ServerError::RequestIdMismatch {
                expected: None,
                actual: None,
            })
    }
}

/// Parses, validates and executes requests, producing their responses.
pub struct Pipeline<E: Executor> {
    config: Config,
    codecs: Codecs,
    validator: RequestValidator,
    executor: E,
}

impl<E: Executor> Pipeline<E> {
    pub fn new(config: Config, executor: E) -> Result<Self, ConfigError> {
        config.validate()?;
        let codecs = config.serializers.build_codecs()?;
        let sources = StaticSources::from(&config.sources);
        let validator = RequestValidator::new(config.limits.clone(), Arc::new(sources));
        Ok(Self {
            config,
            codecs,
            validator,
            executor,
        })
    }

    /// Replaces the configured source table.
    pub fn with_sources(mut self, sources: Arc<dyn SourceTable>) -> Self {
        self.validator = RequestValidator::new(self.config.limits.clone(), sources);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn codecs(&self) -> &Codecs {
        &self.codecs
    }

    /// Decodes a request, enforcing the content length limit first.
    pub fn parse(&self, bytes: &[u8], mime: &str) -> Result<RequestMessage, ServerError> {
        let max = self.config.limits.max_content_length;
        if bytes.len() > max {
            return Err(ServerError::FrameTooLarge {
                size: bytes.len(),
                max,
            });
        }
        Ok(self.codecs.decode_request(bytes, mime)?)
    }

    pub fn validate(&self, request: &RequestMessage) -> Result<ValidatedRequest, ErrorRecord> {
        self.validator.validate(request)
    }

    /// Validates and executes `request`, writing its responses to `sink`.
    ///
    /// Validation and execution failures are reported through the sink;
    /// an `Err` means the sink itself failed.
    pub fn process<S: ResponseSink + ?Sized>(
        &self,
        request: RequestMessage,
        sink: &mut S,
    ) -> Result<(), ServerError> {
        let mut writer = ResponseWriter::new(Some(request.request_id.clone()), sink);
        let mut state = RequestState::Parsed;

        let validated = match self.validator.validate(&request) {
            Ok(validated) => validated,
            Err(record) => {
                tracing::warn!("[{}] Request rejected: {}", request.request_id, record);
                advance(&mut state, RequestState::Responded, &request.request_id);
                return writer.fail(record);
            }
        };
        advance(&mut state, RequestState::Dispatched, &request.request_id);
        tracing::debug!(
            "[{}] Dispatching {} request to source '{}'",
            request.request_id,
            request.op,
            validated.source().name
        );

        let result = self.execute(&validated, &mut writer, &mut state);
        advance(&mut state, RequestState::Responded, &request.request_id);
        result
    }

    fn execute<S: ResponseSink + ?Sized>(
        &self,
        validated: &ValidatedRequest,
        writer: &mut ResponseWriter<'_, S>,
        state: &mut RequestState,
    ) -> Result<(), ServerError> {
        let request = validated.request();
        let batch_size = request
            .batch_size()
            .unwrap_or(self.config.limits.results_per_batch);
        let timeout = match request.evaluation_timeout() {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
            None => self.config.limits.evaluation_timeout(),
        };

        let started = Instant::now();
        let results = match self.executor.execute(validated) {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!("[{}] Execution failed: {}", request.request_id, e);
                return writer.fail(e.to_record(request));
            }
        };
        advance(state, RequestState::Executing, &request.request_id);

        let mut results = results.peekable();
        let mut batch = Vec::with_capacity(batch_size);
        loop {
            let item = results.next();
            // Also checked once the results are exhausted.
            if timeout.is_some_and(|t| started.elapsed() > t) {
                tracing::warn!(
                    "[{}] Evaluation timed out after {:?}",
                    request.request_id,
                    started.elapsed()
                );
                return writer.fail(ErrorRecord::timeout(request));
            }
            let Some(item) = item else {
                break;
            };
            let value = match item {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!("[{}] Execution failed: {}", request.request_id, e);
                    return writer.fail(e.to_record(request));
                }
            };
            match TypedValue::literal(value) {
                Ok(value) => batch.push(value),
                Err(e) => {
                    tracing::error!("[{}] Unsupported result value: {}", request.request_id, e);
                    return writer.fail(ServerError::from(e).to_record(Some(request)));
                }
            }
            if batch.len() >= batch_size && results.peek().is_some() {
                writer.partial(std::mem::replace(
                    &mut batch,
                    Vec::with_capacity(batch_size),
                ))?;
            }
        }

        tracing::debug!(
            "[{}] Completed in {:?} after {} responses",
            request.request_id,
            started.elapsed(),
            writer.sent() + 1
        );
        writer.finish(batch)
    }

    /// Runs one encoded request through the whole pipeline and returns the
    /// encoded responses, the last of which is final.
    pub fn handle(&self, bytes: &[u8], mime: &str) -> Vec<Bytes> {
        let mut responses: Vec<ResponseMessage> = Vec::new();
        match self.parse(bytes, mime) {
            Ok(request) => {
                let request_id = request.request_id.clone();
                if let Err(e) = self.process(request, &mut responses) {
                    tracing::error!("[{}] Response stream failed: {}", request_id, e);
                    if !responses.last().is_some_and(ResponseMessage::is_final) {
                        responses.push(ResponseMessage::build_error_response(
                            Some(request_id),
                            e.to_record(None),
                        ));
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Unparseable request ({} bytes): {}", bytes.len(), e);
                responses.push(ResponseMessage::build_error_response(None, e.to_record(None)));
            }
        }

        let mut encoded = Vec::with_capacity(responses.len());
        for response in &responses {
            match self.codecs.encode_response(response, mime) {
                Ok(bytes) => encoded.push(bytes),
                Err(e) => {
                    if let Some(bytes) = self.encode_failure(response, mime, e) {
                        encoded.push(bytes);
                    }
                    break;
                }
            }
        }
        encoded
    }

    /// Encodes a replacement for a response that could not be encoded,
    /// falling back to the default MIME type.
    fn encode_failure(
        &self,
        response: &ResponseMessage,
        mime: &str,
        cause: ProtocolError,
    ) -> Option<Bytes> {
        let default_mime = &self.config.serializers.default_mime_type;
        let fallback = match cause {
            ProtocolError::UnsupportedMimeType(requested) => {
                tracing::warn!("No codec for '{}', answering with '{}'", requested, default_mime);
                response.clone()
            }
            e => {
                let request_id = response.request_id().map(str::to_string);
                tracing::error!(
                    "[{}] Failed to serialize response: {}",
                    request_id.as_deref().unwrap_or("-"),
                    e
                );
                let record = ServerError::ResponseSerialization(e).to_record(None);
                ResponseMessage::build_error_response(request_id, record)
            }
        };

        self.codecs
            .encode_response(&fallback, mime)
            .or_else(|_| self.codecs.encode_response(&fallback, default_mime))
            .map_err(|e| tracing::error!("Failed to serialize error response: {}", e))
            .ok()
    }
}

impl<E: Executor> std::fmt::Debug for Pipeline<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("codecs", &self.codecs)
            .finish()
    }
}

fn advance(state: &mut RequestState, to: RequestState, request_id: &str) {
    debug_assert!(state.can_transition_to(to), "{:?} -> {:?}", state, to);
    tracing::debug!("[{}] {:?} -> {:?}", request_id, state, to);
    *state = to;
}
