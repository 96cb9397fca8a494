//! # gwire-server
//!
//! Request pipeline for gwire.
//!
//! This crate provides:
//! - Layered configuration (defaults, YAML file, environment)
//! - Request validation against limits and the traversal-source table
//! - Dispatch to an external traversal [`Executor`]
//! - Batched result streaming with evaluation timeouts
//! - Conversion of every failure into exactly one client-facing error

pub mod config;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod validate;

pub use config::{Config, ConfigError, LimitsConfig, SerializersConfig, SourcesConfig};
pub use error::ServerError;
pub use executor::{ExecutionError, Executor, Failure, ResultIter};
pub use pipeline::{Pipeline, RequestState, ResponseSink, ResponseWriter};
pub use validate::{
    RequestValidator, SourceHandle, SourceTable, StaticSources, ValidatedRequest,
    RESERVED_BINDINGS,
};
