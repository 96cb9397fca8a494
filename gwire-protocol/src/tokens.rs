//! Well-known operation names and argument keys.

/// Script evaluation operation.
pub const OPS_EVAL: &str = "eval";
/// Bytecode traversal operation.
pub const OPS_BYTECODE: &str = "bytecode";

pub const GREMLIN_TYPE_SCRIPT: &str = "script";
pub const GREMLIN_TYPE_BYTECODE: &str = "bytecode";

/// The script or bytecode to execute.
pub const ARGS_GREMLIN: &str = "gremlin";
/// Map of binding names to values.
pub const ARGS_BINDINGS: &str = "bindings";
/// Traversal source alias.
pub const ARGS_G: &str = "g";
pub const ARGS_LANGUAGE: &str = "language";
/// Per-request evaluation timeout in milliseconds.
pub const ARGS_EVAL_TIMEOUT: &str = "evaluationTimeout";
/// Number of results per partial response.
pub const ARGS_BATCH_SIZE: &str = "batchSize";

/// Default traversal source alias.
pub const VAL_TRAVERSAL_SOURCE_ALIAS: &str = "g";
