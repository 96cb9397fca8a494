//! Request validation ahead of dispatch.

use crate::config::{LimitsConfig, SourcesConfig};
use gwire_protocol::tokens::{ARGS_BINDINGS, ARGS_G, VAL_TRAVERSAL_SOURCE_ALIAS};
use gwire_protocol::{
    Bytecode, ErrorRecord, GremlinType, Operation, RequestMessage, TypedValue, Value,
};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

/// Binding names that collide with element tokens.
pub const RESERVED_BINDINGS: &[&str] = &[
    "id", "key", "label", "value", "T.id", "T.key", "T.label", "T.value",
];

/// A traversal source resolved from an alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceHandle {
    pub alias: String,
    pub name: String,
}

/// Table of traversal sources the server can execute against.
pub trait SourceTable: Send + Sync {
    fn resolve(&self, alias: &str) -> Option<SourceHandle>;
}

/// Fixed alias-to-source table.
#[derive(Debug, Clone, Default)]
pub struct StaticSources {
    sources: BTreeMap<String, String>,
}

impl StaticSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, alias: impl Into<String>, name: impl Into<String>) -> Self {
        self.sources.insert(alias.into(), name.into());
        self
    }
}

impl From<&SourcesConfig> for StaticSources {
    fn from(config: &SourcesConfig) -> Self {
        Self {
            sources: config.0.clone(),
        }
    }
}

impl SourceTable for StaticSources {
    fn resolve(&self, alias: &str) -> Option<SourceHandle> {
        self.sources.get(alias).map(|name| SourceHandle {
            alias: alias.to_string(),
            name: name.clone(),
        })
    }
}

/// A request that passed validation, ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    request: RequestMessage,
    operation: Operation,
    gremlin_type: GremlinType,
    source: SourceHandle,
    bindings: Vec<TypedValue>,
}

impl ValidatedRequest {
    pub fn request(&self) -> &RequestMessage {
        &self.request
    }

    pub fn request_id(&self) -> &str {
        &self.request.request_id
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn gremlin_type(&self) -> GremlinType {
        self.gremlin_type
    }

    pub fn source(&self) -> &SourceHandle {
        &self.source
    }

    /// Bindings as named variables, in request order.
    pub fn bindings(&self) -> &[TypedValue] {
        &self.bindings
    }

    pub fn script(&self) -> Option<&str> {
        self.request.script()
    }

    pub fn bytecode(&self) -> Option<&Bytecode> {
        self.request.bytecode_payload()
    }

    pub fn into_request(self) -> RequestMessage {
        self.request
    }
}

/// Checks requests against the limits and the source table.
#[derive(Clone)]
pub struct RequestValidator {
    limits: LimitsConfig,
    sources: Arc<dyn SourceTable>,
}

impl RequestValidator {
    pub fn new(limits: LimitsConfig, sources: Arc<dyn SourceTable>) -> Self {
        Self { limits, sources }
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    /// Validates `request`, returning the first violation found.
    pub fn validate(&self, request: &RequestMessage) -> Result<ValidatedRequest, ErrorRecord> {
        let gremlin_type = request
            .gremlin_kind()
            .ok_or_else(|| ErrorRecord::unknown_gremlin_type(request))?;
        let operation = request
            .operation()
            .ok_or_else(|| ErrorRecord::invalid_gremlin_type(request))?;

        match (operation, gremlin_type) {
            (Operation::Eval, GremlinType::Script) => self.check_script(request)?,
            (Operation::Bytecode, GremlinType::Bytecode) => self.check_bytecode(request)?,
            _ => return Err(ErrorRecord::invalid_gremlin_type(request)),
        }

        let bindings = self.check_bindings(request)?;
        let source = self.resolve_source(request, operation)?;

        if !self.limits.allow_lambdas && has_lambda(request) {
            return Err(ErrorRecord::lambda_not_supported(
                "The traversal contains a lambda which is not permitted by the server configuration",
            ));
        }

        Ok(ValidatedRequest {
            request: request.clone(),
            operation,
            gremlin_type,
            source,
            bindings,
        })
    }

    fn check_script(&self, request: &RequestMessage) -> Result<(), ErrorRecord> {
        let Some(gremlin) = request.gremlin() else {
            return Ok(());
        };
        let Some(script) = gremlin.get().as_str() else {
            return Err(ErrorRecord::invalid_gremlin_type(request));
        };
        if script.chars().count() > self.limits.max_request_size {
            return Err(ErrorRecord::long_request(request));
        }
        Ok(())
    }

    fn check_bytecode(&self, request: &RequestMessage) -> Result<(), ErrorRecord> {
        match request.bytecode_payload() {
            Some(_) => Ok(()),
            None => Err(ErrorRecord::gremlin_argument()),
        }
    }

    fn check_bindings(&self, request: &RequestMessage) -> Result<Vec<TypedValue>, ErrorRecord> {
        let Some(arg) = request.arg(ARGS_BINDINGS) else {
            return Ok(Vec::new());
        };
        let Some(entries) = arg.get().as_map() else {
            return Err(ErrorRecord::binding());
        };

        let mut seen = HashSet::new();
        let mut reserved = BTreeSet::new();
        let mut bindings = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let name = match key {
                Value::String(name) if !name.is_empty() => name,
                _ => return Err(ErrorRecord::binding()),
            };
            if !seen.insert(name.as_str()) {
                return Err(ErrorRecord::binding());
            }
            if RESERVED_BINDINGS.contains(&name.as_str()) {
                reserved.insert(name.clone());
                continue;
            }
            let binding =
                TypedValue::named(name.clone(), value.clone()).map_err(|_| ErrorRecord::binding())?;
            bindings.push(binding);
        }

        if !reserved.is_empty() {
            return Err(ErrorRecord::reserved_bindings(&reserved));
        }
        if entries.len() > self.limits.max_bindings {
            return Err(ErrorRecord::too_many_bindings(
                entries.len(),
                self.limits.max_bindings,
            ));
        }
        Ok(bindings)
    }

    fn resolve_source(
        &self,
        request: &RequestMessage,
        operation: Operation,
    ) -> Result<SourceHandle, ErrorRecord> {
        match operation {
            Operation::Bytecode => {
                let alias = request
                    .alias()
                    .ok_or_else(ErrorRecord::traversal_source_missing)?;
                self.sources
                    .resolve(alias)
                    .ok_or_else(|| ErrorRecord::traversal_source_unknown(alias))
            }
            Operation::Eval => {
                let alias = match request.arg(ARGS_G) {
                    None => VAL_TRAVERSAL_SOURCE_ALIAS,
                    Some(g) => g
                        .get()
                        .as_str()
                        .ok_or_else(|| ErrorRecord::unknown_alias(&g.get().to_string()))?,
                };
                self.sources
                    .resolve(alias)
                    .ok_or_else(|| ErrorRecord::unknown_alias(alias))
            }
        }
    }
}

impl std::fmt::Debug for RequestValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestValidator")
            .field("limits", &self.limits)
            .finish()
    }
}

fn has_lambda(request: &RequestMessage) -> bool {
    request.gremlin().is_some_and(|g| g.get().contains_lambda())
        || request.bindings().iter().any(|(_, v)| v.contains_lambda())
}
