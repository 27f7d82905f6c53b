//! Error types for the reroute core

use thiserror::Error;

/// Errors from the rule store (persistence layer).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the compilation pass itself.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The filtered rule list does not fit into the per-role id ranges.
    #[error("rule list too long: {count} rules exceed the {max} ids available per role")]
    TooManyRules { count: usize, max: usize },
}

/// Errors from installing compiled rules into the engine. Fatal for the
/// compilation pass that hit them; the previously installed set stays in
/// place and the next triggering event retries a full recompilation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("duplicate compiled rule id {0}")]
    DuplicateId(u32),

    #[error("invalid match pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Umbrella error for service intents.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("no rule with id {0}")]
    UnknownRule(String),

    #[error("search must not be empty")]
    EmptySearch,
}
