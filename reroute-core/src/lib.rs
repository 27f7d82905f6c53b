//! Reroute Core Library
//!
//! Rule compilation and header mirroring for user-defined URL rewrites:
//! a list of search → replace rules is compiled into a prioritized set of
//! declarative network rules (redirect, request-header, response-header),
//! while a sniffer observes live traffic to the original destinations and
//! captures the safe headers that let auth-preserving rules go live.
//!
//! The interception runtime and the persistence medium are collaborators
//! behind the [`RuleEngine`] and [`RuleStore`] traits; [`RewriteService`]
//! owns both and runs the recompile-on-change loop.

/// Persisted rule state (the JSON aggregate)
pub mod state;

/// Pure compilation pass from state to engine rules
pub mod compiler;

/// Outbound-request header capture
pub mod sniffer;

/// Persistence seam and implementations
pub mod store;

/// Interception engine seam and in-memory implementation
pub mod engine;

/// Owning actor and reactive recompile loop
pub mod service;

/// Error types for core operations
pub mod error;

pub use compiler::{
    compile, CompiledAction, CompiledRule, HeaderSet, MatchCondition, ResourceType, UrlMatch,
};
pub use engine::{InMemoryEngine, RuleEngine};
pub use error::{CompileError, EngineError, ServiceError, StoreError};
pub use service::RewriteService;
pub use sniffer::{capture, is_unsafe_header, UNSAFE_HEADERS};
pub use state::{AppState, Rule, RuleUpdate};
pub use store::{JsonFileStore, MemoryStore, RuleStore};
