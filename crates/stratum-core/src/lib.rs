//! Stratum core: layered configuration merging
//!
//! Raw per-level documents ([`RawConfig`]) are combined by the
//! [`MergeEngine`] into one effective document plus a list of
//! [`Conflict`] records. Conflicts are data, not errors; only the ABORT
//! policy turns one into a [`ConfigError`].
//!
//! # Modules
//!
//! - [`level`]: configuration levels and raw documents
//! - [`path`]: dot-path access and glob matching
//! - [`conflict`]: base conflict taxonomy (VALUE, TYPE, ARRAY, POLICY_VIOLATION)
//! - [`tracker`]: severity-gated conflict tracking for domain objects
//! - [`merge`]: deep and nuclear strategies, policies, custom rules
//! - [`resolve`]: interactive, batch and auto resolvers
//! - [`schema`]: structural validation of merged documents
//!
//! ```ignore
//! use stratum_core::{ConfigLevel, MergeEngine, RawConfig};
//! use serde_json::json;
//!
//! let result = MergeEngine::new().merge(&[
//!     RawConfig::new(ConfigLevel::User, "config", json!({"settings": {"debug": true}})),
//!     RawConfig::new(ConfigLevel::Project, "config", json!({"settings": {"debug": false}})),
//! ])?;
//! assert_eq!(result.get("settings.debug"), Some(&json!(true)));
//! ```

pub mod conflict;
pub mod error;
pub mod level;
pub mod merge;
pub mod path;
pub mod resolve;
pub mod schema;
pub mod tracker;

pub use conflict::{Conflict, ConflictType};
pub use error::{ConfigError, ConfigResult};
pub use level::{level_key, sort_by_priority, ConfigLevel, RawConfig};
pub use merge::{
    MergeEngine, MergeResult, MergeRule, MergeRuleType, MergeStrategy, ResolutionPolicy,
    RuleEngine,
};
pub use path::{get_path, glob_matches, remove_path, set_path, PathPattern};
pub use resolve::{
    AutoResolver, BatchResolver, CliResolver, ConflictResolver, ResolutionChoice,
    ResolutionSession,
};
pub use schema::{default_schema, SchemaValidator};
pub use tracker::{
    AppliedResolution, ConflictKind, ConflictSeverity, ConflictTracker, SuggestedResolution,
    TrackedConflict,
};
