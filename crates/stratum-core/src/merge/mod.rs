//! Merge engine, resolution policies and custom post-merge rules

pub mod engine;
pub mod policy;
pub mod rules;

pub use engine::{MergeEngine, MergeResult, MAX_MERGE_DEPTH, ROOT_PATH};
pub use policy::{MergeStrategy, ResolutionPolicy};
pub use rules::{MergeRule, MergeRuleType, RuleEngine, DEFAULT_SEPARATOR};
