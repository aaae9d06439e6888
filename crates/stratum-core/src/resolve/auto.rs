//! Built-in rule table for hands-off pipelines

use super::{BatchResolver, ConflictResolver, ResolutionChoice, ResolutionSession};
use crate::conflict::Conflict;
use crate::error::ConfigResult;

/// Fixed pattern table applied without prompting
///
/// - `*.debug`, `*.verbose`: prefer the second (newer) source
/// - `*.paths`, `*_paths`, `*.include`: merge lists
/// - `security.*`, `*.security.*`: prefer the first (authoritative) source
///
/// Everything else takes the higher-priority value.
#[derive(Debug, Clone)]
pub struct AutoResolver {
    table: BatchResolver,
}

impl AutoResolver {
    pub fn new() -> Self {
        let table = BatchResolver::new()
            .with_rule("security.*", ResolutionChoice::Source1)
            .with_rule("*.security.*", ResolutionChoice::Source1)
            .with_rule("*.debug", ResolutionChoice::Source2)
            .with_rule("*.verbose", ResolutionChoice::Source2)
            .with_rule("*.paths", ResolutionChoice::Merge)
            .with_rule("*_paths", ResolutionChoice::Merge)
            .with_rule("*.include", ResolutionChoice::Merge);
        Self { table }
    }
}

impl Default for AutoResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ConflictResolver for AutoResolver {
    fn resolve(&self, conflicts: &[Conflict]) -> ConfigResult<ResolutionSession> {
        self.table.resolve(conflicts)
    }
}
