//! Script evaluation stage.
//!
//! Scripts are opaque to scr. The evaluator receives the script source
//! and the variables bound so far and returns zero or more strings, each
//! of which becomes a match.

use crate::errors::MatchError;
use crate::format::Scope;
use async_trait::async_trait;
use std::fmt::Debug;

/// Evaluates `cjs`, `ljs` and `djs` scripts.
#[async_trait]
pub trait ScriptEvaluator: Send + Sync + Debug {
    /// Runs `script` with `scope` bound as variables.
    async fn evaluate(&self, script: &str, scope: &Scope) -> Result<Vec<String>, MatchError>;
}
