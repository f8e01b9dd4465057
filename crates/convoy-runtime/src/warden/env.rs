//! Per-invocation pipeline environment.

use std::collections::HashMap;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;

/// Mutable state threaded through a pipeline run.
///
/// Carries the interrupt flag polled at stage checkpoints, the first error
/// recorded by a failing run, a cancellation context (a cancelled token is
/// an interrupt at the next checkpoint), and opaque payload values the
/// stages share among themselves.
pub struct WardenEnv {
    interrupted: bool,
    error: Option<PipelineError>,
    ctx: CancellationToken,
    values: HashMap<String, Value>,
}

impl WardenEnv {
    pub fn new() -> Self {
        Self::with_context(CancellationToken::new())
    }

    pub fn with_context(ctx: CancellationToken) -> Self {
        Self {
            interrupted: false,
            error: None,
            ctx,
            values: HashMap::new(),
        }
    }

    /// Request an interrupt; the pipeline raises at its next checkpoint.
    pub fn interrupt(&mut self) {
        self.interrupted = true;
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted || self.ctx.is_cancelled()
    }

    pub fn context(&self) -> &CancellationToken {
        &self.ctx
    }

    /// The first error recorded by a failing run, if any.
    pub fn error(&self) -> Option<&PipelineError> {
        self.error.as_ref()
    }

    pub(crate) fn record_error(&mut self, err: PipelineError) {
        self.error = Some(err);
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }
}

impl Default for WardenEnv {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_context_counts_as_interrupted() {
        let ctx = CancellationToken::new();
        let env = WardenEnv::with_context(ctx.clone());
        assert!(!env.is_interrupted());
        ctx.cancel();
        assert!(env.is_interrupted());
    }

    #[test]
    fn test_payload_values_round_trip() {
        let mut env = WardenEnv::new();
        env.set("box.name", serde_json::json!("alpine"));
        assert_eq!(env.get("box.name"), Some(&serde_json::json!("alpine")));
        assert_eq!(env.remove("box.name"), Some(serde_json::json!("alpine")));
        assert!(env.get("box.name").is_none());
    }
}
