//! Trigger hooks wrapped around named pipeline stages.

use std::sync::Arc;

use async_trait::async_trait;

use convoy_config::Config;

use super::{Middleware, WardenEnv};
use crate::error::PipelineError;

/// User-configured hooks invoked around named middleware stages.
///
/// Both hooks default to pass-through; a hook failure fails the stage it
/// wraps.
#[async_trait]
pub trait TriggerSpec: Send + Sync {
    async fn pre(&self, _stage: &str, _env: &mut WardenEnv) -> Result<(), PipelineError> {
        Ok(())
    }

    async fn post(&self, _stage: &str, _env: &mut WardenEnv) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// Pass-through trigger set.
pub struct NoopTriggers;

#[async_trait]
impl TriggerSpec for NoopTriggers {}

/// Triggers driven by the trigger rules of a loaded configuration:
/// configured messages are announced around their stage.
pub struct ConfigTriggers {
    config: Config,
}

impl ConfigTriggers {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TriggerSpec for ConfigTriggers {
    async fn pre(&self, stage: &str, _env: &mut WardenEnv) -> Result<(), PipelineError> {
        if let Some(rule) = self.config.trigger_rule(stage) {
            for message in &rule.pre {
                tracing::info!(stage = %stage, "{}", message);
            }
        }
        Ok(())
    }

    async fn post(&self, stage: &str, _env: &mut WardenEnv) -> Result<(), PipelineError> {
        if let Some(rule) = self.config.trigger_rule(stage) {
            for message in &rule.post {
                tracing::info!(stage = %stage, "{}", message);
            }
        }
        Ok(())
    }
}

/// Stage invoking the pre hook of the middleware it precedes.
pub(super) struct BeforeTriggerStage {
    label: String,
    stage: String,
    triggers: Arc<dyn TriggerSpec>,
}

impl BeforeTriggerStage {
    pub(super) fn new(stage: &str, triggers: Arc<dyn TriggerSpec>) -> Self {
        Self {
            label: format!("before:{}", stage),
            stage: stage.to_string(),
            triggers,
        }
    }
}

#[async_trait]
impl Middleware for BeforeTriggerStage {
    fn name(&self) -> &str {
        &self.label
    }

    async fn call(&self, env: &mut WardenEnv) -> Result<(), PipelineError> {
        self.triggers.pre(&self.stage, env).await
    }
}

/// Stage invoking the post hook of the middleware it follows.
pub(super) struct AfterTriggerStage {
    label: String,
    stage: String,
    triggers: Arc<dyn TriggerSpec>,
}

impl AfterTriggerStage {
    pub(super) fn new(stage: &str, triggers: Arc<dyn TriggerSpec>) -> Self {
        Self {
            label: format!("after:{}", stage),
            stage: stage.to_string(),
            triggers,
        }
    }
}

#[async_trait]
impl Middleware for AfterTriggerStage {
    fn name(&self) -> &str {
        &self.label
    }

    async fn call(&self, env: &mut WardenEnv) -> Result<(), PipelineError> {
        self.triggers.post(&self.stage, env).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_config::TriggerRule;

    fn config_with_rule() -> Config {
        let mut config = Config::default();
        config.triggers.push(TriggerRule {
            stage: "provision".to_string(),
            pre: vec!["starting provision".to_string()],
            post: vec!["provision finished".to_string()],
        });
        config
    }

    #[tokio::test]
    async fn test_config_triggers_pass_through_for_unconfigured_stages() {
        let triggers = ConfigTriggers::new(Config::default());
        let mut env = WardenEnv::new();
        triggers.pre("anything", &mut env).await.expect("pre");
        triggers.post("anything", &mut env).await.expect("post");
    }

    #[tokio::test]
    async fn test_config_triggers_announce_configured_stages() {
        let triggers = ConfigTriggers::new(config_with_rule());
        let mut env = WardenEnv::new();
        triggers.pre("provision", &mut env).await.expect("pre");
        triggers.post("provision", &mut env).await.expect("post");
    }
}
