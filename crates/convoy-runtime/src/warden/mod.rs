//! Action warden
//!
//! Executes a middleware pipeline with two-phase semantics: stages run in
//! declared order on the caller's task, and when one fails every stage
//! already entered is recovered in reverse entry order before the failure
//! re-raises. Middleware stages are wrapped with trigger stages keyed by
//! their stable name; pipelines nest because the warden is itself a
//! middleware.
//!
//! A stage is pushed onto the recover stack before its `call` runs, so a
//! stage that fails mid-execution is itself recovered; middlewares that
//! acquire resources in their first lines depend on this.

mod env;
mod trigger;

pub use env::WardenEnv;
pub use trigger::{ConfigTriggers, NoopTriggers, TriggerSpec};

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::PipelineError;
use trigger::{AfterTriggerStage, BeforeTriggerStage};

/// One unit in a pipeline, exposing `call` and optionally `recover`.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Stable name used for trigger keying and logging.
    fn name(&self) -> &str;

    async fn call(&self, env: &mut WardenEnv) -> Result<(), PipelineError>;

    /// Undo partial work after a downstream failure. Default is a no-op.
    async fn recover(&self, _env: &mut WardenEnv) {}
}

/// Plain callable dispatched as a pipeline stage.
pub type CallFn = Arc<dyn Fn(&mut WardenEnv) -> Result<(), PipelineError> + Send + Sync>;

/// Raw stage descriptor handed to warden construction.
pub enum StageSpec {
    /// A middleware, wrapped with before/after trigger stages keyed by its
    /// stable name.
    Middleware(Arc<dyn Middleware>),
    /// A bare callable, adapted into a synthetic stage without triggers.
    Call(CallFn),
}

impl StageSpec {
    pub fn middleware<M: Middleware + 'static>(middleware: M) -> Self {
        StageSpec::Middleware(Arc::new(middleware))
    }

    pub fn call<F>(func: F) -> Self
    where
        F: Fn(&mut WardenEnv) -> Result<(), PipelineError> + Send + Sync + 'static,
    {
        StageSpec::Call(Arc::new(func))
    }
}

struct CallableStage {
    func: CallFn,
}

#[async_trait]
impl Middleware for CallableStage {
    fn name(&self) -> &str {
        "callable"
    }

    async fn call(&self, env: &mut WardenEnv) -> Result<(), PipelineError> {
        (self.func)(env)
    }
}

struct WardenState {
    /// Stage indexes not yet dispatched.
    pending: VecDeque<usize>,
    /// Stage indexes whose `call` has been entered, in entry order.
    entered: Vec<usize>,
}

/// Middleware pipeline executor with recovery, interrupt checkpoints, and
/// trigger wrapping.
pub struct Warden {
    stages: Vec<Arc<dyn Middleware>>,
    state: Mutex<WardenState>,
}

impl std::fmt::Debug for Warden {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Warden").finish_non_exhaustive()
    }
}

impl Warden {
    /// Finalize stage descriptors into a pipeline without trigger hooks.
    pub fn new(specs: Vec<StageSpec>) -> Result<Self, PipelineError> {
        Self::with_triggers(specs, Arc::new(NoopTriggers))
    }

    /// Finalize stage descriptors into a pipeline wrapped by `triggers`.
    pub fn with_triggers(
        specs: Vec<StageSpec>,
        triggers: Arc<dyn TriggerSpec>,
    ) -> Result<Self, PipelineError> {
        let mut stages: Vec<Arc<dyn Middleware>> = Vec::new();
        for spec in specs {
            match spec {
                StageSpec::Middleware(middleware) => {
                    let name = middleware.name().to_string();
                    if name.trim().is_empty() {
                        return Err(PipelineError::invalid_stage(
                            "middleware has no stable name",
                        ));
                    }
                    stages.push(Arc::new(BeforeTriggerStage::new(&name, triggers.clone())));
                    stages.push(middleware);
                    stages.push(Arc::new(AfterTriggerStage::new(&name, triggers.clone())));
                }
                StageSpec::Call(func) => {
                    stages.push(Arc::new(CallableStage { func }));
                }
            }
        }

        let pending = (0..stages.len()).collect();
        Ok(Self {
            stages,
            state: Mutex::new(WardenState {
                pending,
                entered: Vec::new(),
            }),
        })
    }

    /// Number of finalized stages, trigger stages included.
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    fn state(&self) -> Result<MutexGuard<'_, WardenState>, PipelineError> {
        self.state
            .lock()
            .map_err(|e| PipelineError::internal(e.to_string()))
    }

    /// Stages not yet dispatched.
    pub fn remaining(&self) -> Result<usize, PipelineError> {
        Ok(self.state()?.pending.len())
    }

    /// Stages entered and not yet recovered.
    pub fn entered(&self) -> Result<usize, PipelineError> {
        Ok(self.state()?.entered.len())
    }

    /// Dispatch the pipeline against `env`.
    ///
    /// Interrupt checkpoints run before each stage is dispatched and after
    /// it returns; no polling happens inside a stage.
    pub async fn call(&self, env: &mut WardenEnv) -> Result<(), PipelineError> {
        loop {
            if env.is_interrupted() {
                return self.fail(env, PipelineError::interrupt()).await;
            }

            let next = {
                let mut state = self.state()?;
                let idx = state.pending.pop_front();
                if let Some(idx) = idx {
                    state.entered.push(idx);
                }
                idx
            };
            let Some(idx) = next else {
                return Ok(());
            };

            let stage = self.stages[idx].clone();
            tracing::debug!(stage = stage.name(), "warden entering stage");
            if let Err(err) = stage.call(env).await {
                // Exit requests propagate without recovery.
                if err.is_exit() {
                    return Err(err);
                }
                return self.fail(env, err).await;
            }

            if env.is_interrupted() {
                return self.fail(env, PipelineError::interrupt()).await;
            }
            tracing::debug!(stage = stage.name(), "warden leaving stage");
        }
    }

    async fn fail(
        &self,
        env: &mut WardenEnv,
        err: PipelineError,
    ) -> Result<(), PipelineError> {
        let already_recorded = env.error().map(|e| e.same(&err)).unwrap_or(false);
        if !already_recorded {
            tracing::error!(error = %err, "pipeline failed");
            env.record_error(err.clone());
        }
        self.recover(env).await;
        Err(err)
    }

    /// Recover every entered stage in reverse entry order, then clear the
    /// stack so an enclosing pipeline does not recover these stages again.
    pub async fn recover(&self, env: &mut WardenEnv) {
        let entered = match self.state() {
            Ok(mut state) => {
                state.pending.clear();
                std::mem::take(&mut state.entered)
            }
            Err(err) => {
                tracing::error!(error = %err, "pipeline state unavailable, skipping recovery");
                return;
            }
        };
        for idx in entered.into_iter().rev() {
            let stage = self.stages[idx].clone();
            tracing::debug!(stage = stage.name(), "warden recovering stage");
            stage.recover(env).await;
        }
    }
}

#[async_trait]
impl Middleware for Warden {
    fn name(&self) -> &str {
        "warden"
    }

    async fn call(&self, env: &mut WardenEnv) -> Result<(), PipelineError> {
        Warden::call(self, env).await
    }

    async fn recover(&self, env: &mut WardenEnv) {
        Warden::recover(self, env).await;
    }
}
