//! Error types for scope lifecycle and pipeline execution.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use convoy_client::ClientError;
use convoy_core::component::ComponentKind;
use convoy_core::datadir::DataDirError;
use convoy_core::dynamic::InvokeError;
use convoy_core::errors::{ErrorList, SharedError};
use convoy_core::factory::FactoryError;

/// Errors raised by scope construction and operations.
#[derive(Debug, Error)]
pub enum ScopeError {
    /// Aggregate of every option that failed to apply.
    #[error("scope options failed: {0}")]
    Options(ErrorList),

    #[error("scope record was not properly loaded")]
    MissingRecord,

    #[error("client was not provided")]
    MissingClient,

    #[error("data directory was not provided")]
    MissingDataDir,

    /// A record lookup by resource id came back empty.
    #[error("requested record was not found: {0}")]
    RecordNotFound(String),

    #[error("scope is closed")]
    Closed,

    #[error("component does not support specialization")]
    NotSpecializable,

    #[error("component is not a {0} plugin")]
    ComponentMismatch(ComponentKind),

    #[error("task failed with exit code {0}")]
    TaskFailed(i64),

    #[error("no host plugin detected")]
    HostNotFound,

    /// Failure reported by a plugin close hook.
    #[error("{0}")]
    Plugin(SharedError),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Factory(#[from] FactoryError),

    #[error(transparent)]
    Invoke(#[from] InvokeError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    DataDir(#[from] DataDirError),
}

/// Failure raised while executing a middleware pipeline.
///
/// Clones share the same inner value, so the error recorded on a pipeline
/// environment compares identical to the one re-raised through nested
/// pipelines and is never logged twice.
#[derive(Clone)]
pub struct PipelineError {
    inner: Arc<PipelineErrorKind>,
}

#[derive(Debug, Error)]
pub enum PipelineErrorKind {
    /// Raised at an interrupt checkpoint; runs recovery like any other
    /// failure but is not itself recoverable.
    #[error("pipeline interrupted")]
    Interrupt,

    /// Process exit request; propagates without recovery.
    #[error("process exit requested with code {0}")]
    Exit(i32),

    /// A stage descriptor could not be finalized.
    #[error("invalid pipeline stage: {0}")]
    InvalidStage(String),

    /// Failure raised by a stage, carried verbatim.
    #[error("{0}")]
    Failure(Box<dyn std::error::Error + Send + Sync>),

    /// Plain message failure.
    #[error("{0}")]
    Message(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    fn from_kind(kind: PipelineErrorKind) -> Self {
        Self {
            inner: Arc::new(kind),
        }
    }

    pub fn interrupt() -> Self {
        Self::from_kind(PipelineErrorKind::Interrupt)
    }

    pub fn exit(code: i32) -> Self {
        Self::from_kind(PipelineErrorKind::Exit(code))
    }

    pub fn invalid_stage(reason: impl Into<String>) -> Self {
        Self::from_kind(PipelineErrorKind::InvalidStage(reason.into()))
    }

    pub fn failure<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::from_kind(PipelineErrorKind::Failure(Box::new(err)))
    }

    pub fn message(msg: impl Into<String>) -> Self {
        Self::from_kind(PipelineErrorKind::Message(msg.into()))
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::from_kind(PipelineErrorKind::Internal(msg.into()))
    }

    pub fn kind(&self) -> &PipelineErrorKind {
        &self.inner
    }

    pub fn is_interrupt(&self) -> bool {
        matches!(*self.inner, PipelineErrorKind::Interrupt)
    }

    pub fn is_exit(&self) -> bool {
        matches!(*self.inner, PipelineErrorKind::Exit(_))
    }

    /// Whether two values are the same failure, not merely equal text.
    pub fn same(&self, other: &PipelineError) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_compare_identical_but_rebuilt_errors_do_not() {
        let err = PipelineError::message("boom");
        let clone = err.clone();
        assert!(err.same(&clone));

        let rebuilt = PipelineError::message("boom");
        assert!(!err.same(&rebuilt));
        assert_eq!(err.to_string(), rebuilt.to_string());
    }

    #[test]
    fn test_kind_predicates() {
        assert!(PipelineError::interrupt().is_interrupt());
        assert!(PipelineError::exit(2).is_exit());
        assert!(!PipelineError::message("x").is_exit());
    }
}
