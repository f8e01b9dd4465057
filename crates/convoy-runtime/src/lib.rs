//! # Convoy Runtime
//!
//! Scope lifecycle and pipeline execution for the convoy orchestrator.
//!
//! This crate provides:
//! - Basis (root scope), Project, and Target lifecycle management
//! - Task dispatch against command plugins through the dynamic invoker
//! - The action warden: middleware pipelines with two-phase recovery
//! - Trigger hooks wrapped around named pipeline stages

mod basis;
mod error;
mod project;
mod target;
mod warden;

pub use basis::{Basis, BasisBuilder, BasisOption, Closer};
pub use error::{PipelineError, PipelineErrorKind, ScopeError};
pub use project::{Project, ProjectOption};
pub use target::{Target, TargetOption};
pub use warden::{
    CallFn, ConfigTriggers, Middleware, NoopTriggers, StageSpec, TriggerSpec, Warden, WardenEnv,
};

// Re-export core types for convenience
pub use convoy_core::prelude::*;
