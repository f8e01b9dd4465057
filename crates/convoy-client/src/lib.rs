//! # Convoy Client
//!
//! Thin remote handle over the convoy server: scope records (basis,
//! project, target), the persistence contract the core consumes, and an
//! in-memory server for development and testing.
//!
//! Records are treated as opaque blobs beyond the fields named here; the
//! transport behind [`ServerClient`] is invisible to the core.

mod mappers;
mod memory;

pub use mappers::ref_mappers;
pub use memory::InMemoryServer;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Client call errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("call cancelled")]
    Cancelled,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Reference to a basis record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BasisRef {
    pub name: String,
    #[serde(default)]
    pub resource_id: String,
}

/// Reference to a project record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub name: String,
    #[serde(default)]
    pub resource_id: String,
}

/// Reference to a target record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetRef {
    pub name: String,
    #[serde(default)]
    pub resource_id: String,
}

/// Basis record as stored by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasisRecord {
    pub name: String,
    #[serde(default)]
    pub resource_id: String,
    pub path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BasisRecord {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            resource_id: String::new(),
            path: path.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn to_ref(&self) -> BasisRef {
        BasisRef {
            name: self.name.clone(),
            resource_id: self.resource_id.clone(),
        }
    }
}

/// Project record as stored by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub name: String,
    #[serde(default)]
    pub resource_id: String,
    pub path: String,
    #[serde(default)]
    pub basis: BasisRef,
    #[serde(default)]
    pub targets: Vec<TargetRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectRecord {
    pub fn new(name: impl Into<String>, path: impl Into<String>, basis: BasisRef) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            resource_id: String::new(),
            path: path.into(),
            basis,
            targets: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn to_ref(&self) -> ProjectRef {
        ProjectRef {
            name: self.name.clone(),
            resource_id: self.resource_id.clone(),
        }
    }
}

/// Target record as stored by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub name: String,
    #[serde(default)]
    pub resource_id: String,
    #[serde(default)]
    pub project: ProjectRef,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TargetRecord {
    pub fn new(name: impl Into<String>, project: ProjectRef) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            resource_id: String::new(),
            project,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn to_ref(&self) -> TargetRef {
        TargetRef {
            name: self.name.clone(),
            resource_id: self.resource_id.clone(),
        }
    }
}

/// Persistence contract consumed by the scope lifecycle.
///
/// `find_*` calls resolve to `None` for absent records; `get_*` calls fail
/// with [`ClientError::NotFound`]. Upserts mint a resource id when the
/// record carries none and are idempotent for unchanged records.
#[async_trait]
pub trait ServerClient: Send + Sync {
    /// Address of the backing service, stamped onto specialized plugins.
    fn endpoint(&self) -> String;

    async fn upsert_basis(
        &self,
        ctx: &CancellationToken,
        record: BasisRecord,
    ) -> Result<BasisRecord, ClientError>;

    async fn get_basis(
        &self,
        ctx: &CancellationToken,
        basis: &BasisRef,
    ) -> Result<BasisRecord, ClientError>;

    async fn find_basis(
        &self,
        ctx: &CancellationToken,
        resource_id: &str,
    ) -> Result<Option<BasisRecord>, ClientError>;

    async fn upsert_project(
        &self,
        ctx: &CancellationToken,
        record: ProjectRecord,
    ) -> Result<ProjectRecord, ClientError>;

    async fn get_project(
        &self,
        ctx: &CancellationToken,
        project: &ProjectRef,
    ) -> Result<ProjectRecord, ClientError>;

    async fn find_project(
        &self,
        ctx: &CancellationToken,
        resource_id: &str,
    ) -> Result<Option<ProjectRecord>, ClientError>;

    async fn upsert_target(
        &self,
        ctx: &CancellationToken,
        record: TargetRecord,
    ) -> Result<TargetRecord, ClientError>;

    async fn get_target(
        &self,
        ctx: &CancellationToken,
        target: &TargetRef,
    ) -> Result<TargetRecord, ClientError>;

    async fn find_target(
        &self,
        ctx: &CancellationToken,
        resource_id: &str,
    ) -> Result<Option<TargetRecord>, ClientError>;
}
