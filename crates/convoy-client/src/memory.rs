//! In-memory server implementation for development and testing.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::{
    BasisRecord, BasisRef, ClientError, ProjectRecord, ProjectRef, ServerClient, TargetRecord,
    TargetRef,
};

fn check_ctx(ctx: &CancellationToken) -> Result<(), ClientError> {
    if ctx.is_cancelled() {
        return Err(ClientError::Cancelled);
    }
    Ok(())
}

fn mint_resource_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// In-memory [`ServerClient`] keyed by resource id.
pub struct InMemoryServer {
    endpoint: String,
    bases: RwLock<HashMap<String, BasisRecord>>,
    projects: RwLock<HashMap<String, ProjectRecord>>,
    targets: RwLock<HashMap<String, TargetRecord>>,
}

impl InMemoryServer {
    pub fn new() -> Self {
        Self {
            endpoint: "memory://localhost".to_string(),
            bases: RwLock::new(HashMap::new()),
            projects: RwLock::new(HashMap::new()),
            targets: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::new()
        }
    }
}

impl Default for InMemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServerClient for InMemoryServer {
    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    async fn upsert_basis(
        &self,
        ctx: &CancellationToken,
        mut record: BasisRecord,
    ) -> Result<BasisRecord, ClientError> {
        check_ctx(ctx)?;
        let mut bases = self
            .bases
            .write()
            .map_err(|e| ClientError::Internal(e.to_string()))?;
        if record.resource_id.is_empty() {
            record.resource_id = mint_resource_id();
        }
        match bases.get(&record.resource_id) {
            // Unchanged upserts leave the stored record untouched.
            Some(stored) if stored.name == record.name && stored.path == record.path => {
                Ok(stored.clone())
            }
            Some(stored) => {
                let mut updated = record;
                updated.created_at = stored.created_at;
                updated.updated_at = Utc::now();
                bases.insert(updated.resource_id.clone(), updated.clone());
                Ok(updated)
            }
            None => {
                bases.insert(record.resource_id.clone(), record.clone());
                Ok(record)
            }
        }
    }

    async fn get_basis(
        &self,
        ctx: &CancellationToken,
        basis: &BasisRef,
    ) -> Result<BasisRecord, ClientError> {
        check_ctx(ctx)?;
        let bases = self
            .bases
            .read()
            .map_err(|e| ClientError::Internal(e.to_string()))?;
        if !basis.resource_id.is_empty() {
            return bases
                .get(&basis.resource_id)
                .cloned()
                .ok_or_else(|| ClientError::NotFound(basis.resource_id.clone()));
        }
        bases
            .values()
            .find(|r| r.name == basis.name)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(basis.name.clone()))
    }

    async fn find_basis(
        &self,
        ctx: &CancellationToken,
        resource_id: &str,
    ) -> Result<Option<BasisRecord>, ClientError> {
        check_ctx(ctx)?;
        let bases = self
            .bases
            .read()
            .map_err(|e| ClientError::Internal(e.to_string()))?;
        Ok(bases.get(resource_id).cloned())
    }

    async fn upsert_project(
        &self,
        ctx: &CancellationToken,
        mut record: ProjectRecord,
    ) -> Result<ProjectRecord, ClientError> {
        check_ctx(ctx)?;
        let mut projects = self
            .projects
            .write()
            .map_err(|e| ClientError::Internal(e.to_string()))?;
        if record.resource_id.is_empty() {
            record.resource_id = mint_resource_id();
        }
        match projects.get(&record.resource_id) {
            Some(stored)
                if stored.name == record.name
                    && stored.path == record.path
                    && stored.targets == record.targets =>
            {
                Ok(stored.clone())
            }
            Some(stored) => {
                let mut updated = record;
                updated.created_at = stored.created_at;
                updated.updated_at = Utc::now();
                projects.insert(updated.resource_id.clone(), updated.clone());
                Ok(updated)
            }
            None => {
                projects.insert(record.resource_id.clone(), record.clone());
                Ok(record)
            }
        }
    }

    async fn get_project(
        &self,
        ctx: &CancellationToken,
        project: &ProjectRef,
    ) -> Result<ProjectRecord, ClientError> {
        check_ctx(ctx)?;
        let projects = self
            .projects
            .read()
            .map_err(|e| ClientError::Internal(e.to_string()))?;
        if !project.resource_id.is_empty() {
            return projects
                .get(&project.resource_id)
                .cloned()
                .ok_or_else(|| ClientError::NotFound(project.resource_id.clone()));
        }
        projects
            .values()
            .find(|r| r.name == project.name)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(project.name.clone()))
    }

    async fn find_project(
        &self,
        ctx: &CancellationToken,
        resource_id: &str,
    ) -> Result<Option<ProjectRecord>, ClientError> {
        check_ctx(ctx)?;
        let projects = self
            .projects
            .read()
            .map_err(|e| ClientError::Internal(e.to_string()))?;
        Ok(projects.get(resource_id).cloned())
    }

    async fn upsert_target(
        &self,
        ctx: &CancellationToken,
        mut record: TargetRecord,
    ) -> Result<TargetRecord, ClientError> {
        check_ctx(ctx)?;
        let mut targets = self
            .targets
            .write()
            .map_err(|e| ClientError::Internal(e.to_string()))?;
        if record.resource_id.is_empty() {
            record.resource_id = mint_resource_id();
        }
        match targets.get(&record.resource_id) {
            Some(stored) if stored.name == record.name && stored.project == record.project => {
                Ok(stored.clone())
            }
            Some(stored) => {
                let mut updated = record;
                updated.created_at = stored.created_at;
                updated.updated_at = Utc::now();
                targets.insert(updated.resource_id.clone(), updated.clone());
                Ok(updated)
            }
            None => {
                targets.insert(record.resource_id.clone(), record.clone());
                Ok(record)
            }
        }
    }

    async fn get_target(
        &self,
        ctx: &CancellationToken,
        target: &TargetRef,
    ) -> Result<TargetRecord, ClientError> {
        check_ctx(ctx)?;
        let targets = self
            .targets
            .read()
            .map_err(|e| ClientError::Internal(e.to_string()))?;
        if !target.resource_id.is_empty() {
            return targets
                .get(&target.resource_id)
                .cloned()
                .ok_or_else(|| ClientError::NotFound(target.resource_id.clone()));
        }
        targets
            .values()
            .find(|r| r.name == target.name)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(target.name.clone()))
    }

    async fn find_target(
        &self,
        ctx: &CancellationToken,
        resource_id: &str,
    ) -> Result<Option<TargetRecord>, ClientError> {
        check_ctx(ctx)?;
        let targets = self
            .targets
            .read()
            .map_err(|e| ClientError::Internal(e.to_string()))?;
        Ok(targets.get(resource_id).cloned())
    }
}
