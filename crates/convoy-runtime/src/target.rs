//! Target scope
//!
//! Targets are the leaf scopes: one per workload under a project, carrying
//! a server record, a data directory, and the same closer discipline as
//! their parents.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use convoy_client::{ServerClient, TargetRecord, TargetRef};
use convoy_core::datadir::DataDir;
use convoy_core::errors::ErrorList;

use crate::basis::Closer;
use crate::error::ScopeError;
use crate::project::Project;

/// Options applied, in order, while loading a target.
pub enum TargetOption {
    /// Resolve the target record from a reference: upsert when it carries
    /// no resource id, fetch otherwise.
    Ref(TargetRef),
    DataDir(DataDir),
}

#[derive(Default)]
pub(crate) struct TargetParts {
    pub(crate) record: Option<TargetRecord>,
    pub(crate) dir: Option<DataDir>,
}

pub(crate) async fn apply_target_option(
    parts: &mut TargetParts,
    project: &Arc<Project>,
    option: TargetOption,
) -> Result<(), ScopeError> {
    match option {
        TargetOption::DataDir(dir) => parts.dir = Some(dir),
        TargetOption::Ref(target_ref) => {
            let client = project.client();
            let record = if target_ref.resource_id.is_empty() {
                client
                    .upsert_target(
                        project.context(),
                        TargetRecord::new(target_ref.name.clone(), project.record_ref()),
                    )
                    .await?
            } else {
                client.get_target(project.context(), &target_ref).await?
            };
            parts.record = Some(record);
        }
    }
    Ok(())
}

/// A workload scope owned by exactly one project.
pub struct Target {
    project: Weak<Project>,
    record: RwLock<TargetRecord>,
    dir: DataDir,
    ctx: CancellationToken,
    client: Arc<dyn ServerClient>,
    closers: Mutex<Vec<Closer>>,
    close_lock: tokio::sync::Mutex<()>,
    closed: AtomicBool,
}

impl Target {
    pub(crate) fn create(project: &Arc<Project>, record: TargetRecord, dir: DataDir) -> Arc<Self> {
        Arc::new(Self {
            project: Arc::downgrade(project),
            record: RwLock::new(record),
            dir,
            ctx: project.context().clone(),
            client: project.client(),
            closers: Mutex::new(Vec::new()),
            close_lock: tokio::sync::Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> String {
        self.record
            .read()
            .expect("target record poisoned")
            .name
            .clone()
    }

    pub fn resource_id(&self) -> String {
        self.record
            .read()
            .expect("target record poisoned")
            .resource_id
            .clone()
    }

    pub fn record_ref(&self) -> TargetRef {
        self.record.read().expect("target record poisoned").to_ref()
    }

    /// The owning project, while it is still alive.
    pub fn project(&self) -> Option<Arc<Project>> {
        self.project.upgrade()
    }

    pub fn data_dir(&self) -> &DataDir {
        &self.dir
    }

    /// Register a deferred callable to run once when the target closes.
    pub fn closer(
        &self,
        closer: impl FnOnce() -> BoxFuture<'static, Result<(), ScopeError>> + Send + 'static,
    ) {
        self.closers
            .lock()
            .expect("target closers poisoned")
            .push(Box::new(closer));
    }

    /// Run registered closers once; failures aggregate and return.
    pub async fn close(&self) -> Result<(), ErrorList> {
        let _guard = self.close_lock.lock().await;
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        tracing::debug!(target = %self.resource_id(), "closing target");

        let mut errs = ErrorList::new();
        let closers = match self.closers.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(err) => {
                errs.push(ScopeError::Internal(err.to_string()));
                Vec::new()
            }
        };
        for closer in closers {
            if let Err(err) = closer().await {
                tracing::warn!(error = %err, "error executing closer");
                errs.push(err);
            }
        }

        self.closed.store(true, Ordering::Release);
        errs.into_result()
    }

    pub(crate) async fn save_record(&self) -> Result<(), ScopeError> {
        tracing::debug!(target = %self.resource_id(), "saving target");
        let record = self
            .record
            .read()
            .map_err(|e| ScopeError::Internal(e.to_string()))?
            .clone();
        let updated = self.client.upsert_target(&self.ctx, record).await?;
        *self
            .record
            .write()
            .map_err(|e| ScopeError::Internal(e.to_string()))? = updated;
        Ok(())
    }

    /// Persist the target record. Saving a closed target is undefined and
    /// reported as an error.
    pub async fn save(&self) -> Result<(), ScopeError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ScopeError::Closed);
        }
        self.save_record().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use convoy_client::{BasisRef, InMemoryServer, ProjectRef};
    use crate::basis::Basis;
    use crate::project::ProjectOption;

    async fn test_target(dir: &tempfile::TempDir) -> (Arc<Basis>, Arc<Target>) {
        let basis = Basis::builder(CancellationToken::new())
            .with_client(Arc::new(InMemoryServer::new()))
            .with_data_dir(DataDir::new(dir.path()).expect("data dir"))
            .with_basis_ref(BasisRef {
                name: "dev".to_string(),
                resource_id: String::new(),
            })
            .build()
            .await
            .expect("basis");
        let project = basis
            .load_project(vec![ProjectOption::Ref(ProjectRef {
                name: "web".to_string(),
                resource_id: String::new(),
            })])
            .await
            .expect("project");
        let target = project
            .load_target(vec![TargetOption::Ref(TargetRef {
                name: "default".to_string(),
                resource_id: String::new(),
            })])
            .await
            .expect("target");
        (basis, target)
    }

    #[tokio::test]
    async fn test_target_record_resolves_with_a_resource_id() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (_basis, target) = test_target(&dir).await;
        assert_eq!(target.name(), "default");
        assert!(!target.resource_id().is_empty());
        assert!(target.project().is_some());
    }

    #[tokio::test]
    async fn test_close_aggregates_closer_failures_and_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (_basis, target) = test_target(&dir).await;

        let runs = Arc::new(StdMutex::new(0_u32));
        {
            let runs = runs.clone();
            target.closer(move || {
                Box::pin(async move {
                    *runs.lock().expect("runs") += 1;
                    Err(ScopeError::RecordNotFound("boom".to_string()))
                })
            });
        }

        let err = target.close().await.expect_err("aggregate");
        assert!(err.to_string().contains("boom"));
        target.close().await.expect("second close is empty");
        assert_eq!(*runs.lock().expect("runs"), 1);
    }

    #[tokio::test]
    async fn test_save_round_trips_through_the_client() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (basis, target) = test_target(&dir).await;

        target.save().await.expect("save");
        let stored = basis
            .client()
            .find_target(basis.context(), &target.resource_id())
            .await
            .expect("find");
        assert!(stored.is_some());
    }
}
