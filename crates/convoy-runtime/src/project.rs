//! Project scope
//!
//! A project is a child scope of a basis: it shares the parent's client,
//! context, UI, factories, and mappers by reference, owns its targets, and
//! follows the same close/save lifecycle shape. Projects cannot exist
//! without a parent basis and close as part of the basis close cascade.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use convoy_client::{ProjectRecord, ProjectRef, ServerClient};
use convoy_core::datadir::DataDir;
use convoy_core::dynamic::ArgMapper;
use convoy_core::errors::ErrorList;
use convoy_core::factory::FactoryRegistry;
use convoy_core::plugin::PluginInstance;
use convoy_core::ui::Ui;

use crate::basis::{Basis, Closer};
use crate::error::ScopeError;
use crate::target::{apply_target_option, Target, TargetOption, TargetParts};

/// Options applied, in order, while loading a project.
pub enum ProjectOption {
    /// Resolve the project record from a reference: upsert when it carries
    /// no resource id, fetch otherwise.
    Ref(ProjectRef),
    /// Resolve the project record by resource id; an absent record is
    /// fatal.
    ResourceId(String),
    DataDir(DataDir),
}

#[derive(Default)]
pub(crate) struct ProjectParts {
    pub(crate) record: Option<ProjectRecord>,
    pub(crate) dir: Option<DataDir>,
}

pub(crate) async fn apply_project_option(
    parts: &mut ProjectParts,
    basis: &Arc<Basis>,
    option: ProjectOption,
) -> Result<(), ScopeError> {
    match option {
        ProjectOption::DataDir(dir) => parts.dir = Some(dir),
        ProjectOption::Ref(project_ref) => {
            let client = basis.client();
            let record = if project_ref.resource_id.is_empty() {
                client
                    .upsert_project(
                        basis.context(),
                        ProjectRecord::new(
                            project_ref.name.clone(),
                            project_ref.name.clone(),
                            basis.record_ref(),
                        ),
                    )
                    .await?
            } else {
                client.get_project(basis.context(), &project_ref).await?
            };
            parts.record = Some(record);
        }
        ProjectOption::ResourceId(resource_id) => {
            match basis
                .client()
                .find_project(basis.context(), &resource_id)
                .await?
            {
                Some(record) => parts.record = Some(record),
                None => {
                    tracing::error!(resource_id = %resource_id, "failed to locate project during setup");
                    return Err(ScopeError::RecordNotFound(resource_id));
                }
            }
        }
    }
    Ok(())
}

#[derive(Default)]
struct TargetIndex {
    by_key: HashMap<String, Arc<Target>>,
    ordered: Vec<Arc<Target>>,
}

/// A child scope of a basis owning targets and project-scoped plugin
/// state.
pub struct Project {
    basis: Weak<Basis>,
    record: RwLock<ProjectRecord>,
    log_target: String,
    dir: DataDir,
    ctx: CancellationToken,
    client: Arc<dyn ServerClient>,
    ui: Arc<dyn Ui>,
    factories: Arc<FactoryRegistry>,
    mappers: Vec<Arc<dyn ArgMapper>>,
    targets: RwLock<TargetIndex>,
    closers: Mutex<Vec<Closer>>,
    close_lock: tokio::sync::Mutex<()>,
    closed: AtomicBool,
}

impl Project {
    pub(crate) fn create(basis: &Arc<Basis>, record: ProjectRecord, dir: DataDir) -> Arc<Self> {
        let log_target = if tracing::enabled!(tracing::Level::TRACE) {
            "project".to_string()
        } else {
            "convoy.core.project".to_string()
        };
        Arc::new(Self {
            basis: Arc::downgrade(basis),
            record: RwLock::new(record),
            log_target,
            dir,
            ctx: basis.context().clone(),
            client: basis.client(),
            ui: basis.ui(),
            factories: basis.factories().clone(),
            mappers: basis.mappers().to_vec(),
            targets: RwLock::new(TargetIndex::default()),
            closers: Mutex::new(Vec::new()),
            close_lock: tokio::sync::Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> String {
        self.record
            .read()
            .expect("project record poisoned")
            .name
            .clone()
    }

    pub fn resource_id(&self) -> String {
        self.record
            .read()
            .expect("project record poisoned")
            .resource_id
            .clone()
    }

    pub fn record_ref(&self) -> ProjectRef {
        self.record.read().expect("project record poisoned").to_ref()
    }

    /// The owning basis, while it is still alive.
    pub fn basis(&self) -> Option<Arc<Basis>> {
        self.basis.upgrade()
    }

    pub fn data_dir(&self) -> &DataDir {
        &self.dir
    }

    pub fn ui(&self) -> Arc<dyn Ui> {
        self.ui.clone()
    }

    pub fn context(&self) -> &CancellationToken {
        &self.ctx
    }

    pub fn client(&self) -> Arc<dyn ServerClient> {
        self.client.clone()
    }

    pub fn factories(&self) -> &Arc<FactoryRegistry> {
        &self.factories
    }

    pub(crate) fn mappers(&self) -> &[Arc<dyn ArgMapper>] {
        &self.mappers
    }

    /// Stamp request-scoped metadata onto a plugin before dispatch on
    /// behalf of this project.
    pub fn specialize(&self, instance: &PluginInstance) -> Result<(), ScopeError> {
        let metadata = instance
            .component()
            .request_metadata()
            .ok_or(ScopeError::NotSpecializable)?;
        let record = self
            .record
            .read()
            .map_err(|e| ScopeError::Internal(e.to_string()))?;
        metadata.set_request_metadata("basis_resource_id", &record.basis.resource_id);
        metadata.set_request_metadata("vagrant_service_endpoint", &self.client.endpoint());
        metadata.set_request_metadata("project_resource_id", &record.resource_id);
        Ok(())
    }

    /// Register a deferred callable to run once when the project closes.
    pub fn closer(
        &self,
        closer: impl FnOnce() -> BoxFuture<'static, Result<(), ScopeError>> + Send + 'static,
    ) {
        self.closers
            .lock()
            .expect("project closers poisoned")
            .push(Box::new(closer));
    }

    /// Look up a loaded target by name or resource id.
    pub fn target(&self, name_or_id: &str) -> Option<Arc<Target>> {
        self.targets.read().ok()?.by_key.get(name_or_id).cloned()
    }

    /// Load a target into this project, idempotent by resource id.
    pub async fn load_target(
        self: &Arc<Self>,
        options: Vec<TargetOption>,
    ) -> Result<Arc<Target>, ScopeError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ScopeError::Closed);
        }

        let mut parts = TargetParts::default();
        let mut errs = ErrorList::new();
        for option in options {
            if let Err(err) = apply_target_option(&mut parts, self, option).await {
                errs.push(err);
            }
        }
        errs.into_result().map_err(ScopeError::Options)?;

        let record = parts.record.ok_or(ScopeError::MissingRecord)?;
        if let Some(existing) = self.target(&record.resource_id) {
            return Ok(existing);
        }

        let dir = match parts.dir {
            Some(dir) => dir,
            None => self.dir.target(&record.name)?,
        };
        let target = Target::create(self, record.clone(), dir);

        {
            let mut index = self
                .targets
                .write()
                .map_err(|e| ScopeError::Internal(e.to_string()))?;
            index.by_key.insert(record.name.clone(), target.clone());
            index
                .by_key
                .insert(record.resource_id.clone(), target.clone());
            index.ordered.push(target.clone());
        }

        // Track the target on the project record for the next save.
        {
            let mut rec = self
                .record
                .write()
                .map_err(|e| ScopeError::Internal(e.to_string()))?;
            if !rec
                .targets
                .iter()
                .any(|t| t.resource_id == record.resource_id)
            {
                rec.targets.push(record.to_ref());
            }
        }

        // Persist target mutations when it closes.
        let weak = Arc::downgrade(&target);
        target.closer(move || {
            Box::pin(async move {
                match weak.upgrade() {
                    Some(target) => target.save_record().await,
                    None => Ok(()),
                }
            })
        });

        Ok(target)
    }

    /// Close the project: loaded targets close first, then registered
    /// closers run in registration order. Failures are aggregated and
    /// returned, never raised.
    pub async fn close(&self) -> Result<(), ErrorList> {
        let _guard = self.close_lock.lock().await;
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        tracing::debug!(component = %self.log_target, project = %self.resource_id(), "closing project");

        let mut errs = ErrorList::new();
        let targets: Vec<Arc<Target>> = match self.targets.read() {
            Ok(index) => index.ordered.clone(),
            Err(err) => {
                errs.push(ScopeError::Internal(err.to_string()));
                Vec::new()
            }
        };
        for target in targets {
            if let Err(err) = target.close().await {
                tracing::warn!(target = %target.name(), error = %err, "error closing target");
                errs.merge(err);
            }
        }

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
        tracing::debug!(component = %self.log_target, project = %self.resource_id(), "saving project");
        let record = self
            .record
            .read()
            .map_err(|e| ScopeError::Internal(e.to_string()))?
            .clone();
        let updated = self.client.upsert_project(&self.ctx, record).await?;
        *self
            .record
            .write()
            .map_err(|e| ScopeError::Internal(e.to_string()))? = updated;
        Ok(())
    }

    /// Persist the project record. Saving a closed project is undefined
    /// and reported as an error.
    pub async fn save(&self) -> Result<(), ScopeError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ScopeError::Closed);
        }
        self.save_record().await
    }

    /// Persist every loaded target, then the project itself, aggregating
    /// failures.
    pub async fn save_full(&self) -> Result<(), ErrorList> {
        let mut errs = ErrorList::new();
        if self.closed.load(Ordering::Acquire) {
            errs.push(ScopeError::Closed);
            return errs.into_result();
        }

        let targets: Vec<Arc<Target>> = match self.targets.read() {
            Ok(index) => index.ordered.clone(),
            Err(err) => {
                errs.push(ScopeError::Internal(err.to_string()));
                Vec::new()
            }
        };
        for target in targets {
            if let Err(err) = target.save().await {
                errs.push(err);
            }
        }
        if let Err(err) = self.save_record().await {
            errs.push(err);
        }
        errs.into_result()
    }
}
