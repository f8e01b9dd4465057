//! Basis scope
//!
//! The basis is the root scope of the orchestrator: it owns the plugin
//! factories and argument mappers, resolves its server-side record through
//! the client, loads projects, and dispatches tasks against command
//! plugins. Closing a basis cascades: loaded projects close first, then
//! every registered closer runs exactly once, with failures aggregated
//! rather than raised.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use convoy_client::{BasisRecord, BasisRef, ServerClient};
use convoy_config::Config;
use convoy_core::component::{
    flags_to_wire, flatten_command_info, CliArgs, CommandInfo, CommandRecord, ComponentKind,
    FlagMapper, JobInfo, Task,
};
use convoy_core::datadir::DataDir;
use convoy_core::dynamic::{self, ArgMapper, CallArgs, DynamicFunc, InvokeError};
use convoy_core::errors::ErrorList;
use convoy_core::factory::{Factory, FactoryRegistry};
use convoy_core::logger::PluginLogger;
use convoy_core::mappers::CommandArgsMapper;
use convoy_core::plugin::{PluginComponent, PluginInstance};
use convoy_core::ui::{ConsoleUi, StatusGuard, Ui};

use crate::error::ScopeError;
use crate::project::{apply_project_option, Project, ProjectOption, ProjectParts};

/// Deferred callable registered with a scope, invoked once during close.
pub type Closer = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), ScopeError>> + Send>;

/// Options applied, in order, while constructing a basis.
pub enum BasisOption {
    Client(Arc<dyn ServerClient>),
    Ui(Arc<dyn Ui>),
    DataDir(DataDir),
    Factories(Arc<FactoryRegistry>),
    Factory(ComponentKind, String, Factory),
    Mappers(Vec<Arc<dyn ArgMapper>>),
    Config(Config),
    JobInfo(JobInfo),
    FlagMapper(FlagMapper),
    /// Resolve the basis record from a reference: upsert when it carries no
    /// resource id, fetch otherwise. Defaults the data directory from the
    /// record path when none is set yet.
    Ref(BasisRef),
    /// Resolve the basis record by resource id; an absent record is fatal.
    ResourceId(String),
}

#[derive(Default)]
struct BasisParts {
    record: Option<BasisRecord>,
    client: Option<Arc<dyn ServerClient>>,
    dir: Option<DataDir>,
    ui: Option<Arc<dyn Ui>>,
    factories: Option<Arc<FactoryRegistry>>,
    mappers: Vec<Arc<dyn ArgMapper>>,
    config: Option<Config>,
    job_info: JobInfo,
    flag_mapper: Option<FlagMapper>,
}

async fn apply_option(
    parts: &mut BasisParts,
    ctx: &CancellationToken,
    option: BasisOption,
) -> Result<(), ScopeError> {
    match option {
        BasisOption::Client(client) => parts.client = Some(client),
        BasisOption::Ui(ui) => parts.ui = Some(ui),
        BasisOption::DataDir(dir) => parts.dir = Some(dir),
        BasisOption::Factories(factories) => parts.factories = Some(factories),
        BasisOption::Factory(kind, name, factory) => {
            parts
                .factories
                .get_or_insert_with(|| Arc::new(FactoryRegistry::new()))
                .register(kind, name, factory)?;
        }
        BasisOption::Mappers(mappers) => parts.mappers.extend(mappers),
        BasisOption::Config(config) => parts.config = Some(config),
        BasisOption::JobInfo(job_info) => parts.job_info = job_info,
        BasisOption::FlagMapper(mapper) => parts.flag_mapper = Some(mapper),
        BasisOption::Ref(basis_ref) => {
            let client = parts.client.clone().ok_or(ScopeError::MissingClient)?;
            let record = if basis_ref.resource_id.is_empty() {
                client
                    .upsert_basis(
                        ctx,
                        BasisRecord::new(basis_ref.name.clone(), basis_ref.name.clone()),
                    )
                    .await?
            } else {
                client.get_basis(ctx, &basis_ref).await?
            };
            if parts.dir.is_none() {
                parts.dir = Some(DataDir::new(&record.path)?);
            }
            parts.record = Some(record);
        }
        BasisOption::ResourceId(resource_id) => {
            let client = parts.client.clone().ok_or(ScopeError::MissingClient)?;
            match client.find_basis(ctx, &resource_id).await? {
                Some(record) => parts.record = Some(record),
                None => {
                    tracing::error!(resource_id = %resource_id, "failed to locate basis during setup");
                    return Err(ScopeError::RecordNotFound(resource_id));
                }
            }
        }
    }
    Ok(())
}

/// Builder applying [`BasisOption`]s in order.
pub struct BasisBuilder {
    ctx: CancellationToken,
    options: Vec<BasisOption>,
}

impl BasisBuilder {
    pub fn new(ctx: CancellationToken) -> Self {
        Self {
            ctx,
            options: Vec::new(),
        }
    }

    pub fn with_option(mut self, option: BasisOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn with_client(self, client: Arc<dyn ServerClient>) -> Self {
        self.with_option(BasisOption::Client(client))
    }

    pub fn with_ui(self, ui: Arc<dyn Ui>) -> Self {
        self.with_option(BasisOption::Ui(ui))
    }

    pub fn with_data_dir(self, dir: DataDir) -> Self {
        self.with_option(BasisOption::DataDir(dir))
    }

    pub fn with_factories(self, factories: Arc<FactoryRegistry>) -> Self {
        self.with_option(BasisOption::Factories(factories))
    }

    pub fn with_factory(
        self,
        kind: ComponentKind,
        name: impl Into<String>,
        factory: Factory,
    ) -> Self {
        self.with_option(BasisOption::Factory(kind, name.into(), factory))
    }

    pub fn with_mappers(self, mappers: Vec<Arc<dyn ArgMapper>>) -> Self {
        self.with_option(BasisOption::Mappers(mappers))
    }

    pub fn with_config(self, config: Config) -> Self {
        self.with_option(BasisOption::Config(config))
    }

    pub fn with_job_info(self, job_info: JobInfo) -> Self {
        self.with_option(BasisOption::JobInfo(job_info))
    }

    pub fn with_basis_ref(self, basis_ref: BasisRef) -> Self {
        self.with_option(BasisOption::Ref(basis_ref))
    }

    pub fn with_resource_id(self, resource_id: impl Into<String>) -> Self {
        self.with_option(BasisOption::ResourceId(resource_id.into()))
    }

    /// Apply every queued option in order, then enforce the basis
    /// invariants. Option failures are aggregated so the caller sees every
    /// misuse at once.
    pub async fn build(self) -> Result<Arc<Basis>, ScopeError> {
        let ctx = self.ctx;
        let mut parts = BasisParts::default();
        let mut errs = ErrorList::new();
        for option in self.options {
            if let Err(err) = apply_option(&mut parts, &ctx, option).await {
                errs.push(err);
            }
        }
        errs.into_result().map_err(ScopeError::Options)?;

        let log_target = if tracing::enabled!(tracing::Level::TRACE) {
            "basis".to_string()
        } else {
            "convoy.core.basis".to_string()
        };

        let record = parts.record.ok_or(ScopeError::MissingRecord)?;
        let client = parts.client.ok_or(ScopeError::MissingClient)?;
        let dir = parts.dir.ok_or(ScopeError::MissingDataDir)?;
        let ui = parts
            .ui
            .unwrap_or_else(|| Arc::new(ConsoleUi::new(ctx.clone())) as Arc<dyn Ui>);

        let mut mappers = parts.mappers;
        if mappers.is_empty() {
            mappers = convoy_client::ref_mappers();
        }
        mappers.push(Arc::new(CommandArgsMapper));

        let config = match parts.config {
            Some(config) => config,
            None => {
                let path = dir.root().join("convoy.yaml");
                match convoy_config::load_config(&path) {
                    Ok(config) => config,
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to load config, using stub");
                        Config::default()
                    }
                }
            }
        };

        let basis = Arc::new(Basis {
            record: RwLock::new(record),
            log_target,
            config,
            dir,
            ctx,
            client,
            ui,
            job_info: parts.job_info,
            factories: parts
                .factories
                .unwrap_or_else(|| Arc::new(FactoryRegistry::new())),
            mappers,
            flag_mapper: parts.flag_mapper.unwrap_or_else(|| Arc::new(flags_to_wire)),
            projects: RwLock::new(ProjectIndex::default()),
            closers: Mutex::new(Vec::new()),
            close_lock: tokio::sync::Mutex::new(()),
            closed: AtomicBool::new(false),
        });

        // Persist basis mutations when the scope closes.
        let weak = Arc::downgrade(&basis);
        basis.closer(move || {
            Box::pin(async move {
                match weak.upgrade() {
                    Some(basis) => basis.save_record().await,
                    None => Ok(()),
                }
            })
        });

        tracing::info!(basis = %basis.name(), "basis initialized");
        Ok(basis)
    }
}

#[derive(Default)]
struct ProjectIndex {
    /// Each project resolves under both its name and its resource id.
    by_key: HashMap<String, Arc<Project>>,
    /// Load order, honored while closing and saving.
    ordered: Vec<Arc<Project>>,
}

/// The root scope owning plugin registries, server client, and loaded
/// projects.
pub struct Basis {
    record: RwLock<BasisRecord>,
    log_target: String,
    config: Config,
    dir: DataDir,
    ctx: CancellationToken,
    client: Arc<dyn ServerClient>,
    ui: Arc<dyn Ui>,
    job_info: JobInfo,
    factories: Arc<FactoryRegistry>,
    mappers: Vec<Arc<dyn ArgMapper>>,
    flag_mapper: FlagMapper,
    projects: RwLock<ProjectIndex>,
    closers: Mutex<Vec<Closer>>,
    close_lock: tokio::sync::Mutex<()>,
    closed: AtomicBool,
}

impl std::fmt::Debug for Basis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Basis").finish_non_exhaustive()
    }
}

impl Basis {
    pub fn builder(ctx: CancellationToken) -> BasisBuilder {
        BasisBuilder::new(ctx)
    }

    pub fn name(&self) -> String {
        self.record.read().expect("basis record poisoned").name.clone()
    }

    pub fn resource_id(&self) -> String {
        self.record
            .read()
            .expect("basis record poisoned")
            .resource_id
            .clone()
    }

    pub fn record_ref(&self) -> BasisRef {
        self.record.read().expect("basis record poisoned").to_ref()
    }

    pub fn ui(&self) -> Arc<dyn Ui> {
        self.ui.clone()
    }

    pub fn data_dir(&self) -> &DataDir {
        &self.dir
    }

    pub fn job_info(&self) -> &JobInfo {
        &self.job_info
    }

    pub fn client(&self) -> Arc<dyn ServerClient> {
        self.client.clone()
    }

    pub fn context(&self) -> &CancellationToken {
        &self.ctx
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn factories(&self) -> &Arc<FactoryRegistry> {
        &self.factories
    }

    pub(crate) fn mappers(&self) -> &[Arc<dyn ArgMapper>] {
        &self.mappers
    }

    /// Register a deferred callable to run once when the basis closes.
    /// Closers run in registration order.
    pub fn closer(
        &self,
        closer: impl FnOnce() -> BoxFuture<'static, Result<(), ScopeError>> + Send + 'static,
    ) {
        self.closers
            .lock()
            .expect("basis closers poisoned")
            .push(Box::new(closer));
    }

    /// Construct the named plugin through its registered factory.
    ///
    /// The factory runs through the dynamic invoker with the basis context
    /// and a plugin-derived logger supplied; the resulting instance is
    /// owned by this scope and released when it closes.
    pub async fn start_plugin(
        self: &Arc<Self>,
        kind: ComponentKind,
        name: &str,
    ) -> Result<Arc<PluginInstance>, ScopeError> {
        let factory = self.factories.lookup(kind, name)?;
        let log = PluginLogger::new(format!("convoy.plugin.{}.{}", kind, name));
        let args = CallArgs::new().typed(self.ctx.clone()).typed(log.clone());
        let raw = dynamic::call_dynamic_raw(factory.as_ref(), &self.mappers, &args).await?;

        let instance = match raw.downcast::<PluginInstance>() {
            Ok(instance) => Arc::new(*instance),
            // Pure factories may return a bare component value.
            Err(raw) => match raw.downcast::<PluginComponent>() {
                Ok(component) => Arc::new(PluginInstance::without_close(*component)),
                Err(_) => {
                    return Err(ScopeError::Invoke(InvokeError::TypeMismatch {
                        expected: "PluginInstance",
                    }))
                }
            },
        };
        log.info("initialized component");

        let owned = instance.clone();
        self.closer(move || {
            Box::pin(async move { owned.close().await.map_err(ScopeError::Plugin) })
        });
        Ok(instance)
    }

    /// Resolve a component, normalizing command names to their root token.
    pub async fn component(
        self: &Arc<Self>,
        kind: ComponentKind,
        name: &str,
    ) -> Result<Arc<PluginInstance>, ScopeError> {
        let name = if kind == ComponentKind::Command {
            name.split_whitespace().next().unwrap_or(name)
        } else {
            name
        };
        self.start_plugin(kind, name).await
    }

    /// Stamp request-scoped metadata onto a plugin before dispatch.
    pub fn specialize(&self, instance: &PluginInstance) -> Result<(), ScopeError> {
        let metadata = instance
            .component()
            .request_metadata()
            .ok_or(ScopeError::NotSpecializable)?;
        metadata.set_request_metadata("basis_resource_id", &self.resource_id());
        metadata.set_request_metadata("vagrant_service_endpoint", &self.client.endpoint());
        Ok(())
    }

    /// Invoke a plugin function with the scope's default arguments added:
    /// the basis itself (typed and named `"basis"`), its UI, the context,
    /// the job info, and a derived logger. The UI status opened for the
    /// call closes on every return path.
    pub async fn call_dynamic<T: Any + Send + Sync>(
        self: &Arc<Self>,
        func: &dyn DynamicFunc,
        args: CallArgs,
    ) -> Result<T, ScopeError> {
        let _status = StatusGuard::new(self.ui.as_ref());
        let args = args
            .typed(self.clone())
            .typed(self.ui.clone())
            .typed(self.ctx.clone())
            .typed(self.job_info.clone())
            .typed(PluginLogger::new(format!("{}.plugin-call", self.log_target)))
            .named("basis", self.clone());
        dynamic::call_dynamic::<T>(func, &self.mappers, &args)
            .await
            .map_err(Into::into)
    }

    /// Execute a task against its command plugin. A non-zero exit code or
    /// an invocation error is task failure.
    pub async fn run(self: &Arc<Self>, task: &Task) -> Result<(), ScopeError> {
        tracing::debug!(basis = %self.name(), task = %task.command_name, "running new task");

        let cmd = self
            .component(ComponentKind::Command, &task.component.name)
            .await?;
        self.specialize(&cmd)?;
        let command = cmd
            .component()
            .as_command()
            .ok_or(ScopeError::ComponentMismatch(ComponentKind::Command))?;

        let words: Vec<String> = task
            .command_name
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let func = command.execute_func(words);
        let result = self
            .call_dynamic::<i64>(
                func.as_ref(),
                CallArgs::new()
                    .typed(CliArgs(task.cli_args.clone()))
                    .typed(self.dir.clone()),
            )
            .await;

        match result {
            Ok(0) => Ok(()),
            Ok(code) => {
                tracing::error!(
                    kind = %ComponentKind::Command,
                    name = %task.component.name,
                    code,
                    "failed to execute command"
                );
                Err(ScopeError::TaskFailed(code))
            }
            Err(err) => {
                tracing::error!(
                    kind = %ComponentKind::Command,
                    name = %task.component.name,
                    error = %err,
                    "failed to execute command"
                );
                Err(err)
            }
        }
    }

    /// Enumerate every registered command plugin and flatten the command
    /// trees they report. Output order follows the registry's
    /// lexicographic name order and is stable across runs.
    pub async fn init(self: &Arc<Self>) -> Result<Vec<CommandRecord>, ScopeError> {
        tracing::debug!("running init for basis");
        let mut records = Vec::new();
        for name in self.factories.names(ComponentKind::Command)? {
            let cmd = self.component(ComponentKind::Command, &name).await?;
            self.specialize(&cmd)?;
            let command = cmd
                .component()
                .as_command()
                .ok_or(ScopeError::ComponentMismatch(ComponentKind::Command))?;

            let info = self
                .call_dynamic::<CommandInfo>(command.command_info_func().as_ref(), CallArgs::new())
                .await?;
            records.extend(flatten_command_info(&info, &[], &self.flag_mapper));
        }
        Ok(records)
    }

    /// Probe registered host plugins in order and return the first that
    /// detects the running host.
    pub async fn host(self: &Arc<Self>) -> Result<Arc<PluginInstance>, ScopeError> {
        for name in self.factories.names(ComponentKind::Host)? {
            let instance = self.component(ComponentKind::Host, &name).await?;
            let host = instance
                .component()
                .as_host()
                .ok_or(ScopeError::ComponentMismatch(ComponentKind::Host))?;
            let detected = self
                .call_dynamic::<bool>(host.detect_func().as_ref(), CallArgs::new())
                .await?;
            if detected {
                return Ok(instance);
            }
        }
        Err(ScopeError::HostNotFound)
    }

    /// Construct one instance of every registered plugin. Already-built
    /// instances are released when a later construction fails.
    pub async fn components(self: &Arc<Self>) -> Result<Vec<Arc<PluginInstance>>, ScopeError> {
        let mut built = Vec::new();
        for kind in self.factories.kinds()? {
            for name in self.factories.names(kind)? {
                match self.start_plugin(kind, &name).await {
                    Ok(instance) => built.push(instance),
                    Err(err) => {
                        for instance in &built {
                            let _ = instance.close().await;
                        }
                        return Err(err);
                    }
                }
            }
        }
        Ok(built)
    }

    /// Look up a loaded project by name or resource id.
    pub fn project(&self, name_or_id: &str) -> Option<Arc<Project>> {
        self.projects.read().ok()?.by_key.get(name_or_id).cloned()
    }

    /// Load a project into this basis. Loading is idempotent by resource
    /// id: a project already loaded is returned as-is.
    pub async fn load_project(
        self: &Arc<Self>,
        options: Vec<ProjectOption>,
    ) -> Result<Arc<Project>, ScopeError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ScopeError::Closed);
        }

        let mut parts = ProjectParts::default();
        let mut errs = ErrorList::new();
        for option in options {
            if let Err(err) = apply_project_option(&mut parts, self, option).await {
                errs.push(err);
            }
        }
        errs.into_result().map_err(ScopeError::Options)?;

        let record = parts.record.ok_or(ScopeError::MissingRecord)?;
        if let Some(existing) = self.project(&record.resource_id) {
            return Ok(existing);
        }

        let dir = match parts.dir {
            Some(dir) => dir,
            None => self.dir.project(&record.name)?,
        };
        let project = Project::create(self, record.clone(), dir);

        {
            let mut index = self
                .projects
                .write()
                .map_err(|e| ScopeError::Internal(e.to_string()))?;
            index.by_key.insert(record.name.clone(), project.clone());
            index
                .by_key
                .insert(record.resource_id.clone(), project.clone());
            index.ordered.push(project.clone());
        }

        // Bring any targets recorded on the project along.
        for target_ref in &record.targets {
            project
                .load_target(vec![crate::target::TargetOption::Ref(target_ref.clone())])
                .await?;
        }

        // Persist project mutations when it closes.
        let weak = Arc::downgrade(&project);
        project.closer(move || {
            Box::pin(async move {
                match weak.upgrade() {
                    Some(project) => project.save_record().await,
                    None => Ok(()),
                }
            })
        });

        Ok(project)
    }

    /// Close the basis: loaded projects close first, then registered
    /// closers run in registration order. Failures are aggregated and
    /// returned, never raised; closing an already-closed basis is a no-op.
    pub async fn close(&self) -> Result<(), ErrorList> {
        let _guard = self.close_lock.lock().await;
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        tracing::debug!(basis = %self.resource_id(), "closing basis");

        let mut errs = ErrorList::new();
        let projects: Vec<Arc<Project>> = match self.projects.read() {
            Ok(index) => index.ordered.clone(),
            Err(err) => {
                errs.push(ScopeError::Internal(err.to_string()));
                Vec::new()
            }
        };
        for project in projects {
            tracing::trace!(project = %project.name(), "closing project");
            if let Err(err) = project.close().await {
                tracing::warn!(project = %project.name(), error = %err, "error closing project");
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
        tracing::debug!(basis = %self.resource_id(), "saving basis");
        let record = self
            .record
            .read()
            .map_err(|e| ScopeError::Internal(e.to_string()))?
            .clone();
        let updated = self
            .client
            .upsert_basis(&self.ctx, record)
            .await
            .map_err(|err| {
                tracing::trace!(basis = %self.resource_id(), error = %err, "failed to save basis");
                err
            })?;
        *self
            .record
            .write()
            .map_err(|e| ScopeError::Internal(e.to_string()))? = updated;
        Ok(())
    }

    /// Persist the basis record. Saving a closed basis is undefined and
    /// reported as an error.
    pub async fn save(&self) -> Result<(), ScopeError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ScopeError::Closed);
        }
        self.save_record().await
    }

    /// Persist every loaded project, then the basis itself, aggregating
    /// failures.
    pub async fn save_full(&self) -> Result<(), ErrorList> {
        tracing::debug!(basis = %self.resource_id(), "performing full save");
        let mut errs = ErrorList::new();
        if self.closed.load(Ordering::Acquire) {
            errs.push(ScopeError::Closed);
            return errs.into_result();
        }

        let projects: Vec<Arc<Project>> = match self.projects.read() {
            Ok(index) => index.ordered.clone(),
            Err(err) => {
                errs.push(ScopeError::Internal(err.to_string()));
                Vec::new()
            }
        };
        for project in projects {
            if let Err(err) = project.save_full().await {
                tracing::trace!(project = %project.resource_id(), error = %err, "error while saving project");
                errs.merge(err);
            }
        }
        if let Err(err) = self.save_record().await {
            errs.push(err);
        }
        errs.into_result()
    }
}
