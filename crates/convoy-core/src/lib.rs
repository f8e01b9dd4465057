//! # Convoy Core
//!
//! Core abstractions and deterministic logic for the convoy orchestrator.
//!
//! This crate contains:
//! - Component kind / command surface definitions
//! - Plugin capability traits and constructed plugin instances
//! - The factory registry mapping kinds to named plugin constructors
//! - Dynamic function invocation with typed/named argument resolution
//! - Error aggregation for fan-out operations
//!
//! This crate does NOT care about:
//! - How scopes persist (see `convoy-client`)
//! - How pipelines execute (see `convoy-runtime`)
//! - How configuration is loaded (see `convoy-config`)

pub mod component;
pub mod datadir;
pub mod dynamic;
pub mod errors;
pub mod factory;
pub mod logger;
pub mod mappers;
pub mod plugin;
pub mod ui;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::component::{
        flags_to_wire, flatten_command_info, CliArgs, CommandInfo, CommandRecord, ComponentKind,
        ComponentRef, Flag, FlagKind, FlagMapper, JobInfo, Task, WireFlag,
    };
    pub use crate::datadir::{DataDir, DataDirError};
    pub use crate::dynamic::{
        call_dynamic, call_dynamic_raw, ArgMapper, ArgRequest, ArgValue, CallArgs, DynFn,
        DynamicFunc, DynamicValue, InvokeError, ResolvedArgs,
    };
    pub use crate::errors::{ErrorList, SharedError};
    pub use crate::factory::{component_factory, Factory, FactoryError, FactoryRegistry};
    pub use crate::logger::PluginLogger;
    pub use crate::mappers::CommandArgsMapper;
    pub use crate::plugin::{
        CloseHook, CloseResult, CommandPlugin, HostPlugin, Plugin, PluginComponent,
        PluginInstance, ProviderPlugin, RequestMetadata,
    };
    pub use crate::ui::{ConsoleUi, StatusGuard, StatusIndicator, Ui};
}

// Re-export key types at crate root
pub use component::{CommandInfo, CommandRecord, ComponentKind, JobInfo, Task};
pub use datadir::DataDir;
pub use dynamic::{CallArgs, DynamicFunc, InvokeError};
pub use errors::ErrorList;
pub use factory::{Factory, FactoryError, FactoryRegistry};
pub use logger::PluginLogger;
pub use plugin::{PluginComponent, PluginInstance};
pub use ui::{ConsoleUi, Ui};
