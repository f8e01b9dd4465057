//! Factory registry
//!
//! Maps a component kind to the set of named factories that construct live
//! plugin instances. Factories are dynamic functions so construction flows
//! through the same argument resolver as plugin calls; the owning scope
//! supplies the context token and a derived logger.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::component::ComponentKind;
use crate::dynamic::{ArgRequest, DynFn, DynamicFunc, DynamicValue};
use crate::logger::PluginLogger;
use crate::plugin::{PluginComponent, PluginInstance};
use tokio_util::sync::CancellationToken;

/// A callable that constructs a [`PluginInstance`] from `(context, logger)`.
pub type Factory = Arc<dyn DynamicFunc>;

/// Factory lookup errors.
#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("unknown component kind: {0}")]
    UnknownKind(ComponentKind),

    #[error("unknown {kind} plugin: {name:?}")]
    UnknownName { kind: ComponentKind, name: String },

    #[error("internal error: {0}")]
    Internal(String),
}

/// Registry of plugin factories by component kind and name.
///
/// Name iteration is lexicographic, so enumeration over registered plugins
/// is reproducible run to run.
#[derive(Default)]
pub struct FactoryRegistry {
    factories: RwLock<HashMap<ComponentKind, BTreeMap<String, Factory>>>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory. Registering the same `(kind, name)` pair again
    /// replaces the previous factory.
    pub fn register(
        &self,
        kind: ComponentKind,
        name: impl Into<String>,
        factory: Factory,
    ) -> Result<(), FactoryError> {
        let mut factories = self
            .factories
            .write()
            .map_err(|e| FactoryError::Internal(e.to_string()))?;
        factories.entry(kind).or_default().insert(name.into(), factory);
        Ok(())
    }

    /// Registered names for a kind, lexicographically ordered. Unknown
    /// kinds enumerate as empty.
    pub fn names(&self, kind: ComponentKind) -> Result<Vec<String>, FactoryError> {
        let factories = self
            .factories
            .read()
            .map_err(|e| FactoryError::Internal(e.to_string()))?;
        Ok(factories
            .get(&kind)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default())
    }

    /// Kinds with at least one registered factory, in canonical order.
    pub fn kinds(&self) -> Result<Vec<ComponentKind>, FactoryError> {
        let factories = self
            .factories
            .read()
            .map_err(|e| FactoryError::Internal(e.to_string()))?;
        Ok(ComponentKind::all()
            .into_iter()
            .filter(|k| factories.get(k).map(|m| !m.is_empty()).unwrap_or(false))
            .collect())
    }

    /// Look up a factory, distinguishing an unknown kind from an unknown
    /// name within a known kind.
    pub fn lookup(&self, kind: ComponentKind, name: &str) -> Result<Factory, FactoryError> {
        let factories = self
            .factories
            .read()
            .map_err(|e| FactoryError::Internal(e.to_string()))?;
        let by_name = factories.get(&kind).ok_or(FactoryError::UnknownKind(kind))?;
        by_name
            .get(name)
            .cloned()
            .ok_or_else(|| FactoryError::UnknownName {
                kind,
                name: name.to_string(),
            })
    }
}

/// Build a factory that clones a prebuilt component and logs construction.
///
/// The resulting instance carries no close hook; plugins owning resources
/// should register a purpose-built factory instead.
pub fn component_factory(component: PluginComponent) -> Factory {
    Arc::new(DynFn::new(
        vec![
            ArgRequest::typed::<CancellationToken>(),
            ArgRequest::typed::<PluginLogger>(),
        ],
        move |args| {
            let component = component.clone();
            Box::pin(async move {
                let log = args.get::<PluginLogger>(1)?;
                log.debug("constructing component from prebuilt value");
                Ok(Box::new(PluginInstance::without_close(component)) as DynamicValue)
            })
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamic::{call_dynamic_raw, CallArgs};
    use crate::plugin::{HostPlugin, Plugin};

    struct NullHost;
    impl Plugin for NullHost {}
    impl HostPlugin for NullHost {
        fn detect_func(&self) -> Arc<dyn DynamicFunc> {
            unimplemented!("not exercised")
        }
    }

    fn host_factory() -> Factory {
        component_factory(PluginComponent::Host(Arc::new(NullHost)))
    }

    #[test]
    fn test_names_are_lexicographic() {
        let registry = FactoryRegistry::new();
        registry
            .register(ComponentKind::Host, "virtualbox", host_factory())
            .expect("register");
        registry
            .register(ComponentKind::Host, "docker", host_factory())
            .expect("register");
        registry
            .register(ComponentKind::Host, "libvirt", host_factory())
            .expect("register");

        assert_eq!(
            registry.names(ComponentKind::Host).expect("names"),
            vec!["docker", "libvirt", "virtualbox"]
        );
    }

    #[test]
    fn test_reregistering_replaces_the_factory() {
        let registry = FactoryRegistry::new();
        registry
            .register(ComponentKind::Host, "docker", host_factory())
            .expect("register");
        registry
            .register(ComponentKind::Host, "docker", host_factory())
            .expect("register");

        assert_eq!(registry.names(ComponentKind::Host).expect("names").len(), 1);
        assert!(registry.lookup(ComponentKind::Host, "docker").is_ok());
    }

    #[test]
    fn test_unknown_kind_and_name_are_distinct_errors() {
        let registry = FactoryRegistry::new();
        registry
            .register(ComponentKind::Host, "docker", host_factory())
            .expect("register");

        assert!(matches!(
            registry.lookup(ComponentKind::Command, "docker"),
            Err(FactoryError::UnknownKind(ComponentKind::Command))
        ));
        assert!(matches!(
            registry.lookup(ComponentKind::Host, "qemu"),
            Err(FactoryError::UnknownName { .. })
        ));
    }

    #[test]
    fn test_kinds_lists_only_populated_kinds() {
        let registry = FactoryRegistry::new();
        registry
            .register(ComponentKind::Host, "docker", host_factory())
            .expect("register");
        assert_eq!(registry.kinds().expect("kinds"), vec![ComponentKind::Host]);
    }

    #[tokio::test]
    async fn test_component_factory_builds_through_the_invoker() {
        let factory = host_factory();
        let args = CallArgs::new()
            .typed(CancellationToken::new())
            .typed(PluginLogger::new("convoy.plugin.host.docker"));

        let raw = call_dynamic_raw(factory.as_ref(), &[], &args)
            .await
            .expect("factory call");
        let instance = raw.downcast::<PluginInstance>().expect("instance");
        assert_eq!(instance.component().kind(), ComponentKind::Host);
    }
}
