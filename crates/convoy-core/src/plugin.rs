//! Plugin values and their capability surfaces
//!
//! A constructed plugin is a [`PluginComponent`]: a tagged value whose
//! variant carries the function bundle for its component kind. The core
//! never calls plugin methods directly; capabilities expose their entry
//! points as [`DynamicFunc`]s so the invoker can supply declared inputs.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::component::ComponentKind;
use crate::dynamic::DynamicFunc;
use crate::errors::SharedError;

/// Specialization surface: values exposing it accept request-scoped
/// metadata stamps before dispatch.
pub trait RequestMetadata: Send + Sync {
    fn set_request_metadata(&self, key: &str, value: &str);
}

/// Base capability shared by every plugin value.
pub trait Plugin: Send + Sync {
    /// Specialization surface, `None` for values that cannot be stamped.
    fn request_metadata(&self) -> Option<&dyn RequestMetadata> {
        None
    }
}

/// Command plugins expose a command tree and an execute entry point.
pub trait CommandPlugin: Plugin {
    /// Callable reporting the plugin's command info tree.
    fn command_info_func(&self) -> Arc<dyn DynamicFunc>;

    /// Callable executing the given command words, resolving to the exit
    /// code as `i64`.
    fn execute_func(&self, command_words: Vec<String>) -> Arc<dyn DynamicFunc>;
}

/// Host plugins report whether they apply to the running host.
pub trait HostPlugin: Plugin {
    /// Callable resolving to `bool`.
    fn detect_func(&self) -> Arc<dyn DynamicFunc>;
}

/// Provider plugins manage workload backends; their operations are routed
/// through project-scoped pipelines rather than named entry points.
pub trait ProviderPlugin: Plugin {}

/// A constructed plugin value, tagged by component kind.
#[derive(Clone)]
pub enum PluginComponent {
    Command(Arc<dyn CommandPlugin>),
    Host(Arc<dyn HostPlugin>),
    Provider(Arc<dyn ProviderPlugin>),
}

impl PluginComponent {
    pub fn kind(&self) -> ComponentKind {
        match self {
            PluginComponent::Command(_) => ComponentKind::Command,
            PluginComponent::Host(_) => ComponentKind::Host,
            PluginComponent::Provider(_) => ComponentKind::Provider,
        }
    }

    pub fn as_command(&self) -> Option<Arc<dyn CommandPlugin>> {
        match self {
            PluginComponent::Command(c) => Some(c.clone()),
            _ => None,
        }
    }

    pub fn as_host(&self) -> Option<Arc<dyn HostPlugin>> {
        match self {
            PluginComponent::Host(h) => Some(h.clone()),
            _ => None,
        }
    }

    pub fn as_provider(&self) -> Option<Arc<dyn ProviderPlugin>> {
        match self {
            PluginComponent::Provider(p) => Some(p.clone()),
            _ => None,
        }
    }

    /// Specialization surface of the underlying value.
    pub fn request_metadata(&self) -> Option<&dyn RequestMetadata> {
        match self {
            PluginComponent::Command(c) => c.request_metadata(),
            PluginComponent::Host(h) => h.request_metadata(),
            PluginComponent::Provider(p) => p.request_metadata(),
        }
    }
}

/// Result of releasing a plugin's resources.
pub type CloseResult = Result<(), SharedError>;

/// Deferred release hook attached to a plugin instance.
pub type CloseHook = Box<dyn FnOnce() -> BoxFuture<'static, CloseResult> + Send>;

/// A constructed plugin value paired with its close hook.
///
/// An instance has exactly one owner; lookups hand out clones of the
/// component, never the instance itself. The close hook runs at most once.
pub struct PluginInstance {
    component: PluginComponent,
    close: std::sync::Mutex<Option<CloseHook>>,
}

impl PluginInstance {
    pub fn new(component: PluginComponent, close: CloseHook) -> Self {
        Self {
            component,
            close: std::sync::Mutex::new(Some(close)),
        }
    }

    /// Wrap a raw component that holds no resources of its own.
    pub fn without_close(component: PluginComponent) -> Self {
        Self {
            component,
            close: std::sync::Mutex::new(None),
        }
    }

    pub fn component(&self) -> &PluginComponent {
        &self.component
    }

    /// Release the plugin's resources. Safe to call repeatedly; only the
    /// first call runs the hook.
    pub async fn close(&self) -> CloseResult {
        let hook = self
            .close
            .lock()
            .map_err(|e| Arc::new(std::io::Error::other(e.to_string())) as SharedError)?
            .take();
        match hook {
            Some(hook) => hook().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullHost;
    impl Plugin for NullHost {}
    impl HostPlugin for NullHost {
        fn detect_func(&self) -> Arc<dyn DynamicFunc> {
            unimplemented!("not exercised")
        }
    }

    #[tokio::test]
    async fn test_close_hook_runs_exactly_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let instance = PluginInstance::new(
            PluginComponent::Host(Arc::new(NullHost)),
            Box::new(move || {
                let seen = seen.clone();
                Box::pin(async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
        );

        instance.close().await.expect("close");
        instance.close().await.expect("close again");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_instance_without_close_is_a_noop() {
        let instance = PluginInstance::without_close(PluginComponent::Host(Arc::new(NullHost)));
        assert!(instance.close().await.is_ok());
        assert_eq!(instance.component().kind(), ComponentKind::Host);
    }
}
