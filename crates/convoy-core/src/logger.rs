//! Namespaced logger handles passed into plugin calls.

/// A derived logger namespace handed to plugins through the invoker.
///
/// Events are emitted through `tracing` with the namespace attached as a
/// `component` field, so plugin output stays attributable without plugins
/// linking a logging backend of their own.
#[derive(Debug, Clone)]
pub struct PluginLogger {
    target: String,
}

impl PluginLogger {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    /// Derive a child logger with a dotted suffix.
    pub fn named(&self, suffix: &str) -> Self {
        Self {
            target: format!("{}.{}", self.target, suffix),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn trace(&self, message: &str) {
        tracing::trace!(component = %self.target, "{}", message);
    }

    pub fn debug(&self, message: &str) {
        tracing::debug!(component = %self.target, "{}", message);
    }

    pub fn info(&self, message: &str) {
        tracing::info!(component = %self.target, "{}", message);
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!(component = %self.target, "{}", message);
    }

    pub fn error(&self, message: &str) {
        tracing::error!(component = %self.target, "{}", message);
    }
}
