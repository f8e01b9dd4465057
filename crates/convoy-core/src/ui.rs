//! Terminal UI seam
//!
//! Scopes talk to the user through the [`Ui`] trait; the console
//! implementation here is the default bound at basis construction. Rendering
//! beyond plain line output belongs to embedding applications.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Long-running operation indicator opened per dynamic call.
pub trait StatusIndicator: Send + Sync {
    fn update(&self, message: &str);
    fn close(&self);
}

/// User-facing output surface owned by a scope.
pub trait Ui: Send + Sync {
    /// Open a status indicator. Callers must close it on every return path;
    /// [`StatusGuard`] does so on drop.
    fn status(&self) -> Arc<dyn StatusIndicator>;

    fn say(&self, message: &str);

    fn warn(&self, message: &str);
}

/// Console UI bound to a context token; output stops once the context is
/// cancelled.
pub struct ConsoleUi {
    ctx: CancellationToken,
}

impl ConsoleUi {
    pub fn new(ctx: CancellationToken) -> Self {
        Self { ctx }
    }

    fn write_line(&self, line: &str) {
        if self.ctx.is_cancelled() {
            return;
        }
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "{}", line);
    }
}

impl Ui for ConsoleUi {
    fn status(&self) -> Arc<dyn StatusIndicator> {
        Arc::new(ConsoleStatus {
            ctx: self.ctx.clone(),
            open: AtomicBool::new(true),
        })
    }

    fn say(&self, message: &str) {
        self.write_line(message);
    }

    fn warn(&self, message: &str) {
        self.write_line(&format!("warning: {}", message));
    }
}

struct ConsoleStatus {
    ctx: CancellationToken,
    open: AtomicBool,
}

impl StatusIndicator for ConsoleStatus {
    fn update(&self, message: &str) {
        if self.ctx.is_cancelled() || !self.open.load(Ordering::Acquire) {
            return;
        }
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "... {}", message);
    }

    fn close(&self) {
        self.open.store(false, Ordering::Release);
    }
}

/// RAII wrapper closing a status indicator on every return path.
pub struct StatusGuard {
    status: Arc<dyn StatusIndicator>,
}

impl StatusGuard {
    pub fn new(ui: &dyn Ui) -> Self {
        Self {
            status: ui.status(),
        }
    }

    pub fn status(&self) -> &Arc<dyn StatusIndicator> {
        &self.status
    }
}

impl Drop for StatusGuard {
    fn drop(&mut self) {
        self.status.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingUi {
        closed: Arc<AtomicBool>,
        lines: Mutex<Vec<String>>,
    }

    struct RecordingStatus {
        closed: Arc<AtomicBool>,
    }

    impl StatusIndicator for RecordingStatus {
        fn update(&self, _message: &str) {}
        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    impl Ui for RecordingUi {
        fn status(&self) -> Arc<dyn StatusIndicator> {
            Arc::new(RecordingStatus {
                closed: self.closed.clone(),
            })
        }

        fn say(&self, message: &str) {
            self.lines.lock().expect("lock").push(message.to_string());
        }

        fn warn(&self, message: &str) {
            self.say(message);
        }
    }

    #[test]
    fn test_status_guard_closes_on_drop() {
        let ui = RecordingUi::default();
        let closed = ui.closed.clone();
        {
            let _guard = StatusGuard::new(&ui);
            assert!(!closed.load(Ordering::SeqCst));
        }
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_console_ui_stops_after_cancellation() {
        let ctx = CancellationToken::new();
        let ui = ConsoleUi::new(ctx.clone());
        ctx.cancel();
        // No output side effect to observe here; just exercise the paths.
        ui.say("ignored");
        ui.status().update("ignored");
    }
}
