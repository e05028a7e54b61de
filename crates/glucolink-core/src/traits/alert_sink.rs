// # Alert Sink Trait
//
// Presentation boundary for verification results on the user-initiated
// path. The engine picks the title and message; the sink only displays them.

use tracing::info;

/// Trait for presenting alerts to the user
///
/// Called at most once per verification attempt, from the engine's
/// verification task. Implementations must not block.
pub trait AlertSink: Send + Sync {
    /// Present an alert
    fn present(&self, title: &str, message: &str);
}

impl<F> AlertSink for F
where
    F: Fn(&str, &str) + Send + Sync,
{
    fn present(&self, title: &str, message: &str) {
        self(title, message)
    }
}

/// Alert sink that writes alerts to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn present(&self, title: &str, message: &str) {
        info!(target: "glucolink::alert", "{}: {}", title, message);
    }
}
