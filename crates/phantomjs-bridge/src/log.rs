//! Logging collaborator for remote-originated text.
//!
//! The bridge's own diagnostics go through `tracing` directly. Text that
//! originates in the remote process (stdout lines that are not protocol
//! frames, everything on stderr) and protocol anomalies the remote caused
//! (correlation misses) go through a [`LogSink`] instead, so embedders can
//! redirect or capture that stream without touching the host's subscriber.

/// Four-level sink for text originating in the remote process.
pub trait LogSink: Send + Sync {
    fn debug(&self, message: &str);
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// Default sink: forwards to `tracing` under the `phantomjs` target.
pub struct TracingSink;

impl LogSink for TracingSink {
    fn debug(&self, message: &str) {
        tracing::debug!(target: "phantomjs", "{message}");
    }

    fn info(&self, message: &str) {
        tracing::info!(target: "phantomjs", "{message}");
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: "phantomjs", "{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "phantomjs", "{message}");
    }
}
