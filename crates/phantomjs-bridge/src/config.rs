//! Session configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Error;
use crate::liveness::DEFAULT_HEARTBEAT_PERIOD;
use crate::log::{LogSink, TracingSink};
use crate::process;

/// Capacity of the submission channel feeding the event loop.
const DEFAULT_MESSAGE_CAPACITY: usize = 64;

/// How a session launches and runs its PhantomJS process.
///
/// Built with [`SessionConfig::new`] (or [`SessionConfig::discover`]) plus
/// `with_*` overrides.
pub struct SessionConfig {
    /// Path to the PhantomJS binary.
    pub executable: PathBuf,
    /// Arguments passed to the binary. The remote-side control script is not
    /// bundled here; callers append its path as the final argument.
    pub args: Vec<String>,
    /// Idle probe period; 100ms unless overridden.
    pub heartbeat_period: Duration,
    /// Whether the idle probe runs at all. A disabled heartbeat gives up
    /// hang detection; commands and events are unaffected.
    pub heartbeat_enabled: bool,
    /// Backpressure bound on command submission.
    pub message_capacity: usize,
    /// Destination for remote-originated text.
    pub log_sink: Arc<dyn LogSink>,
}

impl SessionConfig {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            heartbeat_period: DEFAULT_HEARTBEAT_PERIOD,
            heartbeat_enabled: true,
            message_capacity: DEFAULT_MESSAGE_CAPACITY,
            log_sink: Arc::new(TracingSink),
        }
    }

    /// Configuration with the executable located via [`process::find_executable`].
    pub fn discover() -> Result<Self, Error> {
        Ok(Self::new(process::find_executable()?))
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Override the probe period. Periods under a millisecond are raised
    /// to it; the session timer needs a non-zero period.
    pub fn with_heartbeat_period(mut self, period: Duration) -> Self {
        self.heartbeat_period = period.max(Duration::from_millis(1));
        self
    }

    pub fn with_heartbeat_enabled(mut self, enabled: bool) -> Self {
        self.heartbeat_enabled = enabled;
        self
    }

    /// Override the submission channel capacity. Zero is raised to one;
    /// the session channel needs room for at least one message.
    pub fn with_message_capacity(mut self, capacity: usize) -> Self {
        self.message_capacity = capacity.max(1);
        self
    }

    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = sink;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = SessionConfig::new("phantomjs");
        assert_eq!(config.executable, PathBuf::from("phantomjs"));
        assert!(config.args.is_empty());
        assert_eq!(config.heartbeat_period, Duration::from_millis(100));
        assert!(config.heartbeat_enabled);
        assert!(config.message_capacity > 0);
    }

    #[test]
    fn builder_overrides_apply() {
        let config = SessionConfig::new("phantomjs")
            .with_args(["--ignore-ssl-errors=true", "--ssl-protocol=any"])
            .with_heartbeat_period(Duration::from_millis(250))
            .with_heartbeat_enabled(false)
            .with_message_capacity(8);
        assert_eq!(config.args.len(), 2);
        assert_eq!(config.heartbeat_period, Duration::from_millis(250));
        assert!(!config.heartbeat_enabled);
        assert_eq!(config.message_capacity, 8);
    }

    #[test]
    fn zero_overrides_are_raised_to_usable_floors() {
        let config = SessionConfig::new("phantomjs")
            .with_heartbeat_period(Duration::ZERO)
            .with_message_capacity(0);
        assert_eq!(config.heartbeat_period, Duration::from_millis(1));
        assert_eq!(config.message_capacity, 1);
    }
}
