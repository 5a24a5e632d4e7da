//! Error taxonomy for the bridge.
//!
//! Per-call failures (`UnsupportedArgument`, `RemoteFailure`) surface only
//! through that call's handle. Session-wide failures (`Terminated`) surface
//! to every outstanding call at once. Correlation misses are not errors at
//! all; they are logged and dropped.

/// Errors surfaced by sessions, pages, and pending calls.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The PhantomJS executable could not be located or started.
    #[error("failed to launch phantomjs: {0}")]
    Launch(String),

    /// A function-valued argument cannot be shipped to the remote runtime.
    /// Raised synchronously, before anything is written to the process.
    #[error("unsupported argument: {0}")]
    UnsupportedArgument(String),

    /// The remote reported an error for this call.
    #[error("{0}")]
    RemoteFailure(String),

    /// The session ended while this call was outstanding. The message names
    /// the cause: an exit code, a kill reason, or a stream failure.
    #[error("{0}")]
    Terminated(String),

    /// The session event loop is gone; nothing can be submitted anymore.
    #[error("session is closed")]
    ChannelClosed,
}
