//! phantomjs-bridge: drive a PhantomJS process over its stdio JSON protocol.

mod config;
mod error;
mod events;
mod ident;
mod liveness;
mod log;
mod page;
mod process;
mod session;

pub mod wire;

pub use session::{PendingCall, Session};

pub use config::SessionConfig;
pub use error::Error;
pub use events::{EventCallback, EventRegistry, TargetEmitter};
pub use log::{LogSink, TracingSink};
pub use page::{Page, Phantom};
pub use process::{EXECUTABLE_ENV, PhantomProcess, find_executable};
pub use wire::protocol::{
    CallArg, CallbackDescriptor, Envelope, Event, EventDescriptor, JsFunction, Response,
};
