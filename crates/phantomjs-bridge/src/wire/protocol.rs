//! Wire protocol types for the PhantomJS stdio channel.
//!
//! One shared text channel carries four message classes from the remote:
//! heartbeat acks, command responses, page events, and free-form log lines.
//! Outgoing traffic is command envelopes plus the bare heartbeat marker.
//! The markers and field names are fixed by the remote shim and cannot
//! change independently of it.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::error::Error;
use crate::ident;

/// Heartbeat marker, written bare and echoed back behind [`RESPONSE_PREFIX`].
pub const HEARTBEAT: &str = "NOOP";

/// First character of response lines (including heartbeat acks).
pub const RESPONSE_PREFIX: char = '>';

/// Prefix of event lines.
pub const EVENT_PREFIX: &str = "<event>";

/// Entropy floor for generated command identifiers, in bytes.
const ID_MIN_BYTES: usize = 16;

/// One outgoing command: which remote object to call, what to call on it,
/// and with which arguments.
///
/// Serializes to exactly `{id, target, method, args}`. Settlement state
/// lives in the session's pending table, never in the envelope, so nothing
/// internal can leak onto the wire.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub id: String,
    pub target: String,
    pub method: String,
    pub args: Vec<CallArg>,
}

impl Envelope {
    /// Envelope with a freshly generated identifier.
    pub fn new(
        target: impl Into<String>,
        method: impl Into<String>,
        args: Vec<CallArg>,
    ) -> Self {
        Self::with_id(ident::generate(ID_MIN_BYTES), target, method, args)
    }

    /// Envelope with a caller-chosen identifier. Used for fixed control
    /// commands; the identifier must not collide with one still pending.
    pub fn with_id(
        id: impl Into<String>,
        target: impl Into<String>,
        method: impl Into<String>,
        args: Vec<CallArg>,
    ) -> Self {
        Self {
            id: id.into(),
            target: target.into(),
            method: method.into(),
            args,
        }
    }

    /// Render the envelope as a single wire line, without the terminator.
    ///
    /// Fails with [`Error::UnsupportedArgument`] before anything reaches the
    /// process when a function argument cannot be shipped.
    pub fn to_line(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(|e| Error::UnsupportedArgument(e.to_string()))
    }
}

/// Argument to a remote call: plain JSON data, a JavaScript function
/// source, an event descriptor for the `addEvent`/`removeEvent` control
/// methods, or a `phantom.callback` descriptor.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CallArg {
    Value(Value),
    Function(JsFunction),
    Event(EventDescriptor),
    Callback(CallbackDescriptor),
}

impl From<Value> for CallArg {
    fn from(value: Value) -> Self {
        CallArg::Value(value)
    }
}

impl From<JsFunction> for CallArg {
    fn from(function: JsFunction) -> Self {
        CallArg::Function(function)
    }
}

impl From<EventDescriptor> for CallArg {
    fn from(descriptor: EventDescriptor) -> Self {
        CallArg::Event(descriptor)
    }
}

impl From<CallbackDescriptor> for CallArg {
    fn from(descriptor: CallbackDescriptor) -> Self {
        CallArg::Callback(descriptor)
    }
}

impl From<&str> for CallArg {
    fn from(s: &str) -> Self {
        CallArg::Value(Value::String(s.to_string()))
    }
}

impl From<String> for CallArg {
    fn from(s: String) -> Self {
        CallArg::Value(Value::String(s))
    }
}

impl From<bool> for CallArg {
    fn from(b: bool) -> Self {
        CallArg::Value(Value::Bool(b))
    }
}

impl From<i64> for CallArg {
    fn from(n: i64) -> Self {
        CallArg::Value(Value::from(n))
    }
}

impl From<f64> for CallArg {
    fn from(n: f64) -> Self {
        CallArg::Value(Value::from(n))
    }
}

/// JavaScript function source shipped verbatim to the remote runtime.
///
/// The remote evaluates the text with no surrounding lexical scope. Only a
/// standalone `function` expression survives that trip, so arrow functions
/// and bare references to host-side bindings are rejected when serialized.
#[derive(Debug, Clone)]
pub struct JsFunction {
    source: String,
}

impl JsFunction {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    fn check(&self) -> Result<(), String> {
        let trimmed = self.source.trim_start();
        let keyword_led = trimmed
            .strip_prefix("function")
            .is_some_and(|rest| rest.starts_with(['(', '*', ' ', '\t', '\n', '\r']));
        if keyword_led {
            Ok(())
        } else {
            Err(format!(
                "arrow functions and references are not supported by PhantomJS; \
                 pass a complete `function () {{ ... }}` source, got: {}",
                self.source
            ))
        }
    }
}

impl Serialize for JsFunction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Validation lives here so a function nested inside any argument
        // shape is still caught before a single byte is written.
        self.check().map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&self.source)
    }
}

/// Payload of the `addEvent` and `removeEvent` control methods.
///
/// A plain `{type}` tells the remote to start or stop forwarding an event.
/// The remote-callback flavor adds `event` (the callback source) and `args`.
#[derive(Debug, Clone, Serialize)]
pub struct EventDescriptor {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<JsFunction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<Value>>,
}

impl EventDescriptor {
    /// Descriptor for a host-side subscription: the remote only forwards.
    pub fn local(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            event: None,
            args: None,
        }
    }

    /// Descriptor carrying a callback the remote runs itself.
    pub fn remote(
        event_type: impl Into<String>,
        callback: JsFunction,
        args: Vec<Value>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            event: Some(callback),
            args: Some(args),
        }
    }
}

/// Payload the remote shim rewrites into a `phantom.callback(...)` value.
///
/// PhantomJS wants real callback objects in a few data positions, most
/// notably the `contents` of paper-size headers and footers. The serialized
/// form is the fixed `{transform, target, method, parent}` literal the shim
/// recognizes; `target` carries the callback source.
#[derive(Debug, Clone, Serialize)]
pub struct CallbackDescriptor {
    transform: bool,
    target: JsFunction,
    method: &'static str,
    parent: &'static str,
}

impl CallbackDescriptor {
    pub fn new(function: JsFunction) -> Self {
        Self {
            transform: true,
            target: function,
            method: "callback",
            parent: "phantom",
        }
    }

    /// The descriptor as a JSON value, for embedding inside a larger
    /// argument such as a `paperSize` property. Rejects callback sources
    /// the remote cannot reconstruct, like any other function argument.
    pub fn to_value(&self) -> Result<Value, Error> {
        serde_json::to_value(self).map_err(|e| Error::UnsupportedArgument(e.to_string()))
    }
}

/// Response frame payload, the JSON behind a `>` line.
///
/// `response` absent means the call produced no value; `error` present means
/// the remote failed the call.
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    pub id: String,
    #[serde(default)]
    pub response: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Event frame payload, the JSON behind a `<event>` line.
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    pub target: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub args: Vec<Value>,
}
