//! Convenience wrappers over the raw session: a `Phantom` facade for the
//! process-level object and a `Page` handle per remote page.
//!
//! Remote pages are mutated only through explicit calls. There is no field
//! assignment in this contract; `set_property` is a call like any other.

use serde_json::Value;

use crate::config::SessionConfig;
use crate::error::Error;
use crate::events::EventCallback;
use crate::session::Session;
use crate::wire::protocol::{CallArg, CallbackDescriptor, JsFunction};

/// Handle to the remote `phantom` object and the session behind it.
#[derive(Clone)]
pub struct Phantom {
    session: Session,
}

impl Phantom {
    /// Locate the PhantomJS executable and start a session with defaults.
    pub async fn connect() -> Result<Phantom, Error> {
        Self::with_config(SessionConfig::discover()?).await
    }

    /// Start a session with an explicit configuration.
    pub async fn with_config(config: SessionConfig) -> Result<Phantom, Error> {
        Ok(Phantom {
            session: Session::launch(config).await?,
        })
    }

    /// Wrap an already-running session.
    pub fn from_session(session: Session) -> Phantom {
        Phantom { session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Create a remote page and bind a handle to the id it reports.
    pub async fn create_page(&self) -> Result<Page, Error> {
        let response = self
            .session
            .execute("phantom", "createPage", vec![])
            .await?
            .await?;
        let id = response["pageId"]
            .as_str()
            .ok_or_else(|| Error::RemoteFailure(format!("createPage returned no pageId: {response}")))?
            .to_string();
        Ok(Page {
            session: self.session.clone(),
            id,
        })
    }

    /// Read a property of the remote `window` object.
    pub async fn window_property(&self, name: &str) -> Result<Value, Error> {
        self.execute("windowProperty", vec![CallArg::from(name)]).await
    }

    /// Set a property of the remote `window` object.
    pub async fn set_window_property(&self, name: &str, value: Value) -> Result<(), Error> {
        self.execute("windowProperty", vec![CallArg::from(name), CallArg::Value(value)])
            .await?;
        Ok(())
    }

    /// Descriptor the remote rewrites into a `phantom.callback(...)` value.
    ///
    /// PhantomJS accepts these where data is expected to be a callback,
    /// such as the `contents` of paper-size headers and footers; embed the
    /// result of [`CallbackDescriptor::to_value`] inside the property
    /// payload.
    pub fn callback_descriptor(&self, function: JsFunction) -> CallbackDescriptor {
        CallbackDescriptor::new(function)
    }

    /// Call `method` on the remote `phantom` object and await its result.
    pub async fn execute(&self, method: &str, args: Vec<CallArg>) -> Result<Value, Error> {
        self.session.execute("phantom", method, args).await?.await
    }

    /// Ask PhantomJS to shut itself down. See [`Session::exit`].
    pub async fn exit(&self) -> Result<(), Error> {
        self.session.exit().await
    }

    /// Force-terminate the process, failing everything in flight.
    pub async fn kill(&self) {
        self.session.kill().await;
    }
}

/// Handle to one remote page, addressed by the id `createPage` reported.
///
/// Clones refer to the same remote page. Dropping a `Page` does not close
/// the remote page; call [`Page::close`] for that.
#[derive(Clone)]
pub struct Page {
    session: Session,
    id: String,
}

impl Page {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Call a synchronous method of the remote page.
    pub async fn invoke(&self, method: &str, args: Vec<CallArg>) -> Result<Value, Error> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(CallArg::from(method));
        full.extend(args);
        self.call("invokeMethod", full).await
    }

    /// Call a method of the remote page that completes through a callback,
    /// such as `open`; the result settles when that callback fires.
    pub async fn invoke_async(&self, method: &str, args: Vec<CallArg>) -> Result<Value, Error> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(CallArg::from(method));
        full.extend(args);
        self.call("invokeAsyncMethod", full).await
    }

    /// Load `url`; resolves with the load status (`"success"` or `"fail"`).
    pub async fn open(&self, url: &str) -> Result<Value, Error> {
        self.invoke_async("open", vec![CallArg::from(url)]).await
    }

    /// Run `function` inside the page and return its result. Arguments are
    /// appended after the function source.
    pub async fn evaluate(&self, function: JsFunction, args: Vec<CallArg>) -> Result<Value, Error> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(CallArg::Function(function));
        full.extend(args);
        self.invoke("evaluate", full).await
    }

    /// Read a page property such as `content` or `url`.
    pub async fn property(&self, name: &str) -> Result<Value, Error> {
        self.call("property", vec![CallArg::from(name)]).await
    }

    /// Set a page property such as `viewportSize`.
    pub async fn set_property(&self, name: &str, value: Value) -> Result<(), Error> {
        self.call("property", vec![CallArg::from(name), CallArg::Value(value)])
            .await?;
        Ok(())
    }

    /// Close the remote page.
    pub async fn close(&self) -> Result<(), Error> {
        self.invoke("close", vec![]).await?;
        Ok(())
    }

    /// Subscribe `callback` to one of this page's events, for example
    /// `onLoadFinished`. Resolves once the remote acknowledges it will
    /// forward the event.
    pub async fn on(
        &self,
        event_type: &str,
        callback: EventCallback,
        extra_args: Vec<Value>,
    ) -> Result<(), Error> {
        self.session
            .on(event_type, &self.id, callback, extra_args)
            .await?
            .await?;
        Ok(())
    }

    /// Subscribe with a callback that runs inside PhantomJS itself.
    pub async fn on_remote(
        &self,
        event_type: &str,
        callback: JsFunction,
        args: Vec<Value>,
    ) -> Result<(), Error> {
        self.session
            .on_remote(event_type, &self.id, callback, args)
            .await?
            .await?;
        Ok(())
    }

    /// Drop local listeners for `event_type` and stop remote forwarding.
    pub async fn off(&self, event_type: &str) -> Result<(), Error> {
        self.session.off(event_type, &self.id).await?.await?;
        Ok(())
    }

    async fn call(&self, method: &str, args: Vec<CallArg>) -> Result<Value, Error> {
        self.session
            .execute(self.id.as_str(), method, args)
            .await?
            .await
    }
}
