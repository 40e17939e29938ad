use std::collections::{HashMap, hash_map};
use std::sync::Arc;

use tracing::debug;

use crate::{
    Error, Handler, NotificationContext, Params, RequestContext, Response, Result, SpecRegistry,
};

type RequestFn = Box<dyn FnMut(Params, RequestContext) -> Result<Response> + Send>;
type NotificationFn = Box<dyn FnMut(Params, NotificationContext) -> Result<()> + Send>;

/// Method table routing inbound messages to registered handlers.
///
/// With a [`SpecRegistry`] attached, requests are checked against the spec
/// before the handler runs: unknown methods are answered with `-32601` even
/// if a handler is registered, parameter schema violations with `-32602`.
///
/// ```no_run
/// use a2a_json_rpc::{Dispatcher, Session, SessionOptions, SpecRegistry, a2a};
///
/// let handler = Dispatcher::with_spec(SpecRegistry::bundled_arc())
///     .on_request(a2a::methods::TASKS_CANCEL, |_params, _cx| {
///         Err(a2a::task_not_cancelable("task-1"))
///     });
/// let session = Session::from_stdio(handler, &SessionOptions::default());
/// ```
#[derive(Default)]
pub struct Dispatcher {
    requests: HashMap<String, RequestFn>,
    notifications: HashMap<String, NotificationFn>,
    spec: Option<Arc<SpecRegistry>>,
}

/// Attempt to bind two handlers to one method name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("method `{0}` is already registered")]
pub struct DuplicateMethod(pub String);

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_spec(spec: Arc<SpecRegistry>) -> Self {
        Self {
            spec: Some(spec),
            ..Self::default()
        }
    }

    pub fn spec(&self) -> Option<&Arc<SpecRegistry>> {
        self.spec.as_ref()
    }

    /// Binds a request handler.
    ///
    /// # Panics
    ///
    /// Panics if the method is already bound; use
    /// [`try_on_request`](Self::try_on_request) to handle that case.
    #[must_use]
    pub fn on_request(
        mut self,
        method: impl Into<String>,
        f: impl FnMut(Params, RequestContext) -> Result<Response> + Send + 'static,
    ) -> Self {
        if let Err(e) = self.try_on_request(method, f) {
            panic!("{e}");
        }
        self
    }
    pub fn try_on_request(
        &mut self,
        method: impl Into<String>,
        f: impl FnMut(Params, RequestContext) -> Result<Response> + Send + 'static,
    ) -> Result<(), DuplicateMethod> {
        match self.requests.entry(method.into()) {
            hash_map::Entry::Occupied(e) => Err(DuplicateMethod(e.key().clone())),
            hash_map::Entry::Vacant(e) => {
                e.insert(Box::new(f));
                Ok(())
            }
        }
    }

    /// Binds a notification handler.
    ///
    /// # Panics
    ///
    /// Panics if the method is already bound.
    #[must_use]
    pub fn on_notification(
        mut self,
        method: impl Into<String>,
        f: impl FnMut(Params, NotificationContext) -> Result<()> + Send + 'static,
    ) -> Self {
        if let Err(e) = self.try_on_notification(method, f) {
            panic!("{e}");
        }
        self
    }
    pub fn try_on_notification(
        &mut self,
        method: impl Into<String>,
        f: impl FnMut(Params, NotificationContext) -> Result<()> + Send + 'static,
    ) -> Result<(), DuplicateMethod> {
        match self.notifications.entry(method.into()) {
            hash_map::Entry::Occupied(e) => Err(DuplicateMethod(e.key().clone())),
            hash_map::Entry::Vacant(e) => {
                e.insert(Box::new(f));
                Ok(())
            }
        }
    }
}

impl Handler for Dispatcher {
    fn request(&mut self, method: &str, params: Params, cx: RequestContext) -> Result<Response> {
        if let Some(spec) = &self.spec {
            spec.validate_request(method, params.raw())?;
        }
        match self.requests.get_mut(method) {
            Some(f) => f(params, cx),
            None => Err(Error::method_not_found()),
        }
    }

    fn notification(&mut self, method: &str, params: Params, cx: NotificationContext) -> Result<()> {
        match self.notifications.get_mut(method) {
            Some(f) => f(params, cx),
            None => {
                debug!(method, "no handler registered for notification");
                Ok(())
            }
        }
    }
}
