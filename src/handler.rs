use crate::{NotificationContext, Params, RequestContext, Response, Result};

/// Capability interface a session dispatches inbound messages to.
///
/// `request` must produce a [`Response`] through the context (immediately
/// via [`RequestContext::success`] / [`RequestContext::handle`], or later
/// via [`RequestContext::handle_async`]); returning `Err` sends an error
/// response. Handlers for long-running work should spawn so the session
/// keeps dispatching.
pub trait Handler {
    fn request(&mut self, method: &str, params: Params, cx: RequestContext) -> Result<Response>;

    /// Notifications expect no response; an `Err` is logged and dropped.
    fn notification(&mut self, method: &str, params: Params, cx: NotificationContext) -> Result<()> {
        let _ = (method, params, cx);
        Ok(())
    }
}

/// A peer that answers every request with "method not found".
impl Handler for () {
    fn request(&mut self, _method: &str, _params: Params, cx: RequestContext) -> Result<Response> {
        cx.method_not_found()
    }
}
