//! Asynchronous JSON-RPC 2.0 engine for the Agent-to-Agent (A2A) protocol.
//!
//! A [`Session`] runs one JSON-RPC conversation over a byte stream or a
//! custom [`MessageRead`]/[`MessageWrite`] pair. Both sides may issue
//! requests and notifications concurrently; responses are correlated back to
//! their callers by id, in any arrival order. Inbound requests are routed to
//! a [`Handler`], most conveniently a [`Dispatcher`] carrying the bundled
//! A2A [`SpecRegistry`].

use std::{
    collections::{HashMap, VecDeque, hash_map},
    future::Future,
    mem,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, Weak},
    task::{Context, Poll, Waker},
    time::Duration,
};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::{
    io::{AsyncBufRead, AsyncWrite},
    spawn,
    task::{AbortHandle, JoinHandle},
};
use tracing::{debug, warn};

pub mod a2a;
mod dispatcher;
mod error;
mod handler;
mod message;
mod message_read;
mod message_write;
mod session_builder;
mod spec;
mod utils;

pub use dispatcher::*;
pub use error::*;
pub use handler::*;
pub use message::*;
pub use message_read::*;
pub use message_write::*;
pub use spec::*;

/// Placeholder for requests and notifications that carry no parameters.
pub const NO_PARAMS: Option<&()> = None;

/// Parameters of an inbound request or notification.
#[derive(Clone, Copy, Debug)]
pub struct Params<'a>(&'a Option<Value>);

impl<'a> Params<'a> {
    /// Deserializes the parameters, failing with `-32602` when they are
    /// absent or do not fit `T`.
    pub fn to<'b, T>(&'b self) -> Result<T>
    where
        T: Deserialize<'b>,
    {
        if let Some(p) = self.to_opt()? {
            Ok(p)
        } else {
            Err(Error::invalid_params("params are required"))
        }
    }
    pub fn to_opt<'b, T>(&'b self) -> Result<Option<T>>
    where
        T: Deserialize<'b>,
    {
        if let Some(p) = self.0 {
            match T::deserialize(p) {
                Ok(p) => Ok(Some(p)),
                Err(e) => Err(Error::invalid_params(e)),
            }
        } else {
            Ok(None)
        }
    }
    pub fn raw(&self) -> Option<&'a Value> {
        self.0.as_ref()
    }
}

/// Per-request capabilities handed to [`Handler::request`].
pub struct RequestContext<'a> {
    m: &'a RequestMessage,
    session: &'a Arc<RawSession>,
}
impl<'a> RequestContext<'a> {
    fn new(m: &'a RequestMessage, session: &'a Arc<RawSession>) -> Self {
        Self { m, session }
    }

    pub fn id(&self) -> &RequestId {
        &self.m.id
    }
    pub fn method(&self) -> &str {
        &self.m.method
    }
    pub fn session(&self) -> SessionContext {
        SessionContext::new(self.session)
    }

    /// Responds immediately with `result`.
    pub fn success<T>(self, result: &T) -> Result<Response>
    where
        T: Serialize + ?Sized,
    {
        Ok(Response(RawResponse::Value(to_value(result)?)))
    }
    /// Responds immediately with the value or the error.
    pub fn handle<T>(self, result: Result<T>) -> Result<Response>
    where
        T: Serialize,
    {
        let value = result?;
        self.success(&value)
    }
    /// Completes the request from a spawned task; the session keeps
    /// dispatching while it runs. The peer can cancel it through
    /// [`SessionContext::cancel_incoming_request`]. A panic in the task is
    /// contained and answered with an internal error.
    pub fn handle_async<Fut, T>(self, task: Fut) -> Result<Response>
    where
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let id = self.m.id.clone();
        let session = SessionContext::new(self.session);
        let task = spawn(async move {
            match task.await {
                Ok(value) => to_value(&value),
                Err(e) => Err(e),
            }
        });
        let abort = task.abort_handle();
        let watcher = spawn(async move {
            let result = match task.await {
                Ok(result) => result,
                // Cancelled means no response at all; a panic becomes one.
                Err(e) if e.is_cancelled() => return,
                Err(e) => Err(e.into()),
            };
            if let Some(s) = session.0.upgrade() {
                s.send_response(Some(id), result).await;
            }
        });
        self.session.lock().insert_task(watcher);
        Ok(Response(RawResponse::Spawn(abort)))
    }
    pub fn method_not_found(self) -> Result<Response> {
        Err(Error::method_not_found())
    }
}

fn to_value<T>(value: &T) -> Result<Value>
where
    T: Serialize + ?Sized,
{
    serde_json::to_value(value).map_err(Error::from)
}

/// Capabilities handed to [`Handler::notification`].
pub struct NotificationContext<'a> {
    method: &'a str,
    session: &'a Arc<RawSession>,
}
impl<'a> NotificationContext<'a> {
    fn new(method: &'a str, session: &'a Arc<RawSession>) -> Self {
        Self { method, session }
    }
    pub fn method(&self) -> &str {
        self.method
    }
    pub fn session(&self) -> SessionContext {
        SessionContext::new(self.session)
    }
    /// Runs follow-up work without blocking the dispatch loop.
    pub fn spawn(self, task: impl Future<Output = ()> + Send + 'static) {
        self.session.lock().insert_task(spawn(task));
    }
}

enum RawResponse {
    Value(Value),
    Spawn(AbortHandle),
}

/// Opaque outcome of a request handler, constructed through
/// [`RequestContext`].
pub struct Response(RawResponse);

/// Lifecycle of one inbound request.
///
/// `Init` covers the window between handler invocation and task
/// registration; a cancel arriving in that window parks the entry as
/// `Cancelled` so the task is aborted as soon as it is registered.
enum IncomingRequestState {
    Init,
    Running(AbortHandle),
    Cancelled,
}

/// Correlation slot for one outgoing request.
enum OutgoingRequestState {
    None,
    Waker(Waker),
    Ready(SessionResult<Value>),
    End,
}
impl OutgoingRequestState {
    fn new() -> Self {
        Self::None
    }
    fn poll(&mut self, waker: &Waker) -> Poll<SessionResult<Value>> {
        match self {
            Self::None | Self::Waker(_) => {
                *self = Self::Waker(waker.clone());
                Poll::Pending
            }
            Self::Ready(_) => {
                if let Self::Ready(r) = mem::replace(self, Self::End) {
                    Poll::Ready(r)
                } else {
                    unreachable!()
                }
            }
            Self::End => panic!("poll after completion"),
        }
    }
    fn set_ready(&mut self, result: SessionResult<Value>) {
        match mem::replace(self, Self::Ready(result)) {
            Self::None => {}
            Self::Waker(waker) => waker.wake(),
            // Late resolution after the caller abandoned the request.
            Self::Ready(_) | Self::End => *self = Self::End,
        }
    }
}

/// Handle for issuing outgoing messages from handler code; holds the
/// session weakly so it never keeps a dropped session alive.
#[derive(Clone)]
pub struct SessionContext(Weak<RawSession>);

impl SessionContext {
    fn new(session: &Arc<RawSession>) -> Self {
        Self(Arc::downgrade(session))
    }

    pub async fn request<R>(&self, method: &str, params: Option<&impl Serialize>) -> SessionResult<R>
    where
        R: DeserializeOwned,
    {
        let Some(s) = self.0.upgrade() else {
            return Err(SessionError::Shutdown);
        };
        let value = s.send_request(method, to_params(params)?).await?;
        serde_json::from_value(value).map_err(SessionError::deserialize)
    }
    pub async fn notification(
        &self,
        method: &str,
        params: Option<&impl Serialize>,
    ) -> SessionResult<()> {
        let Some(s) = self.0.upgrade() else {
            return Err(SessionError::Shutdown);
        };
        s.send_notification(method, to_params(params)?).await
    }
    /// Abandons an inbound request: its task is aborted and no response is
    /// sent. No-op if the request already finished.
    pub fn cancel_incoming_request(&self, id: &RequestId) {
        if let Some(s) = self.0.upgrade() {
            s.lock().cancel_incoming(id);
        }
    }
}

struct SessionState {
    incoming_requests: HashMap<RequestId, IncomingRequestState>,
    outgoing_requests: HashMap<u128, Arc<Mutex<OutgoingRequestState>>>,
    tasks: VecDeque<JoinHandle<()>>,
    next_outgoing_request_id: u128,
    error: Option<SessionError>,
}
impl SessionState {
    fn new() -> Self {
        Self {
            incoming_requests: HashMap::new(),
            outgoing_requests: HashMap::new(),
            tasks: VecDeque::new(),
            next_outgoing_request_id: 0,
            error: None,
        }
    }

    fn insert_incoming_request(&mut self, id: &RequestId) -> Result<()> {
        match self.incoming_requests.entry(id.clone()) {
            hash_map::Entry::Occupied(_) => Err(Error::new(ErrorCode::INVALID_REQUEST)
                .with_data(serde_json::json!({"reason": "request id is already in flight"}))),
            hash_map::Entry::Vacant(e) => {
                e.insert(IncomingRequestState::Init);
                Ok(())
            }
        }
    }
    fn set_incoming_request_task(&mut self, id: &RequestId, task: AbortHandle) {
        match self.incoming_requests.get_mut(id) {
            Some(state @ IncomingRequestState::Init) => {
                *state = IncomingRequestState::Running(task);
            }
            Some(IncomingRequestState::Cancelled) => {
                task.abort();
                self.incoming_requests.remove(id);
            }
            // Already responded and removed; the task has finished.
            Some(IncomingRequestState::Running(_)) | None => {}
        }
    }
    fn remove_incoming(&mut self, id: &RequestId) {
        self.incoming_requests.remove(id);
    }
    fn cancel_incoming(&mut self, id: &RequestId) {
        let abort = match self.incoming_requests.get_mut(id) {
            Some(state @ IncomingRequestState::Init) => {
                *state = IncomingRequestState::Cancelled;
                false
            }
            Some(IncomingRequestState::Running(_)) => true,
            _ => false,
        };
        if abort {
            if let Some(IncomingRequestState::Running(task)) = self.incoming_requests.remove(id) {
                task.abort();
            }
        }
    }

    fn insert_outgoing_request(&mut self) -> SessionResult<(u128, Arc<Mutex<OutgoingRequestState>>)> {
        if let Some(e) = &self.error {
            return Err(e.clone());
        }
        if self.next_outgoing_request_id == u128::MAX {
            return Err(SessionError::RequestIdOverflow);
        }
        let id = self.next_outgoing_request_id;
        self.next_outgoing_request_id += 1;
        let state = Arc::new(Mutex::new(OutgoingRequestState::new()));
        self.outgoing_requests.insert(id, state.clone());
        Ok((id, state))
    }

    fn insert_task(&mut self, task: JoinHandle<()>) {
        if self.tasks.capacity() == self.tasks.len() {
            self.tasks.retain(|h| !h.is_finished());
        }
        self.tasks.push_back(task);
    }
}

struct RawSession {
    state: Mutex<SessionState>,
    writer: tokio::sync::Mutex<BoxMessageWriter>,
    expose_internals: bool,
    request_timeout: Option<Duration>,
}

impl RawSession {
    fn new(writer: BoxMessageWriter, options: &SessionOptions) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SessionState::new()),
            writer: tokio::sync::Mutex::new(writer),
            expose_internals: options
                .expose_internals
                .unwrap_or(cfg!(debug_assertions)),
            request_timeout: options.request_timeout,
        })
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap()
    }

    /// Stores the first fatal error and fails everything in flight.
    fn set_error(&self, e: SessionError) {
        let mut state = self.lock();
        let error = state.error.get_or_insert(e).clone();
        for (_, slot) in state.outgoing_requests.drain() {
            slot.lock().unwrap().set_ready(Err(error.clone()));
        }
        for (_, incoming) in state.incoming_requests.drain() {
            if let IncomingRequestState::Running(task) = incoming {
                task.abort();
            }
        }
        while let Some(task) = state.tasks.pop_front() {
            task.abort();
        }
    }
    fn error(&self) -> Option<SessionError> {
        self.lock().error.clone()
    }

    async fn write_message(&self, m: RawMessage) -> SessionResult<()> {
        let result = self.writer.lock().await.write(m.into()).await;
        if let Err(e) = &result {
            self.set_error(e.clone());
        }
        result
    }

    async fn send_request(&self, method: &str, params: Option<Value>) -> SessionResult<Value> {
        let guard = OutgoingRequestGuard::new(self)?;
        let m = RawMessage {
            id: Some(RequestId::from(guard.id)),
            method: Some(method.to_string()),
            params,
            ..RawMessage::default()
        };
        self.write_message(m).await?;
        match self.request_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, &guard).await {
                Ok(result) => result,
                Err(_) => Err(SessionError::RequestTimeout),
            },
            None => (&guard).await,
        }
    }

    async fn send_notification(&self, method: &str, params: Option<Value>) -> SessionResult<()> {
        if let Some(e) = self.error() {
            return Err(e);
        }
        let m = RawMessage {
            method: Some(method.to_string()),
            params,
            ..RawMessage::default()
        };
        self.write_message(m).await
    }

    /// Sends a response and retires the incoming entry it answers.
    async fn send_response(&self, id: Option<RequestId>, result: Result<Value>) {
        if let Some(id) = &id {
            self.lock().remove_incoming(id);
        }
        let result = result.map_err(|e| e.to_error_object(self.expose_internals));
        let m = RawMessage::from_result(id, result);
        if let Err(e) = self.write_message(m).await {
            debug!(error = %e, "failed to write response");
        }
    }

    /// Resolves the correlation entry a response answers.
    fn on_response(&self, id: RequestId, result: SessionResult<Value>) {
        let Some(key) = id.as_correlation_key() else {
            warn!(%id, "orphan response: id was never issued by this session");
            return;
        };
        let slot = self.lock().outgoing_requests.remove(&key);
        match slot {
            Some(slot) => slot.lock().unwrap().set_ready(result),
            None => warn!(%id, "orphan response: no request pending under this id"),
        }
    }
}

/// Removes the correlation entry when the caller stops waiting, whether it
/// resolved, timed out, or was dropped mid-flight.
struct OutgoingRequestGuard<'a> {
    id: u128,
    state: Arc<Mutex<OutgoingRequestState>>,
    session: &'a RawSession,
}
impl<'a> OutgoingRequestGuard<'a> {
    fn new(session: &'a RawSession) -> SessionResult<Self> {
        let (id, state) = session.lock().insert_outgoing_request()?;
        Ok(Self { id, state, session })
    }
}

impl Future for &'_ OutgoingRequestGuard<'_> {
    type Output = SessionResult<Value>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.state.lock().unwrap().poll(cx.waker())
    }
}

impl Drop for OutgoingRequestGuard<'_> {
    fn drop(&mut self) {
        self.session.lock().outgoing_requests.remove(&self.id);
    }
}

/// Reads inbound messages and routes them: requests and notifications to
/// the handler, responses to the correlation table.
struct MessageDispatcher<H> {
    session: Arc<RawSession>,
    handler: H,
}
impl<H> MessageDispatcher<H>
where
    H: Handler + Send,
{
    async fn run(
        session: Arc<RawSession>,
        handler: H,
        mut reader: impl MessageRead + Send + Sync,
    ) -> SessionResult<()> {
        let mut this = Self { session, handler };
        loop {
            match reader.read().await {
                Ok(Some(batch)) => {
                    for m in batch {
                        this.on_message(m).await;
                    }
                }
                Ok(None) => {
                    // Clean disconnect still has to resolve everything the
                    // peer will never answer.
                    this.session.set_error(SessionError::Shutdown);
                    return Ok(());
                }
                Err(SessionError::Deserialize(e)) => {
                    debug!(error = %e, "unparsable inbound message");
                    this.session
                        .send_response(None, Err(Error::new(ErrorCode::PARSE_ERROR)))
                        .await;
                }
                Err(e) => {
                    this.session.set_error(e.clone());
                    return Err(e);
                }
            }
        }
    }

    async fn on_message(&mut self, m: RawMessage) {
        match m.try_into_message() {
            Ok(Message::Request(m)) => self.on_request(m).await,
            Ok(Message::Notification(m)) => self.on_notification(m),
            Ok(Message::Success(m)) => self.session.on_response(m.id, Ok(m.result)),
            Ok(Message::Error(m)) => self
                .session
                .on_response(m.id, Err(SessionError::ErrorObject(m.error))),
            // Shape violation: answer with a null id, the message cannot be
            // attributed to a request.
            Err(e) => self.session.send_response(None, Err(e)).await,
        }
    }

    async fn on_request(&mut self, m: RequestMessage) {
        // Do not hold the state lock across the reply write below.
        let inserted = self.session.lock().insert_incoming_request(&m.id);
        if let Err(e) = inserted {
            // Answer without touching the entry already under this id.
            let eo = e.to_error_object(self.session.expose_internals);
            let reply = RawMessage::from_result(Some(m.id.clone()), Err(eo));
            if let Err(e) = self.session.write_message(reply).await {
                debug!(error = %e, "failed to write duplicate-id response");
            }
            return;
        }
        let cx = RequestContext::new(&m, &self.session);
        match self.handler.request(&m.method, Params(&m.params), cx) {
            Ok(Response(RawResponse::Value(value))) => {
                self.session.send_response(Some(m.id), Ok(value)).await;
            }
            Ok(Response(RawResponse::Spawn(task))) => {
                self.session.lock().set_incoming_request_task(&m.id, task);
            }
            Err(e) => self.session.send_response(Some(m.id), Err(e)).await,
        }
    }

    fn on_notification(&mut self, m: NotificationMessage) {
        let cx = NotificationContext::new(&m.method, &self.session);
        if let Err(e) = self.handler.notification(&m.method, Params(&m.params), cx) {
            debug!(method = %m.method, error = %e, "notification handler failed");
        }
    }
}

/// Session construction options.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Send internal error detail (source chain, backtrace) to the peer.
    /// Defaults to on in debug builds, off otherwise.
    pub expose_internals: Option<bool>,
    /// Fail outgoing requests that are not answered within this duration.
    /// `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
}

/// One JSON-RPC conversation.
///
/// Dropping the session shuts it down: the read loop stops and pending
/// requests fail with [`SessionError::Shutdown`].
pub struct Session {
    session: Arc<RawSession>,
    read_task: Mutex<Option<JoinHandle<SessionResult<()>>>>,
}

impl Session {
    /// Runs a session over a byte stream carrying line-delimited JSON.
    pub fn new(
        handler: impl Handler + Send + 'static,
        reader: impl AsyncBufRead + Send + Sync + Unpin + 'static,
        writer: impl AsyncWrite + Send + Sync + Unpin + 'static,
        options: &SessionOptions,
    ) -> Self {
        Self::with_io(
            handler,
            LineMessageReader::new(reader),
            LineMessageWriter::new(writer),
            options,
        )
    }

    /// Runs a session over a custom transport.
    pub fn with_io(
        handler: impl Handler + Send + 'static,
        reader: impl MessageRead + Send + Sync + 'static,
        writer: impl MessageWrite + Send + Sync + 'static,
        options: &SessionOptions,
    ) -> Self {
        let session = RawSession::new(writer.boxed(), options);
        let read_task = spawn(MessageDispatcher::run(session.clone(), handler, reader));
        Self {
            session,
            read_task: Mutex::new(Some(read_task)),
        }
    }

    pub fn context(&self) -> SessionContext {
        SessionContext::new(&self.session)
    }

    /// Issues a request and waits for its terminal outcome: the decoded
    /// result, an error response, or a timeout.
    pub async fn request<R>(&self, method: &str, params: Option<&impl Serialize>) -> SessionResult<R>
    where
        R: DeserializeOwned,
    {
        let value = self
            .session
            .send_request(method, to_params(params)?)
            .await?;
        serde_json::from_value(value).map_err(SessionError::deserialize)
    }

    /// Sends a notification; no response will ever arrive for it.
    pub async fn notification(
        &self,
        method: &str,
        params: Option<&impl Serialize>,
    ) -> SessionResult<()> {
        self.session.send_notification(method, to_params(params)?).await
    }

    /// Waits for the peer to disconnect. Returns the session error if the
    /// conversation ended abnormally.
    pub async fn wait(&self) -> SessionResult<()> {
        let task = self.read_task.lock().unwrap().take();
        match task {
            Some(task) => match task.await {
                Ok(result) => result,
                Err(_) => Err(self.session.error().unwrap_or(SessionError::Shutdown)),
            },
            None => match self.session.error() {
                Some(e) => Err(e),
                None => Ok(()),
            },
        }
    }

    /// Stops the read loop and fails everything in flight with
    /// [`SessionError::Shutdown`].
    pub fn shutdown(&self) {
        if let Some(task) = self.read_task.lock().unwrap().take() {
            task.abort();
        }
        self.session.set_error(SessionError::Shutdown);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn to_params<P>(params: Option<&P>) -> SessionResult<Option<Value>>
where
    P: Serialize,
{
    match params {
        Some(p) => Ok(Some(
            serde_json::to_value(p).map_err(SessionError::serialize)?,
        )),
        None => Ok(None),
    }
}
