use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use kite_dnode::{
    specs_from_map, ArgumentError, CallValue, DnodeError, Function, IntoArgs, Message, Method,
    Partial, RemoteInvoker, Scrubber,
};
use kite_protocol::{Authentication, Kite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::RpcError;
use crate::handler::Handler;
use crate::request::{parse_request, parse_response, response_value};
use crate::transport::Transport;

/// The write half: scrubs outgoing argument trees and queues frames for
/// the transport writer. Also serves as the stub invoker for callbacks
/// received from the peer.
struct OutboundLink {
    scrubber: Scrubber,
    tx: mpsc::UnboundedSender<String>,
}

impl OutboundLink {
    fn send_message(&self, method: Method, args: CallValue) -> Result<(), DnodeError> {
        let (json, callbacks) = self.scrubber.scrub(&args);
        let msg = Message::outgoing(method, &json, callbacks)?;
        self.tx
            .send(msg.encode()?)
            .map_err(|_| DnodeError::Send("transport closed".into()))
    }
}

impl RemoteInvoker for OutboundLink {
    fn invoke(&self, id: u64, args: CallValue) -> Result<(), DnodeError> {
        self.send_message(Method::Id(id), args)
    }
}

type Observer = Arc<dyn Fn(&RpcError) + Send + Sync>;
type PendingSlot = Arc<Mutex<Option<oneshot::Sender<Result<Partial, RpcError>>>>>;

struct ClientInner {
    methods: Mutex<HashMap<String, Arc<dyn Handler>>>,
    link: Arc<OutboundLink>,
    out_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    cancel: CancellationToken,
    observers: Mutex<Vec<Observer>>,
    pending: Mutex<Vec<PendingSlot>>,
    concurrent: bool,
    identity: Option<Kite>,
    auth: Mutex<Option<Authentication>>,
}

/// One side of a bidirectional RPC connection.
///
/// A client is built, given method handlers, and then driven against a
/// transport with [`run`](Client::run). Both peers are clients; there is
/// no server role at this layer.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

pub struct ClientBuilder {
    concurrent: bool,
    identity: Option<Kite>,
    auth: Option<Authentication>,
    methods: HashMap<String, Arc<dyn Handler>>,
    observers: Vec<Observer>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            concurrent: true,
            identity: None,
            auth: None,
            methods: HashMap::new(),
            observers: Vec::new(),
        }
    }

    /// Dispatch each received frame on its own task (the default), or run
    /// handlers inline on the read loop.
    pub fn concurrent(mut self, yes: bool) -> Self {
        self.concurrent = yes;
        self
    }

    /// The identity announced in the options envelope of outbound calls.
    pub fn identity(mut self, kite: Kite) -> Self {
        self.identity = Some(kite);
        self
    }

    /// Authentication material presented with outbound calls.
    pub fn auth(mut self, auth: Authentication) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn method(mut self, name: impl Into<String>, handler: impl Handler) -> Self {
        self.methods.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn observer(mut self, f: impl Fn(&RpcError) + Send + Sync + 'static) -> Self {
        self.observers.push(Arc::new(f));
        self
    }

    pub fn build(self) -> Client {
        let (tx, rx) = mpsc::unbounded_channel();
        Client {
            inner: Arc::new(ClientInner {
                methods: Mutex::new(self.methods),
                link: Arc::new(OutboundLink {
                    scrubber: Scrubber::new(),
                    tx,
                }),
                out_rx: Mutex::new(Some(rx)),
                cancel: CancellationToken::new(),
                observers: Mutex::new(self.observers),
                pending: Mutex::new(Vec::new()),
                concurrent: self.concurrent,
                identity: self.identity,
                auth: Mutex::new(self.auth),
            }),
        }
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn new() -> Client {
        ClientBuilder::new().build()
    }

    /// Register a method handler. Registration after construction is
    /// ordinary; connection-scoped handlers usually capture a clone of the
    /// client itself to issue calls back to the peer.
    pub fn method(&self, name: impl Into<String>, handler: impl Handler) {
        self.inner
            .methods
            .lock()
            .unwrap()
            .insert(name.into(), Arc::new(handler));
    }

    pub fn on_error(&self, f: impl Fn(&RpcError) + Send + Sync + 'static) {
        self.inner.observers.lock().unwrap().push(Arc::new(f));
    }

    /// Replace the authentication presented on future outbound calls.
    pub fn set_auth(&self, auth: Option<Authentication>) {
        *self.inner.auth.lock().unwrap() = auth;
    }

    /// Shut down: the run loop exits, supervising tasks observing the
    /// token stop, and in-flight calls fail with a disconnect.
    pub fn close(&self) {
        self.inner.cancel.cancel();
    }

    /// The shutdown token; child tasks tied to this connection listen on
    /// it.
    pub fn cancellation(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Live entries in the outbound-callback table.
    pub fn live_callbacks(&self) -> usize {
        self.inner.link.scrubber.len()
    }

    /// Drop outbound-callback entries the peer will not invoke again.
    pub fn cull(&self, ids: &[u64]) {
        self.inner.link.scrubber.cull_many(ids);
    }

    fn notify(&self, err: &RpcError) {
        tracing::warn!(error = %err, "rpc fault");
        let observers: Vec<Observer> = self.inner.observers.lock().unwrap().clone();
        for observer in observers {
            observer(err);
        }
    }

    fn options(&self, args: CallValue, response: Option<Function>) -> Result<CallValue, RpcError> {
        let identity = match &self.inner.identity {
            Some(kite) => CallValue::from_serialize(kite).map_err(RpcError::from)?,
            None => CallValue::Null,
        };
        let auth = match &*self.inner.auth.lock().unwrap() {
            Some(auth) => CallValue::from_serialize(auth).map_err(RpcError::from)?,
            None => CallValue::Null,
        };

        let mut fields = vec![
            ("kite", identity),
            ("authentication", auth),
            ("withArgs", args),
        ];
        if let Some(response) = response {
            fields.push(("responseCallback", CallValue::Function(response)));
        }
        Ok(CallValue::object(fields))
    }

    /// Fire-and-forget method invocation.
    pub fn tell(&self, method: &str, args: impl IntoArgs) -> Result<(), RpcError> {
        let options = self.options(args.into_args(), None)?;
        self.inner
            .link
            .send_message(Method::Name(method.into()), CallValue::Array(vec![options]))
            .map_err(RpcError::from)
    }

    /// Invoke a method and wait for its response callback.
    ///
    /// On timeout the call fails but the response-callback entry stays in
    /// the outbound table; a late reply is dropped by the resolved slot,
    /// and the caller may [`cull`](Client::cull) explicitly.
    pub async fn call(
        &self,
        method: &str,
        args: impl IntoArgs,
        timeout: Option<Duration>,
    ) -> Result<Partial, RpcError> {
        let (tx, rx) = oneshot::channel();
        let slot: PendingSlot = Arc::new(Mutex::new(Some(tx)));
        self.inner.pending.lock().unwrap().push(slot.clone());

        let resolver = slot.clone();
        let response = Function::local(move |args: Partial| {
            if let Some(tx) = resolver.lock().unwrap().take() {
                let _ = tx.send(parse_response(&args));
            }
        });

        let options = self.options(args.into_args(), Some(response))?;
        let sent = self
            .inner
            .link
            .send_message(Method::Name(method.into()), CallValue::Array(vec![options]))
            .map_err(RpcError::from);

        let result = match sent {
            Err(err) => Err(err),
            Ok(()) => {
                let wait = async { rx.await.map_err(|_| RpcError::Disconnect)? };
                match timeout {
                    Some(limit) => match tokio::time::timeout(limit, wait).await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(RpcError::Timeout(method.into())),
                    },
                    None => wait.await,
                }
            }
        };

        self.inner
            .pending
            .lock()
            .unwrap()
            .retain(|s| !Arc::ptr_eq(s, &slot));
        result
    }

    /// Drive the connection until the transport closes or the client is
    /// shut down. Call once; the outbound queue belongs to the first run.
    pub async fn run<T: Transport>(&self, mut transport: T) {
        let mut out_rx = match self.inner.out_rx.lock().unwrap().take() {
            Some(rx) => rx,
            None => {
                tracing::warn!("client already ran; refusing a second run loop");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = self.inner.cancel.cancelled() => break,
                out = out_rx.recv() => match out {
                    Some(frame) => {
                        if transport.send(frame).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                inbound = transport.recv() => match inbound {
                    Some(frame) => self.dispatch(frame).await,
                    None => break,
                },
            }
        }

        transport.close().await;
        self.inner.cancel.cancel();
        self.fail_pending();
    }

    fn fail_pending(&self) {
        let slots: Vec<PendingSlot> = self.inner.pending.lock().unwrap().drain(..).collect();
        for slot in slots {
            if let Some(tx) = slot.lock().unwrap().take() {
                let _ = tx.send(Err(RpcError::Disconnect));
            }
        }
    }

    async fn dispatch(&self, frame: String) {
        let msg = match Message::decode(&frame) {
            Ok(msg) => msg,
            Err(err) => {
                self.notify(&RpcError::Codec(err.to_string()));
                return;
            }
        };

        let args = msg.arguments_partial();
        let link = self.inner.link.clone();
        args.add_specs(specs_from_map(&msg.callbacks, |id| {
            Function::remote(id, link.clone())
        }));

        match msg.method {
            Method::Name(name) => self.dispatch_method(name, args).await,
            Method::Id(id) => self.dispatch_callback(id, args).await,
        }
    }

    async fn dispatch_method(&self, name: String, args: Partial) {
        let handler = self.inner.methods.lock().unwrap().get(&name).cloned();
        let Some(handler) = handler else {
            self.notify(&RpcError::MethodNotFound(name));
            return;
        };

        let (request, response) = parse_request(name.clone(), args);
        let fut = handler.handle(request);
        let client = self.clone();
        let task = async move {
            let outcome = match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(payload) => Err(panic_error(&name, payload.as_ref())),
            };
            if let Err(err) = &outcome {
                client.notify(err);
            }
            if let Some(response) = response {
                if let Err(err) = response.call((response_value(&outcome),)) {
                    client.notify(&err.into());
                }
            }
        };

        if self.inner.concurrent {
            tokio::spawn(task);
        } else {
            task.await;
        }
    }

    async fn dispatch_callback(&self, id: u64, args: Partial) {
        let Some(callback) = self.inner.link.scrubber.get(id) else {
            self.notify(&RpcError::CallbackNotFound(id));
            return;
        };

        let client = self.clone();
        let task = async move {
            let result =
                std::panic::catch_unwind(AssertUnwindSafe(|| callback.invoke_partial(args)));
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => client.notify(&err.into()),
                Err(payload) => {
                    client.notify(&panic_error(&format!("callback {id}"), payload.as_ref()));
                }
            }
        };

        if self.inner.concurrent {
            tokio::spawn(task);
        } else {
            task.await;
        }
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_error(target: &str, payload: &(dyn std::any::Any + Send)) -> RpcError {
    match payload.downcast_ref::<ArgumentError>() {
        Some(arg) => RpcError::Argument(arg.to_string()),
        None => RpcError::Argument(format!("handler for '{target}' panicked")),
    }
}
