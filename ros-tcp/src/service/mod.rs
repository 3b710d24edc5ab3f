//! Typed service servers and clients.

pub mod provider;

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::master::MasterClient;
use crate::msg::{RosMessage, RosService};
use crate::name::{GraphName, NodeNameResolver};
use crate::rpc::resolve_uri;
use crate::slave::SlaveServer;
use crate::tcpros::Connection;
use crate::tcpros::handshake::client_handshake;
use crate::tcpros::header::{self, ConnectionHeader};
use crate::{Builder, Error, Result};

use provider::{PendingCall, ServiceDescriptor, ServiceHandler, ServiceProvider, ServiceReply};

pub struct ServerBuilder<S> {
    pub(crate) name: String,
    pub(crate) names: NodeNameResolver,
    pub(crate) slave: SlaveServer,
    pub(crate) _phantom_data: PhantomData<S>,
}

impl<S: RosService> ServerBuilder<S> {
    /// Serve calls by running `callback` on the connection task. An `Err`
    /// is sent back to the caller as a failed call.
    pub async fn build_with_callback<F>(self, callback: F) -> Result<ServiceServer<S>>
    where
        F: Fn(S::Request) -> std::result::Result<S::Response, String> + Send + Sync + 'static,
    {
        let handler = ServiceHandler::Callback(Arc::new(move |payload: Vec<u8>| -> ServiceReply {
            let request = S::Request::from_bytes(&payload).map_err(|e| e.to_string())?;
            let response = callback(request)?;
            response.to_bytes().map_err(|e| e.to_string())
        }));
        self.build_internal(handler, None).await
    }

    #[tracing::instrument(name = "service_build", skip(self, handler, rx), fields(service = %self.name))]
    async fn build_internal(
        self,
        handler: ServiceHandler,
        rx: Option<flume::Receiver<PendingCall>>,
    ) -> Result<ServiceServer<S>> {
        let name = self.names.resolve_str(&self.name)?;
        let descriptor = ServiceDescriptor {
            name,
            type_info: S::type_info(),
            request_type: S::Request::msg_type().to_string(),
            response_type: S::Response::msg_type().to_string(),
        };
        let provider = Arc::new(ServiceProvider::new(
            descriptor,
            self.slave.name().clone(),
            self.slave.service_uri()?,
            handler,
            self.slave.cancel_token().child_token(),
        ));
        self.slave.register_service(provider.clone()).await?;
        info!("[SRV] Service ready: {} at {}", provider.name(), provider.uri());

        Ok(ServiceServer {
            provider,
            rx,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            slave: self.slave,
            _phantom_data: PhantomData,
        })
    }
}

impl<S: RosService> Builder for ServerBuilder<S> {
    type Output = ServiceServer<S>;

    async fn build(self) -> Result<ServiceServer<S>> {
        let (tx, rx) = flume::unbounded();
        self.build_internal(ServiceHandler::Queue(tx), Some(rx)).await
    }
}

/// Server side of a typed service.
///
/// Queue-backed servers hand requests out through [`take_request`] and
/// answer them with [`send_response`]; every request gets an id so replies
/// may be sent in any order.
///
/// [`take_request`]: ServiceServer::take_request
/// [`send_response`]: ServiceServer::send_response
pub struct ServiceServer<S: RosService> {
    provider: Arc<ServiceProvider>,
    rx: Option<flume::Receiver<PendingCall>>,
    pending: Mutex<HashMap<u64, oneshot::Sender<ServiceReply>>>,
    next_id: AtomicU64,
    slave: SlaveServer,
    _phantom_data: PhantomData<S>,
}

impl<S: RosService> ServiceServer<S> {
    pub fn name(&self) -> &GraphName {
        self.provider.name()
    }

    pub fn uri(&self) -> &url::Url {
        self.provider.uri()
    }

    /// Calls served so far.
    pub fn calls(&self) -> u64 {
        self.provider.calls()
    }

    fn rx(&self) -> Result<&flume::Receiver<PendingCall>> {
        self.rx.as_ref().ok_or_else(|| Error::NoQueue(self.name().to_string()))
    }

    fn admit(&self, call: PendingCall) -> Result<(u64, S::Request)> {
        let request = match S::Request::from_bytes(&call.payload) {
            Ok(request) => request,
            Err(e) => {
                let _ = call.reply.send(Err(e.to_string()));
                return Err(e);
            }
        };
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.pending.lock().insert(id, call.reply);
        Ok((id, request))
    }

    /// Block until a request arrives.
    pub fn take_request(&self) -> Result<(u64, S::Request)> {
        let call = self.rx()?.recv().map_err(|_| Error::Closed)?;
        self.admit(call)
    }

    pub async fn take_request_async(&self) -> Result<(u64, S::Request)> {
        let call = self.rx()?.recv_async().await.map_err(|_| Error::Closed)?;
        self.admit(call)
    }

    pub fn send_response(&self, id: u64, response: &S::Response) -> Result<()> {
        let bytes = response.to_bytes()?;
        self.reply(id, Ok(bytes))
    }

    /// Fail request `id`; the caller sees [`Error::ServiceFailed`] with
    /// `message`.
    pub fn send_error(&self, id: u64, message: &str) -> Result<()> {
        self.reply(id, Err(message.to_string()))
    }

    fn reply(&self, id: u64, reply: ServiceReply) -> Result<()> {
        let sender = self
            .pending
            .lock()
            .remove(&id)
            .ok_or_else(|| Error::Protocol(format!("no pending request {} on {}", id, self.name())))?;
        sender.send(reply).map_err(|_| {
            debug!("[SRV] Caller of request {} on {} went away", id, self.name());
            Error::Closed
        })
    }
}

impl<S: RosService> Drop for ServiceServer<S> {
    fn drop(&mut self) {
        self.slave.release_service(&self.provider);
    }
}

pub struct ClientBuilder<S> {
    pub(crate) name: String,
    pub(crate) names: NodeNameResolver,
    pub(crate) slave: SlaveServer,
    pub(crate) persistent: bool,
    pub(crate) _phantom_data: PhantomData<S>,
}

impl<S> ClientBuilder<S> {
    /// Keep one connection to the server open across calls.
    pub fn with_persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }
}

impl<S: RosService> Builder for ClientBuilder<S> {
    type Output = ServiceClient<S>;

    async fn build(self) -> Result<ServiceClient<S>> {
        let name = self.names.resolve_str(&self.name)?;
        debug!("[CLI] Client for {} (persistent={})", name, self.persistent);
        Ok(ServiceClient {
            name,
            caller_id: self.slave.name().clone(),
            master: self.slave.master().clone(),
            timeout: self.slave.rpc_timeout(),
            persistent: self.persistent,
            conn: tokio::sync::Mutex::new(None),
            _phantom_data: PhantomData,
        })
    }
}

/// Client side of a typed service. The provider is looked up on the master
/// whenever a new connection is needed.
pub struct ServiceClient<S: RosService> {
    name: GraphName,
    caller_id: GraphName,
    master: MasterClient,
    timeout: Duration,
    persistent: bool,
    conn: tokio::sync::Mutex<Option<Connection>>,
    _phantom_data: PhantomData<S>,
}

impl<S: RosService> ServiceClient<S> {
    pub fn name(&self) -> &GraphName {
        &self.name
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub async fn call(&self, request: &S::Request) -> Result<S::Response> {
        self.call_timeout(request, self.timeout).await
    }

    /// Fails with [`Error::Timeout`] if no response arrives within `timeout`,
    /// covering lookup and connection setup as well.
    pub async fn call_timeout(&self, request: &S::Request, timeout: Duration) -> Result<S::Response> {
        tokio::time::timeout(timeout, self.call_inner(request))
            .await
            .map_err(|_| Error::timeout(format!("call to {}", self.name), timeout))?
    }

    async fn call_inner(&self, request: &S::Request) -> Result<S::Response> {
        let payload = request.to_bytes()?;
        let mut slot = self.conn.lock().await;
        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => self.connect().await?,
        };

        conn.write_frame(&payload).await?;
        let reply = conn.read_service_response().await?;
        if self.persistent {
            *slot = Some(conn);
        } else {
            conn.close().await;
        }

        match reply {
            Ok(bytes) => S::Response::from_bytes(&bytes),
            Err(message) => {
                warn!("[CLI] {} failed: {}", self.name, message);
                Err(Error::ServiceFailed(message))
            }
        }
    }

    async fn lookup(&self) -> Result<url::Url> {
        self.master
            .lookup_service(&self.caller_id, self.name.as_str())
            .await
            .map_err(|e| match e {
                Error::Remote { .. } => Error::NoSuchService(self.name.to_string()),
                e => e,
            })
    }

    async fn connect(&self) -> Result<Connection> {
        let uri = self.lookup().await?;
        let addr = resolve_uri(&uri).await?;
        debug!("[CLI] Connecting to {} at {}", self.name, uri);

        let mut conn = Connection::connect(addr).await?;
        let request = ConnectionHeader::new()
            .with(header::CALLER_ID, self.caller_id.as_str())
            .with(header::SERVICE, self.name.as_str())
            .with(header::MD5SUM, S::md5sum())
            .with(header::TYPE, S::service_type())
            .with(header::PERSISTENT, if self.persistent { "1" } else { "0" });
        client_handshake(&mut conn, self.name.as_str(), &request, &S::type_info()).await?;
        Ok(conn)
    }

    /// Poll the master until a provider is registered or `timeout` passes.
    pub async fn wait_for_service(&self, timeout: Duration) -> Result<()> {
        let poll = async {
            loop {
                match self.lookup().await {
                    Ok(_) => return Ok(()),
                    Err(Error::NoSuchService(_)) => tokio::time::sleep(Duration::from_millis(100)).await,
                    Err(e) => return Err(e),
                }
            }
        };
        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| Error::timeout(format!("waiting for {}", self.name), timeout))?
    }

    /// Close a persistent connection; the next call opens a new one.
    pub async fn close(&self) {
        if let Some(mut conn) = self.conn.lock().await.take() {
            conn.close().await;
        }
    }
}
