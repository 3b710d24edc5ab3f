use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::entity::TypeInfo;
use crate::name::GraphName;
use crate::tcpros::handshake::{self, Connection};
use crate::tcpros::header::{self, ConnectionHeader};
use crate::Result;

/// Serialized response, or the error message sent back with a failure flag.
pub(crate) type ServiceReply = std::result::Result<Vec<u8>, String>;

/// A request waiting in a queue-backed server.
pub(crate) struct PendingCall {
    pub(crate) payload: Vec<u8>,
    pub(crate) reply: oneshot::Sender<ServiceReply>,
}

pub(crate) enum ServiceHandler {
    Queue(flume::Sender<PendingCall>),
    Callback(Arc<dyn Fn(Vec<u8>) -> ServiceReply + Send + Sync>),
}

/// Type names carried in the service server's reply header.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub name: GraphName,
    pub type_info: TypeInfo,
    pub request_type: String,
    pub response_type: String,
}

/// Untyped server side of a service advertised by this node.
pub struct ServiceProvider {
    descriptor: ServiceDescriptor,
    caller_id: GraphName,
    uri: Url,
    handler: ServiceHandler,
    calls: AtomicU64,
    cancel: CancellationToken,
}

impl ServiceProvider {
    pub(crate) fn new(
        descriptor: ServiceDescriptor,
        caller_id: GraphName,
        uri: Url,
        handler: ServiceHandler,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            descriptor,
            caller_id,
            uri,
            handler,
            calls: AtomicU64::new(0),
            cancel,
        }
    }

    pub fn name(&self) -> &GraphName {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    /// `rosrpc://` address this service is reachable at.
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn reply_header(&self) -> ConnectionHeader {
        ConnectionHeader::new()
            .with(header::CALLER_ID, self.caller_id.as_str())
            .with(header::MD5SUM, self.descriptor.type_info.md5sum.as_str())
            .with(header::TYPE, self.descriptor.type_info.name.as_str())
            .with(header::REQUEST_TYPE, self.descriptor.request_type.as_str())
            .with(header::RESPONSE_TYPE, self.descriptor.response_type.as_str())
    }

    async fn invoke(&self, payload: Vec<u8>) -> ServiceReply {
        self.calls.fetch_add(1, Ordering::Relaxed);
        match &self.handler {
            ServiceHandler::Callback(callback) => callback(payload),
            ServiceHandler::Queue(tx) => {
                let (reply, rx) = oneshot::channel();
                if tx.send_async(PendingCall { payload, reply }).await.is_err() {
                    return Err(format!("service {} is shutting down", self.name()));
                }
                rx.await
                    .unwrap_or_else(|_| Err(format!("service {} dropped the request", self.name())))
            }
        }
    }

    /// Finish the handshake of a client connection and answer its calls
    /// until it disconnects.
    pub(crate) async fn accept(self: Arc<Self>, mut conn: Connection, request: ConnectionHeader) -> Result<()> {
        handshake::service_accept(&mut conn, self.name().as_str(), &self.descriptor.type_info, &request).await?;
        conn.write_header(&self.reply_header()).await?;

        let caller = request.get(header::CALLER_ID).unwrap_or("unknown").to_string();
        if request.flag(header::PROBE) {
            debug!("[SRV] Probe of {} from {}", self.name(), caller);
            conn.close().await;
            return Ok(());
        }
        conn.establish()?;
        debug!("[SRV] {} connected to {}", caller, self.name());

        loop {
            let payload = tokio::select! {
                frame = conn.read_frame() => match frame? {
                    Some(payload) => payload,
                    None => break,
                },
                _ = self.cancel.cancelled() => break,
            };

            let reply = self.invoke(payload).await;
            if let Err(message) = &reply {
                warn!("[SRV] {} failed for {}: {}", self.name(), caller, message);
            }
            conn.write_service_response(reply.as_deref().map_err(String::as_str)).await?;
        }

        conn.close().await;
        debug!("[SRV] {} disconnected from {}", caller, self.name());
        Ok(())
    }

    pub fn shutdown(&self) {
        if !self.cancel.is_cancelled() {
            info!("[SRV] Closing {}", self.name());
            self.cancel.cancel();
        }
    }
}
