use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::connection::RpcConnection;
use super::protocol::RpcResponse;
use crate::{Error, Result};

/// Typed handler behind an [`RpcServer`]. The method set is fixed by
/// `Request`, so dispatch is a `match` on the request enum.
pub trait RpcHandler: Send + Sync + 'static {
    type Request: DeserializeOwned + Send + 'static;

    fn handle(&self, request: Self::Request) -> impl Future<Output = RpcResponse> + Send;
}

/// Accepts control-plane connections and answers each request in order.
///
/// The listener is dropped, and its port released, once `cancel` fires.
pub struct RpcServer {
    local_addr: SocketAddr,
    cancel: CancellationToken,
}

impl RpcServer {
    /// Serve on an already bound listener, so callers know the port before
    /// building their handler.
    pub fn listen<H: RpcHandler>(
        listener: TcpListener,
        handler: Arc<H>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let local_addr = listener.local_addr()?;
        debug!("[RPC] Listening on {}", local_addr);

        tokio::spawn(accept_loop(listener, handler, cancel.clone()));

        Ok(Self { local_addr, cancel })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

async fn accept_loop<H: RpcHandler>(
    listener: TcpListener,
    handler: Arc<H>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, peer)) => {
                    trace!("[RPC] Connection from {}", peer);
                    tokio::spawn(serve_connection(stream, peer, handler.clone(), cancel.clone()));
                }
                Err(e) => warn!("[RPC] Accept failed: {}", e),
            },
            _ = cancel.cancelled() => break,
        }
    }
    debug!("[RPC] Listener closed");
}

async fn serve_connection<H: RpcHandler>(
    stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<H>,
    cancel: CancellationToken,
) {
    let mut conn = RpcConnection::new(stream, peer);
    loop {
        let request = tokio::select! {
            request = conn.read_message::<H::Request>() => request,
            _ = cancel.cancelled() => break,
        };

        match request {
            Ok(Some(request)) => {
                let response = handler.handle(request).await;
                if let Err(e) = conn.send_message(&response).await {
                    debug!("[RPC] Failed to answer {}: {}", peer, e);
                    break;
                }
            }
            Ok(None) => break,
            Err(Error::Json(e)) => {
                let response = RpcResponse::error(format!("malformed request: {}", e));
                let _ = conn.send_message(&response).await;
                break;
            }
            Err(e) => {
                debug!("[RPC] Dropping connection from {}: {}", peer, e);
                break;
            }
        }
    }
}
