use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::handshake::Connection;
use super::header;
use crate::name::GraphName;
use crate::slave::endpoints::EndpointTable;
use crate::{Error, Result};

/// A node's data-plane listener. Reads the first header of every inbound
/// connection and hands it to the publication or service it names.
pub struct TcprosServer {
    local_addr: SocketAddr,
}

impl TcprosServer {
    pub fn listen(listener: TcpListener, endpoints: Arc<EndpointTable>, cancel: CancellationToken) -> Result<Self> {
        let local_addr = listener.local_addr()?;
        debug!("[TCPROS] Listening on {}", local_addr);
        tokio::spawn(accept_loop(listener, endpoints, cancel));
        Ok(Self { local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

async fn accept_loop(listener: TcpListener, endpoints: Arc<EndpointTable>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, peer)) => {
                    trace!("[TCPROS] Connection from {}", peer);
                    let endpoints = endpoints.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        tokio::select! {
                            result = route(stream, peer, endpoints) => {
                                if let Err(e) = result {
                                    debug!("[TCPROS] Connection from {} refused: {}", peer, e);
                                }
                            }
                            _ = cancel.cancelled() => {}
                        }
                    });
                }
                Err(e) => warn!("[TCPROS] Accept failed: {}", e),
            },
            _ = cancel.cancelled() => break,
        }
    }
    debug!("[TCPROS] Listener closed");
}

async fn route(stream: TcpStream, peer: SocketAddr, endpoints: Arc<EndpointTable>) -> Result<()> {
    let mut conn = Connection::new(stream, peer);
    let request = conn.read_header().await?;

    if let Some(service) = request.get(header::SERVICE) {
        let name = GraphName::parse(service)?;
        let provider = endpoints
            .service(&name)
            .ok_or_else(|| Error::NoSuchService(name.to_string()))?;
        provider.accept(conn, request).await
    } else if let Some(topic) = request.get(header::TOPIC) {
        let name = GraphName::parse(topic)?;
        let publication = endpoints
            .publication(&name)
            .ok_or_else(|| Error::NoSuchTopic(name.to_string()))?;
        publication.accept(conn, request).await
    } else {
        Err(Error::Handshake("header names neither a topic nor a service".into()))
    }
}
