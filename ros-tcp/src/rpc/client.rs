use std::net::SocketAddr;
use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};
use tracing::trace;
use url::{Host, Url};

use super::connection::RpcConnection;
use super::protocol::RpcResponse;
use crate::{Error, Result};

pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(5);

/// Calls a control-plane endpoint, one connection per call.
#[derive(Debug, Clone)]
pub struct RpcClient {
    uri: Url,
    timeout: Duration,
}

impl RpcClient {
    pub fn new(uri: Url) -> Self {
        Self {
            uri,
            timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `request` and decode the success payload.
    pub async fn call<Req, T>(&self, method: &str, request: &Req) -> Result<T>
    where
        Req: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.call_timeout(method, request, self.timeout).await
    }

    pub async fn call_timeout<Req, T>(&self, method: &str, request: &Req, timeout: Duration) -> Result<T>
    where
        Req: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = tokio::time::timeout(timeout, self.roundtrip(request))
            .await
            .map_err(|_| Error::timeout(format!("{} on {}", method, self.uri), timeout))??;
        trace!("[RPC] {} -> {} {}", method, response.code(), response.message());
        response.into_result()
    }

    async fn roundtrip<Req: Serialize + ?Sized>(&self, request: &Req) -> Result<RpcResponse> {
        let addr = resolve_uri(&self.uri).await?;
        let mut conn = RpcConnection::connect(addr).await?;
        conn.send_message(request).await?;
        conn.read_message().await?.ok_or(Error::Closed)
    }
}

/// First socket address `uri`'s host and port resolve to.
pub async fn resolve_uri(uri: &Url) -> Result<SocketAddr> {
    let port = uri
        .port_or_known_default()
        .ok_or_else(|| Error::InvalidUri(format!("{} has no port", uri)))?;
    match uri.host() {
        Some(Host::Ipv6(ip)) => Ok(SocketAddr::from((ip, port))),
        Some(Host::Ipv4(ip)) => Ok(SocketAddr::from((ip, port))),
        Some(Host::Domain(domain)) => resolve_host(domain, port).await,
        None => Err(Error::InvalidUri(format!("{} has no host", uri))),
    }
}

/// Resolve a host name or literal address as advertised by a peer.
pub async fn resolve_host(host: &str, port: u16) -> Result<SocketAddr> {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    // Listeners bind IPv4, so prefer an IPv4 answer for names like `localhost`.
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port)).await?.collect();
    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| Error::InvalidUri(format!("{}:{} does not resolve", host, port)))
}
