//! Control-plane request/response transport shared by the master and every
//! slave endpoint.

pub mod client;
pub mod connection;
pub mod protocol;
pub mod server;

pub use client::{DEFAULT_RPC_TIMEOUT, RpcClient, resolve_host, resolve_uri};
pub use protocol::{RpcResponse, StatusCode};
pub use server::{RpcHandler, RpcServer};

use url::Url;

use crate::Result;

/// Build `scheme://host:port`, bracketing bare IPv6 literals. `http` URIs
/// get their root path appended by the parser.
pub fn endpoint_uri(scheme: &str, host: &str, port: u16) -> Result<Url> {
    let host = if host.contains(':') && !host.starts_with('[') {
        format!("[{}]", host)
    } else {
        host.to_string()
    };
    Ok(Url::parse(&format!("{}://{}:{}", scheme, host, port))?)
}
