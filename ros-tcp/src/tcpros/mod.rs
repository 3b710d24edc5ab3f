//! TCPROS data plane: connection headers, frame codec, the per-connection
//! handshake state machine and the listener that routes inbound
//! connections.

pub mod frame;
pub mod handshake;
pub mod header;
pub mod server;

pub use handshake::{Connection, ConnectionState};
pub use header::ConnectionHeader;
pub use server::TcprosServer;
