use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, trace};

use super::frame;
use super::header::{self, ConnectionHeader, MAX_HEADER_SIZE};
use crate::entity::TypeInfo;
use crate::{Error, Result};

/// Where a data-plane connection is in its lifecycle.
///
/// Headers may only be exchanged while `AwaitingHeader`; frames only flow
/// while `Streaming`. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ConnectionState {
    AwaitingHeader,
    Streaming,
    Closed,
}

pub struct Connection {
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: ConnectionState,
}

impl Connection {
    pub fn new(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        Self {
            stream,
            peer_addr,
            state: ConnectionState::AwaitingHeader,
        }
    }

    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::new(stream, addr))
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        Ok(self.stream.set_nodelay(nodelay)?)
    }

    fn expect_state(&self, expected: ConnectionState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::Protocol(format!(
                "connection to {} is {}, expected {}",
                self.peer_addr, self.state, expected
            )))
        }
    }

    pub async fn read_header(&mut self) -> Result<ConnectionHeader> {
        self.expect_state(ConnectionState::AwaitingHeader)?;
        let len = match self.stream.read_u32_le().await {
            Ok(len) => len as usize,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(Error::Closed),
            Err(e) => return Err(e.into()),
        };
        if len > MAX_HEADER_SIZE {
            return Err(Error::Handshake(format!("header too large: {} bytes", len)));
        }
        let mut body = vec![0u8; len];
        self.stream.read_exact(&mut body).await?;
        let header = ConnectionHeader::decode(&body)?;
        trace!("[TCPROS] <- {} {}", self.peer_addr, header);
        Ok(header)
    }

    pub async fn write_header(&mut self, header: &ConnectionHeader) -> Result<()> {
        self.expect_state(ConnectionState::AwaitingHeader)?;
        trace!("[TCPROS] -> {} {}", self.peer_addr, header);
        self.stream.write_all(&header.encode()?).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Switch to plain framing once both headers were exchanged.
    pub fn establish(&mut self) -> Result<()> {
        self.expect_state(ConnectionState::AwaitingHeader)?;
        self.state = ConnectionState::Streaming;
        Ok(())
    }

    pub async fn close(&mut self) {
        if self.state != ConnectionState::Closed {
            let _ = self.stream.shutdown().await;
            self.state = ConnectionState::Closed;
        }
    }

    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
        self.expect_state(ConnectionState::Streaming)?;
        let frame = frame::read_frame(&mut self.stream).await;
        if !matches!(frame, Ok(Some(_))) {
            self.state = ConnectionState::Closed;
        }
        frame
    }

    pub async fn write_frame(&mut self, payload: &[u8]) -> Result<()> {
        self.expect_state(ConnectionState::Streaming)?;
        let result = frame::write_frame(&mut self.stream, payload).await;
        if result.is_err() {
            self.state = ConnectionState::Closed;
        }
        result
    }

    pub async fn write_service_response(&mut self, response: std::result::Result<&[u8], &str>) -> Result<()> {
        self.expect_state(ConnectionState::Streaming)?;
        frame::write_service_response(&mut self.stream, response).await
    }

    pub async fn read_service_response(&mut self) -> Result<std::result::Result<Vec<u8>, String>> {
        self.expect_state(ConnectionState::Streaming)?;
        let result = frame::read_service_response(&mut self.stream).await;
        if result.is_err() {
            self.state = ConnectionState::Closed;
        }
        result
    }

    /// Split a streaming connection so reads and writes can run in separate
    /// tasks.
    pub fn into_split(self) -> Result<(OwnedReadHalf, OwnedWriteHalf)> {
        self.expect_state(ConnectionState::Streaming)?;
        Ok(self.stream.into_split())
    }
}

/// Check the peer's `md5sum` (and `type`, when both sides name one) against
/// ours.
pub fn check_compatible(name: &str, ours: &TypeInfo, theirs: &ConnectionHeader) -> Result<()> {
    let md5sum = theirs.require(header::MD5SUM)?;
    if md5sum != ours.md5sum {
        return Err(Error::ChecksumMismatch {
            name: name.to_string(),
            expected: ours.md5sum.clone(),
            actual: md5sum.to_string(),
        });
    }
    if let Some(ty) = theirs.get(header::TYPE) {
        if !ours.name.is_empty() && ty != ours.name {
            return Err(Error::ChecksumMismatch {
                name: name.to_string(),
                expected: ours.name.clone(),
                actual: ty.to_string(),
            });
        }
    }
    Ok(())
}

/// Client side of the handshake: send `request`, validate the reply against
/// `expected` and move to `Streaming`.
pub async fn client_handshake(
    conn: &mut Connection,
    name: &str,
    request: &ConnectionHeader,
    expected: &TypeInfo,
) -> Result<ConnectionHeader> {
    conn.write_header(request).await?;
    let reply = match conn.read_header().await {
        Ok(reply) => reply,
        Err(Error::Closed) => {
            conn.close().await;
            return Err(Error::Handshake(format!("{} closed the connection during handshake", name)));
        }
        Err(e) => return Err(e),
    };
    if let Some(error) = reply.get(header::ERROR) {
        conn.close().await;
        return Err(Error::Handshake(error.to_string()));
    }
    if let Err(e) = check_compatible(name, expected, &reply) {
        conn.close().await;
        return Err(e);
    }
    conn.establish()?;
    debug!("[TCPROS] Streaming {} from {}", name, conn.peer_addr());
    Ok(reply)
}

/// Server side: read the request header and make sure it can be served.
/// On a mismatch the connection is closed without writing anything.
pub async fn server_accept(
    conn: &mut Connection,
    name: &str,
    ours: &TypeInfo,
    request: &ConnectionHeader,
) -> Result<()> {
    if let Err(e) = check_compatible(name, ours, request) {
        debug!("[TCPROS] Rejecting {} from {}: {}", name, conn.peer_addr(), e);
        conn.close().await;
        return Err(e);
    }
    Ok(())
}

/// Service side of the handshake. A client sending [`header::ANY_MD5SUM`]
/// is accepted whatever the service's type, so tools can probe for it.
pub async fn service_accept(
    conn: &mut Connection,
    name: &str,
    ours: &TypeInfo,
    request: &ConnectionHeader,
) -> Result<()> {
    if request.get(header::MD5SUM) == Some(header::ANY_MD5SUM) {
        return Ok(());
    }
    server_accept(conn, name, ours, request).await
}
