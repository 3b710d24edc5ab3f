//! One control-plane connection: length-prefixed JSON in both directions.

use std::net::SocketAddr;

use serde::{Serialize, de::DeserializeOwned};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::{Error, Result};

pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

pub struct RpcConnection {
    stream: TcpStream,
    peer_addr: SocketAddr,
    read_buffer: Vec<u8>,
}

impl RpcConnection {
    pub fn new(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        Self {
            stream,
            peer_addr,
            read_buffer: Vec::with_capacity(4096),
        }
    }

    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream, addr))
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Read one message.
    ///
    /// Returns `Ok(None)` if the peer closed the connection between messages.
    pub async fn read_message<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        let mut len_buf = [0u8; 4];
        match self.stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        if len == 0 {
            return Err(Error::Protocol("empty rpc message".into()));
        }
        if len > MAX_MESSAGE_SIZE {
            return Err(Error::Protocol(format!(
                "rpc message too large: {} > {}",
                len, MAX_MESSAGE_SIZE
            )));
        }

        self.read_buffer.clear();
        self.read_buffer.resize(len, 0);
        self.stream.read_exact(&mut self.read_buffer).await?;

        Ok(Some(serde_json::from_slice(&self.read_buffer)?))
    }

    pub async fn send_message<T: Serialize + ?Sized>(&mut self, msg: &T) -> Result<()> {
        let json = serde_json::to_vec(msg)?;
        if json.len() > MAX_MESSAGE_SIZE {
            return Err(Error::Protocol(format!(
                "rpc message too large: {} > {}",
                json.len(),
                MAX_MESSAGE_SIZE
            )));
        }

        self.stream.write_all(&(json.len() as u32).to_le_bytes()).await?;
        self.stream.write_all(&json).await?;
        self.stream.flush().await?;
        Ok(())
    }
}
