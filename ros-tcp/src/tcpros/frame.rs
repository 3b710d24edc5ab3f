//! Length-prefixed payload framing used once a connection is streaming.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Error, Result};

pub const MAX_FRAME_SIZE: usize = 256 * 1024 * 1024;

/// Read one `[u32 LE length][payload]` frame.
///
/// Returns `Ok(None)` when the peer closed the stream on a frame boundary.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    // Only an end of stream before the first length byte is a clean close.
    if reader.read(&mut len_buf[..1]).await? == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut len_buf[1..]).await?;
    read_body(reader, u32::from_le_bytes(len_buf) as usize).await.map(Some)
}

async fn read_body<R: AsyncRead + Unpin>(reader: &mut R, len: usize) -> Result<Vec<u8>> {
    if len > MAX_FRAME_SIZE {
        return Err(Error::Protocol(format!("frame too large: {} > {}", len, MAX_FRAME_SIZE)));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(Error::Protocol(format!(
            "frame too large: {} > {}",
            payload.len(),
            MAX_FRAME_SIZE
        )));
    }
    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(payload);
    writer.write_all(&buf).await?;
    Ok(())
}

/// Write a service reply: `[1][len][response]` on success, `[0][len][message]`
/// on failure.
pub async fn write_service_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: std::result::Result<&[u8], &str>,
) -> Result<()> {
    let (ok, body) = match response {
        Ok(bytes) => (1u8, bytes),
        Err(message) => (0u8, message.as_bytes()),
    };
    writer.write_all(&[ok]).await?;
    write_frame(writer, body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a service reply written by [`write_service_response`]. The outer
/// result carries transport errors, the inner one the server's verdict.
pub async fn read_service_response<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<std::result::Result<Vec<u8>, String>> {
    let ok = match reader.read_u8().await {
        Ok(ok) => ok,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(Error::Closed),
        Err(e) => return Err(e.into()),
    };
    let len = reader.read_u32_le().await? as usize;
    let body = read_body(reader, len).await?;
    match ok {
        1 => Ok(Ok(body)),
        0 => Ok(Err(String::from_utf8_lossy(&body).into_owned())),
        other => Err(Error::Protocol(format!("invalid service ok byte {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_frames_keep_order() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        for msg in ["one", "two", "three"] {
            write_frame(&mut a, msg.as_bytes()).await.unwrap();
        }
        drop(a);

        let mut got = Vec::new();
        while let Some(frame) = read_frame(&mut b).await.unwrap() {
            got.push(String::from_utf8(frame).unwrap());
        }
        assert_eq!(got, vec!["one", "two", "three"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_truncated_frame_is_an_error() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&[10, 0, 0, 0, 1, 2]).await.unwrap();
        drop(a);
        assert!(matches!(read_frame(&mut b).await, Err(Error::Io(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_truncated_length_is_an_error() {
        let (mut a, mut b) = tokio::io::duplex(64);
        write_frame(&mut a, b"whole").await.unwrap();
        a.write_all(&[5, 0]).await.unwrap();
        drop(a);

        assert_eq!(read_frame(&mut b).await.unwrap(), Some(b"whole".to_vec()));
        assert!(matches!(read_frame(&mut b).await, Err(Error::Io(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_service_response_flags() {
        let (mut a, mut b) = tokio::io::duplex(256);
        write_service_response(&mut a, Ok(&[7, 0, 0, 0])).await.unwrap();
        write_service_response(&mut a, Err("boom")).await.unwrap();

        let mut raw = [0u8; 9];
        b.read_exact(&mut raw).await.unwrap();
        assert_eq!(raw, [1, 4, 0, 0, 0, 7, 0, 0, 0]);

        assert_eq!(read_service_response(&mut b).await.unwrap(), Err("boom".to_string()));
    }
}
