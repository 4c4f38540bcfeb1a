//! Length-prefixed framing over TCP.
//!
//! Each frame is a 4-byte big-endian length prefix followed by the frame
//! body: `[u32 length][body bytes]`.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::utils::error::TransportError;

/// Upper bound on a frame body unless configured otherwise.
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const PREFIX_LEN: usize = 4;

/// Writes one length-prefixed frame and flushes the writer.
pub async fn send<W>(writer: &mut W, frame: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(frame.len()).map_err(|_| TransportError::FrameTooLarge {
        len: frame.len(),
        max: u32::MAX as usize,
    })?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads exactly one frame of at most [`DEFAULT_MAX_FRAME_LEN`] bytes.
pub async fn receive<R>(reader: &mut R) -> Result<Vec<u8>, TransportError>
where
    R: AsyncRead + Unpin,
{
    receive_limited(reader, DEFAULT_MAX_FRAME_LEN).await
}

/// Reads exactly one frame.
///
/// Fails with [`TransportError::NoData`] when the peer closed without sending
/// a single byte and with [`TransportError::NotMessage`] when the stream ends
/// before the prefix or the announced body is complete.
pub async fn receive_limited<R>(reader: &mut R, max_len: usize) -> Result<Vec<u8>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; PREFIX_LEN];
    let received = read_full(reader, &mut prefix).await?;
    if received == 0 {
        return Err(TransportError::NoData);
    }
    if received < PREFIX_LEN {
        return Err(TransportError::NotMessage {
            expected: PREFIX_LEN,
            received,
        });
    }

    let len = u32::from_be_bytes(prefix) as usize;
    if len > max_len {
        return Err(TransportError::FrameTooLarge { len, max: max_len });
    }

    let mut body = vec![0u8; len];
    let received = read_full(reader, &mut body).await?;
    if received < len {
        return Err(TransportError::NotMessage {
            expected: len,
            received,
        });
    }
    Ok(body)
}

/// Fills `buf` until it is full or the stream reaches EOF.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// A TCP connection that carries one request/response exchange.
///
/// The socket is closed when the value is dropped, so every early return
/// releases it.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    max_frame_len: usize,
}

impl Connection {
    pub async fn open(addr: SocketAddr, connect_timeout: Duration) -> Result<Self, TransportError> {
        let stream = timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::Timeout(connect_timeout))??;
        Ok(Self {
            stream,
            peer: addr,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        })
    }

    /// Wraps an accepted stream.
    pub fn accepted(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        send(&mut self.stream, frame).await
    }

    pub async fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        receive_limited(&mut self.stream, self.max_frame_len).await
    }

    /// Sends one frame and waits for the single frame answering it.
    pub async fn exchange(&mut self, frame: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.send(frame).await?;
        self.receive().await
    }

    /// Shuts the write half down and releases the socket.
    pub async fn close(mut self) {
        let _ = self.stream.shutdown().await;
    }
}

/// Opens a connection to `addr`, exchanges one frame pair and closes it.
///
/// `limit` bounds the whole exchange, connect included.
pub async fn request(
    addr: SocketAddr,
    frame: &[u8],
    limit: Duration,
    max_frame_len: usize,
) -> Result<Vec<u8>, TransportError> {
    let exchange = async {
        let mut conn = Connection::open(addr, limit)
            .await?
            .with_max_frame_len(max_frame_len);
        let reply = conn.exchange(frame).await;
        conn.close().await;
        reply
    };
    timeout(limit, exchange)
        .await
        .map_err(|_| TransportError::Timeout(limit))?
}
