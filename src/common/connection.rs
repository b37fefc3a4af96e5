//! # TCP Connection Abstraction
//!
//! Thin wrapper around a TCP stream for the relay's plaintext protocol.
//!
//! ## Wire Model
//!
//! Inbound traffic is not framed: each successful `read()` yields one chunk and
//! the broker treats every chunk as one message, exactly as the transport
//! delivered it. Outbound frames are written in full or not at all.

use bytes::Bytes;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};

use super::error::Result;

/// Default size of a single read.
pub const DEFAULT_READ_BUFFER: usize = 1024;

/// TCP connection wrapper with chunk reads and whole-frame writes.
pub struct Connection {
    /// Underlying TCP stream
    stream: TcpStream,
    /// Scratch buffer reused across reads
    buf: Vec<u8>,
}

impl Connection {
    /// Create a new Connection from an existing TCP stream.
    pub fn new(stream: TcpStream) -> Self {
        Self::with_buffer(stream, DEFAULT_READ_BUFFER)
    }

    pub fn with_buffer(stream: TcpStream, read_buffer_size: usize) -> Self {
        Self {
            stream,
            buf: vec![0u8; read_buffer_size.max(1)],
        }
    }

    /// Open a TCP connection to `addr`.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.peer_addr().ok()
    }

    /// Issue a single write and report how many bytes the kernel accepted.
    ///
    /// Used for the handshake, where a short write counts as a failure rather
    /// than something to resume.
    pub async fn write_once(&mut self, data: &[u8]) -> Result<usize> {
        let n = self.stream.write(data).await?;
        self.stream.flush().await?;
        Ok(n)
    }

    /// Split into independently owned read and write halves.
    pub fn into_split(self) -> (ChunkReader, ChunkWriter) {
        let (read, write) = self.stream.into_split();
        (
            ChunkReader {
                half: read,
                buf: self.buf,
            },
            ChunkWriter { half: write },
        )
    }
}

/// Read half of a [`Connection`].
pub struct ChunkReader {
    half: OwnedReadHalf,
    buf: Vec<u8>,
}

impl ChunkReader {
    /// Read one chunk.
    ///
    /// # Returns
    /// - `Ok(Some(bytes))`: the bytes delivered by a single read
    /// - `Ok(None)`: the peer closed the connection
    /// - `Err`: I/O error occurred
    pub async fn read_chunk(&mut self) -> Result<Option<Bytes>> {
        let n = self.half.read(&mut self.buf).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(Bytes::copy_from_slice(&self.buf[..n])))
    }
}

/// Write half of a [`Connection`].
pub struct ChunkWriter {
    half: OwnedWriteHalf,
}

impl ChunkWriter {
    /// Write a whole frame and flush it.
    pub async fn write_frame(&mut self, data: &[u8]) -> Result<()> {
        self.half.write_all(data).await?;
        self.half.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.half.shutdown().await?;
        Ok(())
    }
}
