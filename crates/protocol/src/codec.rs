//! Framed byte-stream codec.
//!
//! [`WireReader`] and [`WireWriter`] wrap the two halves of the peer stream.
//! Reads block until the full field is obtained; a short read is an error.
//! Writers flush after each logical message so that the concurrent duplex
//! handshakes never stall on a buffered write. Every operation bumps the
//! shared [`WireCounters`].

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::counters::{SyncCounters, WireCounters};
use crate::error::ProtocolError;

/// Exact length of the UUID field on the wire.
pub const UUID_LEN: usize = 36;

/// Sanity cap on a single framed blob.
pub const MAX_FRAME_LEN: u32 = 1 << 30;

/// Reading half of the peer stream.
#[derive(Debug)]
pub struct WireReader<R> {
    inner: R,
    counters: Arc<WireCounters>,
}

impl<R: AsyncRead + Unpin> WireReader<R> {
    /// Wraps a stream half, accounting into `counters`.
    pub fn new(inner: R, counters: Arc<WireCounters>) -> Self {
        Self { inner, counters }
    }

    /// Reads a big-endian `u32`.
    pub async fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        let mut buf = [0u8; 4];
        self.inner.read_exact(&mut buf).await?;
        self.counters.add_read(4);
        Ok(u32::from_be_bytes(buf))
    }

    /// Reads the unframed 36-byte ASCII UUID field.
    pub async fn read_uuid(&mut self) -> Result<String, ProtocolError> {
        let mut buf = [0u8; UUID_LEN];
        self.inner.read_exact(&mut buf).await?;
        self.counters.add_read(UUID_LEN as u64);
        if !buf.iter().all(|b| b.is_ascii_graphic()) {
            return Err(ProtocolError::MalformedUuid);
        }
        // Graphic ASCII only, so the conversion cannot fail.
        String::from_utf8(buf.to_vec()).map_err(|_| ProtocolError::MalformedUuid)
    }

    /// Reads a framed blob: `u32` length followed by that many bytes.
    pub async fn read_frame(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let len = self.read_u32().await?;
        if len > MAX_FRAME_LEN {
            return Err(ProtocolError::FrameTooLarge {
                got: u64::from(len),
                max: u64::from(MAX_FRAME_LEN),
            });
        }
        let mut buf = vec![0u8; len as usize];
        self.inner.read_exact(&mut buf).await?;
        self.counters.add_read(u64::from(len));
        Ok(buf)
    }

    /// Reads a `u32` count followed by that many framed UTF-8 names.
    pub async fn read_name_list(&mut self) -> Result<Vec<String>, ProtocolError> {
        let count = self.read_u32().await?;
        let mut names = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            let raw = self.read_frame().await?;
            let name = String::from_utf8(raw).map_err(|_| ProtocolError::MalformedName)?;
            names.push(name);
        }
        Ok(names)
    }

    /// Reads the six-counter session trailer.
    pub async fn read_counters(&mut self) -> Result<SyncCounters, ProtocolError> {
        let mut buf = [0u8; SyncCounters::WIRE_LEN];
        self.inner.read_exact(&mut buf).await?;
        self.counters.add_read(SyncCounters::WIRE_LEN as u64);
        Ok(SyncCounters::from_wire(&buf))
    }
}

/// Writing half of the peer stream.
#[derive(Debug)]
pub struct WireWriter<W> {
    inner: W,
    counters: Arc<WireCounters>,
}

impl<W: AsyncWrite + Unpin> WireWriter<W> {
    /// Wraps a stream half, accounting into `counters`.
    pub fn new(inner: W, counters: Arc<WireCounters>) -> Self {
        Self { inner, counters }
    }

    /// Writes a big-endian `u32` without flushing.
    pub async fn write_u32(&mut self, value: u32) -> Result<(), ProtocolError> {
        self.inner.write_all(&value.to_be_bytes()).await?;
        self.counters.add_written(4);
        Ok(())
    }

    /// Writes the unframed 36-byte UUID field and flushes.
    pub async fn write_uuid(&mut self, uuid: &str) -> Result<(), ProtocolError> {
        let bytes = uuid.as_bytes();
        if bytes.len() != UUID_LEN || !bytes.iter().all(|b| b.is_ascii_graphic()) {
            return Err(ProtocolError::MalformedUuid);
        }
        self.inner.write_all(bytes).await?;
        self.counters.add_written(UUID_LEN as u64);
        self.inner.flush().await?;
        Ok(())
    }

    /// Writes a framed blob and flushes.
    pub async fn write_frame(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        let len = u32::try_from(data.len()).map_err(|_| ProtocolError::FrameTooLarge {
            got: data.len() as u64,
            max: u64::from(MAX_FRAME_LEN),
        })?;
        if len > MAX_FRAME_LEN {
            return Err(ProtocolError::FrameTooLarge {
                got: u64::from(len),
                max: u64::from(MAX_FRAME_LEN),
            });
        }
        self.write_u32(len).await?;
        self.inner.write_all(data).await?;
        self.counters.add_written(u64::from(len));
        self.inner.flush().await?;
        Ok(())
    }

    /// Writes a `u32` count followed by each name as a framed blob, then
    /// flushes once.
    pub async fn write_name_list(&mut self, names: &[String]) -> Result<(), ProtocolError> {
        let count = u32::try_from(names.len()).map_err(|_| ProtocolError::FrameTooLarge {
            got: names.len() as u64,
            max: u64::from(u32::MAX),
        })?;
        self.write_u32(count).await?;
        for name in names {
            let bytes = name.as_bytes();
            self.write_u32(bytes.len() as u32).await?;
            self.inner.write_all(bytes).await?;
            self.counters.add_written(bytes.len() as u64);
        }
        self.inner.flush().await?;
        Ok(())
    }

    /// Writes the six-counter session trailer and flushes.
    pub async fn write_counters(&mut self, counters: &SyncCounters) -> Result<(), ProtocolError> {
        self.inner.write_all(&counters.to_wire()).await?;
        self.counters.add_written(SyncCounters::WIRE_LEN as u64);
        self.inner.flush().await?;
        Ok(())
    }
}
