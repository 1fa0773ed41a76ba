//! Sender pump.
//!
//! The pump walks a byte source front to back, one chunk frame at a time.
//! It never decides *when* to send: the caller waits on
//! [`wait_for_capacity`] and then asks for exactly one frame, so control
//! messages from the peer are handled between frames.

use std::time::Duration;

use tokio::io::AsyncReadExt;

use crate::channel::Channel;
use crate::error::{Error, Result};
use crate::file::FileSource;
use crate::protocol::{frame, Message};

/// Sleep in steps of `retry` until the channel buffers at most
/// `high_water_mark` bytes.
pub async fn wait_for_capacity(channel: &dyn Channel, high_water_mark: u64, retry: Duration) {
    loop {
        let buffered = channel.buffered_amount();
        if buffered <= high_water_mark {
            return;
        }

        tracing::trace!(
            "Backpressure: {} bytes buffered, retrying in {:?}",
            buffered,
            retry
        );
        tokio::time::sleep(retry).await;
    }
}

/// Cursor over an outgoing byte source.
pub struct SenderPump {
    source: FileSource,
    total: u64,
    sent: u64,
    index: u32,
    chunk_size: usize,
    buf: Vec<u8>,
}

impl std::fmt::Debug for SenderPump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderPump")
            .field("total", &self.total)
            .field("sent", &self.sent)
            .field("index", &self.index)
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}

impl SenderPump {
    /// Create a pump over `source`, which must yield `total` bytes.
    ///
    /// A zero `chunk_size` is treated as 1.
    #[must_use]
    pub fn new(source: FileSource, total: u64, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            source,
            total,
            sent: 0,
            index: 0,
            chunk_size,
            buf: vec![0u8; chunk_size],
        }
    }

    /// Whether every byte has been framed.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.sent >= self.total
    }

    /// Bytes framed so far.
    #[must_use]
    pub const fn bytes_sent(&self) -> u64 {
        self.sent
    }

    /// Read the next chunk and frame it, or `None` once finished.
    ///
    /// # Errors
    ///
    /// Returns an error if the source fails or ends early.
    pub async fn next_frame(&mut self) -> Result<Option<bytes::Bytes>> {
        if self.is_finished() {
            return Ok(None);
        }

        let remaining = self.total - self.sent;
        let len = usize::try_from(remaining).map_or(self.chunk_size, |r| r.min(self.chunk_size));

        let buf = &mut self.buf[..len];
        self.source.read_exact(buf).await?;

        let packed = frame::pack(self.index, buf);

        self.sent += len as u64;
        self.index = self
            .index
            .checked_add(1)
            .ok_or_else(|| Error::Internal("chunk index overflow".to_string()))?;

        Ok(Some(packed))
    }

    /// Frame the next chunk and hand it to the channel.
    ///
    /// Returns the new byte count, or `None` if nothing was left to send.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the source or sending fails. Either is
    /// fatal to the transfer.
    pub async fn send_next(&mut self, channel: &dyn Channel) -> Result<Option<u64>> {
        let index = self.index;
        let Some(packed) = self.next_frame().await? else {
            return Ok(None);
        };

        channel.send(Message::Binary(packed)).await?;
        tracing::debug!(
            "Sent chunk {} ({}/{} bytes)",
            index,
            self.sent,
            self.total
        );

        Ok(Some(self.sent))
    }
}
