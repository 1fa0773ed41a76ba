//! Receiver assembler.
//!
//! Chunk frames are stored by index and concatenated in index order once
//! the received byte count reaches the declared size. Index gaps do not
//! matter for completion; only the byte count does.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};

use super::{TransferProgress, TransferSlot};
use crate::error::{Error, Result};
use crate::file::{unique_output_path, FileDescriptor};
use crate::protocol::{unpack, Direction};

/// A fully received file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Descriptor from the offer
    pub file: FileDescriptor,
    /// File contents, exactly `file.size` bytes
    pub data: Bytes,
}

impl Artifact {
    /// Write the artifact into `dir` under a name that does not overwrite
    /// existing files.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub async fn save_to(&self, dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = unique_output_path(dir, &self.file.name);
        tokio::fs::write(&path, &self.data).await?;
        tracing::info!("Saved {} to {}", self.file.name, path.display());
        Ok(path)
    }
}

/// Outcome of feeding a frame to the assembler.
#[derive(Debug)]
pub enum Accepted {
    /// The download is no longer live; the frame was dropped
    Dropped,
    /// The frame was stored
    Progress(TransferProgress),
    /// The frame completed the file
    Complete(Artifact),
}

/// Download side of a transfer.
#[derive(Debug)]
pub struct ReceiverAssembler {
    slot: TransferSlot,
    chunks: BTreeMap<u32, Bytes>,
}

impl ReceiverAssembler {
    /// Start receiving the file described by an accepted offer.
    #[must_use]
    pub fn new(file: FileDescriptor) -> Self {
        Self {
            slot: TransferSlot::new(file, Direction::Down),
            chunks: BTreeMap::new(),
        }
    }

    /// The download slot.
    #[must_use]
    pub const fn slot(&self) -> &TransferSlot {
        &self.slot
    }

    /// Abort the download and release buffered chunks.
    ///
    /// Returns `false` if it was already cancelled or finished.
    pub fn cancel(&mut self) -> bool {
        let cancelled = self.slot.cancel();
        if cancelled {
            self.chunks.clear();
        }
        cancelled
    }

    /// Feed one binary message.
    ///
    /// # Errors
    ///
    /// Returns `Error::FrameTooShort` for a malformed frame, and
    /// `Error::DuplicateChunk` or `Error::OverDelivery` for a frame that would
    /// corrupt the byte count. Rejected frames leave the download untouched.
    pub fn accept(&mut self, frame: Bytes) -> Result<Accepted> {
        if !self.slot.is_live() {
            return Ok(Accepted::Dropped);
        }

        let chunk = unpack(frame)?;

        if self.chunks.contains_key(&chunk.index) {
            return Err(Error::DuplicateChunk {
                file: self.slot.file.name.clone(),
                index: chunk.index,
            });
        }

        let received = self.slot.bytes_done + chunk.payload.len() as u64;
        if received > self.slot.file.size {
            return Err(Error::OverDelivery {
                file: self.slot.file.name.clone(),
                received,
                declared: self.slot.file.size,
            });
        }

        tracing::debug!(
            "Received chunk {} ({}/{} bytes)",
            chunk.index,
            received,
            self.slot.file.size
        );

        self.chunks.insert(chunk.index, chunk.payload);
        self.slot.advance_to(received);

        Ok(match self.complete_if_done() {
            Some(artifact) => Accepted::Complete(artifact),
            None => Accepted::Progress(self.slot.progress()),
        })
    }

    /// Assemble the file if every byte has arrived.
    ///
    /// Yields the artifact at most once. An empty file completes on the
    /// first call.
    pub fn complete_if_done(&mut self) -> Option<Artifact> {
        if !self.slot.is_live() || self.slot.bytes_done != self.slot.file.size {
            return None;
        }

        let chunks = std::mem::take(&mut self.chunks);
        let mut data = BytesMut::with_capacity(usize::try_from(self.slot.file.size).unwrap_or(0));
        for payload in chunks.into_values() {
            data.extend_from_slice(&payload);
        }

        self.slot.complete();
        tracing::info!(
            "Download of {} complete ({} bytes)",
            self.slot.file.name,
            data.len()
        );

        Some(Artifact {
            file: self.slot.file.clone(),
            data: data.freeze(),
        })
    }
}
