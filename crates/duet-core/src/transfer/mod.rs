//! Transfer state for Duet.
//!
//! A session holds at most one upload and one download at a time. Each is
//! tracked by a [`TransferSlot`]: the file being moved, how many bytes have
//! gone through, and whether it is still running.
//!
//! - [`sender`] turns a byte source into chunk frames under backpressure
//! - [`receiver`] reassembles chunk frames into the original bytes

pub mod receiver;
pub mod sender;

pub use receiver::{Accepted, Artifact, ReceiverAssembler};
pub use sender::{wait_for_capacity, SenderPump};

use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use crate::file::FileDescriptor;
use crate::protocol::Direction;

/// State of one transfer in one direction.
#[derive(Debug, Clone)]
pub struct TransferSlot {
    /// Local identifier for logs and UI
    pub id: Uuid,
    /// File being transferred
    pub file: FileDescriptor,
    /// Upload or download
    pub direction: Direction,
    /// Bytes sent or received so far
    pub bytes_done: u64,
    /// Set once the transfer was aborted
    pub cancelled: bool,
    /// Set while the transfer runs
    pub busy: bool,
    /// Set once every byte went through and the transfer was acknowledged
    pub completed: bool,
    /// When the slot was created
    pub started_at: Instant,
}

impl TransferSlot {
    /// Create a running slot.
    #[must_use]
    pub fn new(file: FileDescriptor, direction: Direction) -> Self {
        Self {
            id: Uuid::new_v4(),
            file,
            direction,
            bytes_done: 0,
            cancelled: false,
            busy: true,
            completed: false,
            started_at: Instant::now(),
        }
    }

    /// Whether the slot still accepts progress.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.busy && !self.cancelled
    }

    /// Record progress. Never moves backwards.
    pub fn advance_to(&mut self, bytes_done: u64) {
        debug_assert!(bytes_done >= self.bytes_done, "progress went backwards");
        self.bytes_done = self.bytes_done.max(bytes_done);
    }

    /// Abort the transfer.
    ///
    /// Returns `false` if the slot was already cancelled or finished.
    pub fn cancel(&mut self) -> bool {
        if !self.is_live() {
            return false;
        }
        self.cancelled = true;
        self.busy = false;
        true
    }

    /// Mark the transfer as done.
    pub fn complete(&mut self) {
        self.busy = false;
        self.completed = true;
    }

    /// Progress as a whole percentage, rounded to nearest.
    ///
    /// An empty file is 100% from the start.
    #[must_use]
    pub fn percent(&self) -> u8 {
        let total = self.file.size;
        if total == 0 {
            return 100;
        }

        let done = u128::from(self.bytes_done.min(total));
        let rounded = (done * 200 + u128::from(total)) / (u128::from(total) * 2);

        #[allow(clippy::cast_possible_truncation)]
        let percent = rounded.min(100) as u8;
        percent
    }

    /// Average speed since the slot was created, in bytes per second.
    #[must_use]
    pub fn throughput_bps(&self) -> u64 {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return 0;
        }

        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let bps = (self.bytes_done as f64 / elapsed) as u64;
        bps
    }

    /// Snapshot for the UI.
    #[must_use]
    pub fn progress(&self) -> TransferProgress {
        let throughput_bps = self.throughput_bps();
        let remaining = self.file.size.saturating_sub(self.bytes_done);

        TransferProgress {
            id: self.id,
            direction: self.direction,
            file_name: self.file.name.clone(),
            percent: self.percent(),
            bytes_done: self.bytes_done,
            bytes_total: self.file.size,
            throughput_bps,
            eta: (throughput_bps > 0 && remaining > 0)
                .then(|| Duration::from_secs(remaining / throughput_bps)),
        }
    }
}

/// Progress information for a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferProgress {
    /// Slot identifier
    pub id: Uuid,
    /// Upload or download
    pub direction: Direction,
    /// File name
    pub file_name: String,
    /// Whole percentage, 0 to 100
    pub percent: u8,
    /// Bytes transferred
    pub bytes_done: u64,
    /// Declared file size
    pub bytes_total: u64,
    /// Average speed in bytes per second
    pub throughput_bps: u64,
    /// Estimated time remaining
    pub eta: Option<Duration>,
}
