//! Common test utilities for Duet integration tests.
//!
//! This module provides shared functionality for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use duet_core::channel::{memory, Channel, ChannelState, EventStream};
use duet_core::code::{PairingLink, PeerId};
use duet_core::config::TransferConfig;
use duet_core::protocol::Direction;
use duet_core::session::{Session, SessionEvent, SessionHandle};

/// Upper bound on any single wait in a test.
pub const WAIT: Duration = Duration::from_secs(10);

/// Create a temporary directory for test files.
///
/// The directory will be automatically cleaned up when the returned
/// `TempDir` is dropped.
pub fn create_temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Create a test file with the given content.
pub fn create_test_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Generate random bytes for testing.
pub fn random_bytes(size: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut bytes = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Assert that two files have identical content.
pub fn assert_files_equal(path1: &Path, path2: &Path) {
    let content1 = std::fs::read(path1).expect("Failed to read first file");
    let content2 = std::fs::read(path2).expect("Failed to read second file");
    assert_eq!(content1, content2, "File contents differ");
}

/// Transfer settings with a small chunk size so tests produce many frames.
pub fn test_config(chunk_size: usize) -> TransferConfig {
    TransferConfig {
        chunk_size,
        backpressure_retry: Duration::from_millis(1),
        ..Default::default()
    }
}

/// A running session and the UI side of it.
pub struct Endpoint {
    pub handle: SessionHandle,
    pub ui: mpsc::UnboundedReceiver<SessionEvent>,
    pub task: JoinHandle<ChannelState>,
    pub link: PairingLink,
}

impl Endpoint {
    /// Spawn a session over `channel`.
    pub fn spawn(
        channel: Box<dyn Channel>,
        events: EventStream,
        remote_id: Option<PeerId>,
        config: TransferConfig,
    ) -> Self {
        Self::spawn_with_id(PeerId::generate(), channel, events, remote_id, config)
    }

    /// Spawn a session with a fixed local id.
    pub fn spawn_with_id(
        local_id: PeerId,
        channel: Box<dyn Channel>,
        events: EventStream,
        remote_id: Option<PeerId>,
        config: TransferConfig,
    ) -> Self {
        let link = PairingLink::new("tcp://127.0.0.1:52610/", local_id);
        let (session, handle, ui) = Session::new(link.clone(), remote_id, channel, events, config);

        Self {
            handle,
            ui,
            task: tokio::spawn(session.run()),
            link,
        }
    }

    /// Wait for the next UI event.
    pub async fn next_event(&mut self) -> SessionEvent {
        tokio::time::timeout(WAIT, self.ui.recv())
            .await
            .expect("timed out waiting for a session event")
            .expect("session ended")
    }

    /// Collect events up to and including the first one matching `pred`.
    pub async fn events_until(&mut self, pred: impl Fn(&SessionEvent) -> bool) -> Vec<SessionEvent> {
        let mut seen = Vec::new();
        loop {
            let event = self.next_event().await;
            let done = pred(&event);
            seen.push(event);
            if done {
                return seen;
            }
        }
    }

    /// Wait until the session accepts uploads.
    pub async fn wait_open(&mut self) {
        self.events_until(|e| matches!(e, SessionEvent::UploadAvailability(true)))
            .await;
    }
}

/// Two sessions joined by an in-memory channel, both open.
pub async fn memory_pair(config_a: TransferConfig, config_b: TransferConfig) -> (Endpoint, Endpoint) {
    let ((a, a_events), (b, b_events)) = memory::pair();

    let mut alice = Endpoint::spawn(Box::new(a), a_events, None, config_a);
    let mut bob = Endpoint::spawn(Box::new(b), b_events, None, config_b);

    alice.wait_open().await;
    bob.wait_open().await;

    (alice, bob)
}

/// Assert that progress in `direction` never goes backwards and ends at 100%.
pub fn assert_progress_monotonic(events: &[SessionEvent], direction: Direction) {
    let progress: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Progress(p) if p.direction == direction => Some(p),
            _ => None,
        })
        .collect();

    assert!(!progress.is_empty(), "no {direction} progress reported");

    for pair in progress.windows(2) {
        assert!(pair[0].percent <= pair[1].percent, "percent went backwards");
        assert!(pair[0].bytes_done <= pair[1].bytes_done, "bytes went backwards");
    }

    let last = progress[progress.len() - 1];
    assert_eq!(last.percent, 100);
    assert_eq!(last.bytes_done, last.bytes_total);
    assert!(progress.iter().all(|p| p.percent <= 100));
}
