//! In-process channel pair.
//!
//! Both ends share the same ordering and reliability guarantees as a real
//! data channel. Each end's buffered amount is the number of bytes it sent
//! that the other end has not yet pulled from its [`EventStream`], so a slow
//! consumer produces real backpressure.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Channel, ChannelEvent, EventStream};
use crate::error::{Error, Result};
use crate::protocol::Message;

/// One end of an in-process channel.
#[derive(Debug)]
pub struct MemoryChannel {
    peer: mpsc::UnboundedSender<ChannelEvent>,
    in_flight: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

/// Create two connected endpoints with their event streams.
///
/// Both streams start with an `Open` event.
#[must_use]
pub fn pair() -> ((MemoryChannel, EventStream), (MemoryChannel, EventStream)) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();

    let a_in_flight = Arc::new(AtomicU64::new(0));
    let b_in_flight = Arc::new(AtomicU64::new(0));
    let closed = Arc::new(AtomicBool::new(false));

    let _ = a_tx.send(ChannelEvent::Open);
    let _ = b_tx.send(ChannelEvent::Open);

    let a = MemoryChannel {
        peer: b_tx,
        in_flight: Arc::clone(&a_in_flight),
        closed: Arc::clone(&closed),
    };
    let b = MemoryChannel {
        peer: a_tx,
        in_flight: Arc::clone(&b_in_flight),
        closed,
    };

    // A's stream carries B's messages, so delivery releases B's buffer.
    let a_events = EventStream::with_in_flight(a_rx, b_in_flight);
    let b_events = EventStream::with_in_flight(b_rx, a_in_flight);

    ((a, a_events), (b, b_events))
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn send(&self, message: Message) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ChannelClosed);
        }

        let len = message.len() as u64;
        self.in_flight.fetch_add(len, Ordering::SeqCst);

        if self.peer.send(ChannelEvent::Message(message)).is_err() {
            self.in_flight.fetch_sub(len, Ordering::SeqCst);
            return Err(Error::ChannelClosed);
        }

        Ok(())
    }

    fn buffered_amount(&self) -> u64 {
        self.in_flight.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Memory channel closed locally");
            let _ = self.peer.send(ChannelEvent::Close);
        }
    }
}
