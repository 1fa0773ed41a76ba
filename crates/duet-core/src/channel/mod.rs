//! Channel abstraction.
//!
//! A channel is an ordered, reliable, message-oriented link between two
//! peers. The session only needs four things from it: send a message, report
//! how many outbound bytes are still queued, close, and deliver lifecycle and
//! message events in order.
//!
//! Two adapters are provided:
//! - [`memory`]: an in-process pair, used by tests and embedders
//! - [`tcp`]: length-prefixed frames over a TCP stream

pub mod memory;
pub mod tcp;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::protocol::Message;

/// Outbound side of a channel.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Queue a message for delivery.
    ///
    /// # Errors
    ///
    /// Returns `Error::ChannelClosed` once the channel is closed, or
    /// `Error::SendFailed` if the transport rejects the message.
    async fn send(&self, message: Message) -> Result<()>;

    /// Bytes accepted by [`Channel::send`] that have not left the local side yet.
    fn buffered_amount(&self) -> u64;

    /// Close the channel. Closing twice is a no-op.
    async fn close(&self);
}

/// Inbound event delivered by a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The channel is ready for traffic
    Open,
    /// The channel was closed, by either side
    Close,
    /// The transport failed
    Error(String),
    /// A message arrived
    Message(Message),
}

/// Lifecycle state of a channel as seen by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No channel requested yet
    Disconnected,
    /// Channel requested, waiting for it to open
    Connecting,
    /// Channel open
    Open,
    /// Channel closed cleanly
    Closed,
    /// Channel failed
    Errored,
}

impl ChannelState {
    /// Whether the channel can no longer carry traffic.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Errored)
    }
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Ordered stream of inbound channel events.
///
/// The stream ends after the first `Close` or `Error`. If the producing side
/// disappears without saying so, a synthetic `Close` is delivered.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<ChannelEvent>,
    consumed: Option<Arc<AtomicU64>>,
    finished: bool,
}

impl EventStream {
    /// Wrap a receiver of channel events.
    #[must_use]
    pub fn new(rx: mpsc::UnboundedReceiver<ChannelEvent>) -> Self {
        Self {
            rx,
            consumed: None,
            finished: false,
        }
    }

    /// Wrap a receiver and subtract the size of every delivered message from
    /// `in_flight`, which the sending side reports as its buffered amount.
    #[must_use]
    pub fn with_in_flight(
        rx: mpsc::UnboundedReceiver<ChannelEvent>,
        in_flight: Arc<AtomicU64>,
    ) -> Self {
        Self {
            rx,
            consumed: Some(in_flight),
            finished: false,
        }
    }

    /// Receive the next event, or `None` once the stream has ended.
    ///
    /// Cancel safe: dropping the future before it completes loses no event.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        if self.finished {
            return None;
        }

        let event = self.rx.recv().await.unwrap_or(ChannelEvent::Close);

        match &event {
            ChannelEvent::Message(message) => {
                if let Some(counter) = &self.consumed {
                    let len = message.len() as u64;
                    let _ = counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                        Some(v.saturating_sub(len))
                    });
                }
            }
            ChannelEvent::Close | ChannelEvent::Error(_) => self.finished = true,
            ChannelEvent::Open => {}
        }

        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_ends_after_close() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut stream = EventStream::new(rx);

        tx.send(ChannelEvent::Open).unwrap();
        tx.send(ChannelEvent::Close).unwrap();
        tx.send(ChannelEvent::Open).unwrap();

        assert_eq!(stream.recv().await, Some(ChannelEvent::Open));
        assert_eq!(stream.recv().await, Some(ChannelEvent::Close));
        assert_eq!(stream.recv().await, None);
    }

    #[tokio::test]
    async fn test_dropped_producer_reads_as_close() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut stream = EventStream::new(rx);
        drop(tx);

        assert_eq!(stream.recv().await, Some(ChannelEvent::Close));
        assert_eq!(stream.recv().await, None);
    }

    #[tokio::test]
    async fn test_in_flight_is_released_on_delivery() {
        let (tx, rx) = mpsc::unbounded_channel();
        let in_flight = Arc::new(AtomicU64::new(10));
        let mut stream = EventStream::with_in_flight(rx, Arc::clone(&in_flight));

        tx.send(ChannelEvent::Message(Message::Text("abcd".to_string())))
            .unwrap();
        stream.recv().await;

        assert_eq!(in_flight.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_terminal_states() {
        assert!(ChannelState::Closed.is_terminal());
        assert!(ChannelState::Errored.is_terminal());
        assert!(!ChannelState::Open.is_terminal());
        assert!(!ChannelState::Connecting.is_terminal());
    }
}
