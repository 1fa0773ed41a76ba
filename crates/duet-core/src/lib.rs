//! # Duet Core Library
//!
//! `duet-core` implements the chunked transfer protocol and session state
//! machine used by Duet to exchange files and short text messages between two
//! directly paired peers.
//!
//! ## Features
//!
//! - **Link-based pairing**: a short peer id embedded in a shareable link
//! - **Chunked transfers**: bounded, index-tagged binary frames
//! - **Flow control**: sending pauses while the channel's outbound buffer is full
//! - **Full duplex**: each peer can upload and download at the same time
//!
//! ## Modules
//!
//! - [`channel`] - Ordered, reliable, message-based channel abstraction
//! - [`code`] - Peer id generation and pairing links
//! - [`config`] - Configuration management
//! - [`mod@file`] - File descriptors and outgoing file sources
//! - [`protocol`] - Control message codec and chunk framing
//! - [`qr`] - Terminal QR codes for pairing links
//! - [`session`] - Session controller state machine
//! - [`transfer`] - Transfer slots, sender pump and receiver assembler
//!
//! ## Example
//!
//! ```rust,ignore
//! use duet_core::channel::memory;
//! use duet_core::code::{PairingLink, PeerId};
//! use duet_core::config::TransferConfig;
//! use duet_core::file::OutgoingFile;
//! use duet_core::session::Session;
//!
//! let ((channel, events), _peer) = memory::pair();
//! let link = PairingLink::new("tcp://192.168.1.20:52610/", PeerId::generate());
//! let (session, handle, mut ui) =
//!     Session::new(link, None, Box::new(channel), events, TransferConfig::default());
//! tokio::spawn(session.run());
//! handle.offer(OutgoingFile::open("photo.jpg".as_ref()).await?)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod channel;
pub mod code;
pub mod config;
pub mod error;
pub mod file;
pub mod protocol;
pub mod qr;
pub mod session;
pub mod transfer;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default chunk payload size in bytes
pub const DEFAULT_CHUNK_SIZE: usize = 16_300;

/// Default backpressure high-water mark on unflushed channel bytes
pub const DEFAULT_HIGH_WATER_MARK: u64 = 8_000_000;

/// Default delay between backpressure re-checks in milliseconds
pub const DEFAULT_BACKPRESSURE_RETRY_MS: u64 = 50;

/// Default TCP port for the direct channel adapter
pub const DEFAULT_PORT: u16 = 52_610;
