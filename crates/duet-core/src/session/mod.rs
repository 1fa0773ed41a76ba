//! Session controller.
//!
//! A [`Session`] owns one channel and drives both transfer directions over
//! it. It runs as a single task: every channel event, UI command and outgoing
//! chunk frame is handled in turn inside [`Session::run`], so session state
//! needs no locking.
//!
//! ```text
//!   UI ──SessionCommand──▶ Session ──Message──▶ Channel ──▶ peer
//!   UI ◀──SessionEvent──── Session ◀──ChannelEvent── EventStream ◀── peer
//! ```
//!
//! ## Transfer flow
//!
//! ```text
//!   uploader                        downloader
//!      │ ── info {fileinfo} ────────▶ │  download slot created
//!      │ ◀──────────────── ready ──── │
//!      │ ── chunk 0 ─────────────────▶ │
//!      │ ── chunk 1 ... ─────────────▶ │
//!      │ ◀────────────────── end ──── │  all bytes received
//! ```
//!
//! Either side may interrupt with `cancel {direction}`, where the direction
//! is named from the sender's point of view.

use tokio::sync::mpsc;

use crate::channel::{Channel, ChannelEvent, ChannelState, EventStream};
use crate::code::{PairingLink, PeerId};
use crate::config::{OfferPolicy, TransferConfig};
use crate::error::{Error, Result};
use crate::file::{FileDescriptor, OutgoingFile};
use crate::protocol::{self, ControlMessage, Direction, Message};
use crate::transfer::{
    wait_for_capacity, Accepted, Artifact, ReceiverAssembler, SenderPump, TransferProgress,
    TransferSlot,
};

/// Requests from the UI.
#[derive(Debug)]
pub enum SessionCommand {
    /// Offer a file to the peer
    Offer(OutgoingFile),
    /// Abort the transfer in one direction
    Cancel(Direction),
    /// Send a text message
    SendText(String),
    /// Close the channel and end the session
    Close,
}

/// Notifications for the UI.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Channel state changed
    StateChanged(ChannelState),
    /// The local pairing link should be shown so a peer can (re)connect
    PairingAvailable(PairingLink),
    /// A transfer began
    TransferStarted {
        /// Upload or download
        direction: Direction,
        /// File being transferred
        file: FileDescriptor,
    },
    /// A chunk went through
    Progress(TransferProgress),
    /// A transfer finished
    Completed {
        /// Upload or download
        direction: Direction,
        /// File transferred
        file: FileDescriptor,
    },
    /// A transfer, or a pending offer, was aborted
    Cancelled {
        /// Upload or download
        direction: Direction,
        /// File concerned
        file: FileDescriptor,
    },
    /// A download was assembled
    Received(Artifact),
    /// The peer sent a text message
    Text(String),
    /// Whether a new upload may be offered
    UploadAvailability(bool),
}

/// Cloneable handle for sending commands to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    fn submit(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::NotConnected)
    }

    /// Offer a file to the peer.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotConnected` if the session has ended.
    pub fn offer(&self, file: OutgoingFile) -> Result<()> {
        self.submit(SessionCommand::Offer(file))
    }

    /// Cancel the transfer in `direction`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotConnected` if the session has ended.
    pub fn cancel(&self, direction: Direction) -> Result<()> {
        self.submit(SessionCommand::Cancel(direction))
    }

    /// Send a text message.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotConnected` if the session has ended.
    pub fn send_text(&self, body: impl Into<String>) -> Result<()> {
        self.submit(SessionCommand::SendText(body.into()))
    }

    /// Close the session.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotConnected` if the session has already ended.
    pub fn close(&self) -> Result<()> {
        self.submit(SessionCommand::Close)
    }
}

#[derive(Debug)]
struct Upload {
    slot: TransferSlot,
    pump: SenderPump,
}

impl Upload {
    fn wants_frame(&self) -> bool {
        self.slot.is_live() && !self.pump.is_finished()
    }
}

/// One peer-to-peer session over an exclusively owned channel.
pub struct Session {
    local_link: PairingLink,
    remote_id: Option<PeerId>,
    channel: Box<dyn Channel>,
    events: EventStream,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    ui: mpsc::UnboundedSender<SessionEvent>,
    config: TransferConfig,
    state: ChannelState,
    upload: Option<Upload>,
    download: Option<ReceiverAssembler>,
    queued: Option<OutgoingFile>,
    uploads_enabled: bool,
    transfer_shown: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("local_id", self.local_link.peer_id())
            .field("remote_id", &self.remote_id)
            .field("state", &self.state)
            .field("upload", &self.upload)
            .field("download", &self.download)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session over `channel`.
    ///
    /// `local_link` is what the UI shows for (re)pairing. `remote_id` is the
    /// peer this session dialed or accepted, if known.
    ///
    /// Returns the session, a handle for UI commands and the UI event stream.
    #[must_use]
    pub fn new(
        local_link: PairingLink,
        remote_id: Option<PeerId>,
        channel: Box<dyn Channel>,
        events: EventStream,
        config: TransferConfig,
    ) -> (Self, SessionHandle, mpsc::UnboundedReceiver<SessionEvent>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (ui_tx, ui_rx) = mpsc::unbounded_channel();

        let session = Self {
            local_link,
            remote_id,
            channel,
            events,
            commands: commands_rx,
            ui: ui_tx,
            config,
            state: ChannelState::Disconnected,
            upload: None,
            download: None,
            queued: None,
            uploads_enabled: false,
            transfer_shown: false,
        };

        (
            session,
            SessionHandle {
                commands: commands_tx,
            },
            ui_rx,
        )
    }

    /// Local peer id.
    #[must_use]
    pub fn local_id(&self) -> &PeerId {
        self.local_link.peer_id()
    }

    /// Drive the session until the channel closes, fails, or the UI closes it.
    ///
    /// Returns the final channel state.
    pub async fn run(mut self) -> ChannelState {
        tracing::info!(
            "Session {} started (peer: {})",
            self.local_id(),
            self.remote_id
                .as_ref()
                .map_or_else(|| "unknown".to_string(), ToString::to_string)
        );
        self.set_state(ChannelState::Connecting);

        let high_water_mark = self.config.high_water_mark;
        let retry = self.config.backpressure_retry;

        while !self.state.is_terminal() {
            let pumping = self.upload.as_ref().is_some_and(Upload::wants_frame);

            tokio::select! {
                biased;

                event = self.events.recv() => match event {
                    Some(event) => self.handle_channel_event(event).await,
                    None => self.teardown(ChannelState::Closed),
                },
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        tracing::debug!("UI handle dropped, closing session");
                        self.close().await;
                    }
                },
                () = wait_for_capacity(self.channel.as_ref(), high_water_mark, retry), if pumping => {
                    self.pump_next_frame().await;
                }
            }
        }

        tracing::info!("Session {} ended ({})", self.local_id(), self.state);
        self.state
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.ui.send(event);
    }

    fn set_state(&mut self, state: ChannelState) {
        if self.state != state {
            tracing::info!("Channel state: {} -> {}", self.state, state);
            self.state = state;
            self.emit(SessionEvent::StateChanged(state));
        }
    }

    fn set_uploads_enabled(&mut self, enabled: bool) {
        if self.uploads_enabled != enabled {
            self.uploads_enabled = enabled;
            self.emit(SessionEvent::UploadAvailability(enabled));
        }
    }

    async fn send_control(&self, message: &ControlMessage) -> Result<()> {
        tracing::debug!("Sending {}", message.name());
        self.channel.send(protocol::encode(message)?).await
    }

    /// Send a control message whose loss only affects the peer's view.
    async fn notify(&self, message: &ControlMessage) {
        if let Err(e) = self.send_control(message).await {
            tracing::warn!("Failed to send {}: {}", message.name(), e);
        }
    }

    async fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Open => {
                self.set_state(ChannelState::Open);
                self.set_uploads_enabled(true);
            }
            ChannelEvent::Close => {
                tracing::info!("Channel closed by peer");
                self.teardown(ChannelState::Closed);
            }
            ChannelEvent::Error(reason) => {
                tracing::warn!("Channel error: {}", reason);
                self.teardown(ChannelState::Errored);
            }
            ChannelEvent::Message(_) if self.state != ChannelState::Open => {
                tracing::warn!("Ignoring message received while {}", self.state);
            }
            ChannelEvent::Message(Message::Text(text)) => match protocol::decode(&text) {
                Ok(message) => self.handle_control(message).await,
                Err(e) => tracing::warn!("Ignoring malformed control message: {}", e),
            },
            ChannelEvent::Message(Message::Binary(frame)) => self.handle_chunk(frame).await,
        }
    }

    async fn handle_control(&mut self, message: ControlMessage) {
        tracing::debug!("Received {}", message.name());

        match message {
            ControlMessage::Offer { file } => self.on_offer(file).await,
            ControlMessage::Ready => self.on_ready(),
            ControlMessage::End => self.on_end(),
            ControlMessage::Cancel {
                direction: Direction::Down,
            } => {
                tracing::info!("Peer cancelled its download");
                self.stop_upload();
            }
            ControlMessage::Cancel {
                direction: Direction::Up,
            } => {
                tracing::info!("Peer cancelled its upload");
                self.stop_download();
            }
            ControlMessage::Text { body } => self.emit(SessionEvent::Text(body)),
        }
    }

    async fn on_offer(&mut self, file: FileDescriptor) {
        let busy = self
            .download
            .as_ref()
            .is_some_and(|d| d.slot().is_live());

        if busy {
            match self.config.offer_policy {
                OfferPolicy::Reject => {
                    tracing::warn!(
                        "Rejecting offer for {} while a download is running",
                        file.name
                    );
                    self.notify(&ControlMessage::Cancel {
                        direction: Direction::Down,
                    })
                    .await;
                    return;
                }
                OfferPolicy::Replace => {
                    tracing::info!("Replacing running download with {}", file.name);
                    self.stop_download();
                }
            }
        }

        tracing::info!(
            "Accepting {} ({})",
            file.name,
            crate::file::format_size(file.size)
        );

        self.transfer_shown = true;
        self.emit(SessionEvent::TransferStarted {
            direction: Direction::Down,
            file: file.clone(),
        });
        self.download = Some(ReceiverAssembler::new(file));

        self.notify(&ControlMessage::Ready).await;

        // An empty file is complete as soon as it is accepted.
        let Some(download) = self.download.as_mut() else {
            return;
        };
        if let Some(artifact) = download.complete_if_done() {
            let progress = download.slot().progress();
            self.emit(SessionEvent::Progress(progress));
            self.finish_download(artifact).await;
        }
    }

    fn on_ready(&mut self) {
        if self.upload.as_ref().is_some_and(|u| u.slot.is_live()) {
            tracing::warn!("Ignoring ready: an upload is already running");
            return;
        }

        let Some(file) = self.queued.take() else {
            tracing::warn!("Ignoring ready: {}", Error::NoQueuedFile);
            return;
        };

        let (descriptor, source) = file.into_parts();
        tracing::info!(
            "Peer ready, uploading {} ({})",
            descriptor.name,
            crate::file::format_size(descriptor.size)
        );

        let pump = SenderPump::new(source, descriptor.size, self.config.chunk_size);
        let slot = TransferSlot::new(descriptor.clone(), Direction::Up);

        self.transfer_shown = true;
        self.emit(SessionEvent::TransferStarted {
            direction: Direction::Up,
            file: descriptor,
        });
        if pump.is_finished() {
            self.emit(SessionEvent::Progress(slot.progress()));
        }
        self.upload = Some(Upload { slot, pump });
    }

    fn on_end(&mut self) {
        let Some(upload) = self.upload.as_mut().filter(|u| u.slot.is_live()) else {
            tracing::warn!("Ignoring end: no upload is running");
            return;
        };

        upload.slot.complete();
        let file = upload.slot.file.clone();
        tracing::info!("Upload of {} acknowledged by peer", file.name);

        self.emit(SessionEvent::Completed {
            direction: Direction::Up,
            file,
        });
        self.set_uploads_enabled(true);
    }

    async fn handle_chunk(&mut self, frame: bytes::Bytes) {
        let Some(download) = self.download.as_mut() else {
            tracing::warn!("Dropping chunk: no download in progress");
            return;
        };

        match download.accept(frame) {
            Ok(Accepted::Dropped) => {
                tracing::debug!("Dropping chunk for inactive download");
            }
            Ok(Accepted::Progress(progress)) => self.emit(SessionEvent::Progress(progress)),
            Ok(Accepted::Complete(artifact)) => {
                let progress = download.slot().progress();
                self.emit(SessionEvent::Progress(progress));
                self.finish_download(artifact).await;
            }
            Err(e) => tracing::warn!("Dropping chunk: {}", e),
        }
    }

    async fn finish_download(&mut self, artifact: Artifact) {
        self.emit(SessionEvent::Completed {
            direction: Direction::Down,
            file: artifact.file.clone(),
        });
        self.emit(SessionEvent::Received(artifact));
        self.notify(&ControlMessage::End).await;
    }

    async fn pump_next_frame(&mut self) {
        let Some(upload) = self.upload.as_mut() else {
            return;
        };

        match upload.pump.send_next(self.channel.as_ref()).await {
            Ok(Some(bytes_done)) => {
                upload.slot.advance_to(bytes_done);
                let progress = upload.slot.progress();
                if upload.pump.is_finished() {
                    tracing::debug!("All chunks of {} sent, waiting for end", upload.slot.file.name);
                }
                self.emit(SessionEvent::Progress(progress));
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Upload failed: {}", e);
                if self.stop_upload() {
                    self.notify(&ControlMessage::Cancel {
                        direction: Direction::Up,
                    })
                    .await;
                }
            }
        }
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Offer(file) => self.offer(file).await,
            SessionCommand::Cancel(direction) => self.cancel(direction).await,
            SessionCommand::SendText(body) => {
                if self.state == ChannelState::Open {
                    self.notify(&ControlMessage::Text { body }).await;
                } else {
                    tracing::warn!("Cannot send text: {}", Error::NotConnected);
                }
            }
            SessionCommand::Close => self.close().await,
        }
    }

    async fn offer(&mut self, file: OutgoingFile) {
        if self.state != ChannelState::Open {
            tracing::warn!("Cannot offer {}: {}", file.descriptor().name, Error::NotConnected);
            return;
        }
        if !self.uploads_enabled {
            tracing::warn!("Cannot offer {}: {}", file.descriptor().name, Error::TransferBusy);
            return;
        }

        let offer = ControlMessage::Offer {
            file: file.descriptor().clone(),
        };

        match self.send_control(&offer).await {
            Ok(()) => {
                tracing::info!("Offered {}", file.descriptor().name);
                self.queued = Some(file);
                self.set_uploads_enabled(false);
            }
            Err(e) => tracing::warn!("Failed to offer {}: {}", file.descriptor().name, e),
        }
    }

    async fn cancel(&mut self, direction: Direction) {
        let cancelled = match direction {
            Direction::Up => self.stop_upload(),
            Direction::Down => self.stop_download(),
        };

        if cancelled {
            tracing::info!("Cancelled {} locally", direction);
            self.notify(&ControlMessage::Cancel { direction }).await;
        } else {
            tracing::debug!("Nothing to cancel for {}", direction);
        }
    }

    /// Stop the local upload, or drop the pending offer.
    ///
    /// Returns whether anything was stopped.
    fn stop_upload(&mut self) -> bool {
        let file = if let Some(queued) = self.queued.take() {
            Some(queued.descriptor().clone())
        } else if let Some(upload) = self.upload.as_mut() {
            upload.slot.cancel().then(|| upload.slot.file.clone())
        } else {
            None
        };

        let Some(file) = file else {
            return false;
        };

        self.emit(SessionEvent::Cancelled {
            direction: Direction::Up,
            file,
        });
        if self.state == ChannelState::Open {
            self.set_uploads_enabled(true);
        }
        true
    }

    /// Stop the local download. Returns whether it was running.
    fn stop_download(&mut self) -> bool {
        let Some(download) = self.download.as_mut() else {
            return false;
        };
        if !download.cancel() {
            return false;
        }

        let file = download.slot().file.clone();
        self.emit(SessionEvent::Cancelled {
            direction: Direction::Down,
            file,
        });
        true
    }

    async fn close(&mut self) {
        self.channel.close().await;
        self.teardown(ChannelState::Closed);
    }

    fn teardown(&mut self, state: ChannelState) {
        if self.state.is_terminal() {
            return;
        }

        self.set_state(state);
        self.stop_upload();
        self.stop_download();
        self.set_uploads_enabled(false);

        if !self.transfer_shown {
            self.emit(SessionEvent::PairingAvailable(self.local_link.clone()));
        }
    }
}
