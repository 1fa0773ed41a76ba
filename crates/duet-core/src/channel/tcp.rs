//! TCP channel adapter.
//!
//! Messages travel as length-prefixed frames:
//!
//! ```text
//! ┌─────────────────┬──────────┬──────────────────┬─────────────────┐
//! │ Magic (4 bytes) │ Kind (1) │ Length (4, BE)   │ Payload         │
//! │ "DUET"          │          │                  │ (Length bytes)  │
//! └─────────────────┴──────────┴──────────────────┴─────────────────┘
//! ```
//!
//! Before any message flows, the dialing side sends a `Hello` frame naming
//! the peer id it was given. The listener answers `Welcome` if the id is its
//! own, or `Reject` and drops the connection otherwise.
//!
//! Outbound messages go through a writer task. Bytes sitting in its queue
//! are the channel's buffered amount.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::{Channel, ChannelEvent, EventStream};
use crate::code::{PairingLink, PeerId};
use crate::error::{Error, Result};
use crate::protocol::Message;

/// Magic bytes opening every frame: "DUET"
pub const MAGIC: [u8; 4] = *b"DUET";

/// Frame header size in bytes
pub const HEADER_SIZE: usize = 9;

/// Maximum payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// URL scheme used for pairing link bases
pub const LINK_SCHEME: &str = "tcp://";

/// Time allowed for the pairing exchange
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Frame kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// Text channel message
    Text = 0x01,
    /// Binary channel message
    Binary = 0x02,
    /// Pairing request
    Hello = 0x10,
    /// Pairing accepted
    Welcome = 0x11,
    /// Pairing refused
    Reject = 0x12,
}

impl FrameKind {
    /// Parse a frame kind from a byte.
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Text),
            0x02 => Some(Self::Binary),
            0x10 => Some(Self::Hello),
            0x11 => Some(Self::Welcome),
            0x12 => Some(Self::Reject),
            _ => None,
        }
    }
}

/// Frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Frame kind
    pub kind: FrameKind,
    /// Payload length
    pub payload_length: u32,
}

impl FrameHeader {
    /// Encode the header to bytes.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4] = self.kind as u8;
        buf[5..9].copy_from_slice(&self.payload_length.to_be_bytes());
        buf
    }

    /// Decode a header from bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is invalid.
    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        if buf[0..4] != MAGIC {
            return Err(Error::ProtocolError("invalid magic bytes".to_string()));
        }

        let kind = FrameKind::from_byte(buf[4])
            .ok_or_else(|| Error::ProtocolError(format!("unknown frame kind: {:#x}", buf[4])))?;

        let payload_length = u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]);

        if payload_length as usize > MAX_PAYLOAD_SIZE {
            return Err(Error::ProtocolError(format!(
                "payload too large: {payload_length} bytes"
            )));
        }

        Ok(Self {
            kind,
            payload_length,
        })
    }
}

/// Pairing request sent by the dialing side.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct HelloPayload {
    /// Peer id the dialer was given
    code: String,
    /// Dialer's own peer id
    peer: String,
}

/// Read a complete frame from a stream.
///
/// # Errors
///
/// Returns an error if reading fails or the frame is invalid.
pub async fn read_frame<R>(reader: &mut R) -> Result<(FrameHeader, Bytes)>
where
    R: AsyncReadExt + Unpin,
{
    let mut header_buf = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_buf).await?;

    let header = FrameHeader::decode(&header_buf)?;

    let mut payload = vec![0u8; header.payload_length as usize];
    if header.payload_length > 0 {
        reader.read_exact(&mut payload).await?;
    }

    Ok((header, Bytes::from(payload)))
}

/// Write a complete frame to a stream.
///
/// # Errors
///
/// Returns an error if the payload is too large or writing fails.
pub async fn write_frame<W>(writer: &mut W, kind: FrameKind, payload: &[u8]) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(Error::ProtocolError(format!(
            "payload too large: {} bytes",
            payload.len()
        )));
    }

    #[allow(clippy::cast_possible_truncation)]
    let header = FrameHeader {
        kind,
        payload_length: payload.len() as u32,
    };

    writer.write_all(&header.encode()).await?;
    if !payload.is_empty() {
        writer.write_all(payload).await?;
    }
    writer.flush().await?;

    Ok(())
}

async fn read_frame_with_timeout<R>(reader: &mut R) -> Result<(FrameHeader, Bytes)>
where
    R: AsyncReadExt + Unpin,
{
    timeout(HANDSHAKE_TIMEOUT, read_frame(reader))
        .await
        .map_err(|_| Error::Timeout(HANDSHAKE_TIMEOUT.as_secs()))?
}

/// Configure TCP keep-alive on a socket so dead peers are noticed.
fn configure_tcp_keepalive(stream: &TcpStream) -> Result<()> {
    let socket_ref = SockRef::from(stream);

    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(10))
        .with_interval(Duration::from_secs(5));

    socket_ref
        .set_tcp_keepalive(&keepalive)
        .map_err(|e| Error::Io(std::io::Error::other(e)))?;

    stream.set_nodelay(true)?;

    tracing::debug!("TCP keep-alive enabled on socket");
    Ok(())
}

/// Parse a host address string into a `SocketAddr`.
///
/// Supports:
/// - IPv4: `192.168.1.100` (uses default port)
/// - IPv4 with port: `192.168.1.100:52610`
/// - IPv6: `[::1]` (uses default port)
/// - IPv6 with port: `[::1]:52610`
///
/// # Errors
///
/// Returns an error if the address format is invalid.
pub fn parse_host_address(host: &str) -> Result<SocketAddr> {
    let host = host.trim();
    let invalid = || {
        Error::InvalidInput(format!(
            "Invalid host format '{host}'. Use IP or IP:PORT (e.g., 192.168.1.100:52610)"
        ))
    };

    if let Ok(addr) = host.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Some(ip_str) = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
        let ip: IpAddr = ip_str.parse().map_err(|_| invalid())?;
        return Ok(SocketAddr::new(ip, crate::DEFAULT_PORT));
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, crate::DEFAULT_PORT));
    }

    if let Some((ip_part, port_part)) = host.rsplit_once(':') {
        if !ip_part.contains(':') {
            let ip: IpAddr = ip_part.parse().map_err(|_| invalid())?;
            let port: u16 = port_part.parse().map_err(|_| {
                Error::InvalidInput(format!(
                    "Invalid port '{port_part}'. Port must be a number between 1 and 65535"
                ))
            })?;
            return Ok(SocketAddr::new(ip, port));
        }
    }

    Err(invalid())
}

/// Link base for a listening address, e.g. `tcp://192.168.1.20:52610/`.
#[must_use]
pub fn link_base(addr: SocketAddr) -> String {
    format!("{LINK_SCHEME}{addr}/")
}

/// Resolve the address embedded in a pairing link.
///
/// # Errors
///
/// Returns `Error::InvalidLink` if the link carries no usable address.
pub fn address_from_link(link: &PairingLink) -> Result<SocketAddr> {
    let host = link
        .base()
        .strip_prefix(LINK_SCHEME)
        .ok_or_else(|| Error::InvalidLink(format!("'{link}' is not a {LINK_SCHEME} link")))?
        .trim_end_matches('/');

    parse_host_address(host).map_err(|e| Error::InvalidLink(e.to_string()))
}

/// Best-effort guess of the address other devices on the LAN can reach.
#[must_use]
pub fn local_ip() -> Option<IpAddr> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}

enum Outbound {
    Message(Message),
    Close,
}

/// A channel over an established, paired TCP connection.
#[derive(Debug)]
pub struct TcpChannel {
    outbound: mpsc::UnboundedSender<Outbound>,
    queued: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
    remote_addr: SocketAddr,
}

impl std::fmt::Debug for Outbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Message(m) => write!(f, "Message({} bytes)", m.len()),
            Self::Close => f.write_str("Close"),
        }
    }
}

impl TcpChannel {
    /// Start the reader and writer tasks for a paired stream.
    fn start(stream: TcpStream, remote_addr: SocketAddr) -> (Self, EventStream) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let queued = Arc::new(AtomicU64::new(0));
        let closed = Arc::new(AtomicBool::new(false));

        let _ = events_tx.send(ChannelEvent::Open);

        let (read_half, write_half) = stream.into_split();
        tokio::spawn(reader_task(read_half, events_tx.clone()));
        tokio::spawn(writer_task(
            write_half,
            outbound_rx,
            Arc::clone(&queued),
            events_tx,
        ));

        let channel = Self {
            outbound: outbound_tx,
            queued,
            closed,
            remote_addr,
        };

        (channel, EventStream::new(events_rx))
    }

    /// Address of the remote peer.
    #[must_use]
    pub const fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}

#[async_trait]
impl Channel for TcpChannel {
    async fn send(&self, message: Message) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ChannelClosed);
        }

        if message.len() > MAX_PAYLOAD_SIZE {
            return Err(Error::SendFailed(format!(
                "message of {} bytes exceeds the {} byte frame limit",
                message.len(),
                MAX_PAYLOAD_SIZE
            )));
        }

        let len = message.len() as u64;
        self.queued.fetch_add(len, Ordering::SeqCst);

        if self.outbound.send(Outbound::Message(message)).is_err() {
            self.queued.fetch_sub(len, Ordering::SeqCst);
            return Err(Error::SendFailed("writer task has stopped".to_string()));
        }

        Ok(())
    }

    fn buffered_amount(&self) -> u64 {
        self.queued.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Closing TCP channel to {}", self.remote_addr);
            let _ = self.outbound.send(Outbound::Close);
        }
    }
}

async fn reader_task(mut reader: OwnedReadHalf, events: mpsc::UnboundedSender<ChannelEvent>) {
    loop {
        let event = match read_frame(&mut reader).await {
            Ok((header, payload)) => match header.kind {
                FrameKind::Binary => ChannelEvent::Message(Message::Binary(payload)),
                FrameKind::Text => match String::from_utf8(payload.to_vec()) {
                    Ok(text) => ChannelEvent::Message(Message::Text(text)),
                    Err(e) => {
                        tracing::warn!("Dropping text frame that is not valid UTF-8: {}", e);
                        continue;
                    }
                },
                other => {
                    tracing::warn!("Ignoring unexpected {:?} frame after pairing", other);
                    continue;
                }
            },
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                ChannelEvent::Close
            }
            Err(e) => ChannelEvent::Error(e.to_string()),
        };

        let terminal = matches!(event, ChannelEvent::Close | ChannelEvent::Error(_));
        if events.send(event).is_err() || terminal {
            break;
        }
    }

    tracing::debug!("TCP reader task finished");
}

async fn writer_task(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    queued: Arc<AtomicU64>,
    events: mpsc::UnboundedSender<ChannelEvent>,
) {
    while let Some(item) = outbound.recv().await {
        let Outbound::Message(message) = item else {
            break;
        };

        let len = message.len() as u64;
        let (kind, payload) = match &message {
            Message::Text(text) => (FrameKind::Text, text.as_bytes()),
            Message::Binary(data) => (FrameKind::Binary, &data[..]),
        };

        let result = write_frame(&mut writer, kind, payload).await;
        queued.fetch_sub(len, Ordering::SeqCst);

        if let Err(e) = result {
            tracing::warn!("TCP write failed: {}", e);
            let _ = events.send(ChannelEvent::Error(e.to_string()));
            return;
        }
    }

    let _ = writer.shutdown().await;
    tracing::debug!("TCP writer task finished");
}

/// Listener waiting for a peer that presents our peer id.
#[derive(Debug)]
pub struct PairingListener {
    listener: TcpListener,
    local_id: PeerId,
}

impl PairingListener {
    /// Bind to `addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind(addr: SocketAddr, local_id: PeerId) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Listening for peers on {}", listener.local_addr()?);
        Ok(Self { listener, local_id })
    }

    /// Address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Peer id that dialers must present.
    #[must_use]
    pub const fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    /// Wait for a dialer presenting our id and open a channel to it.
    ///
    /// Connections with a wrong id or a broken handshake are refused and
    /// the listener keeps waiting.
    ///
    /// # Errors
    ///
    /// Returns an error only if accepting connections fails.
    pub async fn accept(&self) -> Result<(TcpChannel, EventStream, PeerId)> {
        loop {
            let (mut stream, remote_addr) = self.listener.accept().await?;
            tracing::debug!("Incoming connection from {}", remote_addr);

            match self.pair_incoming(&mut stream).await {
                Ok(remote_id) => {
                    configure_tcp_keepalive(&stream)?;
                    tracing::info!("Paired with {} at {}", remote_id, remote_addr);
                    let (channel, events) = TcpChannel::start(stream, remote_addr);
                    return Ok((channel, events, remote_id));
                }
                Err(e) => {
                    tracing::warn!("Refused connection from {}: {}", remote_addr, e);
                }
            }
        }
    }

    async fn pair_incoming(&self, stream: &mut TcpStream) -> Result<PeerId> {
        let (header, payload) = read_frame_with_timeout(stream).await?;
        if header.kind != FrameKind::Hello {
            return Err(Error::ProtocolError(format!(
                "expected Hello, got {:?}",
                header.kind
            )));
        }

        let hello: HelloPayload = serde_json::from_slice(&payload)?;

        let accepted = PeerId::parse(&hello.code).is_ok_and(|id| id == self.local_id);
        if !accepted {
            let reason = "unknown pairing code";
            write_frame(stream, FrameKind::Reject, reason.as_bytes()).await?;
            return Err(Error::PairingRejected(reason.to_string()));
        }

        let remote_id = PeerId::parse(&hello.peer)?;
        write_frame(stream, FrameKind::Welcome, &[]).await?;
        Ok(remote_id)
    }
}

/// Dial a listener and present the peer id from its pairing link.
///
/// # Errors
///
/// Returns an error if the connection fails, times out, or the listener
/// rejects the id.
pub async fn connect(
    addr: SocketAddr,
    remote_id: &PeerId,
    local_id: &PeerId,
) -> Result<(TcpChannel, EventStream)> {
    tracing::debug!("Connecting to {} for peer {}", addr, remote_id);

    let mut stream = timeout(HANDSHAKE_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| Error::Timeout(HANDSHAKE_TIMEOUT.as_secs()))??;

    let hello = HelloPayload {
        code: remote_id.to_string(),
        peer: local_id.to_string(),
    };
    write_frame(&mut stream, FrameKind::Hello, &serde_json::to_vec(&hello)?).await?;

    let (header, payload) = read_frame_with_timeout(&mut stream).await?;
    match header.kind {
        FrameKind::Welcome => {}
        FrameKind::Reject => {
            return Err(Error::PairingRejected(
                String::from_utf8_lossy(&payload).into_owned(),
            ));
        }
        other => {
            return Err(Error::ProtocolError(format!(
                "expected Welcome, got {other:?}"
            )));
        }
    }

    configure_tcp_keepalive(&stream)?;
    tracing::info!("Paired with {} at {}", remote_id, addr);
    Ok(TcpChannel::start(stream, addr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_header_roundtrip() {
        let header = FrameHeader {
            kind: FrameKind::Binary,
            payload_length: 16_304,
        };

        let encoded = header.encode();
        assert_eq!(&encoded[0..4], b"DUET");
        assert_eq!(FrameHeader::decode(&encoded).unwrap(), header);
    }

    #[test]
    fn test_frame_header_rejects_bad_magic() {
        let mut encoded = FrameHeader {
            kind: FrameKind::Text,
            payload_length: 0,
        }
        .encode();
        encoded[0] = b'X';

        assert!(matches!(
            FrameHeader::decode(&encoded),
            Err(Error::ProtocolError(_))
        ));
    }

    #[test]
    fn test_frame_header_rejects_oversized_payload() {
        let mut encoded = FrameHeader {
            kind: FrameKind::Binary,
            payload_length: 0,
        }
        .encode();
        #[allow(clippy::cast_possible_truncation)]
        encoded[5..9].copy_from_slice(&((MAX_PAYLOAD_SIZE + 1) as u32).to_be_bytes());

        assert!(FrameHeader::decode(&encoded).is_err());
    }

    #[tokio::test]
    async fn test_frame_roundtrip_over_duplex() {
        let (mut a, mut b) = tokio::io::duplex(1024);

        write_frame(&mut a, FrameKind::Text, b"{\"event\":\"ready\"}")
            .await
            .unwrap();
        let (header, payload) = read_frame(&mut b).await.unwrap();

        assert_eq!(header.kind, FrameKind::Text);
        assert_eq!(&payload[..], b"{\"event\":\"ready\"}");
    }

    async fn loopback() -> (TcpChannel, EventStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let (server, remote_addr) = accepted.unwrap();

        let (channel, events) = TcpChannel::start(server, remote_addr);
        (channel, events, client.unwrap())
    }

    #[tokio::test]
    async fn test_invalid_utf8_text_frame_is_skipped() {
        let (_channel, mut events, mut raw) = loopback().await;
        assert_eq!(events.recv().await, Some(ChannelEvent::Open));

        write_frame(&mut raw, FrameKind::Text, &[0xff, 0xfe, b'{'])
            .await
            .unwrap();
        write_frame(&mut raw, FrameKind::Text, b"{\"event\":\"ready\"}")
            .await
            .unwrap();

        let event = timeout(Duration::from_secs(5), events.recv()).await.unwrap();
        assert_eq!(
            event,
            Some(ChannelEvent::Message(Message::Text(
                "{\"event\":\"ready\"}".to_string()
            )))
        );
    }

    #[tokio::test]
    async fn test_oversized_send_fails_without_killing_channel() {
        let (channel, mut events, mut raw) = loopback().await;
        assert_eq!(events.recv().await, Some(ChannelEvent::Open));

        let huge = Message::Text("x".repeat(MAX_PAYLOAD_SIZE + 1));
        assert!(matches!(channel.send(huge).await, Err(Error::SendFailed(_))));
        assert_eq!(channel.buffered_amount(), 0);

        channel
            .send(Message::Binary(Bytes::from_static(b"still up")))
            .await
            .unwrap();
        let (header, payload) = timeout(Duration::from_secs(5), read_frame(&mut raw))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(header.kind, FrameKind::Binary);
        assert_eq!(&payload[..], b"still up");
    }

    #[test]
    fn test_parse_host_address() {
        assert_eq!(
            parse_host_address("192.168.1.5:4000").unwrap(),
            "192.168.1.5:4000".parse().unwrap()
        );
        assert_eq!(
            parse_host_address("192.168.1.5").unwrap().port(),
            crate::DEFAULT_PORT
        );
        assert_eq!(
            parse_host_address("[::1]").unwrap(),
            SocketAddr::new("::1".parse().unwrap(), crate::DEFAULT_PORT)
        );
        assert!(parse_host_address("192.168.1.5:notaport").is_err());
        assert!(parse_host_address("example").is_err());
    }

    #[test]
    fn test_address_from_link() {
        let id = PeerId::parse("K7PQ2M").unwrap();
        let addr: SocketAddr = "10.0.0.7:52610".parse().unwrap();
        let link = PairingLink::new(link_base(addr), id);

        assert_eq!(link.to_string(), "tcp://10.0.0.7:52610/?code=K7PQ2M");
        assert_eq!(address_from_link(&link).unwrap(), addr);
    }

    #[test]
    fn test_address_from_link_requires_tcp_base() {
        let id = PeerId::parse("K7PQ2M").unwrap();
        let link = PairingLink::new("https://duet.example/", id);
        assert!(matches!(address_from_link(&link), Err(Error::InvalidLink(_))));
    }
}
