//! End-to-end tests for two sessions over TCP loopback.

mod common;

use std::net::SocketAddr;

use common::{random_bytes, test_config, Endpoint};
use duet_core::channel::tcp::{self, PairingListener};
use duet_core::channel::ChannelState;
use duet_core::code::{PairingLink, PeerId};
use duet_core::error::Error;
use duet_core::file::OutgoingFile;
use duet_core::session::SessionEvent;

async fn listener() -> (PairingListener, PairingLink) {
    let local_id = PeerId::generate();
    let addr: SocketAddr = "127.0.0.1:0".parse().expect("addr");
    let listener = PairingListener::bind(addr, local_id.clone())
        .await
        .expect("bind");

    let link = PairingLink::new(tcp::link_base(listener.local_addr().expect("addr")), local_id);
    (listener, link)
}

/// A dialer holding the pairing link reaches the listener and both can transfer.
#[tokio::test]
async fn test_pair_and_transfer_over_tcp() {
    let (listener, link) = listener().await;
    let dialer_id = PeerId::generate();

    let accept = tokio::spawn(async move { listener.accept().await });

    let parsed = PairingLink::parse(&link.to_string()).expect("parse link");
    let addr = tcp::address_from_link(&parsed).expect("address");
    let (channel, events) = tcp::connect(addr, parsed.peer_id(), &dialer_id)
        .await
        .expect("connect");

    let (host_channel, host_events, seen_id) = accept.await.expect("join").expect("accept");
    assert_eq!(seen_id, dialer_id);

    let mut dialer = Endpoint::spawn_with_id(
        dialer_id,
        Box::new(channel),
        events,
        Some(parsed.peer_id().clone()),
        test_config(16_300),
    );
    let mut host = Endpoint::spawn_with_id(
        link.peer_id().clone(),
        Box::new(host_channel),
        host_events,
        Some(seen_id),
        test_config(16_300),
    );
    dialer.wait_open().await;
    host.wait_open().await;

    let data = random_bytes(200_000);
    dialer
        .handle
        .offer(OutgoingFile::from_bytes("video.mp4", "video/mp4", data.clone()))
        .expect("offer");

    let events = host
        .events_until(|e| matches!(e, SessionEvent::Received(_)))
        .await;
    match events.last() {
        Some(SessionEvent::Received(artifact)) => {
            assert_eq!(artifact.file.name, "video.mp4");
            assert_eq!(artifact.file.mime_type, "video/mp4");
            assert_eq!(artifact.data.as_ref(), data.as_slice());
        }
        other => panic!("Expected Received, got: {other:?}"),
    }

    host.handle.send_text("got it").expect("send");
    dialer
        .events_until(|e| matches!(e, SessionEvent::Text(t) if t == "got it"))
        .await;

    dialer.handle.close().expect("close");
    assert_eq!(dialer.task.await.expect("dialer"), ChannelState::Closed);
    assert_eq!(host.task.await.expect("host"), ChannelState::Closed);
}

/// A dialer with the wrong code is refused and the listener keeps waiting.
#[tokio::test]
async fn test_wrong_code_is_rejected() {
    let (listener, link) = listener().await;
    let addr = tcp::address_from_link(&link).expect("address");

    let accept = tokio::spawn(async move { listener.accept().await });

    let wrong = PeerId::parse("ZZZZZZ").expect("id");
    match tcp::connect(addr, &wrong, &PeerId::generate()).await {
        Err(Error::PairingRejected(_)) => {}
        other => panic!("Expected PairingRejected, got: {:?}", other.map(|_| ())),
    }

    let dialer_id = PeerId::generate();
    let (_channel, _events) = tcp::connect(addr, link.peer_id(), &dialer_id)
        .await
        .expect("connect with the right code");

    let (_host_channel, _host_events, seen_id) = accept.await.expect("join").expect("accept");
    assert_eq!(seen_id, dialer_id);
}

/// Dropping the remote end ends the local session without a transfer.
#[tokio::test]
async fn test_remote_disconnect_offers_pairing_again() {
    let (listener, link) = listener().await;
    let addr = tcp::address_from_link(&link).expect("address");

    let accept = tokio::spawn(async move { listener.accept().await });
    let (channel, events) = tcp::connect(addr, link.peer_id(), &PeerId::generate())
        .await
        .expect("connect");
    let (host_channel, host_events, seen_id) = accept.await.expect("join").expect("accept");

    let mut host = Endpoint::spawn_with_id(
        link.peer_id().clone(),
        Box::new(host_channel),
        host_events,
        Some(seen_id),
        test_config(1024),
    );
    host.wait_open().await;

    drop(channel);
    drop(events);

    let seen = host
        .events_until(|e| matches!(e, SessionEvent::PairingAvailable(_)))
        .await;
    assert!(seen
        .iter()
        .any(|e| matches!(e, SessionEvent::StateChanged(ChannelState::Closed))));
    assert_eq!(host.task.await.expect("host"), ChannelState::Closed);
}
