//! Listen command implementation.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::{Context, Result};

use duet_core::channel::tcp::PairingListener;
use duet_core::code::PeerId;
use duet_core::qr;
use duet_core::session::Session;

use super::interactive::{self, Outcome};
use super::ListenArgs;
use crate::ui::CodeBox;

/// Run the listen command.
///
/// Keeps accepting peers one at a time until the user quits.
pub async fn run(args: ListenArgs) -> Result<()> {
    let config = super::load_config();
    config.transfer.validate()?;

    let output_dir = args
        .output
        .or_else(|| config.general.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));

    let ip: IpAddr = args
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address '{}'", args.bind))?;
    let port = args.port.unwrap_or(config.pairing.port);

    let local_id = PeerId::generate();
    let listener = PairingListener::bind(SocketAddr::new(ip, port), local_id.clone()).await?;
    let port = listener.local_addr()?.port();
    let link = interactive::local_link(&config, port, local_id.clone());

    println!();
    println!("Duet v{}", duet_core::VERSION);
    println!("{}", "-".repeat(37));
    println!();

    let mut input = interactive::prompt();

    loop {
        let link_text = link.to_string();
        CodeBox::new(local_id.as_str()).with_link(&link_text).display();
        println!();
        if !args.no_qr {
            match qr::render_link(&link) {
                Ok(code) => {
                    for line in code.lines() {
                        println!("  {}", line);
                    }
                    println!();
                }
                Err(e) => tracing::debug!("No QR code for {}: {}", link, e),
            }
        }
        println!("  Waiting for a peer... (Ctrl+C to stop)");
        println!();

        let (channel, events, remote_id) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                println!("  Stopped.");
                return Ok(());
            }
        };

        println!("  Peer {} connected from {}", remote_id, channel.remote_addr());

        let (session, handle, ui) = Session::new(
            link.clone(),
            Some(remote_id),
            Box::new(channel),
            events,
            config.transfer.clone(),
        );

        match interactive::run(session, handle, ui, &mut input, &output_dir).await? {
            Outcome::Quit => return Ok(()),
            Outcome::Disconnected(state) => {
                tracing::info!("Peer left ({}), waiting for the next one", state);
                println!();
            }
        }
    }
}
