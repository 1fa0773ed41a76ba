//! Connect command implementation.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{bail, Result};

use duet_core::channel::tcp;
use duet_core::code::{PairingLink, PeerId};
use duet_core::session::Session;

use super::interactive::{self, Outcome};
use super::ConnectArgs;

/// Run the connect command.
pub async fn run(args: ConnectArgs) -> Result<()> {
    let config = super::load_config();
    config.transfer.validate()?;

    let output_dir = args
        .output
        .clone()
        .or_else(|| config.general.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));

    let (addr, remote_id) = resolve_target(&args)?;
    let local_id = PeerId::generate();

    println!();
    println!("Duet v{}", duet_core::VERSION);
    println!("{}", "-".repeat(37));
    println!();
    println!("  Connecting to {} at {}...", remote_id, addr);

    let (channel, events) = tcp::connect(addr, &remote_id, &local_id).await?;

    let link = interactive::local_link(&config, config.pairing.port, local_id);
    let (session, handle, ui) = Session::new(
        link,
        Some(remote_id),
        Box::new(channel),
        events,
        config.transfer.clone(),
    );

    let mut input = interactive::prompt();
    match interactive::run(session, handle, ui, &mut input, &output_dir).await? {
        Outcome::Quit => {}
        Outcome::Disconnected(state) => {
            println!("  Peer left ({}).", state);
        }
    }

    Ok(())
}

/// Work out where to dial and which id to present.
fn resolve_target(args: &ConnectArgs) -> Result<(SocketAddr, PeerId)> {
    if args.target.contains('?') {
        let link = PairingLink::parse(&args.target)?;
        let addr = tcp::address_from_link(&link)?;
        return Ok((addr, link.peer_id().clone()));
    }

    let Some(code) = args.code.as_deref() else {
        bail!("A bare address needs --code. Pass the full pairing link or add --code XXXXXX");
    };

    Ok((tcp::parse_host_address(&args.target)?, PeerId::parse(code)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(target: &str, code: Option<&str>) -> ConnectArgs {
        ConnectArgs {
            target: target.to_string(),
            code: code.map(String::from),
            output: None,
        }
    }

    #[test]
    fn test_resolve_link() {
        let (addr, id) = resolve_target(&args("tcp://10.0.0.5:4000/?code=k7m2qx", None)).unwrap();
        assert_eq!(addr, "10.0.0.5:4000".parse().unwrap());
        assert_eq!(id.as_str(), "K7M2QX");
    }

    #[test]
    fn test_resolve_bare_address() {
        let (addr, id) = resolve_target(&args("10.0.0.5", Some("K7M2QX"))).unwrap();
        assert_eq!(addr.port(), duet_core::DEFAULT_PORT);
        assert_eq!(id.as_str(), "K7M2QX");
    }

    #[test]
    fn test_bare_address_needs_code() {
        assert!(resolve_target(&args("10.0.0.5:4000", None)).is_err());
    }

    #[test]
    fn test_non_tcp_link_is_rejected() {
        assert!(resolve_target(&args("https://duet.example/?code=K7M2QX", None)).is_err());
    }
}
