//! Interactive session shared by `listen` and `connect`.
//!
//! Lines typed on stdin become commands:
//!
//! - `/send <path>` offers a file
//! - `/cancel up|down` aborts a transfer
//! - `/quit` closes the session
//!
//! Anything else is sent to the peer as a text message.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc::UnboundedReceiver;

use duet_core::channel::{tcp, ChannelState};
use duet_core::code::{PairingLink, PeerId};
use duet_core::config::Config;
use duet_core::file::{format_size, OutgoingFile};
use duet_core::protocol::Direction;
use duet_core::session::{Session, SessionEvent, SessionHandle};

use crate::ui::format_progress;

/// How an interactive session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The user asked to quit
    Quit,
    /// The channel closed or failed on the peer's side
    Disconnected(ChannelState),
}

/// A parsed line of user input.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Send(PathBuf),
    Cancel(Direction),
    Quit,
    Text(String),
    Empty,
    Invalid(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }

    let Some(rest) = line.strip_prefix('/') else {
        return Input::Text(line.to_string());
    };

    let (cmd, arg) = rest
        .split_once(char::is_whitespace)
        .map_or((rest, ""), |(c, a)| (c, a.trim()));

    match (cmd, arg) {
        ("send", "") => Input::Invalid("usage: /send <path>".to_string()),
        ("send", path) => Input::Send(PathBuf::from(path)),
        ("cancel", "up" | "upload") => Input::Cancel(Direction::Up),
        ("cancel", "down" | "download") => Input::Cancel(Direction::Down),
        ("cancel", _) => Input::Invalid("usage: /cancel up|down".to_string()),
        ("quit" | "exit", _) => Input::Quit,
        _ => Input::Invalid(format!("unknown command /{cmd}")),
    }
}

/// Drops progress updates that would repeat the last printed percent.
#[derive(Debug, Default)]
struct ProgressFilter {
    last: [Option<u8>; 2],
}

impl ProgressFilter {
    const fn slot(direction: Direction) -> usize {
        match direction {
            Direction::Up => 0,
            Direction::Down => 1,
        }
    }

    /// Forget the last percent, so a new transfer prints from the start.
    fn reset(&mut self, direction: Direction) {
        self.last[Self::slot(direction)] = None;
    }

    /// Whether a progress line at `percent` is worth printing.
    fn should_print(&mut self, direction: Direction, percent: u8) -> bool {
        let last = &mut self.last[Self::slot(direction)];
        if *last == Some(percent) {
            return false;
        }
        *last = Some(percent);
        true
    }
}

/// Stdin as a line stream that survives across sessions.
pub type Prompt = Lines<BufReader<Stdin>>;

/// Open stdin for interactive input.
pub fn prompt() -> Prompt {
    BufReader::new(tokio::io::stdin()).lines()
}

/// Pairing link other devices use to reach this process.
///
/// `pairing.base_url` wins over the detected LAN address.
pub fn local_link(config: &Config, port: u16, id: PeerId) -> PairingLink {
    let base = config.pairing.base_url.clone().unwrap_or_else(|| {
        let ip = tcp::local_ip().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        tcp::link_base(SocketAddr::new(ip, port))
    });
    PairingLink::new(base, id)
}

/// Print usage hints once a peer is connected.
pub fn print_help() {
    println!("  Type a message and press Enter to send it.");
    println!("  /send <path>      offer a file");
    println!("  /cancel up|down   abort a transfer");
    println!("  /quit             leave");
    println!();
}

/// Run `session` until it ends, forwarding stdin and printing events.
pub async fn run(
    session: Session,
    handle: SessionHandle,
    mut events: UnboundedReceiver<SessionEvent>,
    input: &mut Prompt,
    output_dir: &Path,
) -> Result<Outcome> {
    let task = tokio::spawn(session.run());
    let mut quit = false;
    let mut stdin_open = true;
    let mut progress = ProgressFilter::default();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                show_event(event, &mut progress, output_dir).await;
            }
            line = input.next_line(), if stdin_open => {
                let input = match line? {
                    Some(line) => parse_input(&line),
                    None => {
                        stdin_open = false;
                        Input::Quit
                    }
                };
                if input == Input::Quit {
                    quit = true;
                }
                apply_input(input, &handle).await;
            }
        }
    }

    let state = task.await?;
    tracing::debug!("Session ended in state {}", state);

    Ok(if quit {
        Outcome::Quit
    } else {
        Outcome::Disconnected(state)
    })
}

async fn apply_input(input: Input, handle: &SessionHandle) {
    let sent = match input {
        Input::Send(path) => match OutgoingFile::open(&path).await {
            Ok(file) => {
                let desc = file.descriptor();
                println!("  Offering {} ({})", desc.name, format_size(desc.size));
                handle.offer(file)
            }
            Err(e) => {
                eprintln!("  Cannot open {}: {}", path.display(), e);
                Ok(())
            }
        },
        Input::Cancel(direction) => handle.cancel(direction),
        Input::Text(body) => handle.send_text(body),
        Input::Quit => handle.close(),
        Input::Invalid(msg) => {
            eprintln!("  {}", msg);
            Ok(())
        }
        Input::Empty => Ok(()),
    };

    if let Err(e) = sent {
        tracing::debug!("Command not delivered: {}", e);
    }
}

async fn show_event(event: SessionEvent, progress: &mut ProgressFilter, output_dir: &Path) {
    match event {
        SessionEvent::StateChanged(state) => {
            tracing::debug!("Channel {}", state);
            if state == ChannelState::Open {
                println!("  Connected.");
                println!();
                print_help();
            } else if state.is_terminal() {
                println!("  Disconnected ({}).", state);
            }
        }
        SessionEvent::PairingAvailable(link) => {
            tracing::debug!("Pairing link available again: {}", link);
        }
        SessionEvent::TransferStarted { direction, file } => {
            progress.reset(direction);
            println!(
                "  Started {} of {} ({})",
                direction,
                file.name,
                format_size(file.size)
            );
        }
        SessionEvent::Progress(update) => {
            if progress.should_print(update.direction, update.percent) {
                println!("  {}", format_progress(&update));
            }
        }
        SessionEvent::Completed { direction, file } => {
            println!("  Finished {} of {}", direction, file.name);
        }
        SessionEvent::Cancelled { direction, file } => {
            println!("  Cancelled {} of {}", direction, file.name);
        }
        SessionEvent::Received(artifact) => match artifact.save_to(output_dir).await {
            Ok(path) => println!("  Saved {}", path.display()),
            Err(e) => eprintln!("  Failed to save {}: {}", artifact.file.name, e),
        },
        SessionEvent::Text(body) => println!("  peer> {}", body),
        SessionEvent::UploadAvailability(enabled) => {
            tracing::debug!("Uploads {}", if enabled { "enabled" } else { "disabled" });
        }
    }
}
