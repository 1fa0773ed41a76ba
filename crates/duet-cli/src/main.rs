//! Duet CLI - direct peer-to-peer file and message exchange
//!
//! One side listens and prints a pairing link, the other connects with it.
//! Once paired, both sides can send files and text in either direction.
//!
//! ## Quick Start
//!
//! ```bash
//! # Wait for a peer
//! duet listen
//!
//! # Connect from another machine with the printed link
//! duet connect "tcp://192.168.1.20:52610/?code=K7M2QX"
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

use anyhow::Result;
use clap::Parser;

mod commands;
pub mod ui;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match cli.command {
        Command::Listen(args) => commands::listen::run(args).await,
        Command::Connect(args) => commands::connect::run(args).await,
        Command::Config(args) => commands::config::run(args).await,
        Command::Completions(args) => commands::completions::run(args.shell),
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = if verbose {
        "warn,duet=debug,duet_core=debug"
    } else {
        "warn,duet=info,duet_core=info"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
