//! CLI command definitions and handlers.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Load configuration with graceful fallback to defaults.
///
/// If the config file doesn't exist or can't be parsed, it falls back to defaults.
pub fn load_config() -> duet_core::config::Config {
    duet_core::config::Config::load().unwrap_or_default()
}

pub mod completions;
pub mod config;
pub mod connect;
pub mod interactive;
pub mod listen;

/// Duet - direct peer-to-peer file and message exchange
#[derive(Parser)]
#[command(name = "duet")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Show debug logs
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Wait for a peer and print a pairing link
    Listen(ListenArgs),

    /// Connect to a peer using its pairing link
    Connect(ConnectArgs),

    /// Manage configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments for the listen command
#[derive(Parser)]
pub struct ListenArgs {
    /// TCP port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,

    /// Directory for received files
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Don't print a QR code of the pairing link
    #[arg(long)]
    pub no_qr: bool,
}

/// Arguments for the connect command
#[derive(Parser)]
pub struct ConnectArgs {
    /// Pairing link (tcp://HOST:PORT/?code=XXXXXX) or HOST[:PORT]
    pub target: String,

    /// Peer code, required when TARGET is a bare address
    #[arg(short, long)]
    pub code: Option<String>,

    /// Directory for received files
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for config command
#[derive(Parser)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a configuration value
    Get {
        /// Configuration key (e.g. transfer.chunk_size)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,

        /// Value to set
        value: String,
    },

    /// Show the full configuration
    Show,

    /// List the known configuration keys
    List,

    /// Print the configuration file path
    Path,

    /// Reset the configuration to defaults
    Reset,
}

/// Arguments for completions command
#[derive(Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: ShellType,
}

/// Supported shells for completions
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ShellType {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    #[value(name = "powershell")]
    PowerShell,
    /// Elvish shell
    Elvish,
}
