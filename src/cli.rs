// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Global flags override values from the config file.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "beach")]
#[command(about = "Collect SSH credentials and open interactive remote shells")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (default: ~/.config/beach/config.yml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Credential store file (default: ~/.beach-shells.json)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// Password key file (default: ~/.beach.key)
    #[arg(long, global = true)]
    pub key_file: Option<PathBuf>,

    /// SSH port
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// Emit JSON lines instead of plain text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show collected shells and connect interactively (default)
    Menu,

    /// List collected shells
    List,

    /// Connect to username@hostname, asking for a password if it is new
    Connect {
        /// Target in username@hostname form
        target: String,
    },
}
