//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "msgcenter",
    version,
    about = "Keep a local copy of your message-center inbox in sync",
    disable_help_subcommand = true
)]
pub struct Cli {
    /// Configuration file (default: <config dir>/msgcenter/config.json)
    #[arg(long, global = true, env = "MSGCENTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database file (default: <data dir>/msgcenter/msgcenter.db)
    #[arg(long, global = true, env = "MSGCENTER_DB")]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Bind a user and device channel, then sync
    Login {
        /// Mailbox user ID
        #[arg(long)]
        user: String,

        /// Device channel ID
        #[arg(long)]
        channel: String,

        /// Mailbox service URL; saved to the configuration file
        #[arg(long)]
        base_url: Option<String>,

        /// Password (otherwise taken from the system keyring)
        #[arg(long, env = "MSGCENTER_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Forget the bound user and clear the local inbox
    Logout,

    /// Sync the inbox with the service
    Sync {
        /// Retry transient failures with backoff
        #[arg(long)]
        retry: bool,
    },

    /// Show the cached inbox
    List {
        /// Include deleted and expired messages
        #[arg(long)]
        all: bool,
    },

    /// Mark a message as read
    Read {
        /// Message ID
        id: String,
    },

    /// Delete a message
    Delete {
        /// Message ID
        id: String,
    },
}
