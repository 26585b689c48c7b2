//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// State file, overriding the configured one
    #[arg(short, long)]
    pub state: Option<PathBuf>,

    /// Passphrase for the state file; empty means unprotected
    #[arg(long, env = "POSTERN_PASSPHRASE", default_value = "", hide_env_values = true)]
    pub passphrase: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new account and its state file
    Init {
        /// Delivery server address (postern://<server key>@host[:port])
        #[arg(long)]
        server: String,
    },
    /// Show the local identity
    Identity,
    /// List contacts
    Contacts,
    /// Create a pending contact and print our key exchange for it
    AddContact { name: String },
    /// Print the key exchange of a pending contact again
    ShowKx { name: String },
    /// Apply the key exchange received from a contact
    CompleteContact {
        name: String,
        /// Read the key exchange from a file instead of stdin
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Compose and queue a message
    Compose {
        name: String,
        body: String,
        /// Attach a file (repeatable)
        #[arg(short, long)]
        attach: Vec<PathBuf>,
        /// Inbound message id this replies to
        #[arg(short, long)]
        reply: Option<String>,
    },
    /// Report how much of the size limit a draft would use
    Usage {
        body: String,
        #[arg(short, long)]
        attach: Vec<PathBuf>,
        /// Count the draft as a reply
        #[arg(long)]
        reply: bool,
    },
    /// List inbound messages
    Inbox,
    /// List outbound messages
    Outbox,
    /// Show an inbound message and mark it read
    Open { id: String },
    /// Acknowledge an inbound message
    Ack { id: String },
    /// Remove inbound messages past their erase time
    Purge,
    /// Ask the network to transmit now
    Fetch,
}
