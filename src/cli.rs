use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "remindbot", about = "Natural-language reminder scheduler for a team chat service")]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, global = true, default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate the configuration file
    Validate,

    /// Parse and schedule one reminder payload, printing the acknowledgement
    Schedule {
        /// Team the reminder belongs to
        #[arg(long)]
        team: String,

        /// Requesting user id
        #[arg(long)]
        user: String,

        /// Raw payload, e.g. 'me "buy milk" in 10 minutes'
        payload: String,
    },

    /// List a user's reminders
    List {
        /// User id
        #[arg(long)]
        user: String,
    },

    /// Delete all of a user's reminders
    Clear {
        /// User id
        #[arg(long)]
        user: String,
    },
}
