use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "starling",
    version,
    about = "Chat-channel gateway and autonomous cron scheduler for long-running AI agents"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the gateway daemon (cron scheduler + host bridges).
    Run,
    /// Resolve the session route for a channel/account/peer tuple.
    Resolve {
        /// Channel name (telegram, discord, matrix, ...).
        channel: String,
        /// Peer id as reported by the channel adapter.
        peer_id: String,
        /// Peer kind: dm, channel, or group.
        #[arg(long, default_value = "dm")]
        kind: String,
        /// Bot account id; omit for single-account deployments.
        #[arg(long, default_value = "default")]
        account: String,
    },
    /// Manage autonomous cron jobs.
    Cron {
        #[command(subcommand)]
        command: CronCommands,
    },
}

#[derive(Debug, Subcommand)]
pub enum CronCommands {
    /// List scheduled jobs.
    List {
        /// Include disabled jobs.
        #[arg(long)]
        all: bool,
    },
    /// Schedule a new job.
    Add {
        #[arg(long)]
        name: Option<String>,
        /// One-shot: absolute epoch time in milliseconds.
        #[arg(long = "at-ms", conflicts_with = "every_ms")]
        at_ms: Option<i64>,
        /// Repeating: recurrence interval in milliseconds.
        #[arg(long = "every-ms")]
        every_ms: Option<i64>,
        /// Session target: main or isolated.
        #[arg(long, default_value = "main")]
        target: String,
        /// Wake mode: now or next-heartbeat.
        #[arg(long, default_value = "now")]
        wake: String,
        /// System event text (main jobs).
        #[arg(long)]
        text: Option<String>,
        /// Agent turn message (isolated jobs).
        #[arg(long)]
        message: Option<String>,
        /// Deliver the isolated turn's reply to the peer.
        #[arg(long)]
        deliver: bool,
    },
    /// Remove a job by id.
    Remove { id: String },
    /// Show scheduler status.
    Status,
}
