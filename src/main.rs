#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

use anyhow::Result;
use clap::Parser;
use starling::cli::{Cli, Commands};
use starling::config::Config;
use starling::routing::{Peer, PeerKind, RouteRequest, resolve_agent_route};
use starling::{cron, daemon};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_init()?;

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.logging.tracing_level())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    match cli.command {
        Commands::Run => daemon::run(config).await,
        Commands::Resolve {
            channel,
            peer_id,
            kind,
            account,
        } => {
            let kind: PeerKind = kind
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid --kind: {kind} (expected dm|channel|group)"))?;
            let route = resolve_agent_route(
                &config,
                &RouteRequest {
                    channel: &channel,
                    account_id: &account,
                    peer: Peer::new(kind, peer_id),
                },
            );
            println!("agent      : {}", route.agent_id);
            println!("session    : {}", route.session_key);
            println!("main       : {}", route.main_session_key);
            Ok(())
        }
        Commands::Cron { command } => cron::handle_command(command, &config),
    }
}
