use clap::Parser;
use log::{error, info};
use server::{RefundPolicy, Server, ServerConfig};

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,
    /// Maximum number of players online at once
    #[clap(short, long, default_value = "64")]
    max_players: usize,
    /// Seed for world generation, random when omitted
    #[clap(short, long)]
    seed: Option<u64>,
    /// Resource nodes generated per resource type
    #[clap(long, default_value = "25")]
    nodes_per_type: usize,
    /// Largest unit count a single craft request may ask for
    #[clap(long, default_value = "100")]
    max_craft_amount: u32,
    /// What a cancelled crafting job gives back
    #[clap(long, value_enum, default_value = "proportional")]
    refund_policy: RefundPolicy,
    /// Seconds without a heartbeat before a player is dropped
    #[clap(long, default_value = "15")]
    heartbeat_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = ServerConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        max_players: args.max_players,
        world_seed: args.seed,
        nodes_per_type: args.nodes_per_type,
        max_craft_amount: args.max_craft_amount,
        refund_policy: args.refund_policy,
        heartbeat_timeout: std::time::Duration::from_secs(args.heartbeat_timeout),
        ..ServerConfig::default()
    };

    info!(
        "Starting server on {} (max {} players, {:?} refunds)",
        config.bind_addr, config.max_players, config.refund_policy
    );
    let server = Server::bind(config).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
