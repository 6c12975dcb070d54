use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use log::{error, info};
use naval_duel::{init_logging, Server, ServerConfig, StarterPolicy};

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Starter {
    Creator,
    Joiner,
    Random,
}

impl From<Starter> for StarterPolicy {
    fn from(s: Starter) -> Self {
        match s {
            Starter::Creator => StarterPolicy::Creator,
            Starter::Joiner => StarterPolicy::Joiner,
            Starter::Random => StarterPolicy::Random,
        }
    }
}

/// Two-player naval combat match server.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(long, default_value = "127.0.0.1:5000")]
    bind: String,
    /// Directory holding users.json and archived matches.
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,
    /// Seconds a creator waits for a rival before the match is withdrawn.
    #[arg(long, default_value_t = 300)]
    wait_timeout: u64,
    /// Seconds of silence before a connection is dropped.
    #[arg(long, default_value_t = 1800)]
    idle_timeout: u64,
    #[arg(long, default_value_t = 3)]
    max_auth_attempts: u32,
    #[arg(long, value_enum, default_value_t = Starter::Creator)]
    starter: Starter,
}

impl Cli {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            bind: self.bind,
            data_dir: self.data_dir,
            wait_timeout: Duration::from_secs(self.wait_timeout),
            idle_timeout: Duration::from_secs(self.idle_timeout),
            max_auth_attempts: self.max_auth_attempts,
            starter: self.starter.into(),
            ..ServerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let config = Cli::parse().into_config();
    info!("Data directory: {}", config.data_dir.display());

    let server = Server::from_config(config).await?;
    info!("Accepting clients on {}", server.local_addr()?);

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }
    Ok(())
}
