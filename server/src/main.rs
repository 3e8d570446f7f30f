use clap::Parser;
use log::{error, info};
use server::config::{log_target, NameBackend, ServerConfig, DEFAULT_DB_PATH};
use server::network::LobbyServer;
use shared::{DEFAULT_HOST, DEFAULT_PORT};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Realtime multiplayer lobby server", long_about = None)]
struct Args {
    /// Host to bind to
    #[arg(short = 'H', long, default_value = DEFAULT_HOST)]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Lowest severity to log (error, warn, info, debug, trace); RUST_LOG overrides
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Append log output to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// SQLite database holding display names
    #[arg(long, default_value = DEFAULT_DB_PATH)]
    db_path: PathBuf,

    /// Keep display names in memory only
    #[arg(long)]
    ephemeral: bool,

    /// Milliseconds to wait when queueing an event for one client
    #[arg(long, default_value_t = 2000)]
    send_timeout_ms: u64,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        let names = if self.ephemeral {
            NameBackend::Memory
        } else {
            NameBackend::Sqlite(self.db_path.clone())
        };

        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            send_timeout: Duration::from_millis(self.send_timeout_ms),
            names,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .format_timestamp_secs()
        .target(log_target(args.log_file.as_deref())?)
        .init();

    let config = args.server_config();
    let names = config.names.open()?;
    let server = LobbyServer::bind(&config, names).await?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down gracefully...");
    };

    if let Err(e) = server.run_until(shutdown).await {
        error!("unhandled fatal error, server shutting down: {}", e);
        return Err(e.into());
    }

    Ok(())
}
