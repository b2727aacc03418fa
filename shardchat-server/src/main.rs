use anyhow::Result;
use clap::Parser;
use shardchat_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use shardchat_core::Config;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "shardchat-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on (overrides SHARDCHAT_SERVER_BIND_ADDRESS)
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Base directory for persistent storage (overrides SHARDCHAT_STORE_DATA_DIR)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = LogLevel::from_str(&args.log_level).unwrap_or_else(|| {
        eprintln!("Invalid log level '{}', using 'info'", args.log_level);
        LogLevel::Info
    });
    init_logging_with_config(LogConfig::new(log_level).json_format(args.json_logs))?;

    let mut config = Config::from_env()?;
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    if let Some(data_dir) = args.data_dir {
        config.store.data_dir = data_dir;
    }

    info!(
        addr = %config.server.bind_address,
        data_dir = %config.store.data_dir.display(),
        "starting shardchat server"
    );
    shardchat_server::run(config).await
}
