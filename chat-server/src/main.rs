use clap::Parser;
use tracing_subscriber::EnvFilter;

use chat_server::config::Config;
use chat_server::server::Server;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("CHAT_SERVER_LOG_JSON").is_ok() {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let config = Config::parse();
    let threads = config.threads.max(1);

    tracing::info!(threads, address = %config.address, port = config.port, "starting chat-server");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(threads)
        .enable_all()
        .build()?;

    runtime.block_on(async { Server::new(config)?.run().await })
}
