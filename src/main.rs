use tracing::info;
use tracing_subscriber::EnvFilter;

use vhostd::{Config, Server, ServerResult};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ServerResult<()> {
    init_logging();

    let config = Config::from_env();
    info!(
        "serving {} (default page '{}') on {}",
        config.document_root, config.default_page, config.listen_addr
    );
    if !config.logfile_root.is_empty() {
        info!("writing access logs under {}", config.logfile_root);
    }

    Server::new(config).run().await
}
