use tracing_subscriber::{EnvFilter, fmt};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let config = signalhub::config::Config::from_env()?;
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "signalhub",
        "signalhub starting: RUST_LOG='{}', bind={}, http_port={}, session_ttl_secs={}, bootstrap_user={}",
        rust_log, config.bind, config.http_port, config.session_ttl.as_secs(), config.bootstrap.is_some()
    );

    signalhub::server::run(config).await
}
