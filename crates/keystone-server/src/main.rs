use clap::Parser;
use keystone_server::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();
    let _telemetry = config.telemetry_config().init()?;
    keystone_auth::init_auth_metrics();

    tracing::info!(
        environment = %config.environment,
        bind = %config.bind_addr(),
        "Starting keystone server"
    );

    if let Err(e) = keystone_server::run(config).await {
        tracing::error!(error = %format!("{e:#}"), "Keystone server failed");
        return Err(e);
    }
    Ok(())
}
