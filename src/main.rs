use anyhow::Result;
use tracing::{error, info};

use ipscmatch_scanner::{build_router, config::Config, scheduler, server, store::Store, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = Config::from_env();
    info!("scan source: {}", config.scan_url);
    info!("scan interval: every {} minutes", config.scan_interval_minutes);
    info!("data file: {}", config.data_file.display());

    let port = config.port;
    let store = Store::new(config.data_file.clone());
    let state = AppState::new(config, store);

    // First boot of a fresh store gets an immediate scan.
    match state.store.read() {
        Ok(data) if data.last_scan.is_none() => match server::run_scan(&state).await {
            Ok(outcome) => info!("initial scan stored {} matches", outcome.count.unwrap_or(0)),
            Err(err) => error!("initial scan failed: {err:#}"),
        },
        Ok(_) => {}
        Err(err) => error!("store read failed: {err}"),
    }

    tokio::spawn(scheduler::run(state.clone()));

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("ipscmatch-scanner listening on http://localhost:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
