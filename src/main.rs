use actix_web::{web, App, HttpServer};
use anyhow::Context;
use chatgate_server::{configure, cors, AppState, Settings};
use dotenv::dotenv;
use std::net::TcpListener;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    let config = Settings::new().context("loading configuration")?;
    info!(environment = %config.environment, "Configuration loaded successfully");

    if config.llm.api_key.is_empty() {
        error!("llm.api_key is empty; chat requests will be rejected upstream");
    }
    if config.billing.webhook_secret.is_empty() {
        error!("billing.webhook_secret is empty; every webhook will be rejected");
    }

    let state = AppState::new(config.clone())
        .await
        .context("initialising application state")?;
    let state = web::Data::new(state);

    let maintenance_state = state.clone();
    let interval = Duration::from_secs(config.maintenance.interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = maintenance_state.run_maintenance().await {
                error!(error = %e, "Maintenance pass failed");
            }
        }
    });

    let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))
        .context("binding listener")?;
    info!("Starting server at {}:{}", config.server.host, config.server.port);

    let cors_config = config.cors.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(cors(&cors_config))
            .app_data(state.clone())
            .configure(configure)
    })
    .listen(listener)?
    .workers(config.server.workers as usize)
    .run()
    .await?;

    Ok(())
}
