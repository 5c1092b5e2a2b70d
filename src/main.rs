//! Modelrelay HTTP server
//!
//! Starts an Axum web server exposing the orchestrator's two operations
//! plus health and metrics endpoints.

use axum::{
    Router, middleware,
    routing::{get, post},
};
use clap::Parser;
use modelrelay::{
    cli::{Cli, Command},
    config::Config,
    handlers::{self, AppState},
    middleware::request_id_middleware,
    telemetry,
};
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Command::Config { output }) = cli.command {
        let template = modelrelay::cli::generate_config_template();
        match output {
            Some(path) => {
                std::fs::write(&path, template)?;
                println!("Wrote configuration template to {path}");
            }
            None => print!("{template}"),
        }
        return Ok(());
    }

    // Load configuration
    let config = Config::from_file(&cli.config)?;

    // Initialize telemetry
    telemetry::init(&config.observability.log_level);

    tracing::info!(
        "Starting modelrelay server on {}:{}",
        config.server.host,
        config.server.port
    );

    let addr = SocketAddr::from((
        config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .unwrap_or_else(|_| std::net::IpAddr::from([0, 0, 0, 0])),
        config.server.port,
    ));

    // Build application state (resolves the provider credential)
    let state = AppState::new(config)?;

    tracing::info!(
        primary_model = %state.orchestrator().roster().primary(),
        roster_size = state.orchestrator().roster().len(),
        "Model roster loaded"
    );

    // Build router
    let app = Router::new()
        .route("/health", get(handlers::health::handler))
        .route("/metrics", get(handlers::metrics::handler))
        .route("/api/complete", post(handlers::complete::handler))
        .route("/api/stream", post(handlers::stream::handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(request_id_middleware)),
        )
        .with_state(state);

    tracing::info!("Listening on {}", addr);
    tracing::info!("Health check available at http://{}/health", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
