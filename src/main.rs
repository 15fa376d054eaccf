//! HelpDocs Chat
//!
//! A chat front-end that answers questions by calling a table-valued
//! answering function in the data warehouse.

mod api;
mod config;
mod dispatcher;
mod session;
mod state_machine;
mod warehouse;

use api::{create_router, AppState, ConnectionStatus, CONNECTION_ADVICE};
use config::{ServerConfig, WarehouseConfig};
use dispatcher::{
    AnswerClient, DispatchSettings, SessionManager, UnavailableClient, WarehouseAnswerClient,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use warehouse::{check_connection, LoggingService, SnowflakeService, WarehouseService};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "helpdocs_chat=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let server_config = ServerConfig::from_env()?;
    tracing::info!(
        port = server_config.port,
        function = %server_config.default_function,
        idle_timeout_secs = server_config.session_idle_timeout.as_secs(),
        "Server configuration loaded"
    );

    let (client, connection) = connect_warehouse().await;

    let sessions = SessionManager::new(
        client,
        DispatchSettings {
            default_function: server_config.default_function,
            fallback_answer: server_config.fallback_answer.clone(),
        },
    );
    let state = AppState::new(sessions, connection);
    state.sessions.spawn_reaper(server_config.session_idle_timeout);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(compression);

    let addr = SocketAddr::from(([0, 0, 0, 0], server_config.port));
    tracing::info!("HelpDocs Chat listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Build the warehouse client and run the startup check. A failure leaves the
/// server up with a standing warning instead of exiting.
async fn connect_warehouse() -> (Arc<dyn AnswerClient>, ConnectionStatus) {
    let config = match WarehouseConfig::from_env() {
        Ok(config) => config,
        Err(e) => return unavailable(e.to_string()),
    };
    tracing::info!(config = ?config, "Connecting to warehouse");

    let service = match SnowflakeService::new(config) {
        Ok(service) => service,
        Err(e) => return unavailable(e.message),
    };
    let warehouse: Arc<dyn WarehouseService> = Arc::new(LoggingService::new(Arc::new(service)));

    match check_connection(warehouse.as_ref()).await {
        Ok(()) => {
            tracing::info!(warehouse = %warehouse.name(), "Warehouse connection established");
            (
                Arc::new(WarehouseAnswerClient::new(warehouse)),
                ConnectionStatus::Connected,
            )
        }
        Err(e) => unavailable(e.message),
    }
}

fn unavailable(reason: String) -> (Arc<dyn AnswerClient>, ConnectionStatus) {
    tracing::error!(reason = %reason, "Failed to connect to Snowflake");
    tracing::warn!("{CONNECTION_ADVICE}");
    (
        Arc::new(UnavailableClient::new(reason.clone())),
        ConnectionStatus::Unavailable(reason),
    )
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
