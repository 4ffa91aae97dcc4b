mod circuit_breaker;
mod config;
mod detector;
mod dispatcher;
mod errors;
mod handlers;
mod models;
mod upstream;
mod validator;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer, cors::CorsLayer, limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::dispatcher::QueryService;
use crate::upstream::ConectaClient;

/// Main entry point for the application.
///
/// Initializes logging, loads configuration, constructs the upstream
/// client and the parameterized query service, then serves the HTTP API.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing; DEBUG=true widens the default filter.
    let default_filter = if std::env::var("DEBUG")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
    {
        "rust_consulta_api=debug,tower_http=debug"
    } else {
        "rust_consulta_api=info,tower_http=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    // Initialize the Conecta upstream client (token + GraphQL)
    let client = ConectaClient::new(&config)
        .map_err(|e| anyhow::anyhow!("Failed to initialize Conecta client: {}", e))?;
    tracing::info!("Conecta client initialized: {}", config.conecta_auth_url);

    // One service instance shared by every endpoint, configured with the
    // deployment's capability set and plate policy.
    let service = Arc::new(QueryService::new(
        client,
        config.plate_policy,
        config.capabilities,
    ));
    tracing::info!(
        "Query service ready (capabilities: {}, plate policy: {})",
        config.capabilities,
        config.plate_policy.as_str()
    );

    let app_state = Arc::new(handlers::AppState {
        config: config.clone(),
        service,
    });

    let app = Router::new()
        .route(
            "/api/v1/clientes/consultar",
            post(handlers::consultar_unificado).get(handlers::consultar_unificado_get),
        )
        .route(
            "/api/v1/vehiculos/consultar",
            post(handlers::consultar_placa),
        )
        .route("/api/v1/health", get(handlers::health))
        .route("/api/v1/info", get(handlers::api_info))
        .route("/", get(handlers::root))
        .fallback(handlers::not_found)
        .with_state(app_state)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(handlers::method_not_allowed_envelope))
                // Request size limit: 1MB max payload (query payloads are tiny)
                .layer(RequestBodyLimitLayer::new(1024 * 1024)),
        )
        .layer(CatchPanicLayer::custom(handlers::handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
