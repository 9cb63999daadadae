use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod care;
mod config;
mod consult;
mod dispatch;
mod error;
mod llm;
mod messenger;
mod middleware;
mod routes;
mod sessions;
mod state;
mod store;

use crate::store::ProfileStore;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "ondam bot",
        version = "0.1.0",
        description = "Conversational intake and advisory bot for the ondam self-care service: constitution diagnosis, weekly check-ins, AI consults."
    ),
    paths(
        routes::health::health_check,
        routes::webhook::receive_events,
        routes::billing::billing_webhook,
    ),
    components(schemas(
        HealthResponse,
        ondam_core::error::ApiError,
        routes::billing::BillingEvent,
        routes::billing::BillingData,
    ))
)]
struct ApiDoc;

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// In-flight diagnosis conversations (volatile, this process only)
    pub diagnosis_sessions: usize,
    /// In-flight follow-up conversations (volatile, this process only)
    pub followup_sessions: usize,
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ondam_bot=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = config::Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let store: Arc<dyn ProfileStore> = Arc::new(store::PgStore::new(pool.clone()));
    let llm = Arc::new(llm::CompletionClient::new(
        config.llm_api_base.clone(),
        config.llm_api_key.clone(),
        config.llm_model.clone(),
    ));
    let bot = Arc::new(dispatch::Dispatcher::new(store.clone(), llm));
    let messenger = Arc::new(messenger::Messenger::new(
        config.messenger_api_base.clone(),
        config.messenger_access_token.clone(),
    ));

    let app_state = state::AppState {
        db: pool,
        bot,
        store,
        messenger,
        channel_secret: config.messenger_channel_secret.clone(),
        billing_secret: config.billing_webhook_secret.clone(),
    };

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::webhook::router().layer(middleware::rate_limit::webhook_layer()))
        .merge(routes::billing::router().layer(middleware::rate_limit::billing_layer()))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("ondam bot listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}
