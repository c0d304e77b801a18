use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt};

use smart_auth_gateway::config::Config;
use smart_auth_gateway::session::dynamodb::DynamoDbStore;
use smart_auth_gateway::session::memory::InMemoryStore;
use smart_auth_gateway::session::middleware::SessionLayer;
use smart_auth_gateway::session::{AnyStore, SessionManager};
use smart_auth_gateway::{AppState, create_app};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().expect("Failed to load configuration");

    // Session store: DynamoDB for production, InMemory for dev
    let store: AnyStore = if config.session_backend == "dynamodb" {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let dynamo_client = if config.dynamodb_endpoint.is_empty() {
            aws_sdk_dynamodb::Client::new(&sdk_config)
        } else {
            let dynamo_config = aws_sdk_dynamodb::config::Builder::from(&sdk_config)
                .endpoint_url(&config.dynamodb_endpoint)
                .build();
            aws_sdk_dynamodb::Client::from_conf(dynamo_config)
        };
        tracing::info!(
            "Using DynamoDB session store (table: {})",
            config.dynamodb_table
        );
        AnyStore::DynamoDb(DynamoDbStore::new(
            dynamo_client,
            config.dynamodb_table.clone(),
            Duration::from_millis(config.store_timeout_ms),
        ))
    } else {
        tracing::warn!("Using in-memory session store; sessions are not shared across workers");
        AnyStore::Memory(InMemoryStore::new())
    };

    let manager = SessionManager::new(
        Arc::new(store),
        config.session_ttl_secs,
        config.sliding_expiry,
    );
    let session_layer = Arc::new(SessionLayer {
        manager,
        secret: config.session_secret.clone(),
        https_only: config.session_https_only,
        cookie_domain: config.cookie_domain.clone(),
    });

    let state = Arc::new(AppState {
        config: config.clone(),
        session_layer,
    });

    let app = create_app(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");
    axum::serve(listener, app).await.expect("Server error");
}
