//! thoughtmap_server: REST server for AI-generated mind maps
//!
//! Reads config from env vars (optionally from `.env`):
//!   DATABASE_URL     Postgres connection string
//!   GROQ_API_KEY     language model API key (required)
//!   AUTH_JWT_SECRET  HMAC secret for session tokens (required)
//!   WEBHOOK_SECRET   payment webhook signing secret (optional)
//!   BIND_ADDR        listen address (default: 0.0.0.0:3000)

use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use thoughtmap::ai::OpenAiCompatClient;
use thoughtmap::api::{create_router, AppState, JwtConfig};
use thoughtmap::billing::WebhookVerifier;
use thoughtmap::config::AppConfig;
use thoughtmap::orchestrator::ExpansionOrchestrator;
use thoughtmap::store::PgTreeStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "thoughtmap=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting thoughtmap server");

    let config = AppConfig::from_env().context("invalid configuration")?;

    let store = PgTreeStore::connect(&config.database)
        .await
        .context("failed to connect to database")?;
    store.migrate().await.context("failed to run migrations")?;

    let generator =
        OpenAiCompatClient::new(config.ai.clone()).context("failed to build model client")?;
    tracing::info!(
        "Using model {} at {}",
        config.ai.model,
        config.ai.base_url
    );

    let orchestrator = Arc::new(ExpansionOrchestrator::new(
        Arc::new(store),
        Arc::new(generator),
    ));

    let webhook = match config.webhook_secret.as_deref() {
        Some(secret) => {
            Some(WebhookVerifier::new(secret).context("WEBHOOK_SECRET is not valid base64")?)
        }
        None => {
            tracing::warn!("WEBHOOK_SECRET not set; payment webhook disabled");
            None
        }
    };

    let app = create_router(
        AppState::new(orchestrator, webhook),
        JwtConfig::from_secret(config.auth.jwt_secret.as_bytes()),
    );

    tracing::info!("Listening on {}", config.bind_addr);
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
