mod config;

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use pinchat_api::chats::ChatCoordinator;
use pinchat_api::identity::IdentityService;
use pinchat_api::mailer::{Mailer, WebhookMailer};
use pinchat_api::messages::MessageService;
use pinchat_api::password::Argon2Credentials;
use pinchat_api::store::Store;
use pinchat_api::token::TokenIssuer;
use pinchat_api::{AppState, AppStateInner};
use pinchat_db::{Database, MemoryStore};

use crate::config::{Config, Environment, StorageBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pinchat=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    if config.environment == Environment::Development {
        warn!("Running in development mode; do not expose this instance");
    }

    let store: Store = match &config.storage {
        StorageBackend::Sqlite(path) => {
            info!("Using SQLite storage at {}", path.display());
            Arc::new(Database::open(path)?)
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage; all data is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let mailer = match config.mailer {
        Some(m) => {
            info!("Verification notices go to {}", m.url);
            Mailer::Webhook(WebhookMailer::new(m.url, m.api_key, m.from)?)
        }
        None => Mailer::Console,
    };

    let tokens = TokenIssuer::new(&config.jwt_secret);
    let identity = IdentityService::new(
        store.clone(),
        Arc::new(Argon2Credentials::default()),
        tokens.clone(),
        mailer,
    );

    let state: AppState = Arc::new(AppStateInner {
        identity,
        chats: ChatCoordinator::new(store.clone()),
        messages: MessageService::new(store),
        tokens,
    });

    let app = pinchat_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("PinChat server listening on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
