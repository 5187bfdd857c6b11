use axum::extract::DefaultBodyLimit;
use http::HeaderValue;
use std::{env, sync::Arc};
use tokio::net::TcpListener;
use tower_http::{cors::{Any, CorsLayer}, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod accounts;
mod auth;
mod config;
mod courses;
mod db;
mod enrollments;
mod error;
mod ids;
mod models;
mod rating;
mod resolver;
mod reviews;
mod routes;
mod state;
mod store;

use crate::{auth::AuthConfig, config::Config, state::AppState, store::Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "learnhub=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Config::from_env()?;

    let store: Arc<dyn Store> = match &cfg.database_url {
        Some(url) => {
            let pool = db::connect(url, &cfg).await?;
            tracing::info!("connected to postgres");
            Arc::new(store::PgStore::new(pool, cfg.store_timeout))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store; data is lost on exit");
            Arc::new(store::MemoryStore::new())
        }
    };

    if let (Some(email), Some(password)) = (&cfg.admin_email, &cfg.admin_password) {
        accounts::ensure_admin(store.as_ref(), email, password, "Admin")
            .await
            .map_err(|e| anyhow::anyhow!("admin bootstrap failed: {e}"))?;
    }

    let cors = if cfg.cors_origins.is_empty() {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins = cfg
            .cors_origins
            .iter()
            .map(|o| o.parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()?;
        CorsLayer::new().allow_origin(origins)
    }
    .allow_methods(Any)
    .allow_headers(Any);

    let state = AppState::new(store, AuthConfig::from_config(&cfg));
    let app = routes::router(state)
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = format!("0.0.0.0:{}", cfg.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
