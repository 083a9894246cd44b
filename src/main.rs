//! LearnOmatic - programming learning assistant API
//!
//! Chat with an LLM about code, explain topics, document and review code or
//! whole project folders, and keep the results worth keeping. Code blocks in
//! replies are extracted and can be "run" through a simulated console.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod completion;
mod config;
mod conversation;
mod core;
mod credentials;
mod routes;
mod snippets;

use completion::OpenAICompatClient;
use config::Config;
use core::{ProjectLimits, ResultStore, Session};
use credentials::EnvPrompt;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Mutex<Session>>,
    pub results: Arc<ResultStore>,
    pub project_limits: ProjectLimits,
    pub simulate_delay: Duration,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "learnomatic=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    let results = Arc::new(
        ResultStore::new(&config.server.data_dir.join("learnomatic.db"))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open results store: {}", e))?,
    );

    let client = OpenAICompatClient::new(config.llm.clone())?;
    tracing::info!(
        "Completion endpoint {} (model {})",
        client.endpoint(),
        client.config().model
    );

    let session = Session::new(
        Arc::new(client),
        Box::new(EnvPrompt::new(config.session.api_key_env.clone())),
        config.session.clone(),
    );

    let state = AppState {
        session: Arc::new(Mutex::new(session)),
        results,
        project_limits: config.project.clone(),
        simulate_delay: Duration::from_millis(config.session.simulate_delay_ms),
    };

    let app = Router::new()
        .merge(routes::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("LearnOmatic API running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
