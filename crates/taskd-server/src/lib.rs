pub mod rest;
pub mod state;

use std::sync::Arc;

use taskd_engine::{EngineConfig, TodoEngine};

use crate::state::AppState;

pub struct ServerConfig {
    pub bind_host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    pub engine_config: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: "127.0.0.1".into(),
            port: 8080,
            cors_allowed_origins: vec!["http://localhost:3010".into()],
            engine_config: EngineConfig::default(),
        }
    }
}

/// Start the REST server.
pub async fn start_server(
    config: ServerConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,taskd_server=debug,taskd_engine=debug".parse().unwrap()),
        )
        .init();

    let engine = TodoEngine::init(config.engine_config)?;
    let state = Arc::new(AppState::new(Arc::new(engine)));
    let app = rest::create_router_with_cors(state, &config.cors_allowed_origins);

    let listener =
        tokio::net::TcpListener::bind(format!("{}:{}", config.bind_host, config.port)).await?;
    tracing::info!("REST listening on http://{}:{}", config.bind_host, config.port);
    axum::serve(listener, app).await?;

    Ok(())
}
