use std::time::Duration;

mod app;
mod auth;
mod config;
mod error;
mod mailer;
#[cfg(test)]
mod memory;
mod sessions;
mod state;
mod users;

use crate::sessions::service::spawn_expiry_sweeper;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "storefront_auth=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let state = AppState::init().await?;

    let _sweeper = spawn_expiry_sweeper(
        state.sessions.clone(),
        Duration::from_secs(state.config.session_sweep_interval_secs),
    );

    app::serve(app::build_app(state)).await
}
