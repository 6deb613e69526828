pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod service;

use crate::state::AppState;
use axum::Router;

pub fn router(state: &AppState) -> Router<AppState> {
    handlers::session_routes(state)
}
