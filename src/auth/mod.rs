use crate::state::AppState;
use axum::Router;

mod claims;
pub mod dto;
pub(crate) mod extractors;
pub mod google;
pub mod handlers;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod user_agent;

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(handlers::public_routes())
        .merge(handlers::protected_routes(state))
        .merge(handlers::session_routes(state))
        .merge(google::google_routes())
}
