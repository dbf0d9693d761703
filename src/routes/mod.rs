use crate::models::AppState;
use axum::Router;

pub mod auth_routes;
pub mod consult_routes;
pub mod home_routes;
pub mod user_routes;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1/auth", auth_routes::router())
        .nest("/api/v1/users", user_routes::router())
        .nest("/api/v1/consults", consult_routes::router())
        .merge(home_routes::router())
        .with_state(state)
}
