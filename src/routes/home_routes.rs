use axum::{Json, Router, routing::get};

use crate::models::AppState;

#[derive(serde::Serialize)]
pub struct HomeResponse {
    pub data: HomeData,
}

#[derive(serde::Serialize)]
pub struct HomeData {
    pub message: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(home))
}

// Unauthenticated welcome payload, mostly useful as a liveness probe.
pub async fn home() -> Json<HomeResponse> {
    Json(HomeResponse {
        data: HomeData {
            message: "Welcome to the medsched API".to_string(),
        },
    })
}
