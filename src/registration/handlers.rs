use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::{info, instrument};

use crate::error::ServiceError;
use crate::state::AppState;

use super::dto::{RegisterRequest, UserResponse};
use super::extractors::BasicCredentials;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/activate", post(activate))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ServiceError> {
    info!(email = %payload.email, "registration attempt");
    let user = state
        .service
        .register(&payload.email, &payload.password)
        .await?;
    info!(user_id = %user.id, "user registered");
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, credentials))]
pub async fn activate(
    State(state): State<AppState>,
    credentials: BasicCredentials,
) -> Result<Json<UserResponse>, ServiceError> {
    info!(email = %credentials.username, "activation attempt");
    let user = state
        .service
        .activate(&credentials.username, &credentials.password)
        .await?;
    info!(user_id = %user.id, "user active");
    Ok(Json(user.into()))
}
