use axum::Router;

use crate::state::AppState;

mod code;
mod dto;
mod extractors;
pub mod handlers;
mod password;
pub mod repo;
pub mod repo_types;
pub mod service;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
