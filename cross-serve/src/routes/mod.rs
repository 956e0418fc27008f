//! Route table and shared request helpers

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderMap;
use axum::routing::{delete, get, post};
use axum::{extract::State, Json, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use libcrosspost::types::Identity;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub mod auth;
pub mod posts;
pub mod publish;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/publish",
            post(publish::publish).layer(DefaultBodyLimit::max(state.body_limit)),
        )
        .route("/auth/{platform}/start", get(auth::start))
        .route("/auth/{platform}/callback", get(auth::callback))
        .route("/auth/{platform}/status", get(auth::status))
        .route("/auth/{platform}", delete(auth::disconnect))
        .route("/posts", get(posts::list_posts))
        .route("/posts/{id}", get(posts::get_post))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "platforms": state.poster.platforms(),
    }))
}

/// The user a request acts for, taken from the identity headers
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
    pub email: Option<String>,
}

impl Caller {
    pub fn from_headers(headers: &HeaderMap) -> ApiResult<Self> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let user_id = header(USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {} header", USER_ID_HEADER)))?;

        Ok(Self {
            user_id,
            email: header(USER_EMAIL_HEADER),
        })
    }

    pub fn identity(&self) -> Identity {
        let identity = Identity::user(self.user_id.clone());
        match &self.email {
            Some(email) => identity.with_email(email.clone()),
            None => identity,
        }
    }
}
