//! Publish history routes

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use libcrosspost::db::Database;
use libcrosspost::PostWithRecords;

use super::Caller;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Recorded history of one publish, visible only to its author
pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<PostWithRecords>> {
    let caller = Caller::from_headers(&headers)?;
    let db = history(&state)?;

    match db.get_post_with_records(&id).await? {
        Some(found) if found.post.user_id.as_deref() == Some(caller.user_id.as_str()) => {
            Ok(Json(found))
        }
        _ => Err(ApiError::NotFound(format!("post {} not found", id))),
    }
}

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 100;

fn history(state: &AppState) -> ApiResult<&Database> {
    state
        .history
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("post history is disabled".to_string()))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

/// The caller's most recent publishes, newest first
pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<PostWithRecords>>> {
    let caller = Caller::from_headers(&headers)?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let posts = history(&state)?.recent_posts(&caller.user_id, limit).await?;
    Ok(Json(posts))
}
