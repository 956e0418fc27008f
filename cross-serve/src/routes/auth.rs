//! OAuth connect, status and disconnect routes

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use libcrosspost::oauth::{OAuthClient, PendingAuth};
use libcrosspost::platforms::PlatformAdapter;
use libcrosspost::types::PlatformId;
use libcrosspost::PlatformError;

use super::Caller;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

fn platform_id(raw: &str) -> ApiResult<PlatformId> {
    Ok(raw.parse::<PlatformId>()?)
}

fn oauth_client(state: &AppState, id: PlatformId) -> ApiResult<Arc<OAuthClient>> {
    state
        .oauth
        .get(&id)
        .cloned()
        .ok_or_else(|| ApiError::NotFound(format!("{} is not configured", id)))
}

fn adapter(state: &AppState, id: PlatformId) -> ApiResult<Arc<dyn PlatformAdapter>> {
    state
        .poster
        .adapter(id.as_str())
        .ok_or_else(|| ApiError::NotFound(format!("{} is not configured", id)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStart {
    pub authorization_url: String,
    pub state: String,
}

/// `GET /auth/{platform}/start`
pub async fn start(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<AuthStart>> {
    let caller = Caller::from_headers(&headers)?;
    let id = platform_id(&platform)?;
    let client = oauth_client(&state, id)?;

    let pending = PendingAuth::new(caller.user_id, caller.email, id);
    let verifier = pending.code_verifier.clone();
    let oauth_state = state.pending.insert(pending);

    let authorization_url = client.authorization_url(&oauth_state, &verifier)?;
    tracing::info!(platform = %id, "Authorization started");

    Ok(Json(AuthStart {
        authorization_url,
        state: oauth_state,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connected {
    pub success: bool,
    pub platform: String,
    pub account_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
}

/// `GET /auth/{platform}/callback?code&state`
pub async fn callback(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> ApiResult<Json<Connected>> {
    let id = platform_id(&platform)?;

    if let Some(error) = query.error {
        let description = query.error_description.unwrap_or_default();
        return Err(ApiError::BadRequest(format!(
            "authorization denied: {} {}",
            error, description
        )));
    }

    let (Some(code), Some(oauth_state)) = (query.code, query.state) else {
        return Err(ApiError::BadRequest(
            "callback requires code and state".to_string(),
        ));
    };

    let pending = state
        .pending
        .take(&oauth_state)
        .ok_or_else(|| ApiError::BadRequest("unknown or expired state".to_string()))?;
    if pending.platform != id {
        return Err(ApiError::BadRequest(format!(
            "state was issued for {}, not {}",
            pending.platform, id
        )));
    }

    let client = oauth_client(&state, id)?;
    let secrets = client.exchange_code(&code, &pending.code_verifier).await?;

    let credential = adapter(&state, id)?
        .connect(&pending.user_id, pending.email.as_deref(), secrets)
        .await?;

    Ok(Json(Connected {
        success: true,
        platform: id.to_string(),
        account_id: credential.platform_user_id,
        handle: credential.cached_handle,
    }))
}

#[derive(Debug, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    pub expired: bool,
}

/// `GET /auth/{platform}/status`
pub async fn status(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<ConnectionStatus>> {
    let caller = Caller::from_headers(&headers)?;
    let id = platform_id(&platform)?;
    let identity = caller.identity();

    let Some(credential) = state.store.find_for(id.as_str(), &identity).await? else {
        return Ok(Json(ConnectionStatus {
            connected: false,
            handle: None,
            expired: false,
        }));
    };

    let status = match adapter(&state, id)?.resolve_handle(&identity).await {
        Ok(handle) => ConnectionStatus {
            connected: true,
            handle: Some(handle),
            expired: false,
        },
        Err(e) => {
            let expired = matches!(e.as_platform(), Some(PlatformError::TokenExpired(_)));
            if !expired {
                tracing::warn!(platform = %id, error = %e, "Handle lookup failed");
            }
            ConnectionStatus {
                connected: true,
                handle: credential.cached_handle,
                expired,
            }
        }
    };

    Ok(Json(status))
}

#[derive(Debug, Serialize)]
pub struct Disconnected {
    pub success: bool,
    /// Whether a connection existed
    pub disconnected: bool,
}

/// `DELETE /auth/{platform}`
pub async fn disconnect(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Disconnected>> {
    let caller = Caller::from_headers(&headers)?;
    let id = platform_id(&platform)?;

    let disconnected = adapter(&state, id)?.disconnect(&caller.user_id).await?;
    tracing::info!(platform = %id, user_id = %caller.user_id, disconnected, "Disconnect");

    Ok(Json(Disconnected {
        success: true,
        disconnected,
    }))
}
