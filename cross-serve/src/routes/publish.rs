//! `POST /publish`

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use libcrosspost::types::{
    ContentMode, MediaRef, PlatformId, PostContent, PublishOutcome, PublishRequest,
};

use super::Caller;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Composer content for one post
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBody {
    #[serde(default)]
    pub captions: Vec<String>,
    /// Single-caption shorthand, appended after `captions`
    pub caption: Option<String>,
    #[serde(default)]
    pub hashtags: Vec<String>,
    pub media_url: Option<String>,
    /// Raw base64 or a `data:` URL
    pub media_base64: Option<String>,
    pub media_filename: Option<String>,
}

impl ContentBody {
    fn into_content(self) -> ApiResult<PostContent> {
        let mut captions = self.captions;
        captions.extend(self.caption);

        let media = match (self.media_url, self.media_base64) {
            (Some(_), Some(_)) => {
                return Err(ApiError::BadRequest(
                    "send either mediaUrl or mediaBase64, not both".to_string(),
                ))
            }
            (Some(url), None) => Some(MediaRef::url(url)),
            (None, Some(encoded)) => Some(MediaRef::bytes(
                decode_media(&encoded)?,
                self.media_filename,
            )),
            (None, None) => None,
        };

        Ok(PostContent {
            captions,
            hashtags: self.hashtags,
            media,
        })
    }
}

fn decode_media(encoded: &str) -> ApiResult<Vec<u8>> {
    // data:image/png;base64,....
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded,
    };
    STANDARD
        .decode(payload.trim())
        .map_err(|e| ApiError::BadRequest(format!("mediaBase64 is not valid base64: {}", e)))
}

/// Known platforms under their canonical name ("x" becomes "twitter")
fn normalize_platform(raw: &str) -> String {
    raw.parse::<PlatformId>()
        .map(|id| id.as_str().to_string())
        .unwrap_or_else(|_| raw.trim().to_lowercase())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishBody {
    pub platforms: Vec<String>,
    pub content: Option<ContentBody>,
    pub individual_content: Option<HashMap<String, ContentBody>>,
    #[serde(default)]
    pub is_individual_mode: bool,
}

impl PublishBody {
    fn into_request(self, caller: &Caller) -> ApiResult<PublishRequest> {
        let targets: Vec<String> = self
            .platforms
            .iter()
            .map(|p| normalize_platform(p))
            .collect();

        let content = if self.is_individual_mode {
            let slices = self.individual_content.ok_or_else(|| {
                ApiError::BadRequest("individualContent is required in individual mode".to_string())
            })?;
            let mut map = HashMap::with_capacity(slices.len());
            for (platform, body) in slices {
                map.insert(normalize_platform(&platform), body.into_content()?);
            }
            ContentMode::Individual(map)
        } else {
            let body = self
                .content
                .ok_or_else(|| ApiError::BadRequest("content is required".to_string()))?;
            ContentMode::Unified(body.into_content()?)
        };

        Ok(PublishRequest {
            identity: caller.identity(),
            targets,
            content,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct PublishedPost {
    pub id: String,
    pub platforms: Vec<PublishOutcome>,
}

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    /// At least one platform succeeded
    pub success: bool,
    pub message: String,
    pub post: PublishedPost,
}

pub async fn publish(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<PublishBody>,
) -> ApiResult<Json<PublishResponse>> {
    let caller = Caller::from_headers(&headers)?;
    let request = body.into_request(&caller)?;

    let result = state.poster.publish(request).await?;

    Ok(Json(PublishResponse {
        success: result.any_succeeded(),
        message: result.summary(),
        post: PublishedPost {
            id: result.post_id,
            platforms: result.outcomes,
        },
    }))
}
