//! TikTok via the Content Posting API v2
//!
//! Videos are pushed with `FILE_UPLOAD`; photo posts are pulled by TikTok
//! from the original media URL. Every response carries an `error` object
//! whose `code` is `"ok"` on success.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::config::PlatformConfig;
use crate::error::{PlatformError, PlatformResult};
use crate::media::MediaPayload;
use crate::types::{Credential, PlatformId, PlatformMetadata};

use super::{bearer_token, check_response, network_error, upload_error, Platform, Profile};

const NAME: &str = "tiktok";
const DEFAULT_BASE: &str = "https://open.tiktokapis.com";
const DEFAULT_PRIVACY: &str = "SELF_ONLY";
const SINGLE_CHUNK_MAX: usize = 64 * 1024 * 1024;
const CHUNK_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct UserData {
    user: User,
}

#[derive(Debug, Deserialize)]
struct User {
    open_id: String,
    display_name: Option<String>,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InitData {
    publish_id: String,
    upload_url: Option<String>,
}

/// Map a TikTok error code to the taxonomy
pub(crate) fn api_error(code: &str, message: &str) -> PlatformError {
    let detail = format!("tiktok {}: {}", code, message);
    match code {
        "access_token_invalid" | "scope_not_authorized" | "token_expired" => {
            PlatformError::TokenExpired(detail)
        }
        "rate_limit_exceeded" | "spam_risk_too_many_posts" => PlatformError::RateLimit(detail),
        _ => PlatformError::Posting(detail),
    }
}

/// (chunk size, chunk count); the last chunk absorbs the remainder
fn chunk_plan(size: usize) -> (usize, usize) {
    if size <= SINGLE_CHUNK_MAX {
        (size, 1)
    } else {
        (CHUNK_SIZE, size / CHUNK_SIZE)
    }
}

pub struct TikTokPlatform {
    http: reqwest::Client,
    base: String,
    privacy_level: String,
}

impl TikTokPlatform {
    pub fn new(config: &PlatformConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            base: config
                .api_base
                .as_deref()
                .unwrap_or(DEFAULT_BASE)
                .trim_end_matches('/')
                .to_string(),
            privacy_level: config
                .privacy_level
                .clone()
                .unwrap_or_else(|| DEFAULT_PRIVACY.to_string()),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> PlatformResult<T> {
        let status = response.status();
        let body = response.text().await.map_err(|e| network_error(NAME, e))?;

        let envelope: Envelope<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(_) => return Err(super::status_error(NAME, status, &body)),
        };
        if envelope.error.code != "ok" {
            return Err(api_error(&envelope.error.code, &envelope.error.message));
        }
        envelope
            .data
            .ok_or_else(|| PlatformError::Posting("tiktok response had no data".to_string()))
    }

    async fn init(&self, token: &str, path: &str, body: serde_json::Value) -> PlatformResult<InitData> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error(NAME, e))?;
        Self::decode(response).await
    }

    async fn post_video(&self, token: &str, text: &str, media: &MediaPayload) -> PlatformResult<String> {
        let size = media.data.len();
        let (chunk_size, chunk_count) = chunk_plan(size);

        let init = self
            .init(
                token,
                "/v2/post/publish/video/init/",
                json!({
                    "post_info": {
                        "title": text,
                        "privacy_level": self.privacy_level,
                        "disable_comment": false,
                        "disable_duet": false,
                        "disable_stitch": false,
                    },
                    "source_info": {
                        "source": "FILE_UPLOAD",
                        "video_size": size,
                        "chunk_size": chunk_size,
                        "total_chunk_count": chunk_count,
                    }
                }),
            )
            .await?;

        let upload_url = init.upload_url.ok_or_else(|| {
            PlatformError::MediaUpload("tiktok returned no upload URL".to_string())
        })?;

        for index in 0..chunk_count {
            let start = index * chunk_size;
            let end = if index + 1 == chunk_count {
                size
            } else {
                start + chunk_size
            };

            let response = self
                .http
                .put(&upload_url)
                .header(reqwest::header::CONTENT_TYPE, media.info.mime_type.as_str())
                .header(
                    reqwest::header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", start, end - 1, size),
                )
                .body(media.data[start..end].to_vec())
                .send()
                .await
                .map_err(|e| network_error(NAME, e))?;
            check_response(NAME, response).await?;
        }

        Ok(init.publish_id)
    }

    async fn post_photo(&self, token: &str, text: &str, media: &MediaPayload) -> PlatformResult<String> {
        let Some(url) = media.source_url.as_deref() else {
            return Err(PlatformError::MediaUpload(
                "tiktok photo posts need a publicly reachable image URL".to_string(),
            ));
        };

        let init = self
            .init(
                token,
                "/v2/post/publish/content/init/",
                json!({
                    "post_info": {
                        "title": text,
                        "description": text,
                        "privacy_level": self.privacy_level,
                    },
                    "source_info": {
                        "source": "PULL_FROM_URL",
                        "photo_images": [url],
                        "photo_cover_index": 0,
                    },
                    "post_mode": "DIRECT_POST",
                    "media_type": "PHOTO",
                }),
            )
            .await?;

        Ok(init.publish_id)
    }
}

#[async_trait]
impl Platform for TikTokPlatform {
    fn name(&self) -> &str {
        NAME
    }

    fn metadata(&self) -> PlatformMetadata {
        PlatformId::Tiktok.metadata()
    }

    async fn fetch_profile(&self, credential: &Credential) -> PlatformResult<Profile> {
        let token = bearer_token(NAME, credential)?;
        let response = self
            .http
            .get(self.url("/v2/user/info/"))
            .bearer_auth(token)
            .query(&[("fields", "open_id,display_name,username")])
            .send()
            .await
            .map_err(|e| network_error(NAME, e))?;

        let data: UserData = Self::decode(response).await?;
        let handle = data
            .user
            .username
            .or(data.user.display_name)
            .unwrap_or_else(|| data.user.open_id.clone());
        Ok(Profile {
            id: data.user.open_id,
            handle,
        })
    }

    async fn create_post(
        &self,
        _credential: &Credential,
        _text: &str,
        _media_id: Option<&str>,
    ) -> PlatformResult<String> {
        Err(PlatformError::Posting(
            "tiktok posts require a video or photo".to_string(),
        ))
    }

    async fn post_with_media(
        &self,
        credential: &Credential,
        text: &str,
        media: &MediaPayload,
    ) -> PlatformResult<String> {
        let token = bearer_token(NAME, credential)?;
        let result = if media.is_video() {
            self.post_video(token, text, media).await
        } else {
            self.post_photo(token, text, media).await
        };
        result.map_err(upload_error)
    }

    /// Publish ids are not video ids; link to the profile instead
    fn fallback_url(&self, credential: &Credential, _post_id: &str) -> String {
        match &credential.cached_handle {
            Some(handle) => format!("https://www.tiktok.com/@{}", handle),
            None => "https://www.tiktok.com/".to_string(),
        }
    }
}
