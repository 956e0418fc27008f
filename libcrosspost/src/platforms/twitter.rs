//! Twitter/X via the X API v2
//!
//! Images are uploaded in one request; videos use the chunked
//! initialize/append/finalize flow and are polled until processing ends.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::config::PlatformConfig;
use crate::error::{PlatformError, PlatformResult};
use crate::media::MediaPayload;
use crate::types::{Credential, MediaKind, PlatformId, PlatformMetadata};

use super::{bearer_token, network_error, read_json, upload_error, Platform, Profile};

const NAME: &str = "twitter";
const DEFAULT_BASE: &str = "https://api.x.com";
const CHUNK_SIZE: usize = 4 * 1024 * 1024;
const MAX_STATUS_POLLS: usize = 60;

#[derive(Debug, Deserialize)]
struct Data<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct User {
    id: String,
    username: String,
}

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: String,
}

#[derive(Debug, Deserialize)]
struct UploadState {
    id: String,
    processing_info: Option<ProcessingInfo>,
}

#[derive(Debug, Deserialize)]
struct ProcessingInfo {
    state: String,
    check_after_secs: Option<u64>,
    error: Option<serde_json::Value>,
}

pub struct TwitterPlatform {
    http: reqwest::Client,
    base: String,
    /// Overrides `check_after_secs` between processing polls
    poll_interval: Option<Duration>,
}

impl TwitterPlatform {
    pub fn new(config: &PlatformConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            base: config
                .api_base
                .as_deref()
                .unwrap_or(DEFAULT_BASE)
                .trim_end_matches('/')
                .to_string(),
            poll_interval: None,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn media_part(media: &MediaPayload, data: Vec<u8>) -> PlatformResult<Part> {
        Part::bytes(data)
            .file_name(media.info.filename.clone())
            .mime_str(&media.info.mime_type)
            .map_err(|e| PlatformError::MediaUpload(format!("{}: {}", NAME, e)))
    }

    async fn upload_simple(&self, token: &str, media: &MediaPayload) -> PlatformResult<String> {
        let category = match media.info.kind {
            MediaKind::ImageGif => "tweet_gif",
            _ => "tweet_image",
        };
        let form = Form::new()
            .text("media_category", category)
            .part("media", Self::media_part(media, media.data.clone())?);

        let response = self
            .http
            .post(self.url("/2/media/upload"))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| network_error(NAME, e))?;

        let uploaded: Data<IdOnly> = read_json(NAME, response).await?;
        Ok(uploaded.data.id)
    }

    async fn upload_chunked(&self, token: &str, media: &MediaPayload) -> PlatformResult<String> {
        let response = self
            .http
            .post(self.url("/2/media/upload/initialize"))
            .bearer_auth(token)
            .json(&json!({
                "media_type": media.info.mime_type,
                "total_bytes": media.data.len(),
                "media_category": "tweet_video",
            }))
            .send()
            .await
            .map_err(|e| network_error(NAME, e))?;
        let init: Data<IdOnly> = read_json(NAME, response).await?;
        let media_id = init.data.id;

        for (index, chunk) in media.data.chunks(CHUNK_SIZE).enumerate() {
            let form = Form::new()
                .text("segment_index", index.to_string())
                .part("media", Self::media_part(media, chunk.to_vec())?);

            let response = self
                .http
                .post(self.url(&format!("/2/media/upload/{}/append", media_id)))
                .bearer_auth(token)
                .multipart(form)
                .send()
                .await
                .map_err(|e| network_error(NAME, e))?;
            super::check_response(NAME, response).await?;
            tracing::debug!(media_id = %media_id, segment = index, "Appended video segment");
        }

        let response = self
            .http
            .post(self.url(&format!("/2/media/upload/{}/finalize", media_id)))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| network_error(NAME, e))?;
        let mut state: Data<UploadState> = read_json(NAME, response).await?;

        for _ in 0..MAX_STATUS_POLLS {
            let Some(info) = &state.data.processing_info else {
                return Ok(state.data.id);
            };
            match info.state.as_str() {
                "succeeded" => return Ok(state.data.id),
                "failed" => {
                    return Err(PlatformError::MediaUpload(format!(
                        "twitter could not process video: {}",
                        info.error.clone().unwrap_or_default()
                    )))
                }
                _ => {}
            }

            let wait = self
                .poll_interval
                .unwrap_or_else(|| Duration::from_secs(info.check_after_secs.unwrap_or(2)));
            tokio::time::sleep(wait).await;

            let response = self
                .http
                .get(self.url("/2/media/upload"))
                .bearer_auth(token)
                .query(&[("command", "STATUS"), ("media_id", media_id.as_str())])
                .send()
                .await
                .map_err(|e| network_error(NAME, e))?;
            state = read_json(NAME, response).await?;
        }

        Err(PlatformError::MediaUpload(format!(
            "twitter video {} still processing",
            media_id
        )))
    }
}

#[async_trait]
impl Platform for TwitterPlatform {
    fn name(&self) -> &str {
        NAME
    }

    fn metadata(&self) -> PlatformMetadata {
        PlatformId::Twitter.metadata()
    }

    async fn fetch_profile(&self, credential: &Credential) -> PlatformResult<Profile> {
        let token = bearer_token(NAME, credential)?;
        let response = self
            .http
            .get(self.url("/2/users/me"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| network_error(NAME, e))?;

        let user: Data<User> = read_json(NAME, response).await?;
        Ok(Profile {
            id: user.data.id,
            handle: user.data.username,
        })
    }

    async fn upload_media(
        &self,
        credential: &Credential,
        media: &MediaPayload,
    ) -> PlatformResult<String> {
        let token = bearer_token(NAME, credential)?;
        let result = if media.is_video() {
            self.upload_chunked(token, media).await
        } else {
            self.upload_simple(token, media).await
        };
        result.map_err(upload_error)
    }

    async fn create_post(
        &self,
        credential: &Credential,
        text: &str,
        media_id: Option<&str>,
    ) -> PlatformResult<String> {
        let token = bearer_token(NAME, credential)?;
        let mut body = json!({ "text": text });
        if let Some(media_id) = media_id {
            body["media"] = json!({ "media_ids": [media_id] });
        }

        let response = self
            .http
            .post(self.url("/2/tweets"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error(NAME, e))?;

        let created: Data<IdOnly> = read_json(NAME, response).await?;
        Ok(created.data.id)
    }

    fn fallback_url(&self, credential: &Credential, post_id: &str) -> String {
        match &credential.cached_handle {
            Some(handle) => format!("https://x.com/{}/status/{}", handle, post_id),
            None => format!("https://x.com/i/web/status/{}", post_id),
        }
    }
}
