//! YouTube uploads via the Data API v3 resumable upload protocol

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::PlatformConfig;
use crate::error::{PlatformError, PlatformResult};
use crate::media::MediaPayload;
use crate::types::{Credential, PlatformId, PlatformMetadata};

use super::{bearer_token, check_response, network_error, read_json, upload_error, Platform, Profile};

const NAME: &str = "youtube";
const DEFAULT_BASE: &str = "https://www.googleapis.com";
const MAX_TITLE_CHARS: usize = 100;
/// "People & Blogs"
const DEFAULT_CATEGORY: &str = "22";

#[derive(Debug, Deserialize)]
struct ChannelList {
    #[serde(default)]
    items: Vec<Channel>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    id: String,
    snippet: ChannelSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelSnippet {
    title: String,
    custom_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Uploaded {
    id: String,
}

/// Video title: the first line of the text, without angle brackets
///
/// Falls back to `filename` when the text yields nothing usable.
pub fn video_title(text: &str, filename: &str) -> String {
    let first_line = text.lines().next().unwrap_or_default();
    let cleaned: String = first_line
        .chars()
        .filter(|c| *c != '<' && *c != '>')
        .take(MAX_TITLE_CHARS)
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        filename.chars().take(MAX_TITLE_CHARS).collect()
    } else {
        cleaned.to_string()
    }
}

pub struct YouTubePlatform {
    http: reqwest::Client,
    base: String,
}

impl YouTubePlatform {
    pub fn new(config: &PlatformConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            base: config
                .api_base
                .as_deref()
                .unwrap_or(DEFAULT_BASE)
                .trim_end_matches('/')
                .to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn start_upload(&self, token: &str, text: &str, media: &MediaPayload) -> PlatformResult<String> {
        let metadata = json!({
            "snippet": {
                "title": video_title(text, &media.info.filename),
                "description": text,
                "categoryId": DEFAULT_CATEGORY,
            },
            "status": {
                "privacyStatus": "public",
                "selfDeclaredMadeForKids": false,
            }
        });

        let response = self
            .http
            .post(self.url("/upload/youtube/v3/videos"))
            .bearer_auth(token)
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .header("X-Upload-Content-Type", media.info.mime_type.as_str())
            .header("X-Upload-Content-Length", media.data.len().to_string())
            .json(&metadata)
            .send()
            .await
            .map_err(|e| network_error(NAME, e))?;
        let response = check_response(NAME, response).await?;

        response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                PlatformError::MediaUpload("youtube returned no upload session URL".to_string())
            })
    }
}

#[async_trait]
impl Platform for YouTubePlatform {
    fn name(&self) -> &str {
        NAME
    }

    fn metadata(&self) -> PlatformMetadata {
        PlatformId::Youtube.metadata()
    }

    async fn fetch_profile(&self, credential: &Credential) -> PlatformResult<Profile> {
        let token = bearer_token(NAME, credential)?;
        let response = self
            .http
            .get(self.url("/youtube/v3/channels"))
            .bearer_auth(token)
            .query(&[("part", "snippet"), ("mine", "true")])
            .send()
            .await
            .map_err(|e| network_error(NAME, e))?;

        let channels: ChannelList = read_json(NAME, response).await?;
        let channel = channels.items.into_iter().next().ok_or_else(|| {
            PlatformError::NotConnected("no YouTube channel on this account".to_string())
        })?;

        Ok(Profile {
            id: channel.id,
            handle: channel.snippet.custom_url.unwrap_or(channel.snippet.title),
        })
    }

    async fn create_post(
        &self,
        _credential: &Credential,
        _text: &str,
        _media_id: Option<&str>,
    ) -> PlatformResult<String> {
        Err(PlatformError::Posting(
            "youtube posts require a video".to_string(),
        ))
    }

    async fn post_with_media(
        &self,
        credential: &Credential,
        text: &str,
        media: &MediaPayload,
    ) -> PlatformResult<String> {
        let token = bearer_token(NAME, credential)?;

        let session = self
            .start_upload(token, text, media)
            .await
            .map_err(upload_error)?;
        tracing::debug!(bytes = media.data.len(), "Uploading video to YouTube");

        let response = self
            .http
            .put(&session)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, media.info.mime_type.as_str())
            .body(media.data.clone())
            .send()
            .await
            .map_err(|e| network_error(NAME, e))?;

        let uploaded: Uploaded = read_json(NAME, response).await.map_err(upload_error)?;
        Ok(uploaded.id)
    }

    fn fallback_url(&self, _credential: &Credential, post_id: &str) -> String {
        format!("https://www.youtube.com/watch?v={}", post_id)
    }
}
