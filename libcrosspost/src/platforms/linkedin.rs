//! LinkedIn member posts via the versioned REST API

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::PlatformConfig;
use crate::error::{PlatformError, PlatformResult};
use crate::media::MediaPayload;
use crate::types::{Credential, PlatformId, PlatformMetadata};

use super::{
    bearer_token, check_response, network_error, read_json, upload_error, Platform, Profile,
};

const NAME: &str = "linkedin";
const DEFAULT_BASE: &str = "https://api.linkedin.com";
const API_VERSION: &str = "202405";

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
    name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Value<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageUpload {
    upload_url: String,
    image: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoUpload {
    video: String,
    #[serde(default)]
    upload_token: String,
    upload_instructions: Vec<UploadInstruction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadInstruction {
    upload_url: String,
    first_byte: u64,
    last_byte: u64,
}

/// Escape the characters LinkedIn's commentary format reserves, keeping the
/// escaped result within `max_chars`
///
/// Unescaped reserved characters make LinkedIn silently cut the text. The
/// limit applies to the escaped text, and an escape pair is never split.
pub fn escape_commentary(text: &str, max_chars: usize) -> String {
    let mut escaped = String::with_capacity(text.len());
    let mut used = 0;
    for c in text.chars() {
        let reserved = matches!(
            c,
            '\\' | '|' | '{' | '}' | '@' | '[' | ']' | '(' | ')' | '<' | '>' | '#' | '*' | '_'
                | '~'
        );
        let width = if reserved { 2 } else { 1 };
        if used + width > max_chars {
            break;
        }
        if reserved {
            escaped.push('\\');
        }
        escaped.push(c);
        used += width;
    }
    escaped
}

pub struct LinkedInPlatform {
    http: reqwest::Client,
    base: String,
}

impl LinkedInPlatform {
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

    fn author(credential: &Credential) -> String {
        format!("urn:li:person:{}", credential.platform_user_id)
    }

    fn rest(&self, method: reqwest::Method, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(path))
            .bearer_auth(token)
            .header("LinkedIn-Version", API_VERSION)
            .header("X-Restli-Protocol-Version", "2.0.0")
    }

    async fn upload_image(&self, token: &str, owner: &str, media: &MediaPayload) -> PlatformResult<String> {
        let response = self
            .rest(reqwest::Method::POST, "/rest/images?action=initializeUpload", token)
            .json(&json!({ "initializeUploadRequest": { "owner": owner } }))
            .send()
            .await
            .map_err(|e| network_error(NAME, e))?;
        let init: Value<ImageUpload> = read_json(NAME, response).await?;

        let response = self
            .http
            .put(&init.value.upload_url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, media.info.mime_type.as_str())
            .body(media.data.clone())
            .send()
            .await
            .map_err(|e| network_error(NAME, e))?;
        check_response(NAME, response).await?;

        Ok(init.value.image)
    }

    async fn upload_video(&self, token: &str, owner: &str, media: &MediaPayload) -> PlatformResult<String> {
        let response = self
            .rest(reqwest::Method::POST, "/rest/videos?action=initializeUpload", token)
            .json(&json!({
                "initializeUploadRequest": {
                    "owner": owner,
                    "fileSizeBytes": media.data.len(),
                    "uploadCaptions": false,
                    "uploadThumbnail": false,
                }
            }))
            .send()
            .await
            .map_err(|e| network_error(NAME, e))?;
        let init: Value<VideoUpload> = read_json(NAME, response).await?;

        let mut part_ids = Vec::with_capacity(init.value.upload_instructions.len());
        for instruction in &init.value.upload_instructions {
            let first = instruction.first_byte as usize;
            let last = (instruction.last_byte as usize).min(media.data.len().saturating_sub(1));
            let chunk = media.data.get(first..=last).ok_or_else(|| {
                PlatformError::MediaUpload(format!(
                    "linkedin asked for bytes {}-{} of a {} byte video",
                    first,
                    last,
                    media.data.len()
                ))
            })?;

            let response = self
                .http
                .put(&instruction.upload_url)
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(chunk.to_vec())
                .send()
                .await
                .map_err(|e| network_error(NAME, e))?;
            let response = check_response(NAME, response).await?;

            let etag = response
                .headers()
                .get(reqwest::header::ETAG)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| {
                    PlatformError::MediaUpload("linkedin upload part returned no ETag".to_string())
                })?;
            part_ids.push(etag);
        }

        let response = self
            .rest(reqwest::Method::POST, "/rest/videos?action=finalizeUpload", token)
            .json(&json!({
                "finalizeUploadRequest": {
                    "video": init.value.video,
                    "uploadToken": init.value.upload_token,
                    "uploadedPartIds": part_ids,
                }
            }))
            .send()
            .await
            .map_err(|e| network_error(NAME, e))?;
        check_response(NAME, response).await?;

        Ok(init.value.video)
    }
}

#[async_trait]
impl Platform for LinkedInPlatform {
    fn name(&self) -> &str {
        NAME
    }

    fn metadata(&self) -> PlatformMetadata {
        PlatformId::Linkedin.metadata()
    }

    async fn fetch_profile(&self, credential: &Credential) -> PlatformResult<Profile> {
        let token = bearer_token(NAME, credential)?;
        let response = self
            .http
            .get(self.url("/v2/userinfo"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| network_error(NAME, e))?;

        let info: UserInfo = read_json(NAME, response).await?;
        let handle = info
            .name
            .or(info.email)
            .unwrap_or_else(|| info.sub.clone());
        Ok(Profile {
            id: info.sub,
            handle,
        })
    }

    async fn upload_media(
        &self,
        credential: &Credential,
        media: &MediaPayload,
    ) -> PlatformResult<String> {
        let token = bearer_token(NAME, credential)?;
        let owner = Self::author(credential);
        let result = if media.is_video() {
            self.upload_video(token, &owner, media).await
        } else {
            self.upload_image(token, &owner, media).await
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
        let mut body = json!({
            "author": Self::author(credential),
            "commentary": escape_commentary(text, self.character_limit()),
            "visibility": "PUBLIC",
            "distribution": {
                "feedDistribution": "MAIN_FEED",
                "targetEntities": [],
                "thirdPartyDistributionChannels": [],
            },
            "lifecycleState": "PUBLISHED",
            "isReshareDisabledByAuthor": false,
        });
        if let Some(media_id) = media_id {
            body["content"] = json!({ "media": { "id": media_id } });
        }

        let response = self
            .rest(reqwest::Method::POST, "/rest/posts", token)
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error(NAME, e))?;
        let response = check_response(NAME, response).await?;

        response
            .headers()
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| PlatformError::Posting("linkedin returned no post id".to_string()))
    }

    fn fallback_url(&self, _credential: &Credential, post_id: &str) -> String {
        format!("https://www.linkedin.com/feed/update/{}/", post_id)
    }
}
