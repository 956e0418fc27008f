//! Graph API plumbing shared by Facebook and Instagram

use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::PlatformConfig;
use crate::error::{PlatformError, PlatformResult};
use crate::media::MediaPayload;

use super::network_error;

const DEFAULT_BASE: &str = "https://graph.facebook.com";
const DEFAULT_VIDEO_BASE: &str = "https://graph-video.facebook.com";
const DEFAULT_VERSION: &str = "v19.0";

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: GraphErrorBody,
}

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    message: String,
    code: Option<i64>,
    error_subcode: Option<i64>,
}

/// Map a Graph API error to the taxonomy
///
/// Code 190 means the access token is invalid or expired.
pub(crate) fn graph_error(
    platform: &str,
    status: reqwest::StatusCode,
    code: Option<i64>,
    message: &str,
) -> PlatformError {
    let detail = match code {
        Some(code) => format!("{} error {}: {}", platform, code, message),
        None => format!("{} returned {}: {}", platform, status, message),
    };
    match code {
        Some(190) => PlatformError::TokenExpired(detail),
        Some(4) | Some(17) | Some(32) | Some(613) => PlatformError::RateLimit(detail),
        _ if status.as_u16() == 401 => PlatformError::TokenExpired(detail),
        _ if status.is_server_error() => PlatformError::Network(detail),
        _ => PlatformError::Posting(detail),
    }
}

pub(crate) struct GraphApi {
    platform: &'static str,
    http: reqwest::Client,
    base: String,
    video_base: String,
    version: String,
}

impl GraphApi {
    pub fn new(platform: &'static str, config: &PlatformConfig, http: reqwest::Client) -> Self {
        let (base, video_base) = match &config.api_base {
            Some(base) => {
                let base = base.trim_end_matches('/').to_string();
                (base.clone(), base)
            }
            None => (DEFAULT_BASE.to_string(), DEFAULT_VIDEO_BASE.to_string()),
        };
        Self {
            platform,
            http,
            base,
            video_base,
            version: config
                .graph_version
                .clone()
                .unwrap_or_else(|| DEFAULT_VERSION.to_string()),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base, self.version, path.trim_start_matches('/'))
    }

    fn video_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.video_base,
            self.version,
            path.trim_start_matches('/')
        )
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        token: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> PlatformResult<T> {
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(|e| network_error(self.platform, e))?;
        self.decode(response).await
    }

    pub async fn post_form<T: DeserializeOwned>(
        &self,
        token: &str,
        path: &str,
        form: &[(&str, &str)],
    ) -> PlatformResult<T> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(token)
            .form(form)
            .send()
            .await
            .map_err(|e| network_error(self.platform, e))?;
        self.decode(response).await
    }

    /// Multipart upload with the media bytes in the `source` field
    pub async fn post_media<T: DeserializeOwned>(
        &self,
        token: &str,
        path: &str,
        fields: &[(&str, &str)],
        media: &MediaPayload,
    ) -> PlatformResult<T> {
        let part = Part::bytes(media.data.clone())
            .file_name(media.info.filename.clone())
            .mime_str(&media.info.mime_type)
            .map_err(|e| PlatformError::MediaUpload(format!("{}: {}", self.platform, e)))?;

        let mut form = Form::new().part("source", part);
        for (key, value) in fields {
            form = form.text(key.to_string(), value.to_string());
        }

        let url = if media.is_video() {
            self.video_url(path)
        } else {
            self.url(path)
        };

        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| network_error(self.platform, e))?;
        self.decode(response).await
    }

    async fn decode<T: DeserializeOwned>(&self, response: reqwest::Response) -> PlatformResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| network_error(self.platform, e))?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<ErrorEnvelope>(&body) {
                Ok(envelope) => {
                    tracing::debug!(
                        platform = self.platform,
                        code = ?envelope.error.code,
                        subcode = ?envelope.error.error_subcode,
                        "Graph API error"
                    );
                    graph_error(
                        self.platform,
                        status,
                        envelope.error.code,
                        &envelope.error.message,
                    )
                }
                Err(_) => graph_error(self.platform, status, None, &body),
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            PlatformError::Posting(format!("{}: unexpected response: {}", self.platform, e))
        })
    }
}
