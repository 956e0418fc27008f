//! Instagram professional accounts via the Graph API content publishing flow
//!
//! Publishing is container based: create a media container pointing at a
//! public media URL, wait for it to finish processing, then publish it.
//! Instagram pulls the media itself, so only URL media can be posted.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::PlatformConfig;
use crate::error::{PlatformError, PlatformResult};
use crate::media::MediaPayload;
use crate::types::{Credential, PlatformId, PlatformMetadata, Secrets};

use super::graph::GraphApi;
use super::{bearer_token, upload_error, ConnectedAccount, Platform, Profile};

const NAME: &str = "instagram";
const MAX_STATUS_POLLS: usize = 30;

#[derive(Debug, Deserialize)]
struct Account {
    id: String,
    username: String,
}

#[derive(Debug, Deserialize)]
struct PageWithInstagram {
    access_token: String,
    instagram_business_account: Option<Account>,
}

#[derive(Debug, Deserialize)]
struct Paged<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ContainerStatus {
    status_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Permalink {
    permalink: Option<String>,
}

pub struct InstagramPlatform {
    graph: GraphApi,
    poll_interval: Duration,
}

impl InstagramPlatform {
    pub fn new(config: &PlatformConfig, http: reqwest::Client) -> Self {
        Self {
            graph: GraphApi::new(NAME, config, http),
            poll_interval: Duration::from_secs(2),
        }
    }

    /// Delay between container status checks
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn wait_until_ready(&self, token: &str, container_id: &str) -> PlatformResult<()> {
        for _ in 0..MAX_STATUS_POLLS {
            let status: ContainerStatus = self
                .graph
                .get(token, container_id, &[("fields", "status_code")])
                .await?;

            match status.status_code.as_deref() {
                Some("FINISHED") | Some("PUBLISHED") => return Ok(()),
                Some("ERROR") | Some("EXPIRED") => {
                    return Err(PlatformError::MediaUpload(format!(
                        "instagram could not process media container {}",
                        container_id
                    )))
                }
                _ => tokio::time::sleep(self.poll_interval).await,
            }
        }

        Err(PlatformError::MediaUpload(format!(
            "instagram media container {} still processing",
            container_id
        )))
    }
}

#[async_trait]
impl Platform for InstagramPlatform {
    fn name(&self) -> &str {
        NAME
    }

    fn metadata(&self) -> PlatformMetadata {
        PlatformId::Instagram.metadata()
    }

    async fn fetch_profile(&self, credential: &Credential) -> PlatformResult<Profile> {
        let token = bearer_token(NAME, credential)?;
        let account: Account = self
            .graph
            .get(token, &credential.platform_user_id, &[("fields", "id,username")])
            .await?;
        Ok(Profile {
            id: account.id,
            handle: account.username,
        })
    }

    /// Publish a finished container; there are no text-only posts
    async fn create_post(
        &self,
        credential: &Credential,
        _text: &str,
        media_id: Option<&str>,
    ) -> PlatformResult<String> {
        let Some(container_id) = media_id else {
            return Err(PlatformError::Posting(
                "instagram posts require an image or video".to_string(),
            ));
        };

        let token = bearer_token(NAME, credential)?;
        let path = format!("{}/media_publish", credential.platform_user_id);
        let published: Created = self
            .graph
            .post_form(token, &path, &[("creation_id", container_id)])
            .await?;
        Ok(published.id)
    }

    async fn post_with_media(
        &self,
        credential: &Credential,
        text: &str,
        media: &MediaPayload,
    ) -> PlatformResult<String> {
        let Some(media_url) = media.source_url.as_deref() else {
            return Err(PlatformError::MediaUpload(
                "instagram needs a publicly reachable media URL".to_string(),
            ));
        };

        let token = bearer_token(NAME, credential)?;
        let path = format!("{}/media", credential.platform_user_id);
        let form: Vec<(&str, &str)> = if media.is_video() {
            vec![
                ("media_type", "REELS"),
                ("video_url", media_url),
                ("caption", text),
            ]
        } else {
            vec![("image_url", media_url), ("caption", text)]
        };

        let container: Created = self
            .graph
            .post_form(token, &path, &form)
            .await
            .map_err(upload_error)?;

        self.wait_until_ready(token, &container.id).await?;
        self.create_post(credential, text, Some(&container.id)).await
    }

    async fn permalink(
        &self,
        credential: &Credential,
        post_id: &str,
    ) -> PlatformResult<Option<String>> {
        let token = bearer_token(NAME, credential)?;
        let link: Permalink = self
            .graph
            .get(token, post_id, &[("fields", "permalink")])
            .await?;
        Ok(link.permalink)
    }

    fn fallback_url(&self, credential: &Credential, _post_id: &str) -> String {
        match &credential.cached_handle {
            Some(handle) => format!("https://www.instagram.com/{}/", handle),
            None => "https://www.instagram.com/".to_string(),
        }
    }

    /// Use the first page with a linked Instagram professional account
    async fn complete_connection(&self, secrets: Secrets) -> PlatformResult<ConnectedAccount> {
        let user_token = secrets.access_token().ok_or_else(|| {
            PlatformError::TokenExpired("instagram requires an OAuth2 user token".to_string())
        })?;

        let pages: Paged<PageWithInstagram> = self
            .graph
            .get(
                user_token,
                "me/accounts",
                &[("fields", "access_token,instagram_business_account{id,username}")],
            )
            .await?;

        let (page_token, account) = pages
            .data
            .into_iter()
            .find_map(|page| {
                page.instagram_business_account
                    .map(|account| (page.access_token, account))
            })
            .ok_or_else(|| {
                PlatformError::NotConnected(
                    "no Instagram professional account is linked to a managed page".to_string(),
                )
            })?;

        Ok(ConnectedAccount {
            platform_user_id: account.id,
            handle: Some(account.username),
            secrets: Secrets::bearer(page_token),
        })
    }
}
