//! Facebook Pages via the Graph API
//!
//! Credentials are stored per page: `platform_user_id` is the page id and the
//! secret is that page's access token, selected when the account connects.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::PlatformConfig;
use crate::error::{PlatformError, PlatformResult};
use crate::media::MediaPayload;
use crate::types::{Credential, PlatformId, PlatformMetadata, Secrets};

use super::graph::GraphApi;
use super::{bearer_token, upload_error, ConnectedAccount, Platform, Profile};

const NAME: &str = "facebook";

#[derive(Debug, Deserialize)]
struct PageSummary {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ManagedPage {
    id: String,
    name: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct Paged<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
    /// Set for photo uploads, which create a media object and a feed post
    post_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Permalink {
    permalink_url: Option<String>,
}

pub struct FacebookPlatform {
    graph: GraphApi,
}

impl FacebookPlatform {
    pub fn new(config: &PlatformConfig, http: reqwest::Client) -> Self {
        Self {
            graph: GraphApi::new(NAME, config, http),
        }
    }
}

#[async_trait]
impl Platform for FacebookPlatform {
    fn name(&self) -> &str {
        NAME
    }

    fn metadata(&self) -> PlatformMetadata {
        PlatformId::Facebook.metadata()
    }

    async fn fetch_profile(&self, credential: &Credential) -> PlatformResult<Profile> {
        let token = bearer_token(NAME, credential)?;
        let page: PageSummary = self
            .graph
            .get(token, &credential.platform_user_id, &[("fields", "id,name")])
            .await?;
        Ok(Profile {
            id: page.id,
            handle: page.name,
        })
    }

    async fn create_post(
        &self,
        credential: &Credential,
        text: &str,
        media_id: Option<&str>,
    ) -> PlatformResult<String> {
        let token = bearer_token(NAME, credential)?;
        let path = format!("{}/feed", credential.platform_user_id);

        let mut form = vec![("message", text)];
        if let Some(media_id) = media_id {
            form.push(("object_attachment", media_id));
        }

        let created: Created = self.graph.post_form(token, &path, &form).await?;
        Ok(created.id)
    }

    /// Photos and videos are published in the upload call itself
    async fn post_with_media(
        &self,
        credential: &Credential,
        text: &str,
        media: &MediaPayload,
    ) -> PlatformResult<String> {
        let token = bearer_token(NAME, credential)?;
        let page = &credential.platform_user_id;

        let (path, text_field) = if media.is_video() {
            (format!("{}/videos", page), "description")
        } else {
            (format!("{}/photos", page), "caption")
        };

        let created: Created = self
            .graph
            .post_media(token, &path, &[(text_field, text)], media)
            .await
            .map_err(upload_error)?;

        Ok(created.post_id.unwrap_or(created.id))
    }

    async fn permalink(
        &self,
        credential: &Credential,
        post_id: &str,
    ) -> PlatformResult<Option<String>> {
        let token = bearer_token(NAME, credential)?;
        let link: Permalink = self
            .graph
            .get(token, post_id, &[("fields", "permalink_url")])
            .await?;
        Ok(link.permalink_url)
    }

    fn fallback_url(&self, _credential: &Credential, post_id: &str) -> String {
        format!("https://www.facebook.com/{}", post_id)
    }

    /// Pick the first page the user manages and store its page token
    async fn complete_connection(&self, secrets: Secrets) -> PlatformResult<ConnectedAccount> {
        let user_token = secrets.access_token().ok_or_else(|| {
            PlatformError::TokenExpired("facebook requires an OAuth2 user token".to_string())
        })?;

        let pages: Paged<ManagedPage> = self
            .graph
            .get(user_token, "me/accounts", &[("fields", "id,name,access_token")])
            .await?;

        let page = pages.data.into_iter().next().ok_or_else(|| {
            PlatformError::NotConnected("no Facebook page is managed by this account".to_string())
        })?;

        tracing::debug!(page_id = %page.id, "Selected Facebook page");
        Ok(ConnectedAccount {
            platform_user_id: page.id,
            handle: Some(page.name),
            secrets: Secrets::bearer(page.access_token),
        })
    }
}
