//! Platform abstraction and implementations
//!
//! Publishing to a social platform is split in two layers:
//!
//! - [`Platform`]: the vendor API calls for one platform (profile lookup,
//!   media upload, post creation, permalinks). One implementation per
//!   platform plus [`mock::MockPlatform`].
//! - [`Adapter`]: wraps any `Platform` with the behavior every platform
//!   shares: credential lookup, token refresh, truncation, media download
//!   and sniffing, the media-then-text fallback and handle caching.
//!
//! `Adapter<P>` implements the object-safe [`PlatformAdapter`] trait that the
//! orchestrator and HTTP layer work with.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use libcrosspost::config::PlatformConfig;
//! use libcrosspost::credentials::MemoryTokenStore;
//! use libcrosspost::media::MediaFetcher;
//! use libcrosspost::platforms::{Adapter, PlatformAdapter, twitter::TwitterPlatform};
//! use libcrosspost::types::Identity;
//!
//! # async fn example(config: &PlatformConfig) {
//! let http = reqwest::Client::new();
//! let adapter = Adapter::new(
//!     TwitterPlatform::new(config, http.clone()),
//!     Arc::new(MemoryTokenStore::new()),
//!     MediaFetcher::new(http, 64 * 1024 * 1024),
//! );
//!
//! let outcome = adapter
//!     .publish(&Identity::user("user-1"), "Hello from Rust", None)
//!     .await;
//! println!("{}: success={}", outcome.platform, outcome.success);
//! # }
//! ```

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::credentials::TokenStore;
use crate::error::{PlatformError, PlatformResult, Result};
use crate::media::{MediaFetcher, MediaPayload};
use crate::oauth::OAuthClient;
use crate::types::{
    truncate_chars, Credential, DisconnectPolicy, Identity, MediaKind, MediaRef,
    PlatformMetadata, PublishOutcome, Secrets,
};

pub mod facebook;
mod graph;
pub mod instagram;
pub mod linkedin;
pub mod tiktok;
pub mod twitter;
pub mod youtube;

// Mock platform is available for all builds to support integration tests
pub mod mock;

/// Tokens this close to expiry are refreshed before use
const REFRESH_SKEW_SECS: i64 = 60;

/// Default freshness window for cached handles
pub const HANDLE_CACHE_SECS: i64 = 24 * 60 * 60;

/// Account details returned by a platform's profile endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// Platform-side account identifier
    pub id: String,
    /// Display handle
    pub handle: String,
}

/// The account a freshly authorized token should be stored under
#[derive(Debug, Clone)]
pub struct ConnectedAccount {
    pub platform_user_id: String,
    pub handle: Option<String>,
    /// May differ from the exchanged token (e.g. a Facebook page token)
    pub secrets: Secrets,
}

/// Vendor API operations for one platform
///
/// Implementations only talk to the vendor; they never read or write the
/// token store. Every method receives the credential to act with.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Lowercase platform identifier (e.g. "twitter")
    fn name(&self) -> &str;

    /// Static limits and capabilities
    fn metadata(&self) -> PlatformMetadata;

    /// Maximum post length in characters
    fn character_limit(&self) -> usize {
        self.metadata().max_characters
    }

    /// Whether the platform accepts this kind of media
    fn supports_media(&self, kind: MediaKind) -> bool {
        self.metadata().supported_media.contains(&kind)
    }

    /// Look up the account the credential belongs to
    ///
    /// # Errors
    ///
    /// `TokenExpired` when the platform rejects the credential.
    async fn fetch_profile(&self, credential: &Credential) -> PlatformResult<Profile>;

    /// Upload media and return the platform's media handle
    ///
    /// Platforms without a separate upload step keep this default and
    /// override [`Platform::post_with_media`] instead.
    async fn upload_media(
        &self,
        _credential: &Credential,
        _media: &MediaPayload,
    ) -> PlatformResult<String> {
        Err(PlatformError::Unsupported(format!(
            "{} has no separate media upload",
            self.name()
        )))
    }

    /// Create a post, optionally referencing an uploaded media handle
    ///
    /// Returns the platform's post id.
    async fn create_post(
        &self,
        credential: &Credential,
        text: &str,
        media_id: Option<&str>,
    ) -> PlatformResult<String>;

    /// Publish a post with media attached
    ///
    /// The default uploads first and then creates the post referencing the
    /// upload. Platforms whose API does both in one call override this.
    async fn post_with_media(
        &self,
        credential: &Credential,
        text: &str,
        media: &MediaPayload,
    ) -> PlatformResult<String> {
        let media_id = self.upload_media(credential, media).await?;
        self.create_post(credential, text, Some(&media_id)).await
    }

    /// Ask the platform for the post's canonical URL
    async fn permalink(
        &self,
        _credential: &Credential,
        _post_id: &str,
    ) -> PlatformResult<Option<String>> {
        Ok(None)
    }

    /// URL built from the post id when no permalink is available
    fn fallback_url(&self, credential: &Credential, post_id: &str) -> String;

    /// Turn freshly exchanged OAuth secrets into the account to store
    ///
    /// The default looks up the profile the token belongs to.
    async fn complete_connection(&self, secrets: Secrets) -> PlatformResult<ConnectedAccount> {
        let candidate = Credential::new("", self.name(), "", secrets.clone());
        let profile = self.fetch_profile(&candidate).await?;
        Ok(ConnectedAccount {
            platform_user_id: profile.id,
            handle: Some(profile.handle),
            secrets,
        })
    }
}

/// How a media publish attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaPostResult {
    /// Posted as requested
    Success { post_id: String },
    /// The media path failed; the text-only retry succeeded
    FallbackSuccess {
        post_id: String,
        media_error: PlatformError,
    },
    /// The final attempt failed; `media_error` is set when that attempt was
    /// the text-only retry
    Failure {
        error: PlatformError,
        media_error: Option<PlatformError>,
    },
}

/// Object-safe adapter contract used by the orchestrator and HTTP layer
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Requests without media are rejected before dispatch
    fn requires_media(&self) -> bool;

    /// Cap applied when rendering hashtags, if any
    fn max_hashtags(&self) -> Option<usize> {
        None
    }

    /// Publish one post. Never fails: every error becomes a failed outcome.
    async fn publish(&self, identity: &Identity, text: &str, media: Option<&MediaRef>)
        -> PublishOutcome;

    /// Display handle for the connected account, cached for 24 hours
    async fn resolve_handle(&self, _identity: &Identity) -> Result<String> {
        Err(PlatformError::Unsupported(format!("{} has no handle lookup", self.name())).into())
    }

    /// Store the account behind freshly exchanged OAuth secrets
    async fn connect(
        &self,
        _user_id: &str,
        _email: Option<&str>,
        _secrets: Secrets,
    ) -> Result<Credential> {
        Err(PlatformError::Unsupported(format!("{} cannot be connected", self.name())).into())
    }

    /// Remove or deactivate the user's credential. Returns whether one existed.
    async fn disconnect(&self, _user_id: &str) -> Result<bool> {
        Err(PlatformError::Unsupported(format!("{} cannot be disconnected", self.name())).into())
    }
}

/// Shared adapter behavior on top of a vendor [`Platform`]
pub struct Adapter<P: Platform> {
    platform: P,
    store: Arc<dyn TokenStore>,
    media: MediaFetcher,
    oauth: Option<Arc<OAuthClient>>,
    handle_ttl_secs: i64,
}

impl<P: Platform> Adapter<P> {
    pub fn new(platform: P, store: Arc<dyn TokenStore>, media: MediaFetcher) -> Self {
        Self {
            platform,
            store,
            media,
            oauth: None,
            handle_ttl_secs: HANDLE_CACHE_SECS,
        }
    }

    /// Enable refreshing expiring OAuth2 tokens through `client`
    pub fn with_oauth(mut self, client: Arc<OAuthClient>) -> Self {
        self.oauth = Some(client);
        self
    }

    pub fn with_handle_ttl(mut self, secs: i64) -> Self {
        self.handle_ttl_secs = secs;
        self
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Find the identity's credential, refreshing its token when due
    pub async fn credential(&self, identity: &Identity) -> Result<Credential> {
        let credential = self
            .store
            .find_for(self.platform.name(), identity)
            .await?
            .ok_or_else(|| {
                PlatformError::NotConnected(format!(
                    "no {} account connected for {}",
                    self.platform.name(),
                    identity.describe()
                ))
            })?;

        self.refresh_if_needed(credential).await
    }

    async fn refresh_if_needed(&self, mut credential: Credential) -> Result<Credential> {
        let now = chrono::Utc::now().timestamp();
        if !credential.secrets.needs_refresh(now, REFRESH_SKEW_SECS) {
            return Ok(credential);
        }

        let refresh_token = credential.secrets.refresh_token().map(str::to_string);
        let (Some(oauth), Some(refresh_token)) = (&self.oauth, refresh_token) else {
            return Ok(credential);
        };

        tracing::debug!(platform = %self.platform.name(), "Refreshing access token");
        credential.secrets = oauth.refresh(&refresh_token).await?;
        credential.updated_at = now;
        self.store.upsert(&credential).await?;
        tracing::info!(platform = %self.platform.name(), "Access token refreshed");

        Ok(credential)
    }

    /// Run the publish attempt sequence for an already resolved credential
    ///
    /// With media: download, sniff and post with media. If any of that fails,
    /// exactly one text-only attempt follows and its result is returned.
    pub async fn post_sequence(
        &self,
        credential: &Credential,
        text: &str,
        media: Option<&MediaRef>,
    ) -> MediaPostResult {
        let Some(media) = media else {
            return match self.platform.create_post(credential, text, None).await {
                Ok(post_id) => MediaPostResult::Success { post_id },
                Err(error) => MediaPostResult::Failure {
                    error,
                    media_error: None,
                },
            };
        };

        let media_error = match self.post_media(credential, text, media).await {
            Ok(post_id) => return MediaPostResult::Success { post_id },
            Err(e) => e,
        };

        tracing::warn!(
            platform = %self.platform.name(),
            error = %media_error,
            "Media post failed, retrying as text only"
        );

        match self.platform.create_post(credential, text, None).await {
            Ok(post_id) => MediaPostResult::FallbackSuccess {
                post_id,
                media_error,
            },
            Err(error) => MediaPostResult::Failure {
                error,
                media_error: Some(media_error),
            },
        }
    }

    async fn post_media(
        &self,
        credential: &Credential,
        text: &str,
        media: &MediaRef,
    ) -> PlatformResult<String> {
        let payload = self.media.resolve(media).await?;
        if !self.platform.supports_media(payload.info.kind) {
            return Err(PlatformError::MediaUpload(format!(
                "{} does not accept {} media",
                self.platform.name(),
                payload.info.kind
            )));
        }
        self.platform.post_with_media(credential, text, &payload).await
    }

    /// Permalink when the platform provides one, constructed URL otherwise
    async fn post_url(&self, credential: &Credential, post_id: &str) -> String {
        match self.platform.permalink(credential, post_id).await {
            Ok(Some(url)) => url,
            Ok(None) => self.platform.fallback_url(credential, post_id),
            Err(e) => {
                tracing::debug!(
                    platform = %self.platform.name(),
                    error = %e,
                    "Permalink lookup failed, using constructed URL"
                );
                self.platform.fallback_url(credential, post_id)
            }
        }
    }
}

#[async_trait]
impl<P: Platform> PlatformAdapter for Adapter<P> {
    fn name(&self) -> &str {
        self.platform.name()
    }

    fn requires_media(&self) -> bool {
        self.platform.metadata().requires_media
    }

    fn max_hashtags(&self) -> Option<usize> {
        Some(self.platform.metadata().max_hashtags)
    }

    async fn publish(
        &self,
        identity: &Identity,
        text: &str,
        media: Option<&MediaRef>,
    ) -> PublishOutcome {
        let name = self.platform.name().to_string();

        let credential = match self.credential(identity).await {
            Ok(credential) => credential,
            Err(e) => return PublishOutcome::failure(name, &e.into_platform()),
        };

        let text = truncate_chars(text, self.platform.character_limit());

        match self.post_sequence(&credential, text, media).await {
            MediaPostResult::Success { post_id } => {
                let url = self.post_url(&credential, &post_id).await;
                tracing::info!(platform = %name, post_id = %post_id, "Published");
                PublishOutcome::success(name, post_id, url)
            }
            MediaPostResult::FallbackSuccess {
                post_id,
                media_error,
            } => {
                let url = self.post_url(&credential, &post_id).await;
                tracing::info!(platform = %name, post_id = %post_id, "Published without media");
                PublishOutcome {
                    error_message: Some(format!("media dropped: {}", media_error)),
                    used_fallback: true,
                    ..PublishOutcome::success(name, post_id, url)
                }
            }
            MediaPostResult::Failure { error, media_error } => {
                tracing::warn!(platform = %name, error = %error, "Publish failed");
                let mut outcome = PublishOutcome::failure(name, &error);
                if let Some(media_error) = media_error {
                    outcome.error_message = Some(format!(
                        "{} (text-only retry after media failure: {})",
                        error, media_error
                    ));
                    outcome.used_fallback = true;
                }
                outcome
            }
        }
    }

    async fn resolve_handle(&self, identity: &Identity) -> Result<String> {
        let credential = self.credential(identity).await?;
        let now = chrono::Utc::now().timestamp();

        if let Some(handle) = credential.fresh_handle(now, self.handle_ttl_secs) {
            return Ok(handle.to_string());
        }

        // Only the handle columns; a concurrent refresh may have rotated the secrets
        let profile = self.platform.fetch_profile(&credential).await?;
        self.store
            .update_handle(&credential.user_id, &credential.platform, &profile.handle, now)
            .await?;

        Ok(profile.handle)
    }

    async fn connect(
        &self,
        user_id: &str,
        email: Option<&str>,
        secrets: Secrets,
    ) -> Result<Credential> {
        let account = self.platform.complete_connection(secrets).await?;
        let now = chrono::Utc::now().timestamp();

        let mut credential = Credential::new(
            user_id,
            self.platform.name(),
            account.platform_user_id,
            account.secrets,
        );
        credential.email = email.map(str::to_string);
        if let Some(handle) = account.handle {
            credential.cached_handle = Some(handle);
            credential.cached_handle_updated_at = Some(now);
        }

        self.store.upsert(&credential).await?;
        tracing::info!(
            platform = %self.platform.name(),
            user_id = %user_id,
            account = %credential.platform_user_id,
            "Account connected"
        );
        Ok(credential)
    }

    async fn disconnect(&self, user_id: &str) -> Result<bool> {
        let name = self.platform.name();
        match self.platform.metadata().disconnect {
            DisconnectPolicy::Delete => self.store.delete(user_id, name).await,
            DisconnectPolicy::Deactivate => self.store.deactivate(user_id, name).await,
        }
    }
}

// ============================================================================
// Vendor HTTP helpers
// ============================================================================

/// Bearer token for an OAuth2 credential
pub(crate) fn bearer_token<'a>(platform: &str, credential: &'a Credential) -> PlatformResult<&'a str> {
    credential.secrets.access_token().ok_or_else(|| {
        PlatformError::TokenExpired(format!(
            "{} credential uses OAuth 1.0a; reconnect the account",
            platform
        ))
    })
}

/// Map a non-success HTTP status to the error taxonomy
pub(crate) fn status_error(platform: &str, status: reqwest::StatusCode, body: &str) -> PlatformError {
    let detail = format!("{} returned {}: {}", platform, status, body.trim());
    match status.as_u16() {
        401 => PlatformError::TokenExpired(detail),
        429 => PlatformError::RateLimit(detail),
        500..=599 => PlatformError::Network(detail),
        _ => PlatformError::Posting(detail),
    }
}

pub(crate) fn network_error(platform: &str, error: reqwest::Error) -> PlatformError {
    PlatformError::Network(format!("{}: {}", platform, error))
}

/// Pass successful responses through, map the rest
pub(crate) async fn check_response(
    platform: &str,
    response: reqwest::Response,
) -> PlatformResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(platform, status, &body))
}

/// Check the status and decode the JSON body
pub(crate) async fn read_json<T: DeserializeOwned>(
    platform: &str,
    response: reqwest::Response,
) -> PlatformResult<T> {
    let response = check_response(platform, response).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| PlatformError::Posting(format!("{}: unexpected response: {}", platform, e)))
}

/// Re-tag posting failures that happened while uploading media
pub(crate) fn upload_error(error: PlatformError) -> PlatformError {
    match error {
        PlatformError::Posting(message) => PlatformError::MediaUpload(message),
        other => other,
    }
}
