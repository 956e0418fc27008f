//! OAuth 2.0 authorization-code support
//!
//! - [`OAuthStateStore`]: pending authorizations keyed by the `state`
//!   parameter, single-use with a TTL
//! - [`OAuthClient`]: authorization URL construction, code exchange and
//!   token refresh against a platform's token endpoint
//! - PKCE S256 helpers

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use dashmap::DashMap;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};

use crate::config::PlatformConfig;
use crate::error::PlatformError;
use crate::types::{PlatformId, Secrets};

// ============================================================================
// State store
// ============================================================================

/// An authorization that was started but not yet completed
#[derive(Debug, Clone)]
pub struct PendingAuth {
    pub user_id: String,
    pub email: Option<String>,
    pub platform: PlatformId,
    pub code_verifier: String,
    pub created_at: Instant,
}

impl PendingAuth {
    pub fn new(user_id: impl Into<String>, email: Option<String>, platform: PlatformId) -> Self {
        Self {
            user_id: user_id.into(),
            email,
            platform,
            code_verifier: generate_code_verifier(),
            created_at: Instant::now(),
        }
    }
}

/// Pending authorizations with explicit expiry
pub struct OAuthStateStore {
    entries: DashMap<String, PendingAuth>,
    ttl: Duration,
}

impl OAuthStateStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Store a pending authorization and return its fresh `state` value
    pub fn insert(&self, pending: PendingAuth) -> String {
        let state = generate_state();
        self.entries.insert(state.clone(), pending);
        state
    }

    /// Remove and return the authorization for `state`
    ///
    /// Expired entries are removed but not returned.
    pub fn take(&self, state: &str) -> Option<PendingAuth> {
        let (_, pending) = self.entries.remove(state)?;
        if pending.created_at.elapsed() >= self.ttl {
            tracing::debug!(platform = %pending.platform, "OAuth state expired");
            return None;
        }
        Some(pending)
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, pending| pending.created_at.elapsed() < self.ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// PKCE and state generation
// ============================================================================

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Unguessable value for the `state` parameter
pub fn generate_state() -> String {
    random_token()
}

/// 43-character PKCE code verifier
pub fn generate_code_verifier() -> String {
    random_token()
}

/// PKCE S256 challenge: base64url(sha256(verifier)) without padding
pub fn pkce_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

// ============================================================================
// Client
// ============================================================================

/// How the token endpoint expects the client to authenticate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientAuth {
    /// HTTP Basic with client id and secret
    Basic,
    /// Client id and secret as form fields
    Body,
}

struct Endpoints {
    authorize: &'static str,
    token: &'static str,
    scopes: &'static [&'static str],
    scope_separator: &'static str,
    client_id_param: &'static str,
    pkce: bool,
    auth: ClientAuth,
    extra: &'static [(&'static str, &'static str)],
}

fn endpoints(platform: PlatformId) -> Endpoints {
    match platform {
        PlatformId::Twitter => Endpoints {
            authorize: "https://x.com/i/oauth2/authorize",
            token: "https://api.x.com/2/oauth2/token",
            scopes: &[
                "tweet.read",
                "tweet.write",
                "users.read",
                "media.write",
                "offline.access",
            ],
            scope_separator: " ",
            client_id_param: "client_id",
            pkce: true,
            auth: ClientAuth::Basic,
            extra: &[],
        },
        PlatformId::Linkedin => Endpoints {
            authorize: "https://www.linkedin.com/oauth/v2/authorization",
            token: "https://www.linkedin.com/oauth/v2/accessToken",
            scopes: &["openid", "profile", "email", "w_member_social"],
            scope_separator: " ",
            client_id_param: "client_id",
            pkce: false,
            auth: ClientAuth::Body,
            extra: &[],
        },
        PlatformId::Facebook => Endpoints {
            authorize: "https://www.facebook.com/v19.0/dialog/oauth",
            token: "https://graph.facebook.com/v19.0/oauth/access_token",
            scopes: &[
                "pages_show_list",
                "pages_read_engagement",
                "pages_manage_posts",
            ],
            scope_separator: ",",
            client_id_param: "client_id",
            pkce: false,
            auth: ClientAuth::Body,
            extra: &[],
        },
        PlatformId::Instagram => Endpoints {
            authorize: "https://www.facebook.com/v19.0/dialog/oauth",
            token: "https://graph.facebook.com/v19.0/oauth/access_token",
            scopes: &[
                "instagram_basic",
                "instagram_content_publish",
                "pages_show_list",
                "pages_read_engagement",
            ],
            scope_separator: ",",
            client_id_param: "client_id",
            pkce: false,
            auth: ClientAuth::Body,
            extra: &[],
        },
        PlatformId::Tiktok => Endpoints {
            authorize: "https://www.tiktok.com/v2/auth/authorize/",
            token: "https://open.tiktokapis.com/v2/oauth/token/",
            scopes: &["user.info.basic", "video.publish", "video.upload"],
            scope_separator: ",",
            client_id_param: "client_key",
            pkce: false,
            auth: ClientAuth::Body,
            extra: &[],
        },
        PlatformId::Youtube => Endpoints {
            authorize: "https://accounts.google.com/o/oauth2/v2/auth",
            token: "https://oauth2.googleapis.com/token",
            scopes: &[
                "https://www.googleapis.com/auth/youtube.upload",
                "https://www.googleapis.com/auth/youtube.readonly",
            ],
            scope_separator: " ",
            client_id_param: "client_id",
            pkce: true,
            auth: ClientAuth::Body,
            extra: &[("access_type", "offline"), ("prompt", "consent")],
        },
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    scope: Option<String>,
}

/// Authorization-code client for one platform
pub struct OAuthClient {
    platform: PlatformId,
    client_id: String,
    client_secret: Option<SecretString>,
    authorize_url: String,
    token_url: String,
    scopes: Vec<String>,
    redirect_uri: String,
    http: reqwest::Client,
}

impl OAuthClient {
    pub fn from_config(
        platform: PlatformId,
        config: &PlatformConfig,
        redirect_uri: String,
        http: reqwest::Client,
    ) -> Self {
        let defaults = endpoints(platform);
        Self {
            platform,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            authorize_url: config
                .authorize_url
                .clone()
                .unwrap_or_else(|| defaults.authorize.to_string()),
            token_url: config
                .token_url
                .clone()
                .unwrap_or_else(|| defaults.token.to_string()),
            scopes: config
                .scopes
                .clone()
                .unwrap_or_else(|| defaults.scopes.iter().map(|s| s.to_string()).collect()),
            redirect_uri,
            http,
        }
    }

    pub fn platform(&self) -> PlatformId {
        self.platform
    }

    /// URL the user's browser is sent to
    pub fn authorization_url(&self, state: &str, code_verifier: &str) -> Result<String, PlatformError> {
        let defaults = endpoints(self.platform);
        let mut url = url::Url::parse(&self.authorize_url).map_err(|e| {
            PlatformError::Unsupported(format!("invalid authorize URL for {}: {}", self.platform, e))
        })?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair(defaults.client_id_param, &self.client_id)
                .append_pair("redirect_uri", &self.redirect_uri)
                .append_pair("scope", &self.scopes.join(defaults.scope_separator))
                .append_pair("state", state);
            if defaults.pkce {
                query
                    .append_pair("code_challenge", &pkce_challenge(code_verifier))
                    .append_pair("code_challenge_method", "S256");
            }
            for (key, value) in defaults.extra {
                query.append_pair(key, value);
            }
        }

        Ok(url.into())
    }

    /// Exchange an authorization code for tokens
    pub async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<Secrets, PlatformError> {
        let mut form = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", self.redirect_uri.clone()),
        ];
        if endpoints(self.platform).pkce {
            form.push(("code_verifier", code_verifier.to_string()));
        }

        let token = self.token_request(form).await?;
        Ok(Self::secrets_from(token, None))
    }

    /// Trade a refresh token for a new access token
    ///
    /// The old refresh token is kept when the platform does not rotate it.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Secrets, PlatformError> {
        let form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
        ];

        let token = self.token_request(form).await?;
        Ok(Self::secrets_from(token, Some(refresh_token)))
    }

    async fn token_request(
        &self,
        mut form: Vec<(&'static str, String)>,
    ) -> Result<TokenResponse, PlatformError> {
        let defaults = endpoints(self.platform);
        let mut request = self.http.post(&self.token_url);

        match (defaults.auth, &self.client_secret) {
            (ClientAuth::Basic, Some(secret)) => {
                request = request.basic_auth(&self.client_id, Some(secret.expose_secret()));
            }
            (_, secret) => {
                form.push((defaults.client_id_param, self.client_id.clone()));
                if let Some(secret) = secret {
                    form.push(("client_secret", secret.expose_secret().to_string()));
                }
            }
        }

        let response = request
            .form(&form)
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("{} token endpoint: {}", self.platform, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                400 | 401 => PlatformError::TokenExpired(format!(
                    "{} rejected the grant: {}",
                    self.platform, body
                )),
                429 => PlatformError::RateLimit(format!("{} token endpoint", self.platform)),
                _ => PlatformError::Network(format!(
                    "{} token endpoint returned {}: {}",
                    self.platform, status, body
                )),
            });
        }

        response.json::<TokenResponse>().await.map_err(|e| {
            PlatformError::Network(format!("{} token response: {}", self.platform, e))
        })
    }

    fn secrets_from(token: TokenResponse, previous_refresh: Option<&str>) -> Secrets {
        let now = chrono::Utc::now().timestamp();
        Secrets::OAuth2 {
            access_token: token.access_token,
            refresh_token: token
                .refresh_token
                .or_else(|| previous_refresh.map(str::to_string)),
            expires_at: token.expires_in.map(|secs| now + secs),
            scope: token.scope,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(toml: &str) -> PlatformConfig {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn test_pkce_challenge_rfc7636_vector() {
        assert_eq!(
            pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_generated_values_are_unique_and_url_safe() {
        let a = generate_state();
        let b = generate_state();
        assert_ne!(a, b);
        assert_eq!(generate_code_verifier().len(), 43);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_state_is_single_use() {
        let store = OAuthStateStore::new(Duration::from_secs(60));
        let state = store.insert(PendingAuth::new("user-1", None, PlatformId::Twitter));
        assert_eq!(store.len(), 1);

        let pending = store.take(&state).unwrap();
        assert_eq!(pending.user_id, "user-1");
        assert_eq!(pending.platform, PlatformId::Twitter);
        assert!(store.take(&state).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_state_expires_after_ttl() {
        let store = OAuthStateStore::new(Duration::from_millis(20));
        let state = store.insert(PendingAuth::new("user-1", None, PlatformId::Linkedin));
        let other = store.insert(PendingAuth::new("user-2", None, PlatformId::Linkedin));
        std::thread::sleep(Duration::from_millis(40));

        assert!(store.take(&state).is_none());
        assert_eq!(store.purge_expired(), 1);
        assert!(store.take(&other).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_unknown_state() {
        let store = OAuthStateStore::new(Duration::from_secs(60));
        assert!(store.take("forged").is_none());
    }

    #[test]
    fn test_twitter_authorization_url_uses_pkce() {
        let client = OAuthClient::from_config(
            PlatformId::Twitter,
            &config("client_id = \"tw-client\""),
            "http://localhost:8080/auth/twitter/callback".to_string(),
            reqwest::Client::new(),
        );
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let url = url::Url::parse(&client.authorization_url("st4te", verifier).unwrap()).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("x.com"));
        assert_eq!(params["client_id"], "tw-client");
        assert_eq!(params["state"], "st4te");
        assert_eq!(params["response_type"], "code");
        assert_eq!(
            params["code_challenge"],
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
        assert_eq!(params["code_challenge_method"], "S256");
        assert!(params["scope"].contains("offline.access"));
    }

    #[test]
    fn test_tiktok_authorization_url_uses_client_key() {
        let client = OAuthClient::from_config(
            PlatformId::Tiktok,
            &config("client_id = \"tt-key\"\nscopes = [\"user.info.basic\", \"video.publish\"]"),
            "http://localhost/cb".to_string(),
            reqwest::Client::new(),
        );
        let url = url::Url::parse(&client.authorization_url("s", "v").unwrap()).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(params["client_key"], "tt-key");
        assert!(!params.contains_key("client_id"));
        assert!(!params.contains_key("code_challenge"));
        assert_eq!(params["scope"], "user.info.basic,video.publish");
    }

    #[test]
    fn test_youtube_authorization_url_requests_offline_access() {
        let client = OAuthClient::from_config(
            PlatformId::Youtube,
            &config("client_id = \"yt\""),
            "http://localhost/cb".to_string(),
            reqwest::Client::new(),
        );
        let url = client.authorization_url("s", "v").unwrap();
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
    }

    #[test]
    fn test_secrets_from_keeps_previous_refresh_token() {
        let secrets = OAuthClient::secrets_from(
            TokenResponse {
                access_token: "new".to_string(),
                refresh_token: None,
                expires_in: Some(3600),
                scope: None,
            },
            Some("old-refresh"),
        );
        assert_eq!(secrets.access_token(), Some("new"));
        assert_eq!(secrets.refresh_token(), Some("old-refresh"));
        assert!(!secrets.needs_refresh(chrono::Utc::now().timestamp(), 60));
    }
}
