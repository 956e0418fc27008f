//! Core types for Crosspost

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::PlatformError;

// ============================================================================
// Platforms
// ============================================================================

/// The platforms with a built-in adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformId {
    Twitter,
    Linkedin,
    Instagram,
    Facebook,
    Tiktok,
    Youtube,
}

impl PlatformId {
    pub const ALL: [PlatformId; 6] = [
        PlatformId::Twitter,
        PlatformId::Linkedin,
        PlatformId::Instagram,
        PlatformId::Facebook,
        PlatformId::Tiktok,
        PlatformId::Youtube,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Twitter => "twitter",
            Self::Linkedin => "linkedin",
            Self::Instagram => "instagram",
            Self::Facebook => "facebook",
            Self::Tiktok => "tiktok",
            Self::Youtube => "youtube",
        }
    }

    /// Static limits and capabilities for the platform
    pub fn metadata(&self) -> PlatformMetadata {
        match self {
            Self::Twitter => PlatformMetadata {
                max_characters: 280,
                max_hashtags: 10,
                requires_media: false,
                supported_media: &[MediaKind::Image, MediaKind::ImageGif, MediaKind::Video],
                disconnect: DisconnectPolicy::Delete,
            },
            Self::Linkedin => PlatformMetadata {
                max_characters: 3000,
                max_hashtags: 15,
                requires_media: false,
                supported_media: &[MediaKind::Image, MediaKind::Video],
                disconnect: DisconnectPolicy::Delete,
            },
            Self::Instagram => PlatformMetadata {
                max_characters: 2200,
                max_hashtags: 30,
                requires_media: true,
                supported_media: &[MediaKind::Image, MediaKind::Video],
                disconnect: DisconnectPolicy::Deactivate,
            },
            Self::Facebook => PlatformMetadata {
                max_characters: 63206,
                max_hashtags: 30,
                requires_media: false,
                supported_media: &[MediaKind::Image, MediaKind::ImageGif, MediaKind::Video],
                disconnect: DisconnectPolicy::Deactivate,
            },
            Self::Tiktok => PlatformMetadata {
                max_characters: 150,
                max_hashtags: 30,
                requires_media: true,
                supported_media: &[MediaKind::Video, MediaKind::Image],
                disconnect: DisconnectPolicy::Delete,
            },
            Self::Youtube => PlatformMetadata {
                max_characters: 5000,
                max_hashtags: 15,
                requires_media: true,
                supported_media: &[MediaKind::Video],
                disconnect: DisconnectPolicy::Delete,
            },
        }
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformId {
    type Err = PlatformError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "twitter" | "x" => Ok(Self::Twitter),
            "linkedin" => Ok(Self::Linkedin),
            "instagram" => Ok(Self::Instagram),
            "facebook" => Ok(Self::Facebook),
            "tiktok" => Ok(Self::Tiktok),
            "youtube" => Ok(Self::Youtube),
            other => Err(PlatformError::Unsupported(format!(
                "unknown platform '{}'",
                other
            ))),
        }
    }
}

/// What happens to a credential when the user disconnects the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectPolicy {
    /// Remove the record entirely
    Delete,
    /// Keep the record but flag it inactive
    Deactivate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformMetadata {
    pub max_characters: usize,
    pub max_hashtags: usize,
    pub requires_media: bool,
    pub supported_media: &'static [MediaKind],
    pub disconnect: DisconnectPolicy,
}

// ============================================================================
// Media
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaKind {
    Image,
    ImageGif,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => write!(f, "IMAGE"),
            Self::ImageGif => write!(f, "IMAGE_GIF"),
            Self::Video => write!(f, "VIDEO"),
        }
    }
}

/// Result of sniffing a media payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub kind: MediaKind,
    pub mime_type: String,
    pub filename: String,
}

/// Media attached to a publish request
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediaRef {
    /// Media already hosted somewhere reachable
    Url { url: String },
    /// Raw bytes supplied by the caller
    Bytes {
        data: Vec<u8>,
        filename: Option<String>,
    },
}

impl MediaRef {
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url { url: url.into() }
    }

    pub fn bytes(data: Vec<u8>, filename: Option<String>) -> Self {
        Self::Bytes { data, filename }
    }
}

impl fmt::Debug for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url { url } => f.debug_struct("Url").field("url", url).finish(),
            Self::Bytes { data, filename } => f
                .debug_struct("Bytes")
                .field("len", &data.len())
                .field("filename", filename)
                .finish(),
        }
    }
}

// ============================================================================
// Credentials
// ============================================================================

/// Platform-specific auth material
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "lowercase")]
pub enum Secrets {
    OAuth1 {
        token: String,
        token_secret: String,
    },
    OAuth2 {
        access_token: String,
        refresh_token: Option<String>,
        /// Unix seconds
        expires_at: Option<i64>,
        scope: Option<String>,
    },
}

impl Secrets {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self::OAuth2 {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            scope: None,
        }
    }

    /// OAuth2 access token, if this is an OAuth2 credential
    pub fn access_token(&self) -> Option<&str> {
        match self {
            Self::OAuth2 { access_token, .. } => Some(access_token),
            Self::OAuth1 { .. } => None,
        }
    }

    pub fn refresh_token(&self) -> Option<&str> {
        match self {
            Self::OAuth2 { refresh_token, .. } => refresh_token.as_deref(),
            Self::OAuth1 { .. } => None,
        }
    }

    /// True when the access token expires within `skew_secs` of `now` and a
    /// refresh token is available to replace it.
    pub fn needs_refresh(&self, now: i64, skew_secs: i64) -> bool {
        match self {
            Self::OAuth2 {
                refresh_token: Some(_),
                expires_at: Some(expires_at),
                ..
            } => *expires_at <= now + skew_secs,
            _ => false,
        }
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OAuth1 { .. } => f
                .debug_struct("OAuth1")
                .field("token", &"[REDACTED]")
                .field("token_secret", &"[REDACTED]")
                .finish(),
            Self::OAuth2 {
                refresh_token,
                expires_at,
                scope,
                ..
            } => f
                .debug_struct("OAuth2")
                .field("access_token", &"[REDACTED]")
                .field("refresh_token", &refresh_token.as_ref().map(|_| "[REDACTED]"))
                .field("expires_at", expires_at)
                .field("scope", scope)
                .finish(),
        }
    }
}

/// Stored OAuth credential for one user on one platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub user_id: String,
    pub platform: String,
    pub platform_user_id: String,
    pub email: Option<String>,
    pub secrets: Secrets,
    pub cached_handle: Option<String>,
    pub cached_handle_updated_at: Option<i64>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Credential {
    pub fn new(
        user_id: impl Into<String>,
        platform: impl Into<String>,
        platform_user_id: impl Into<String>,
        secrets: Secrets,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            user_id: user_id.into(),
            platform: platform.into(),
            platform_user_id: platform_user_id.into(),
            email: None,
            secrets,
            cached_handle: None,
            cached_handle_updated_at: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Cached handle, if it was refreshed less than `max_age_secs` ago
    pub fn fresh_handle(&self, now: i64, max_age_secs: i64) -> Option<&str> {
        match (&self.cached_handle, self.cached_handle_updated_at) {
            (Some(handle), Some(updated_at)) if now - updated_at < max_age_secs => Some(handle),
            _ => None,
        }
    }
}

/// One way of finding a credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialLookup {
    PlatformUserId(String),
    UserId(String),
    Email(String),
}

/// Who is publishing
///
/// Callers fill in whatever they know; lookups are tried in precedence order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub platform_user_id: Option<String>,
    pub user_id: Option<String>,
    pub email: Option<String>,
}

impl Identity {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Lookups in precedence order: platform account id, user id, email
    pub fn lookups(&self) -> Vec<CredentialLookup> {
        let mut lookups = Vec::with_capacity(3);
        if let Some(id) = &self.platform_user_id {
            lookups.push(CredentialLookup::PlatformUserId(id.clone()));
        }
        if let Some(id) = &self.user_id {
            lookups.push(CredentialLookup::UserId(id.clone()));
        }
        if let Some(email) = &self.email {
            lookups.push(CredentialLookup::Email(email.clone()));
        }
        lookups
    }

    /// Short description for logs and error messages
    pub fn describe(&self) -> String {
        self.user_id
            .as_deref()
            .or(self.email.as_deref())
            .or(self.platform_user_id.as_deref())
            .unwrap_or("anonymous")
            .to_string()
    }
}

// ============================================================================
// Publish requests and results
// ============================================================================

/// Content for one post
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostContent {
    pub captions: Vec<String>,
    pub hashtags: Vec<String>,
    pub media: Option<MediaRef>,
}

impl PostContent {
    pub fn text(caption: impl Into<String>) -> Self {
        Self {
            captions: vec![caption.into()],
            ..Default::default()
        }
    }

    /// Render captions and hashtags into the post body
    ///
    /// Captions are joined by blank lines; hashtags are normalized to `#tag`,
    /// de-duplicated and capped at `max_hashtags`.
    pub fn render(&self, max_hashtags: Option<usize>) -> String {
        let captions: Vec<&str> = self
            .captions
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect();

        let mut tags: Vec<String> = Vec::new();
        for tag in &self.hashtags {
            let bare = tag.trim().trim_start_matches('#').trim();
            if bare.is_empty() || bare.contains(char::is_whitespace) {
                continue;
            }
            let normalized = format!("#{}", bare);
            if !tags.contains(&normalized) {
                tags.push(normalized);
            }
        }
        if let Some(max) = max_hashtags {
            tags.truncate(max);
        }

        let body = captions.join("\n\n");
        let tag_line = tags.join(" ");
        match (body.is_empty(), tag_line.is_empty()) {
            (false, false) => format!("{}\n\n{}", body, tag_line),
            (false, true) => body,
            (true, false) => tag_line,
            (true, true) => String::new(),
        }
    }
}

/// Shared content for every target, or one slice per platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "content", rename_all = "snake_case")]
pub enum ContentMode {
    Unified(PostContent),
    Individual(HashMap<String, PostContent>),
}

impl ContentMode {
    /// The slice of content for one platform
    pub fn for_platform(&self, platform: &str) -> Option<&PostContent> {
        match self {
            Self::Unified(content) => Some(content),
            Self::Individual(map) => map.get(platform),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub identity: Identity,
    pub targets: Vec<String>,
    pub content: ContentMode,
}

impl PublishRequest {
    pub fn unified(identity: Identity, targets: Vec<String>, content: PostContent) -> Self {
        Self {
            identity,
            targets,
            content: ContentMode::Unified(content),
        }
    }
}

/// Outcome of publishing to one platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOutcome {
    pub platform: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    /// The media attempt failed and a text-only attempt was made
    #[serde(default)]
    pub used_fallback: bool,
}

impl PublishOutcome {
    pub fn success(platform: impl Into<String>, post_id: String, url: String) -> Self {
        Self {
            platform: platform.into(),
            success: true,
            post_id: Some(post_id),
            url: Some(url),
            error_message: None,
            error_kind: None,
            used_fallback: false,
        }
    }

    pub fn failure(platform: impl Into<String>, error: &PlatformError) -> Self {
        Self {
            platform: platform.into(),
            success: false,
            post_id: None,
            url: None,
            error_message: Some(error.to_string()),
            error_kind: Some(error.kind().to_string()),
            used_fallback: false,
        }
    }
}

/// Aggregated result of one publish request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResult {
    pub post_id: String,
    pub outcomes: Vec<PublishOutcome>,
}

impl PublishResult {
    pub fn new(outcomes: Vec<PublishOutcome>) -> Self {
        Self {
            post_id: Uuid::new_v4().to_string(),
            outcomes,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    pub fn all_succeeded(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(|o| o.success)
    }

    pub fn any_succeeded(&self) -> bool {
        self.outcomes.iter().any(|o| o.success)
    }

    /// Human summary, e.g. "Published to 2/3 platforms"
    pub fn summary(&self) -> String {
        format!(
            "Published to {}/{} platforms",
            self.succeeded(),
            self.outcomes.len()
        )
    }
}

// ============================================================================
// History
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Pending,
    Posted,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Posted => "posted",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "posted" => Self::Posted,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// A publish request as recorded in history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub user_id: Option<String>,
    pub content: String,
    pub created_at: i64,
    pub status: PostStatus,
}

/// One platform attempt as recorded in history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    pub id: Option<i64>,
    pub post_id: String,
    pub platform: String,
    pub platform_post_id: Option<String>,
    pub url: Option<String>,
    pub posted_at: Option<i64>,
    pub success: bool,
    pub used_fallback: bool,
    pub error_message: Option<String>,
}

/// Truncate to at most `limit` characters, respecting char boundaries
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_id_round_trip_names() {
        for platform in PlatformId::ALL {
            assert_eq!(platform.as_str().parse::<PlatformId>().unwrap(), platform);
        }
        assert_eq!("X".parse::<PlatformId>().unwrap(), PlatformId::Twitter);
        assert!("myspace".parse::<PlatformId>().is_err());
    }

    #[test]
    fn test_platform_metadata_limits() {
        assert_eq!(PlatformId::Twitter.metadata().max_characters, 280);
        assert_eq!(PlatformId::Facebook.metadata().max_characters, 63206);
        assert!(PlatformId::Instagram.metadata().requires_media);
        assert!(PlatformId::Youtube.metadata().requires_media);
        assert!(!PlatformId::Linkedin.metadata().requires_media);
        assert_eq!(
            PlatformId::Youtube.metadata().supported_media,
            &[MediaKind::Video]
        );
    }

    #[test]
    fn test_render_captions_and_hashtags() {
        let content = PostContent {
            captions: vec!["First".to_string(), "  ".to_string(), "Second ".to_string()],
            hashtags: vec![
                "rust".to_string(),
                "#async".to_string(),
                "rust".to_string(),
                "two words".to_string(),
                "".to_string(),
            ],
            media: None,
        };
        assert_eq!(content.render(None), "First\n\nSecond\n\n#rust #async");
        assert_eq!(content.render(Some(1)), "First\n\nSecond\n\n#rust");
    }

    #[test]
    fn test_render_hashtags_only() {
        let content = PostContent {
            captions: vec![],
            hashtags: vec!["launch".to_string()],
            media: None,
        };
        assert_eq!(content.render(None), "#launch");
        assert_eq!(PostContent::default().render(None), "");
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("héllo wörld", 7), "héllo w");
        assert_eq!(truncate_chars("🦀🦀🦀", 2), "🦀🦀");
        assert_eq!(truncate_chars("", 0), "");
    }

    #[test]
    fn test_identity_lookup_precedence() {
        let identity = Identity {
            platform_user_id: Some("12345".to_string()),
            user_id: Some("user-1".to_string()),
            email: Some("a@example.com".to_string()),
        };
        assert_eq!(
            identity.lookups(),
            vec![
                CredentialLookup::PlatformUserId("12345".to_string()),
                CredentialLookup::UserId("user-1".to_string()),
                CredentialLookup::Email("a@example.com".to_string()),
            ]
        );
        assert!(Identity::default().lookups().is_empty());
    }

    #[test]
    fn test_secrets_needs_refresh() {
        let secrets = Secrets::OAuth2 {
            access_token: "a".to_string(),
            refresh_token: Some("r".to_string()),
            expires_at: Some(1_000),
            scope: None,
        };
        assert!(secrets.needs_refresh(990, 60));
        assert!(!secrets.needs_refresh(900, 60));
        assert!(!Secrets::bearer("a").needs_refresh(i64::MAX - 100, 60));
    }

    #[test]
    fn test_secrets_debug_redacts_tokens() {
        let secrets = Secrets::OAuth2 {
            access_token: "super-secret".to_string(),
            refresh_token: Some("also-secret".to_string()),
            expires_at: None,
            scope: None,
        };
        let debug = format!("{:?}", secrets);
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("also-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_secrets_serde_shape() {
        let json = serde_json::to_value(Secrets::bearer("tok")).unwrap();
        assert_eq!(json["scheme"], "oauth2");
        assert_eq!(json["access_token"], "tok");
    }

    #[test]
    fn test_credential_fresh_handle_window() {
        let mut credential = Credential::new("u", "twitter", "1", Secrets::bearer("t"));
        assert_eq!(credential.fresh_handle(100, 86_400), None);

        credential.cached_handle = Some("crab".to_string());
        credential.cached_handle_updated_at = Some(100);
        assert_eq!(credential.fresh_handle(100 + 86_399, 86_400), Some("crab"));
        assert_eq!(credential.fresh_handle(100 + 86_400, 86_400), None);
    }

    #[test]
    fn test_publish_result_summary() {
        let result = PublishResult::new(vec![
            PublishOutcome::success("twitter", "1".to_string(), "u".to_string()),
            PublishOutcome::failure("facebook", &PlatformError::Posting("x".to_string())),
        ]);
        assert_eq!(result.summary(), "Published to 1/2 platforms");
        assert!(result.any_succeeded());
        assert!(!result.all_succeeded());
    }

    #[test]
    fn test_outcome_serializes_camel_case() {
        let outcome = PublishOutcome::failure(
            "facebook",
            &PlatformError::TokenExpired("code 190".to_string()),
        );
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["platform"], "facebook");
        assert_eq!(json["success"], false);
        assert_eq!(json["errorKind"], "token_expired");
        assert!(json.get("postId").is_none());
    }

    #[test]
    fn test_media_ref_debug_hides_bytes() {
        let media = MediaRef::bytes(vec![0u8; 2048], Some("clip.mp4".to_string()));
        let debug = format!("{:?}", media);
        assert!(debug.contains("2048"));
        assert!(debug.contains("clip.mp4"));
    }
}
