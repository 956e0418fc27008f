//! Multi-platform publish orchestration
//!
//! [`MultiPlatformPoster`] validates a [`PublishRequest`], renders each
//! target's content, dispatches every target concurrently on its own task and
//! collects one outcome per target in request order.

use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::credentials::TokenStore;
use crate::db::Database;
use crate::error::{CrosspostError, PlatformError, Result};
use crate::events::{Event, EventBus};
use crate::media::MediaFetcher;
use crate::oauth::OAuthClient;
use crate::platforms::facebook::FacebookPlatform;
use crate::platforms::instagram::InstagramPlatform;
use crate::platforms::linkedin::LinkedInPlatform;
use crate::platforms::tiktok::TikTokPlatform;
use crate::platforms::twitter::TwitterPlatform;
use crate::platforms::youtube::YouTubePlatform;
use crate::platforms::{Adapter, Platform, PlatformAdapter};
use crate::types::{
    Identity, MediaRef, PlatformId, Post, PostRecord, PostStatus, PublishOutcome, PublishRequest,
    PublishResult,
};

/// Default bound on one platform's whole publish sequence
pub const DEFAULT_ADAPTER_TIMEOUT: Duration = Duration::from_secs(120);

/// One validated target, ready to dispatch
#[derive(Debug, Clone)]
struct PreparedTarget {
    platform: String,
    text: String,
    media: Option<MediaRef>,
}

/// Fans a publish request out to platform adapters
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use libcrosspost::platforms::mock::MockAdapter;
/// use libcrosspost::poster::MultiPlatformPoster;
/// use libcrosspost::types::{Identity, PostContent, PublishRequest};
///
/// # async fn example() -> libcrosspost::error::Result<()> {
/// let poster = MultiPlatformPoster::new(vec![
///     Arc::new(MockAdapter::success("twitterlike")),
///     Arc::new(MockAdapter::success("facebooklike")),
/// ]);
///
/// let request = PublishRequest::unified(
///     Identity::user("user-1"),
///     vec!["twitterlike".to_string(), "facebooklike".to_string()],
///     PostContent::text("hi"),
/// );
///
/// let result = poster.publish(request).await?;
/// println!("{}", result.summary());
/// # Ok(())
/// # }
/// ```
pub struct MultiPlatformPoster {
    adapters: HashMap<String, Arc<dyn PlatformAdapter>>,
    timeout: Duration,
    db: Option<Database>,
    events: EventBus,
}

impl MultiPlatformPoster {
    pub fn new(adapters: Vec<Arc<dyn PlatformAdapter>>) -> Self {
        let adapters = adapters
            .into_iter()
            .map(|adapter| (adapter.name().to_string(), adapter))
            .collect();

        Self {
            adapters,
            timeout: DEFAULT_ADAPTER_TIMEOUT,
            db: None,
            events: EventBus::default(),
        }
    }

    /// Bound each target's dispatch; an overrun becomes a failed outcome
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Record every request and its outcomes in post history
    pub fn with_history(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    pub fn adapter(&self, name: &str) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.get(name).cloned()
    }

    /// Names of the registered adapters, sorted
    pub fn platforms(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Validate, dispatch to every target concurrently and aggregate
    ///
    /// # Errors
    ///
    /// `CrosspostError::Validation` when the request is rejected. No adapter
    /// is called in that case. Platform failures never surface here; they
    /// are reported in the per-target outcomes.
    pub async fn publish(&self, request: PublishRequest) -> Result<PublishResult> {
        let prepared = match self.prepare(&request) {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(error = %e, "Publish request rejected");
                self.events.emit(Event::PublishRejected {
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        let mut result = PublishResult::new(Vec::new());
        let post_id = result.post_id.clone();

        info!(
            post_id = %post_id,
            targets = ?request.targets,
            user = %request.identity.describe(),
            "Publishing"
        );
        self.events.emit(Event::PublishStarted {
            post_id: post_id.clone(),
            platforms: request.targets.clone(),
        });
        self.record_post(&post_id, &request.identity, &prepared).await;

        let handles: Vec<(String, Option<JoinHandle<PublishOutcome>>)> = prepared
            .into_iter()
            .map(|target| {
                let handle = self.spawn_dispatch(&request.identity, &target);
                (target.platform, handle)
            })
            .collect();

        let outcomes = join_all(handles.into_iter().map(|(platform, handle)| {
            let events = self.events.clone();
            let post_id = post_id.clone();
            async move {
                let outcome = collect_outcome(platform, handle).await;
                events.emit(Event::PlatformCompleted {
                    post_id,
                    outcome: outcome.clone(),
                });
                outcome
            }
        }))
        .await;

        result.outcomes = outcomes;
        self.record_outcomes(&result).await;

        info!(post_id = %post_id, "{}", result.summary());
        self.events.emit(Event::PublishCompleted {
            post_id,
            succeeded: result.succeeded(),
            total: result.outcomes.len(),
        });

        Ok(result)
    }

    /// Run every pre-dispatch check and render each target's text
    fn prepare(&self, request: &PublishRequest) -> Result<Vec<PreparedTarget>> {
        if request.targets.is_empty() {
            return Err(CrosspostError::Validation(
                "at least one platform must be selected".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for target in &request.targets {
            if !seen.insert(target.as_str()) {
                return Err(CrosspostError::Validation(format!(
                    "platform {} is selected more than once",
                    target
                )));
            }
        }

        let mut prepared = Vec::with_capacity(request.targets.len());
        for target in &request.targets {
            let content = request.content.for_platform(target).ok_or_else(|| {
                CrosspostError::Validation(format!("no content provided for {}", target))
            })?;

            let adapter = self.adapters.get(target);
            // Known platforms keep their media rule even without an adapter
            let known = target.parse::<PlatformId>().ok().map(|id| id.metadata());
            let requires_media = match adapter {
                Some(a) => a.requires_media(),
                None => known.as_ref().is_some_and(|m| m.requires_media),
            };
            if requires_media && content.media.is_none() {
                return Err(CrosspostError::Validation(format!(
                    "{} requires an image or video",
                    target
                )));
            }

            let max_hashtags = match adapter {
                Some(a) => a.max_hashtags(),
                None => known.as_ref().map(|m| m.max_hashtags),
            };
            let text = content.render(max_hashtags);
            if text.trim().is_empty() && content.media.is_none() {
                return Err(CrosspostError::Validation(format!(
                    "post for {} has no text or media",
                    target
                )));
            }

            prepared.push(PreparedTarget {
                platform: target.clone(),
                text,
                media: content.media.clone(),
            });
        }

        Ok(prepared)
    }

    /// Spawn the target's adapter call; `None` for unknown platforms
    fn spawn_dispatch(
        &self,
        identity: &Identity,
        target: &PreparedTarget,
    ) -> Option<JoinHandle<PublishOutcome>> {
        let adapter = self.adapters.get(&target.platform)?.clone();
        let identity = identity.clone();
        let target = target.clone();
        let platform = target.platform.clone();
        let timeout = self.timeout;

        Some(tokio::spawn(async move {
            let publish = adapter.publish(&identity, &target.text, target.media.as_ref());
            match tokio::time::timeout(timeout, publish).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(platform = %platform, ?timeout, "Publish timed out");
                    PublishOutcome::failure(
                        platform,
                        &PlatformError::Network(format!(
                            "timed out after {}s",
                            timeout.as_secs_f64()
                        )),
                    )
                }
            }
        }))
    }

    async fn record_post(&self, post_id: &str, identity: &Identity, prepared: &[PreparedTarget]) {
        let Some(db) = &self.db else {
            return;
        };

        let post = Post {
            id: post_id.to_string(),
            user_id: identity.user_id.clone(),
            content: prepared
                .first()
                .map(|target| target.text.clone())
                .unwrap_or_default(),
            created_at: chrono::Utc::now().timestamp(),
            status: PostStatus::Pending,
        };

        if let Err(e) = db.create_post(&post).await {
            warn!("Failed to create post record in database: {}", e);
        }
    }

    async fn record_outcomes(&self, result: &PublishResult) {
        let Some(db) = &self.db else {
            return;
        };
        let now = chrono::Utc::now().timestamp();

        for outcome in &result.outcomes {
            let record = PostRecord {
                id: None,
                post_id: result.post_id.clone(),
                platform: outcome.platform.clone(),
                platform_post_id: outcome.post_id.clone(),
                url: outcome.url.clone(),
                posted_at: outcome.success.then_some(now),
                success: outcome.success,
                used_fallback: outcome.used_fallback,
                error_message: outcome.error_message.clone(),
            };

            if let Err(e) = db.create_post_record(&record).await {
                warn!(
                    "Failed to record result for platform {}: {}",
                    outcome.platform, e
                );
            }
        }

        // Partial success still counts as posted
        let status = if result.any_succeeded() {
            PostStatus::Posted
        } else {
            PostStatus::Failed
        };

        if let Err(e) = db.update_post_status(&result.post_id, status).await {
            warn!("Failed to update post status: {}", e);
        }
    }
}

async fn collect_outcome(
    platform: String,
    handle: Option<JoinHandle<PublishOutcome>>,
) -> PublishOutcome {
    let Some(handle) = handle else {
        let error = PlatformError::NotConnected(format!("unsupported platform: {}", platform));
        return PublishOutcome::failure(platform, &error);
    };

    match handle.await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(platform = %platform, error = %e, "Publish task failed");
            PublishOutcome::failure(
                platform,
                &PlatformError::Internal(format!("publish task failed: {}", e)),
            )
        }
    }
}

// ============================================================================
// Construction from configuration
// ============================================================================

/// Shared HTTP client for vendor calls, bounded by the configured timeout
pub fn build_http_client(config: &Config) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.publish.http_timeout())
        .user_agent(concat!("crosspost/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PlatformError::Network(format!("failed to build HTTP client: {}", e)).into())
}

/// OAuth clients for every enabled platform
pub fn create_oauth_clients(
    config: &Config,
    http: &reqwest::Client,
) -> HashMap<PlatformId, Arc<OAuthClient>> {
    config
        .enabled_platforms()
        .into_iter()
        .filter_map(|id| {
            let platform_config = config.platform(id)?;
            let client = OAuthClient::from_config(
                id,
                platform_config,
                config.oauth.redirect_uri(id),
                http.clone(),
            );
            Some((id, Arc::new(client)))
        })
        .collect()
}

/// Adapters for every enabled platform
///
/// Each adapter gets the shared token store and, when present, the
/// platform's OAuth client for token refresh.
pub fn create_adapters(
    config: &Config,
    store: Arc<dyn TokenStore>,
    http: &reqwest::Client,
    oauth_clients: &HashMap<PlatformId, Arc<OAuthClient>>,
) -> Vec<Arc<dyn PlatformAdapter>> {
    let mut adapters: Vec<Arc<dyn PlatformAdapter>> = Vec::new();

    for id in config.enabled_platforms() {
        let Some(platform_config) = config.platform(id) else {
            continue;
        };
        let media = MediaFetcher::new(http.clone(), config.publish.max_media_bytes);

        let adapter: Arc<dyn PlatformAdapter> = match id {
            PlatformId::Twitter => wrap(
                config,
                TwitterPlatform::new(platform_config, http.clone()),
                &store,
                media,
                oauth_clients.get(&id),
            ),
            PlatformId::Linkedin => wrap(
                config,
                LinkedInPlatform::new(platform_config, http.clone()),
                &store,
                media,
                oauth_clients.get(&id),
            ),
            PlatformId::Instagram => wrap(
                config,
                InstagramPlatform::new(platform_config, http.clone()),
                &store,
                media,
                oauth_clients.get(&id),
            ),
            PlatformId::Facebook => wrap(
                config,
                FacebookPlatform::new(platform_config, http.clone()),
                &store,
                media,
                oauth_clients.get(&id),
            ),
            PlatformId::Tiktok => wrap(
                config,
                TikTokPlatform::new(platform_config, http.clone()),
                &store,
                media,
                oauth_clients.get(&id),
            ),
            PlatformId::Youtube => wrap(
                config,
                YouTubePlatform::new(platform_config, http.clone()),
                &store,
                media,
                oauth_clients.get(&id),
            ),
        };

        info!(platform = %id, "Platform enabled");
        adapters.push(adapter);
    }

    adapters
}

fn wrap<P: Platform + 'static>(
    config: &Config,
    platform: P,
    store: &Arc<dyn TokenStore>,
    media: MediaFetcher,
    oauth: Option<&Arc<OAuthClient>>,
) -> Arc<dyn PlatformAdapter> {
    let mut adapter = Adapter::new(platform, store.clone(), media)
        .with_handle_ttl(config.publish.handle_cache_secs);
    if let Some(client) = oauth {
        adapter = adapter.with_oauth(client.clone());
    }
    Arc::new(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryTokenStore;
    use crate::platforms::mock::MockAdapter;
    use crate::types::{ContentMode, PostContent};

    fn request(targets: &[&str], content: PostContent) -> PublishRequest {
        PublishRequest::unified(
            Identity::user("user-1"),
            targets.iter().map(|t| t.to_string()).collect(),
            content,
        )
    }

    #[tokio::test]
    async fn test_outcomes_follow_target_order() {
        let poster = MultiPlatformPoster::new(vec![
            Arc::new(MockAdapter::success("a").with_delay(Duration::from_millis(30))),
            Arc::new(MockAdapter::success("b")),
            Arc::new(MockAdapter::success("c").with_delay(Duration::from_millis(10))),
        ]);

        let result = poster
            .publish(request(&["c", "a", "b"], PostContent::text("hi")))
            .await
            .unwrap();

        let platforms: Vec<&str> = result.outcomes.iter().map(|o| o.platform.as_str()).collect();
        assert_eq!(platforms, vec!["c", "a", "b"]);
        assert!(result.all_succeeded());
    }

    #[tokio::test]
    async fn test_empty_targets_rejected() {
        let poster = MultiPlatformPoster::new(vec![Arc::new(MockAdapter::success("a"))]);
        let error = poster
            .publish(request(&[], PostContent::text("hi")))
            .await
            .unwrap_err();
        assert_eq!(error.exit_code(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_targets_rejected() {
        let adapter = Arc::new(MockAdapter::success("a"));
        let poster = MultiPlatformPoster::new(vec![adapter.clone()]);

        let result = poster
            .publish(request(&["a", "a"], PostContent::text("hi")))
            .await;

        assert!(matches!(result, Err(CrosspostError::Validation(_))));
        assert_eq!(adapter.publish_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_individual_slice_rejected() {
        let adapter = Arc::new(MockAdapter::success("a"));
        let poster = MultiPlatformPoster::new(vec![adapter.clone(), Arc::new(MockAdapter::success("b"))]);

        let mut slices = HashMap::new();
        slices.insert("a".to_string(), PostContent::text("only a"));
        let request = PublishRequest {
            identity: Identity::user("user-1"),
            targets: vec!["a".to_string(), "b".to_string()],
            content: ContentMode::Individual(slices),
        };

        let result = poster.publish(request).await;
        assert!(matches!(result, Err(CrosspostError::Validation(_))));
        assert_eq!(adapter.publish_count(), 0);
    }

    #[tokio::test]
    async fn test_individual_mode_sends_each_slice() {
        let a = Arc::new(MockAdapter::success("a"));
        let b = Arc::new(MockAdapter::success("b"));
        let poster = MultiPlatformPoster::new(vec![a.clone(), b.clone()]);

        let mut slices = HashMap::new();
        slices.insert("a".to_string(), PostContent::text("for a"));
        slices.insert("b".to_string(), PostContent::text("for b"));
        let request = PublishRequest {
            identity: Identity::user("user-1"),
            targets: vec!["a".to_string(), "b".to_string()],
            content: ContentMode::Individual(slices),
        };

        poster.publish(request).await.unwrap();
        assert_eq!(a.published()[0].text, "for a");
        assert_eq!(b.published()[0].text, "for b");
    }

    #[tokio::test]
    async fn test_empty_content_rejected() {
        let poster = MultiPlatformPoster::new(vec![Arc::new(MockAdapter::success("a"))]);
        let content = PostContent {
            captions: vec!["   ".to_string()],
            ..Default::default()
        };
        let result = poster.publish(request(&["a"], content)).await;
        assert!(matches!(result, Err(CrosspostError::Validation(_))));
    }

    #[tokio::test]
    async fn test_hashtags_capped_per_adapter() {
        let capped = Arc::new(MockAdapter::success("capped").with_max_hashtags(1));
        let open = Arc::new(MockAdapter::success("open"));
        let poster = MultiPlatformPoster::new(vec![capped.clone(), open.clone()]);

        let content = PostContent {
            captions: vec!["hello".to_string()],
            hashtags: vec!["rust".to_string(), "#tokio".to_string()],
            media: None,
        };
        poster.publish(request(&["capped", "open"], content)).await.unwrap();

        assert_eq!(capped.published()[0].text, "hello\n\n#rust");
        assert_eq!(open.published()[0].text, "hello\n\n#rust #tokio");
    }

    #[tokio::test]
    async fn test_timeout_becomes_failed_outcome() {
        let poster = MultiPlatformPoster::new(vec![
            Arc::new(MockAdapter::success("slow").with_delay(Duration::from_secs(5))),
            Arc::new(MockAdapter::success("fast")),
        ])
        .with_timeout(Duration::from_millis(50));

        let result = poster
            .publish(request(&["slow", "fast"], PostContent::text("hi")))
            .await
            .unwrap();

        assert!(!result.outcomes[0].success);
        assert_eq!(result.outcomes[0].error_kind.as_deref(), Some("network"));
        assert!(result.outcomes[1].success);
    }

    #[tokio::test]
    async fn test_events_emitted() {
        let poster = MultiPlatformPoster::new(vec![Arc::new(MockAdapter::success("a"))]);
        let mut receiver = poster.event_bus().subscribe();

        let result = poster
            .publish(request(&["a"], PostContent::text("hi")))
            .await
            .unwrap();

        assert!(matches!(receiver.recv().await.unwrap(), Event::PublishStarted { .. }));
        match receiver.recv().await.unwrap() {
            Event::PlatformCompleted { post_id, outcome } => {
                assert_eq!(post_id, result.post_id);
                assert!(outcome.success);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match receiver.recv().await.unwrap() {
            Event::PublishCompleted { succeeded, total, .. } => {
                assert_eq!((succeeded, total), (1, 1));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejection_event_emitted() {
        let poster = MultiPlatformPoster::new(vec![]);
        let mut receiver = poster.event_bus().subscribe();

        let _ = poster.publish(request(&[], PostContent::text("hi"))).await;

        assert!(matches!(
            receiver.recv().await.unwrap(),
            Event::PublishRejected { .. }
        ));
    }

    #[test]
    fn test_create_adapters_for_enabled_platforms() {
        let config = Config::from_toml(
            r#"
[twitter]
client_id = "tw"

[youtube]
client_id = "yt"

[tiktok]
enabled = false
client_id = "tt"
"#,
        )
        .unwrap();
        let http = reqwest::Client::new();
        let oauth = create_oauth_clients(&config, &http);
        let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());

        let adapters = create_adapters(&config, store, &http, &oauth);

        let names: Vec<&str> = adapters.iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["twitter", "youtube"]);
        assert_eq!(oauth.len(), 2);
        assert!(!adapters[0].requires_media());
        assert!(adapters[1].requires_media());
    }
}
