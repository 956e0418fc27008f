//! Mock platforms for testing
//!
//! - [`MockPlatform`]: a scripted vendor [`Platform`], wrapped in an
//!   [`Adapter`](super::Adapter) to exercise the shared adapter behavior
//! - [`MockAdapter`]: a scripted [`PlatformAdapter`] for orchestrator tests,
//!   with configurable outcome, delay and panics
//!
//! Both record their calls so tests can assert how often each step ran.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{PlatformError, PlatformResult};
use crate::media::MediaPayload;
use crate::platforms::{Platform, PlatformAdapter, Profile};
use crate::types::{
    Credential, DisconnectPolicy, Identity, MediaKind, MediaRef, PlatformMetadata,
    PublishOutcome,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Shared call log, cloned into the mock and kept by the test
#[derive(Debug, Clone, Default)]
pub struct MockCalls {
    profile_lookups: Arc<Mutex<usize>>,
    media_posts: Arc<Mutex<usize>>,
    text_posts: Arc<Mutex<usize>>,
    posted_text: Arc<Mutex<Vec<String>>>,
}

impl MockCalls {
    pub fn profile_lookups(&self) -> usize {
        *lock(&self.profile_lookups)
    }

    /// Calls that reached `post_with_media`
    pub fn media_posts(&self) -> usize {
        *lock(&self.media_posts)
    }

    /// Calls to `create_post` without a media handle
    pub fn text_posts(&self) -> usize {
        *lock(&self.text_posts)
    }

    /// Text of every text-only post attempt
    pub fn posted_text(&self) -> Vec<String> {
        lock(&self.posted_text).clone()
    }
}

/// Configuration for mock platform behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub name: String,
    pub character_limit: usize,
    pub requires_media: bool,
    pub supported_media: &'static [MediaKind],
    pub disconnect: DisconnectPolicy,
    pub account_id: String,
    pub handle: String,
    /// Returned by `fetch_profile` instead of the profile
    pub profile_error: Option<PlatformError>,
    /// Returned by `post_with_media`
    pub media_error: Option<PlatformError>,
    /// Returned by text-only `create_post`
    pub post_error: Option<PlatformError>,
    pub permalink_error: Option<PlatformError>,
    /// Simulated vendor latency per call
    pub delay: Duration,
    pub calls: MockCalls,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            character_limit: 280,
            requires_media: false,
            supported_media: &[MediaKind::Image, MediaKind::ImageGif, MediaKind::Video],
            disconnect: DisconnectPolicy::Delete,
            account_id: "mock-account".to_string(),
            handle: "mock_user".to_string(),
            profile_error: None,
            media_error: None,
            post_error: None,
            permalink_error: None,
            delay: Duration::ZERO,
            calls: MockCalls::default(),
        }
    }
}

/// Scripted vendor platform
pub struct MockPlatform {
    config: MockConfig,
    next_id: Mutex<usize>,
}

impl MockPlatform {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            next_id: Mutex::new(0),
        }
    }

    /// Mock that succeeds at everything
    pub fn success(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            ..Default::default()
        })
    }

    pub fn calls(&self) -> &MockCalls {
        &self.config.calls
    }

    async fn simulate_latency(&self) {
        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }
    }

    fn next_post_id(&self) -> String {
        let mut next = lock(&self.next_id);
        *next += 1;
        format!("{}-post-{}", self.config.name, *next)
    }
}

#[async_trait]
impl Platform for MockPlatform {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn metadata(&self) -> PlatformMetadata {
        PlatformMetadata {
            max_characters: self.config.character_limit,
            max_hashtags: 30,
            requires_media: self.config.requires_media,
            supported_media: self.config.supported_media,
            disconnect: self.config.disconnect,
        }
    }

    async fn fetch_profile(&self, _credential: &Credential) -> PlatformResult<Profile> {
        *lock(&self.config.calls.profile_lookups) += 1;
        self.simulate_latency().await;

        match &self.config.profile_error {
            Some(error) => Err(error.clone()),
            None => Ok(Profile {
                id: self.config.account_id.clone(),
                handle: self.config.handle.clone(),
            }),
        }
    }

    async fn create_post(
        &self,
        _credential: &Credential,
        text: &str,
        media_id: Option<&str>,
    ) -> PlatformResult<String> {
        if media_id.is_none() {
            *lock(&self.config.calls.text_posts) += 1;
            lock(&self.config.calls.posted_text).push(text.to_string());
        }
        self.simulate_latency().await;

        match &self.config.post_error {
            Some(error) => Err(error.clone()),
            None => Ok(self.next_post_id()),
        }
    }

    async fn post_with_media(
        &self,
        _credential: &Credential,
        _text: &str,
        _media: &MediaPayload,
    ) -> PlatformResult<String> {
        *lock(&self.config.calls.media_posts) += 1;
        self.simulate_latency().await;

        match &self.config.media_error {
            Some(error) => Err(error.clone()),
            None => Ok(self.next_post_id()),
        }
    }

    async fn permalink(
        &self,
        _credential: &Credential,
        post_id: &str,
    ) -> PlatformResult<Option<String>> {
        match &self.config.permalink_error {
            Some(error) => Err(error.clone()),
            None => Ok(Some(format!("https://mock.example/posts/{}", post_id))),
        }
    }

    fn fallback_url(&self, _credential: &Credential, post_id: &str) -> String {
        format!("https://mock.example/fallback/{}", post_id)
    }
}

/// What a [`MockAdapter`] does when asked to publish
#[derive(Debug, Clone)]
pub enum MockBehavior {
    Succeed,
    Fail(PlatformError),
    Panic,
}

/// One recorded `publish` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishCall {
    pub text: String,
    pub had_media: bool,
}

/// Scripted adapter for orchestrator tests
pub struct MockAdapter {
    name: String,
    requires_media: bool,
    max_hashtags: Option<usize>,
    behavior: MockBehavior,
    delay: Duration,
    calls: Arc<Mutex<Vec<PublishCall>>>,
}

impl MockAdapter {
    pub fn new(name: &str, behavior: MockBehavior) -> Self {
        Self {
            name: name.to_string(),
            requires_media: false,
            max_hashtags: None,
            behavior,
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn success(name: &str) -> Self {
        Self::new(name, MockBehavior::Succeed)
    }

    pub fn failure(name: &str, error: PlatformError) -> Self {
        Self::new(name, MockBehavior::Fail(error))
    }

    pub fn panicking(name: &str) -> Self {
        Self::new(name, MockBehavior::Panic)
    }

    pub fn requiring_media(mut self) -> Self {
        self.requires_media = true;
        self
    }

    pub fn with_max_hashtags(mut self, max: usize) -> Self {
        self.max_hashtags = Some(max);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Handle to the call log that outlives the adapter
    pub fn call_log(&self) -> Arc<Mutex<Vec<PublishCall>>> {
        self.calls.clone()
    }

    pub fn publish_count(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn published(&self) -> Vec<PublishCall> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl PlatformAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires_media(&self) -> bool {
        self.requires_media
    }

    fn max_hashtags(&self) -> Option<usize> {
        self.max_hashtags
    }

    async fn publish(
        &self,
        _identity: &Identity,
        text: &str,
        media: Option<&MediaRef>,
    ) -> PublishOutcome {
        lock(&self.calls).push(PublishCall {
            text: text.to_string(),
            had_media: media.is_some(),
        });

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        match &self.behavior {
            MockBehavior::Succeed => {
                let post_id = format!("{}-{}", self.name, uuid::Uuid::new_v4());
                let url = format!("https://{}.example/{}", self.name, post_id);
                PublishOutcome::success(self.name.clone(), post_id, url)
            }
            MockBehavior::Fail(error) => PublishOutcome::failure(self.name.clone(), error),
            MockBehavior::Panic => panic!("mock adapter {} panicked", self.name),
        }
    }
}
