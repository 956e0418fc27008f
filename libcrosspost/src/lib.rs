//! Crosspost - publish one post to many social platforms
//!
//! This library holds everything the `cross-serve` HTTP API and the
//! `cross-post` CLI share: configuration, the credential store, platform
//! adapters and the publish orchestrator.

pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod events;
pub mod logging;
pub mod media;
pub mod oauth;
pub mod platforms;
pub mod poster;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use credentials::{MemoryTokenStore, TokenStore};
pub use db::{Database, PostWithRecords};
pub use error::{CrosspostError, PlatformError, Result};
pub use poster::MultiPlatformPoster;
pub use types::{
    ContentMode, Identity, MediaRef, PlatformId, Post, PostContent, PostRecord, PostStatus,
    PublishOutcome, PublishRequest, PublishResult,
};
