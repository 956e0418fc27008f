//! Shared application state

use std::collections::HashMap;
use std::sync::Arc;

use libcrosspost::config::{Config, PublishConfig};
use libcrosspost::credentials::TokenStore;
use libcrosspost::db::Database;
use libcrosspost::oauth::{OAuthClient, OAuthStateStore};
use libcrosspost::poster::{build_http_client, create_adapters, create_oauth_clients};
use libcrosspost::types::PlatformId;
use libcrosspost::{MultiPlatformPoster, Result};

#[derive(Clone)]
pub struct AppState {
    pub poster: Arc<MultiPlatformPoster>,
    pub store: Arc<dyn TokenStore>,
    pub oauth: Arc<HashMap<PlatformId, Arc<OAuthClient>>>,
    pub pending: Arc<OAuthStateStore>,
    /// Post history; `GET /posts/{id}` answers 404 without it
    pub history: Option<Database>,
    /// Largest accepted `POST /publish` body
    pub body_limit: usize,
}

impl AppState {
    pub fn new(
        poster: MultiPlatformPoster,
        store: Arc<dyn TokenStore>,
        oauth: HashMap<PlatformId, Arc<OAuthClient>>,
        pending: OAuthStateStore,
    ) -> Self {
        Self {
            poster: Arc::new(poster),
            store,
            oauth: Arc::new(oauth),
            pending: Arc::new(pending),
            history: None,
            body_limit: PublishConfig::default().request_body_limit(),
        }
    }

    pub fn with_history(mut self, db: Database) -> Self {
        self.history = Some(db);
        self
    }

    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// Wire everything up from configuration
    ///
    /// The SQLite database doubles as token store and post history.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let db = Database::new(&config.database.path).await?;
        let store: Arc<dyn TokenStore> = Arc::new(db.clone());
        let http = build_http_client(config)?;

        let oauth = create_oauth_clients(config, &http);
        let adapters = create_adapters(config, store.clone(), &http, &oauth);
        let poster = MultiPlatformPoster::new(adapters)
            .with_timeout(config.publish.adapter_timeout())
            .with_history(db.clone());

        Ok(Self::new(
            poster,
            store,
            oauth,
            OAuthStateStore::new(config.oauth.state_ttl()),
        )
        .with_history(db)
        .with_body_limit(config.publish.request_body_limit()))
    }
}
