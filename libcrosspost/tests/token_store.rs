//! Adapters backed by the SQLite token store
//!
//! Credentials written by one `Database` handle must be visible after the
//! file is reopened, and handle caching must survive the round trip.

use anyhow::Result;
use libcrosspost::credentials::TokenStore;
use libcrosspost::db::Database;
use libcrosspost::media::MediaFetcher;
use libcrosspost::platforms::mock::{MockConfig, MockPlatform};
use libcrosspost::platforms::{Adapter, PlatformAdapter};
use libcrosspost::types::{DisconnectPolicy, Identity, Secrets};
use std::sync::Arc;
use tempfile::TempDir;

fn adapter(db: &Database, config: MockConfig) -> Adapter<MockPlatform> {
    Adapter::new(
        MockPlatform::new(config),
        Arc::new(db.clone()),
        MediaFetcher::new(reqwest::Client::new(), 1024),
    )
}

#[tokio::test]
async fn test_connection_survives_reopen() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("store.db").to_string_lossy().to_string();

    {
        let db = Database::new(&path).await?;
        let config = MockConfig::default();
        adapter(&db, config.clone())
            .connect("user-1", Some("one@example.com"), Secrets::bearer("secret"))
            .await?;
    }

    let db = Database::new(&path).await?;
    let config = MockConfig::default();
    let adapter = adapter(&db, config.clone());

    // Email-only identities still find the account
    let identity = Identity::default().with_email("one@example.com");
    assert_eq!(adapter.resolve_handle(&identity).await?, "mock_user");
    assert_eq!(config.calls.profile_lookups(), 0);

    let outcome = adapter.publish(&identity, "persisted", None).await;
    assert!(outcome.success);
    Ok(())
}

#[tokio::test]
async fn test_disconnect_policies_against_sqlite() -> Result<()> {
    let db = Database::in_memory().await?;

    let hard = MockConfig {
        name: "hard".to_string(),
        disconnect: DisconnectPolicy::Delete,
        ..Default::default()
    };
    let soft = MockConfig {
        name: "soft".to_string(),
        disconnect: DisconnectPolicy::Deactivate,
        ..Default::default()
    };
    let hard_adapter = adapter(&db, hard);
    let soft_adapter = adapter(&db, soft);

    hard_adapter.connect("user-1", None, Secrets::bearer("a")).await?;
    soft_adapter.connect("user-1", None, Secrets::bearer("b")).await?;

    assert!(hard_adapter.disconnect("user-1").await?);
    assert!(soft_adapter.disconnect("user-1").await?);
    assert!(!hard_adapter.disconnect("user-1").await?);

    let identity = Identity::user("user-1");
    assert!(db.find_for("hard", &identity).await?.is_none());
    assert!(db.find_for("soft", &identity).await?.is_none());

    // Reconnecting a deactivated platform reactivates the same record
    soft_adapter.connect("user-1", None, Secrets::bearer("c")).await?;
    let restored = db.find_for("soft", &identity).await?.expect("reactivated");
    assert!(restored.is_active);
    assert_eq!(restored.secrets.access_token(), Some("c"));
    Ok(())
}

#[tokio::test]
async fn test_publish_without_connection_reports_not_connected() -> Result<()> {
    let db = Database::in_memory().await?;
    let adapter = adapter(&db, MockConfig::default());

    let outcome = adapter
        .publish(&Identity::user("stranger"), "hello", None)
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.error_kind.as_deref(), Some("not_connected"));
    Ok(())
}

/// Token endpoint that issues a new access token without rotating the
/// refresh token
async fn refresh_server() -> String {
    use axum::routing::post;
    use axum::{Form, Json, Router};
    use std::collections::HashMap;

    let app = Router::new().route(
        "/token",
        post(|Form(form): Form<HashMap<String, String>>| async move {
            assert_eq!(form.get("grant_type").map(String::as_str), Some("refresh_token"));
            assert_eq!(form.get("refresh_token").map(String::as_str), Some("refresh-1"));
            Json(serde_json::json!({
                "access_token": "access-2",
                "expires_in": 3600
            }))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/token", addr)
}

#[tokio::test]
async fn test_expiring_token_is_refreshed_before_publish() -> Result<()> {
    use libcrosspost::config::PlatformConfig;
    use libcrosspost::oauth::OAuthClient;
    use libcrosspost::types::{Credential, PlatformId};
    use libcrosspost::MemoryTokenStore;

    let token_url = refresh_server().await;
    let platform_config: PlatformConfig = toml::from_str(&format!(
        "client_id = \"app\"\nclient_secret = \"secret\"\ntoken_url = \"{}\"\n",
        token_url
    ))?;
    let client = OAuthClient::from_config(
        PlatformId::Linkedin,
        &platform_config,
        "http://localhost/auth/linkedin/callback".to_string(),
        reqwest::Client::new(),
    );

    let store = Arc::new(MemoryTokenStore::new());
    let expired = Secrets::OAuth2 {
        access_token: "access-1".to_string(),
        refresh_token: Some("refresh-1".to_string()),
        expires_at: Some(chrono::Utc::now().timestamp() - 10),
        scope: None,
    };
    store
        .upsert(&Credential::new("user-1", "mock", "acct", expired))
        .await?;

    let adapter = Adapter::new(
        MockPlatform::new(MockConfig::default()),
        store.clone(),
        MediaFetcher::new(reqwest::Client::new(), 1024),
    )
    .with_oauth(Arc::new(client));

    let outcome = adapter
        .publish(&Identity::user("user-1"), "fresh token", None)
        .await;
    assert!(outcome.success, "{:?}", outcome.error_message);

    let stored = store.get("user-1", "mock").expect("credential kept");
    assert_eq!(stored.secrets.access_token(), Some("access-2"));
    assert_eq!(stored.secrets.refresh_token(), Some("refresh-1"));
    assert!(!stored
        .secrets
        .needs_refresh(chrono::Utc::now().timestamp(), 60));
    Ok(())
}

#[tokio::test]
async fn test_handle_lookup_does_not_clobber_rotated_secrets() -> Result<()> {
    use libcrosspost::types::CredentialLookup;
    use std::time::Duration;

    let db = Database::in_memory().await?;
    let config = MockConfig {
        delay: Duration::from_millis(100),
        ..Default::default()
    };
    let adapter = adapter(&db, config.clone());
    let mut credential = adapter
        .connect("user-1", None, Secrets::bearer("access-1"))
        .await?;
    credential.cached_handle_updated_at = Some(0);
    db.upsert(&credential).await?;

    let lookup = CredentialLookup::UserId("user-1".to_string());
    let rotate = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let mut rotated = db.find("mock", &lookup).await?.expect("connected");
        rotated.secrets = Secrets::bearer("access-2");
        db.upsert(&rotated).await
    };
    let identity = Identity::user("user-1");
    let (handle, rotated) = tokio::join!(adapter.resolve_handle(&identity), rotate);
    assert_eq!(handle?, "mock_user");
    rotated?;

    let stored = db.find("mock", &lookup).await?.expect("connected");
    assert_eq!(stored.secrets.access_token(), Some("access-2"));
    assert_eq!(stored.cached_handle.as_deref(), Some("mock_user"));
    assert!(stored.cached_handle_updated_at.unwrap_or(0) > 0);
    Ok(())
}
