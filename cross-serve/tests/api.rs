//! HTTP API tests
//!
//! Requests go through the real router with mock platforms behind it.
//! The OAuth flow runs against a local token endpoint.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::response::Json;
use axum::routing::post;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use axum::Router;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use cross_serve::{router, AppState};
use libcrosspost::config::PlatformConfig;
use libcrosspost::credentials::TokenStore;
use libcrosspost::db::Database;
use libcrosspost::media::MediaFetcher;
use libcrosspost::oauth::{OAuthClient, OAuthStateStore};
use libcrosspost::platforms::mock::{MockConfig, MockPlatform};
use libcrosspost::platforms::{Adapter, PlatformAdapter};
use libcrosspost::types::{PlatformId, Secrets};
use libcrosspost::{MultiPlatformPoster, PlatformError};

struct Harness {
    state: AppState,
    twitter: Arc<Adapter<MockPlatform>>,
}

fn mock_adapter(store: &Arc<dyn TokenStore>, config: MockConfig) -> Arc<Adapter<MockPlatform>> {
    Arc::new(Adapter::new(
        MockPlatform::new(config),
        store.clone(),
        MediaFetcher::new(reqwest::Client::new(), 8 * 1024 * 1024),
    ))
}

async fn harness(oauth: HashMap<PlatformId, Arc<OAuthClient>>) -> Harness {
    let db = Database::in_memory().await.unwrap();
    let store: Arc<dyn TokenStore> = Arc::new(db.clone());

    let twitter = mock_adapter(
        &store,
        MockConfig {
            name: "twitter".to_string(),
            ..Default::default()
        },
    );
    let facebook = mock_adapter(
        &store,
        MockConfig {
            name: "facebook".to_string(),
            post_error: Some(PlatformError::Posting("page is read-only".to_string())),
            ..Default::default()
        },
    );

    let adapters: Vec<Arc<dyn PlatformAdapter>> = vec![twitter.clone(), facebook];
    let poster = MultiPlatformPoster::new(adapters)
        .with_timeout(Duration::from_secs(5))
        .with_history(db.clone());

    let state = AppState::new(
        poster,
        store,
        oauth,
        OAuthStateStore::new(Duration::from_secs(600)),
    )
    .with_history(db);

    Harness { state, twitter }
}

async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
    let response = router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str, user: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, user: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-user-id", user)
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_lists_platforms() {
    let h = harness(HashMap::new()).await;
    let (status, body) = send(&h.state, get("/health", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["platforms"], json!(["facebook", "twitter"]));
}

#[tokio::test]
async fn test_publish_requires_user_header() {
    let h = harness(HashMap::new()).await;
    let request = Request::builder()
        .method("POST")
        .uri("/publish")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"platforms": ["twitter"], "content": {"captions": ["hi"]}}).to_string(),
        ))
        .unwrap();

    let (status, body) = send(&h.state, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_publish_rejects_empty_targets() {
    let h = harness(HashMap::new()).await;
    let (status, body) = send(
        &h.state,
        post_json(
            "/publish",
            "user-1",
            json!({"platforms": [], "content": {"captions": ["hi"]}}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "bad_request");
}

#[tokio::test]
async fn test_publish_reports_each_platform_and_records_history() {
    let h = harness(HashMap::new()).await;
    h.twitter
        .connect("user-1", None, Secrets::bearer("tok"))
        .await
        .unwrap();
    h.state
        .poster
        .adapter("facebook")
        .unwrap()
        .connect("user-1", None, Secrets::bearer("tok"))
        .await
        .unwrap();

    let (status, body) = send(
        &h.state,
        post_json(
            "/publish",
            "user-1",
            json!({
                "platforms": ["X", "facebook", "myspace"],
                "content": {"captions": ["Hello"], "hashtags": ["rust"]},
                "isIndividualMode": false
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let outcomes = body["post"]["platforms"].as_array().unwrap();
    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0]["platform"], "twitter");
    assert_eq!(outcomes[0]["success"], true);
    assert_eq!(outcomes[1]["platform"], "facebook");
    assert_eq!(outcomes[1]["success"], false);
    assert_eq!(outcomes[1]["errorKind"], "post_failed");
    assert_eq!(outcomes[2]["platform"], "myspace");
    assert_eq!(outcomes[2]["errorKind"], "not_connected");

    let post_id = body["post"]["id"].as_str().unwrap().to_string();

    let (status, history) = send(&h.state, get(&format!("/posts/{}", post_id), Some("user-1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["post"]["content"], "Hello\n\n#rust");
    assert_eq!(history["records"].as_array().unwrap().len(), 3);

    // Other users cannot read it
    let (status, _) = send(&h.state, get(&format!("/posts/{}", post_id), Some("user-2"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, listed) = send(&h.state, get("/posts?limit=5", Some("user-1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["post"]["id"], post_id.as_str());

    let (_, listed) = send(&h.state, get("/posts", Some("user-2"))).await;
    assert!(listed.as_array().unwrap().is_empty());
}

fn jpeg_of_len(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    data[..4].copy_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0]);
    data
}

#[tokio::test]
async fn test_publish_accepts_multi_megabyte_inline_media() {
    let h = harness(HashMap::new()).await;
    h.twitter
        .connect("user-1", None, Secrets::bearer("tok"))
        .await
        .unwrap();

    let encoded = STANDARD.encode(jpeg_of_len(3 * 1024 * 1024));
    assert!(encoded.len() > 2 * 1024 * 1024);

    let (status, body) = send(
        &h.state,
        post_json(
            "/publish",
            "user-1",
            json!({
                "platforms": ["twitter"],
                "content": {
                    "captions": ["big picture"],
                    "mediaBase64": encoded,
                    "mediaFilename": "big.jpg"
                }
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["post"]["platforms"][0]["platform"], "twitter");
    assert_eq!(body["post"]["platforms"][0]["success"], true);
    assert_eq!(h.twitter.platform().calls().media_posts(), 1);
}

#[tokio::test]
async fn test_publish_body_over_limit_is_rejected() {
    let h = harness(HashMap::new()).await;
    let state = h.state.clone().with_body_limit(1024);

    let encoded = STANDARD.encode(jpeg_of_len(4096));
    let request = post_json(
        "/publish",
        "user-1",
        json!({"platforms": ["twitter"], "content": {"mediaBase64": encoded}}),
    );
    let response = router(state).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(h.twitter.platform().calls().media_posts(), 0);
}

#[tokio::test]
async fn test_individual_mode_requires_slice_per_target() {
    let h = harness(HashMap::new()).await;
    let (status, body) = send(
        &h.state,
        post_json(
            "/publish",
            "user-1",
            json!({
                "platforms": ["twitter", "facebook"],
                "individualContent": {"twitter": {"caption": "only here"}},
                "isIndividualMode": true
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("facebook"));
}

#[tokio::test]
async fn test_unknown_post_is_not_found() {
    let h = harness(HashMap::new()).await;
    let (status, _) = send(&h.state, get("/posts/does-not-exist", Some("user-1"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_status_for_unconnected_platform() {
    let h = harness(HashMap::new()).await;
    let (status, body) = send(&h.state, get("/auth/twitter/status", Some("user-1"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connected"], false);
    assert_eq!(body["expired"], false);
}

#[tokio::test]
async fn test_unknown_platform_is_not_found() {
    let h = harness(HashMap::new()).await;
    let (status, _) = send(&h.state, get("/auth/myspace/status", Some("user-1"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_start_requires_configured_oauth_app() {
    let h = harness(HashMap::new()).await;
    let (status, _) = send(&h.state, get("/auth/twitter/start", Some("user-1"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// Local token endpoint that accepts every grant
async fn token_server() -> String {
    let app = Router::new().route(
        "/token",
        post(|| async {
            Json(json!({
                "access_token": "issued-token",
                "refresh_token": "issued-refresh",
                "expires_in": 7200,
                "scope": "tweet.write"
            }))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn oauth_clients() -> HashMap<PlatformId, Arc<OAuthClient>> {
    let base = token_server().await;
    let config: PlatformConfig = toml::from_str(&format!(
        r#"
        client_id = "app-id"
        client_secret = "app-secret"
        authorize_url = "https://auth.example.com/authorize"
        token_url = "{}/token"
        "#,
        base
    ))
    .unwrap();

    let client = OAuthClient::from_config(
        PlatformId::Twitter,
        &config,
        "http://localhost:8080/auth/twitter/callback".to_string(),
        reqwest::Client::new(),
    );
    HashMap::from([(PlatformId::Twitter, Arc::new(client))])
}

#[tokio::test]
async fn test_oauth_connect_status_disconnect() {
    let h = harness(oauth_clients().await).await;

    let (status, started) = send(&h.state, get("/auth/twitter/start", Some("user-1"))).await;
    assert_eq!(status, StatusCode::OK);
    let auth_url = started["authorizationUrl"].as_str().unwrap();
    assert!(auth_url.starts_with("https://auth.example.com/authorize?"));
    assert!(auth_url.contains("code_challenge="));
    let state = started["state"].as_str().unwrap().to_string();
    assert!(auth_url.contains(&state));

    let callback = format!("/auth/twitter/callback?code=abc&state={}", state);
    let (status, connected) = send(&h.state, get(&callback, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(connected["success"], true);
    assert_eq!(connected["platform"], "twitter");
    assert_eq!(connected["accountId"], "mock-account");
    assert_eq!(connected["handle"], "mock_user");

    // States are single use
    let (status, _) = send(&h.state, get(&callback, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send(&h.state, get("/auth/twitter/status", Some("user-1"))).await;
    assert_eq!(body["connected"], true);
    assert_eq!(body["handle"], "mock_user");
    assert_eq!(h.twitter.platform().calls().profile_lookups(), 1);

    let request = Request::builder()
        .method("DELETE")
        .uri("/auth/twitter")
        .header("x-user-id", "user-1")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&h.state, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["disconnected"], true);

    let (_, body) = send(&h.state, get("/auth/twitter/status", Some("user-1"))).await;
    assert_eq!(body["connected"], false);
}

#[tokio::test]
async fn test_callback_rejects_state_for_other_platform() {
    let h = harness(oauth_clients().await).await;
    let (_, started) = send(&h.state, get("/auth/twitter/start", Some("user-1"))).await;
    let state = started["state"].as_str().unwrap();

    let (status, body) = send(
        &h.state,
        get(&format!("/auth/facebook/callback?code=abc&state={}", state), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("twitter"));
}

#[tokio::test]
async fn test_callback_surfaces_provider_denial() {
    let h = harness(HashMap::new()).await;
    let (status, body) = send(
        &h.state,
        get(
            "/auth/twitter/callback?error=access_denied&error_description=nope",
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("access_denied"));
}
