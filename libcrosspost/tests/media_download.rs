//! URL media against a local file server
//!
//! The server hands out a small JPEG, an oversized body with a declared
//! length, and an oversized chunked body without one. It also answers the
//! Instagram container calls so the media URL forwarded to Graph can be
//! checked.

use anyhow::Result;
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use libcrosspost::config::PlatformConfig;
use libcrosspost::credentials::{MemoryTokenStore, TokenStore};
use libcrosspost::error::PlatformError;
use libcrosspost::media::MediaFetcher;
use libcrosspost::platforms::instagram::InstagramPlatform;
use libcrosspost::platforms::{Adapter, PlatformAdapter};
use libcrosspost::types::{Credential, Identity, MediaKind, MediaRef, Secrets};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const CAP: u64 = 1024;

fn jpeg(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    data[..4].copy_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0]);
    data
}

#[derive(Clone, Default)]
struct Forms {
    posted: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

async fn graph_node(Path((_version, node)): Path<(String, String)>) -> Response {
    match node.as_str() {
        "container-1" => Json(json!({ "id": node, "status_code": "FINISHED" })).into_response(),
        _ => Json(json!({ "permalink": format!("https://instagram.example/p/{}", node) }))
            .into_response(),
    }
}

async fn graph_edge(
    State(forms): State<Forms>,
    Path((_version, _node, edge)): Path<(String, String, String)>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    forms.posted.lock().unwrap().push(form);
    match edge.as_str() {
        "media" => Json(json!({ "id": "container-1" })).into_response(),
        _ => Json(json!({ "id": "ig-post-1" })).into_response(),
    }
}

async fn start_server() -> Result<(SocketAddr, Forms)> {
    let forms = Forms::default();
    let app = Router::new()
        .route("/photo.jpg", get(|| async { jpeg(512) }))
        .route("/huge.jpg", get(|| async { jpeg(4 * CAP as usize) }))
        .route(
            "/stream.jpg",
            get(|| async {
                let chunks = (0..8).map(|i| {
                    let chunk = if i == 0 { jpeg(512) } else { vec![0u8; 512] };
                    Ok::<_, std::io::Error>(Bytes::from(chunk))
                });
                Body::from_stream(futures::stream::iter(chunks))
            }),
        )
        .route("/{version}/{node}", get(graph_node))
        .route("/{version}/{node}/{edge}", post(graph_edge))
        .with_state(forms.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((addr, forms))
}

fn fetcher() -> MediaFetcher {
    MediaFetcher::new(reqwest::Client::new(), CAP)
}

#[tokio::test]
async fn test_downloaded_jpeg_is_sniffed() -> Result<()> {
    let (addr, _) = start_server().await?;
    let url = format!("http://{}/photo.jpg", addr);

    let payload = fetcher().resolve(&MediaRef::url(url.clone())).await?;

    assert_eq!(payload.data.len(), 512);
    assert_eq!(payload.info.kind, MediaKind::Image);
    assert_eq!(payload.info.mime_type, "image/jpeg");
    assert_eq!(payload.info.filename, "photo.jpg");
    assert_eq!(payload.source_url.as_deref(), Some(url.as_str()));
    Ok(())
}

#[tokio::test]
async fn test_declared_length_over_cap_is_refused() -> Result<()> {
    let (addr, _) = start_server().await?;

    let error = fetcher()
        .resolve(&MediaRef::url(format!("http://{}/huge.jpg", addr)))
        .await
        .unwrap_err();

    match error {
        PlatformError::MediaDownload(msg) => assert!(msg.contains("limit is 1024"), "{}", msg),
        other => panic!("expected download error, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_chunked_body_over_cap_is_refused() -> Result<()> {
    let (addr, _) = start_server().await?;

    let error = fetcher()
        .resolve(&MediaRef::url(format!("http://{}/stream.jpg", addr)))
        .await
        .unwrap_err();

    match error {
        PlatformError::MediaDownload(msg) => assert!(msg.contains("limit is 1024"), "{}", msg),
        other => panic!("expected download error, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_instagram_container_gets_the_source_url() -> Result<()> {
    let (addr, forms) = start_server().await?;
    let config: PlatformConfig = toml::from_str(&format!(
        "client_id = \"app\"\napi_base = \"http://{}\"",
        addr
    ))?;
    let http = reqwest::Client::new();

    let store = Arc::new(MemoryTokenStore::new());
    store
        .upsert(&Credential::new(
            "user-1",
            "instagram",
            "ig-1",
            Secrets::bearer("token"),
        ))
        .await?;
    let adapter = Adapter::new(
        InstagramPlatform::new(&config, http.clone()).with_poll_interval(Duration::from_millis(10)),
        store,
        MediaFetcher::new(http, CAP),
    );

    let url = format!("http://{}/photo.jpg?sig=abc%2Fdef", addr);
    let outcome = adapter
        .publish(&Identity::user("user-1"), "sunset", Some(&MediaRef::url(url.clone())))
        .await;

    assert!(outcome.success, "{:?}", outcome.error_message);
    assert_eq!(outcome.post_id.as_deref(), Some("ig-post-1"));

    let posted = forms.posted.lock().unwrap().clone();
    assert_eq!(posted.len(), 2);
    assert_eq!(posted[0].get("image_url"), Some(&url));
    assert_eq!(posted[0].get("caption").map(String::as_str), Some("sunset"));
    assert_eq!(posted[1].get("creation_id").map(String::as_str), Some("container-1"));
    Ok(())
}
