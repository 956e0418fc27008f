//! Media sniffing and download

use crate::error::PlatformError;
use crate::types::{MediaInfo, MediaKind, MediaRef};

const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Classify a media payload
///
/// Magic bytes are checked first (JPEG, PNG, GIF, WebP, ISO media `ftyp`), then
/// the filename extension. Anything unrecognised is treated as an MP4 video.
pub fn detect_media_type(data: &[u8], filename_hint: Option<&str>) -> MediaInfo {
    let (kind, mime, ext) = sniff(data)
        .or_else(|| filename_hint.and_then(from_extension))
        .unwrap_or((MediaKind::Video, "video/mp4", "mp4"));

    let filename = match filename_hint.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("media.{}", ext),
    };

    MediaInfo {
        kind,
        mime_type: mime.to_string(),
        filename,
    }
}

fn sniff(data: &[u8]) -> Option<(MediaKind, &'static str, &'static str)> {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some((MediaKind::Image, "image/jpeg", "jpg"));
    }
    if data.starts_with(&PNG_MAGIC) {
        return Some((MediaKind::Image, "image/png", "png"));
    }
    if data.starts_with(b"GIF") {
        return Some((MediaKind::ImageGif, "image/gif", "gif"));
    }
    if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        return Some((MediaKind::Image, "image/webp", "webp"));
    }
    if data.len() >= 8 && &data[4..8] == b"ftyp" {
        if data.len() >= 12 && &data[8..12] == b"qt  " {
            return Some((MediaKind::Video, "video/quicktime", "mov"));
        }
        return Some((MediaKind::Video, "video/mp4", "mp4"));
    }
    None
}

fn from_extension(filename: &str) -> Option<(MediaKind, &'static str, &'static str)> {
    let ext = filename.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some((MediaKind::Image, "image/jpeg", "jpg")),
        "png" => Some((MediaKind::Image, "image/png", "png")),
        "webp" => Some((MediaKind::Image, "image/webp", "webp")),
        "gif" => Some((MediaKind::ImageGif, "image/gif", "gif")),
        "mp4" | "m4v" => Some((MediaKind::Video, "video/mp4", "mp4")),
        "mov" => Some((MediaKind::Video, "video/quicktime", "mov")),
        "webm" => Some((MediaKind::Video, "video/webm", "webm")),
        _ => None,
    }
}

/// Media bytes ready for upload
#[derive(Clone)]
pub struct MediaPayload {
    pub data: Vec<u8>,
    pub info: MediaInfo,
    /// Where the bytes came from, for platforms that pull media by URL
    pub source_url: Option<String>,
}

impl MediaPayload {
    pub fn from_bytes(data: Vec<u8>, filename_hint: Option<&str>) -> Self {
        let info = detect_media_type(&data, filename_hint);
        Self {
            data,
            info,
            source_url: None,
        }
    }

    pub fn is_video(&self) -> bool {
        self.info.kind == MediaKind::Video
    }
}

impl std::fmt::Debug for MediaPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaPayload")
            .field("len", &self.data.len())
            .field("info", &self.info)
            .field("source_url", &self.source_url)
            .finish()
    }
}

/// Turns a `MediaRef` into bytes, downloading URL media with a size cap
#[derive(Clone)]
pub struct MediaFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl MediaFetcher {
    pub fn new(client: reqwest::Client, max_bytes: u64) -> Self {
        Self { client, max_bytes }
    }

    pub async fn resolve(&self, media: &MediaRef) -> Result<MediaPayload, PlatformError> {
        match media {
            MediaRef::Bytes { data, filename } => {
                self.check_size(data.len() as u64)?;
                Ok(MediaPayload::from_bytes(data.clone(), filename.as_deref()))
            }
            MediaRef::Url { url } => {
                let data = self.download(url).await?;
                let hint = filename_from_url(url);
                let mut payload = MediaPayload::from_bytes(data, hint.as_deref());
                payload.source_url = Some(url.clone());
                Ok(payload)
            }
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, PlatformError> {
        tracing::debug!(url = %url, "Downloading media");

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PlatformError::MediaDownload(format!("{}: {}", url, e)))?;

        if let Some(length) = response.content_length() {
            self.check_size(length)?;
        }

        let mut data = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| PlatformError::MediaDownload(format!("{}: {}", url, e)))?
        {
            data.extend_from_slice(&chunk);
            self.check_size(data.len() as u64)?;
        }

        if data.is_empty() {
            return Err(PlatformError::MediaDownload(format!("{}: empty body", url)));
        }
        Ok(data)
    }

    fn check_size(&self, len: u64) -> Result<(), PlatformError> {
        if len > self.max_bytes {
            return Err(PlatformError::MediaDownload(format!(
                "media is {} bytes, limit is {}",
                len, self.max_bytes
            )));
        }
        Ok(())
    }
}

fn filename_from_url(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    (!last.is_empty()).then(|| last.to_string())
}
