use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::{error, warn};

use crate::utils::http::get_http_client;

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

pub fn normalize_image_mime_type(mime_type: &str) -> String {
    let lowered = mime_type.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "image/jpg" => "image/jpeg".to_string(),
        "image/heif" => "image/heic".to_string(),
        _ => lowered,
    }
}

pub fn is_supported_portrait_mime(mime_type: &str) -> bool {
    matches!(
        mime_type,
        "image/png" | "image/jpeg" | "image/webp" | "image/heic"
    )
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PortraitError {
    #[error("Ảnh tải lên bị trống.")]
    Empty,
    #[error("Định dạng ảnh không được hỗ trợ ({0}). Hãy dùng JPEG, PNG, WEBP hoặc HEIC.")]
    UnsupportedFormat(String),
}

/// An uploaded portrait. Cloning shares the underlying bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Portrait {
    bytes: Arc<[u8]>,
    mime_type: String,
    display_name: Option<String>,
}

impl Portrait {
    pub fn from_bytes(bytes: Vec<u8>, display_name: Option<String>) -> Result<Self, PortraitError> {
        if bytes.is_empty() {
            return Err(PortraitError::Empty);
        }
        let mime_type = detect_mime_type(&bytes)
            .map(|mime| normalize_image_mime_type(&mime))
            .unwrap_or_else(|| "application/octet-stream".to_string());
        if !is_supported_portrait_mime(&mime_type) {
            return Err(PortraitError::UnsupportedFormat(mime_type));
        }
        Ok(Self {
            bytes: Arc::from(bytes),
            mime_type,
            display_name,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }
}

const MEDIA_DOWNLOAD_MAX_ATTEMPTS: usize = 3;
const MEDIA_DOWNLOAD_BASE_DELAY_MS: u64 = 400;
const MEDIA_DOWNLOAD_ERROR_BODY_LIMIT: usize = 800;

pub fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn should_retry_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

fn should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

/// Fetches a remote portrait, retrying transient failures with exponential
/// backoff. Returns `None` once every attempt has failed.
pub async fn download_media(url: &str) -> Option<Vec<u8>> {
    let client = get_http_client();
    for attempt in 0..MEDIA_DOWNLOAD_MAX_ATTEMPTS {
        let response = match client.get(url).send().await {
            Ok(resp) => resp,
            Err(err) => {
                warn!(
                    "Failed to fetch portrait {url}: {err} (timeout={}, connect={}, status={:?}, attempt={}/{})",
                    err.is_timeout(),
                    err.is_connect(),
                    err.status(),
                    attempt + 1,
                    MEDIA_DOWNLOAD_MAX_ATTEMPTS
                );
                if !should_retry_error(&err) || attempt + 1 == MEDIA_DOWNLOAD_MAX_ATTEMPTS {
                    return None;
                }
                let delay = Duration::from_millis(MEDIA_DOWNLOAD_BASE_DELAY_MS << attempt);
                tokio::time::sleep(delay).await;
                continue;
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(
                "Portrait download failed for {url} with status {}: {}",
                status,
                truncate_for_log(&body, MEDIA_DOWNLOAD_ERROR_BODY_LIMIT)
            );
            if !should_retry_status(status) || attempt + 1 == MEDIA_DOWNLOAD_MAX_ATTEMPTS {
                return None;
            }
            let delay = Duration::from_millis(MEDIA_DOWNLOAD_BASE_DELAY_MS << attempt);
            tokio::time::sleep(delay).await;
            continue;
        }

        return match response.bytes().await {
            Ok(bytes) => Some(bytes.to_vec()),
            Err(err) => {
                error!(
                    "Failed to read portrait bytes {url}: {err} (attempt={}/{})",
                    attempt + 1,
                    MEDIA_DOWNLOAD_MAX_ATTEMPTS
                );
                if attempt + 1 == MEDIA_DOWNLOAD_MAX_ATTEMPTS {
                    None
                } else {
                    let delay = Duration::from_millis(MEDIA_DOWNLOAD_BASE_DELAY_MS << attempt);
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }
        };
    }

    None
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Smallest valid PNG signature plus IHDR chunk header, enough for sniffing.
    pub(crate) fn png_bytes() -> Vec<u8> {
        let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        bytes.extend_from_slice(&[0, 0, 0, 13, b'I', b'H', b'D', b'R']);
        bytes.extend_from_slice(&[0; 17]);
        bytes
    }

    pub(crate) fn sample_portrait() -> Portrait {
        Portrait::from_bytes(png_bytes(), Some("portrait.png".to_string()))
            .expect("png portrait is accepted")
    }

    #[test]
    fn sniffs_png_portrait() {
        let portrait = sample_portrait();
        assert_eq!(portrait.mime_type(), "image/png");
        assert_eq!(portrait.display_name(), Some("portrait.png"));
    }

    #[test]
    fn rejects_empty_and_non_image_uploads() {
        assert_eq!(Portrait::from_bytes(Vec::new(), None), Err(PortraitError::Empty));
        let pdf = b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n1 0 obj".to_vec();
        assert!(matches!(
            Portrait::from_bytes(pdf, None),
            Err(PortraitError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn normalizes_jpg_alias() {
        assert_eq!(normalize_image_mime_type("IMAGE/JPG"), "image/jpeg");
    }

    #[test]
    fn clones_share_bytes() {
        let portrait = sample_portrait();
        let copy = portrait.clone();
        assert!(std::ptr::eq(portrait.bytes().as_ptr(), copy.bytes().as_ptr()));
    }
}
