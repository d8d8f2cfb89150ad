//! Remote activity API transport + download storage for the NordikDrive console.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use nordik_core::{
    ChangesResponse, DetailRequest, Document, DocumentsResponse, FieldChange, Photo,
    PhotosResponse, ReviewDecision, SearchRequest, SearchResult,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "nordik-client";

pub const SEARCH_PATH: &str = "/admin/activities/search";
pub const DETAILS_PATH: &str = "/admin/activities/details";
pub const PHOTOS_PATH: &str = "/admin/activities/photos";
pub const DOCS_PATH: &str = "/admin/activities/docs";

/// Whether re-triggering the same action may succeed. Nothing retries
/// automatically; this only shapes the message shown to the admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

impl RetryDisposition {
    /// Server faults, throttling and request timeouts are worth another try;
    /// any other status means the request itself was refused.
    pub fn from_status(status: u16) -> Self {
        match status {
            408 | 429 | 500..=599 => RetryDisposition::Retryable,
            _ => RetryDisposition::NonRetryable,
        }
    }

    fn from_transport(err: &reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16());
        }
        if err.is_timeout() || err.is_connect() {
            RetryDisposition::Retryable
        } else {
            RetryDisposition::NonRetryable
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}{}", message_suffix(.message))]
    HttpStatus {
        status: u16,
        url: String,
        message: Option<String>,
    },
    #[error("invalid response body from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

fn message_suffix(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(": {m}"))
        .unwrap_or_default()
}

impl ApiError {
    pub fn disposition(&self) -> RetryDisposition {
        match self {
            ApiError::Request(err) => RetryDisposition::from_transport(err),
            ApiError::HttpStatus { status, .. } => RetryDisposition::from_status(*status),
            ApiError::Decode { .. } => RetryDisposition::NonRetryable,
        }
    }
}

/// Raw bytes of a downloaded document.
#[derive(Debug, Clone)]
pub struct DownloadedBlob {
    pub document_id: i64,
    pub content_type: Option<String>,
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

/// Activity endpoints consumed by the console.
#[async_trait]
pub trait ActivityApi: Send + Sync {
    async fn search(&self, token: &str, request: &SearchRequest) -> Result<SearchResult, ApiError>;

    async fn request_changes(&self, token: &str, request_id: i64)
        -> Result<Vec<FieldChange>, ApiError>;

    async fn request_photos(&self, token: &str, request_id: i64) -> Result<Vec<Photo>, ApiError>;

    async fn request_documents(&self, token: &str, request_id: i64)
        -> Result<Vec<Document>, ApiError>;

    async fn review_photo(
        &self,
        token: &str,
        photo_id: i64,
        decision: ReviewDecision,
    ) -> Result<(), ApiError>;

    async fn review_document(
        &self,
        token: &str,
        document_id: i64,
        decision: ReviewDecision,
    ) -> Result<(), ApiError>;

    async fn download_document(&self, token: &str, document_id: i64)
        -> Result<DownloadedBlob, ApiError>;
}

#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout: Duration::from_secs(20),
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct StatusUpdate {
    status: ReviewDecision,
}

impl ApiClient {
    pub fn new(config: ApiClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<B, T>(&self, token: &str, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let span = info_span!("api_call", method = "POST", path);
        async {
            let resp = self
                .client
                .post(&url)
                .bearer_auth(token)
                .json(body)
                .send()
                .await?;
            let (final_url, body) = read_success(resp).await?;
            debug!(bytes = body.len(), "response received");
            serde_json::from_slice(&body).map_err(|source| ApiError::Decode {
                url: final_url,
                source,
            })
        }
        .instrument(span)
        .await
    }

    async fn patch_status(&self, token: &str, path: String, decision: ReviewDecision) -> Result<(), ApiError> {
        let url = self.url(&path);
        let span = info_span!("api_call", method = "PATCH", path = %path);
        async {
            let resp = self
                .client
                .patch(&url)
                .bearer_auth(token)
                .json(&StatusUpdate { status: decision })
                .send()
                .await?;
            read_success(resp).await.map(|_| ())
        }
        .instrument(span)
        .await
    }
}

async fn read_success(resp: reqwest::Response) -> Result<(String, Vec<u8>), ApiError> {
    let status = resp.status();
    let final_url = resp.url().to_string();
    let body = resp.bytes().await?.to_vec();
    if status.is_success() {
        return Ok((final_url, body));
    }
    Err(ApiError::HttpStatus {
        status: status.as_u16(),
        url: final_url,
        message: server_message(&body),
    })
}

/// Extracts `message`/`error` from a JSON error body for display.
fn server_message(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    ["message", "error"]
        .iter()
        .find_map(|key| value.get(key).and_then(|v| v.as_str()))
        .map(ToString::to_string)
}

/// File name from a `Content-Disposition: attachment; filename="x.pdf"` header.
fn disposition_file_name(header: &str) -> Option<String> {
    header.split(';').map(str::trim).find_map(|part| {
        part.strip_prefix("filename=")
            .map(|name| name.trim_matches('"').to_string())
            .filter(|name| !name.is_empty())
    })
}

#[async_trait]
impl ActivityApi for ApiClient {
    async fn search(&self, token: &str, request: &SearchRequest) -> Result<SearchResult, ApiError> {
        self.post_json(token, SEARCH_PATH, request).await
    }

    async fn request_changes(
        &self,
        token: &str,
        request_id: i64,
    ) -> Result<Vec<FieldChange>, ApiError> {
        let resp: ChangesResponse = self
            .post_json(token, DETAILS_PATH, &DetailRequest { request_id })
            .await?;
        Ok(resp.data)
    }

    async fn request_photos(&self, token: &str, request_id: i64) -> Result<Vec<Photo>, ApiError> {
        let resp: PhotosResponse = self
            .post_json(token, PHOTOS_PATH, &DetailRequest { request_id })
            .await?;
        Ok(resp.photos)
    }

    async fn request_documents(
        &self,
        token: &str,
        request_id: i64,
    ) -> Result<Vec<Document>, ApiError> {
        let resp: DocumentsResponse = self
            .post_json(token, DOCS_PATH, &DetailRequest { request_id })
            .await?;
        Ok(resp.docs)
    }

    async fn review_photo(
        &self,
        token: &str,
        photo_id: i64,
        decision: ReviewDecision,
    ) -> Result<(), ApiError> {
        self.patch_status(token, format!("/admin/photos/{photo_id}/status"), decision)
            .await
    }

    async fn review_document(
        &self,
        token: &str,
        document_id: i64,
        decision: ReviewDecision,
    ) -> Result<(), ApiError> {
        self.patch_status(token, format!("/admin/documents/{document_id}/status"), decision)
            .await
    }

    async fn download_document(
        &self,
        token: &str,
        document_id: i64,
    ) -> Result<DownloadedBlob, ApiError> {
        let url = self.url(&format!("/admin/documents/{document_id}/download"));
        let span = info_span!("api_call", method = "GET", document_id);
        async {
            let resp = self.client.get(&url).bearer_auth(token).send().await?;
            let headers = resp.headers().clone();
            let (_, bytes) = read_success(resp).await?;
            let header_str = |name: reqwest::header::HeaderName| {
                headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(ToString::to_string)
            };
            Ok::<_, ApiError>(DownloadedBlob {
                document_id,
                content_type: header_str(reqwest::header::CONTENT_TYPE),
                file_name: header_str(reqwest::header::CONTENT_DISPOSITION)
                    .as_deref()
                    .and_then(disposition_file_name),
                bytes,
            })
        }
        .instrument(span)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct StoredDownload {
    pub content_hash: String,
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub byte_size: usize,
    pub deduplicated: bool,
}

/// Downloaded documents, one directory per document id. File names keep the
/// server-provided name and add a content hash prefix, so a re-download of
/// unchanged content lands on the existing file.
#[derive(Debug, Clone)]
pub struct DownloadStore {
    root: PathBuf,
}

const HASH_PREFIX_LEN: usize = 12;

impl DownloadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    /// Extension from the file name, else from the content type, else `bin`.
    pub fn extension_for(blob: &DownloadedBlob) -> String {
        let from_name = blob
            .file_name
            .as_deref()
            .and_then(|n| Path::new(n).extension())
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        from_name
            .or_else(|| {
                let mime = blob.content_type.as_deref()?.split(';').next()?.trim();
                let ext = match mime {
                    "application/pdf" => "pdf",
                    "image/jpeg" => "jpg",
                    "image/png" => "png",
                    "text/plain" => "txt",
                    _ => return None,
                };
                Some(ext.to_string())
            })
            .unwrap_or_else(|| "bin".to_string())
    }

    /// Stem of the server file name with anything outside `[A-Za-z0-9._-]`
    /// replaced, or `document-<id>` when the server sent no usable name.
    pub fn file_stem_for(blob: &DownloadedBlob) -> String {
        let stem: String = blob
            .file_name
            .as_deref()
            .map(Path::new)
            .and_then(|p| p.file_stem())
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let stem = stem.trim_matches(|c| c == '.' || c == '_');
        if stem.is_empty() {
            format!("document-{}", blob.document_id)
        } else {
            stem.to_string()
        }
    }

    /// `<document_id>/<stem>-<hash prefix>.<ext>`
    pub fn relative_path_for(blob: &DownloadedBlob, content_hash: &str) -> PathBuf {
        let short = &content_hash[..content_hash.len().min(HASH_PREFIX_LEN)];
        PathBuf::from(blob.document_id.to_string()).join(format!(
            "{}-{short}.{}",
            Self::file_stem_for(blob),
            Self::extension_for(blob)
        ))
    }

    /// Writes the blob next to its final path and renames it into place,
    /// so readers never see a partial file.
    pub async fn store(&self, blob: &DownloadedBlob) -> anyhow::Result<StoredDownload> {
        let content_hash = Self::sha256_hex(&blob.bytes);
        let relative_path = Self::relative_path_for(blob, &content_hash);
        let absolute_path = self.root.join(&relative_path);
        let stored = |deduplicated| StoredDownload {
            content_hash: content_hash.clone(),
            relative_path: relative_path.clone(),
            absolute_path: absolute_path.clone(),
            byte_size: blob.bytes.len(),
            deduplicated,
        };

        let present = fs::try_exists(&absolute_path)
            .await
            .with_context(|| format!("probing {}", absolute_path.display()))?;
        if present {
            debug!(path = %absolute_path.display(), "document already downloaded");
            return Ok(stored(true));
        }

        let dir = self.root.join(blob.document_id.to_string());
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;

        let partial = absolute_path.with_extension(format!("{}.part", Uuid::new_v4().simple()));
        fs::write(&partial, &blob.bytes)
            .await
            .with_context(|| format!("writing {}", partial.display()))?;
        if let Err(err) = fs::rename(&partial, &absolute_path).await {
            let _ = fs::remove_file(&partial).await;
            return Err(err).with_context(|| format!("moving download into {}", absolute_path.display()));
        }
        Ok(stored(false))
    }
}
