//! Snapshot retrieval: locate the latest processed snapshot in a
//! drive-style object store and download its bytes.
//!
//! This is the engine's only I/O boundary; everything downstream consumes
//! the materialized payload through `loader::read_snapshot_bytes`.

pub mod http_client;

use crate::config::StoreConfig;
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use self::http_client::HttpClient;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("snapshot '{file_name}' not found in folder '{folder_key}'")]
    NotFound { folder_key: String, file_name: String },

    #[error("store authentication failed: {0}")]
    Auth(String),

    #[error("store request failed: {0}")]
    Transport(String),

    #[error("unexpected store response: {0}")]
    Store(String),
}

impl FetchError {
    /// Worth retrying: network-level failures and throttling responses.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transport(_))
    }
}

// ── Source trait ──────────────────────────────────────────────────────────────

/// Swappable snapshot source abstraction.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_latest_snapshot(
        &self,
        folder_key: &str,
        file_name: &str,
    ) -> Result<Vec<u8>, FetchError>;
}

// ── Drive-style store client ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct FileEntry {
    id: String,
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct FileListing {
    #[serde(default)]
    files: Vec<FileEntry>,
}

pub struct RemoteStoreClient {
    client: HttpClient,
    base_url: String,
}

impl RemoteStoreClient {
    pub fn new(config: &StoreConfig) -> Result<Self, FetchError> {
        Ok(Self {
            client: HttpClient::new(config)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn base(&self) -> Result<Url, FetchError> {
        Url::parse(&self.base_url).map_err(|e| FetchError::Store(format!("bad base url: {e}")))
    }

    /// Listing query: newest file matching (folder, name), one result.
    fn listing_url(&self, folder_key: &str, file_name: &str) -> Result<Url, FetchError> {
        let mut url = self.base()?;
        url.path_segments_mut()
            .map_err(|_| FetchError::Store("base url cannot carry paths".to_string()))?
            .push("files");
        url.query_pairs_mut()
            .append_pair(
                "q",
                &format!("'{folder_key}' in parents and name='{file_name}' and trashed=false"),
            )
            .append_pair("orderBy", "modifiedTime desc")
            .append_pair("pageSize", "1")
            .append_pair("fields", "files(id, name)");
        Ok(url)
    }

    fn content_url(&self, file_id: &str) -> Result<Url, FetchError> {
        let mut url = self.base()?;
        url.path_segments_mut()
            .map_err(|_| FetchError::Store("base url cannot carry paths".to_string()))?
            .push("files")
            .push(file_id);
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }
}

#[async_trait]
impl SnapshotSource for RemoteStoreClient {
    async fn fetch_latest_snapshot(
        &self,
        folder_key: &str,
        file_name: &str,
    ) -> Result<Vec<u8>, FetchError> {
        let listing_url = self.listing_url(folder_key, file_name)?;
        debug!("Listing snapshot candidates: {}", listing_url);

        let body = self.client.get_bytes(listing_url.as_str()).await?;
        let listing: FileListing = serde_json::from_slice(&body)
            .map_err(|e| FetchError::Store(format!("listing decode failed: {e}")))?;

        let entry = listing.files.into_iter().next().ok_or_else(|| FetchError::NotFound {
            folder_key: folder_key.to_string(),
            file_name: file_name.to_string(),
        })?;

        info!("Downloading snapshot '{}' (file id: {})", entry.name, entry.id);
        let bytes = self
            .client
            .get_bytes(self.content_url(&entry.id)?.as_str())
            .await?;
        info!("Snapshot downloaded: {} bytes", bytes.len());
        Ok(bytes)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn client() -> RemoteStoreClient {
        RemoteStoreClient::new(&AppConfig::default().store).unwrap()
    }

    #[test]
    fn test_listing_url() {
        let url = client().listing_url("folder123", "snapshot.csv").unwrap();
        assert!(url.as_str().starts_with("https://www.googleapis.com/drive/v3/files?"));
        assert!(url.as_str().contains("pageSize=1"));
        let q = url
            .query_pairs()
            .find(|(k, _)| k == "q")
            .map(|(_, v)| v.to_string())
            .unwrap();
        assert!(q.contains("'folder123' in parents"));
        assert!(q.contains("name='snapshot.csv'"));
    }

    #[test]
    fn test_content_url() {
        let url = client().content_url("abc 123").unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.googleapis.com/drive/v3/files/abc%20123?alt=media"
        );
    }

    #[test]
    fn test_listing_decode() {
        let listing: FileListing =
            serde_json::from_str(r#"{"files":[{"id":"f1","name":"snap.csv"}]}"#).unwrap();
        assert_eq!(listing.files.len(), 1);
        assert_eq!(listing.files[0].id, "f1");

        let empty: FileListing = serde_json::from_str("{}").unwrap();
        assert!(empty.files.is_empty());
    }

    #[test]
    fn test_transient_classification() {
        assert!(FetchError::Transport("HTTP 503".into()).is_transient());
        assert!(!FetchError::Auth("HTTP 401".into()).is_transient());
        assert!(
            !FetchError::NotFound { folder_key: "f".into(), file_name: "n".into() }
                .is_transient()
        );
    }

    struct StaticSource(Vec<u8>);

    #[async_trait]
    impl SnapshotSource for StaticSource {
        async fn fetch_latest_snapshot(
            &self,
            _folder_key: &str,
            _file_name: &str,
        ) -> Result<Vec<u8>, FetchError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_source_payload_feeds_normalizer() {
        let source = StaticSource(b"Date,Code\n2024-01-31,BBCA\n".to_vec());
        let bytes =
            tokio_test::block_on(source.fetch_latest_snapshot("folder", "snap.csv")).unwrap();
        let (ds, report) = crate::loader::read_snapshot_bytes(&bytes).unwrap();
        assert_eq!(ds.len(), 1);
        assert_eq!(ds.records()[0].code, "BBCA");
        assert!(report.security_count_missing);
    }
}
