//! Object storage access for job outputs
//!
//! Generated videos and other job artifacts land in S3. `ObjectStore` is
//! the seam the job helpers use to find and fetch them; `LocalObjectStore`
//! maps buckets onto a directory tree and `HttpObjectStore` speaks the S3
//! REST API.

use crate::core::config::Config;
use crate::core::xml::extract_tags;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Url;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid S3 URI: {0}")]
    InvalidUri(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage request failed: {0}")]
    Request(String),

    #[error("Storage returned status {status}: {message}")]
    Status { status: u16, message: String },
}

impl From<reqwest::Error> for StorageError {
    fn from(error: reqwest::Error) -> Self {
        StorageError::Request(error.to_string())
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// `s3://bucket/key` split into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Uri {
    pub bucket: String,
    pub key: String,
}

impl S3Uri {
    pub fn parse(uri: &str) -> Result<Self, StorageError> {
        let rest = uri
            .strip_prefix("s3://")
            .ok_or_else(|| StorageError::InvalidUri(uri.to_string()))?;

        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(StorageError::InvalidUri(uri.to_string()));
        }

        Ok(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }
}

impl fmt::Display for S3Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Keys in `bucket` starting with `prefix`, in lexical order
    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Write the object at `bucket/key` to `dest`
    async fn download(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), StorageError>;
}

async fn ensure_parent(dest: &Path) -> Result<(), StorageError> {
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_error(parent))?;
    }
    Ok(())
}

/// Buckets as directories under a root
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn walk(dir: &Path, base: &Path, keys: &mut Vec<String>) -> std::io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                Self::walk(&path, base, keys)?;
            } else if let Ok(relative) = path.strip_prefix(base) {
                let key: Vec<String> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                keys.push(key.join("/"));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        let base = self.root.join(bucket);
        if !base.is_dir() {
            return Ok(Vec::new());
        }

        let walk_base = base.clone();
        let mut keys = tokio::task::spawn_blocking(move || {
            let mut keys = Vec::new();
            Self::walk(&walk_base, &walk_base, &mut keys).map(|_| keys)
        })
        .await
        .map_err(|e| StorageError::Request(e.to_string()))?
        .map_err(io_error(&base))?;

        keys.retain(|key| key.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }

    async fn download(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), StorageError> {
        let source = key
            .split('/')
            .fold(self.root.join(bucket), |path, part| path.join(part));
        ensure_parent(dest).await?;
        tokio::fs::copy(&source, dest).await.map_err(io_error(&source))?;
        Ok(())
    }
}

/// S3 REST API client (path-style addressing)
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpObjectStore {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout_secs: u64) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, StorageError> {
        let endpoint = config
            .s3_url
            .clone()
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", config.region));
        Self::new(endpoint, config.api_key.clone(), config.request_timeout)
    }

    fn url(&self, bucket: &str, key: Option<&str>) -> Result<Url, StorageError> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| StorageError::Request(format!("Invalid endpoint {}: {e}", self.endpoint)))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StorageError::Request(format!("Endpoint {} cannot take a path", self.endpoint)))?;
            segments.pop_if_empty().push(bucket);
            if let Some(key) = key {
                segments.extend(key.split('/'));
            }
        }
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response, StorageError> {
        debug!("GET {}", url);
        let mut request = self.client.get(url);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StorageError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut url = self.url(bucket, None)?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("list-type", "2").append_pair("prefix", prefix);
                if let Some(token) = &continuation {
                    query.append_pair("continuation-token", token);
                }
            }

            let body = self.get(url).await?.text().await?;
            keys.extend(extract_tags(&body, "Key"));

            let truncated = extract_tags(&body, "IsTruncated")
                .first()
                .is_some_and(|value| value == "true");
            continuation = extract_tags(&body, "NextContinuationToken").into_iter().next();
            if !truncated || continuation.is_none() {
                break;
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn download(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), StorageError> {
        let url = self.url(bucket, Some(key))?;
        let response = self.get(url).await?;

        ensure_parent(dest).await?;
        let mut file = tokio::fs::File::create(dest).await.map_err(io_error(dest))?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await.map_err(io_error(dest))?;
        }
        file.flush().await.map_err(io_error(dest))?;

        info!("Downloaded s3://{}/{} to {}", bucket, key, dest.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_s3_uri() {
        let uri = S3Uri::parse("s3://my-bucket/videos/output").unwrap();
        assert_eq!(uri.bucket, "my-bucket");
        assert_eq!(uri.key, "videos/output");
        assert_eq!(uri.to_string(), "s3://my-bucket/videos/output");

        assert_eq!(S3Uri::parse("s3://bucket").unwrap().key, "");
        assert!(S3Uri::parse("https://bucket/key").is_err());
        assert!(S3Uri::parse("s3:///key").is_err());
    }

    #[tokio::test]
    async fn test_local_store() {
        let root = tempdir().unwrap();
        let job_dir = root.path().join("bucket/job1");
        std::fs::create_dir_all(&job_dir).unwrap();
        std::fs::write(job_dir.join("output.mp4"), b"video").unwrap();
        std::fs::write(job_dir.join("manifest.json"), b"{}").unwrap();
        std::fs::create_dir_all(root.path().join("bucket/job2")).unwrap();
        std::fs::write(root.path().join("bucket/job2/x.mp4"), b"other").unwrap();

        let store = LocalObjectStore::new(root.path());
        let keys = store.list_keys("bucket", "job1").await.unwrap();
        assert_eq!(keys, vec!["job1/manifest.json", "job1/output.mp4"]);
        assert!(store.list_keys("missing", "").await.unwrap().is_empty());

        let dest = root.path().join("out/nested/video.mp4");
        store.download("bucket", "job1/output.mp4", &dest).await.unwrap();
        assert_eq!(std::fs::read(dest).unwrap(), b"video");
    }

    #[tokio::test]
    async fn test_http_store_lists_pages_and_downloads() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/bucket")
            .match_query(mockito::Matcher::Exact("list-type=2&prefix=job1".into()))
            .with_status(200)
            .with_body(
                "<ListBucketResult><IsTruncated>true</IsTruncated>\
                 <NextContinuationToken>t1</NextContinuationToken>\
                 <Contents><Key>job1/b.mp4</Key></Contents></ListBucketResult>",
            )
            .create_async()
            .await;
        server
            .mock("GET", "/bucket")
            .match_query(mockito::Matcher::Exact(
                "list-type=2&prefix=job1&continuation-token=t1".into(),
            ))
            .with_status(200)
            .with_body(
                "<ListBucketResult><IsTruncated>false</IsTruncated>\
                 <Contents><Key>job1/a.json</Key></Contents></ListBucketResult>",
            )
            .create_async()
            .await;
        server
            .mock("GET", "/bucket/job1/b.mp4")
            .match_header("authorization", "Bearer key")
            .with_status(200)
            .with_body("video-bytes")
            .create_async()
            .await;

        let store = HttpObjectStore::new(server.url(), Some("key".to_string()), 5).unwrap();
        let keys = store.list_keys("bucket", "job1").await.unwrap();
        assert_eq!(keys, vec!["job1/a.json", "job1/b.mp4"]);

        let dir = tempdir().unwrap();
        let dest = dir.path().join("b.mp4");
        store.download("bucket", "job1/b.mp4", &dest).await.unwrap();
        assert_eq!(std::fs::read_to_string(dest).unwrap(), "video-bytes");
    }
}
