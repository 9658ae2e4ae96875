//! Storage abstraction over S3 and the local filesystem.
//!
//! A `StorageProvider` is rooted at a URL (bucket plus optional key prefix, or
//! a local directory). Every path handed to it is relative to that root.

mod local;
mod s3;

use bytes::Bytes;
use futures::{Stream, StreamExt, future::ready};
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use regex::Regex;
use snafu::prelude::*;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Instant;
use tracing::debug;

use crate::emit;
use crate::error::{InvalidUrlSnafu, ObjectStoreSnafu, StorageError};
use crate::metrics::events::{RequestStatus, StorageOperation, StorageRequest};

pub use local::LocalConfig;
pub use s3::S3Config;

/// A reference-counted storage provider.
pub type StorageProviderRef = Arc<StorageProvider>;

/// Storage provider that abstracts over the supported backends.
#[derive(Clone)]
pub struct StorageProvider {
    pub(crate) config: BackendConfig,
    pub(crate) object_store: Arc<dyn ObjectStore>,
    pub(crate) canonical_url: String,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.canonical_url)
    }
}

// URL patterns for the supported backends
const S3_PATH: &str =
    r"^https://s3\.(?P<region>[\w\-]+)\.amazonaws\.com/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_VIRTUAL: &str =
    r"^https://(?P<bucket>[a-z0-9\-\.]+)\.s3\.(?P<region>[\w\-]+)\.amazonaws\.com(/(?P<key>.+))?$";
const S3_URL: &str = r"^[sS]3[aAnN]?://(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_ENDPOINT_URL: &str = r"^[sS]3[aA]?::(?<protocol>https?)://(?P<endpoint>[^:/]+):(?<port>\d+)/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";

const FILE_URI: &str = r"^file://(?P<path>.*)$";
const FILE_URL: &str = r"^file:(?P<path>.*)$";
const FILE_PATH: &str = r"^/(?P<path>.*)$";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    S3,
    Local,
}

static MATCHERS: LazyLock<Vec<(Backend, Regex)>> = LazyLock::new(|| {
    let compile = |pattern| Regex::new(pattern).expect("Invalid storage URL pattern");
    vec![
        (Backend::S3, compile(S3_PATH)),
        (Backend::S3, compile(S3_VIRTUAL)),
        (Backend::S3, compile(S3_ENDPOINT_URL)),
        (Backend::S3, compile(S3_URL)),
        (Backend::Local, compile(FILE_URI)),
        (Backend::Local, compile(FILE_URL)),
        (Backend::Local, compile(FILE_PATH)),
    ]
});

/// Backend configuration enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    S3(S3Config),
    Local(LocalConfig),
}

impl BackendConfig {
    /// Parse a URL into a backend configuration.
    ///
    /// Trailing slashes are ignored, so `s3a://bucket/` and `s3a://bucket`
    /// are the same root.
    pub fn parse_url(url: &str) -> Result<Self, StorageError> {
        let trimmed = url.trim().trim_end_matches('/');
        // A bare "/" trims to nothing but still names the filesystem root
        let trimmed = if trimmed.is_empty() && url.starts_with('/') {
            "/"
        } else {
            trimmed
        };

        for (backend, regex) in MATCHERS.iter() {
            if let Some(matches) = regex.captures(trimmed) {
                return Ok(match backend {
                    Backend::S3 => Self::parse_s3(&matches),
                    Backend::Local => Self::parse_local(&matches),
                });
            }
        }

        InvalidUrlSnafu {
            url: url.to_string(),
        }
        .fail()
    }

    fn parse_s3(matches: &regex::Captures) -> Self {
        let bucket = matches["bucket"].to_string();

        let region = matches.name("region").map(|m| m.as_str().to_string());

        let endpoint = matches.name("endpoint").map(|endpoint| {
            let port = matches
                .name("port")
                .and_then(|p| p.as_str().parse::<u16>().ok())
                .unwrap_or(443);
            let protocol = matches
                .name("protocol")
                .map(|p| p.as_str())
                .unwrap_or("https");
            format!("{}://{}:{}", protocol, endpoint.as_str(), port)
        });

        let key = matches.name("key").map(|m| m.as_str().into());

        BackendConfig::S3(S3Config {
            endpoint,
            region,
            bucket,
            key,
        })
    }

    fn parse_local(matches: &regex::Captures) -> Self {
        let path = &matches["path"];
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        BackendConfig::Local(LocalConfig { path })
    }

    pub(crate) fn key(&self) -> Option<&Path> {
        match self {
            BackendConfig::S3(s3) => s3.key.as_ref(),
            BackendConfig::Local(_) => None,
        }
    }
}

impl StorageProvider {
    /// Create a storage provider for the given URL with storage options.
    pub async fn for_url_with_options(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        match BackendConfig::parse_url(url)? {
            BackendConfig::S3(config) => Self::construct_s3(config, options),
            BackendConfig::Local(config) => Self::construct_local(config).await,
        }
    }

    /// The URL this provider is rooted at.
    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }

    /// Get the backend configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Qualify a path with the configured key prefix.
    pub fn qualify_path<'a>(&self, path: &'a Path) -> Cow<'a, Path> {
        match self.config.key() {
            Some(prefix) => Cow::Owned(prefix.parts().chain(path.parts()).collect()),
            None => Cow::Borrowed(path),
        }
    }

    /// List every object under `prefix` (relative to the root), recursively.
    ///
    /// Returned paths are relative to the root, so they can be passed straight
    /// back to `get`.
    pub fn list_with_prefix(
        &self,
        prefix: &str,
    ) -> impl Stream<Item = Result<Path, object_store::Error>> + '_ {
        let prefix = Path::from(prefix);
        let full_prefix = self.qualify_path(&prefix).into_owned();
        let key_part_count = self
            .config
            .key()
            .map(|key| key.parts().count())
            .unwrap_or_default();

        self.object_store
            .list(Some(&full_prefix))
            .filter_map(move |meta| {
                let result = match meta {
                    Ok(metadata) => {
                        let relative: Path =
                            metadata.location.parts().skip(key_part_count).collect();
                        Some(Ok(relative))
                    }
                    // A prefix that does not exist yet is just empty
                    Err(object_store::Error::NotFound { .. }) => None,
                    Err(err) => Some(Err(err)),
                };
                ready(result)
            })
    }

    /// List files under `prefix` whose name ends with `suffix`, sorted by path.
    pub async fn list_files(&self, prefix: &str, suffix: &str) -> Result<Vec<String>, StorageError> {
        let start = Instant::now();
        let mut files = Vec::new();
        let mut total_listed = 0;

        let mut stream = self.list_with_prefix(prefix);
        let result = async {
            while let Some(result) = stream.next().await {
                let path = result.context(ObjectStoreSnafu)?;
                total_listed += 1;
                if path.as_ref().ends_with(suffix) {
                    files.push(path.to_string());
                }
            }
            Ok::<_, StorageError>(())
        }
        .await;

        emit!(StorageRequest {
            operation: StorageOperation::List,
            status: RequestStatus::from_result(&result),
            duration: start.elapsed(),
        });
        result?;

        debug!(
            "Listed {} objects under {}/{}, {} end with {}",
            total_listed,
            self.canonical_url,
            prefix,
            files.len(),
            suffix
        );

        // Sorted so the run processes documents in a reproducible order
        files.sort();
        Ok(files)
    }

    /// Get the contents of a file.
    pub async fn get(&self, path: impl Into<Path>) -> Result<Bytes, StorageError> {
        let path = path.into();
        let start = Instant::now();
        let result = async {
            self.object_store
                .get(&self.qualify_path(&path))
                .await?
                .bytes()
                .await
        }
        .await;

        emit!(StorageRequest {
            operation: StorageOperation::Get,
            status: RequestStatus::from_result(&result),
            duration: start.elapsed(),
        });

        result.context(ObjectStoreSnafu)
    }

    /// Put a payload to a path.
    pub async fn put_payload(&self, path: &Path, payload: PutPayload) -> Result<(), StorageError> {
        let path = self.qualify_path(path);
        let start = Instant::now();
        let result = self.object_store.put(&path, payload).await;

        emit!(StorageRequest {
            operation: StorageOperation::Put,
            status: RequestStatus::from_result(&result),
            duration: start.elapsed(),
        });

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Put bytes to a path.
    pub async fn put(&self, path: impl Into<Path>, bytes: impl Into<Bytes>) -> Result<(), StorageError> {
        self.put_payload(&path.into(), PutPayload::from(bytes.into()))
            .await
    }

    /// Delete every object under `prefix`, returning how many were removed.
    pub async fn delete_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        let mut paths = Vec::new();
        let mut stream = self.list_with_prefix(prefix);
        while let Some(result) = stream.next().await {
            paths.push(result.context(ObjectStoreSnafu)?);
        }
        drop(stream);

        for path in &paths {
            let qualified = self.qualify_path(path);
            let start = Instant::now();
            let result = match self.object_store.delete(&qualified).await {
                // Already gone is as good as deleted
                Err(object_store::Error::NotFound { .. }) => Ok(()),
                other => other,
            };

            emit!(StorageRequest {
                operation: StorageOperation::Delete,
                status: RequestStatus::from_result(&result),
                duration: start.elapsed(),
            });

            result.context(ObjectStoreSnafu)?;
        }

        debug!(
            "Deleted {} objects under {}/{}",
            paths.len(),
            self.canonical_url,
            prefix
        );

        Ok(paths.len())
    }
}
