use crate::config::env_string;
use async_trait::async_trait;
use aws_sdk_s3::{Client as S3Client, primitives::ByteStream};
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info};
use urlencoding::encode;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("upload of `{key}` failed: {message}")]
    Upload { key: String, message: String },
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StorageError>;
}

#[derive(Clone)]
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Builds the store when `S3_BUCKET` is set. `S3_ENDPOINT_URL` points the
    /// client at an S3-compatible service (R2, MinIO) with path-style keys.
    pub async fn from_env() -> Option<Self> {
        let bucket = env_string("S3_BUCKET")?;
        let shared = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = match env_string("S3_ENDPOINT_URL") {
            Some(endpoint) => {
                let conf = aws_sdk_s3::config::Builder::from(&shared)
                    .endpoint_url(endpoint)
                    .force_path_style(true)
                    .build();
                S3Client::from_conf(conf)
            }
            None => S3Client::new(&shared),
        };
        Some(Self { client, bucket })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|err| {
                error!(target = "studio.storage", key = %key, error = %err, "s3 upload failed");
                StorageError::Upload {
                    key: key.to_string(),
                    message: err.to_string(),
                }
            })?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
}

/// Process-local object store used when no bucket is configured. Objects are
/// served back under `/assets/{key}`.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<Mutex<HashMap<String, StoredObject>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().await.get(key).cloned()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        self.objects.lock().await.insert(
            key.to_string(),
            StoredObject {
                body,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }
}

/// Puts objects and hands back their public (CDN) URL.
#[derive(Clone)]
pub struct Uploader {
    store: Arc<dyn ObjectStore>,
    public_base_url: String,
}

impl Uploader {
    pub fn new(store: Arc<dyn ObjectStore>, public_base_url: impl Into<String>) -> Self {
        Self {
            store,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn upload(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let size = body.len();
        self.store.put(key, body, content_type).await?;
        let url = self.public_url(key);
        info!(target = "studio.storage", key = %key, size, "object uploaded");
        Ok(url)
    }

    pub fn public_url(&self, key: &str) -> String {
        let path = key
            .split('/')
            .map(|segment| encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/{}", self.public_base_url, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_returns_public_url_and_stores_bytes() {
        let store = MemoryObjectStore::new();
        let uploader = Uploader::new(Arc::new(store.clone()), "https://cdn.example.com/");
        let url = uploader
            .upload("rings/abc-123-wax.png", vec![1, 2, 3], "image/png")
            .await
            .expect("upload");
        assert_eq!(url, "https://cdn.example.com/rings/abc-123-wax.png");
        let stored = store.get("rings/abc-123-wax.png").await.expect("stored");
        assert_eq!(stored.body, vec![1, 2, 3]);
        assert_eq!(stored.content_type, "image/png");
    }

    #[test]
    fn public_url_encodes_segments_but_keeps_slashes() {
        let uploader = Uploader::new(Arc::new(MemoryObjectStore::new()), "https://cdn.example.com");
        assert_eq!(
            uploader.public_url("gift sets/a b.jpg"),
            "https://cdn.example.com/gift%20sets/a%20b.jpg"
        );
    }
}
