use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::CoreError;

/// Object storage boundary: the core hands over bytes and consumes only the
/// durable URL that comes back.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(
        &self,
        filename: &str,
        mimetype: &str,
        bytes: Vec<u8>,
    ) -> Result<String, CoreError>;
}

#[derive(Clone, Debug)]
pub struct StoredObject {
    pub filename: String,
    pub mimetype: String,
    pub bytes: Vec<u8>,
}

pub struct InMemoryObjectStorage {
    objects: Mutex<HashMap<String, StoredObject>>,
}

impl InMemoryObjectStorage {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn get(&self, url: &str) -> Option<StoredObject> {
        self.objects.lock().get(url).cloned()
    }
}

impl Default for InMemoryObjectStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn upload(
        &self,
        filename: &str,
        mimetype: &str,
        bytes: Vec<u8>,
    ) -> Result<String, CoreError> {
        let url = format!("memory://{}/{}", Uuid::new_v4(), filename);
        self.objects.lock().insert(
            url.clone(),
            StoredObject {
                filename: filename.to_string(),
                mimetype: mimetype.to_string(),
                bytes,
            },
        );
        Ok(url)
    }
}

#[derive(Deserialize)]
struct UploadResponse {
    url: String,
}

/// Uploader backed by an external HTTP endpoint that answers `{"url": ...}`.
pub struct HttpObjectStorage {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpObjectStorage {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn upload(
        &self,
        filename: &str,
        mimetype: &str,
        bytes: Vec<u8>,
    ) -> Result<String, CoreError> {
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("filename", filename)])
            .header(reqwest::header::CONTENT_TYPE, mimetype)
            .body(bytes)
            .send()
            .await
            .map_err(|err| CoreError::Store(err.to_string()))?
            .error_for_status()
            .map_err(|err| CoreError::Store(err.to_string()))?;
        let body: UploadResponse = response
            .json()
            .await
            .map_err(|err| CoreError::Store(err.to_string()))?;
        Ok(body.url)
    }
}
