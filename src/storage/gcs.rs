use async_trait::async_trait;
use reqwest::{StatusCode, Url};

use super::{BlobStore, StorageError};

const API_BASE: &str = "https://storage.googleapis.com";

/// Google Cloud Storage over the JSON API.
///
/// Authenticates with a pre-issued OAuth access token.
#[derive(Clone)]
pub struct GcsBlobStore {
    client: reqwest::Client,
    bucket: String,
    access_token: String,
    api_base: String,
}

impl GcsBlobStore {
    pub fn new(bucket: &str, access_token: &str) -> Self {
        Self::with_api_base(bucket, access_token, API_BASE)
    }

    pub fn with_api_base(bucket: &str, access_token: &str, api_base: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            bucket: bucket.to_string(),
            access_token: access_token.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, prefix: &str, key: Option<&str>) -> Result<Url, StorageError> {
        let mut url = Url::parse(&format!("{}/{prefix}", self.api_base))
            .map_err(|e| StorageError::Unavailable(format!("bad storage url: {e}")))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StorageError::Unavailable("bad storage url".to_string()))?;
            segments.extend(["b", self.bucket.as_str(), "o"]);
            if let Some(key) = key {
                segments.push(key);
            }
        }
        Ok(url)
    }

    fn check(status: StatusCode, key: &str, body: String) -> Result<(), StorageError> {
        if status.is_success() {
            return Ok(());
        }
        match status {
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(key.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(StorageError::Denied(format!("{key}: {status} {body}")))
            }
            _ => Err(StorageError::Unavailable(format!("{key}: {status} {body}"))),
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder, key: &str) -> Result<(), StorageError> {
        let resp = req
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| StorageError::Unavailable(format!("{key}: {e}")))?;
        let status = resp.status();
        let body = if status.is_success() {
            String::new()
        } else {
            resp.text().await.unwrap_or_default()
        };
        Self::check(status, key, body)
    }
}

#[async_trait]
impl BlobStore for GcsBlobStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let mut url = self.url("upload/storage/v1", None)?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", key);

        let req = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes);
        self.send(req, key).await?;
        tracing::debug!("uploaded {key} to gs://{}", self.bucket);
        Ok(self.public_url(key))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let url = self.url("storage/v1", Some(key))?;
        self.send(self.client.delete(url), key).await
    }

    async fn make_public(&self, key: &str) -> Result<(), StorageError> {
        let mut url = self.url("storage/v1", Some(key))?;
        url.path_segments_mut()
            .map_err(|_| StorageError::Unavailable("bad storage url".to_string()))?
            .push("acl");
        let req = self.client.post(url).json(&serde_json::json!({
            "entity": "allUsers",
            "role": "READER"
        }));
        self.send(req, key).await
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://storage.googleapis.com/{}/{key}", self.bucket)
    }
}
