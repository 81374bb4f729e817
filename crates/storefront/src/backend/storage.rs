//! Object storage (`/storage/v1`).

use reqwest::Method;
use tracing::instrument;

use super::{BackendClient, BackendError, Bearer};

fn object_path(bucket: &str, key: &str) -> String {
    let encoded = key
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    format!("/storage/v1/object/{bucket}/{encoded}")
}

impl BackendClient {
    /// Upload an object, replacing any object with the same key.
    ///
    /// Returns the key as stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage policy rejects the write.
    #[instrument(skip(self, bytes, bearer), fields(size = bytes.len()))]
    pub async fn upload_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
        bearer: Bearer<'_>,
    ) -> Result<String, BackendError> {
        let request = self
            .request(Method::POST, &object_path(bucket, key), bearer)
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes);
        self.send_empty(request).await?;
        Ok(key.to_owned())
    }

    /// Remove objects by key. Missing keys are ignored by the service.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage policy rejects the delete.
    #[instrument(skip(self, keys, bearer), fields(count = keys.len()))]
    pub async fn remove_objects(
        &self,
        bucket: &str,
        keys: &[String],
        bearer: Bearer<'_>,
    ) -> Result<(), BackendError> {
        if keys.is_empty() {
            return Ok(());
        }
        let request = self
            .request(Method::DELETE, &format!("/storage/v1/object/{bucket}"), bearer)
            .json(&serde_json::json!({ "prefixes": keys }));
        self.send_empty(request).await
    }
}
