//! Cloudinary implementation of [`ArtifactStore`].
//!
//! Uploads and deletes are signed requests: the parameters (excluding the
//! file, the API key and the resource type) are sorted, joined as
//! `k=v&k=v`, suffixed with the API secret and hashed with SHA-256.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::store::{ArtifactStore, ResourceKind, StorageError, StoredArtifact};

pub const DEFAULT_API_BASE: &str = "https://api.cloudinary.com";

#[derive(Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub api_base: String,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for CloudinaryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudinaryConfig")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

fn required_env(name: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| panic!("{name} must be set"))
}

impl CloudinaryConfig {
    /// Load configuration from environment variables.
    ///
    /// `CLOUDINARY_CLOUD_NAME`, `CLOUDINARY_API_KEY` and
    /// `CLOUDINARY_API_SECRET` are required. `CLOUDINARY_API_BASE` and
    /// `CLOUDINARY_REQUEST_TIMEOUT_SECS` (default `300`) are optional.
    pub fn from_env() -> Self {
        let request_timeout_secs: u64 = std::env::var("CLOUDINARY_REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "300".into())
            .parse()
            .expect("CLOUDINARY_REQUEST_TIMEOUT_SECS must be a valid u64");

        Self {
            cloud_name: required_env("CLOUDINARY_CLOUD_NAME"),
            api_key: required_env("CLOUDINARY_API_KEY"),
            api_secret: required_env("CLOUDINARY_API_SECRET"),
            api_base: std::env::var("CLOUDINARY_API_BASE")
                .unwrap_or_else(|_| DEFAULT_API_BASE.into()),
            request_timeout: Duration::from_secs(request_timeout_secs),
        }
    }
}

/// Sign a parameter set with the account secret.
pub fn sign_params(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().filter(|(_, v)| !v.is_empty()).collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    format!("{:x}", Sha256::digest(format!("{joined}{api_secret}").as_bytes()))
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

pub struct CloudinaryStore {
    client: reqwest::Client,
    config: CloudinaryConfig,
}

impl CloudinaryStore {
    pub fn new(config: CloudinaryConfig) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, kind: ResourceKind, action: &str) -> String {
        format!(
            "{}/v1_1/{}/{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.cloud_name,
            kind.as_str(),
            action
        )
    }

    /// Signed form fields for `params`, including the key, algorithm and
    /// signature.
    fn signed_fields(&self, params: Vec<(&'static str, String)>) -> Vec<(&'static str, String)> {
        let signature = sign_params(&params, &self.config.api_secret);
        let mut fields = params;
        fields.push(("api_key", self.config.api_key.clone()));
        fields.push(("signature_algorithm", "sha256".into()));
        fields.push(("signature", signature));
        fields
    }

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, StorageError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(StorageError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

fn timestamp() -> String {
    chrono::Utc::now().timestamp().to_string()
}

#[async_trait]
impl ArtifactStore for CloudinaryStore {
    async fn upload(
        &self,
        path: &Path,
        kind: ResourceKind,
        folder: &str,
    ) -> Result<StoredArtifact, StorageError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".into());

        let fields = self.signed_fields(vec![
            ("folder", folder.to_string()),
            ("timestamp", timestamp()),
        ]);

        let mut form = reqwest::multipart::Form::new()
            .part("file", reqwest::multipart::Part::bytes(bytes).file_name(file_name));
        for (k, v) in fields {
            form = form.text(k, v);
        }

        let response = self
            .client
            .post(self.endpoint(kind, "upload"))
            .multipart(form)
            .send()
            .await?;
        let uploaded: UploadResponse = Self::ensure_success(response).await?.json().await?;

        tracing::info!(public_id = %uploaded.public_id, kind = kind.as_str(), "Artifact uploaded");
        Ok(StoredArtifact {
            url: uploaded.secure_url,
            public_id: uploaded.public_id,
        })
    }

    async fn destroy(&self, public_id: &str, kind: ResourceKind) -> Result<(), StorageError> {
        let fields = self.signed_fields(vec![
            ("public_id", public_id.to_string()),
            ("timestamp", timestamp()),
        ]);

        let response = self
            .client
            .post(self.endpoint(kind, "destroy"))
            .form(&fields)
            .send()
            .await?;
        let parsed: DestroyResponse = Self::ensure_success(response).await?.json().await?;

        if parsed.result != "ok" {
            return Err(StorageError::DestroyFailed {
                public_id: public_id.to_string(),
                result: parsed.result,
            });
        }
        tracing::info!(public_id, kind = kind.as_str(), "Artifact deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CloudinaryConfig {
        CloudinaryConfig {
            cloud_name: "demo".into(),
            api_key: "1234".into(),
            api_secret: "shh".into(),
            api_base: "https://api.example/".into(),
            request_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn signature_is_order_independent() {
        let a = sign_params(
            &[("timestamp", "100".into()), ("folder", "f".into())],
            "secret",
        );
        let b = sign_params(
            &[("folder", "f".into()), ("timestamp", "100".into())],
            "secret",
        );
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn signature_hashes_joined_params_and_secret() {
        let expected = format!("{:x}", Sha256::digest(b"folder=f&timestamp=100secret"));
        let actual = sign_params(
            &[("timestamp", "100".into()), ("folder", "f".into())],
            "secret",
        );
        assert_eq!(actual, expected);
    }

    #[test]
    fn empty_values_are_not_signed() {
        let with_empty = sign_params(
            &[("timestamp", "100".into()), ("folder", String::new())],
            "secret",
        );
        let without = sign_params(&[("timestamp", "100".into())], "secret");
        assert_eq!(with_empty, without);
    }

    #[test]
    fn endpoint_includes_cloud_and_kind() {
        let store = CloudinaryStore::new(config()).expect("store");
        assert_eq!(
            store.endpoint(ResourceKind::Video, "destroy"),
            "https://api.example/v1_1/demo/video/destroy"
        );
    }

    #[test]
    fn signed_fields_carry_key_and_algorithm() {
        let store = CloudinaryStore::new(config()).expect("store");
        let fields = store.signed_fields(vec![("public_id", "a/b".into())]);
        let names: Vec<&str> = fields.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            names,
            vec!["public_id", "api_key", "signature_algorithm", "signature"]
        );
    }

    #[test]
    fn debug_output_redacts_secret() {
        assert!(!format!("{:?}", config()).contains("shh"));
    }
}
