//! The storage collaborator trait and its shared types.

use std::path::Path;

use async_trait::async_trait;

use crate::locator::parse_locator;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("storage API error ({status}): {body}")]
    ApiError { status: u16, body: String },

    /// The URL does not carry a recognisable public identifier.
    #[error("Invalid video URL format: {0}")]
    InvalidLocator(String),

    /// The provider answered but did not report a successful delete.
    #[error("Failed to delete video '{public_id}': {result}")]
    DestroyFailed { public_id: String, result: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Provider resource class of a stored asset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResourceKind {
    Image,
    #[default]
    Video,
    Raw,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Raw => "raw",
        }
    }

    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "raw" => Some(Self::Raw),
            _ => None,
        }
    }
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    /// Public HTTPS URL of the stored file.
    pub url: String,
    pub public_id: String,
}

/// Durable storage for finished artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn upload(
        &self,
        path: &Path,
        kind: ResourceKind,
        folder: &str,
    ) -> Result<StoredArtifact, StorageError>;

    async fn destroy(&self, public_id: &str, kind: ResourceKind) -> Result<(), StorageError>;

    /// Delete the asset behind a public URL.
    ///
    /// A URL that does not parse is rejected before any provider call.
    async fn delete_by_url(&self, url: &str) -> Result<String, StorageError> {
        let locator = parse_locator(url)?;
        self.destroy(&locator.public_id, locator.kind).await?;
        Ok(locator.public_id)
    }
}
