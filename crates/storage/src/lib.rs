//! Artifact storage for finished videos.
//!
//! [`ArtifactStore`] is the collaborator the pipeline and the delete
//! endpoint talk to; [`CloudinaryStore`] implements it against the
//! Cloudinary upload API with SHA-256 signed requests.

pub mod cloudinary;
pub mod locator;
pub mod store;

pub use cloudinary::{CloudinaryConfig, CloudinaryStore};
pub use locator::{parse_locator, Locator};
pub use store::{ArtifactStore, ResourceKind, StorageError, StoredArtifact};
