//! The four pipeline stages, in execution order.

pub mod generation;
pub mod mux;
pub mod narration;
pub mod render;

pub use generation::{CodeGenerationStage, GeneratedArtifact};
pub use mux::{FinalVideo, MuxStage};
pub use narration::{AudioTrack, NarrationOutput, NarrationStage, RemoteUploadGuard};
pub use render::{RenderStage, RenderedVideo};
