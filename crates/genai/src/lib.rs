//! Generative-model client library.
//!
//! Defines the [`GenerativeModel`] collaborator used by the pipeline
//! (structured JSON generation, optionally conditioned on an uploaded
//! media file, plus the file upload/poll/delete sub-API) and a REST
//! implementation for the Gemini API.

pub mod gemini;
pub mod model;

pub use gemini::{GeminiClient, GeminiConfig};
pub use model::{
    FileRef, FileState, GenAiError, GenerativeModel, RemoteFile, ResponseSchema,
    StructuredRequest,
};
