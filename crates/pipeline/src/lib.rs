//! Concept-explainer video pipeline.
//!
//! Turns a [`ConceptRequest`](explainer_core::concept::ConceptRequest) into a
//! narrated video: code generation, render, narration, mux and upload, run
//! inside a bounded retry loop with per-attempt cleanup. Every external
//! capability is injected as a trait object so the whole chain can be driven
//! by stubs.

pub mod config;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod outcome;
pub mod stages;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::{BackoffPolicy, PipelineConfig};
pub use context::{AttemptScope, RequestContext};
pub use error::PipelineError;
pub use orchestrator::{AttemptState, Collaborators, Pipeline, PipelineResult};
pub use outcome::StageOutcome;
