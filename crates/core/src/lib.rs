//! Domain types and external-process collaborators for the concept
//! explainer service.
//!
//! Everything here is free of HTTP and provider-API concerns: request
//! validation, the shared subprocess runner, the bounded polling utility,
//! file readiness checks, and the renderer / media / speech tools that
//! wrap command-line binaries.

pub mod concept;
pub mod error;
pub mod ffmpeg;
pub mod poll;
pub mod process;
pub mod readiness;
pub mod render;
pub mod speech;
