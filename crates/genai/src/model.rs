//! Provider-neutral types for the generative-model collaborator.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Errors from the generative-model layer.
#[derive(Debug, thiserror::Error)]
pub enum GenAiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code.
    #[error("model API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The provider answered but produced no usable text.
    #[error("model returned no content: {0}")]
    EmptyResponse(String),

    /// The resumable upload session did not return an upload URL.
    #[error("upload session did not return an upload URL")]
    MissingUploadUrl,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Processing state of an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    Processing,
    Active,
    Failed,
    #[serde(other)]
    StateUnspecified,
}

/// A file held by the provider for analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    /// Provider resource name, e.g. `files/abc123`.
    pub name: String,
    /// URI used to reference the file in generation requests.
    pub uri: String,
    pub mime_type: String,
    pub state: FileState,
}

impl RemoteFile {
    pub fn file_ref(&self) -> FileRef {
        FileRef {
            uri: self.uri.clone(),
            mime_type: self.mime_type.clone(),
        }
    }
}

/// Reference to an uploaded file inside a generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub uri: String,
    pub mime_type: String,
}

/// JSON response contract: an object whose listed fields are all required
/// strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSchema {
    pub string_fields: Vec<String>,
}

impl ResponseSchema {
    pub fn strings<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            string_fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// OpenAPI-style schema object understood by the provider.
    pub fn to_json(&self) -> serde_json::Value {
        let properties: serde_json::Map<String, serde_json::Value> = self
            .string_fields
            .iter()
            .map(|f| (f.clone(), serde_json::json!({ "type": "STRING" })))
            .collect();

        serde_json::json!({
            "type": "OBJECT",
            "properties": properties,
            "required": self.string_fields,
        })
    }
}

/// A structured-output generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredRequest {
    pub prompt: String,
    /// Optional uploaded media the answer should be conditioned on.
    pub file: Option<FileRef>,
    pub schema: ResponseSchema,
}

/// Generative model collaborator.
///
/// `generate_structured` returns the raw JSON text; parsing it against the
/// schema is the caller's responsibility.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate_structured(&self, request: &StructuredRequest) -> Result<String, GenAiError>;

    async fn upload_file(&self, path: &Path, mime_type: &str) -> Result<RemoteFile, GenAiError>;

    async fn file_state(&self, name: &str) -> Result<FileState, GenAiError>;

    async fn delete_file(&self, name: &str) -> Result<(), GenAiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_lists_required_string_fields() {
        let schema = ResponseSchema::strings(["python_code", "explanation"]).to_json();
        assert_eq!(schema["type"], "OBJECT");
        assert_eq!(schema["properties"]["python_code"]["type"], "STRING");
        assert_eq!(
            schema["required"],
            serde_json::json!(["python_code", "explanation"])
        );
    }

    #[test]
    fn file_state_parses_provider_values() {
        let state: FileState = serde_json::from_str(r#""ACTIVE""#).unwrap();
        assert_eq!(state, FileState::Active);
        let state: FileState = serde_json::from_str(r#""PROCESSING""#).unwrap();
        assert_eq!(state, FileState::Processing);
        let state: FileState = serde_json::from_str(r#""SOMETHING_NEW""#).unwrap();
        assert_eq!(state, FileState::StateUnspecified);
    }
}
