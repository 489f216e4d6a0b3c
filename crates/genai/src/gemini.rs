//! REST client for the Gemini `v1beta` API.
//!
//! Covers the calls the pipeline needs: `generateContent` with a JSON
//! response schema, and the Files API (resumable upload, state lookup,
//! delete).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::model::{
    FileState, GenAiError, GenerativeModel, RemoteFile, StructuredRequest,
};

/// Default API host.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Connection settings for [`GeminiClient`].
#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    /// Per-request timeout applied to every HTTP call.
    pub request_timeout: Duration,
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl GeminiConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                      | Default                                      |
    /// |------------------------------|----------------------------------------------|
    /// | `GEMINI_API_KEY`             | required                                     |
    /// | `GEMINI_MODEL`               | `gemini-2.0-flash`                           |
    /// | `GEMINI_BASE_URL`            | `https://generativelanguage.googleapis.com`  |
    /// | `GEMINI_REQUEST_TIMEOUT_SECS`| `120`                                        |
    ///
    /// Panics if the API key is missing, so misconfiguration fails at
    /// start-up rather than per request.
    pub fn from_env() -> Self {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .expect("GEMINI_API_KEY must be set");

        let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into());
        let base_url =
            std::env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());

        let request_timeout_secs: u64 = std::env::var("GEMINI_REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "120".into())
            .parse()
            .expect("GEMINI_REQUEST_TIMEOUT_SECS must be a valid u64");

        Self {
            api_key,
            model,
            base_url,
            request_timeout: Duration::from_secs(request_timeout_secs),
        }
    }
}

/// HTTP client for the Gemini API.
pub struct GeminiClient {
    client: reqwest::Client,
    config: GeminiConfig,
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: RemoteFile,
}

/// Build the `generateContent` request body.
fn build_generate_body(request: &StructuredRequest) -> serde_json::Value {
    let mut parts = Vec::new();
    if let Some(file) = &request.file {
        parts.push(serde_json::json!({
            "fileData": { "mimeType": file.mime_type, "fileUri": file.uri }
        }));
    }
    parts.push(serde_json::json!({ "text": request.prompt }));

    serde_json::json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": request.schema.to_json(),
        },
    })
}

/// Concatenate the text parts of the first candidate.
fn extract_text(response: GenerateContentResponse) -> Result<String, GenAiError> {
    if let Some(reason) = response
        .prompt_feedback
        .and_then(|f| f.block_reason)
    {
        return Err(GenAiError::EmptyResponse(format!("prompt blocked: {reason}")));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| GenAiError::EmptyResponse("no candidates".into()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(GenAiError::EmptyResponse(format!(
            "finish reason {}",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }
    Ok(text)
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, GenAiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/v1beta/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`GenAiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, GenAiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(GenAiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GenAiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate_structured(&self, request: &StructuredRequest) -> Result<String, GenAiError> {
        let url = self.api_url(&format!("models/{}:generateContent", self.config.model));
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&build_generate_body(request))
            .send()
            .await?;

        let parsed: GenerateContentResponse = Self::parse_response(response).await?;
        extract_text(parsed)
    }

    /// Resumable two-step upload: open a session, then send the bytes and
    /// finalize in one request.
    async fn upload_file(&self, path: &Path, mime_type: &str) -> Result<RemoteFile, GenAiError> {
        let bytes = tokio::fs::read(path).await?;
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".into());

        let start_url = format!(
            "{}/upload/v1beta/files",
            self.config.base_url.trim_end_matches('/')
        );
        let start = self
            .client
            .post(start_url)
            .header("x-goog-api-key", &self.config.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&serde_json::json!({ "file": { "display_name": display_name } }))
            .send()
            .await?;
        let start = Self::ensure_success(start).await?;

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or(GenAiError::MissingUploadUrl)?;

        let size = bytes.len();
        let response = self
            .client
            .post(upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .await?;

        let uploaded: UploadResponse = Self::parse_response(response).await?;
        tracing::debug!(
            name = %uploaded.file.name,
            size_bytes = size,
            state = ?uploaded.file.state,
            "Uploaded file to model provider",
        );
        Ok(uploaded.file)
    }

    async fn file_state(&self, name: &str) -> Result<FileState, GenAiError> {
        let response = self
            .client
            .get(self.api_url(name))
            .header("x-goog-api-key", &self.config.api_key)
            .send()
            .await?;

        let file: RemoteFile = Self::parse_response(response).await?;
        Ok(file.state)
    }

    async fn delete_file(&self, name: &str) -> Result<(), GenAiError> {
        let response = self
            .client
            .delete(self.api_url(name))
            .header("x-goog-api-key", &self.config.api_key)
            .send()
            .await?;

        Self::ensure_success(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::model::{FileRef, ResponseSchema};

    fn client() -> GeminiClient {
        GeminiClient::new(GeminiConfig {
            api_key: "test-key".into(),
            model: DEFAULT_MODEL.into(),
            base_url: "https://example.test/".into(),
            request_timeout: Duration::from_secs(5),
        })
        .expect("client")
    }

    #[test]
    fn api_url_joins_without_double_slashes() {
        let c = client();
        assert_eq!(
            c.api_url("files/abc123"),
            "https://example.test/v1beta/files/abc123"
        );
        assert_eq!(
            c.api_url("models/gemini-2.0-flash:generateContent"),
            "https://example.test/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn generate_body_puts_file_before_prompt() {
        let request = StructuredRequest {
            prompt: "Narrate this video".into(),
            file: Some(FileRef {
                uri: "https://example.test/v1beta/files/abc".into(),
                mime_type: "video/mp4".into(),
            }),
            schema: ResponseSchema::strings(["narration"]),
        };
        let body = build_generate_body(&request);
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["fileData"]["mimeType"], "video/mp4");
        assert_eq!(parts[1]["text"], "Narrate this video");
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(
            body["generationConfig"]["responseSchema"]["required"][0],
            "narration"
        );
    }

    #[test]
    fn generate_body_without_file_has_only_text() {
        let request = StructuredRequest {
            prompt: "Explain".into(),
            file: None,
            schema: ResponseSchema::strings(["python_code", "explanation"]),
        };
        let body = build_generate_body(&request);
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn extract_text_joins_candidate_parts() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"{\"a\":"},{"text":"\"b\"}"}]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), r#"{"a":"b"}"#);
    }

    #[test]
    fn extract_text_reports_blocked_prompt() {
        let response: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        assert_matches!(
            extract_text(response),
            Err(GenAiError::EmptyResponse(msg)) if msg.contains("SAFETY")
        );
    }

    #[test]
    fn extract_text_reports_empty_candidate() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[]},"finishReason":"MAX_TOKENS"}]}"#,
        )
        .unwrap();
        assert_matches!(
            extract_text(response),
            Err(GenAiError::EmptyResponse(msg)) if msg.contains("MAX_TOKENS")
        );
    }

    #[test]
    fn upload_response_parses_file_object() {
        let parsed: UploadResponse = serde_json::from_str(
            r#"{"file":{"name":"files/xyz","displayName":"v.mp4","mimeType":"video/mp4","sizeBytes":"2048","uri":"https://example.test/v1beta/files/xyz","state":"PROCESSING"}}"#,
        )
        .unwrap();
        assert_eq!(parsed.file.name, "files/xyz");
        assert_eq!(parsed.file.state, FileState::Processing);
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let c = client();
        let rendered = format!("{:?}", c.config);
        assert!(!rendered.contains("test-key"));
    }
}
