//! Code generation: concept description in, runnable scene source out.

use std::sync::Arc;

use explainer_genai::{GenerativeModel, ResponseSchema, StructuredRequest};
use serde::Deserialize;

use crate::error::PipelineError;

/// Source code and viewer-facing explanation returned by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedArtifact {
    pub source_code: String,
    pub explanation: String,
}

#[derive(Debug, Deserialize)]
struct CodeContract {
    python_code: Option<String>,
    explanation: Option<String>,
}

pub fn code_schema() -> ResponseSchema {
    ResponseSchema::strings(["python_code", "explanation"])
}

pub fn build_code_prompt(description: &str, entry_point: &str) -> String {
    format!(
        "Generate Manim code to create an animation explaining this concept: {description}\n\
         \n\
         Requirements:\n\
         1. The code must be complete and runnable.\n\
         2. Define exactly one Scene subclass named {entry_point}.\n\
         3. Use appropriate Manim constructs (MathTex, Text, etc.).\n\
         4. Keep animations clear and educational.\n\
         5. Ensure all elements stay within the frame.\n\
         6. Use appropriate colors and text sizes.\n\
         \n\
         The animation should be 30-60 seconds in length.\n\
         \n\
         Return only the Python code without any explanations or markdown.\n\
         Also provide a brief explanation of the visualization. Address the \
         animation as visualization in the explanation."
    )
}

/// Remove a surrounding Markdown code fence, if any.
pub fn strip_code_fences(code: &str) -> String {
    let trimmed = code.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    // Drop the info string (e.g. `python`) on the opening line.
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
        .to_string()
}

/// Parse the model's JSON answer into an artifact.
pub fn parse_code_response(text: &str) -> Result<GeneratedArtifact, PipelineError> {
    let contract: CodeContract = serde_json::from_str(text)
        .map_err(|e| PipelineError::Generation(format!("malformed model response: {e}")))?;

    let source_code = contract
        .python_code
        .map(|c| strip_code_fences(&c))
        .filter(|c| !c.is_empty())
        .ok_or_else(|| PipelineError::Generation("response has no python_code".into()))?;

    let explanation = contract
        .explanation
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .ok_or_else(|| PipelineError::Generation("response has no explanation".into()))?;

    Ok(GeneratedArtifact {
        source_code,
        explanation,
    })
}

pub struct CodeGenerationStage {
    model: Arc<dyn GenerativeModel>,
    entry_point: String,
}

impl CodeGenerationStage {
    pub fn new(model: Arc<dyn GenerativeModel>, entry_point: impl Into<String>) -> Self {
        Self {
            model,
            entry_point: entry_point.into(),
        }
    }

    pub async fn run(&self, description: &str) -> Result<GeneratedArtifact, PipelineError> {
        let request = StructuredRequest {
            prompt: build_code_prompt(description, &self.entry_point),
            file: None,
            schema: code_schema(),
        };

        let text = self
            .model
            .generate_structured(&request)
            .await
            .map_err(|e| PipelineError::Generation(e.to_string()))?;

        let artifact = parse_code_response(&text)?;
        tracing::debug!(
            code_chars = artifact.source_code.len(),
            explanation_chars = artifact.explanation.len(),
            "Scene code generated",
        );
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn prompt_names_entry_point_and_concept() {
        let prompt = build_code_prompt("the Pythagorean theorem", "ExplainConcept");
        assert!(prompt.contains("the Pythagorean theorem"));
        assert!(prompt.contains("named ExplainConcept"));
        assert!(prompt.contains("30-60 seconds"));
    }

    #[test]
    fn fences_are_stripped() {
        let fenced = "```python\nfrom manim import *\nclass A(Scene): pass\n```\n";
        assert_eq!(
            strip_code_fences(fenced),
            "from manim import *\nclass A(Scene): pass"
        );
        assert_eq!(strip_code_fences("  x = 1  "), "x = 1");
        assert_eq!(strip_code_fences("```\nx = 1\n```"), "x = 1");
    }

    #[test]
    fn valid_response_parses() {
        let artifact = parse_code_response(
            r#"{"python_code":"from manim import *","explanation":"The visualization shows a triangle."}"#,
        )
        .unwrap();
        assert_eq!(artifact.source_code, "from manim import *");
        assert_eq!(artifact.explanation, "The visualization shows a triangle.");
    }

    #[test]
    fn malformed_or_incomplete_responses_fail() {
        assert_matches!(parse_code_response("not json"), Err(PipelineError::Generation(_)));
        assert_matches!(
            parse_code_response(r#"{"explanation":"x"}"#),
            Err(PipelineError::Generation(msg)) if msg.contains("python_code")
        );
        assert_matches!(
            parse_code_response(r#"{"python_code":"x = 1","explanation":"   "}"#),
            Err(PipelineError::Generation(msg)) if msg.contains("explanation")
        );
    }
}
