/// Pipeline failure taxonomy.
///
/// `Generation`, `Render`, `Upload` and `Scratch` abort the current attempt.
/// `NarrationAnalysis`, `SpeechSynthesis` and `Mux` are downgraded to
/// warnings inside their stages and only surface as text. `Cancelled` and
/// `ExhaustedRetries` are terminal.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    #[error("Code generation failed: {0}")]
    Generation(String),

    #[error("Render failed: {0}")]
    Render(String),

    #[error("Narration analysis failed: {0}")]
    NarrationAnalysis(String),

    #[error("Speech synthesis failed: {0}")]
    SpeechSynthesis(String),

    #[error("Mux failed: {0}")]
    Mux(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Scratch filesystem error: {0}")]
    Scratch(String),

    #[error("Pipeline cancelled")]
    Cancelled,

    #[error("Failed after {attempts} attempts: {last_error}")]
    ExhaustedRetries { attempts: u32, last_error: String },
}

impl PipelineError {
    pub fn scratch(context: &str, err: std::io::Error) -> Self {
        Self::Scratch(format!("{context}: {err}"))
    }
}
