//! Concept request value object and its validation rules.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::error::CoreError;

/// Lowest accepted speech-rate multiplier.
pub const MIN_SPEECH_SPEED: f32 = 0.5;

/// Highest accepted speech-rate multiplier.
pub const MAX_SPEECH_SPEED: f32 = 2.0;

/// Speech-rate multiplier used when the request omits one.
pub const DEFAULT_SPEECH_SPEED: f32 = 1.0;

/// Maximum description length in characters.
pub const MAX_DESCRIPTION_CHARS: u64 = 2000;

/// Narration voice category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceType {
    #[default]
    Male,
    Female,
    Child,
}

impl VoiceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Child => "child",
        }
    }
}

/// A request to explain a concept with a narrated animation.
///
/// Immutable for the lifetime of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ConceptRequest {
    /// Free-text description of the concept to visualize.
    #[validate(
        length(min = 1, max = 2000),
        custom(function = "validate_not_blank")
    )]
    pub description: String,
    /// Narration voice category (default: male).
    #[serde(default)]
    pub voice_type: VoiceType,
    /// Speech-rate multiplier (default: 1.0).
    #[serde(default = "default_speech_speed")]
    #[validate(range(min = 0.5, max = 2.0))]
    pub speech_speed: f32,
}

impl ConceptRequest {
    /// Build a request with default voice and speed.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            voice_type: VoiceType::default(),
            speech_speed: DEFAULT_SPEECH_SPEED,
        }
    }

    /// Validate field constraints, mapping failures into [`CoreError::Validation`].
    pub fn check(&self) -> Result<(), CoreError> {
        self.validate()
            .map_err(|e| CoreError::Validation(e.to_string()))
    }
}

fn default_speech_speed() -> f32 {
    DEFAULT_SPEECH_SPEED
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("description must not be blank".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn defaults_apply_when_fields_missing() {
        let req: ConceptRequest =
            serde_json::from_str(r#"{"description": "the Pythagorean theorem"}"#).unwrap();
        assert_eq!(req.voice_type, VoiceType::Male);
        assert!((req.speech_speed - DEFAULT_SPEECH_SPEED).abs() < f32::EPSILON);
        assert!(req.check().is_ok());
    }

    #[test]
    fn voice_type_parses_lowercase() {
        let req: ConceptRequest = serde_json::from_str(
            r#"{"description": "entropy", "voice_type": "child", "speech_speed": 1.5}"#,
        )
        .unwrap();
        assert_eq!(req.voice_type, VoiceType::Child);
        assert_eq!(req.voice_type.as_str(), "child");
    }

    #[test]
    fn unknown_voice_type_is_rejected() {
        let result = serde_json::from_str::<ConceptRequest>(
            r#"{"description": "entropy", "voice_type": "robot"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn blank_description_fails_validation() {
        let req = ConceptRequest::new("   ");
        assert_matches!(req.check(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn empty_description_fails_validation() {
        let req = ConceptRequest::new("");
        assert_matches!(req.check(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn speech_speed_out_of_range_fails_validation() {
        let mut req = ConceptRequest::new("fourier series");
        req.speech_speed = 2.5;
        assert_matches!(req.check(), Err(CoreError::Validation(_)));

        req.speech_speed = 0.25;
        assert_matches!(req.check(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn speech_speed_bounds_are_inclusive() {
        let mut req = ConceptRequest::new("fourier series");
        req.speech_speed = MIN_SPEECH_SPEED;
        assert!(req.check().is_ok());
        req.speech_speed = MAX_SPEECH_SPEED;
        assert!(req.check().is_ok());
    }

    #[test]
    fn overlong_description_fails_validation() {
        let req = ConceptRequest::new("x".repeat(MAX_DESCRIPTION_CHARS as usize + 1));
        assert_matches!(req.check(), Err(CoreError::Validation(_)));
    }
}
