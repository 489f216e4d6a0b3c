/// Result of a stage that can degrade instead of failing.
///
/// Fatal stage errors travel as `Result::Err`; a `StageOutcome` always
/// carries a usable value.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    Complete(T),
    Degraded { value: T, warnings: Vec<String> },
}

impl<T> StageOutcome<T> {
    /// `Complete` when `warnings` is empty, `Degraded` otherwise.
    pub fn from_parts(value: T, warnings: Vec<String>) -> Self {
        if warnings.is_empty() {
            Self::Complete(value)
        } else {
            Self::Degraded { value, warnings }
        }
    }

    pub fn value(&self) -> &T {
        match self {
            Self::Complete(value) | Self::Degraded { value, .. } => value,
        }
    }

    pub fn warnings(&self) -> &[String] {
        match self {
            Self::Complete(_) => &[],
            Self::Degraded { warnings, .. } => warnings,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    pub fn into_parts(self) -> (T, Vec<String>) {
        match self {
            Self::Complete(value) => (value, Vec::new()),
            Self::Degraded { value, warnings } => (value, warnings),
        }
    }
}
