use crate::dataset::TimeLabel;
use crate::pipeline::ModelId;
use thiserror::Error;

/// Error type for failed verification steps.
///
/// An empty time overlap is not represented here: it is a valid outcome that
/// produces an empty [`VerificationResult`](crate::pipeline::VerificationResult).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VerifyError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("No {model} slice found at {time} although it is part of the resolved overlap")]
    MissingSlice { model: ModelId, time: TimeLabel },
    #[error(
        "No truth field within {tolerance_seconds}s of {time} (nearest available: {})",
        describe_nearest(.nearest)
    )]
    TruthOutOfTolerance {
        time: TimeLabel,
        nearest: Option<TimeLabel>,
        tolerance_seconds: i64,
    },
    #[error("Insufficient data: {0}")]
    InsufficientData(String),
    #[error("Cannot align grids: {0}")]
    Alignment(String),
    #[error("Verification of {model} at {time} failed: {source}")]
    Slice {
        model: ModelId,
        time: TimeLabel,
        #[source]
        source: Box<VerifyError>,
    },
}

impl VerifyError {
    /// Wrap an error with the model and time at which it occurred.
    pub fn at_slice(self, model: ModelId, time: TimeLabel) -> Self {
        VerifyError::Slice {
            model,
            time,
            source: Box::new(self),
        }
    }

    /// The innermost error, unwrapping any [`VerifyError::Slice`] context.
    pub fn root(&self) -> &VerifyError {
        match self {
            VerifyError::Slice { source, .. } => source.root(),
            other => other,
        }
    }
}

fn describe_nearest(nearest: &Option<TimeLabel>) -> String {
    nearest.map_or_else(|| "none".to_string(), |t| t.to_string())
}

/// Convenience type for `Result<T, VerifyError>`.
pub type VerifyResult<T> = Result<T, VerifyError>;
