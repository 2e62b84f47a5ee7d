use crate::stitcher::StitchStage;
use cv_features::FeatureError;
use cv_imgproc::ImgprocError;

/// Coarse classification of [`StitchError`] for callers that branch on the
/// failure class rather than the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StitchErrorKind {
    InputError,
    InsufficientMatches,
    HomographyFailure,
    EmptyResult,
    DeadlineExceeded,
    InvalidConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum StitchError {
    #[error("Input error: {0}")]
    Input(String),

    #[error("Not enough matches: found {found}, need at least {required}")]
    InsufficientMatches { found: usize, required: usize },

    #[error("Homography estimation failed: {0}")]
    HomographyFailure(String),

    #[error("Stitched result contains no content")]
    EmptyResult,

    #[error("Deadline exceeded at stage {stage}")]
    DeadlineExceeded { stage: StitchStage },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error(transparent)]
    Core(#[from] cv_core::Error),

    #[error(transparent)]
    Features(#[from] FeatureError),

    #[error(transparent)]
    Imgproc(#[from] ImgprocError),
}

impl StitchError {
    pub fn kind(&self) -> StitchErrorKind {
        match self {
            StitchError::Input(_)
            | StitchError::DimensionMismatch(_)
            | StitchError::Encode(_)
            | StitchError::Core(_) => StitchErrorKind::InputError,
            StitchError::InsufficientMatches { .. } => StitchErrorKind::InsufficientMatches,
            StitchError::HomographyFailure(_) => StitchErrorKind::HomographyFailure,
            StitchError::EmptyResult => StitchErrorKind::EmptyResult,
            StitchError::DeadlineExceeded { .. } => StitchErrorKind::DeadlineExceeded,
            StitchError::InvalidConfig(_) => StitchErrorKind::InvalidConfig,
            StitchError::Features(FeatureError::EstimationError(_)) => {
                StitchErrorKind::HomographyFailure
            }
            StitchError::Features(_) => StitchErrorKind::InputError,
            StitchError::Imgproc(ImgprocError::AlgorithmError(_)) => {
                StitchErrorKind::HomographyFailure
            }
            StitchError::Imgproc(_) => StitchErrorKind::InputError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_variants() {
        let err = StitchError::InsufficientMatches {
            found: 3,
            required: 10,
        };
        assert_eq!(err.kind(), StitchErrorKind::InsufficientMatches);
        assert_eq!(
            err.to_string(),
            "Not enough matches: found 3, need at least 10"
        );

        assert_eq!(
            StitchError::DimensionMismatch("x".into()).kind(),
            StitchErrorKind::InputError
        );
        assert_eq!(
            StitchError::from(FeatureError::EstimationError("x".into())).kind(),
            StitchErrorKind::HomographyFailure
        );
        assert_eq!(
            StitchError::from(ImgprocError::DimensionMismatch("x".into())).kind(),
            StitchErrorKind::InputError
        );
    }

    #[test]
    fn deadline_message_names_stage() {
        let err = StitchError::DeadlineExceeded {
            stage: StitchStage::Matched,
        };
        assert_eq!(err.kind(), StitchErrorKind::DeadlineExceeded);
        assert!(err.to_string().contains("matched"));
    }
}
