use thiserror::Error;

use crate::types::Joint;

#[derive(Error, Debug)]
pub enum GestureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown joint name: {0}")]
    UnknownJoint(String),

    #[error("Joint {0} has no feature vector (limb end)")]
    JointWithoutFeature(Joint),

    #[error("Gesture {0} has no postures")]
    NoPostures(String),

    #[error("Posture {posture} has {actual} joint matchers, expected {expected}")]
    MatcherCount {
        posture: String,
        expected: usize,
        actual: usize,
    },

    #[error("Relative joint matcher in the first posture of {0}")]
    RelativeInFirstPosture(String),

    #[error("A posture sequence needs at least one state")]
    EmptySequence,

    #[error("Invalid {what} length: expected {expected}, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("No tagged frames to train from")]
    NoTaggedFrames,

    #[error("No joints selected for training")]
    NoJoints,
}
