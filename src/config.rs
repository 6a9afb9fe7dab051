use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::GestureError;
use crate::types::Joint;

/// Engine parameters shared by detection, training and recording.
/// Loaded once and passed to constructors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Joints below this position confidence disable detection for the frame (default: 0.1)
    pub min_confidence: f32,
    /// Absolute matcher: threshold = std * angle_threshold_mul (default: 3.0)
    pub angle_threshold_mul: f32,
    /// Absolute matcher: per-axis threshold floor in degrees (default: 20.0)
    pub min_angle_threshold: f32,
    /// Relative matcher: threshold = std * coord_threshold_mul (default: 3.0)
    pub coord_threshold_mul: f32,
    /// Relative matcher: per-axis threshold floor (default: 0.3)
    pub min_coord_threshold: f32,
    /// Interval tolerance = robust std * time_threshold_mul (default: 10.0)
    pub time_threshold_mul: f32,
    /// Frames to wait before repeating a held gesture (default: 50)
    pub repeat_wait_frames: u32,
    /// Held end posture must keep this fraction of its score at detection (default: 0.5)
    pub hold_score_ratio: f32,
    /// Minimum seconds between two recorded frames (default: 0.025)
    pub min_record_interval: f32,
    /// Joints used for training when none are given
    pub default_detect_joints: Vec<Joint>,
    /// Joints captured by the recorder. Torso and both shoulders are needed
    /// for the body frame, limb ends for the features of their parents.
    pub default_record_joints: Vec<Joint>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.1,
            angle_threshold_mul: 3.0,
            min_angle_threshold: 20.0,
            coord_threshold_mul: 3.0,
            min_coord_threshold: 0.3,
            time_threshold_mul: 10.0,
            repeat_wait_frames: 50,
            hold_score_ratio: 0.5,
            min_record_interval: 0.025,
            default_detect_joints: vec![
                Joint::LeftShoulder,
                Joint::LeftElbow,
                Joint::RightShoulder,
                Joint::RightElbow,
            ],
            default_record_joints: vec![
                Joint::LeftShoulder,
                Joint::LeftElbow,
                Joint::LeftHand,
                Joint::RightShoulder,
                Joint::RightElbow,
                Joint::RightHand,
                Joint::Torso,
            ],
        }
    }
}

impl EngineConfig {
    /// Reads a JSON config. Missing fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GestureError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
