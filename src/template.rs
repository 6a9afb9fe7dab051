//! Persistent form of a trained gesture. Only trained values are stored;
//! runtime state is rebuilt by [`GestureDetector::from_template`].
//!
//! [`GestureDetector::from_template`]: crate::gesture_detector::GestureDetector::from_template

use std::fs;
use std::path::Path;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::GestureError;
use crate::joint_matcher::MatcherKind;
use crate::types::Joint;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatcherTemplate {
    pub kind: MatcherKind,
    pub joint: Joint,
    pub template: Vector3<f32>,
    pub threshold: Vector3<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostureTemplate {
    pub name: String,
    pub matchers: Vec<MatcherTemplate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureTemplate {
    pub name: String,
    pub joints: Vec<Joint>,
    /// Scales the thresholds of every joint in a posture. Raising it makes
    /// the posture easier to match.
    pub threshold_mul_per_posture: Vec<f32>,
    /// Scales the thresholds of one joint in every posture
    pub threshold_mul_per_joint: Vec<f32>,
    pub postures: Vec<PostureTemplate>,
    /// Expected seconds between consecutive postures
    pub intervals: Vec<f32>,
    pub interval_tolerance: Vec<f32>,
    /// Scales every interval tolerance
    #[serde(default = "unit_mul")]
    pub time_interval_mul: f32,
}

fn unit_mul() -> f32 {
    1.0
}

impl GestureTemplate {
    pub fn from_json(json: &str) -> Result<Self, GestureError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, GestureError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, GestureError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), GestureError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
