use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::GestureError;

/// Feature vector of one joint: normalized body-relative direction
pub type FeatureVector = Vector3<f32>;

/// Number of tracked skeleton joints
pub const JOINT_COUNT: usize = 15;

/// Confidence value of a joint that was never written by the sensor
pub const UNINITIALIZED_CONFIDENCE: f32 = -1.0;

/// Tracked skeleton joints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Joint {
    Head,
    Neck,
    Torso,
    LeftShoulder,
    LeftElbow,
    LeftHand,
    LeftHip,
    LeftKnee,
    LeftFoot,
    RightShoulder,
    RightElbow,
    RightHand,
    RightHip,
    RightKnee,
    RightFoot,
}

impl Joint {
    pub const ALL: [Joint; JOINT_COUNT] = [
        Joint::Head,
        Joint::Neck,
        Joint::Torso,
        Joint::LeftShoulder,
        Joint::LeftElbow,
        Joint::LeftHand,
        Joint::LeftHip,
        Joint::LeftKnee,
        Joint::LeftFoot,
        Joint::RightShoulder,
        Joint::RightElbow,
        Joint::RightHand,
        Joint::RightHip,
        Joint::RightKnee,
        Joint::RightFoot,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// The joint a feature vector points to, starting from `self`.
    /// Joints at the end of a limb have no feature.
    pub fn end_joint(self) -> Option<Joint> {
        match self {
            Joint::Neck => Some(Joint::Torso),
            Joint::LeftShoulder => Some(Joint::LeftElbow),
            Joint::LeftElbow => Some(Joint::LeftHand),
            Joint::LeftHip => Some(Joint::LeftKnee),
            Joint::LeftKnee => Some(Joint::LeftFoot),
            Joint::RightShoulder => Some(Joint::RightElbow),
            Joint::RightElbow => Some(Joint::RightHand),
            Joint::RightHip => Some(Joint::RightKnee),
            Joint::RightKnee => Some(Joint::RightFoot),
            Joint::Head
            | Joint::Torso
            | Joint::LeftHand
            | Joint::LeftFoot
            | Joint::RightHand
            | Joint::RightFoot => None,
        }
    }

    pub fn has_feature(self) -> bool {
        self.end_joint().is_some()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Joint::Head => "head",
            Joint::Neck => "neck",
            Joint::Torso => "torso",
            Joint::LeftShoulder => "left_shoulder",
            Joint::LeftElbow => "left_elbow",
            Joint::LeftHand => "left_hand",
            Joint::LeftHip => "left_hip",
            Joint::LeftKnee => "left_knee",
            Joint::LeftFoot => "left_foot",
            Joint::RightShoulder => "right_shoulder",
            Joint::RightElbow => "right_elbow",
            Joint::RightHand => "right_hand",
            Joint::RightHip => "right_hip",
            Joint::RightKnee => "right_knee",
            Joint::RightFoot => "right_foot",
        }
    }
}

impl fmt::Display for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Joint {
    type Err = GestureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Joint::ALL
            .iter()
            .copied()
            .find(|j| j.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| GestureError::UnknownJoint(wanted.to_string()))
    }
}

/// Raw data of one joint in one frame, as delivered by the sensor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointObservation {
    pub position: Vector3<f32>,
    /// -1 if not initialized
    pub position_confidence: f32,
    /// Columns: forward, up, right
    pub orientation: Matrix3<f32>,
    /// -1 if not initialized
    pub orientation_confidence: f32,
}

impl JointObservation {
    /// Observation known only by position, fully confident
    pub fn from_position(position: Vector3<f32>) -> Self {
        Self {
            position,
            position_confidence: 1.0,
            orientation: Matrix3::identity(),
            orientation_confidence: 1.0,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.position_confidence >= 0.0
    }
}

impl Default for JointObservation {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            position_confidence: UNINITIALIZED_CONFIDENCE,
            orientation: Matrix3::zeros(),
            orientation_confidence: UNINITIALIZED_CONFIDENCE,
        }
    }
}

/// One frame of joint observations, indexed by [`Joint`]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Skeleton {
    joints: [JointObservation; JOINT_COUNT],
}

impl Skeleton {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, joint: Joint, observation: JointObservation) {
        self.joints[joint.index()] = observation;
    }

    pub fn iter(&self) -> impl Iterator<Item = (Joint, &JointObservation)> {
        Joint::ALL.iter().copied().zip(self.joints.iter())
    }
}

impl Index<Joint> for Skeleton {
    type Output = JointObservation;

    fn index(&self, joint: Joint) -> &Self::Output {
        &self.joints[joint.index()]
    }
}

impl IndexMut<Joint> for Skeleton {
    fn index_mut(&mut self, joint: Joint) -> &mut Self::Output {
        &mut self.joints[joint.index()]
    }
}

/// Feature buffer for one frame. Computed once, then shared by every matcher.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointFeatures {
    vectors: [FeatureVector; JOINT_COUNT],
}

impl JointFeatures {
    pub fn new() -> Self {
        Self {
            vectors: [Vector3::zeros(); JOINT_COUNT],
        }
    }

    pub fn get(&self, joint: Joint) -> FeatureVector {
        self.vectors[joint.index()]
    }

    pub fn set(&mut self, joint: Joint, feature: FeatureVector) {
        self.vectors[joint.index()] = feature;
    }
}

impl Default for JointFeatures {
    fn default() -> Self {
        Self::new()
    }
}

/// A recorded frame handed to the trainer: skeleton, time in seconds and key-frame tag.
/// Tag 0 means untagged; tag `k` marks posture `k - 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaggedFrame {
    pub skeleton: Skeleton,
    pub time: f32,
    pub tag: u32,
}
