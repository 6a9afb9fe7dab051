use nalgebra::{UnitQuaternion, Vector3};

use crate::config::EngineConfig;
use crate::types::{FeatureVector, Joint, JointFeatures, Skeleton};

const DEGENERATE_EPS: f32 = 1e-6;

/// Computes the orientation feature of every registered joint: the
/// direction from the joint to its end joint, expressed in a frame that
/// follows the user's shoulders and torso.
pub struct FeatureExtractor {
    registered: Vec<Joint>,
    features: JointFeatures,
    min_confidence: f32,
}

impl FeatureExtractor {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            registered: Vec::new(),
            features: JointFeatures::new(),
            min_confidence: config.min_confidence,
        }
    }

    /// Forget registered joints and clear the buffer
    pub fn reset(&mut self) {
        self.registered.clear();
        self.features = JointFeatures::new();
    }

    pub fn register_joint(&mut self, joint: Joint) {
        if !self.registered.contains(&joint) {
            self.registered.push(joint);
        }
    }

    pub fn register_joints(&mut self, joints: &[Joint]) {
        for &joint in joints {
            self.register_joint(joint);
        }
    }

    pub fn registered(&self) -> &[Joint] {
        &self.registered
    }

    pub fn features(&self) -> &JointFeatures {
        &self.features
    }

    /// Recompute the features of all registered joints from this frame
    pub fn update_features(&mut self, skeleton: &Skeleton) -> &JointFeatures {
        let straighten = body_straighten_rotation(skeleton);

        for &joint in &self.registered {
            let Some(end) = joint.end_joint() else {
                continue;
            };
            let raw = skeleton[end].position - skeleton[joint].position;
            self.features.set(joint, normalize_or_zero(straighten * raw));
        }

        &self.features
    }

    /// False if any joint in `joints`, or the joint after it, is not confident enough
    pub fn check_position_confidence(&self, skeleton: &Skeleton, joints: &[Joint]) -> bool {
        joints.iter().all(|&joint| {
            let end_ok = joint
                .end_joint()
                .map_or(true, |end| skeleton[end].position_confidence >= self.min_confidence);
            skeleton[joint].position_confidence >= self.min_confidence && end_ok
        })
    }
}

/// Rotation that turns the user's body frame back to the canonical one,
/// making features independent of where the user faces.
fn body_straighten_rotation(skeleton: &Skeleton) -> UnitQuaternion<f32> {
    let left = skeleton[Joint::LeftShoulder].position;
    let right = skeleton[Joint::RightShoulder].position;
    let torso = skeleton[Joint::Torso].position;

    let horizon = right - left;
    let vertical = (right + left) / 2.0 - torso;
    // Backward axis of the user
    let user_z = horizon.cross(&vertical);

    if user_z.norm() < DEGENERATE_EPS || vertical.norm() < DEGENERATE_EPS {
        return UnitQuaternion::identity();
    }
    UnitQuaternion::face_towards(&user_z, &vertical).inverse()
}

fn normalize_or_zero(v: Vector3<f32>) -> FeatureVector {
    v.try_normalize(DEGENERATE_EPS).unwrap_or_else(Vector3::zeros)
}
