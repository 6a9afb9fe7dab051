//! Synthetic skeletons for unit tests

use nalgebra::{Rotation3, Vector3};

use crate::types::{Joint, JointObservation, Skeleton};

pub const ARMS_DOWN: ([f32; 3], [f32; 3]) = ([0.0, -1.0, 0.0], [0.0, -1.0, 0.0]);
pub const ARMS_SIDEWAYS: ([f32; 3], [f32; 3]) = ([-1.0, 0.0, 0.0], [1.0, 0.0, 0.0]);
pub const ARMS_UP: ([f32; 3], [f32; 3]) = ([0.0, 1.0, 0.0], [0.0, 1.0, 0.0]);

const BONE: f32 = 250.0;

/// Upright user facing the sensor, both arms straight along the given directions
pub fn arms_skeleton(left_dir: [f32; 3], right_dir: [f32; 3]) -> Skeleton {
    let mut skeleton = Skeleton::new();
    let left_shoulder = Vector3::new(-200.0, 400.0, 0.0);
    let right_shoulder = Vector3::new(200.0, 400.0, 0.0);
    let left_dir = Vector3::from(left_dir).normalize();
    let right_dir = Vector3::from(right_dir).normalize();

    let place = |s: &mut Skeleton, joint: Joint, p: Vector3<f32>| {
        s.set(joint, JointObservation::from_position(p));
    };
    place(&mut skeleton, Joint::Torso, Vector3::zeros());
    place(&mut skeleton, Joint::Neck, Vector3::new(0.0, 450.0, 0.0));
    place(&mut skeleton, Joint::Head, Vector3::new(0.0, 650.0, 0.0));
    place(&mut skeleton, Joint::LeftShoulder, left_shoulder);
    place(&mut skeleton, Joint::RightShoulder, right_shoulder);
    place(&mut skeleton, Joint::LeftElbow, left_shoulder + left_dir * BONE);
    place(&mut skeleton, Joint::LeftHand, left_shoulder + left_dir * 2.0 * BONE);
    place(&mut skeleton, Joint::RightElbow, right_shoulder + right_dir * BONE);
    place(&mut skeleton, Joint::RightHand, right_shoulder + right_dir * 2.0 * BONE);
    skeleton
}

/// Linear blend of two arm poses, `t` in [0, 1]
pub fn blended_arms(
    from: ([f32; 3], [f32; 3]),
    to: ([f32; 3], [f32; 3]),
    t: f32,
) -> Skeleton {
    let lerp = |a: [f32; 3], b: [f32; 3]| {
        let v = Vector3::from(a) * (1.0 - t) + Vector3::from(b) * t;
        [v.x, v.y, v.z]
    };
    arms_skeleton(lerp(from.0, to.0), lerp(from.1, to.1))
}

/// Whole skeleton turned around the vertical axis
pub fn rotate_skeleton_yaw(skeleton: &Skeleton, angle: f32) -> Skeleton {
    let rotation = Rotation3::from_axis_angle(&Vector3::y_axis(), angle);
    let mut turned = *skeleton;
    for joint in Joint::ALL {
        turned[joint].position = rotation * skeleton[joint].position;
    }
    turned
}

/// Deterministic small jitter in [-1, 1]
pub fn jitter(seed: usize) -> f32 {
    ((seed as f32 * 12.9898).sin() * 43_758.547).fract()
}
