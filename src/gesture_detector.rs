use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::GestureError;
use crate::feature_extractor::FeatureExtractor;
use crate::fsm::Fsm;
use crate::joint_matcher::{JointMatcher, MatchContext, MatcherKind};
use crate::posture_detector::PostureDetector;
use crate::template::{GestureTemplate, MatcherTemplate, PostureTemplate};
use crate::types::{Joint, JointFeatures, Skeleton};

/// Detects one gesture: a single held posture (static) or a timed sequence
/// of postures (dynamic). Owns all of its postures and joint matchers.
#[derive(Debug, Clone)]
pub struct GestureDetector {
    name: String,
    joints: Vec<Joint>,
    threshold_mul_per_posture: Vec<f32>,
    threshold_mul_per_joint: Vec<f32>,
    postures: Vec<PostureDetector>,
    intervals: Vec<f32>,
    interval_tolerance: Vec<f32>,
    time_interval_mul: f32,
    fsm: Fsm,
    triggers: Vec<bool>,
    detected: bool,

    /// 0: report a gesture once. >0: while the end posture is held, report
    /// again every `repeat_interval` frames after `wait_frames` frames.
    repeat_interval: u32,
    wait_frames: u32,
    hold_counter: u32,
    holding: bool,
    /// End-posture score when the sequence completed
    hold_reference: f32,
    hold_score_ratio: f32,
}

impl GestureDetector {
    /// Builds a detector from its persistent form. Matchers are created
    /// first, then relative matchers are linked to the posture before them.
    pub fn from_template(template: &GestureTemplate, config: &EngineConfig) -> Result<Self, GestureError> {
        let posture_count = template.postures.len();
        let joint_count = template.joints.len();

        if posture_count == 0 {
            return Err(GestureError::NoPostures(template.name.clone()));
        }
        if let Some(&joint) = template.joints.iter().find(|j| !j.has_feature()) {
            return Err(GestureError::JointWithoutFeature(joint));
        }
        check_len("per-posture multipliers", posture_count, template.threshold_mul_per_posture.len())?;
        check_len("per-joint multipliers", joint_count, template.threshold_mul_per_joint.len())?;

        let mut postures = Vec::with_capacity(posture_count);
        for (i, posture) in template.postures.iter().enumerate() {
            if posture.matchers.len() != joint_count {
                return Err(GestureError::MatcherCount {
                    posture: posture.name.clone(),
                    expected: joint_count,
                    actual: posture.matchers.len(),
                });
            }
            if i == 0 && posture.matchers.iter().any(|m| m.kind == MatcherKind::Relative) {
                return Err(GestureError::RelativeInFirstPosture(template.name.clone()));
            }

            let matchers = posture
                .matchers
                .iter()
                .enumerate()
                .map(|(j, m)| {
                    let mut matcher = JointMatcher::with_template(m.kind, m.joint, m.template, m.threshold);
                    matcher.set_threshold_mul(
                        template.threshold_mul_per_posture[i] * template.threshold_mul_per_joint[j],
                    );
                    matcher
                })
                .collect();
            postures.push(PostureDetector::new(posture.name.clone(), matchers));
        }

        for (i, posture) in postures.iter_mut().enumerate() {
            for matcher in posture.matchers_mut() {
                matcher.link(i);
            }
        }

        let fsm = Fsm::new(
            posture_count,
            &template.intervals,
            &template.interval_tolerance,
            template.time_interval_mul,
        )?;

        Ok(Self {
            name: template.name.clone(),
            joints: template.joints.clone(),
            threshold_mul_per_posture: template.threshold_mul_per_posture.clone(),
            threshold_mul_per_joint: template.threshold_mul_per_joint.clone(),
            postures,
            intervals: template.intervals.clone(),
            interval_tolerance: template.interval_tolerance.clone(),
            time_interval_mul: template.time_interval_mul,
            fsm,
            triggers: vec![false; posture_count],
            detected: false,
            repeat_interval: 0,
            wait_frames: config.repeat_wait_frames,
            hold_counter: 0,
            holding: false,
            hold_reference: 0.0,
            hold_score_ratio: config.hold_score_ratio,
        })
    }

    pub fn to_template(&self) -> GestureTemplate {
        GestureTemplate {
            name: self.name.clone(),
            joints: self.joints.clone(),
            threshold_mul_per_posture: self.threshold_mul_per_posture.clone(),
            threshold_mul_per_joint: self.threshold_mul_per_joint.clone(),
            postures: self
                .postures
                .iter()
                .map(|p| PostureTemplate {
                    name: p.name().to_string(),
                    matchers: p
                        .matchers()
                        .iter()
                        .map(|m| MatcherTemplate {
                            kind: m.kind(),
                            joint: m.joint(),
                            template: m.template(),
                            threshold: m.threshold(),
                        })
                        .collect(),
                })
                .collect(),
            intervals: self.intervals.clone(),
            interval_tolerance: self.interval_tolerance.clone(),
            time_interval_mul: self.time_interval_mul,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn posture_count(&self) -> usize {
        self.postures.len()
    }

    pub fn postures(&self) -> &[PostureDetector] {
        &self.postures
    }

    pub fn intervals(&self) -> (&[f32], &[f32]) {
        (&self.intervals, &self.interval_tolerance)
    }

    /// A gesture with a single posture
    pub fn is_static(&self) -> bool {
        self.postures.len() == 1
    }

    /// Current sequencer state
    pub fn state(&self) -> usize {
        self.fsm.state()
    }

    /// True if the gesture was detected by the last call, or is still being held
    pub fn is_detected(&self) -> bool {
        self.detected
    }

    pub fn set_repeat(&mut self, repeat_interval: u32, wait_frames: u32) {
        self.repeat_interval = repeat_interval;
        self.wait_frames = wait_frames;
    }

    pub fn register_joints(&self, extractor: &mut FeatureExtractor) {
        extractor.register_joints(&self.joints);
    }

    /// Must hold before `detect` runs on this frame's features
    pub fn check_position_confidence(&self, extractor: &FeatureExtractor, skeleton: &Skeleton) -> bool {
        extractor.check_position_confidence(skeleton, &self.joints)
    }

    pub fn reset(&mut self) {
        self.fsm.reset();
        self.detected = false;
        self.clear_hold();
    }

    /// Runs one frame. Returns true when the gesture fires.
    pub fn detect(&mut self, features: &JointFeatures, now: f32) -> bool {
        if self.is_static() {
            self.detect_static(features)
        } else {
            self.detect_dynamic(features, now)
        }
    }

    fn detect_static(&mut self, features: &JointFeatures) -> bool {
        if !self.detect_posture(0, features, false) {
            self.clear_hold();
            self.detected = false;
            return false;
        }
        if !self.detected {
            self.detected = true;
            info!("posture {} detected", self.name);
            return true;
        }
        self.repeat_tick()
    }

    fn detect_dynamic(&mut self, features: &JointFeatures, now: f32) -> bool {
        let last = self.postures.len() - 1;

        if self.detected && self.repeat_interval > 0 {
            let held = self.detect_posture(last, features, false)
                && self.postures[last].average_score() > self.hold_score_ratio * self.hold_reference;
            if held {
                return self.repeat_tick();
            }
            debug!("gesture {} released", self.name);
            self.clear_hold();
            self.detected = false;
            return false;
        }

        self.triggers.fill(false);
        let state = self.fsm.state();
        self.triggers[state] = self.detect_posture(state, features, true);
        if state == 1 {
            self.triggers[0] = self.detect_posture(0, features, false);
        }

        self.detected = self.fsm.update(&self.triggers, now);
        if self.detected {
            self.hold_reference = self.postures[last].score();
            self.clear_hold();
            info!("gesture {} detected at {:.3}s", self.name, now);
        }
        self.detected
    }

    fn detect_posture(&mut self, index: usize, features: &JointFeatures, check_rise: bool) -> bool {
        let ctx = MatchContext {
            features,
            sequencer_state: self.fsm.state(),
        };
        let (before, rest) = self.postures.split_at_mut(index);
        rest[0].detect(&ctx, before.last(), check_rise)
    }

    fn repeat_tick(&mut self) -> bool {
        if self.repeat_interval == 0 {
            return false;
        }
        let period = if self.holding {
            self.repeat_interval
        } else {
            self.wait_frames
        };
        self.hold_counter = (self.hold_counter + 1) % period.max(1);
        if self.hold_counter == 0 {
            self.holding = true;
            return true;
        }
        false
    }

    fn clear_hold(&mut self) {
        self.hold_counter = 0;
        self.holding = false;
    }

    /// Feeds one tagged training frame to every joint of `posture`
    pub(crate) fn add_train_data(&mut self, posture: usize, features: &JointFeatures) {
        let (before, rest) = self.postures.split_at_mut(posture);
        let previous = before.last();
        for (j, matcher) in rest[0].matchers_mut().iter_mut().enumerate() {
            let previous_match = previous.map(|p| p.matchers()[j].last_match());
            matcher.add_train_data(features.get(matcher.joint()), previous_match);
        }
    }

    /// Trains every joint matcher. Returns the scatter per posture and joint.
    pub(crate) fn train_postures(&mut self, config: &EngineConfig) -> Vec<Vec<f32>> {
        self.postures
            .iter_mut()
            .map(|p| p.matchers_mut().iter_mut().map(|m| m.train(config)).collect())
            .collect()
    }
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<(), GestureError> {
    if expected != actual {
        return Err(GestureError::LengthMismatch { what, expected, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ARMS_DOWN, ARMS_SIDEWAYS};
    use nalgebra::Vector3;

    type Pose = ([f32; 3], [f32; 3]);

    const DIAGONAL: Pose = ([-0.707, -0.707, 0.0], [0.707, -0.707, 0.0]);

    fn pose_features(pose: Pose) -> JointFeatures {
        let mut f = JointFeatures::new();
        f.set(Joint::LeftElbow, Vector3::from(pose.0).normalize());
        f.set(Joint::RightElbow, Vector3::from(pose.1).normalize());
        f
    }

    fn absolute(joint: Joint, dir: [f32; 3]) -> MatcherTemplate {
        MatcherTemplate {
            kind: MatcherKind::Absolute,
            joint,
            template: Vector3::from(dir),
            threshold: Vector3::repeat(20.0),
        }
    }

    fn posture_template(name: &str, pose: Pose) -> PostureTemplate {
        PostureTemplate {
            name: name.into(),
            matchers: vec![absolute(Joint::LeftElbow, pose.0), absolute(Joint::RightElbow, pose.1)],
        }
    }

    /// Arms down, then arms out sideways about half a second later
    fn raise_template() -> GestureTemplate {
        GestureTemplate {
            name: "raise".into(),
            joints: vec![Joint::LeftElbow, Joint::RightElbow],
            threshold_mul_per_posture: vec![1.0, 1.0],
            threshold_mul_per_joint: vec![1.0, 1.0],
            postures: vec![
                posture_template("raise_1", ARMS_DOWN),
                posture_template("raise_2", ARMS_SIDEWAYS),
            ],
            intervals: vec![0.5],
            interval_tolerance: vec![0.3],
            time_interval_mul: 1.0,
        }
    }

    fn static_template() -> GestureTemplate {
        GestureTemplate {
            name: "t_pose".into(),
            joints: vec![Joint::LeftElbow, Joint::RightElbow],
            threshold_mul_per_posture: vec![1.0],
            threshold_mul_per_joint: vec![1.0, 1.0],
            postures: vec![posture_template("t_pose_1", ARMS_SIDEWAYS)],
            intervals: vec![],
            interval_tolerance: vec![],
            time_interval_mul: 1.0,
        }
    }

    fn build(template: &GestureTemplate) -> GestureDetector {
        GestureDetector::from_template(template, &EngineConfig::default()).unwrap()
    }

    /// A: t 0.0-0.3, in between: 0.4-0.5, B: from 0.6 on
    fn raise_sequence(frames: usize) -> Vec<(f32, JointFeatures)> {
        (0..frames)
            .map(|i| {
                let pose = match i {
                    0..=3 => ARMS_DOWN,
                    4..=5 => DIAGONAL,
                    _ => ARMS_SIDEWAYS,
                };
                (i as f32 * 0.1, pose_features(pose))
            })
            .collect()
    }

    #[test]
    fn test_construction_errors() {
        let config = EngineConfig::default();

        let mut t = raise_template();
        t.postures.clear();
        t.threshold_mul_per_posture.clear();
        assert!(matches!(
            GestureDetector::from_template(&t, &config),
            Err(GestureError::NoPostures(_))
        ));

        let mut t = raise_template();
        t.postures[0].matchers[1].kind = MatcherKind::Relative;
        assert!(matches!(
            GestureDetector::from_template(&t, &config),
            Err(GestureError::RelativeInFirstPosture(_))
        ));

        let mut t = raise_template();
        t.postures[1].matchers.pop();
        assert!(matches!(
            GestureDetector::from_template(&t, &config),
            Err(GestureError::MatcherCount { .. })
        ));

        let mut t = raise_template();
        t.intervals.push(1.0);
        assert!(matches!(
            GestureDetector::from_template(&t, &config),
            Err(GestureError::LengthMismatch { .. })
        ));

        let mut t = raise_template();
        t.joints[0] = Joint::LeftHand;
        assert!(matches!(
            GestureDetector::from_template(&t, &config),
            Err(GestureError::JointWithoutFeature(Joint::LeftHand))
        ));
    }

    #[test]
    fn test_template_roundtrip_through_detector() {
        let template = raise_template();
        assert_eq!(build(&template).to_template(), template);
    }

    #[test]
    fn test_static_repeat_cadence() {
        let mut gesture = build(&static_template());
        gesture.set_repeat(10, 50);
        let features = pose_features(ARMS_SIDEWAYS);

        let fired: Vec<usize> = (0..81)
            .filter(|&i| gesture.detect(&features, i as f32 / 30.0))
            .collect();
        assert_eq!(fired, vec![0, 50, 60, 70, 80]);
    }

    #[test]
    fn test_static_without_repeat_fires_once_per_hold() {
        let mut gesture = build(&static_template());
        let t_pose = pose_features(ARMS_SIDEWAYS);
        let rest = pose_features(ARMS_DOWN);

        assert!(gesture.detect(&t_pose, 0.0));
        assert!((1..100).all(|i| !gesture.detect(&t_pose, i as f32)));
        assert!(!gesture.detect(&rest, 100.0));
        assert!(gesture.detect(&t_pose, 101.0));
    }

    #[test]
    fn test_static_unmatched_frame_restarts_wait() {
        let mut gesture = build(&static_template());
        gesture.set_repeat(2, 3);
        let t_pose = pose_features(ARMS_SIDEWAYS);
        let rest = pose_features(ARMS_DOWN);

        let mut run = |f: &JointFeatures| gesture.detect(f, 0.0);
        let fired: Vec<bool> = [&t_pose, &t_pose, &rest, &t_pose, &t_pose, &t_pose, &t_pose, &t_pose, &t_pose]
            .into_iter()
            .map(|f| run(f))
            .collect();
        assert_eq!(
            fired,
            vec![true, false, false, true, false, false, true, false, true]
        );
    }

    #[test]
    fn test_dynamic_gesture_fires_once() {
        let mut gesture = build(&raise_template());
        let fired: Vec<usize> = raise_sequence(20)
            .iter()
            .enumerate()
            .filter(|(_, (t, f))| gesture.detect(f, *t))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(fired, vec![7]);
        assert_eq!(gesture.state(), 0);
    }

    #[test]
    fn test_dynamic_too_slow_is_rejected() {
        let mut gesture = build(&raise_template());
        let mut fired = false;
        // Arms down, then 1.5s in between before the arms come up
        for i in 0..40 {
            let pose = match i {
                0..=3 => ARMS_DOWN,
                4..=18 => DIAGONAL,
                _ => ARMS_SIDEWAYS,
            };
            fired |= gesture.detect(&pose_features(pose), i as f32 * 0.1);
        }
        assert!(!fired);
    }

    #[test]
    fn test_dynamic_hold_repeat() {
        let mut gesture = build(&raise_template());
        gesture.set_repeat(3, 5);
        let mut frames = raise_sequence(19);
        frames.push((1.9, pose_features(ARMS_DOWN)));

        let fired: Vec<usize> = frames
            .iter()
            .enumerate()
            .filter(|(_, (t, f))| gesture.detect(f, *t))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(fired, vec![7, 12, 15, 18]);
        assert!(!gesture.is_detected());
    }

    /// Arms sideways, both lifted by `degrees` above the horizontal
    fn lifted_sideways(degrees: f32) -> JointFeatures {
        let a = degrees.to_radians();
        let mut f = JointFeatures::new();
        f.set(Joint::LeftElbow, Vector3::new(-a.cos(), a.sin(), 0.0));
        f.set(Joint::RightElbow, Vector3::new(a.cos(), a.sin(), 0.0));
        f
    }

    #[test]
    fn test_weak_hold_releases_gesture() {
        let mut gesture = build(&raise_template());
        gesture.set_repeat(3, 5);
        for (i, (t, f)) in raise_sequence(9).iter().enumerate() {
            assert_eq!(gesture.detect(f, *t), i == 7);
        }
        assert!(gesture.is_detected());

        // Still matching at a quarter of the threshold away
        assert!(!gesture.detect(&lifted_sideways(5.0), 0.9));
        assert!(gesture.is_detected());

        // Still within the threshold, but scoring under half the detection peak
        assert!(!gesture.detect(&lifted_sideways(15.0), 1.0));
        assert!(gesture.postures()[1].average_score() < 0.5);
        assert!(!gesture.is_detected());

        // Held on, the cadence would have repeated here. After the release the
        // sequencer needs arms down first.
        let sideways = pose_features(ARMS_SIDEWAYS);
        for i in 11..21 {
            assert!(!gesture.detect(&sideways, i as f32 * 0.1));
        }
        assert_eq!(gesture.state(), 0);
    }

    #[test]
    fn test_missing_features_never_fire() {
        let mut gesture = build(&static_template());
        assert!(!gesture.detect(&JointFeatures::new(), 0.0));
        assert!(!gesture.is_detected());
        assert!(gesture.detect(&pose_features(ARMS_SIDEWAYS), 0.1));
    }

    #[test]
    fn test_relative_second_posture() {
        let mut template = raise_template();
        template.postures[1].matchers[1] = MatcherTemplate {
            kind: MatcherKind::Relative,
            joint: Joint::RightElbow,
            // sideways minus down
            template: Vector3::new(1.0, 1.0, 0.0),
            threshold: Vector3::repeat(0.3),
        };
        let mut gesture = build(&template);

        let fired: Vec<usize> = raise_sequence(12)
            .iter()
            .enumerate()
            .filter(|(_, (t, f))| gesture.detect(f, *t))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(fired, vec![7]);
    }

    #[test]
    fn test_threshold_multipliers_apply() {
        let mut template = static_template();
        let mut features = pose_features(ARMS_SIDEWAYS);
        let a = 30f32.to_radians();
        features.set(Joint::LeftElbow, Vector3::new(-a.cos(), a.sin(), 0.0));

        assert!(!build(&template).detect(&features, 0.0));
        template.threshold_mul_per_joint[0] = 2.0;
        assert!(build(&template).detect(&features, 0.0));
    }

    #[test]
    fn test_reset_clears_sequence() {
        let mut gesture = build(&raise_template());
        for (t, f) in raise_sequence(3) {
            gesture.detect(&f, t);
        }
        assert_eq!(gesture.state(), 1);
        gesture.reset();
        assert_eq!(gesture.state(), 0);
    }
}
