use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::GestureError;
use crate::feature_extractor::FeatureExtractor;
use crate::gesture_detector::GestureDetector;
use crate::joint_matcher::MatcherKind;
use crate::stats::mean_std_robust;
use crate::template::{GestureTemplate, MatcherTemplate, PostureTemplate};
use crate::types::{Joint, JointFeatures, TaggedFrame};

use nalgebra::Vector3;

/// Which joint matcher the trainer produces for postures after the first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatcherStrategy {
    /// Per joint, keep whichever of absolute or relative scatters less
    #[default]
    Auto,
    Absolute,
    Relative,
}

/// Builds gesture templates from tagged recordings
pub struct TemplateTrainer {
    config: EngineConfig,
    joints: Vec<Joint>,
    strategy: MatcherStrategy,
}

impl TemplateTrainer {
    pub fn new(config: EngineConfig) -> Self {
        let joints = config.default_detect_joints.clone();
        Self {
            config,
            joints,
            strategy: MatcherStrategy::Auto,
        }
    }

    pub fn with_joints(mut self, joints: &[Joint]) -> Self {
        self.joints = joints.to_vec();
        self
    }

    pub fn with_strategy(mut self, strategy: MatcherStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn train(&self, name: &str, frames: &[TaggedFrame]) -> Result<GestureDetector, GestureError> {
        let template = self.train_template(name, frames)?;
        GestureDetector::from_template(&template, &self.config)
    }

    pub fn train_template(&self, name: &str, frames: &[TaggedFrame]) -> Result<GestureTemplate, GestureError> {
        if self.joints.is_empty() {
            return Err(GestureError::NoJoints);
        }
        if let Some(&joint) = self.joints.iter().find(|j| !j.has_feature()) {
            return Err(GestureError::JointWithoutFeature(joint));
        }
        let posture_count = frames.iter().map(|f| f.tag).max().unwrap_or(0) as usize;
        if posture_count == 0 {
            return Err(GestureError::NoTaggedFrames);
        }

        let samples = self.tagged_features(frames);
        for posture in 0..posture_count {
            let count = samples.iter().filter(|(p, _)| *p == posture).count();
            if count < 2 {
                warn!(
                    "posture {} of {} has {} training frame(s), thresholds fall back to their minimum",
                    posture + 1,
                    name,
                    count
                );
            }
        }
        let (intervals, tolerance) = self.train_intervals(frames, posture_count);
        let blank = self.blank_template(name, posture_count, intervals, tolerance);

        let template = match self.strategy {
            MatcherStrategy::Absolute => self.train_candidate(&blank, MatcherKind::Absolute, &samples)?.0,
            MatcherStrategy::Relative => self.train_candidate(&blank, MatcherKind::Relative, &samples)?.0,
            MatcherStrategy::Auto => {
                let (mut merged, abs_scatter) =
                    self.train_candidate(&blank, MatcherKind::Absolute, &samples)?;
                let (relative, rel_scatter) =
                    self.train_candidate(&blank, MatcherKind::Relative, &samples)?;

                for i in 1..posture_count {
                    for j in 0..self.joints.len() {
                        if prefer_relative(abs_scatter[i][j], rel_scatter[i][j]) {
                            debug!(
                                "{} posture {} joint {}: relative ({:.4} < {:.4})",
                                name,
                                i + 1,
                                self.joints[j],
                                rel_scatter[i][j],
                                abs_scatter[i][j]
                            );
                            merged.postures[i].matchers[j] = relative.postures[i].matchers[j].clone();
                        }
                    }
                }
                merged
            }
        };

        info!(
            "trained {}: {} postures, {} joints, {} tagged frames",
            name,
            posture_count,
            self.joints.len(),
            samples.len()
        );
        Ok(template)
    }

    /// Features of every tagged frame, with the posture index of its tag
    fn tagged_features(&self, frames: &[TaggedFrame]) -> Vec<(usize, JointFeatures)> {
        let mut extractor = FeatureExtractor::new(&self.config);
        extractor.register_joints(&self.joints);
        frames
            .iter()
            .filter(|f| f.tag != 0)
            .map(|f| (f.tag as usize - 1, *extractor.update_features(&f.skeleton)))
            .collect()
    }

    /// Expected time and tolerance between consecutive postures. Only tagged
    /// frames following a frame tagged with the posture right before count.
    /// A step back in time starts a new take and never counts.
    fn train_intervals(&self, frames: &[TaggedFrame], posture_count: usize) -> (Vec<f32>, Vec<f32>) {
        let mut deltas: Vec<Vec<f32>> = vec![Vec::new(); posture_count.saturating_sub(1)];
        let mut last: Option<(u32, f32)> = None;

        for frame in frames.iter().filter(|f| f.tag != 0) {
            if let Some((last_tag, last_time)) = last {
                if frame.tag == last_tag + 1 && frame.time >= last_time {
                    deltas[frame.tag as usize - 2].push(frame.time - last_time);
                }
            }
            last = Some((frame.tag, frame.time));
        }

        deltas
            .iter()
            .enumerate()
            .map(|(i, d)| {
                if d.is_empty() {
                    warn!("no transition observed from posture {} to {}", i + 1, i + 2);
                }
                let (avg, std) = mean_std_robust(d);
                (avg, std * self.config.time_threshold_mul)
            })
            .unzip()
    }

    fn blank_template(
        &self,
        name: &str,
        posture_count: usize,
        intervals: Vec<f32>,
        interval_tolerance: Vec<f32>,
    ) -> GestureTemplate {
        let posture = |i: usize| PostureTemplate {
            name: format!("{}_{}", name, i + 1),
            matchers: self
                .joints
                .iter()
                .map(|&joint| MatcherTemplate {
                    kind: MatcherKind::Absolute,
                    joint,
                    template: Vector3::zeros(),
                    threshold: Vector3::zeros(),
                })
                .collect(),
        };
        GestureTemplate {
            name: name.to_string(),
            joints: self.joints.clone(),
            threshold_mul_per_posture: vec![1.0; posture_count],
            threshold_mul_per_joint: vec![1.0; self.joints.len()],
            postures: (0..posture_count).map(posture).collect(),
            intervals,
            interval_tolerance,
            time_interval_mul: 1.0,
        }
    }

    /// Trains one candidate where every posture after the first uses `kind`.
    /// Returns the trained template and the scatter per posture and joint.
    fn train_candidate(
        &self,
        blank: &GestureTemplate,
        kind: MatcherKind,
        samples: &[(usize, JointFeatures)],
    ) -> Result<(GestureTemplate, Vec<Vec<f32>>), GestureError> {
        let mut candidate = blank.clone();
        for posture in candidate.postures.iter_mut().skip(1) {
            for matcher in &mut posture.matchers {
                matcher.kind = kind;
            }
        }

        let mut gesture = GestureDetector::from_template(&candidate, &self.config)?;
        for (posture, features) in samples {
            gesture.add_train_data(*posture, features);
        }
        let scatter = gesture.train_postures(&self.config);
        Ok((gesture.to_template(), scatter))
    }
}

/// Lower scatter wins; ties keep the absolute matcher
fn prefer_relative(absolute_scatter: f32, relative_scatter: f32) -> bool {
    absolute_scatter > relative_scatter
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{arms_skeleton, blended_arms, jitter, ARMS_DOWN, ARMS_SIDEWAYS};
    use crate::types::Skeleton;

    const REPS: usize = 6;
    const FPS: f32 = 30.0;

    fn jittered(skeleton: Skeleton, seed: usize) -> Skeleton {
        let mut s = skeleton;
        for (k, joint) in [Joint::LeftElbow, Joint::LeftHand, Joint::RightElbow, Joint::RightHand]
            .into_iter()
            .enumerate()
        {
            let n = seed * 8 + k * 2;
            s[joint].position.x += 4.0 * jitter(n);
            s[joint].position.z += 4.0 * jitter(n + 1);
        }
        s
    }

    /// Arms down for 0.5s, raised sideways over 0.5s, held for 1s; repeated
    /// with a pause. Tags mark the end of the rest pose and the arrival.
    fn raise_recording() -> Vec<TaggedFrame> {
        let mut frames = Vec::new();
        for r in 0..REPS {
            let t0 = r as f32 * 3.0;
            let arrive = 27 + r % 3;
            for i in 0..60 {
                let t = i as f32 / FPS;
                let blend = ((t - 0.5) / 0.5).clamp(0.0, 1.0);
                let skeleton = jittered(blended_arms(ARMS_DOWN, ARMS_SIDEWAYS, blend), r * 60 + i);
                let tag = match i {
                    12..=14 => 1,
                    _ if (arrive..arrive + 3).contains(&i) => 2,
                    _ => 0,
                };
                frames.push(TaggedFrame {
                    skeleton,
                    time: t0 + t,
                    tag,
                });
            }
        }
        frames
    }

    fn replay(gesture: &mut GestureDetector, frames: &[TaggedFrame]) -> Vec<bool> {
        let config = EngineConfig::default();
        let mut extractor = FeatureExtractor::new(&config);
        gesture.register_joints(&mut extractor);
        frames
            .iter()
            .map(|f| {
                let features = *extractor.update_features(&f.skeleton);
                gesture.check_position_confidence(&extractor, &f.skeleton) && gesture.detect(&features, f.time)
            })
            .collect()
    }

    #[test]
    fn test_rejects_untagged_recording() {
        let trainer = TemplateTrainer::new(EngineConfig::default());
        let mut frames = raise_recording();
        frames.iter_mut().for_each(|f| f.tag = 0);
        assert!(matches!(
            trainer.train_template("raise", &frames),
            Err(GestureError::NoTaggedFrames)
        ));

        let trainer = TemplateTrainer::new(EngineConfig::default()).with_joints(&[]);
        assert!(matches!(
            trainer.train_template("raise", &raise_recording()),
            Err(GestureError::NoJoints)
        ));

        let trainer = TemplateTrainer::new(EngineConfig::default()).with_joints(&[Joint::Torso]);
        assert!(matches!(
            trainer.train_template("raise", &raise_recording()),
            Err(GestureError::JointWithoutFeature(Joint::Torso))
        ));
    }

    #[test]
    fn test_trains_postures_and_intervals() {
        let trainer = TemplateTrainer::new(EngineConfig::default()).with_strategy(MatcherStrategy::Absolute);
        let template = trainer.train_template("raise", &raise_recording()).unwrap();

        assert_eq!(template.postures.len(), 2);
        assert_eq!(template.postures[1].name, "raise_2");
        assert_eq!(template.joints.len(), 4);
        assert_eq!(template.intervals.len(), 1);
        assert!((template.intervals[0] - 14.0 / FPS).abs() < 0.01);
        assert!(template.interval_tolerance[0] > 0.2 && template.interval_tolerance[0] < 0.5);

        let down = template.postures[0].matchers[1].template.normalize();
        assert!((down - Vector3::new(0.0, -1.0, 0.0)).norm() < 0.05);
        for posture in &template.postures {
            for m in &posture.matchers {
                assert_eq!(m.kind, MatcherKind::Absolute);
                assert!(m.threshold.iter().all(|&t| t >= 20.0));
            }
        }
    }

    #[test]
    fn test_trained_gesture_detects_each_repetition() {
        let trainer = TemplateTrainer::new(EngineConfig::default()).with_strategy(MatcherStrategy::Absolute);
        let frames = raise_recording();
        let mut gesture = trainer.train("raise", &frames).unwrap();
        let fired = replay(&mut gesture, &frames).into_iter().filter(|&d| d).count();
        assert_eq!(fired, REPS);
    }

    #[test]
    fn test_relative_strategy_keeps_first_posture_absolute() {
        let trainer = TemplateTrainer::new(EngineConfig::default()).with_strategy(MatcherStrategy::Relative);
        let template = trainer.train_template("raise", &raise_recording()).unwrap();

        assert!(template.postures[0].matchers.iter().all(|m| m.kind == MatcherKind::Absolute));
        let elbow = &template.postures[1].matchers[1];
        assert_eq!(elbow.kind, MatcherKind::Relative);
        // Displacement from arms down to (nearly) sideways
        assert!(elbow.template.x < -0.8 && elbow.template.y > 0.6);
    }

    #[test]
    fn test_auto_prefers_lower_scatter() {
        // The right arm stays where it was, but that place differs each take
        let mut frames = Vec::new();
        for r in 0..REPS {
            let phi = (r as f32 - 2.5) * 8f32.to_radians();
            let right = [phi.sin(), -phi.cos(), 0.0];
            let t0 = r as f32 * 2.0;
            frames.push(TaggedFrame {
                skeleton: arms_skeleton(ARMS_DOWN.0, right),
                time: t0,
                tag: 1,
            });
            frames.push(TaggedFrame {
                skeleton: arms_skeleton(ARMS_SIDEWAYS.0, right),
                time: t0 + 0.5,
                tag: 2,
            });
        }

        let trainer = TemplateTrainer::new(EngineConfig::default())
            .with_joints(&[Joint::LeftElbow, Joint::RightElbow]);
        let template = trainer.train_template("reach", &frames).unwrap();
        assert_eq!(template.postures[0].matchers[1].kind, MatcherKind::Absolute);
        assert_eq!(template.postures[1].matchers[1].kind, MatcherKind::Relative);
        assert!(template.postures[1].matchers[1].template.norm() < 1e-6);
    }

    #[test]
    fn test_interval_ignores_step_across_takes() {
        let down = arms_skeleton(ARMS_DOWN.0, ARMS_DOWN.1);
        let sideways = arms_skeleton(ARMS_SIDEWAYS.0, ARMS_SIDEWAYS.1);
        let frame = |skeleton, time, tag| TaggedFrame { skeleton, time, tag };
        // Two appended takes, each with its own clock
        let frames = vec![
            frame(down, 0.0, 1),
            frame(sideways, 0.4, 2),
            frame(down, 0.9, 1),
            frame(sideways, 0.2, 2),
            frame(sideways, 0.6, 2),
        ];
        let template = TemplateTrainer::new(EngineConfig::default())
            .with_strategy(MatcherStrategy::Absolute)
            .train_template("raise", &frames)
            .unwrap();
        assert_eq!(template.intervals, vec![0.4]);
    }

    #[test]
    fn test_tie_keeps_absolute() {
        assert!(!prefer_relative(0.0, 0.0));
        assert!(!prefer_relative(0.1, 0.2));
        assert!(prefer_relative(0.2, 0.1));
    }

    #[test]
    fn test_single_sample_postures_train() {
        let frames = vec![
            TaggedFrame { skeleton: arms_skeleton(ARMS_DOWN.0, ARMS_DOWN.1), time: 0.0, tag: 1 },
            TaggedFrame { skeleton: arms_skeleton(ARMS_SIDEWAYS.0, ARMS_SIDEWAYS.1), time: 0.4, tag: 2 },
        ];
        let template = TemplateTrainer::new(EngineConfig::default())
            .train_template("tiny", &frames)
            .unwrap();
        assert_eq!(template.intervals, vec![0.4]);
        assert_eq!(template.interval_tolerance, vec![0.0]);
        assert_eq!(template.postures[0].matchers[0].threshold, Vector3::repeat(20.0));
    }

    #[test]
    fn test_serialized_template_reproduces_detections() {
        let frames = raise_recording();
        let trainer = TemplateTrainer::new(EngineConfig::default());
        let trained = trainer.train_template("raise", &frames).unwrap();

        let json = trained.to_json().unwrap();
        let loaded = GestureTemplate::from_json(&json).unwrap();
        assert_eq!(loaded, trained);

        let config = EngineConfig::default();
        let mut fresh = GestureDetector::from_template(&trained, &config).unwrap();
        let mut restored = GestureDetector::from_template(&loaded, &config).unwrap();
        assert_eq!(replay(&mut fresh, &frames), replay(&mut restored, &frames));
    }
}
