use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::stats::{euler_distance, mean_std_axis_angles, mean_std_coords};
use crate::types::{FeatureVector, Joint, JointFeatures};

/// How a joint is compared with its template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherKind {
    /// Orientation of the joint, compared as per-axis angles (degrees)
    Absolute,
    /// Displacement of the joint since the previous posture matched,
    /// compared per coordinate. Never used in the first posture.
    Relative,
}

/// Per-frame inputs shared by every matcher of a gesture
#[derive(Debug, Clone, Copy)]
pub struct MatchContext<'a> {
    pub features: &'a JointFeatures,
    /// Current state of the owning gesture's sequencer
    pub sequencer_state: usize,
}

/// Checks one joint of one posture against its template and trains it
#[derive(Debug, Clone)]
pub struct JointMatcher {
    kind: MatcherKind,
    joint: Joint,
    template: FeatureVector,
    threshold: Vector3<f32>,
    threshold_mul: f32,
    real_threshold: Vector3<f32>,
    distance: Vector3<f32>,
    feature: FeatureVector,
    last_match: FeatureVector,
    /// Index of the posture a relative matcher depends on, set when linking
    previous_posture: Option<usize>,
    samples: Vec<FeatureVector>,
}

impl JointMatcher {
    /// Untrained matcher
    pub fn new(kind: MatcherKind, joint: Joint) -> Self {
        Self::with_template(kind, joint, Vector3::zeros(), Vector3::zeros())
    }

    pub fn with_template(
        kind: MatcherKind,
        joint: Joint,
        template: FeatureVector,
        threshold: Vector3<f32>,
    ) -> Self {
        Self {
            kind,
            joint,
            template,
            threshold,
            threshold_mul: 1.0,
            real_threshold: threshold,
            distance: Vector3::zeros(),
            feature: Vector3::zeros(),
            last_match: Vector3::zeros(),
            previous_posture: None,
            samples: Vec::new(),
        }
    }

    pub fn absolute(joint: Joint, template: FeatureVector, threshold: Vector3<f32>) -> Self {
        Self::with_template(MatcherKind::Absolute, joint, template, threshold)
    }

    pub fn relative(joint: Joint, template: FeatureVector, threshold: Vector3<f32>) -> Self {
        Self::with_template(MatcherKind::Relative, joint, template, threshold)
    }

    /// Second construction phase: a matcher of posture `posture_index` depends
    /// on the same joint of the posture right before it.
    pub(crate) fn link(&mut self, posture_index: usize) {
        self.previous_posture = posture_index.checked_sub(1);
    }

    pub fn kind(&self) -> MatcherKind {
        self.kind
    }

    pub fn joint(&self) -> Joint {
        self.joint
    }

    pub fn template(&self) -> FeatureVector {
        self.template
    }

    pub fn threshold(&self) -> Vector3<f32> {
        self.threshold
    }

    pub fn distance(&self) -> Vector3<f32> {
        self.distance
    }

    /// Feature saved when the posture was last matched
    pub fn last_match(&self) -> FeatureVector {
        self.last_match
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn set_threshold_mul(&mut self, mul: f32) {
        self.threshold_mul = mul;
        self.real_threshold = self.threshold * mul;
    }

    /// True if the joint matches the template in this frame.
    /// `previous_match` is the last matched feature of the same joint in the
    /// previous posture; only relative matchers read it.
    pub fn matches(&mut self, ctx: &MatchContext<'_>, previous_match: Option<FeatureVector>) -> bool {
        match self.kind {
            MatcherKind::Absolute => {
                self.feature = ctx.features.get(self.joint);
                self.distance = euler_distance(&self.feature, &self.template);
            }
            MatcherKind::Relative => {
                // Only meaningful while the sequencer waits for this posture
                match self.previous_posture {
                    Some(previous) if ctx.sequencer_state == previous + 1 => {}
                    _ => return false,
                }
                self.feature = ctx.features.get(self.joint);
                let moved = self.feature - previous_match.unwrap_or_else(Vector3::zeros);
                self.distance = (moved - self.template).abs();
            }
        }
        self.distance
            .iter()
            .zip(self.real_threshold.iter())
            .all(|(d, t)| d <= t)
    }

    /// 1 for a perfect match, decreasing towards 0 at the threshold, negative beyond it
    pub fn score(&self) -> f32 {
        let ratio = self
            .distance
            .zip_map(&self.real_threshold, |d, t| d / t.max(f32::EPSILON));
        1.0 - ratio.max()
    }

    pub fn save_last_feature(&mut self) {
        self.last_match = self.feature;
    }

    /// Accumulates one training sample. The sample also becomes the last
    /// matched feature, for the relative matcher of the next posture.
    pub fn add_train_data(&mut self, feature: FeatureVector, previous_match: Option<FeatureVector>) {
        let sample = match self.kind {
            MatcherKind::Absolute => feature,
            MatcherKind::Relative => feature - previous_match.unwrap_or_else(Vector3::zeros),
        };
        self.samples.push(sample);
        self.last_match = feature;
    }

    /// Derives template and threshold from the accumulated samples and
    /// returns their scatter (norm of the per-coordinate std).
    pub fn train(&mut self, config: &EngineConfig) -> f32 {
        let scatter = match self.kind {
            MatcherKind::Absolute => {
                let (avg, angle_std) = mean_std_axis_angles(&self.samples);
                self.template = avg;
                self.threshold = (angle_std * config.angle_threshold_mul)
                    .map(|t| t.max(config.min_angle_threshold));
                let (_, coord_std) = mean_std_coords(&self.samples);
                coord_std.norm()
            }
            MatcherKind::Relative => {
                let (avg, coord_std) = mean_std_coords(&self.samples);
                self.template = avg;
                self.threshold = (coord_std * config.coord_threshold_mul)
                    .map(|t| t.max(config.min_coord_threshold));
                coord_std.norm()
            }
        };
        self.samples.clear();
        self.real_threshold = self.threshold * self.threshold_mul;
        scatter
    }
}
