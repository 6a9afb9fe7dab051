use crate::joint_matcher::{JointMatcher, MatchContext};
use crate::stats::mean;

/// Detects one key posture: all of its joints must match
#[derive(Debug, Clone)]
pub struct PostureDetector {
    name: String,
    matchers: Vec<JointMatcher>,
    joint_scores: Vec<f32>,
    /// Score tracked for peak detection
    score: f32,
    rising: bool,
    detected: bool,
}

impl PostureDetector {
    pub fn new(name: impl Into<String>, matchers: Vec<JointMatcher>) -> Self {
        let joint_scores = vec![0.0; matchers.len()];
        Self {
            name: name.into(),
            matchers,
            joint_scores,
            score: 0.0,
            rising: false,
            detected: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn joint_count(&self) -> usize {
        self.matchers.len()
    }

    pub fn matchers(&self) -> &[JointMatcher] {
        &self.matchers
    }

    pub fn matchers_mut(&mut self) -> &mut [JointMatcher] {
        &mut self.matchers
    }

    pub fn joint_scores(&self) -> &[f32] {
        &self.joint_scores
    }

    /// Score of the last rise-checked match
    pub fn score(&self) -> f32 {
        self.score
    }

    /// Mean of the joint scores computed by the last `detect` call
    pub fn average_score(&self) -> f32 {
        mean(&self.joint_scores)
    }

    pub fn is_detected(&self) -> bool {
        self.detected
    }

    /// With `check_rise`, reports a detection only on the frame the averaged
    /// score stops rising, so a passing pose is caught at its best frame.
    /// Otherwise any full match is a detection.
    ///
    /// `previous` is the posture before this one in the gesture, if any.
    pub fn detect(
        &mut self,
        ctx: &MatchContext<'_>,
        previous: Option<&PostureDetector>,
        check_rise: bool,
    ) -> bool {
        let mut all_matched = true;
        for (j, matcher) in self.matchers.iter_mut().enumerate() {
            let previous_match = previous.map(|p| p.matchers[j].last_match());
            if !matcher.matches(ctx, previous_match) {
                all_matched = false;
            }
            self.joint_scores[j] = matcher.score();
        }

        self.detected = all_matched;
        if check_rise && all_matched {
            let new_score = mean(&self.joint_scores);
            self.detected = self.rising && new_score <= self.score;
            self.rising = new_score > self.score;
            self.score = new_score;
        }

        if self.detected {
            for matcher in &mut self.matchers {
                matcher.save_last_feature();
            }
        }
        self.detected
    }
}
