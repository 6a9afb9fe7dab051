use std::path::Path;

use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::GestureError;
use crate::feature_extractor::FeatureExtractor;
use crate::gesture_detector::GestureDetector;
use crate::template::GestureTemplate;
use crate::types::Skeleton;

/// A gesture fired in one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GestureEvent {
    pub name: String,
    pub is_static: bool,
}

/// Runs a set of gestures against one skeleton stream, sharing a single
/// feature extractor.
pub struct GestureManager {
    config: EngineConfig,
    extractor: FeatureExtractor,
    gestures: Vec<GestureDetector>,
    paused: bool,
}

impl GestureManager {
    pub fn new(config: EngineConfig) -> Self {
        let extractor = FeatureExtractor::new(&config);
        Self {
            config,
            extractor,
            gestures: Vec::new(),
            paused: false,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn gestures(&self) -> &[GestureDetector] {
        &self.gestures
    }

    pub fn gestures_mut(&mut self) -> &mut [GestureDetector] {
        &mut self.gestures
    }

    pub fn add_gesture(&mut self, gesture: GestureDetector) {
        gesture.register_joints(&mut self.extractor);
        info!(
            "gesture {} added ({} postures, {} joints)",
            gesture.name(),
            gesture.posture_count(),
            gesture.joints().len()
        );
        self.gestures.push(gesture);
    }

    pub fn add_template(&mut self, template: &GestureTemplate) -> Result<(), GestureError> {
        let gesture = GestureDetector::from_template(template, &self.config)?;
        self.add_gesture(gesture);
        Ok(())
    }

    /// Loads every template it can; broken ones are logged and skipped.
    /// Returns how many were added.
    pub fn load_templates<P: AsRef<Path>>(&mut self, paths: &[P]) -> usize {
        let mut loaded = 0;
        for path in paths {
            let path = path.as_ref();
            match GestureTemplate::load(path).and_then(|t| self.add_template(&t)) {
                Ok(()) => loaded += 1,
                Err(e) => warn!("skipping template {:?}: {}", path, e),
            }
        }
        loaded
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        if paused != self.paused {
            info!("detection {}", if paused { "paused" } else { "resumed" });
        }
        self.paused = paused;
    }

    /// Restarts every gesture. Joint registrations are kept.
    pub fn reset(&mut self) {
        for gesture in &mut self.gestures {
            gesture.reset();
        }
    }

    /// Runs one frame through every gesture
    pub fn update(&mut self, skeleton: &Skeleton, now: f32) -> Vec<GestureEvent> {
        if self.paused {
            return Vec::new();
        }
        let features = *self.extractor.update_features(skeleton);

        let mut events = Vec::new();
        for gesture in &mut self.gestures {
            // Unreliable frame: leave the gesture exactly as it was
            if !gesture.check_position_confidence(&self.extractor, skeleton) {
                continue;
            }
            if gesture.detect(&features, now) {
                events.push(GestureEvent {
                    name: gesture.name().to_string(),
                    is_static: gesture.is_static(),
                });
            }
        }
        events
    }
}
