pub mod config;
pub mod error;
pub mod feature_extractor;
pub mod fsm;
pub mod gesture_detector;
pub mod gesture_manager;
pub mod joint_matcher;
pub mod posture_detector;
pub mod recording;
pub mod stats;
pub mod template;
pub mod trainer;
pub mod types;

#[cfg(test)]
mod testing;
