use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use nalgebra::{Matrix3, Vector3};
use tracing::debug;

use crate::config::EngineConfig;
use crate::types::{Joint, JointObservation, Skeleton, TaggedFrame};

/// Position, then the orientation frame by column (forward, up, right)
const HEADER: [&str; 18] = [
    "frame",
    "time",
    "tag",
    "joint",
    "x",
    "y",
    "z",
    "confidence",
    "fx",
    "fy",
    "fz",
    "ux",
    "uy",
    "uz",
    "rx",
    "ry",
    "rz",
    "orientation_confidence",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordedJoint {
    pub joint: Joint,
    pub observation: JointObservation,
}

/// One stored frame: only the recorded joints are kept
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedFrame {
    /// Seconds since the first recorded frame of its take
    pub time: f32,
    pub tag: u32,
    pub joints: Vec<RecordedJoint>,
}

impl RecordedFrame {
    /// Full skeleton; joints not recorded stay uninitialized
    pub fn skeleton(&self) -> Skeleton {
        let mut skeleton = Skeleton::new();
        for j in &self.joints {
            skeleton.set(j.joint, j.observation);
        }
        skeleton
    }

    fn joint_list(&self) -> impl Iterator<Item = Joint> + '_ {
        self.joints.iter().map(|j| j.joint)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recording {
    pub frames: Vec<RecordedFrame>,
}

impl Recording {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Joints stored in every frame, empty for an empty recording
    pub fn joints(&self) -> Vec<Joint> {
        self.frames
            .first()
            .map(|f| f.joint_list().collect())
            .unwrap_or_default()
    }

    pub fn tagged_frame_count(&self) -> usize {
        self.frames.iter().filter(|f| f.tag != 0).count()
    }

    /// Marks frame `index` as a key frame of posture `tag` (0 clears it).
    /// Returns false if there is no such frame.
    pub fn set_tag(&mut self, index: usize, tag: u32) -> bool {
        match self.frames.get_mut(index) {
            Some(frame) => {
                frame.tag = tag;
                true
            }
            None => false,
        }
    }

    /// Drops every untagged frame
    pub fn retain_tagged(&mut self) {
        self.frames.retain(|f| f.tag != 0);
    }

    /// Adds the frames of another take. Both must store the same joints in
    /// the same order. Times are kept as recorded, so each take starts again
    /// from 0.
    pub fn append(&mut self, other: &Recording) -> Result<()> {
        if !self.is_empty() && !other.is_empty() {
            let (mine, theirs) = (self.joints(), other.joints());
            ensure!(
                mine == theirs,
                "cannot append a recording of joints {:?} to one of {:?}",
                theirs,
                mine
            );
        }
        self.frames.extend(other.frames.iter().cloned());
        Ok(())
    }

    /// Every frame expanded for training, tagged or not
    pub fn tagged_frames(&self) -> Vec<TaggedFrame> {
        self.frames
            .iter()
            .map(|f| TaggedFrame {
                skeleton: f.skeleton(),
                time: f.time,
                tag: f.tag,
            })
            .collect()
    }
}

/// Samples live skeletons into a [`Recording`], at most one frame every
/// `min_record_interval` seconds.
#[derive(Debug, Clone)]
pub struct SkeletonRecorder {
    joints: Vec<Joint>,
    min_interval: f32,
    start_time: Option<f32>,
    last_time: f32,
    recording: Recording,
}

impl SkeletonRecorder {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_joints(config, &config.default_record_joints)
    }

    pub fn with_joints(config: &EngineConfig, joints: &[Joint]) -> Self {
        Self {
            joints: joints.to_vec(),
            min_interval: config.min_record_interval,
            start_time: None,
            last_time: 0.0,
            recording: Recording::default(),
        }
    }

    /// Returns true if the frame was stored
    pub fn record_frame(&mut self, skeleton: &Skeleton, now: f32) -> bool {
        let start = match self.start_time {
            Some(start) => {
                if now - self.last_time <= self.min_interval {
                    return false;
                }
                start
            }
            None => {
                self.start_time = Some(now);
                now
            }
        };
        self.last_time = now;

        let joints = self
            .joints
            .iter()
            .map(|&joint| RecordedJoint {
                joint,
                observation: skeleton[joint],
            })
            .collect();
        self.recording.frames.push(RecordedFrame {
            time: now - start,
            tag: 0,
            joints,
        });
        true
    }

    pub fn set_tag(&mut self, index: usize, tag: u32) -> bool {
        self.recording.set_tag(index, tag)
    }

    pub fn tagged_frame_count(&self) -> usize {
        self.recording.tagged_frame_count()
    }

    pub fn recording(&self) -> &Recording {
        &self.recording
    }

    pub fn into_recording(self) -> Recording {
        self.recording
    }

    pub fn reset(&mut self) {
        self.start_time = None;
        self.last_time = 0.0;
        self.recording.frames.clear();
    }
}

fn parse_joint_row(record: &StringRecord, row: usize) -> Result<RecordedJoint> {
    let joint: Joint = record[3]
        .parse()
        .with_context(|| format!("invalid joint in row {}", row))?;
    let value = |i: usize| -> Result<f32> {
        record[i]
            .parse()
            .with_context(|| format!("invalid {} in row {}", HEADER[i], row))
    };
    let column = |first: usize| -> Result<Vector3<f32>> {
        Ok(Vector3::new(value(first)?, value(first + 1)?, value(first + 2)?))
    };

    Ok(RecordedJoint {
        joint,
        observation: JointObservation {
            position: column(4)?,
            position_confidence: value(7)?,
            orientation: Matrix3::from_columns(&[column(8)?, column(11)?, column(14)?]),
            orientation_confidence: value(17)?,
        },
    })
}

/// Loads a recording from CSV, one row per joint and frame, sorted by frame.
/// See `HEADER` for the columns.
pub fn load_recording_csv(path: impl AsRef<Path>) -> Result<Recording> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("cannot open recording {:?}", path))?;

    let headers = reader
        .headers()
        .with_context(|| format!("cannot read header of {:?}", path))?;
    ensure!(
        headers.iter().eq(HEADER.iter().copied()),
        "unexpected header in {:?}: {:?}",
        path,
        headers
    );

    let mut recording = Recording::default();
    for (row_idx, result) in reader.records().enumerate() {
        let row = row_idx + 2;
        let record = result.with_context(|| format!("invalid row {} in {:?}", row, path))?;
        if record.len() != HEADER.len() {
            bail!("row {} has {} columns, expected {}", row, record.len(), HEADER.len());
        }

        let frame: usize = record[0]
            .parse()
            .with_context(|| format!("invalid frame index in row {}", row))?;
        let time: f32 = record[1]
            .parse()
            .with_context(|| format!("invalid time in row {}", row))?;
        let tag: u32 = record[2]
            .parse()
            .with_context(|| format!("invalid tag in row {}", row))?;
        let joint = parse_joint_row(&record, row)?;

        let current = recording.frames.len();
        // Another joint of the frame being read
        let continues = frame.checked_add(1) == Some(current);
        match recording.frames.last_mut() {
            Some(last) if continues => {
                ensure!(
                    last.time == time && last.tag == tag,
                    "row {}: time/tag {}/{} differ from {}/{} earlier in frame {}",
                    row,
                    time,
                    tag,
                    last.time,
                    last.tag,
                    frame
                );
                last.joints.push(joint);
            }
            _ => {
                ensure!(
                    frame == current,
                    "frame {} out of order in row {} (expected {} or {})",
                    frame,
                    row,
                    current.saturating_sub(1),
                    current
                );
                recording.frames.push(RecordedFrame {
                    time,
                    tag,
                    joints: vec![joint],
                });
            }
        }
    }

    ensure!(!recording.is_empty(), "recording {:?} has no frames", path);
    let joints = recording.joints();
    if let Some(i) = recording
        .frames
        .iter()
        .position(|f| !f.joint_list().eq(joints.iter().copied()))
    {
        bail!("frame {} in {:?} does not store the joints {:?}", i, path, joints);
    }

    debug!(
        "loaded {} frames ({} tagged) from {:?}",
        recording.len(),
        recording.tagged_frame_count(),
        path
    );
    Ok(recording)
}

/// Loads several takes of the same joints into one recording
pub fn load_recordings_csv<P: AsRef<Path>>(paths: &[P]) -> Result<Recording> {
    let mut recording = Recording::default();
    for path in paths {
        let path = path.as_ref();
        let take = load_recording_csv(path)?;
        recording
            .append(&take)
            .with_context(|| format!("cannot append {:?}", path))?;
    }
    Ok(recording)
}

pub fn save_recording_csv(recording: &Recording, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("cannot create {:?}", path))?;

    writer.write_record(HEADER)?;
    for (i, frame) in recording.frames.iter().enumerate() {
        for j in &frame.joints {
            let o = &j.observation;
            let mut row = vec![
                i.to_string(),
                frame.time.to_string(),
                frame.tag.to_string(),
                j.joint.to_string(),
            ];
            row.extend(o.position.iter().map(f32::to_string));
            row.push(o.position_confidence.to_string());
            // Column-major: forward, up, right
            row.extend(o.orientation.iter().map(f32::to_string));
            row.push(o.orientation_confidence.to_string());
            writer.write_record(&row)?;
        }
    }
    writer
        .flush()
        .with_context(|| format!("cannot write {:?}", path))?;
    Ok(())
}

/// Saves only the key frames of a recording. Returns how many were written.
pub fn save_tagged_recording_csv(recording: &Recording, path: impl AsRef<Path>) -> Result<usize> {
    let mut tagged = recording.clone();
    tagged.retain_tagged();
    save_recording_csv(&tagged, path)?;
    Ok(tagged.len())
}
