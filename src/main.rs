/*
Gestura: replays a skeleton recording through a set of gesture templates.

    gestura [--config engine.json] [--repeat N:W] [--realtime] <recording.csv> <template.json>...

--repeat N:W   while the end posture is held, report again every N frames after W frames
--realtime     pace frames by their recorded time instead of running flat out

Log level via RUST_LOG, e.g. RUST_LOG=gestura=debug
*/

use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::{bounded, select, Sender};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use gestura::config::EngineConfig;
use gestura::gesture_manager::GestureManager;
use gestura::recording::load_recording_csv;
use gestura::types::Skeleton;

const FRAME_QUEUE: usize = 100;
const STALL_TIMEOUT: Duration = Duration::from_secs(5);

struct Options {
    config: Option<PathBuf>,
    repeat: Option<(u32, u32)>,
    realtime: bool,
    recording: PathBuf,
    templates: Vec<PathBuf>,
}

struct Frame {
    skeleton: Skeleton,
    time: f32,
}

fn usage() -> anyhow::Error {
    anyhow!("usage: gestura [--config engine.json] [--repeat N:W] [--realtime] <recording.csv> <template.json>...")
}

fn parse_repeat(value: &str) -> Result<(u32, u32)> {
    let (interval, wait) = value
        .split_once(':')
        .ok_or_else(|| anyhow!("--repeat expects N:W, got {:?}", value))?;
    Ok((
        interval.parse().context("invalid repeat interval")?,
        wait.parse().context("invalid repeat wait")?,
    ))
}

fn parse_args() -> Result<Options> {
    let mut config = None;
    let mut repeat = None;
    let mut realtime = false;
    let mut positional: Vec<PathBuf> = Vec::new();

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = Some(PathBuf::from(args.next().ok_or_else(usage)?)),
            "--repeat" => repeat = Some(parse_repeat(&args.next().ok_or_else(usage)?)?),
            "--realtime" => realtime = true,
            "-h" | "--help" => return Err(usage()),
            _ if arg.starts_with("--") => bail!("unknown option {}", arg),
            _ => positional.push(PathBuf::from(arg)),
        }
    }

    if positional.len() < 2 {
        return Err(usage());
    }
    let recording = positional.remove(0);
    Ok(Options {
        config,
        repeat,
        realtime,
        recording,
        templates: positional,
    })
}

/// Reader thread: feeds recorded frames to the detection loop
fn stream_recording(path: &Path, realtime: bool, tx: Sender<Frame>) -> Result<()> {
    let recording = load_recording_csv(path)?;
    info!("streaming {} frames from {:?}", recording.len(), path);

    let mut last_time: Option<f32> = None;
    for frame in &recording.frames {
        if realtime {
            if let Some(last) = last_time {
                let dt = (frame.time - last).max(0.0);
                std::thread::sleep(Duration::from_secs_f32(dt));
            }
            last_time = Some(frame.time);
        }
        let sent = tx.send(Frame {
            skeleton: frame.skeleton(),
            time: frame.time,
        });
        if sent.is_err() {
            // Detection loop is gone
            break;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gestura=info")),
        )
        .init();

    let opts = parse_args()?;
    let config = match &opts.config {
        Some(path) => EngineConfig::load(path).with_context(|| format!("cannot load config {:?}", path))?,
        None => EngineConfig::default(),
    };

    let mut manager = GestureManager::new(config);
    let loaded = manager.load_templates(&opts.templates);
    if loaded == 0 {
        bail!("none of the {} templates could be loaded", opts.templates.len());
    }
    if let Some((interval, wait)) = opts.repeat {
        for gesture in manager.gestures_mut() {
            gesture.set_repeat(interval, wait);
        }
    }

    let (tx, rx) = bounded::<Frame>(FRAME_QUEUE);
    let path = opts.recording.clone();
    let realtime = opts.realtime;
    let reader = std::thread::spawn(move || {
        if let Err(e) = stream_recording(&path, realtime, tx) {
            error!("recording reader failed: {:#}", e);
        }
    });

    let mut frames = 0usize;
    let mut events = 0usize;
    loop {
        select! {
            recv(rx) -> msg => {
                let Ok(frame) = msg else {
                    break;
                };
                frames += 1;
                for event in manager.update(&frame.skeleton, frame.time) {
                    events += 1;
                    let kind = if event.is_static { "posture" } else { "gesture" };
                    println!("{:>9.3}s  {} {}", frame.time, kind, event.name);
                }
            }
            default(STALL_TIMEOUT) => {
                warn!("no frame received for {:?}", STALL_TIMEOUT);
            }
        }
    }

    if reader.join().is_err() {
        bail!("recording reader panicked");
    }
    info!("{} frames replayed, {} detections", frames, events);
    Ok(())
}
