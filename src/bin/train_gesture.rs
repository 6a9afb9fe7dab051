use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use gestura::config::EngineConfig;
use gestura::recording::load_recordings_csv;
use gestura::trainer::{MatcherStrategy, TemplateTrainer};
use gestura::types::Joint;

const USAGE: &str =
    "usage: train_gesture [--absolute|--relative] [--joints a,b,...] [--config engine.json] <name> <out.json> <recording.csv>...";

struct TrainOptions {
    strategy: MatcherStrategy,
    joints: Option<Vec<Joint>>,
    config: Option<PathBuf>,
    recordings: Vec<PathBuf>,
    name: String,
    output: PathBuf,
}

fn parse_joints(list: &str) -> Result<Vec<Joint>> {
    list.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.parse::<Joint>().map_err(anyhow::Error::from))
        .collect()
}

fn parse_args() -> Result<TrainOptions> {
    let mut strategy = MatcherStrategy::Auto;
    let mut joints = None;
    let mut config = None;
    let mut positional = Vec::new();

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--absolute" => strategy = MatcherStrategy::Absolute,
            "--relative" => strategy = MatcherStrategy::Relative,
            "--joints" => {
                let list = args.next().ok_or_else(|| anyhow!(USAGE))?;
                joints = Some(parse_joints(&list)?);
            }
            "--config" => config = Some(PathBuf::from(args.next().ok_or_else(|| anyhow!(USAGE))?)),
            _ if arg.starts_with("--") => bail!("unknown option {}\n{}", arg, USAGE),
            _ => positional.push(arg),
        }
    }

    if positional.len() < 3 {
        bail!(USAGE);
    }
    let recordings = positional.split_off(2).into_iter().map(PathBuf::from).collect();
    let output = PathBuf::from(positional.remove(1));
    let name = positional.remove(0);
    Ok(TrainOptions {
        strategy,
        joints,
        config,
        recordings,
        name,
        output,
    })
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

    let recording = load_recordings_csv(&opts.recordings)?;
    info!(
        "{} recording(s): {} frames, {} tagged",
        opts.recordings.len(),
        recording.len(),
        recording.tagged_frame_count()
    );

    let mut trainer = TemplateTrainer::new(config).with_strategy(opts.strategy);
    if let Some(joints) = &opts.joints {
        trainer = trainer.with_joints(joints);
    }
    let template = trainer
        .train_template(&opts.name, &recording.tagged_frames())
        .with_context(|| format!("training {} failed", opts.name))?;

    template
        .save(&opts.output)
        .with_context(|| format!("cannot write {:?}", opts.output))?;

    println!("{} -> {:?}", template.name, opts.output);
    for (i, posture) in template.postures.iter().enumerate() {
        let kinds: Vec<String> = posture
            .matchers
            .iter()
            .map(|m| format!("{}:{:?}", m.joint, m.kind))
            .collect();
        println!("  posture {}: {}", i + 1, kinds.join(" "));
    }
    for (i, (interval, tolerance)) in template.intervals.iter().zip(&template.interval_tolerance).enumerate() {
        println!("  {} -> {}: {:.3}s ± {:.3}s", i + 1, i + 2, interval, tolerance);
    }
    Ok(())
}
