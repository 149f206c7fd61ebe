use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use anyhow::{Context, Result};
use clap::Parser;
use glam::Mat4;
use log::info;
use mocap_model::{
    AnimationClip, PlaybackController, Retargeter, SkeletonHierarchy, animation::Direction,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

#[cfg(feature = "tracing")]
use tracing_subscriber::prelude::*;

const IDENTITY: [[f32; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

fn identity() -> [[f32; 4]; 4] {
    IDENTITY
}

/// The model skeleton exported by the asset importer.
#[derive(Deserialize)]
struct Rig {
    paths: Vec<String>,
    bind_transforms: Vec<[[f32; 4]; 4]>,
    rest_transforms: Vec<[[f32; 4]; 4]>,
    #[serde(default = "identity")]
    coordinate_correction: [[f32; 4]; 4],
}

/// Capture joint index to model joint index pairs.
#[derive(Deserialize)]
struct RetargetTable {
    pairs: Vec<(usize, usize)>,
    #[serde(default = "identity")]
    correction: [[f32; 4]; 4],
}

#[derive(Serialize)]
struct Tick {
    time: Option<f32>,
    status: String,
    events: Vec<String>,
    matrices: Vec<[[f32; 4]; 4]>,
}

#[derive(Parser)]
#[command(author, version, about)]
#[command(propagate_version = true)]
struct Cli {
    /// The rig JSON with joint paths and bind and rest transforms.
    rig: PathBuf,
    /// The clip JSON saved by the recorder.
    clip: PathBuf,
    /// The retargeting table JSON. Joints are matched by name if not set.
    #[arg(long)]
    retarget: Option<PathBuf>,
    /// The number of updates to run.
    #[arg(long, default_value_t = 60)]
    ticks: usize,
    /// Updates per second.
    #[arg(long, default_value_t = 60.0)]
    tick_rate: f32,
    /// The playback speed multiplier.
    #[arg(long, default_value_t = 1.0)]
    speed: f32,
    /// Play the clip backwards starting from the end.
    #[arg(long)]
    reverse: bool,
    #[arg(long)]
    looping: bool,
    /// The joint capacity of the skinning buffer.
    #[arg(long, default_value_t = 256)]
    capacity: usize,
    /// The output JSON for the skinning matrices of each tick. Defaults to stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    #[cfg(not(feature = "tracing"))]
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .context("failed to initialize logger")?;

    #[cfg(feature = "tracing")]
    tracing::subscriber::set_global_default(
        tracing_subscriber::registry().with(tracing_tracy::TracyLayer::default()),
    )
    .context("failed to initialize tracing")?;

    let cli = Cli::parse();

    let start = Instant::now();

    let rig: Rig = read_json(&cli.rig)?;
    let skeleton = SkeletonHierarchy::build(
        rig.paths.as_slice(),
        &matrices(&rig.bind_transforms),
        &matrices(&rig.rest_transforms),
        Mat4::from_cols_array_2d(&rig.coordinate_correction),
    )
    .with_context(|| format!("{:?} is not a valid rig", cli.rig))?;

    let clip = AnimationClip::from_file(&cli.clip)
        .with_context(|| format!("failed to load clip from {:?}", cli.clip))?;

    let retargeter = match &cli.retarget {
        Some(path) => {
            let table: RetargetTable = read_json(path)?;
            Retargeter::new(table.pairs, Mat4::from_cols_array_2d(&table.correction))
        }
        None => Retargeter::from_names(&clip.joints, &skeleton, Mat4::IDENTITY),
    };
    info!(
        "Load {} joints, {} frames, {} mapped joints: {:?}",
        skeleton.len(),
        clip.frame_count(),
        retargeter.len(),
        start.elapsed()
    );

    let clip = Arc::new(clip);
    let mut controller =
        PlaybackController::new(Arc::new(skeleton), Arc::new(retargeter), cli.capacity);
    controller.set_speed(cli.speed);
    controller.set_looping(cli.looping);
    if cli.reverse {
        controller.set_direction(Direction::Reverse);
        controller.play_from(clip.clone(), clip.duration);
    } else {
        controller.play(clip.clone());
    }

    let delta_time = 1.0 / cli.tick_rate;
    let start = Instant::now();
    let ticks: Vec<_> = (0..cli.ticks)
        .map(|_| {
            let matrices = controller
                .update(delta_time)
                .iter()
                .map(|m| m.to_cols_array_2d())
                .collect();
            Tick {
                time: controller.current_time(),
                status: controller.status().to_string(),
                events: controller
                    .drain_events()
                    .iter()
                    .map(|e| e.to_string())
                    .collect(),
                matrices,
            }
        })
        .collect();
    info!("Evaluate {} ticks: {:?}", ticks.len(), start.elapsed());

    let json = serde_json::to_string_pretty(&ticks)?;
    match &cli.output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("failed to write {path:?}"))?,
        None => println!("{json}"),
    }

    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json = std::fs::read_to_string(path).with_context(|| format!("failed to read {path:?}"))?;
    serde_json::from_str(&json).with_context(|| format!("{path:?} is not valid JSON"))
}

fn matrices(values: &[[[f32; 4]; 4]]) -> Vec<Mat4> {
    values.iter().map(Mat4::from_cols_array_2d).collect()
}
