use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use serde::{Deserialize, Serialize};
use stereocal_core::{ImageSize, Pt2, Real, SidePair};
use stereocal_pipeline::{RigConfig, StereoSession};

/// Stereo rig calibration from pre-detected pattern observations.
#[derive(Debug, Parser)]
#[command(author, version, about = "Stereo rig calibration pipeline")]
struct Args {
    /// Path to the JSON rig configuration (camera ids + pattern geometry).
    #[arg(long, global = true, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the full calibration over an observation file and save the
    /// parameter set.
    Calibrate {
        /// JSON file with detected point pairs (see `ObservationsFile`).
        #[arg(long)]
        observations: PathBuf,
        /// Existing directory to write L_calib.json / R_calib.json /
        /// stereo_calib.json into.
        #[arg(long)]
        out_dir: PathBuf,
    },
    /// Convert one correspondence into a depth using a saved calibration.
    Depth {
        /// Directory holding a previously saved calibration.
        #[arg(long)]
        calib_dir: PathBuf,
        /// Rectified point in camera 0, as "x,y".
        #[arg(long, value_parser = parse_point)]
        left: Pt2,
        /// Rectified point in camera 1, as "x,y".
        #[arg(long, value_parser = parse_point)]
        right: Pt2,
    },
}

/// On-disk input for `calibrate`: per-camera image sizes and the detected
/// point pairs, one entry per synchronized capture.
#[derive(Debug, Serialize, Deserialize)]
struct ObservationsFile {
    left_size: ImageSize,
    right_size: ImageSize,
    pairs: Vec<ObservationEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ObservationEntry {
    /// Detected points in camera 0, or null when detection failed.
    left: Option<Vec<Pt2>>,
    /// Detected points in camera 1, or null when detection failed.
    right: Option<Vec<Pt2>>,
}

fn parse_point(raw: &str) -> Result<Pt2, String> {
    let (x, y) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected \"x,y\", got {raw:?}"))?;
    let x: Real = x.trim().parse().map_err(|e| format!("bad x: {e}"))?;
    let y: Real = y.trim().parse().map_err(|e| format!("bad y: {e}"))?;
    Ok(Pt2::new(x, y))
}

fn load_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("malformed {}", path.display()))
}

fn run_calibrate(config: RigConfig, observations: &PathBuf, out_dir: &PathBuf) -> Result<()> {
    let input: ObservationsFile = load_json(observations)?;
    let sizes = SidePair::new(input.left_size, input.right_size);

    let mut session = StereoSession::new(config);
    let mut rejected = 0usize;
    for entry in input.pairs {
        if let Err(e) = session.append_observation(entry.left, entry.right, sizes) {
            info!("pair rejected: {e}");
            rejected += 1;
        }
    }
    info!(
        "{} pairs accepted, {} rejected",
        session.observation_count(),
        rejected
    );

    session.calibrate()?;
    session.save(out_dir)?;

    println!("{}", serde_json::to_string_pretty(&session.summary())?);
    Ok(())
}

fn run_depth(config: RigConfig, calib_dir: &PathBuf, left: Pt2, right: Pt2) -> Result<()> {
    let mut session = StereoSession::new(config);
    session.load(calib_dir)?;

    let point = session.depth_estimator()?.point(&left, &right)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "x": point.x, "y": point.y, "depth": point.z,
        }))?
    );
    Ok(())
}

fn try_main() -> Result<()> {
    let args = Args::parse();
    let config = RigConfig::load(&args.config)?;

    match args.command {
        Command::Calibrate {
            observations,
            out_dir,
        } => run_calibrate(config, &observations, &out_dir),
        Command::Depth {
            calib_dir,
            left,
            right,
        } => run_depth(config, &calib_dir, left, right),
    }
}

fn main() {
    env_logger::init();
    if let Err(err) = try_main() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
