//! Persistence of the full parameter set.
//!
//! A calibration lives in a directory as three JSON files:
//! `L_calib.json` and `R_calib.json` hold one camera's intrinsics plus the
//! raw per-view point sets used by the solve; `stereo_calib.json` holds the
//! duplicated intrinsics (for convenience), the extrinsics and the
//! rectification transforms under the keys `K0,D0,K1,D1,R,T,E,F,R0,R1,P0,P1,Q`.
//!
//! `save` refuses to create the directory. `load` is atomic: all three
//! files must parse before anything is returned, so a failed load never
//! leaves partial state behind.

use crate::error::CalibError;
use crate::extrinsics::ExtrinsicParameters;
use crate::intrinsics::IntrinsicParameters;
use crate::rectification::RectificationParameters;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use stereocal_core::{
    BrownConrady5, CameraIntrinsics, CameraSide, ImageSize, Mat3, Mat34, Mat4, Pt2, Real,
    SidePair, Vec3,
};

pub const LEFT_CALIB_FILE: &str = "L_calib.json";
pub const RIGHT_CALIB_FILE: &str = "R_calib.json";
pub const STEREO_CALIB_FILE: &str = "stereo_calib.json";

/// On-disk layout of one camera's intrinsic calibration.
#[derive(Debug, Serialize, Deserialize)]
struct IntrinsicFile {
    camera_matrix: Mat3,
    distortion: BrownConrady5,
    image_size: ImageSize,
    /// Raw per-view detections, kept to re-derive or audit the solve.
    image_points: Vec<Vec<Pt2>>,
    per_view_rms: Vec<Real>,
}

/// On-disk layout of the combined extrinsic + rectification parameter set.
#[derive(Debug, Serialize, Deserialize)]
struct StereoFile {
    #[serde(rename = "K0")]
    k0: Mat3,
    #[serde(rename = "D0")]
    d0: BrownConrady5,
    #[serde(rename = "K1")]
    k1: Mat3,
    #[serde(rename = "D1")]
    d1: BrownConrady5,
    #[serde(rename = "R")]
    r: Mat3,
    #[serde(rename = "T")]
    t: Vec3,
    #[serde(rename = "E")]
    e: Mat3,
    #[serde(rename = "F")]
    f: Mat3,
    #[serde(rename = "R0")]
    r0: Mat3,
    #[serde(rename = "R1")]
    r1: Mat3,
    #[serde(rename = "P0")]
    p0: Mat34,
    #[serde(rename = "P1")]
    p1: Mat34,
    #[serde(rename = "Q")]
    q: Mat4,
}

/// Everything `load` returns; the session commits it in one step.
pub struct LoadedCalibration {
    pub intrinsics: SidePair<IntrinsicParameters>,
    pub extrinsics: ExtrinsicParameters,
    pub rectification: RectificationParameters,
}

fn side_file(side: CameraSide) -> &'static str {
    match side {
        CameraSide::Left => LEFT_CALIB_FILE,
        CameraSide::Right => RIGHT_CALIB_FILE,
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CalibError> {
    let file = fs::File::create(path)
        .map_err(|e| CalibError::persistence(format!("cannot create {}: {e}", path.display())))?;
    serde_json::to_writer_pretty(file, value)
        .map_err(|e| CalibError::persistence(format!("cannot write {}: {e}", path.display())))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, CalibError> {
    let data = fs::read_to_string(path)
        .map_err(|e| CalibError::persistence(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&data)
        .map_err(|e| CalibError::persistence(format!("malformed {}: {e}", path.display())))
}

fn intrinsics_to_file(params: &IntrinsicParameters) -> IntrinsicFile {
    IntrinsicFile {
        camera_matrix: params.intrinsics.k_matrix(),
        distortion: params.distortion,
        image_size: params.image_size,
        image_points: params.image_points.clone(),
        per_view_rms: params.per_view_rms.clone(),
    }
}

fn intrinsics_from_file(file: IntrinsicFile, path: &Path) -> Result<IntrinsicParameters, CalibError> {
    let k = &file.camera_matrix;
    if (k[(2, 2)] - 1.0).abs() > 1e-9 || k[(2, 0)] != 0.0 || k[(2, 1)] != 0.0 {
        return Err(CalibError::persistence(format!(
            "camera matrix in {} is not a projective K",
            path.display()
        )));
    }
    Ok(IntrinsicParameters {
        intrinsics: CameraIntrinsics {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
            skew: k[(0, 1)],
        },
        distortion: file.distortion,
        image_size: file.image_size,
        image_points: file.image_points,
        per_view_rms: file.per_view_rms,
    })
}

/// Write the two intrinsic files. Fails if `dir` does not exist.
pub fn save_intrinsics(
    dir: &Path,
    intrinsics: SidePair<&IntrinsicParameters>,
) -> Result<(), CalibError> {
    ensure_dir(dir)?;
    for side in CameraSide::BOTH {
        write_json(
            &dir.join(side_file(side)),
            &intrinsics_to_file(intrinsics.get(side)),
        )?;
    }
    Ok(())
}

/// Write the combined extrinsic + rectification file. Fails if `dir` does
/// not exist.
pub fn save_stereo(
    dir: &Path,
    intrinsics: SidePair<&IntrinsicParameters>,
    extrinsics: &ExtrinsicParameters,
    rectification: &RectificationParameters,
) -> Result<(), CalibError> {
    ensure_dir(dir)?;
    let file = StereoFile {
        k0: intrinsics.left.intrinsics.k_matrix(),
        d0: intrinsics.left.distortion,
        k1: intrinsics.right.intrinsics.k_matrix(),
        d1: intrinsics.right.distortion,
        r: extrinsics.rotation,
        t: extrinsics.translation,
        e: extrinsics.essential,
        f: extrinsics.fundamental,
        r0: rectification.rotations.left,
        r1: rectification.rotations.right,
        p0: rectification.projections.left,
        p1: rectification.projections.right,
        q: rectification.q,
    };
    write_json(&dir.join(STEREO_CALIB_FILE), &file)
}

/// Write the full parameter set (both intrinsic files plus the stereo file).
pub fn save(
    dir: &Path,
    intrinsics: SidePair<&IntrinsicParameters>,
    extrinsics: &ExtrinsicParameters,
    rectification: &RectificationParameters,
) -> Result<(), CalibError> {
    save_intrinsics(dir, intrinsics)?;
    save_stereo(dir, intrinsics, extrinsics, rectification)?;
    info!("saved calibration to {}", dir.display());
    Ok(())
}

fn ensure_dir(dir: &Path) -> Result<(), CalibError> {
    if !dir.is_dir() {
        return Err(CalibError::persistence(format!(
            "directory does not exist: {}",
            dir.display()
        )));
    }
    Ok(())
}

/// Read the full parameter set back from `dir`.
///
/// All three files must be present and well-formed; otherwise nothing is
/// returned and the caller's state stays untouched. Remap tables are
/// re-derived from the loaded transforms using each camera's own intrinsics.
pub fn load(dir: &Path) -> Result<LoadedCalibration, CalibError> {
    let paths: Vec<PathBuf> = [LEFT_CALIB_FILE, RIGHT_CALIB_FILE, STEREO_CALIB_FILE]
        .iter()
        .map(|f| dir.join(f))
        .collect();
    for p in &paths {
        if !p.is_file() {
            return Err(CalibError::persistence(format!(
                "missing calibration file: {}",
                p.display()
            )));
        }
    }

    let intrinsics = SidePair::try_build(|side| {
        let path = dir.join(side_file(side));
        intrinsics_from_file(read_json::<IntrinsicFile>(&path)?, &path)
    })?;

    let stereo: StereoFile = read_json(&paths[2])?;

    let extrinsics = ExtrinsicParameters {
        rotation: stereo.r,
        translation: stereo.t,
        essential: stereo.e,
        fundamental: stereo.f,
    };

    let rectification = RectificationParameters::from_transforms(
        intrinsics.as_ref(),
        SidePair::new(stereo.r0, stereo.r1),
        SidePair::new(stereo.p0, stereo.p1),
        stereo.q,
    );

    info!("loaded calibration from {}", dir.display());

    Ok(LoadedCalibration {
        intrinsics,
        extrinsics,
        rectification,
    })
}
