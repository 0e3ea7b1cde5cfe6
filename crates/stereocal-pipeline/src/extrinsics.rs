//! Stereo extrinsic calibration.
//!
//! Estimates the pose of camera 1 in camera 0's frame from the paired
//! observations, with both cameras' intrinsics held fixed. The essential
//! and fundamental matrices are derived in closed form from the pose.

use crate::error::CalibError;
use crate::intrinsics::IntrinsicParameters;
use log::debug;
use serde::{Deserialize, Serialize};
use stereocal_core::{Iso3, Mat3, PatternGeometry, Pt2, SidePair, Vec3};
use stereocal_linear::{
    dlt_homography, essential_from_pose, estimate_planar_pose_from_h, estimate_relative_pose,
    fundamental_from_essential,
};

/// Relative pose and derived matrices between the two cameras.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtrinsicParameters {
    /// Rotation of camera 1 relative to camera 0.
    pub rotation: Mat3,
    /// Translation of camera 1 relative to camera 0.
    pub translation: Vec3,
    /// Essential matrix `E = [t]x R`.
    pub essential: Mat3,
    /// Fundamental matrix `F = K1^-T E K0^-1`.
    pub fundamental: Mat3,
}

impl ExtrinsicParameters {
    /// The relative pose as an isometry (`x_c1 = R x_c0 + T`).
    pub fn relative_pose(&self) -> Iso3 {
        let rot = nalgebra::Rotation3::from_matrix_unchecked(self.rotation);
        Iso3::from_parts(self.translation.into(), rot.into())
    }

    pub fn baseline(&self) -> f64 {
        self.translation.norm()
    }
}

/// Undistort observed pixels and fit per-view board poses for one camera.
fn board_poses(
    params: &IntrinsicParameters,
    geometry: &PatternGeometry,
) -> Result<Vec<Iso3>, CalibError> {
    let camera = params.camera();
    let board = geometry.planar_points();
    let kmtx = params.intrinsics.k_matrix();

    params
        .image_points
        .iter()
        .map(|view| {
            let undistorted: Vec<Pt2> =
                view.iter().map(|p| camera.undistort_pixel(p)).collect();
            let h = dlt_homography(&board, &undistorted)
                .map_err(|e| CalibError::SolveDivergence(e.to_string()))?;
            estimate_planar_pose_from_h(&kmtx, &h)
                .map_err(|e| CalibError::SolveDivergence(e.to_string()))
        })
        .collect()
}

/// Solve the rig extrinsics from both cameras' calibration data.
///
/// Preconditions (enforced here, reported as `PreconditionUnmet`): both
/// intrinsic records must carry the same, non-zero number of views. Unequal
/// counts are a hard error, never truncated.
pub fn solve_extrinsics(
    params: SidePair<&IntrinsicParameters>,
    geometry: &PatternGeometry,
) -> Result<ExtrinsicParameters, CalibError> {
    let n0 = params.left.view_count();
    let n1 = params.right.view_count();
    if n0 != n1 {
        return Err(CalibError::precondition(format!(
            "observation counts differ between cameras: {n0} vs {n1}"
        )));
    }
    if n0 == 0 {
        return Err(CalibError::precondition(
            "stereo solve needs at least one observation pair",
        ));
    }

    let poses0 = board_poses(params.left, geometry)?;
    let poses1 = board_poses(params.right, geometry)?;

    let rel = estimate_relative_pose(&poses0, &poses1)
        .map_err(|e| CalibError::SolveDivergence(e.to_string()))?;

    let essential = essential_from_pose(&rel);
    let fundamental = fundamental_from_essential(
        &essential,
        &params.left.intrinsics.k_matrix(),
        &params.right.intrinsics.k_matrix(),
    )
    .map_err(|e| CalibError::SolveDivergence(e.to_string()))?;

    debug!(
        "extrinsics solved over {n0} pairs, baseline {:.3}",
        rel.translation.vector.norm()
    );

    Ok(ExtrinsicParameters {
        rotation: *rel.rotation.to_rotation_matrix().matrix(),
        translation: rel.translation.vector,
        essential,
        fundamental,
    })
}
