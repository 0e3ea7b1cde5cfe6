//! Per-camera intrinsic calibration.
//!
//! Consumes one camera's accumulated pattern observations and produces the
//! camera matrix, distortion coefficients, reference image size, and
//! per-view reprojection residuals. Every invocation re-solves from scratch.

use crate::error::CalibError;
use log::debug;
use serde::{Deserialize, Serialize};
use stereocal_core::{
    BrownConrady5, CameraIntrinsics, ImageSize, Iso3, Mat3, PatternGeometry, PinholeCamera, Pt2,
    Real,
};
use stereocal_linear::{
    dlt_homography, estimate_distortion_from_homographies, estimate_focal_fixed_center,
    estimate_intrinsics_from_homographies, estimate_planar_pose_from_h, DistortionFitOptions,
    DistortionView, IntrinsicsInitError,
};

/// One camera's intrinsic calibration result.
///
/// Immutable once computed; a re-solve replaces the whole record. The raw
/// per-view image points are kept for auditing, for the extrinsic solve, and
/// for the persisted per-camera file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntrinsicParameters {
    pub intrinsics: CameraIntrinsics,
    pub distortion: BrownConrady5,
    /// Image size the calibration refers to.
    pub image_size: ImageSize,
    /// Per-view detected image points, in capture order.
    pub image_points: Vec<Vec<Pt2>>,
    /// Per-view RMS reprojection residual in pixels.
    pub per_view_rms: Vec<Real>,
}

impl IntrinsicParameters {
    pub fn camera(&self) -> PinholeCamera {
        PinholeCamera::new(self.intrinsics, self.distortion)
    }

    pub fn view_count(&self) -> usize {
        self.image_points.len()
    }

    /// Mean of the per-view RMS residuals.
    pub fn mean_rms(&self) -> Real {
        if self.per_view_rms.is_empty() {
            return 0.0;
        }
        self.per_view_rms.iter().sum::<Real>() / self.per_view_rms.len() as Real
    }
}

fn map_init_error(err: IntrinsicsInitError) -> CalibError {
    match err {
        IntrinsicsInitError::NotEnoughViews { .. } => {
            CalibError::precondition(err.to_string())
        }
        IntrinsicsInitError::SvdFailed | IntrinsicsInitError::Degenerate => {
            CalibError::SolveDivergence(err.to_string())
        }
    }
}

/// Recover the per-view board pose for residual evaluation.
fn view_pose(kmtx: &Mat3, homography: &Mat3) -> Result<Iso3, CalibError> {
    estimate_planar_pose_from_h(kmtx, homography)
        .map_err(|e| CalibError::SolveDivergence(e.to_string()))
}

fn view_rms(
    camera: &PinholeCamera,
    pose: &Iso3,
    geometry: &PatternGeometry,
    observed: &[Pt2],
) -> Real {
    let object = geometry.object_points();
    let mut sum_sq = 0.0;
    let mut count = 0usize;
    for (op, obs) in object.iter().zip(observed) {
        let p_cam = pose.transform_point(op);
        if let Some(proj) = camera.project_point(&p_cam) {
            sum_sq += (proj - obs).norm_squared();
            count += 1;
        }
    }
    if count == 0 {
        return 0.0;
    }
    (sum_sq / count as Real).sqrt()
}

/// Solve one camera's intrinsics from all of its stored observations.
///
/// With three or more views the full five-parameter Zhang model plus a
/// linear Brown-Conrady fit is used; below that the reduced
/// fixed-principal-point model with zero distortion. Fails with
/// `PreconditionUnmet` when no observations exist and `SolveDivergence`
/// when the view configuration is degenerate.
pub fn solve_intrinsics(
    views: &[&[Pt2]],
    geometry: &PatternGeometry,
    image_size: ImageSize,
) -> Result<IntrinsicParameters, CalibError> {
    if views.is_empty() {
        return Err(CalibError::precondition(
            "intrinsic solve needs at least one observation",
        ));
    }

    let board = geometry.planar_points();
    let homographies: Vec<Mat3> = views
        .iter()
        .map(|v| dlt_homography(&board, v))
        .collect::<Result<_, _>>()
        .map_err(|e| CalibError::SolveDivergence(e.to_string()))?;

    let (intrinsics, distortion) = if views.len() >= 3 {
        let k = estimate_intrinsics_from_homographies(&homographies).map_err(map_init_error)?;
        let dist_views: Vec<DistortionView> = homographies
            .iter()
            .zip(views)
            .map(|(h, v)| DistortionView::new(*h, board.clone(), v.to_vec()))
            .collect::<Result<_, _>>()
            .map_err(|e| CalibError::SolveDivergence(e.to_string()))?;
        let dist = estimate_distortion_from_homographies(
            &k.k_matrix(),
            &dist_views,
            DistortionFitOptions::default(),
        )
        .map_err(|e| CalibError::SolveDivergence(e.to_string()))?;
        (k, dist)
    } else {
        debug!(
            "only {} view(s): using fixed-principal-point focal solve",
            views.len()
        );
        let k = estimate_focal_fixed_center(&homographies, image_size).map_err(map_init_error)?;
        (k, BrownConrady5::zero())
    };

    let camera = PinholeCamera::new(intrinsics, distortion);
    let kmtx = intrinsics.k_matrix();
    let mut per_view_rms = Vec::with_capacity(views.len());
    for (h, v) in homographies.iter().zip(views) {
        let pose = view_pose(&kmtx, h)?;
        per_view_rms.push(view_rms(&camera, &pose, geometry, v));
    }

    debug!(
        "intrinsics solved over {} views, mean rms {:.4}px",
        views.len(),
        per_view_rms.iter().sum::<Real>() / per_view_rms.len() as Real
    );

    Ok(IntrinsicParameters {
        intrinsics,
        distortion,
        image_size,
        image_points: views.iter().map(|v| v.to_vec()).collect(),
        per_view_rms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Rotation3, Translation3};
    use stereocal_core::{PatternKind, Pt3};

    fn geometry() -> PatternGeometry {
        PatternGeometry {
            cols: 9,
            rows: 6,
            square_size: 25.0,
            kind: PatternKind::Chessboard,
        }
    }

    fn gt_camera() -> PinholeCamera {
        PinholeCamera::new(
            CameraIntrinsics {
                fx: 800.0,
                fy: 790.0,
                cx: 320.0,
                cy: 240.0,
                skew: 0.0,
            },
            BrownConrady5::zero(),
        )
    }

    fn observe(camera: &PinholeCamera, pose: &Iso3, geometry: &PatternGeometry) -> Vec<Pt2> {
        geometry
            .object_points()
            .iter()
            .map(|p| {
                camera
                    .project_point(&Pt3::from(pose.transform_point(p).coords))
                    .expect("point in front of camera")
            })
            .collect()
    }

    fn poses(n: usize) -> Vec<Iso3> {
        (0..n)
            .map(|i| {
                let a = 0.1 + 0.07 * i as Real;
                Iso3::from_parts(
                    Translation3::new(-90.0 - 5.0 * i as Real, -60.0, 500.0 + 30.0 * i as Real),
                    Rotation3::from_euler_angles(a, -a * 0.6, a * 0.3).into(),
                )
            })
            .collect()
    }

    #[test]
    fn recovers_intrinsics_from_synthetic_views() {
        let cam = gt_camera();
        let geom = geometry();
        let views: Vec<Vec<Pt2>> = poses(5).iter().map(|p| observe(&cam, p, &geom)).collect();
        let view_refs: Vec<&[Pt2]> = views.iter().map(|v| v.as_slice()).collect();

        let params =
            solve_intrinsics(&view_refs, &geom, ImageSize::new(640, 480)).expect("solve");

        assert_eq!(params.view_count(), 5);
        assert!((params.intrinsics.fx - 800.0).abs() < 0.1);
        assert!((params.intrinsics.fy - 790.0).abs() < 0.1);
        assert!((params.intrinsics.cx - 320.0).abs() < 0.1);
        assert!((params.intrinsics.cy - 240.0).abs() < 0.1);
        assert!(params.mean_rms() < 0.01, "rms {}", params.mean_rms());
    }

    #[test]
    fn zero_observations_is_a_precondition_error() {
        let res = solve_intrinsics(&[], &geometry(), ImageSize::new(640, 480));
        assert!(matches!(res, Err(CalibError::PreconditionUnmet(_))));
    }

    #[test]
    fn single_view_uses_reduced_model() {
        // ground truth with the principal point at the image centre so the
        // reduced model is exact
        let cam = PinholeCamera::new(
            CameraIntrinsics {
                fx: 805.0,
                fy: 795.0,
                cx: (640.0 - 1.0) * 0.5,
                cy: (480.0 - 1.0) * 0.5,
                skew: 0.0,
            },
            BrownConrady5::zero(),
        );
        let geom = geometry();
        let view = observe(&cam, &poses(1)[0], &geom);

        let params = solve_intrinsics(&[view.as_slice()], &geom, ImageSize::new(640, 480))
            .expect("reduced solve");

        assert!((params.intrinsics.fx - 805.0).abs() < 1.0);
        assert!((params.intrinsics.fy - 795.0).abs() < 1.0);
        assert_eq!(params.distortion, BrownConrady5::zero());
    }

    #[test]
    fn identical_poses_fail_as_divergence() {
        let cam = gt_camera();
        let geom = geometry();
        let view = observe(&cam, &poses(1)[0], &geom);
        let views: Vec<&[Pt2]> = vec![&view, &view, &view];

        let res = solve_intrinsics(&views, &geom, ImageSize::new(640, 480));
        assert!(matches!(res, Err(CalibError::SolveDivergence(_))));
    }
}
