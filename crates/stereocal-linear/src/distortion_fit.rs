//! Closed-form distortion coefficient estimation from homography residuals.
//!
//! Given intrinsics K and per-view homographies computed from the raw
//! (distorted) pixel observations, the residual between the homography
//! prediction and the observation in normalized coordinates is a linear
//! function of the Brown-Conrady coefficients. Stacking all points gives an
//! overdetermined system solved via SVD.
//!
//! The fit is a linearization, intended to capture small-to-moderate lens
//! distortion; it needs radial diversity (points away from the principal
//! point) to be well conditioned.

use nalgebra::{DMatrix, DVector};
use stereocal_core::{BrownConrady5, Mat3, Pt2, Real, Vec2, Vec3};
use thiserror::Error;

/// Errors that can occur during distortion estimation.
#[derive(Debug, Error, Clone, Copy)]
pub enum DistortionFitError {
    #[error("need at least {0} points for distortion estimation, got {1}")]
    NotEnoughPoints(usize, usize),
    #[error("svd failed during distortion estimation")]
    SvdFailed,
    #[error("intrinsics matrix is not invertible")]
    IntrinsicsNotInvertible,
    /// All points project near the image centre, leaving the radial terms
    /// unconstrained.
    #[error("degenerate configuration: all points near image center")]
    DegenerateConfiguration,
}

/// Options controlling distortion parameter estimation.
#[derive(Debug, Clone, Copy)]
pub struct DistortionFitOptions {
    /// Fix tangential distortion coefficients (p1, p2) to zero.
    pub fix_tangential: bool,
    /// Fix the third radial coefficient (k3) to zero. The r^6 term overfits
    /// with typical calibration data.
    pub fix_k3: bool,
    /// Undistortion iteration count stored in the returned model.
    pub iters: u32,
}

impl Default for DistortionFitOptions {
    fn default() -> Self {
        Self {
            fix_tangential: false,
            fix_k3: true,
            iters: 8,
        }
    }
}

/// A single view's observations for distortion fitting: a homography computed
/// from the distorted pixels, the board points, and the observed pixels.
#[derive(Debug, Clone)]
pub struct DistortionView {
    pub homography: Mat3,
    pub board_points: Vec<Pt2>,
    pub pixel_points: Vec<Pt2>,
}

impl DistortionView {
    pub fn new(
        homography: Mat3,
        board_points: Vec<Pt2>,
        pixel_points: Vec<Pt2>,
    ) -> Result<Self, DistortionFitError> {
        if board_points.len() != pixel_points.len() {
            return Err(DistortionFitError::NotEnoughPoints(
                board_points.len(),
                pixel_points.len(),
            ));
        }
        Ok(Self {
            homography,
            board_points,
            pixel_points,
        })
    }
}

fn ideal_normalized(k_inv: &Mat3, homography: &Mat3, board_pt: &Pt2) -> Vec2 {
    let pixel_ideal_h = homography * Vec3::new(board_pt.x, board_pt.y, 1.0);
    let n_h = k_inv
        * Vec3::new(
            pixel_ideal_h.x / pixel_ideal_h.z,
            pixel_ideal_h.y / pixel_ideal_h.z,
            1.0,
        );
    Vec2::new(n_h.x / n_h.z, n_h.y / n_h.z)
}

/// Estimate Brown-Conrady distortion from multiple views with known
/// intrinsics.
pub fn estimate_distortion_from_homographies(
    intrinsics: &Mat3,
    views: &[DistortionView],
    opts: DistortionFitOptions,
) -> Result<BrownConrady5, DistortionFitError> {
    let total_points: usize = views.iter().map(|v| v.board_points.len()).sum();

    let n_params: usize = match (opts.fix_tangential, opts.fix_k3) {
        (true, true) => 2,   // k1, k2 only
        (true, false) => 3,  // k1, k2, k3
        (false, true) => 4,  // k1, k2, p1, p2
        (false, false) => 5, // all
    };

    let min_points = n_params.div_ceil(2) + 2; // need an overdetermined system
    if total_points < min_points {
        return Err(DistortionFitError::NotEnoughPoints(min_points, total_points));
    }

    let k_inv = intrinsics
        .try_inverse()
        .ok_or(DistortionFitError::IntrinsicsNotInvertible)?;

    // Each point contributes two rows (x and y residuals).
    let mut a = DMatrix::<Real>::zeros(2 * total_points, n_params);
    let mut b = DVector::<Real>::zeros(2 * total_points);
    let mut max_r2: Real = 0.0;

    let mut row_idx = 0;
    for view in views {
        for (board_pt, pixel_obs) in view.board_points.iter().zip(&view.pixel_points) {
            let n_ideal = ideal_normalized(&k_inv, &view.homography, board_pt);

            let n_obs_h = k_inv * Vec3::new(pixel_obs.x, pixel_obs.y, 1.0);
            let n_obs = Vec2::new(n_obs_h.x / n_obs_h.z, n_obs_h.y / n_obs_h.z);

            let residual = n_obs - n_ideal;

            let x = n_ideal.x;
            let y = n_ideal.y;
            let r2 = x * x + y * y;
            let r4 = r2 * r2;
            let r6 = r4 * r2;
            max_r2 = max_r2.max(r2);

            // n_obs ≈ n_ideal + distortion(n_ideal), linear in the coefficients
            let mut col_idx = 0;

            a[(row_idx, col_idx)] = x * r2;
            a[(row_idx + 1, col_idx)] = y * r2;
            col_idx += 1;

            a[(row_idx, col_idx)] = x * r4;
            a[(row_idx + 1, col_idx)] = y * r4;
            col_idx += 1;

            if !opts.fix_k3 {
                a[(row_idx, col_idx)] = x * r6;
                a[(row_idx + 1, col_idx)] = y * r6;
                col_idx += 1;
            }

            if !opts.fix_tangential {
                let xy = x * y;
                a[(row_idx, col_idx)] = 2.0 * xy;
                a[(row_idx + 1, col_idx)] = r2 + 2.0 * y * y;
                col_idx += 1;

                a[(row_idx, col_idx)] = r2 + 2.0 * x * x;
                a[(row_idx + 1, col_idx)] = 2.0 * xy;
            }

            b[row_idx] = residual.x;
            b[row_idx + 1] = residual.y;

            row_idx += 2;
        }
    }

    if max_r2 < 1e-6 {
        return Err(DistortionFitError::DegenerateConfiguration);
    }

    let svd = a.svd(true, true);
    let x = svd
        .solve(&b, 1e-10)
        .map_err(|_| DistortionFitError::SvdFailed)?;

    let mut col_idx = 0;
    let k1 = x[col_idx];
    col_idx += 1;
    let k2 = x[col_idx];
    col_idx += 1;
    let k3 = if opts.fix_k3 {
        0.0
    } else {
        let val = x[col_idx];
        col_idx += 1;
        val
    };
    let (p1, p2) = if opts.fix_tangential {
        (0.0, 0.0)
    } else {
        (x[col_idx], x[col_idx + 1])
    };

    Ok(BrownConrady5 {
        k1,
        k2,
        k3,
        p1,
        p2,
        iters: opts.iters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Isometry3, Rotation3, Translation3, Vector3};

    fn make_kmtx() -> Mat3 {
        Mat3::new(800.0, 0.0, 640.0, 0.0, 800.0, 360.0, 0.0, 0.0, 1.0)
    }

    fn synthetic_view(
        kmtx: &Mat3,
        dist: &BrownConrady5,
        rot: Rotation3<Real>,
        t: Vector3<Real>,
        board_points: &[Pt2],
    ) -> DistortionView {
        let iso = Isometry3::from_parts(Translation3::from(t), rot.into());

        let mut pixels = Vec::new();
        for bp in board_points {
            let p3d = iso.transform_point(&nalgebra::Point3::new(bp.x, bp.y, 0.0));
            let n_undist = Vec2::new(p3d.x / p3d.z, p3d.y / p3d.z);
            let n_dist = dist.distort(&n_undist);
            let pixel_h = kmtx * Vec3::new(n_dist.x, n_dist.y, 1.0);
            pixels.push(Pt2::new(pixel_h.x / pixel_h.z, pixel_h.y / pixel_h.z));
        }

        // Ideal (distortion-free) homography H = K [r1 r2 t]
        let binding = iso.rotation.to_rotation_matrix();
        let r_mat = binding.matrix();
        let mut hmtx = Mat3::zeros();
        hmtx.set_column(0, &(kmtx * r_mat.column(0)));
        hmtx.set_column(1, &(kmtx * r_mat.column(1)));
        hmtx.set_column(2, &(kmtx * t));

        DistortionView::new(hmtx, board_points.to_vec(), pixels).unwrap()
    }

    #[test]
    fn synthetic_radial_only_recovers_k1_k2() {
        let kmtx = make_kmtx();
        let dist_gt = BrownConrady5 {
            k1: -0.2,
            k2: 0.05,
            k3: 0.0,
            p1: 0.0,
            p2: 0.0,
            iters: 8,
        };

        let mut board_points = Vec::new();
        for i in 0..7 {
            for j in 0..7 {
                board_points.push(Pt2::new(i as Real * 30.0, j as Real * 30.0));
            }
        }

        let poses = vec![
            (
                Rotation3::from_euler_angles(0.1, 0.0, 0.05),
                Vector3::new(100.0, -50.0, 1000.0),
            ),
            (
                Rotation3::from_euler_angles(-0.05, 0.15, -0.1),
                Vector3::new(-50.0, 100.0, 1200.0),
            ),
            (
                Rotation3::from_euler_angles(0.2, -0.1, 0.0),
                Vector3::new(0.0, 0.0, 900.0),
            ),
        ];

        let views: Vec<DistortionView> = poses
            .into_iter()
            .map(|(rot, t)| synthetic_view(&kmtx, &dist_gt, rot, t, &board_points))
            .collect();

        let opts = DistortionFitOptions {
            fix_tangential: true,
            fix_k3: true,
            iters: 8,
        };

        let dist_est = estimate_distortion_from_homographies(&kmtx, &views, opts).unwrap();

        // linear approximation, expect rough agreement only
        assert!((dist_est.k1 - dist_gt.k1).abs() < 0.1, "k1 error too large");
        assert!((dist_est.k2 - dist_gt.k2).abs() < 0.03, "k2 error too large");
        assert_eq!(dist_est.k3, 0.0);
        assert_eq!(dist_est.p1, 0.0);
        assert_eq!(dist_est.p2, 0.0);
    }

    #[test]
    fn too_few_points_rejected() {
        let kmtx = make_kmtx();
        let view = DistortionView::new(
            Mat3::identity(),
            vec![Pt2::new(0.0, 0.0)],
            vec![Pt2::new(0.0, 0.0)],
        )
        .unwrap();
        let res = estimate_distortion_from_homographies(
            &kmtx,
            &[view],
            DistortionFitOptions::default(),
        );
        assert!(matches!(res, Err(DistortionFitError::NotEnoughPoints(_, 1))));
    }
}
