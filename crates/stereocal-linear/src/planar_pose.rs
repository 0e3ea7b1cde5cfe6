use nalgebra::{Matrix3, Rotation3, Translation3, UnitQuaternion};
use stereocal_core::{Iso3, Mat3, Real, Vec3};
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy)]
pub enum PlanarPoseError {
    #[error("intrinsics matrix is not invertible")]
    IntrinsicsNotInvertible,
    #[error("svd failed in pose decomposition")]
    SvdFailed,
}

/// Estimate the pose of a planar board (Z=0) relative to the camera, given
/// intrinsics K and homography H (plane -> image).
///
/// This is the classic decomposition of a plane-induced homography into a
/// rotation and translation. Returns an `Iso3` that maps board coordinates
/// into camera coordinates.
pub fn estimate_planar_pose_from_h(kmtx: &Mat3, hmtx: &Mat3) -> Result<Iso3, PlanarPoseError> {
    let k_inv = kmtx
        .try_inverse()
        .ok_or(PlanarPoseError::IntrinsicsNotInvertible)?;

    let h1 = hmtx.column(0);
    let h2 = hmtx.column(1);
    let h3 = hmtx.column(2).into_owned();

    let k_inv_h1 = k_inv * h1;
    let k_inv_h2 = k_inv * h2;

    // Scale factor λ: normalize first two columns (average for robustness)
    let norm1 = k_inv_h1.norm();
    let norm2 = k_inv_h2.norm();
    let lambda = 1.0 / ((norm1 + norm2) * 0.5);
    if !lambda.is_finite() {
        return Err(PlanarPoseError::SvdFailed);
    }

    let r1 = (lambda * k_inv_h1).into_owned();
    let r2 = (lambda * k_inv_h2).into_owned();
    let r3 = r1.cross(&r2);

    let mut r_mat = Matrix3::<Real>::zeros();
    r_mat.set_column(0, &r1);
    r_mat.set_column(1, &r2);
    r_mat.set_column(2, &r3);

    // Project onto SO(3) (polar decomposition via SVD)
    let svd = r_mat.svd(true, true);
    let u = svd.u.ok_or(PlanarPoseError::SvdFailed)?;
    let v_t = svd.v_t.ok_or(PlanarPoseError::SvdFailed)?;
    let mut r_orth = u * v_t;

    // Ensure det(R) > 0
    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }

    let t_vec: Vec3 = lambda * (k_inv * h3);
    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r_orth));

    Ok(Iso3::from_parts(Translation3::from(t_vec), rot))
}
