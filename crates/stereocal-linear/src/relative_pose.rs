//! Relative pose of the second camera in the first camera's frame.
//!
//! Each paired view yields one relative pose estimate from the two planar
//! board poses; the estimates are averaged on SE(3). The essential and
//! fundamental matrices follow in closed form from the averaged pose.

use nalgebra::{Quaternion, Translation3, UnitQuaternion};
use stereocal_core::{Iso3, Mat3, Real, Vec3};
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy)]
pub enum RelativePoseError {
    #[error("need the same number of poses for both cameras, got {left} vs {right}")]
    CountMismatch { left: usize, right: usize },
    #[error("need at least one pose pair")]
    Empty,
    #[error("intrinsics matrix is not invertible")]
    IntrinsicsNotInvertible,
}

/// Simple SE(3) averaging:
/// - translations are averaged arithmetically
/// - rotations are averaged in quaternion space (with hemisphere correction)
///
/// Adequate here because the per-view estimates all measure the same rigid
/// transform and differ only by estimation noise.
fn average_isometries(poses: &[Iso3]) -> Result<Iso3, RelativePoseError> {
    if poses.is_empty() {
        return Err(RelativePoseError::Empty);
    }

    let mut t_sum = Vec3::zeros();
    for iso in poses {
        t_sum += iso.translation.vector;
    }
    let t_avg = Translation3::from(t_sum / (poses.len() as Real));

    let q0 = poses[0].rotation; // reference for hemisphere
    let mut acc = nalgebra::Vector4::<Real>::zeros();

    for iso in poses {
        let coords = iso.rotation.coords;
        // enforce same hemisphere to avoid cancellation
        let sign = if q0.coords.dot(&coords) < 0.0 { -1.0 } else { 1.0 };
        acc += coords * sign;
    }

    if acc.norm_squared() == 0.0 {
        // fallback: identity rotation
        return Ok(Iso3::from_parts(t_avg, UnitQuaternion::identity()));
    }

    let q = Quaternion::from_vector(acc / (poses.len() as Real)).normalize();
    Ok(Iso3::from_parts(t_avg, UnitQuaternion::from_quaternion(q)))
}

/// Estimate the pose of camera 1 relative to camera 0 from per-view board
/// poses.
///
/// `poses0[i]` / `poses1[i]` map board coordinates of view `i` into each
/// camera's frame. The two collections must be position-for-position
/// corresponding and equally sized; a mismatch is a hard error, never a
/// silent truncation.
pub fn estimate_relative_pose(
    poses0: &[Iso3],
    poses1: &[Iso3],
) -> Result<Iso3, RelativePoseError> {
    if poses0.len() != poses1.len() {
        return Err(RelativePoseError::CountMismatch {
            left: poses0.len(),
            right: poses1.len(),
        });
    }
    if poses0.is_empty() {
        return Err(RelativePoseError::Empty);
    }

    // Per view: x_c1 = T1 x_b, x_c0 = T0 x_b  =>  x_c1 = (T1 T0^-1) x_c0
    let rel: Vec<Iso3> = poses0
        .iter()
        .zip(poses1.iter())
        .map(|(t0, t1)| t1 * t0.inverse())
        .collect();

    average_isometries(&rel)
}

/// Skew-symmetric cross-product matrix of `t`.
fn skew_symmetric(t: &Vec3) -> Mat3 {
    Mat3::new(0.0, -t.z, t.y, t.z, 0.0, -t.x, -t.y, t.x, 0.0)
}

/// Essential matrix from a relative pose: `E = [t]x R`.
pub fn essential_from_pose(rel: &Iso3) -> Mat3 {
    let r = rel.rotation.to_rotation_matrix();
    skew_symmetric(&rel.translation.vector) * r.matrix()
}

/// Fundamental matrix from the essential matrix and both K matrices:
/// `F = K1^-T E K0^-1`.
pub fn fundamental_from_essential(
    essential: &Mat3,
    k0: &Mat3,
    k1: &Mat3,
) -> Result<Mat3, RelativePoseError> {
    let k0_inv = k0
        .try_inverse()
        .ok_or(RelativePoseError::IntrinsicsNotInvertible)?;
    let k1_inv = k1
        .try_inverse()
        .ok_or(RelativePoseError::IntrinsicsNotInvertible)?;
    Ok(k1_inv.transpose() * essential * k0_inv)
}
