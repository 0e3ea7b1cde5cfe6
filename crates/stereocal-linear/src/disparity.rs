//! Disparity-to-depth transform.
//!
//! Converts one pair of corresponding rectified points into a 3-D position
//! by pushing `(x, y, disparity)` through the `Q` matrix as a perspective
//! transform. Correspondence is assumed given; no search is performed.

use stereocal_core::{Mat4, Pt2, Pt3, Real, Vec4};
use thiserror::Error;

/// Disparities smaller than this are treated as zero (point at infinity).
const MIN_DISPARITY: Real = 1e-9;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DisparityError {
    /// The two views report the same horizontal coordinate; depth is at
    /// infinity.
    #[error("zero disparity: depth is unresolvable")]
    ZeroDisparity,
    /// The homogeneous coordinate vanished or the transform produced
    /// non-finite values.
    #[error("disparity-to-depth transform is ill-defined for this input")]
    DegenerateTransform,
}

/// Transform a correspondence into a 3-D point in the rectified camera-0
/// frame.
///
/// `p0` / `p1` are the same physical feature observed in the two rectified
/// views; disparity is `p0.x - p1.x`.
pub fn point_from_disparity(q: &Mat4, p0: &Pt2, p1: &Pt2) -> Result<Pt3, DisparityError> {
    let disparity = p0.x - p1.x;
    if disparity.abs() < MIN_DISPARITY {
        return Err(DisparityError::ZeroDisparity);
    }

    let v = q * Vec4::new(p0.x, p0.y, disparity, 1.0);
    if v.w.abs() < 1e-12 {
        return Err(DisparityError::DegenerateTransform);
    }

    let p = Pt3::new(v.x / v.w, v.y / v.w, v.z / v.w);
    if !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()) {
        return Err(DisparityError::DegenerateTransform);
    }
    Ok(p)
}

/// Depth (`Z`) of a correspondence; see [`point_from_disparity`].
pub fn depth_from_disparity(q: &Mat4, p0: &Pt2, p1: &Pt2) -> Result<Real, DisparityError> {
    point_from_disparity(q, p0, p1).map(|p| p.z)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Q for an ideal rig: f=800, shared principal point (320, 240),
    /// baseline 60 to the right (tx = -60).
    fn ideal_q() -> Mat4 {
        let (f, cx, cy, tx) = (800.0, 320.0, 240.0, -60.0);
        let mut q = Mat4::zeros();
        q[(0, 0)] = 1.0;
        q[(0, 3)] = -cx;
        q[(1, 1)] = 1.0;
        q[(1, 3)] = -cy;
        q[(2, 3)] = f;
        q[(3, 2)] = -1.0 / tx;
        q
    }

    #[test]
    fn positive_disparity_gives_expected_depth() {
        let q = ideal_q();
        let p0 = Pt2::new(320.0, 240.0);
        let p1 = Pt2::new(300.0, 240.0);

        let p = point_from_disparity(&q, &p0, &p1).unwrap();
        // Z = f * B / d = 800 * 60 / 20
        assert!((p.z - 2400.0).abs() < 1e-9, "z={}", p.z);
        assert!(p.z > 0.0);
        // the feature sits on the optical axis of camera 0
        assert!(p.x.abs() < 1e-9 && p.y.abs() < 1e-9);
    }

    #[test]
    fn zero_disparity_is_a_sentinel() {
        let q = ideal_q();
        let p = Pt2::new(320.0, 240.0);
        assert_eq!(
            point_from_disparity(&q, &p, &p),
            Err(DisparityError::ZeroDisparity)
        );
        assert_eq!(
            depth_from_disparity(&q, &p, &p),
            Err(DisparityError::ZeroDisparity)
        );
    }

    #[test]
    fn vanishing_homogeneous_coordinate_is_degenerate() {
        // Q with a principal-point offset makes w vanish at d = cx0 - cx1
        let mut q = ideal_q();
        q[(3, 3)] = 10.0 / 60.0; // cx0 - cx1 = -10, tx = -60
        let p0 = Pt2::new(320.0, 240.0);
        let p1 = Pt2::new(330.0, 240.0); // d = -10 = cx0 - cx1
        assert_eq!(
            point_from_disparity(&q, &p0, &p1),
            Err(DisparityError::DegenerateTransform)
        );
    }
}
