//! Depth from a single correspondence.
//!
//! A stateless view over the current rectification parameters: given one
//! rectified point per camera believed to be the same physical feature, the
//! estimator pushes `(x, y, disparity)` through `Q` and reports the 3-D
//! position (camera-0-centred, rectified axes).

use crate::error::CalibError;
use crate::rectification::RectificationParameters;
use stereocal_core::{Pt2, Pt3, Real};
use stereocal_linear::point_from_disparity;

/// Pure function of its two inputs and the rectification parameters it
/// borrows; only reachable once rectification is valid.
#[derive(Debug, Clone, Copy)]
pub struct DepthEstimator<'a> {
    rectification: &'a RectificationParameters,
}

impl<'a> DepthEstimator<'a> {
    pub fn new(rectification: &'a RectificationParameters) -> Self {
        Self { rectification }
    }

    /// 3-D position of the feature seen at `p0` (camera 0) and `p1`
    /// (camera 1) in the rectified views.
    ///
    /// Zero disparity (identical horizontal coordinates) and transforms with
    /// a vanishing homogeneous coordinate are surfaced as
    /// [`CalibError::DegenerateGeometry`], never as a garbage value.
    pub fn point(&self, p0: &Pt2, p1: &Pt2) -> Result<Pt3, CalibError> {
        point_from_disparity(&self.rectification.q, p0, p1)
            .map_err(|e| CalibError::DegenerateGeometry(e.to_string()))
    }

    /// Depth (`Z`) of the feature; see [`DepthEstimator::point`].
    pub fn depth(&self, p0: &Pt2, p1: &Pt2) -> Result<Real, CalibError> {
        self.point(p0, p1).map(|p| p.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extrinsics::ExtrinsicParameters;
    use crate::intrinsics::IntrinsicParameters;
    use stereocal_core::{
        BrownConrady5, CameraIntrinsics, ImageSize, Mat3, SidePair, Vec3,
    };

    /// Ideal axis-aligned rig: identical cameras, 60-unit baseline.
    fn rectification() -> RectificationParameters {
        let record = IntrinsicParameters {
            intrinsics: CameraIntrinsics {
                fx: 800.0,
                fy: 800.0,
                cx: 320.0,
                cy: 240.0,
                skew: 0.0,
            },
            distortion: BrownConrady5::zero(),
            image_size: ImageSize::new(16, 16),
            image_points: vec![Vec::new()],
            per_view_rms: vec![0.0],
        };
        let ext = ExtrinsicParameters {
            rotation: Mat3::identity(),
            translation: Vec3::new(-60.0, 0.0, 0.0),
            essential: Mat3::zeros(),
            fundamental: Mat3::zeros(),
        };
        RectificationParameters::build(SidePair::new(&record, &record), &ext).unwrap()
    }

    #[test]
    fn finite_depth_for_real_disparity() {
        let rect = rectification();
        let est = DepthEstimator::new(&rect);
        let z = est
            .depth(&Pt2::new(320.0, 240.0), &Pt2::new(300.0, 240.0))
            .unwrap();
        // identical cameras and no rotation: Z = f * B / d
        assert!((z - 2400.0).abs() < 1e-6, "z={z}");
    }

    #[test]
    fn zero_disparity_is_degenerate() {
        let rect = rectification();
        let est = DepthEstimator::new(&rect);
        let res = est.depth(&Pt2::new(320.0, 240.0), &Pt2::new(320.0, 240.0));
        assert!(matches!(res, Err(CalibError::DegenerateGeometry(_))));
    }
}
