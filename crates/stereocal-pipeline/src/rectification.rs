//! Rectification parameters and dense pixel remap tables.
//!
//! The closed-form transforms come from `stereocal-linear`; this module
//! derives the per-camera remap tables used to warp a raw camera image into
//! rectified space. The warp itself is applied outside the pipeline; the
//! tables are plain data.

use crate::error::CalibError;
use crate::extrinsics::ExtrinsicParameters;
use crate::intrinsics::IntrinsicParameters;
use log::debug;
use serde::{Deserialize, Serialize};
use stereocal_core::{
    BrownConrady5, CameraIntrinsics, CameraSide, ImageSize, Mat3, Mat34, Mat4, Real, SidePair,
    Vec2, Vec3,
};
use stereocal_linear::{stereo_rectify, RectifyCamera};

/// Dense inverse map: for every rectified pixel, the source coordinates to
/// sample in the raw image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemapTable {
    pub size: ImageSize,
    map_x: Vec<f32>,
    map_y: Vec<f32>,
}

impl RemapTable {
    /// Source coordinates for the rectified pixel `(u, v)`.
    pub fn lookup(&self, u: u32, v: u32) -> Option<(f32, f32)> {
        if u >= self.size.width || v >= self.size.height {
            return None;
        }
        let idx = v as usize * self.size.width as usize + u as usize;
        Some((self.map_x[idx], self.map_y[idx]))
    }

    pub fn map_x(&self) -> &[f32] {
        &self.map_x
    }

    pub fn map_y(&self) -> &[f32] {
        &self.map_y
    }
}

/// Build the inverse map from a new projection and rectifying rotation back
/// into the original distorted camera.
fn build_remap(
    k: &CameraIntrinsics,
    dist: &BrownConrady5,
    rect_rotation: &Mat3,
    k_new: &CameraIntrinsics,
    size: ImageSize,
) -> RemapTable {
    let mut map_x = vec![0.0f32; size.pixel_count()];
    let mut map_y = vec![0.0f32; size.pixel_count()];

    let r_inv = rect_rotation.transpose();

    for v in 0..size.height {
        for u in 0..size.width {
            // rectified pixel -> normalized ray in the rectified frame
            let n_new = k_new.pixel_to_normalized(&Vec2::new(u as Real, v as Real));
            // back into the original camera frame
            let ray = r_inv * Vec3::new(n_new.x, n_new.y, 1.0);

            let idx = v as usize * size.width as usize + u as usize;
            if ray.z.abs() > 1e-12 {
                let n = Vec2::new(ray.x / ray.z, ray.y / ray.z);
                let nd = dist.distort(&n);
                let src = k.normalized_to_pixel(&nd);
                map_x[idx] = src.x as f32;
                map_y[idx] = src.y as f32;
            }
        }
    }

    RemapTable { size, map_x, map_y }
}

/// Per-camera rectifying transforms, the shared disparity-to-depth matrix,
/// and the derived dense remap tables.
///
/// Always rebuilt whole from the current intrinsics and extrinsics, both
/// after a fresh solve and after a reload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RectificationParameters {
    /// Rectifying rotation per camera.
    pub rotations: SidePair<Mat3>,
    /// Rectified projection per camera.
    pub projections: SidePair<Mat34>,
    /// Disparity-to-depth matrix.
    pub q: Mat4,
    /// Dense rectification map per camera, at native resolution.
    pub remaps: SidePair<RemapTable>,
}

impl RectificationParameters {
    /// Compute the transforms from scratch and derive the remap tables.
    pub fn build(
        params: SidePair<&IntrinsicParameters>,
        extrinsics: &ExtrinsicParameters,
    ) -> Result<Self, CalibError> {
        let to_rectify = |p: &IntrinsicParameters| RectifyCamera {
            k: p.intrinsics,
            dist: p.distortion,
            size: p.image_size,
        };
        let rect = stereo_rectify(
            &to_rectify(params.left),
            &to_rectify(params.right),
            &extrinsics.relative_pose(),
        )
        .map_err(|e| CalibError::SolveDivergence(e.to_string()))?;

        let rotations = SidePair::new(rect.r0, rect.r1);
        let projections = SidePair::new(rect.p0, rect.p1);

        Ok(Self {
            remaps: Self::derive_remaps(params, &rotations, &projections),
            rotations,
            projections,
            q: rect.q,
        })
    }

    /// Rebuild from previously computed transforms (the load path), deriving
    /// fresh remap tables from each camera's own intrinsics.
    pub fn from_transforms(
        params: SidePair<&IntrinsicParameters>,
        rotations: SidePair<Mat3>,
        projections: SidePair<Mat34>,
        q: Mat4,
    ) -> Self {
        Self {
            remaps: Self::derive_remaps(params, &rotations, &projections),
            rotations,
            projections,
            q,
        }
    }

    fn derive_remaps(
        params: SidePair<&IntrinsicParameters>,
        rotations: &SidePair<Mat3>,
        projections: &SidePair<Mat34>,
    ) -> SidePair<RemapTable> {
        let derive = |side: CameraSide| {
            let p = *params.get(side);
            let proj = projections.get(side);
            let k_new = CameraIntrinsics {
                fx: proj[(0, 0)],
                fy: proj[(1, 1)],
                cx: proj[(0, 2)],
                cy: proj[(1, 2)],
                skew: 0.0,
            };
            debug!("deriving {side} remap table at {:?}", p.image_size);
            build_remap(&p.intrinsics, &p.distortion, rotations.get(side), &k_new, p.image_size)
        };
        SidePair::new(derive(CameraSide::Left), derive(CameraSide::Right))
    }

    /// Undistort-only remap for one camera: same intrinsics, no rotation.
    /// Used by the undistorted display mode that precedes rectification.
    pub fn undistort_map(params: &IntrinsicParameters) -> RemapTable {
        build_remap(
            &params.intrinsics,
            &params.distortion,
            &Mat3::identity(),
            // keep the original projection so only the distortion moves
            &params.intrinsics,
            params.image_size,
        )
    }
}
