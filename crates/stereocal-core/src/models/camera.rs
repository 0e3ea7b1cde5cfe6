use crate::{BrownConrady5, CameraIntrinsics, Pt2, Pt3, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Pinhole camera with Brown-Conrady distortion.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PinholeCamera {
    pub k: CameraIntrinsics,
    pub dist: BrownConrady5,
}

impl PinholeCamera {
    pub fn new(k: CameraIntrinsics, dist: BrownConrady5) -> Self {
        Self { k, dist }
    }

    /// Project a camera-frame point to a pixel.
    ///
    /// Returns `None` for points at or behind the camera plane.
    pub fn project_point(&self, p: &Pt3) -> Option<Pt2> {
        if p.z <= 0.0 {
            return None;
        }
        let n = Vec2::new(p.x / p.z, p.y / p.z);
        let nd = self.dist.distort(&n);
        let px = self.k.normalized_to_pixel(&nd);
        Some(Pt2::new(px.x, px.y))
    }

    /// Back-project a pixel to a unit-depth ray in the camera frame.
    pub fn backproject_pixel(&self, pixel: &Vec2) -> Vec3 {
        let n = self.k.pixel_to_normalized(pixel);
        let nu = self.dist.undistort(&n);
        Vec3::new(nu.x, nu.y, 1.0)
    }

    /// Undistort a pixel: remove lens distortion, re-apply K.
    pub fn undistort_pixel(&self, pixel: &Pt2) -> Pt2 {
        let n = self.k.pixel_to_normalized(&pixel.coords);
        let nu = self.dist.undistort(&n);
        let px = self.k.normalized_to_pixel(&nu);
        Pt2::new(px.x, px.y)
    }
}
