//! Bouguet-style stereo rectification.
//!
//! Produces per-camera rectifying rotations `R0`/`R1`, rectified projections
//! `P0`/`P1` and the disparity-to-depth matrix `Q`. The policy keeps the
//! maximal shared field of view: no zero-disparity constraint (each camera
//! keeps its own new principal point column) and no cropping. Rows are
//! aligned exactly: corresponding points share a vertical coordinate in the
//! two rectified views.

use stereocal_core::{
    BrownConrady5, CameraIntrinsics, ImageSize, Iso3, Mat3, Mat34, Mat4, Real, Vec2, Vec3,
};
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy)]
pub enum RectifyError {
    /// The two camera centres coincide; rectification is undefined.
    #[error("stereo baseline is zero (or numerically indistinguishable from zero)")]
    ZeroBaseline,
    #[error("intrinsics matrix is not invertible")]
    IntrinsicsNotInvertible,
}

/// One camera's inputs to rectification.
#[derive(Debug, Clone, Copy)]
pub struct RectifyCamera {
    pub k: CameraIntrinsics,
    pub dist: BrownConrady5,
    pub size: ImageSize,
}

/// Closed-form rectification output.
#[derive(Debug, Clone, Copy)]
pub struct RectifyTransforms {
    /// Rectifying rotation for camera 0 (camera frame -> rectified frame).
    pub r0: Mat3,
    /// Rectifying rotation for camera 1.
    pub r1: Mat3,
    /// Rectified projection for camera 0.
    pub p0: Mat34,
    /// Rectified projection for camera 1 (carries the baseline term).
    pub p1: Mat34,
    /// Disparity-to-depth matrix: `(X Y Z W)^T = Q (x y disparity 1)^T`,
    /// 3-D output in the rectified camera-0 frame.
    pub q: Mat4,
    /// Shared rectified focal length.
    pub f: Real,
    /// Signed baseline along the rectified x axis.
    pub tx: Real,
}

/// New principal point for one camera: average of the four undistorted,
/// rectified image corners, centred on the image.
fn new_principal_point(
    cam: &RectifyCamera,
    r_rect: &Mat3,
    f_new: Real,
) -> Result<Vec2, RectifyError> {
    let k_inv = cam
        .k
        .k_matrix()
        .try_inverse()
        .ok_or(RectifyError::IntrinsicsNotInvertible)?;

    let w = cam.size.width as Real;
    let h = cam.size.height as Real;
    let corners = [
        Vec2::new(0.0, 0.0),
        Vec2::new(w - 1.0, 0.0),
        Vec2::new(0.0, h - 1.0),
        Vec2::new(w - 1.0, h - 1.0),
    ];

    let mut avg = Vec2::zeros();
    for c in corners {
        let n_h = k_inv * Vec3::new(c.x, c.y, 1.0);
        let n = cam.dist.undistort(&Vec2::new(n_h.x / n_h.z, n_h.y / n_h.z));
        let r = r_rect * Vec3::new(n.x, n.y, 1.0);
        avg += f_new * Vec2::new(r.x / r.z, r.y / r.z);
    }
    avg /= corners.len() as Real;

    Ok(Vec2::new((w - 1.0) * 0.5 - avg.x, (h - 1.0) * 0.5 - avg.y))
}

/// Compute rectification transforms for a calibrated rig.
///
/// `rel` is the pose of camera 1 in camera 0's frame
/// (`x_c1 = R x_c0 + T`). Fails when the baseline is zero.
pub fn stereo_rectify(
    cam0: &RectifyCamera,
    cam1: &RectifyCamera,
    rel: &Iso3,
) -> Result<RectifyTransforms, RectifyError> {
    let t = rel.translation.vector;
    let baseline = t.norm();
    if baseline <= 1e-12 {
        return Err(RectifyError::ZeroBaseline);
    }

    // Split the relative rotation evenly between the two cameras.
    let half = rel.rotation.powf(0.5);
    let r_half_pos = half.to_rotation_matrix(); // R^{1/2}, applied to camera 0
    let r_half_neg = half.inverse().to_rotation_matrix(); // R^{-1/2}, camera 1

    // Baseline expressed after the half rotation; the row rotation aligns it
    // with the x axis while preserving its sign.
    let t_half = r_half_neg * t;
    let sign = if t_half.x >= 0.0 { 1.0 } else { -1.0 };
    let e1 = t_half * (sign / baseline);
    let helper = if e1.z.abs() < 0.9 {
        Vec3::new(0.0, 0.0, 1.0)
    } else {
        Vec3::new(0.0, 1.0, 0.0)
    };
    let e2 = helper.cross(&e1).normalize();
    let e3 = e1.cross(&e2);
    let w_rot = Mat3::from_columns(&[e1, e2, e3]).transpose();

    let r0 = w_rot * r_half_pos.matrix();
    let r1 = w_rot * r_half_neg.matrix();

    let t_new = r1 * t;
    let tx = t_new.x;

    let f = 0.5 * (cam0.k.fy + cam1.k.fy);

    let cc0 = new_principal_point(cam0, &r0, f)?;
    let cc1 = new_principal_point(cam1, &r1, f)?;

    // Rows must align across the pair, so the vertical centre is shared; the
    // horizontal centres stay per-camera (no zero-disparity constraint).
    let cy = 0.5 * (cc0.y + cc1.y);
    let (cx0, cx1) = (cc0.x, cc1.x);

    let p0 = Mat34::new(
        f, 0.0, cx0, 0.0, //
        0.0, f, cy, 0.0, //
        0.0, 0.0, 1.0, 0.0,
    );
    let p1 = Mat34::new(
        f, 0.0, cx1, tx * f, //
        0.0, f, cy, 0.0, //
        0.0, 0.0, 1.0, 0.0,
    );

    let mut q = Mat4::zeros();
    q[(0, 0)] = 1.0;
    q[(0, 3)] = -cx0;
    q[(1, 1)] = 1.0;
    q[(1, 3)] = -cy;
    q[(2, 3)] = f;
    q[(3, 2)] = -1.0 / tx;
    q[(3, 3)] = (cx0 - cx1) / tx;

    Ok(RectifyTransforms {
        r0,
        r1,
        p0,
        p1,
        q,
        f,
        tx,
    })
}
