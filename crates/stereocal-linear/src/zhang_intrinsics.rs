use nalgebra::{DMatrix, DVector};
use stereocal_core::{CameraIntrinsics, ImageSize, Mat3, Real};
use thiserror::Error;

/// Errors from the closed-form intrinsics solvers.
#[derive(Debug, Error, Clone, Copy)]
pub enum IntrinsicsInitError {
    #[error("need at least {expected} homographies, got {got}")]
    NotEnoughViews { expected: usize, got: usize },
    #[error("svd failed in intrinsics estimation")]
    SvdFailed,
    /// The view poses do not constrain the solution (e.g. all observations
    /// from near-identical poses).
    #[error("degenerate view configuration in intrinsics estimation")]
    Degenerate,
}

/// Build the 6-vector v_ij(H) as in Zhang's method.
fn v_ij(hmtx: &Mat3, i: usize, j: usize) -> nalgebra::SVector<Real, 6> {
    let hi = hmtx.column(i);
    let hj = hmtx.column(j);

    nalgebra::SVector::<Real, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Estimate camera intrinsics K from a set of plane homographies H_k using
/// Zhang's closed-form solution (no distortion).
///
/// Requires at least 3 homographies for the full five-parameter model; use
/// [`estimate_focal_fixed_center`] below that count.
pub fn estimate_intrinsics_from_homographies(
    hmtxs: &[Mat3],
) -> Result<CameraIntrinsics, IntrinsicsInitError> {
    if hmtxs.len() < 3 {
        return Err(IntrinsicsInitError::NotEnoughViews {
            expected: 3,
            got: hmtxs.len(),
        });
    }

    let m = hmtxs.len();
    let mut vmtx = DMatrix::<Real>::zeros(2 * m, 6);

    for (k, hmtx) in hmtxs.iter().enumerate() {
        let v11 = v_ij(hmtx, 0, 0);
        let v22 = v_ij(hmtx, 1, 1);
        let v12 = v_ij(hmtx, 0, 1);

        // Row 2k: v_12^T
        vmtx.row_mut(2 * k).copy_from(&v12.transpose());
        // Row 2k+1: (v_11 - v_22)^T
        vmtx.row_mut(2 * k + 1).copy_from(&(v11 - v22).transpose());
    }

    // Solve V b = 0 via SVD: take the singular vector corresponding to the
    // smallest singular value.
    let svd = vmtx.svd(true, true);
    let sv = &svd.singular_values;
    // b is determined up to scale only when the constraint matrix has rank 5;
    // a larger nullspace means the poses do not constrain the solution. The
    // matrix is badly scaled (entries span ~f^2), so the cutoff sits near
    // machine zero rather than at a conditioning bound.
    if sv[4] <= 1e-12 * sv[0] {
        return Err(IntrinsicsInitError::Degenerate);
    }
    let v_t = svd.v_t.ok_or(IntrinsicsInitError::SvdFailed)?;
    let b = v_t.row(v_t.nrows() - 1);

    let b11 = b[0];
    let b12 = b[1];
    let b22 = b[2];
    let b13 = b[3];
    let b23 = b[4];
    let b33 = b[5];

    // From Zhang's paper:
    //
    // v0 = (B12 B13 - B11 B23) / (B11 B22 - B12^2)
    // λ = B33 - (B13^2 + v0 (B12 B13 - B11 B23)) / B11
    // α = sqrt(λ / B11)
    // β = sqrt(λ B11 / (B11 B22 - B12^2))
    // γ = -B12 α^2 β / λ
    // u0 = γ v0 / β - B13 α^2 / λ

    let denom = b11 * b22 - b12 * b12;
    let denom_norm = b11 * b11 + b22 * b22;
    let denom_rel = if denom_norm > 0.0 {
        denom.abs() / denom_norm
    } else {
        0.0
    };
    if denom_rel <= 1e-6 {
        return Err(IntrinsicsInitError::Degenerate);
    }

    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;

    if lambda.signum() != b11.signum() {
        return Err(IntrinsicsInitError::Degenerate);
    }

    let alpha = (lambda / b11).sqrt();
    let beta = (lambda * b11 / denom).sqrt();
    if !alpha.is_finite() || !beta.is_finite() {
        return Err(IntrinsicsInitError::Degenerate);
    }
    let gamma = -b12 * alpha * alpha * beta / lambda;
    let u0 = gamma * v0 / beta - b13 * alpha * alpha / lambda;

    Ok(CameraIntrinsics {
        fx: alpha,
        fy: beta,
        cx: u0,
        cy: v0,
        skew: gamma,
    })
}

/// Estimate focal lengths only, with the principal point fixed at the image
/// centre and zero skew.
///
/// Each homography contributes Zhang's two constraints, so a single view is
/// enough. This is the reduced model used when fewer than three observations
/// are available.
pub fn estimate_focal_fixed_center(
    hmtxs: &[Mat3],
    image_size: ImageSize,
) -> Result<CameraIntrinsics, IntrinsicsInitError> {
    if hmtxs.is_empty() {
        return Err(IntrinsicsInitError::NotEnoughViews {
            expected: 1,
            got: 0,
        });
    }

    let cx = (image_size.width as Real - 1.0) * 0.5;
    let cy = (image_size.height as Real - 1.0) * 0.5;

    // With cx, cy known and skew = 0, B = K^-T K^-1 reduces to two unknowns
    // a = 1/fx^2 and b = 1/fy^2; each constraint v_ij^T b = 0 becomes
    // (u_i u_j) a + (v_i v_j) b + w_i w_j = 0 with
    // u = h0 - cx h2, v = h1 - cy h2, w = h2 per column.
    let m = hmtxs.len();
    let mut amtx = DMatrix::<Real>::zeros(2 * m, 2);
    let mut rhs = DVector::<Real>::zeros(2 * m);

    for (k, hmtx) in hmtxs.iter().enumerate() {
        let col = |i: usize| {
            let h = hmtx.column(i);
            (h[0] - cx * h[2], h[1] - cy * h[2], h[2])
        };
        let (u0, v0, w0) = col(0);
        let (u1, v1, w1) = col(1);

        // v_12 constraint
        amtx[(2 * k, 0)] = u0 * u1;
        amtx[(2 * k, 1)] = v0 * v1;
        rhs[2 * k] = -w0 * w1;

        // v_11 - v_22 constraint
        amtx[(2 * k + 1, 0)] = u0 * u0 - u1 * u1;
        amtx[(2 * k + 1, 1)] = v0 * v0 - v1 * v1;
        rhs[2 * k + 1] = -(w0 * w0 - w1 * w1);
    }

    let svd = amtx.svd(true, true);
    if svd.singular_values[1] <= 1e-10 * svd.singular_values[0] {
        return Err(IntrinsicsInitError::Degenerate);
    }
    let sol = svd
        .solve(&rhs, 1e-12)
        .map_err(|_| IntrinsicsInitError::SvdFailed)?;

    let a = sol[0];
    let b = sol[1];
    if a <= 0.0 || b <= 0.0 || !a.is_finite() || !b.is_finite() {
        return Err(IntrinsicsInitError::Degenerate);
    }

    Ok(CameraIntrinsics {
        fx: 1.0 / a.sqrt(),
        fy: 1.0 / b.sqrt(),
        cx,
        cy,
        skew: 0.0,
    })
}
