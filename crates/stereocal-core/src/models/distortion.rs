use crate::{Real, Vec2};
use serde::{Deserialize, Serialize};

/// Brown-Conrady distortion with three radial and two tangential terms.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BrownConrady5 {
    pub k1: Real,
    pub k2: Real,
    pub k3: Real,
    pub p1: Real,
    pub p2: Real,
    /// Fixed-point iterations used by `undistort`.
    pub iters: u32,
}

impl BrownConrady5 {
    /// All coefficients zero, default iteration count.
    pub fn zero() -> Self {
        Self {
            iters: 8,
            ..Self::default()
        }
    }

    /// Coefficients as the `(k1, k2, p1, p2, k3)` vector layout used by the
    /// persisted parameter files.
    pub fn coeffs(&self) -> [Real; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    fn distort_impl(&self, x: Real, y: Real) -> (Real, Real) {
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;

        let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;

        let xy = x * y;
        let x_tan = 2.0 * self.p1 * xy + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * xy;

        (x * radial + x_tan, y * radial + y_tan)
    }

    /// Apply distortion to an undistorted normalized point.
    pub fn distort(&self, n_undist: &Vec2) -> Vec2 {
        let (xd, yd) = self.distort_impl(n_undist.x, n_undist.y);
        Vec2::new(xd, yd)
    }

    /// Remove distortion by fixed-point iteration.
    pub fn undistort(&self, n_dist: &Vec2) -> Vec2 {
        let mut x = n_dist.x;
        let mut y = n_dist.y;

        let iters = if self.iters == 0 { 8 } else { self.iters };
        for _ in 0..iters {
            let (xd, yd) = self.distort_impl(x, y);
            x -= xd - n_dist.x;
            y -= yd - n_dist.y;
        }
        Vec2::new(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undistort_inverts_distort() {
        let dist = BrownConrady5 {
            k1: -0.2,
            k2: 0.05,
            k3: 0.0,
            p1: 0.001,
            p2: -0.002,
            iters: 8,
        };
        let n = Vec2::new(0.3, -0.2);
        let d = dist.distort(&n);
        let back = dist.undistort(&d);
        assert!((back - n).norm() < 1e-9);
    }

    #[test]
    fn zero_distortion_is_identity() {
        let dist = BrownConrady5::zero();
        let n = Vec2::new(0.4, 0.1);
        assert_eq!(dist.distort(&n), n);
        assert_eq!(dist.undistort(&n), n);
    }
}
