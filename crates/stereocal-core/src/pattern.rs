//! Calibration pattern geometry.
//!
//! The pattern type and dimensions are externally supplied configuration;
//! this module only turns them into the canonical Z=0 object points that the
//! solvers consume.

use crate::{Pt2, Pt3, Real};
use serde::{Deserialize, Serialize};

/// Supported calibration pattern topologies.
///
/// Unrecognized values fail deserialization, which the pipeline surfaces as a
/// configuration error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternKind {
    /// Checkerboard of internal corners.
    Chessboard,
    /// Regular grid of circle centres.
    SymmetricGrid,
    /// Staggered grid of circle centres (every other row offset by half a
    /// period).
    AsymmetricGrid,
}

/// Geometry of the calibration pattern: internal point counts and physical
/// spacing.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatternGeometry {
    /// Internal points per row.
    pub cols: usize,
    /// Internal points per column.
    pub rows: usize,
    /// Physical spacing between neighbouring points, in user units
    /// (e.g. millimetres).
    pub square_size: Real,
    pub kind: PatternKind,
}

impl PatternGeometry {
    /// Number of detectable points in one observation of this pattern.
    pub fn point_count(&self) -> usize {
        self.cols * self.rows
    }

    /// Canonical object points on the pattern plane (Z = 0), in detector
    /// raster order (row-major, row index outermost).
    pub fn object_points(&self) -> Vec<Pt3> {
        let mut pts = Vec::with_capacity(self.point_count());
        for j in 0..self.rows {
            for i in 0..self.cols {
                let (x, y) = match self.kind {
                    PatternKind::Chessboard | PatternKind::SymmetricGrid => (
                        i as Real * self.square_size,
                        j as Real * self.square_size,
                    ),
                    PatternKind::AsymmetricGrid => (
                        (2 * i + j % 2) as Real * self.square_size,
                        j as Real * self.square_size,
                    ),
                };
                pts.push(Pt3::new(x, y, 0.0));
            }
        }
        pts
    }

    /// The same points projected to the pattern plane, for homography
    /// estimation.
    pub fn planar_points(&self) -> Vec<Pt2> {
        self.object_points()
            .iter()
            .map(|p| Pt2::new(p.x, p.y))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chessboard_object_points() {
        let geom = PatternGeometry {
            cols: 9,
            rows: 6,
            square_size: 25.0,
            kind: PatternKind::Chessboard,
        };
        let pts = geom.object_points();
        assert_eq!(pts.len(), 54);
        assert_eq!(pts[0], Pt3::new(0.0, 0.0, 0.0));
        assert_eq!(pts[1], Pt3::new(25.0, 0.0, 0.0));
        assert_eq!(pts[9], Pt3::new(0.0, 25.0, 0.0));
        assert!(pts.iter().all(|p| p.z == 0.0));
    }

    #[test]
    fn asymmetric_grid_staggers_odd_rows() {
        let geom = PatternGeometry {
            cols: 4,
            rows: 3,
            square_size: 10.0,
            kind: PatternKind::AsymmetricGrid,
        };
        let pts = geom.object_points();
        // row 0 at even multiples, row 1 offset by one period
        assert_eq!(pts[0], Pt3::new(0.0, 0.0, 0.0));
        assert_eq!(pts[1], Pt3::new(20.0, 0.0, 0.0));
        assert_eq!(pts[4], Pt3::new(10.0, 10.0, 0.0));
    }

    #[test]
    fn unknown_pattern_kind_rejected() {
        let err = serde_json::from_str::<PatternKind>("\"Hexagonal\"");
        assert!(err.is_err());
    }
}
