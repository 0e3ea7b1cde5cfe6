//! Observation types and the pattern observation store.
//!
//! A [`PatternObservationPair`] is one synchronized capture of the pattern
//! seen by both cameras. The [`ObservationStore`] accumulates pairs
//! append-only until an explicit clear; solvers read it non-destructively.

use crate::{CameraSide, Pt2, Real, SidePair};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pixel dimensions of a camera image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Why an observation pair was not accepted.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ObservationError {
    /// Pattern detection failed in one or both views. The flags report which
    /// side succeeded, so callers can log the failing view.
    #[error("pattern not found (left found: {left_found}, right found: {right_found})")]
    PatternNotFound { left_found: bool, right_found: bool },
    /// A detected point set does not have the full pattern cardinality.
    #[error("{side} point set has {got} points, pattern expects {expected}")]
    WrongCardinality {
        side: CameraSide,
        expected: usize,
        got: usize,
    },
    /// Image dimensions differ from the ones locked in by the first accepted
    /// observation.
    #[error("{side} image size {got:?} differs from locked {locked:?}")]
    SizeMismatch {
        side: CameraSide,
        locked: ImageSize,
        got: ImageSize,
    },
}

/// Detected point sets for one capture event, one per camera.
///
/// Both members originate from the same instant and the same physical
/// pattern pose; the store only accepts a pair if detection succeeded
/// independently in both views.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PatternObservationPair {
    pub points: SidePair<Vec<Pt2>>,
}

impl PatternObservationPair {
    pub fn new(left: Vec<Pt2>, right: Vec<Pt2>) -> Self {
        Self {
            points: SidePair::new(left, right),
        }
    }
}

/// Append-only store of accepted observation pairs.
///
/// Exclusively owned by the calibration session; image sizes are locked in
/// when the first pair is accepted.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ObservationStore {
    pairs: Vec<PatternObservationPair>,
    sizes: Option<SidePair<ImageSize>>,
}

impl ObservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and append one capture event.
    ///
    /// `left` / `right` are the per-side detector outputs (`None` when the
    /// pattern was not found in that view). `expected_points` is the pattern
    /// cardinality every accepted point set must have.
    pub fn append(
        &mut self,
        left: Option<Vec<Pt2>>,
        right: Option<Vec<Pt2>>,
        sizes: SidePair<ImageSize>,
        expected_points: usize,
    ) -> Result<(), ObservationError> {
        let left_found = left.is_some();
        let right_found = right.is_some();
        let (Some(left), Some(right)) = (left, right) else {
            return Err(ObservationError::PatternNotFound {
                left_found,
                right_found,
            });
        };

        for (side, pts) in [(CameraSide::Left, &left), (CameraSide::Right, &right)] {
            if pts.len() != expected_points {
                return Err(ObservationError::WrongCardinality {
                    side,
                    expected: expected_points,
                    got: pts.len(),
                });
            }
        }

        if let Some(locked) = &self.sizes {
            for side in CameraSide::BOTH {
                if locked.get(side) != sizes.get(side) {
                    return Err(ObservationError::SizeMismatch {
                        side,
                        locked: *locked.get(side),
                        got: *sizes.get(side),
                    });
                }
            }
        } else {
            self.sizes = Some(sizes);
        }

        self.pairs.push(PatternObservationPair::new(left, right));
        Ok(())
    }

    /// Discard all stored pairs and unlock the image sizes.
    pub fn clear(&mut self) {
        self.pairs.clear();
        self.sizes = None;
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[PatternObservationPair] {
        &self.pairs
    }

    /// Image sizes locked by the first accepted pair.
    pub fn sizes(&self) -> Option<&SidePair<ImageSize>> {
        self.sizes.as_ref()
    }

    /// All point sets observed by one camera, in capture order.
    pub fn side_points(&self, side: CameraSide) -> Vec<&[Pt2]> {
        self.pairs
            .iter()
            .map(|p| p.points.get(side).as_slice())
            .collect()
    }
}

/// Summary statistics for reprojection errors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReprojectionStats {
    /// Mean reprojection error in pixels.
    pub mean: Real,
    /// Root mean square error in pixels.
    pub rms: Real,
    /// Maximum reprojection error in pixels.
    pub max: Real,
    /// Number of points evaluated.
    pub count: usize,
}

impl ReprojectionStats {
    pub fn from_errors(errors: &[Real]) -> Self {
        if errors.is_empty() {
            return Self {
                mean: 0.0,
                rms: 0.0,
                max: 0.0,
                count: 0,
            };
        }

        let sum: Real = errors.iter().sum();
        let sum_sq: Real = errors.iter().map(|e| e * e).sum();
        let max = errors.iter().cloned().fold(0.0_f64, Real::max);
        let n = errors.len() as Real;

        Self {
            mean: sum / n,
            rms: (sum_sq / n).sqrt(),
            max,
            count: errors.len(),
        }
    }
}
