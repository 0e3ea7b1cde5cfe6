//! Left/right camera addressing.
//!
//! The rig is fixed at exactly two cameras. `SidePair` replaces positional
//! two-element arrays so that "camera 0" / "camera 1" roles are explicit.

use serde::{Deserialize, Serialize};

/// The two cameras of the rig. `Left` is camera 0 and defines the reference
/// frame; `Right` is camera 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CameraSide {
    Left,
    Right,
}

impl CameraSide {
    pub const BOTH: [CameraSide; 2] = [CameraSide::Left, CameraSide::Right];

    /// Numeric index (0 for left, 1 for right).
    pub fn index(self) -> usize {
        match self {
            CameraSide::Left => 0,
            CameraSide::Right => 1,
        }
    }

    pub fn other(self) -> CameraSide {
        match self {
            CameraSide::Left => CameraSide::Right,
            CameraSide::Right => CameraSide::Left,
        }
    }
}

impl std::fmt::Display for CameraSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraSide::Left => write!(f, "left"),
            CameraSide::Right => write!(f, "right"),
        }
    }
}

/// A fixed pair of per-camera values addressed by [`CameraSide`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SidePair<T> {
    pub left: T,
    pub right: T,
}

impl<T> SidePair<T> {
    pub fn new(left: T, right: T) -> Self {
        Self { left, right }
    }

    pub fn get(&self, side: CameraSide) -> &T {
        match side {
            CameraSide::Left => &self.left,
            CameraSide::Right => &self.right,
        }
    }

    pub fn get_mut(&mut self, side: CameraSide) -> &mut T {
        match side {
            CameraSide::Left => &mut self.left,
            CameraSide::Right => &mut self.right,
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> SidePair<U> {
        SidePair {
            left: f(self.left),
            right: f(self.right),
        }
    }

    pub fn as_ref(&self) -> SidePair<&T> {
        SidePair {
            left: &self.left,
            right: &self.right,
        }
    }

    /// Build a pair by evaluating `f` for each side, propagating errors.
    pub fn try_build<E>(
        mut f: impl FnMut(CameraSide) -> Result<T, E>,
    ) -> Result<SidePair<T>, E> {
        Ok(SidePair {
            left: f(CameraSide::Left)?,
            right: f(CameraSide::Right)?,
        })
    }
}
