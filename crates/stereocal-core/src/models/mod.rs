//! Camera model building blocks.
//!
//! The model is the fixed pipeline used by the whole rig:
//!
//! 1. project a camera-frame point to the normalized image plane,
//! 2. apply Brown-Conrady distortion in normalized space,
//! 3. map to pixels through the K matrix.

mod camera;
mod distortion;
mod intrinsics;

pub use camera::*;
pub use distortion::*;
pub use intrinsics::*;
