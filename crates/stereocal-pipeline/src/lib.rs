//! Stereo rig calibration pipeline.
//!
//! [`StereoSession`] is the state machine at the centre of the crate: it
//! owns the observation store and the three parameter records (intrinsics,
//! extrinsics, rectification) and gates which operations are legal in which
//! [`CalibrationState`]. The solvers themselves live in `stereocal-linear`;
//! this crate sequences them, derives the dense remap tables, persists and
//! reloads parameter sets, and converts disparities to depth.

pub mod config;
pub mod depth;
pub mod error;
pub mod extrinsics;
pub mod intrinsics;
pub mod persist;
pub mod rectification;
pub mod session;

pub use config::RigConfig;
pub use depth::DepthEstimator;
pub use error::CalibError;
pub use extrinsics::ExtrinsicParameters;
pub use intrinsics::IntrinsicParameters;
pub use rectification::{RectificationParameters, RemapTable};
pub use session::{
    BoundingBox, CalibrationState, CameraSlot, CaptureThrottle, ClearMode, DisplayMode,
    FeatureDetector, ImportReport, PatternDetector, SessionSummary, StereoSession,
};
