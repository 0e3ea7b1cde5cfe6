//! Calibration session: the state machine that sequences the pipeline.
//!
//! A [`StereoSession`] owns the observation store and the three parameter
//! records and only exposes operations that are legal in the current
//! [`CalibrationState`]. The state advances forward only
//! (`Empty -> IntrinsicsReady -> ExtrinsicsReady`); `clear` returns to
//! `Empty`, and a failed solve never moves or corrupts anything.

use crate::config::RigConfig;
use crate::depth::DepthEstimator;
use crate::error::CalibError;
use crate::extrinsics::{self, ExtrinsicParameters};
use crate::intrinsics::{self, IntrinsicParameters};
use crate::persist;
use crate::rectification::RectificationParameters;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use stereocal_core::{
    CameraSide, ImageSize, ObservationStore, PatternGeometry, Pt2, Real, SidePair,
};

/// Calibration progress. Monotonic under solves and loads; only `clear`
/// goes backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationState {
    Empty,
    IntrinsicsReady,
    ExtrinsicsReady,
}

/// What a clear discards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearMode {
    /// Drop the derived parameters, keep the stored observations.
    CalibrationOnly,
    /// Drop the derived parameters and the stored observations.
    Full,
}

/// How captured frames should be presented.
///
/// Derived from [`CalibrationState`]: each variant is only reachable once
/// the parameters it depends on exist, so combinations like depth without
/// rectification cannot be expressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayMode {
    #[default]
    Raw,
    /// Per-camera undistortion only (needs intrinsics).
    Undistorted,
    /// Full row-aligning rectification (needs extrinsics).
    Rectified,
    /// Rectification plus feature-depth readout.
    RectifiedDepth,
}

impl DisplayMode {
    /// Minimum state in which this mode is meaningful.
    fn required_state(self) -> CalibrationState {
        match self {
            DisplayMode::Raw => CalibrationState::Empty,
            DisplayMode::Undistorted => CalibrationState::IntrinsicsReady,
            DisplayMode::Rectified | DisplayMode::RectifiedDepth => {
                CalibrationState::ExtrinsicsReady
            }
        }
    }

    fn allowed_in(self, state: CalibrationState) -> bool {
        use CalibrationState::*;
        matches!(
            (self.required_state(), state),
            (Empty, _) | (IntrinsicsReady, IntrinsicsReady | ExtrinsicsReady) | (ExtrinsicsReady, ExtrinsicsReady)
        )
    }
}

/// One camera of the rig: identity label and locked image dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraSlot {
    pub side: CameraSide,
    pub id: String,
    /// Fixed once the first observation is accepted (or a calibration is
    /// loaded).
    pub image_size: Option<ImageSize>,
}

/// Axis-aligned box reported by the external feature detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: Real,
    pub y: Real,
    pub width: Real,
    pub height: Real,
}

impl BoundingBox {
    pub fn center(&self) -> Pt2 {
        Pt2::new(self.x + self.width * 0.5, self.y + self.height * 0.5)
    }
}

/// Boundary seam for the excluded calibration-pattern detector.
pub trait PatternDetector<I> {
    /// Detected pattern points in raster order, or `None` when the pattern
    /// was not found.
    fn detect(&self, image: &I, geometry: &PatternGeometry) -> Option<Vec<Pt2>>;
}

/// Boundary seam for the excluded face-like feature detector.
pub trait FeatureDetector<I> {
    /// Zero or one bounding box per image.
    fn detect(&self, image: &I) -> Option<BoundingBox>;
}

/// Outcome of a batch re-import of previously captured image pairs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub accepted: usize,
    pub rejected: usize,
}

/// Gate between pattern searches, advanced by a caller-supplied clock.
///
/// Mirrors the capture cadence of a live rig: after a successful detection
/// the next search only runs once `interval` seconds have passed.
#[derive(Debug, Clone, Copy)]
pub struct CaptureThrottle {
    interval: Real,
    last_found: Option<Real>,
}

impl CaptureThrottle {
    pub fn new(interval_secs: Real) -> Self {
        Self {
            interval: interval_secs,
            last_found: None,
        }
    }

    /// Whether a new search should run at time `now` (seconds).
    pub fn ready(&self, now: Real) -> bool {
        match self.last_found {
            None => true,
            Some(t) => now - t >= self.interval,
        }
    }

    /// Record a successful capture at time `now`.
    pub fn mark(&mut self, now: Real) {
        self.last_found = Some(now);
    }

    /// Seconds until the next search is allowed.
    pub fn remaining(&self, now: Real) -> Real {
        match self.last_found {
            None => 0.0,
            Some(t) => (self.interval - (now - t)).max(0.0),
        }
    }
}

/// Snapshot of the session for UIs and logs.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub state: CalibrationState,
    pub display: DisplayMode,
    pub observation_count: usize,
    pub cameras: SidePair<CameraSlot>,
}

/// The calibration state machine.
///
/// Single-threaded and step-driven: every operation runs to completion
/// before the next is accepted, and nothing outside the session can mutate
/// the store or the parameter records.
#[derive(Debug)]
pub struct StereoSession {
    config: RigConfig,
    store: ObservationStore,
    intrinsics: Option<SidePair<IntrinsicParameters>>,
    extrinsics: Option<ExtrinsicParameters>,
    rectification: Option<RectificationParameters>,
    display: DisplayMode,
}

impl StereoSession {
    pub fn new(config: RigConfig) -> Self {
        Self {
            config,
            store: ObservationStore::new(),
            intrinsics: None,
            extrinsics: None,
            rectification: None,
            display: DisplayMode::Raw,
        }
    }

    pub fn config(&self) -> &RigConfig {
        &self.config
    }

    /// Current state, derived from which parameter records exist.
    pub fn state(&self) -> CalibrationState {
        if self.extrinsics.is_some() {
            CalibrationState::ExtrinsicsReady
        } else if self.intrinsics.is_some() {
            CalibrationState::IntrinsicsReady
        } else {
            CalibrationState::Empty
        }
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.display
    }

    /// Request a display mode; fails if the current state cannot support it.
    pub fn set_display_mode(&mut self, mode: DisplayMode) -> Result<(), CalibError> {
        if !mode.allowed_in(self.state()) {
            return Err(CalibError::precondition(format!(
                "display mode {mode:?} needs {:?}, current state is {:?}",
                mode.required_state(),
                self.state()
            )));
        }
        self.display = mode;
        Ok(())
    }

    pub fn observation_count(&self) -> usize {
        self.store.len()
    }

    pub fn camera_slot(&self, side: CameraSide) -> CameraSlot {
        let from_store = self.store.sizes().map(|s| *s.get(side));
        let from_calib = self
            .intrinsics
            .as_ref()
            .map(|i| i.get(side).image_size);
        CameraSlot {
            side,
            id: self.config.camera_id(side).to_string(),
            image_size: from_store.or(from_calib),
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            state: self.state(),
            display: self.display,
            observation_count: self.store.len(),
            cameras: SidePair::new(
                self.camera_slot(CameraSide::Left),
                self.camera_slot(CameraSide::Right),
            ),
        }
    }

    // ── observations ────────────────────────────────────────────────────

    /// Append one capture event from per-side detector outputs.
    ///
    /// The pair is only accepted when detection succeeded in both views with
    /// the full pattern cardinality; the error reports which side failed.
    pub fn append_observation(
        &mut self,
        left: Option<Vec<Pt2>>,
        right: Option<Vec<Pt2>>,
        sizes: SidePair<ImageSize>,
    ) -> Result<(), CalibError> {
        self.store
            .append(left, right, sizes, self.config.pattern.point_count())?;
        Ok(())
    }

    /// Run the external detector on a synchronized image pair and append the
    /// result. This is the live-capture path.
    pub fn observe_pair<I>(
        &mut self,
        detector: &dyn PatternDetector<I>,
        images: SidePair<&I>,
        sizes: SidePair<ImageSize>,
    ) -> Result<(), CalibError> {
        let left = detector.detect(images.left, &self.config.pattern);
        let right = detector.detect(images.right, &self.config.pattern);
        self.append_observation(left, right, sizes)
    }

    /// Re-import previously captured pattern image pairs.
    ///
    /// Replaces the stored observations and discards any existing
    /// calibration, then runs the detector over every pair. Pairs where
    /// either view fails detection are counted, logged, and skipped.
    pub fn import_pairs<I>(
        &mut self,
        detector: &dyn PatternDetector<I>,
        pairs: &[SidePair<I>],
        sizes: SidePair<ImageSize>,
    ) -> ImportReport {
        self.clear(ClearMode::Full);

        let mut report = ImportReport::default();
        for (idx, pair) in pairs.iter().enumerate() {
            let left = detector.detect(&pair.left, &self.config.pattern);
            let right = detector.detect(&pair.right, &self.config.pattern);
            match self.append_observation(left, right, sizes) {
                Ok(()) => report.accepted += 1,
                Err(e) => {
                    warn!("import: pair {idx} rejected: {e}");
                    report.rejected += 1;
                }
            }
        }
        info!(
            "import: {} accepted, {} rejected",
            report.accepted, report.rejected
        );
        report
    }

    // ── state transitions ───────────────────────────────────────────────

    /// Discard derived parameters; with [`ClearMode::Full`], also the
    /// stored observations. Returns the session to `Empty`.
    pub fn clear(&mut self, mode: ClearMode) {
        self.intrinsics = None;
        self.extrinsics = None;
        self.rectification = None;
        self.display = DisplayMode::Raw;
        if mode == ClearMode::Full {
            self.store.clear();
        }
    }

    /// Solve both cameras' intrinsics from all stored observations.
    ///
    /// Always re-solves from scratch; on success any previous intrinsic,
    /// extrinsic and rectification results are replaced or dropped. On
    /// failure the session is left exactly as it was.
    pub fn solve_intrinsics(&mut self) -> Result<(), CalibError> {
        if self.store.is_empty() {
            return Err(CalibError::precondition(
                "no observations stored; capture or import pattern pairs first",
            ));
        }
        let sizes = self.store.sizes().copied().ok_or_else(|| {
            CalibError::precondition("stored observations carry no image sizes")
        })?;

        let solved = SidePair::try_build(|side| {
            intrinsics::solve_intrinsics(
                &self.store.side_points(side),
                &self.config.pattern,
                *sizes.get(side),
            )
            .map_err(|e| {
                warn!("{side} intrinsic solve failed: {e}");
                e
            })
        })?;

        info!(
            "intrinsics ready: left rms {:.4}px, right rms {:.4}px over {} pairs",
            solved.left.mean_rms(),
            solved.right.mean_rms(),
            self.store.len()
        );

        self.intrinsics = Some(solved);
        // downstream parameters are stale now; they are rebuilt by the next
        // extrinsic solve
        self.extrinsics = None;
        self.rectification = None;
        if !self.display.allowed_in(self.state()) {
            self.display = DisplayMode::Raw;
        }
        Ok(())
    }

    /// Solve the rig extrinsics and rebuild rectification.
    ///
    /// Requires valid intrinsics and equal, non-zero observation counts for
    /// both cameras. On failure the state (including any previous
    /// extrinsics) is untouched.
    pub fn solve_extrinsics(&mut self) -> Result<(), CalibError> {
        let Some(intr) = &self.intrinsics else {
            return Err(CalibError::precondition(
                "cameras have not been intrinsically calibrated yet",
            ));
        };

        let ext = extrinsics::solve_extrinsics(intr.as_ref(), &self.config.pattern)?;
        let rect = RectificationParameters::build(intr.as_ref(), &ext)?;

        info!("extrinsics ready: baseline {:.3}", ext.baseline());

        self.extrinsics = Some(ext);
        self.rectification = Some(rect);
        Ok(())
    }

    /// Full calibration run: intrinsics, then extrinsics.
    ///
    /// If a sub-step fails the state reflects the last successful sub-step.
    pub fn calibrate(&mut self) -> Result<(), CalibError> {
        self.solve_intrinsics()?;
        self.solve_extrinsics()
    }

    // ── persistence ─────────────────────────────────────────────────────

    /// Save the full parameter set into an existing directory.
    pub fn save(&self, dir: &Path) -> Result<(), CalibError> {
        let (Some(intr), Some(ext), Some(rect)) = (
            &self.intrinsics,
            &self.extrinsics,
            &self.rectification,
        ) else {
            return Err(CalibError::precondition(
                "nothing to save: run the full calibration first",
            ));
        };
        persist::save(dir, intr.as_ref(), ext, rect)
    }

    /// Load a previously saved parameter set, bypassing the solvers.
    ///
    /// Atomic: on any error the current state is preserved. On success the
    /// session is in `ExtrinsicsReady` regardless of its previous state.
    pub fn load(&mut self, dir: &Path) -> Result<(), CalibError> {
        let loaded = persist::load(dir)?;
        self.intrinsics = Some(loaded.intrinsics);
        self.extrinsics = Some(loaded.extrinsics);
        self.rectification = Some(loaded.rectification);
        Ok(())
    }

    // ── derived results ─────────────────────────────────────────────────

    pub fn intrinsic_parameters(&self) -> Option<SidePair<&IntrinsicParameters>> {
        self.intrinsics.as_ref().map(|i| i.as_ref())
    }

    pub fn extrinsic_parameters(&self) -> Option<&ExtrinsicParameters> {
        self.extrinsics.as_ref()
    }

    pub fn rectification_parameters(&self) -> Option<&RectificationParameters> {
        self.rectification.as_ref()
    }

    /// Depth estimator over the current rectification.
    pub fn depth_estimator(&self) -> Result<DepthEstimator<'_>, CalibError> {
        self.rectification
            .as_ref()
            .map(DepthEstimator::new)
            .ok_or_else(|| {
                CalibError::precondition("depth needs a rectified rig (state ExtrinsicsReady)")
            })
    }

    /// Depth of a feature located by the external detector in both rectified
    /// views.
    ///
    /// Returns `Ok(None)` unless exactly one feature is found in each view;
    /// both boxes are assumed to bound the same physical feature.
    pub fn feature_depth<I>(
        &self,
        detector: &dyn FeatureDetector<I>,
        views: SidePair<&I>,
    ) -> Result<Option<Real>, CalibError> {
        let estimator = self.depth_estimator()?;
        let (Some(b0), Some(b1)) = (
            detector.detect(views.left),
            detector.detect(views.right),
        ) else {
            return Ok(None);
        };
        estimator.depth(&b0.center(), &b1.center()).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stereocal_core::PatternKind;

    fn config() -> RigConfig {
        RigConfig {
            cam0: "cam-L".to_string(),
            cam1: "cam-R".to_string(),
            pattern: PatternGeometry {
                cols: 4,
                rows: 3,
                square_size: 10.0,
                kind: PatternKind::Chessboard,
            },
        }
    }

    #[test]
    fn new_session_is_empty_and_raw() {
        let session = StereoSession::new(config());
        assert_eq!(session.state(), CalibrationState::Empty);
        assert_eq!(session.display_mode(), DisplayMode::Raw);
        assert_eq!(session.observation_count(), 0);
        assert_eq!(session.camera_slot(CameraSide::Left).id, "cam-L");
        assert!(session.camera_slot(CameraSide::Left).image_size.is_none());
    }

    #[test]
    fn display_modes_gated_by_state() {
        let mut session = StereoSession::new(config());
        assert!(session.set_display_mode(DisplayMode::Raw).is_ok());
        for mode in [
            DisplayMode::Undistorted,
            DisplayMode::Rectified,
            DisplayMode::RectifiedDepth,
        ] {
            let err = session.set_display_mode(mode).unwrap_err();
            assert!(matches!(err, CalibError::PreconditionUnmet(_)));
            assert_eq!(session.display_mode(), DisplayMode::Raw);
        }
    }

    #[test]
    fn depth_estimator_needs_extrinsics() {
        let session = StereoSession::new(config());
        assert!(matches!(
            session.depth_estimator(),
            Err(CalibError::PreconditionUnmet(_))
        ));
    }

    #[test]
    fn solve_without_observations_is_rejected() {
        let mut session = StereoSession::new(config());
        assert!(matches!(
            session.solve_intrinsics(),
            Err(CalibError::PreconditionUnmet(_))
        ));
        assert!(matches!(
            session.solve_extrinsics(),
            Err(CalibError::PreconditionUnmet(_))
        ));
        assert_eq!(session.state(), CalibrationState::Empty);
    }

    #[test]
    fn bounding_box_center() {
        let b = BoundingBox {
            x: 10.0,
            y: 20.0,
            width: 40.0,
            height: 60.0,
        };
        assert_eq!(b.center(), Pt2::new(30.0, 50.0));
    }

    #[test]
    fn throttle_waits_between_captures() {
        let mut throttle = CaptureThrottle::new(2.0);
        assert!(throttle.ready(0.0));
        throttle.mark(0.0);
        assert!(!throttle.ready(1.5));
        assert!((throttle.remaining(1.5) - 0.5).abs() < 1e-12);
        assert!(throttle.ready(2.0));
        assert_eq!(throttle.remaining(2.5), 0.0);
    }
}
