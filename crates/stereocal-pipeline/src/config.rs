//! Startup configuration.

use crate::error::CalibError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use stereocal_core::{CameraSide, PatternGeometry, SidePair};

/// Rig configuration, read once at startup.
///
/// Carries the two camera identifiers and the calibration pattern geometry.
/// The pattern kind is a closed enum; unknown values fail deserialization
/// and surface as [`CalibError::Configuration`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RigConfig {
    /// Device identifier of camera 0 (left).
    pub cam0: String,
    /// Device identifier of camera 1 (right).
    pub cam1: String,
    /// Calibration pattern geometry shared by both cameras.
    pub pattern: PatternGeometry,
}

impl RigConfig {
    /// Load the configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, CalibError> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            CalibError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&data)
            .map_err(|e| CalibError::Configuration(format!("{}: {e}", path.display())))
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Identifier of the camera on the given side.
    pub fn camera_id(&self, side: CameraSide) -> &str {
        match side {
            CameraSide::Left => &self.cam0,
            CameraSide::Right => &self.cam1,
        }
    }

    pub fn camera_ids(&self) -> SidePair<&str> {
        SidePair::new(&self.cam0, &self.cam1)
    }
}
