//! JSON configuration for the tracking loop.

use crate::aruco::{DetectorParams, GridBoard, GridBoardError, GridBoardSpec, MarkerDetector};
use crate::pose::{BoardPoseSolver, SolverParams};
use crate::rate::{period_for_hz, MAX_RATE_HZ, MIN_RATE_HZ};
use crate::tracker::OutputMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Board(#[from] GridBoardError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

fn default_rate_hz() -> f64 {
    30.0
}

fn default_frame_id() -> String {
    "map".to_string()
}

fn default_true() -> bool {
    true
}

fn default_axis_length() -> f64 {
    0.1
}

fn default_max_read_failures() -> u32 {
    30
}

/// Where frames come from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Image files in a directory, replayed in file-name order.
    ImageSequence {
        dir: PathBuf,
        #[serde(default)]
        looping: bool,
    },
}

/// Sink destinations. A missing pose destination means stdout.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default)]
    pub pose_out: Option<PathBuf>,
    #[serde(default)]
    pub frame_out: Option<PathBuf>,
}

/// Tracker configuration file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub board: GridBoardSpec,
    pub calibration_path: PathBuf,
    #[serde(default = "default_rate_hz")]
    pub rate_hz: f64,
    #[serde(default)]
    pub mode: OutputMode,
    /// Reference frame label on published poses.
    #[serde(default = "default_frame_id")]
    pub frame_id: String,
    /// Dump translation, rotation matrix and quaternion every solved frame.
    #[serde(default)]
    pub debug: bool,
    /// Draw marker outlines and board axes on published frames.
    #[serde(default = "default_true")]
    pub annotate: bool,
    /// Overlay axis length, meters.
    #[serde(default = "default_axis_length")]
    pub axis_length: f64,
    #[serde(default = "default_max_read_failures")]
    pub max_consecutive_read_failures: u32,
    #[serde(default)]
    pub detector: Option<DetectorParams>,
    #[serde(default)]
    pub solver: Option<SolverParams>,
    #[serde(default)]
    pub source: Option<SourceConfig>,
    #[serde(default)]
    pub publish: PublishConfig,
}

impl TrackerConfig {
    /// Config with defaults for everything except the board and calibration.
    pub fn new(board: GridBoardSpec, calibration_path: impl Into<PathBuf>) -> Self {
        Self {
            board,
            calibration_path: calibration_path.into(),
            rate_hz: default_rate_hz(),
            mode: OutputMode::default(),
            frame_id: default_frame_id(),
            debug: false,
            annotate: true,
            axis_length: default_axis_length(),
            max_consecutive_read_failures: default_max_read_failures(),
            detector: None,
            solver: None,
            source: None,
            publish: PublishConfig::default(),
        }
    }

    /// Load a JSON config from disk. Relative paths inside the file are
    /// resolved against the file's directory.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let mut cfg: Self = serde_json::from_str(&raw)?;
        if let Some(base) = path.parent() {
            cfg.resolve_paths(base);
        }
        Ok(cfg)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.calibration_path);
        if let Some(SourceConfig::ImageSequence { dir, .. }) = &mut self.source {
            resolve(dir);
        }
        if let Some(p) = &mut self.publish.pose_out {
            resolve(p);
        }
        if let Some(p) = &mut self.publish.frame_out {
            resolve(p);
        }
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_RATE_HZ..=MAX_RATE_HZ).contains(&self.rate_hz) {
            return Err(ConfigError::Invalid(format!(
                "rate_hz must be within [{MIN_RATE_HZ}, {MAX_RATE_HZ}], got {}",
                self.rate_hz
            )));
        }
        if !self.axis_length.is_finite() || self.axis_length <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "axis_length must be > 0, got {}",
                self.axis_length
            )));
        }
        if self.frame_id.trim().is_empty() {
            return Err(ConfigError::Invalid("frame_id must not be empty".into()));
        }
        if self.solver.is_some_and(|s| s.min_markers == 0) {
            return Err(ConfigError::Invalid("solver.min_markers must be >= 1".into()));
        }
        GridBoard::new(self.board)?;
        Ok(())
    }

    /// Loop period derived from `rate_hz`.
    pub fn period(&self) -> Duration {
        period_for_hz(self.rate_hz)
    }

    pub fn build_board(&self) -> Result<GridBoard, ConfigError> {
        Ok(GridBoard::new(self.board)?)
    }

    pub fn build_detector(&self) -> MarkerDetector {
        MarkerDetector::new(self.board.dictionary, self.detector.unwrap_or_default())
    }

    pub fn build_solver(&self) -> BoardPoseSolver {
        BoardPoseSolver::new(self.solver.unwrap_or_default())
    }
}
