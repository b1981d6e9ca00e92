//! The fixed-rate board tracking loop.
//!
//! Each iteration reads one frame, detects and refines markers, solves the
//! board pose and publishes the last known pose. When no pose can be solved
//! the previous one is republished unchanged; before the first solve that is
//! the identity pose at the origin.

use crate::aruco::{GridBoard, MarkerDetector};
use crate::calibration::{load_calibration, CalibrationError};
use crate::config::{ConfigError, TrackerConfig};
use crate::core::CameraIntrinsics;
use crate::detect::{detect_board_markers, to_gray};
use crate::overlay::{draw_axes, draw_markers};
use crate::pose::{to_matrix, to_quaternion, BoardPoseEstimate, BoardPoseSolver, Pose, Stamp, TimestampedPose};
use crate::rate::RateLimiter;
use crate::sink::{FrameSink, PoseSink};
use crate::source::{FrameError, FrameSource, SourceGuard};
use image::RgbImage;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Which sinks the loop feeds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    /// Poses only.
    Headless,
    /// Poses and frames to the configured sinks.
    #[default]
    WithPublish,
    /// Poses and frames, plus the display window and its quit key.
    WithDisplay,
}

impl OutputMode {
    #[inline]
    pub fn publishes_frames(self) -> bool {
        !matches!(self, OutputMode::Headless)
    }

    #[inline]
    pub fn uses_display(self) -> bool {
        matches!(self, OutputMode::WithDisplay)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackerState {
    Idle,
    Capturing,
    Detecting,
    PoseAvailable,
    PoseStale,
    Shutdown,
}

/// Operator quit request, polled once per iteration.
pub trait QuitSignal {
    fn quit_requested(&mut self) -> bool;
}

/// A window that shows frames and reports a quit key.
pub trait DisplaySink: FrameSink + QuitSignal {}

impl<T: FrameSink + QuitSignal + ?Sized> DisplaySink for T {}

#[derive(thiserror::Error, Debug)]
pub enum TrackerError {
    #[error("frame source failed {failures} times in a row: {source}")]
    SourceFailed {
        failures: u32,
        #[source]
        source: FrameError,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
}

/// Loop settings that do not name a component.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackerSettings {
    pub frame_id: String,
    pub period: Duration,
    pub debug: bool,
    pub annotate: bool,
    pub axis_length: f64,
    /// Consecutive read failures tolerated before the loop gives up.
    pub max_consecutive_read_failures: u32,
    /// Stop cleanly after this many iterations.
    pub max_frames: Option<u64>,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            frame_id: "map".to_string(),
            period: Duration::from_secs_f64(1.0 / 30.0),
            debug: false,
            annotate: true,
            axis_length: 0.1,
            max_consecutive_read_failures: 30,
            max_frames: None,
        }
    }
}

impl From<&TrackerConfig> for TrackerSettings {
    fn from(cfg: &TrackerConfig) -> Self {
        Self {
            frame_id: cfg.frame_id.clone(),
            period: cfg.period(),
            debug: cfg.debug,
            annotate: cfg.annotate,
            axis_length: cfg.axis_length,
            max_consecutive_read_failures: cfg.max_consecutive_read_failures,
            max_frames: None,
        }
    }
}

/// Counters reported when the loop ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerSummary {
    pub iterations: u64,
    pub solved: u64,
    pub stale: u64,
    pub read_failures: u64,
    pub publish_errors: u64,
}

enum Step {
    Continue,
    Stop,
}

/// Everything the loop owns: components, sinks and the last known pose.
pub struct TrackerContext {
    board: GridBoard,
    camera: CameraIntrinsics,
    detector: MarkerDetector,
    solver: BoardPoseSolver,
    source: SourceGuard<Box<dyn FrameSource>>,
    pose_sink: Option<Box<dyn PoseSink>>,
    frame_sinks: Vec<Box<dyn FrameSink>>,
    display: Option<Box<dyn DisplaySink>>,
    shutdown: Arc<AtomicBool>,
    settings: TrackerSettings,
    state: TrackerState,
    last_pose: Pose,
    last_stamp: Stamp,
    read_failures: u32,
    summary: TrackerSummary,
}

impl TrackerContext {
    pub fn new(
        board: GridBoard,
        camera: CameraIntrinsics,
        detector: MarkerDetector,
        solver: BoardPoseSolver,
        source: Box<dyn FrameSource>,
        settings: TrackerSettings,
    ) -> Self {
        Self {
            board,
            camera,
            detector,
            solver,
            source: SourceGuard::new(source),
            pose_sink: None,
            frame_sinks: Vec::new(),
            display: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            settings,
            state: TrackerState::Idle,
            last_pose: Pose::identity(),
            last_stamp: Stamp::default(),
            read_failures: 0,
            summary: TrackerSummary::default(),
        }
    }

    /// Build board, detector and solver from a validated config and load its
    /// calibration file.
    pub fn from_config(
        cfg: &TrackerConfig,
        source: Box<dyn FrameSource>,
    ) -> Result<Self, TrackerError> {
        cfg.validate()?;
        let camera = load_calibration(&cfg.calibration_path)?;
        Ok(Self::new(
            cfg.build_board()?,
            camera,
            cfg.build_detector(),
            cfg.build_solver(),
            source,
            TrackerSettings::from(cfg),
        ))
    }

    pub fn with_pose_sink(mut self, sink: Box<dyn PoseSink>) -> Self {
        self.pose_sink = Some(sink);
        self
    }

    pub fn with_frame_sink(mut self, sink: Box<dyn FrameSink>) -> Self {
        self.frame_sinks.push(sink);
        self
    }

    pub fn with_display(mut self, display: Box<dyn DisplaySink>) -> Self {
        self.display = Some(display);
        self
    }

    pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
        self.settings.max_frames = max_frames;
        self
    }

    /// Share an externally owned shutdown flag, e.g. one set by a signal handler.
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = flag;
        self
    }

    /// Flag that stops the loop at the next iteration boundary.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    #[inline]
    pub fn state(&self) -> TrackerState {
        self.state
    }

    #[inline]
    pub fn last_pose(&self) -> Pose {
        self.last_pose
    }

    #[inline]
    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    #[inline]
    pub fn board(&self) -> &GridBoard {
        &self.board
    }

    #[inline]
    pub fn camera(&self) -> &CameraIntrinsics {
        &self.camera
    }

    /// Run until shutdown, quit key, end of stream or `max_frames`.
    ///
    /// The frame source is released before this returns, on every path.
    pub fn run(&mut self, mode: OutputMode) -> Result<TrackerSummary, TrackerError> {
        info!(
            "tracker starting: mode {:?}, {:.1} Hz, board {}x{} {}",
            mode,
            1.0 / self.settings.period.as_secs_f64().max(f64::EPSILON),
            self.board.spec().rows,
            self.board.spec().cols,
            self.board.dictionary().name
        );
        self.state = TrackerState::Idle;
        self.last_pose = Pose::identity();
        self.read_failures = 0;
        self.summary = TrackerSummary::default();

        let mut rate = RateLimiter::new(self.settings.period);
        let result = loop {
            if self.shutdown.load(Ordering::SeqCst) {
                info!("shutdown requested");
                break Ok(());
            }
            if self
                .settings
                .max_frames
                .is_some_and(|n| self.summary.iterations >= n)
            {
                break Ok(());
            }
            rate.start();
            match self.step(mode) {
                Ok(Step::Continue) => {}
                Ok(Step::Stop) => break Ok(()),
                Err(e) => break Err(e),
            }
            rate.wait();
        };

        self.shut_down();
        info!(
            "tracker stopped after {} iterations ({} solved, {} stale)",
            self.summary.iterations, self.summary.solved, self.summary.stale
        );
        result.map(|()| self.summary)
    }

    fn shut_down(&mut self) {
        self.source.release();
        self.state = TrackerState::Shutdown;
    }

    /// One iteration: capture, detect, solve, publish.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self), fields(iteration = self.summary.iterations))
    )]
    fn step(&mut self, mode: OutputMode) -> Result<Step, TrackerError> {
        self.state = TrackerState::Capturing;

        let frame = match self.source.read() {
            Ok(frame) => {
                self.summary.iterations += 1;
                self.read_failures = 0;
                Some(frame)
            }
            Err(FrameError::EndOfStream) => {
                info!("frame source reached end of stream");
                return Ok(Step::Stop);
            }
            Err(e) => {
                self.summary.iterations += 1;
                self.read_failures += 1;
                self.summary.read_failures += 1;
                if self.read_failures > self.settings.max_consecutive_read_failures {
                    return Err(TrackerError::SourceFailed {
                        failures: self.read_failures,
                        source: e,
                    });
                }
                warn!(
                    "frame read failed ({}/{}): {e}",
                    self.read_failures, self.settings.max_consecutive_read_failures
                );
                None
            }
        };

        let frame = match frame {
            Some(mut frame) => {
                self.state = TrackerState::Detecting;
                self.process(&mut frame, mode);
                Some(frame)
            }
            None => {
                self.state = TrackerState::PoseStale;
                None
            }
        };
        if self.state == TrackerState::PoseStale {
            self.summary.stale += 1;
        } else {
            self.summary.solved += 1;
        }

        self.publish(frame.as_ref(), mode);

        if mode.uses_display() {
            if let Some(display) = self.display.as_mut() {
                if display.quit_requested() {
                    info!("quit key pressed");
                    return Ok(Step::Stop);
                }
            }
        }
        Ok(Step::Continue)
    }

    /// Detect, solve and update the last pose; annotate when enabled.
    fn process(&mut self, frame: &mut RgbImage, mode: OutputMode) {
        let gray = to_gray(frame);
        let detected = detect_board_markers(&gray, &self.detector, &self.board);
        match self.solver.solve(&detected, &self.board, &self.camera) {
            Ok(estimate) => {
                self.last_pose = self.pose_from_estimate(&estimate);
                self.state = TrackerState::PoseAvailable;
                if self.settings.annotate && mode.publishes_frames() {
                    draw_markers(frame, &detected);
                    draw_axes(frame, &self.camera, &estimate, self.settings.axis_length);
                }
            }
            Err(e) => {
                debug!("no pose this frame: {e}");
                self.state = TrackerState::PoseStale;
            }
        }
    }

    fn pose_from_estimate(&self, estimate: &BoardPoseEstimate) -> Pose {
        let m = to_matrix(&estimate.rotation);
        let q = to_quaternion(&m);
        if self.settings.debug {
            let t = estimate.translation;
            info!("translation: [{:.6}, {:.6}, {:.6}]", t.x, t.y, t.z);
            info!(
                "rotation matrix:\n[{:.6}, {:.6}, {:.6}]\n[{:.6}, {:.6}, {:.6}]\n[{:.6}, {:.6}, {:.6}]",
                m[(0, 0)],
                m[(0, 1)],
                m[(0, 2)],
                m[(1, 0)],
                m[(1, 1)],
                m[(1, 2)],
                m[(2, 0)],
                m[(2, 1)],
                m[(2, 2)]
            );
            info!(
                "quaternion: [x {:.6}, y {:.6}, z {:.6}, w {:.6}], {} markers, rms {:.3} px",
                q.x, q.y, q.z, q.w, estimate.used_markers, estimate.rms_reprojection_px
            );
        }
        Pose::new(estimate.translation, q)
    }

    /// Publish the last pose always, the frame when there is one. Sink
    /// failures are logged and do not affect each other.
    fn publish(&mut self, frame: Option<&RgbImage>, mode: OutputMode) {
        // Published stamps never go backwards, even if the wall clock does.
        let stamp = Stamp::now().max(self.last_stamp);
        self.last_stamp = stamp;
        let stamped = TimestampedPose::new(self.last_pose, stamp, self.settings.frame_id.as_str());
        if let Some(sink) = self.pose_sink.as_mut() {
            if let Err(e) = sink.publish_pose(&stamped) {
                warn!("pose publish failed: {e}");
                self.summary.publish_errors += 1;
            }
        }

        let Some(frame) = frame else {
            return;
        };
        if mode.publishes_frames() {
            for sink in &mut self.frame_sinks {
                if let Err(e) = sink.publish_frame(stamp, frame) {
                    warn!("frame publish failed: {e}");
                    self.summary.publish_errors += 1;
                }
            }
        }
        if mode.uses_display() {
            if let Some(display) = self.display.as_mut() {
                if let Err(e) = display.publish_frame(stamp, frame) {
                    warn!("display update failed: {e}");
                    self.summary.publish_errors += 1;
                }
            }
        }
    }
}
