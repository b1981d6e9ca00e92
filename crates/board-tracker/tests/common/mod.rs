#![allow(dead_code)]

use board_tracker::aruco::builtins::DICT_4X4_50;
use board_tracker::aruco::test_utils::render_board;
use board_tracker::aruco::{GridBoard, GridBoardSpec};
use board_tracker::core::{CameraIntrinsics, Homography};
use board_tracker::pose::{Stamp, TimestampedPose};
use board_tracker::sink::{PoseSink, PublishError};
use board_tracker::source::{FrameError, FrameSource};
use image::{Rgb, RgbImage};
use nalgebra::{Matrix3, Vector3};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 480;

pub fn board_spec() -> GridBoardSpec {
    GridBoardSpec {
        rows: 2,
        cols: 3,
        marker_length: 0.04,
        marker_separation: 0.01,
        dictionary: DICT_4X4_50,
        first_marker: 0,
    }
}

pub fn board() -> GridBoard {
    GridBoard::new(board_spec()).expect("board")
}

pub fn camera() -> CameraIntrinsics {
    CameraIntrinsics::pinhole(600.0, 600.0, 320.0, 240.0).expect("camera")
}

/// Board facing the camera: board x stays right, board y maps to image up.
pub fn facing() -> Matrix3<f64> {
    Matrix3::from_diagonal(&Vector3::new(1.0, -1.0, -1.0))
}

/// Board centred in the image half a meter away.
pub fn centred_translation() -> Vector3<f64> {
    let (w, h) = board().size();
    Vector3::new(-w / 2.0, h / 2.0, 0.5)
}

/// Pinhole rendering of the board at pose `(r, t)`.
pub fn render_frame(r: &Matrix3<f64>, t: &Vector3<f64>) -> RgbImage {
    let cam = camera();
    let m = Matrix3::from_columns(&[r.column(0).into_owned(), r.column(1).into_owned(), *t]);
    let h = Homography::new(cam.matrix * m);
    let gray = render_board(&board(), &h, WIDTH as usize, HEIGHT as usize);
    RgbImage::from_fn(WIDTH, HEIGHT, |x, y| {
        let v = gray.data[y as usize * gray.width + x as usize];
        Rgb([v, v, v])
    })
}

pub fn blank_frame() -> RgbImage {
    RgbImage::from_pixel(WIDTH, HEIGHT, Rgb([255, 255, 255]))
}

/// What a scripted source returns next.
pub enum Scripted {
    Frame(RgbImage),
    Fail,
    /// Set the shared shutdown flag, then return a blank frame.
    RequestShutdown,
}

/// Replays a script, then reports end of stream. Counts releases.
pub struct ScriptedSource {
    script: std::vec::IntoIter<Scripted>,
    shutdown: Arc<AtomicBool>,
    pub releases: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Scripted>, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            script: script.into_iter(),
            shutdown,
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl FrameSource for ScriptedSource {
    fn read(&mut self) -> Result<RgbImage, FrameError> {
        match self.script.next() {
            Some(Scripted::Frame(f)) => Ok(f),
            Some(Scripted::Fail) => Err(FrameError::Empty),
            Some(Scripted::RequestShutdown) => {
                self.shutdown.store(true, Ordering::SeqCst);
                Ok(blank_frame())
            }
            None => Err(FrameError::EndOfStream),
        }
    }

    fn release(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Collects published poses; can be told to fail.
#[derive(Clone, Default)]
pub struct RecordingPoseSink {
    pub poses: Arc<Mutex<Vec<TimestampedPose>>>,
    pub fail: bool,
}

impl RecordingPoseSink {
    pub fn published(&self) -> Vec<TimestampedPose> {
        self.poses.lock().expect("lock").clone()
    }
}

impl PoseSink for RecordingPoseSink {
    fn publish_pose(&mut self, pose: &TimestampedPose) -> Result<(), PublishError> {
        self.poses.lock().expect("lock").push(pose.clone());
        if self.fail {
            return Err(PublishError::Closed);
        }
        Ok(())
    }
}

/// Counts frames; can be told to fail.
#[derive(Clone, Default)]
pub struct CountingFrameSink {
    pub frames: Arc<AtomicUsize>,
    pub fail: bool,
}

impl board_tracker::sink::FrameSink for CountingFrameSink {
    fn publish_frame(&mut self, _stamp: Stamp, _frame: &RgbImage) -> Result<(), PublishError> {
        self.frames.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PublishError::Closed);
        }
        Ok(())
    }
}
