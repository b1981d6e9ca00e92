//! Pose and frame sinks.
//!
//! The payload shapes are fixed; how they travel is up to the sink. The
//! workspace ships local sinks only.

use crate::pose::{Stamp, TimestampedPose};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error("sink closed")]
    Closed,
}

/// Receives one stamped pose per loop iteration.
pub trait PoseSink {
    fn publish_pose(&mut self, pose: &TimestampedPose) -> Result<(), PublishError>;
}

/// Receives the current (possibly annotated) frame.
pub trait FrameSink {
    fn publish_frame(&mut self, stamp: Stamp, frame: &RgbImage) -> Result<(), PublishError>;
}

impl<S: PoseSink + ?Sized> PoseSink for Box<S> {
    fn publish_pose(&mut self, pose: &TimestampedPose) -> Result<(), PublishError> {
        (**self).publish_pose(pose)
    }
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn publish_frame(&mut self, stamp: Stamp, frame: &RgbImage) -> Result<(), PublishError> {
        (**self).publish_frame(stamp, frame)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub stamp: Stamp,
    pub frame_id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointMsg {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuaternionMsg {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseMsg {
    pub position: PointMsg,
    pub orientation: QuaternionMsg,
}

/// Wire shape of a published pose.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseStamped {
    pub header: Header,
    pub pose: PoseMsg,
}

impl From<&TimestampedPose> for PoseStamped {
    fn from(tp: &TimestampedPose) -> Self {
        let p = &tp.pose.position;
        let q = &tp.pose.orientation;
        Self {
            header: Header {
                stamp: tp.stamp,
                frame_id: tp.frame_id.clone(),
            },
            pose: PoseMsg {
                position: PointMsg {
                    x: p.x,
                    y: p.y,
                    z: p.z,
                },
                orientation: QuaternionMsg {
                    x: q.x,
                    y: q.y,
                    z: q.z,
                    w: q.w,
                },
            },
        }
    }
}

/// Writes one [`PoseStamped`] JSON object per line.
pub struct JsonLinesPoseSink<W: Write> {
    writer: W,
}

impl JsonLinesPoseSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl JsonLinesPoseSink<BufWriter<File>> {
    /// Create (truncate) `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, PublishError> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> JsonLinesPoseSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> PoseSink for JsonLinesPoseSink<W> {
    fn publish_pose(&mut self, pose: &TimestampedPose) -> Result<(), PublishError> {
        serde_json::to_writer(&mut self.writer, &PoseStamped::from(pose))?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Saves frames as `frame_000000.png`, `frame_000001.png`, ...
#[derive(Debug)]
pub struct PngFrameSink {
    dir: PathBuf,
    next: u64,
}

impl PngFrameSink {
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self, PublishError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, next: 0 })
    }

    /// Number of frames written so far.
    #[inline]
    pub fn written(&self) -> u64 {
        self.next
    }
}

impl FrameSink for PngFrameSink {
    fn publish_frame(&mut self, _stamp: Stamp, frame: &RgbImage) -> Result<(), PublishError> {
        let path = self.dir.join(format!("frame_{:06}.png", self.next));
        frame.save(&path)?;
        self.next += 1;
        Ok(())
    }
}
