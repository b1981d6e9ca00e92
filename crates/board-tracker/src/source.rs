//! Frame sources and scoped release.

use crate::config::SourceConfig;
use image::RgbImage;
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum FrameError {
    /// The source has no more frames.
    #[error("end of stream")]
    EndOfStream,
    #[error("source returned an empty frame")]
    Empty,
    #[error("no image files in {0}")]
    NoFrames(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Decode(#[from] image::ImageError),
}

/// Something that produces color frames on demand.
pub trait FrameSource {
    /// Next frame.
    fn read(&mut self) -> Result<RgbImage, FrameError>;

    /// Free the underlying device. Reads after release return
    /// [`FrameError::EndOfStream`].
    fn release(&mut self);
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read(&mut self) -> Result<RgbImage, FrameError> {
        (**self).read()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

/// Owns a source and releases it exactly once: on [`SourceGuard::release`]
/// or on drop, whichever comes first.
pub struct SourceGuard<S: FrameSource> {
    source: S,
    released: bool,
}

impl<S: FrameSource> SourceGuard<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            released: false,
        }
    }

    pub fn read(&mut self) -> Result<RgbImage, FrameError> {
        if self.released {
            return Err(FrameError::EndOfStream);
        }
        self.source.read()
    }

    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.source.release();
        }
    }

    #[inline]
    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl<S: FrameSource> Drop for SourceGuard<S> {
    fn drop(&mut self) {
        self.release();
    }
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "pgm", "ppm", "tif", "tiff"];

/// Replays the image files of a directory in file-name order.
#[derive(Debug)]
pub struct ImageSequenceSource {
    frames: Vec<PathBuf>,
    next: usize,
    looping: bool,
    released: bool,
}

impl ImageSequenceSource {
    pub fn open(dir: impl AsRef<Path>, looping: bool) -> Result<Self, FrameError> {
        let dir = dir.as_ref();
        let mut frames = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
            if is_image && path.is_file() {
                frames.push(path);
            }
        }
        if frames.is_empty() {
            return Err(FrameError::NoFrames(dir.to_path_buf()));
        }
        frames.sort();
        info!("image sequence {}: {} frames", dir.display(), frames.len());
        Ok(Self {
            frames,
            next: 0,
            looping,
            released: false,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn read(&mut self) -> Result<RgbImage, FrameError> {
        if self.released {
            return Err(FrameError::EndOfStream);
        }
        if self.next >= self.frames.len() {
            if !self.looping {
                return Err(FrameError::EndOfStream);
            }
            self.next = 0;
        }
        let path = &self.frames[self.next];
        self.next += 1;
        debug!("reading {}", path.display());
        let frame = image::open(path)?.to_rgb8();
        if frame.width() == 0 || frame.height() == 0 {
            return Err(FrameError::Empty);
        }
        Ok(frame)
    }

    fn release(&mut self) {
        self.released = true;
        self.frames.clear();
    }
}

/// Open the source a config describes.
pub fn open_source(cfg: &SourceConfig) -> Result<Box<dyn FrameSource>, FrameError> {
    match cfg {
        SourceConfig::ImageSequence { dir, looping } => {
            Ok(Box::new(ImageSequenceSource::open(dir, *looping)?))
        }
    }
}
