//! On-screen preview window (`display` feature).

use crate::pose::Stamp;
use crate::sink::{FrameSink, PublishError};
use crate::tracker::QuitSignal;
use image::RgbImage;
use minifb::{Key, Window, WindowOptions};

#[derive(thiserror::Error, Debug)]
#[error("failed to open window: {0}")]
pub struct DisplayError(String);

/// A `minifb` window showing the published frames. Pressing `q` (or closing
/// the window) requests a quit.
pub struct DisplayWindow {
    title: String,
    window: Option<Window>,
    buffer: Vec<u32>,
    size: (usize, usize),
    closed: bool,
}

impl DisplayWindow {
    /// The window opens lazily on the first frame, sized to that frame.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            window: None,
            buffer: Vec::new(),
            size: (0, 0),
            closed: false,
        }
    }

    fn ensure_window(&mut self, width: usize, height: usize) -> Result<&mut Window, DisplayError> {
        if self.size != (width, height) {
            self.window = None;
        }
        if self.window.is_none() {
            let window = Window::new(&self.title, width, height, WindowOptions::default())
                .map_err(|e| DisplayError(e.to_string()))?;
            self.window = Some(window);
            self.size = (width, height);
        }
        self.window
            .as_mut()
            .ok_or_else(|| DisplayError("window unavailable".into()))
    }
}

/// Pack an RGB pixel into the `0RGB` word minifb expects.
#[inline]
fn pack_rgb(p: &image::Rgb<u8>) -> u32 {
    let [r, g, b] = p.0;
    (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b)
}

impl FrameSink for DisplayWindow {
    fn publish_frame(&mut self, _stamp: Stamp, frame: &RgbImage) -> Result<(), PublishError> {
        if self.closed {
            return Err(PublishError::Closed);
        }
        let (w, h) = (frame.width() as usize, frame.height() as usize);
        self.buffer.clear();
        self.buffer.extend(frame.pixels().map(pack_rgb));
        let buffer = std::mem::take(&mut self.buffer);
        let result = self
            .ensure_window(w, h)
            .map_err(|e| PublishError::Io(std::io::Error::other(e)))
            .and_then(|window| {
                window
                    .update_with_buffer(&buffer, w, h)
                    .map_err(|e| PublishError::Io(std::io::Error::other(e.to_string())))
            });
        self.buffer = buffer;
        result
    }
}

impl QuitSignal for DisplayWindow {
    fn quit_requested(&mut self) -> bool {
        let Some(window) = self.window.as_ref() else {
            return false;
        };
        if !window.is_open() {
            self.closed = true;
            return true;
        }
        window.is_key_down(Key::Q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_rgb_words() {
        assert_eq!(pack_rgb(&image::Rgb([0x12, 0x34, 0x56])), 0x0012_3456);
    }
}
