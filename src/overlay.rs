use std::path::Path;

use image::{DynamicImage, Rgba};
use imageproc::drawing::{draw_cross_mut, draw_line_segment_mut, draw_text_mut};
use rusttype::{Font, Scale};

use crate::error::{Error, Result};
use crate::hand_landmarks::{LandmarkSet, HAND_SKELETON};
use crate::recording::FrameRecorder;

/// Where the label text goes on the frame.
pub const TEXT_POSITION: (i32, i32) = (10, 50);

const TEXT_SCALE: f32 = 40.0;
const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);
const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
const SKELETON: Rgba<u8> = Rgba([255, 255, 255, 255]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextStyle {
    /// Accepted prediction, e.g. "A (0.93)".
    Confident,
    /// Hand found but the prediction was below the gate.
    LowConfidence,
}

impl TextStyle {
    fn color(&self) -> Rgba<u8> {
        match self {
            TextStyle::Confident => GREEN,
            TextStyle::LowConfidence => RED,
        }
    }
}

/// Annotations drawn on stream frames.
pub trait Overlay {
    fn draw_text(
        &mut self,
        frame: &mut DynamicImage,
        text: &str,
        position: (i32, i32),
        style: TextStyle,
    );

    fn draw_landmarks(&mut self, frame: &mut DynamicImage, landmarks: &LandmarkSet);

    /// Called once per frame after all drawing is done.
    fn present(&mut self, frame: &DynamicImage, frame_index: u64) -> Result<()>;
}

/// Draws into frames with imageproc and optionally records them to disk.
///
/// Text needs a TrueType font; without one only landmarks are drawn.
pub struct FrameAnnotator {
    font: Option<Font<'static>>,
    recorder: Option<FrameRecorder>,
}

impl FrameAnnotator {
    pub fn new(font: Option<Font<'static>>, recorder: Option<FrameRecorder>) -> Self {
        Self { font, recorder }
    }

    pub fn load(font_path: Option<&Path>, record_dir: Option<&Path>) -> Result<Self> {
        let font = match font_path {
            Some(path) => Some(load_font(path)?),
            None => None,
        };
        let recorder = match record_dir {
            Some(dir) => Some(FrameRecorder::create(dir)?),
            None => None,
        };
        Ok(Self::new(font, recorder))
    }
}

pub fn load_font(path: &Path) -> Result<Font<'static>> {
    let bytes = std::fs::read(path)?;
    Font::try_from_vec(bytes)
        .ok_or_else(|| Error::Config(format!("{} is not a usable TrueType font", path.display())))
}

impl Overlay for FrameAnnotator {
    fn draw_text(
        &mut self,
        frame: &mut DynamicImage,
        text: &str,
        position: (i32, i32),
        style: TextStyle,
    ) {
        if let Some(font) = &self.font {
            draw_text_mut(
                frame,
                style.color(),
                position.0,
                position.1,
                Scale::uniform(TEXT_SCALE),
                font,
                text,
            );
        }
    }

    fn draw_landmarks(&mut self, frame: &mut DynamicImage, landmarks: &LandmarkSet) {
        let points = landmarks.to_pixels(frame.width(), frame.height());

        for (a, b) in HAND_SKELETON {
            if let (Some(p), Some(q)) = (points.get(a), points.get(b)) {
                draw_line_segment_mut(frame, (p.x, p.y), (q.x, q.y), SKELETON);
            }
        }
        for p in points.iter() {
            draw_cross_mut(frame, GREEN, p.x as i32, p.y as i32);
        }
    }

    fn present(&mut self, frame: &DynamicImage, frame_index: u64) -> Result<()> {
        if let Some(recorder) = &self.recorder {
            recorder.save(frame, frame_index)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, RgbaImage};

    #[test]
    fn landmarks_are_drawn_at_their_pixel_position() {
        let mut frame = DynamicImage::ImageRgba8(RgbaImage::new(100, 100));
        let hand = LandmarkSet::from_xy(&[(0.5, 0.5); 21]);

        let mut overlay = FrameAnnotator::new(None, None);
        overlay.draw_landmarks(&mut frame, &hand);

        assert_eq!(frame.get_pixel(50, 50), GREEN);
        assert_eq!(frame.get_pixel(5, 5), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn text_without_font_leaves_frame_untouched() {
        let mut frame = DynamicImage::ImageRgba8(RgbaImage::new(64, 64));
        let before = frame.clone();

        let mut overlay = FrameAnnotator::new(None, None);
        overlay.draw_text(&mut frame, "A (0.93)", TEXT_POSITION, TextStyle::Confident);

        assert_eq!(frame.as_bytes(), before.as_bytes());
    }

    #[test]
    fn present_records_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let mut overlay = FrameAnnotator::load(None, Some(dir.path())).unwrap();
        let frame = DynamicImage::ImageRgba8(RgbaImage::new(8, 8));

        overlay.present(&frame, 3).unwrap();
        assert!(dir.path().join("frame_000003.png").exists());
    }

    #[test]
    fn missing_font_file_is_an_error() {
        assert!(FrameAnnotator::load(Some(Path::new("/nonexistent/font.ttf")), None).is_err());
    }
}
