//! Frames on disk: a directory of images replayed as a stream, and the
//! recorder that writes such a directory.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use tracing::{debug, warn};

use crate::error::Result;
use crate::pipeline::FrameSource;

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

/// Replays the images of a directory in file-name order.
///
/// A file that fails to decode ends the stream, like a camera read failure.
pub struct ImageSequence {
    paths: std::vec::IntoIter<PathBuf>,
}

impl ImageSequence {
    pub fn open(dir: &Path) -> Result<Self> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_image(path))
            .collect();
        paths.sort();

        debug!(dir = %dir.display(), frames = paths.len(), "opened image sequence");
        Ok(Self {
            paths: paths.into_iter(),
        })
    }

    pub fn remaining(&self) -> usize {
        self.paths.len()
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl FrameSource for ImageSequence {
    fn next_frame(&mut self) -> Option<DynamicImage> {
        let path = self.paths.next()?;
        match image::open(&path) {
            Ok(image) => Some(image),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable frame, ending stream");
                None
            }
        }
    }
}

/// Writes frames as `frame_000000.png`, `frame_000001.png`, ...
pub struct FrameRecorder {
    dir: PathBuf,
}

impl FrameRecorder {
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn frame_path(&self, frame_index: u64) -> PathBuf {
        self.dir.join(format!("frame_{frame_index:06}.png"))
    }

    pub fn save(&self, frame: &DynamicImage, frame_index: u64) -> Result<PathBuf> {
        let path = self.frame_path(frame_index);
        frame.save(&path)?;
        Ok(path)
    }
}
