use anyhow::Result;
use image::DynamicImage;
use interview_core::uplink::FrameSource;
use interview_native_utils::video;
use std::path::PathBuf;

/// Reads the camera from a snapshot image that an external capture tool
/// keeps overwriting (for example `ffmpeg -f v4l2 ... -update 1 frame.jpg`).
pub struct SnapshotFrameSource {
    path: PathBuf,
}

impl SnapshotFrameSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl FrameSource for SnapshotFrameSource {
    fn capture(&mut self) -> Result<Option<DynamicImage>> {
        if !self.path.is_file() {
            return Ok(None);
        }
        video::load_image(&self.path).map(Some)
    }
}
