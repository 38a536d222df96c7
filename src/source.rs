//! Raw image suppliers.
//!
//! Screen capture and PDF page decoding are provided by the host through
//! [`ImageSupplier`]; file and in-memory suppliers are built in.

use std::path::{Path, PathBuf};

use image::RgbImage;
use thiserror::Error;

/// File extensions [`FileSource`] can decode.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tiff", "tif", "webp"];

/// Errors from acquiring an image.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("IO error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    /// The supplier produced a zero-sized image
    #[error("Acquired image is empty ({width}x{height})")]
    Empty { width: u32, height: u32 },

    /// A finite sequence has no frames left
    #[error("No more frames")]
    Exhausted,

    /// Host-side acquisition failed (capture denied, window gone, ...)
    #[error("Capture unavailable: {0}")]
    Unavailable(String),
}

impl SourceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// Anything that can hand out an RGB frame.
pub trait ImageSupplier {
    /// Short description for logs.
    fn name(&self) -> String;

    fn acquire(&mut self) -> Result<RgbImage, SourceError>;
}

fn non_empty(image: RgbImage) -> Result<RgbImage, SourceError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(SourceError::Empty {
            width: image.width(),
            height: image.height(),
        });
    }
    Ok(image)
}

/// Whether `path` has an extension [`FileSource`] handles.
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Decode image bytes of any supported format to RGB.
pub fn decode_bytes(bytes: &[u8]) -> Result<RgbImage, SourceError> {
    let image = image::load_from_memory(bytes)?.to_rgb8();
    log::trace!("Decoded {}x{} image from memory", image.width(), image.height());
    non_empty(image)
}

/// Decodes an image file on every acquisition.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ImageSupplier for FileSource {
    fn name(&self) -> String {
        format!("file {:?}", self.path)
    }

    fn acquire(&mut self) -> Result<RgbImage, SourceError> {
        let bytes = std::fs::read(&self.path).map_err(|source| SourceError::Io {
            path: self.path.clone(),
            source,
        })?;
        let image = decode_bytes(&bytes)?;
        log::info!(
            "Loaded {}x{} image from {:?}",
            image.width(),
            image.height(),
            self.path
        );
        Ok(image)
    }
}

/// Hands out copies of a fixed buffer.
#[derive(Debug, Clone)]
pub struct MemorySource {
    image: RgbImage,
}

impl MemorySource {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }
}

impl ImageSupplier for MemorySource {
    fn name(&self) -> String {
        format!("memory {}x{}", self.image.width(), self.image.height())
    }

    fn acquire(&mut self) -> Result<RgbImage, SourceError> {
        non_empty(self.image.clone())
    }
}

/// Steps through a list of frames, optionally wrapping around.
#[derive(Debug, Clone)]
pub struct FrameSequence {
    frames: Vec<RgbImage>,
    next: usize,
    looping: bool,
}

impl FrameSequence {
    /// A sequence that wraps back to the first frame.
    pub fn looping(frames: Vec<RgbImage>) -> Self {
        Self {
            frames,
            next: 0,
            looping: true,
        }
    }

    /// A sequence that reports [`SourceError::Exhausted`] after the last frame.
    pub fn once(frames: Vec<RgbImage>) -> Self {
        Self {
            frames,
            next: 0,
            looping: false,
        }
    }

    /// Index of the frame the next acquisition returns.
    pub fn position(&self) -> usize {
        self.next
    }
}

impl ImageSupplier for FrameSequence {
    fn name(&self) -> String {
        format!("sequence of {} frames", self.frames.len())
    }

    fn acquire(&mut self) -> Result<RgbImage, SourceError> {
        if self.frames.is_empty() {
            return Err(SourceError::Exhausted);
        }
        if self.next >= self.frames.len() {
            if !self.looping {
                return Err(SourceError::Exhausted);
            }
            self.next = 0;
        }
        let frame = self.frames[self.next].clone();
        self.next += 1;
        non_empty(frame)
    }
}
