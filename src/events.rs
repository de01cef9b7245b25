use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use uuid::Uuid;

use crate::error::PresentationError;
use crate::source::PickedImageRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
}

impl fmt::Display for Eye {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Eye::Left => f.write_str("left"),
            Eye::Right => f.write_str("right"),
        }
    }
}

/// Decoded RGBA8 image held on the CPU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Bitmap {
    /// Whether `pixels` actually covers `width * height` RGBA8 texels.
    pub fn has_pixel_buffer(&self) -> bool {
        let expected = self.width as usize * self.height as usize * 4;
        expected > 0 && self.pixels.len() >= expected
    }
}

/// A fully resolved stereo pair. Never observable with only one eye set.
#[derive(Debug)]
pub struct StereoImagePack {
    id: Uuid,
    left: Bitmap,
    right: Bitmap,
}

impl StereoImagePack {
    pub fn new(left: Bitmap, right: Bitmap) -> Self {
        Self {
            id: Uuid::new_v4(),
            left,
            right,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn left(&self) -> &Bitmap {
        &self.left
    }

    pub fn right(&self) -> &Bitmap {
        &self.right
    }

    pub fn eye(&self, eye: Eye) -> &Bitmap {
        match eye {
            Eye::Left => &self.left,
            Eye::Right => &self.right,
        }
    }
}

// Identity only; pixel contents never participate.
impl PartialEq for StereoImagePack {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for StereoImagePack {}

impl Hash for StereoImagePack {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Session -> Loader: resolve both picked images.
#[derive(Debug, Clone)]
pub struct LoadPair {
    pub request: u64,
    pub left: PickedImageRef,
    pub right: PickedImageRef,
}

/// Loader -> Session: outcome of one `LoadPair`.
#[derive(Debug)]
pub struct PairLoaded {
    pub request: u64,
    pub result: Result<Arc<StereoImagePack>, PresentationError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitmap(width: u32, height: u32, fill: u8) -> Bitmap {
        Bitmap {
            width,
            height,
            pixels: vec![fill; (width * height * 4) as usize],
        }
    }

    #[test]
    fn packs_compare_by_identity() {
        let a = StereoImagePack::new(bitmap(1, 1, 0), bitmap(1, 1, 0));
        let b = StereoImagePack::new(bitmap(1, 1, 0), bitmap(1, 1, 0));
        assert_ne!(a, b);
        assert_eq!(a, a);
    }

    #[test]
    fn short_pixel_buffers_are_detected() {
        assert!(bitmap(2, 2, 9).has_pixel_buffer());
        let truncated = Bitmap {
            width: 2,
            height: 2,
            pixels: vec![0; 15],
        };
        assert!(!truncated.has_pixel_buffer());
        let empty = Bitmap {
            width: 0,
            height: 0,
            pixels: Vec::new(),
        };
        assert!(!empty.has_pixel_buffer());
    }
}
