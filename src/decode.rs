use std::io::Cursor;

use image::{ImageError, RgbaImage, imageops};
use tracing::debug;

use crate::events::Bitmap;

/// Turns raw image bytes into an RGBA8 bitmap.
pub trait Decoder: Send + Sync + 'static {
    fn decode(&self, bytes: &[u8]) -> Result<Bitmap, ImageError>;
}

/// Decoder backed by the `image` crate. Applies EXIF orientation when present.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageDecoder;

impl Decoder for ImageDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Bitmap, ImageError> {
        let img = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(ImageError::IoError)?
            .decode()?;
        let img = apply_orientation(img.to_rgba8(), read_orientation(bytes).unwrap_or(1));
        let (width, height) = img.dimensions();
        Ok(Bitmap {
            width,
            height,
            pixels: img.into_raw(),
        })
    }
}

fn apply_orientation(img: RgbaImage, orientation: u16) -> RgbaImage {
    match orientation {
        2 => imageops::flip_horizontal(&img),
        3 => imageops::rotate180(&img),
        4 => imageops::flip_vertical(&img),
        // transpose
        5 => imageops::flip_horizontal(&imageops::rotate90(&img)),
        6 => imageops::rotate90(&img),
        // transverse
        7 => imageops::flip_horizontal(&imageops::rotate270(&img)),
        8 => imageops::rotate270(&img),
        _ => img,
    }
}

fn read_orientation(bytes: &[u8]) -> Option<u16> {
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(bytes))
        .ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let orientation = field.value.get_uint(0)? as u16;
    debug!(orientation, "exif orientation");
    Some(orientation)
}
