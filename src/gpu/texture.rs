use tracing::debug;

use crate::error::PresentationError;
use crate::events::{Bitmap, Eye};
use crate::scene::TextureFactory;

pub const EYE_TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// One eye image uploaded to the GPU.
#[derive(Debug)]
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

/// Uploads bitmaps as sampleable sRGB textures.
pub struct GpuTextureFactory<'a> {
    device: &'a wgpu::Device,
    queue: &'a wgpu::Queue,
}

impl<'a> GpuTextureFactory<'a> {
    pub fn new(device: &'a wgpu::Device, queue: &'a wgpu::Queue) -> Self {
        Self { device, queue }
    }
}

/// Reject bitmaps the device could never sample.
pub fn check_uploadable(eye: Eye, bitmap: &Bitmap, max_dimension: u32) -> Result<(), PresentationError> {
    if !bitmap.has_pixel_buffer() {
        return Err(PresentationError::TextureCreation {
            eye,
            reason: format!(
                "{}x{} bitmap has no backing pixel buffer ({} bytes)",
                bitmap.width,
                bitmap.height,
                bitmap.pixels.len()
            ),
        });
    }
    if bitmap.width > max_dimension || bitmap.height > max_dimension {
        return Err(PresentationError::TextureCreation {
            eye,
            reason: format!(
                "{}x{} exceeds the device limit of {max_dimension} pixels per side",
                bitmap.width, bitmap.height
            ),
        });
    }
    Ok(())
}

impl TextureFactory for GpuTextureFactory<'_> {
    type Texture = GpuTexture;

    fn create_texture(&self, eye: Eye, bitmap: &Bitmap) -> Result<GpuTexture, PresentationError> {
        check_uploadable(eye, bitmap, self.device.limits().max_texture_dimension_2d)?;

        let size = wgpu::Extent3d {
            width: bitmap.width,
            height: bitmap.height,
            depth_or_array_layers: 1,
        };
        let label = format!("{eye}-eye-texture");
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: EYE_TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let byte_len = bitmap.width as usize * bitmap.height as usize * 4;
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &bitmap.pixels[..byte_len],
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * bitmap.width),
                rows_per_image: Some(bitmap.height),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        debug!(%eye, width = bitmap.width, height = bitmap.height, "eye texture uploaded");

        Ok(GpuTexture {
            texture,
            view,
        })
    }
}
