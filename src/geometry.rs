use bytemuck::{Pod, Zeroable};
use lyon::math::{Box2D, point};
use lyon::path::Path;
use lyon::path::builder::BorderRadii;
use lyon::tessellation::{BuffersBuilder, FillOptions, FillTessellator, FillVertex, VertexBuffers};
use tracing::warn;

use crate::config::PresenterSettings;
use crate::events::Bitmap;

/// Physical size of the presented card, in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneGeometry {
    pub width: f32,
    pub height: f32,
    pub corner_radius: f32,
}

impl PlaneGeometry {
    /// `1920x1080` at 10000 px/m gives `0.192 x 0.108`.
    pub fn from_pixels(
        width_px: u32,
        height_px: u32,
        pixels_per_meter: f32,
        corner_radius: f32,
    ) -> Self {
        Self {
            width: width_px as f32 / pixels_per_meter,
            height: height_px as f32 / pixels_per_meter,
            corner_radius,
        }
    }

    pub fn for_bitmap(bitmap: &Bitmap, settings: &PresenterSettings) -> Self {
        Self::from_pixels(
            bitmap.width,
            bitmap.height,
            settings.pixels_per_meter,
            settings.corner_radius,
        )
    }

    /// Radius actually used for meshing; never exceeds half the shorter side.
    pub fn effective_corner_radius(&self) -> f32 {
        self.corner_radius
            .clamp(0.0, self.width.min(self.height).max(0.0) * 0.5)
    }

    /// Tessellate the rounded rectangle centred on the origin in the XY plane.
    pub fn mesh(&self) -> Option<PlaneMesh> {
        if !(self.width > 0.0 && self.height > 0.0) {
            return None;
        }
        let half_w = self.width * 0.5;
        let half_h = self.height * 0.5;

        let mut builder = Path::builder();
        builder.add_rounded_rectangle(
            &Box2D::new(point(-half_w, -half_h), point(half_w, half_h)),
            &BorderRadii::new(self.effective_corner_radius()),
            lyon::path::Winding::Positive,
        );
        let path = builder.build();

        let tolerance = (self.width.min(self.height) * 1e-3).max(1e-5);
        let mut buffers: VertexBuffers<PlaneVertex, u16> = VertexBuffers::new();
        let mut tessellator = FillTessellator::new();
        if let Err(err) = tessellator.tessellate_path(
            &path,
            &FillOptions::tolerance(tolerance),
            &mut BuffersBuilder::new(&mut buffers, |vertex: FillVertex| {
                let [x, y] = vertex.position().to_array();
                PlaneVertex {
                    position: [x, y],
                    uv: [(x + half_w) / self.width, 1.0 - (y + half_h) / self.height],
                }
            }),
        ) {
            warn!(error = %err, "plane_tessellation_failed");
            return None;
        }

        if buffers.vertices.is_empty() || buffers.indices.is_empty() {
            return None;
        }
        Some(PlaneMesh {
            vertices: buffers.vertices,
            indices: buffers.indices,
        })
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PlaneVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

impl PlaneVertex {
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
            wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<PlaneVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlaneMesh {
    pub vertices: Vec<PlaneVertex>,
    pub indices: Vec<u16>,
}
