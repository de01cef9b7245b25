//! Draws the presented card once per eye into the window surface.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use tracing::{error, info};
use uuid::Uuid;
use wgpu::util::DeviceExt;

use crate::config::{CameraSettings, StereoMode};
use crate::error::PresentationError;
use crate::geometry::{PlaneGeometry, PlaneVertex};
use crate::gpu::texture::GpuTexture;
use crate::scene::{RenderEntity, SceneGraph};

// Fraction of the viewport left around the card when the camera backs off to fit it.
const FIT_MARGIN: f32 = 1.1;
const NEAR_PLANE: f32 = 0.01;
const FAR_PLANE: f32 = 100.0;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ViewUniform {
    view_proj: [[f32; 4]; 4],
}

/// One draw of the card: a viewport rectangle and the shader instance that
/// selects the eye (0 left, 1 right, 2 anaglyph).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyePass {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub instance: u32,
}

pub fn eye_passes(mode: StereoMode, width: u32, height: u32) -> Vec<EyePass> {
    let (w, h) = (width as f32, height as f32);
    let full = |instance| EyePass {
        x: 0.0,
        y: 0.0,
        width: w,
        height: h,
        instance,
    };
    match mode {
        StereoMode::SideBySide => {
            let half = (w * 0.5).floor();
            vec![
                EyePass {
                    x: 0.0,
                    y: 0.0,
                    width: half,
                    height: h,
                    instance: 0,
                },
                EyePass {
                    x: half,
                    y: 0.0,
                    width: w - half,
                    height: h,
                    instance: 1,
                },
            ]
        }
        StereoMode::Anaglyph => vec![full(2)],
        StereoMode::Left => vec![full(0)],
        StereoMode::Right => vec![full(1)],
    }
}

/// Eye distance that keeps the whole card in view, never closer than configured.
pub fn fit_distance(plane: &PlaneGeometry, aspect: f32, camera: &CameraSettings) -> f32 {
    let tan_half = (camera.fov_y_degrees.to_radians() * 0.5).tan();
    let aspect = aspect.max(1e-3);
    let for_height = plane.height * 0.5 / tan_half;
    let for_width = plane.width * 0.5 / (tan_half * aspect);
    (for_height.max(for_width) * FIT_MARGIN).max(camera.viewing_distance)
}

pub fn view_projection(plane: &PlaneGeometry, aspect: f32, camera: &CameraSettings) -> Mat4 {
    let distance = fit_distance(plane, aspect, camera);
    let proj = Mat4::perspective_rh(
        camera.fov_y_degrees.to_radians(),
        aspect.max(1e-3),
        NEAR_PLANE,
        FAR_PLANE.max(distance * 2.0),
    );
    let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, distance), Vec3::ZERO, Vec3::Y);
    proj * view
}

struct CardResources {
    pack_id: Uuid,
    geometry: PlaneGeometry,
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    // Keeps the eye textures alive for as long as the bind group samples them.
    _textures: Vec<GpuTexture>,
}

/// The scene the presenter adds cards to.
pub struct StereoRenderer {
    device: wgpu::Device,
    format: wgpu::TextureFormat,
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
    card: Option<CardResources>,
}

impl StereoRenderer {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("stereo-eye-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("stereo-view-uniform"),
            contents: bytemuck::bytes_of(&ViewUniform {
                view_proj: Mat4::IDENTITY.to_cols_array_2d(),
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        Self {
            device: device.clone(),
            format,
            sampler,
            uniform_buffer,
            card: None,
        }
    }

    fn build_card(&self, entity: RenderEntity<GpuTexture>) -> Result<CardResources, PresentationError> {
        let template = entity.material.template();
        let template_path = template.path().to_string();

        let mut layout_entries = vec![
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ];
        for (slot, _) in entity.material.textures() {
            layout_entries.push(wgpu::BindGroupLayoutEntry {
                binding: slot.binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("stereo-material-shader"),
            source: wgpu::ShaderSource::Wgsl(template.shader_source().into()),
        });
        let bind_group_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("stereo-material-bgl"),
                entries: &layout_entries,
            });

        let mut group_entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: self.uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            },
        ];
        for (slot, texture) in entity.material.textures() {
            group_entries.push(wgpu::BindGroupEntry {
                binding: slot.binding,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            });
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("stereo-material-bind-group"),
            layout: &bind_group_layout,
            entries: &group_entries,
        });

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("stereo-pipeline-layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("stereo-pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    buffers: &[PlaneVertex::layout()],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.format,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    unclipped_depth: false,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });

        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            error!(error = %err, template = %template_path, "stereo material rejected by the GPU");
            return Err(PresentationError::asset(template_path, err));
        }

        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("stereo-card-vertices"),
                contents: bytemuck::cast_slice(&entity.mesh.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("stereo-card-indices"),
                contents: bytemuck::cast_slice(&entity.mesh.indices),
                usage: wgpu::BufferUsages::INDEX,
            });
        let index_count = entity.mesh.indices.len() as u32;
        let pack_id = entity.pack_id;
        let geometry = entity.geometry;
        let _textures = entity.material.into_textures();

        Ok(CardResources {
            pack_id,
            geometry,
            pipeline,
            bind_group,
            vertex_buffer,
            index_buffer,
            index_count,
            _textures,
        })
    }

    /// Clear the target to `background` and draw the card for `mode`.
    #[allow(clippy::too_many_arguments)]
    pub fn render(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        target_view: &wgpu::TextureView,
        surface_size: (u32, u32),
        mode: StereoMode,
        camera: &CameraSettings,
        background: wgpu::Color,
    ) {
        let passes = eye_passes(mode, surface_size.0.max(1), surface_size.1.max(1));
        if let (Some(card), Some(first)) = (self.card.as_ref(), passes.first()) {
            let aspect = first.width / first.height.max(1.0);
            let view_proj = view_projection(&card.geometry, aspect, camera);
            queue.write_buffer(
                &self.uniform_buffer,
                0,
                bytemuck::bytes_of(&ViewUniform {
                    view_proj: view_proj.to_cols_array_2d(),
                }),
            );
        }

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("stereo-card"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target_view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(background),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });

        let Some(card) = self.card.as_ref() else {
            return;
        };
        pass.set_pipeline(&card.pipeline);
        pass.set_bind_group(0, &card.bind_group, &[]);
        pass.set_vertex_buffer(0, card.vertex_buffer.slice(..));
        pass.set_index_buffer(card.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
        for eye in passes {
            if eye.width < 1.0 || eye.height < 1.0 {
                continue;
            }
            pass.set_viewport(eye.x, eye.y, eye.width, eye.height, 0.0, 1.0);
            pass.draw_indexed(0..card.index_count, 0, eye.instance..eye.instance + 1);
        }
    }
}

impl SceneGraph for StereoRenderer {
    type Texture = GpuTexture;

    fn add_entity(&mut self, entity: RenderEntity<GpuTexture>) -> Result<(), PresentationError> {
        let card = self.build_card(entity)?;
        info!(
            pack = %card.pack_id,
            width_m = card.geometry.width,
            height_m = card.geometry.height,
            "stereo card attached"
        );
        self.card = Some(card);
        Ok(())
    }

    fn clear(&mut self) {
        if self.card.take().is_some() {
            info!("stereo card removed");
        }
    }
}
