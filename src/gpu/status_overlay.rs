use std::path::PathBuf;

use fontdb::{Database, Family, Query};
use glyphon::cosmic_text::Align;
use glyphon::{
    Attrs, Buffer, Cache, Color, FamilyOwned, FontSystem, Metrics, Resolution, Shaping, SwashCache,
    TextArea, TextAtlas, TextBounds, TextRenderer, Viewport, Wrap,
};
use palette::Srgba;
use tracing::warn;
use winit::dpi::PhysicalSize;

const BASE_FONT_SIZE: f32 = 26.0;
const EDGE_PADDING_DIP: f32 = 24.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayAnchor {
    Center,
    Bottom,
}

/// Centred status text drawn over whatever the frame already holds.
pub struct StatusOverlay {
    device: wgpu::Device,
    queue: wgpu::Queue,
    viewport: Viewport,
    atlas: TextAtlas,
    text_renderer: TextRenderer,
    text_buffer: Buffer,
    font_system: FontSystem,
    swash_cache: SwashCache,
    font_family: FamilyOwned,
    message: String,
    colour: Color,
    anchor: OverlayAnchor,
    size: PhysicalSize<u32>,
    scale_factor: f64,
    text_top: f32,
    layout_dirty: bool,
}

impl StatusOverlay {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        format: wgpu::TextureFormat,
        font: Option<&str>,
    ) -> Self {
        let mut font_system = FontSystem::new();
        load_fonts(font_system.db_mut());
        let font_family = pick_family(font_system.db(), font);
        let mut text_buffer = Buffer::new(
            &mut font_system,
            Metrics::new(BASE_FONT_SIZE, BASE_FONT_SIZE * 1.3),
        );
        text_buffer.set_wrap(&mut font_system, Wrap::WordOrGlyph);

        let cache = Cache::new(device);
        let viewport = Viewport::new(device, &cache);
        let mut atlas = TextAtlas::new(device, queue, &cache, format);
        let text_renderer =
            TextRenderer::new(&mut atlas, device, wgpu::MultisampleState::default(), None);

        Self {
            device: device.clone(),
            queue: queue.clone(),
            viewport,
            atlas,
            text_renderer,
            text_buffer,
            font_system,
            swash_cache: SwashCache::new(),
            font_family,
            message: String::new(),
            colour: Color::rgb(255, 255, 255),
            anchor: OverlayAnchor::Center,
            size: PhysicalSize::new(0, 0),
            scale_factor: 1.0,
            text_top: 0.0,
            layout_dirty: true,
        }
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>, scale_factor: f64) {
        if self.size == new_size && (self.scale_factor - scale_factor).abs() < f64::EPSILON {
            return;
        }
        self.size = new_size;
        self.scale_factor = scale_factor;
        self.layout_dirty = true;
    }

    /// Returns `true` when the text, its colour or its placement changed.
    pub fn set_message(&mut self, message: &str, colour: [f32; 4], anchor: OverlayAnchor) -> bool {
        let colour = to_text_color(colour);
        if self.message == message && self.colour == colour && self.anchor == anchor {
            return false;
        }
        self.message = message.to_string();
        self.colour = colour;
        self.anchor = anchor;
        self.layout_dirty = true;
        true
    }

    fn update_layout(&mut self) -> bool {
        if self.size.width == 0 || self.size.height == 0 {
            return false;
        }
        let scale = self.scale_factor as f32;
        let font_size = BASE_FONT_SIZE * scale;
        let metrics = Metrics::new(font_size, font_size * 1.3);
        self.text_buffer.set_metrics_and_size(
            &mut self.font_system,
            metrics,
            Some(self.size.width as f32),
            Some(self.size.height as f32),
        );
        let attrs = Attrs::new().family(self.font_family.as_family());
        self.text_buffer.set_text(
            &mut self.font_system,
            &self.message,
            &attrs,
            Shaping::Advanced,
        );
        for line in &mut self.text_buffer.lines {
            line.set_align(Some(Align::Center));
        }
        self.text_buffer
            .shape_until_scroll(&mut self.font_system, false);

        let text_height: f32 = self
            .text_buffer
            .layout_runs()
            .map(|run| run.line_height)
            .sum::<f32>()
            .max(metrics.line_height);
        let container = self.size.height as f32;
        self.text_top = match self.anchor {
            OverlayAnchor::Center => ((container - text_height) * 0.5).max(0.0),
            OverlayAnchor::Bottom => (container - text_height - EDGE_PADDING_DIP * scale).max(0.0),
        };
        self.layout_dirty = false;
        true
    }

    /// Draw on top of `target_view` without clearing it.
    pub fn render(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        target_view: &wgpu::TextureView,
    ) -> bool {
        if self.message.is_empty() {
            return false;
        }
        if self.layout_dirty && !self.update_layout() {
            return false;
        }
        self.viewport.update(
            &self.queue,
            Resolution {
                width: self.size.width,
                height: self.size.height,
            },
        );

        if let Err(err) = self.text_renderer.prepare(
            &self.device,
            &self.queue,
            &mut self.font_system,
            &mut self.atlas,
            &self.viewport,
            [TextArea {
                buffer: &self.text_buffer,
                left: 0.0,
                top: self.text_top,
                scale: 1.0,
                bounds: TextBounds {
                    left: 0,
                    top: 0,
                    right: self.size.width as i32,
                    bottom: self.size.height as i32,
                },
                default_color: self.colour,
                custom_glyphs: &[],
            }],
            &mut self.swash_cache,
        ) {
            warn!(error = %err, "status_overlay_prepare_failed");
            return false;
        }

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("status-overlay"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            if let Err(err) = self
                .text_renderer
                .render(&self.atlas, &self.viewport, &mut pass)
            {
                warn!(error = %err, "status_overlay_draw_failed");
            }
        }

        self.atlas.trim();
        true
    }
}

const FALLBACK_FAMILY: &str = "DejaVu Sans";

/// System fonts plus anything shipped under `assets/fonts`.
fn load_fonts(db: &mut Database) {
    db.load_system_fonts();
    let bundled = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets/fonts");
    if bundled.is_dir() {
        db.load_fonts_dir(&bundled);
    }
}

/// First installed family among the configured one and the fallback.
fn pick_family(db: &Database, configured: Option<&str>) -> FamilyOwned {
    let configured = configured.map(str::trim).filter(|name| !name.is_empty());
    let installed = |name: &str| {
        db.query(&Query {
            families: &[Family::Name(name)],
            ..Default::default()
        })
        .is_some()
    };
    if let Some(name) = configured.filter(|name| !installed(*name)) {
        warn!(font = %name, fallback = FALLBACK_FAMILY, "status_overlay_font_missing");
    }
    configured
        .into_iter()
        .chain([FALLBACK_FAMILY])
        .find(|name| installed(*name))
        .map(|name| FamilyOwned::Name(name.into()))
        .unwrap_or(FamilyOwned::SansSerif)
}

fn to_text_color(rgba: [f32; 4]) -> Color {
    let colour: Srgba<u8> = Srgba::new(rgba[0], rgba[1], rgba[2], rgba[3]).into_format();
    Color::rgba(colour.red, colour.green, colour.blue, colour.alpha)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_colour_converts_to_bytes() {
        assert_eq!(to_text_color([1.0, 0.2, 0.0, 1.0]), Color::rgba(255, 51, 0, 255));
        assert_eq!(to_text_color([0.0, 0.0, 1.0, 0.0]), Color::rgba(0, 0, 255, 0));
    }

    #[test]
    fn missing_font_falls_back_to_sans_serif() {
        let db = Database::new();
        assert_eq!(pick_family(&db, Some("No Such Font")), FamilyOwned::SansSerif);
        assert_eq!(pick_family(&db, None), FamilyOwned::SansSerif);
    }
}
