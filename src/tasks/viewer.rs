use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wgpu::SurfaceError;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    keyboard::{Key, ModifiersState, NamedKey},
    window::{Window, WindowAttributes},
};

use crate::{
    config::{Configuration, StereoMode, parse_hex_color},
    error::PresentationError,
    events::{Eye, LoadPair, PairLoaded},
    gpu::{
        status_overlay::{OverlayAnchor, StatusOverlay},
        stereo_renderer::StereoRenderer,
        texture::GpuTextureFactory,
        to_wgpu_color,
    },
    material::AssetBundle,
    source::{PickedImageRef, pick_image},
    tasks::{
        presenter::{Presentation, StereoPresenter},
        session::{Stage, StereoSession, Tone},
    },
};

#[derive(Debug)]
pub enum ViewerEvent {
    Cancelled,
    Picked(Eye, Option<PickedImageRef>),
    PairLoaded(PairLoaded),
}

/// The session's key bindings, independent of winit's key types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerAction {
    Pick(Eye),
    Clear(Eye),
    Confirm,
    Back,
    CycleMode,
}

pub fn action_for_key(key: &Key, modifiers: ModifiersState) -> Option<ViewerAction> {
    match key.as_ref() {
        Key::Named(NamedKey::Enter) => Some(ViewerAction::Confirm),
        Key::Named(NamedKey::Escape) => Some(ViewerAction::Back),
        Key::Character(text) => {
            let eye_action = |eye| {
                if modifiers.shift_key() {
                    ViewerAction::Clear(eye)
                } else {
                    ViewerAction::Pick(eye)
                }
            };
            match text.to_ascii_lowercase().as_str() {
                "l" => Some(eye_action(Eye::Left)),
                "r" => Some(eye_action(Eye::Right)),
                "m" => Some(ViewerAction::CycleMode),
                _ => None,
            }
        }
        _ => None,
    }
}

struct Palette {
    background: wgpu::Color,
    font: [f32; 4],
    error: [f32; 4],
}

impl Palette {
    fn from_config(cfg: &Configuration) -> Result<Self> {
        let background = parse_hex_color(&cfg.colors.background)?;
        Ok(Self {
            background: to_wgpu_color(background),
            font: parse_hex_color(&cfg.colors.font)?,
            error: parse_hex_color(&cfg.colors.error)?,
        })
    }
}

struct GpuState {
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    device: wgpu::Device,
    queue: wgpu::Queue,
    renderer: StereoRenderer,
    overlay: StatusOverlay,
}

struct ViewerApp {
    cfg: Configuration,
    palette: Palette,
    assets: AssetBundle,
    mode: StereoMode,
    session: StereoSession,
    presenter: StereoPresenter,
    cancel: CancellationToken,
    runtime: Handle,
    proxy: EventLoopProxy<ViewerEvent>,
    load_tx: mpsc::Sender<LoadPair>,
    window: Option<Arc<Window>>,
    gpu: Option<GpuState>,
    modifiers: ModifiersState,
    dialog_open: bool,
    pending_redraw: bool,
}

impl ViewerApp {
    fn new(
        cfg: Configuration,
        session: StereoSession,
        cancel: CancellationToken,
        proxy: EventLoopProxy<ViewerEvent>,
        load_tx: mpsc::Sender<LoadPair>,
    ) -> Result<Self> {
        let palette = Palette::from_config(&cfg).context("invalid viewer colours")?;
        Ok(Self {
            assets: AssetBundle::from_config(cfg.asset_bundle_path.as_deref()),
            mode: cfg.stereo_mode,
            palette,
            cfg,
            session,
            presenter: StereoPresenter::new(),
            cancel,
            runtime: Handle::current(),
            proxy,
            load_tx,
            window: None,
            gpu: None,
            modifiers: ModifiersState::empty(),
            dialog_open: false,
            pending_redraw: false,
        })
    }

    fn ensure_window(&mut self, event_loop: &ActiveEventLoop) -> Option<Arc<Window>> {
        if let Some(window) = self.window.as_ref() {
            return Some(window.clone());
        }

        let attrs = WindowAttributes::default().with_title("Stereo Viewer");
        match event_loop.create_window(attrs) {
            Ok(window) => {
                let window = Arc::new(window);
                self.window = Some(window.clone());
                Some(window)
            }
            Err(err) => {
                error!(error = %err, "failed to create viewer window");
                None
            }
        }
    }

    fn init_gpu(&mut self, window: Arc<Window>) -> Result<()> {
        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(window.clone())
            .context("failed to create surface")?;
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("failed to acquire GPU adapter")?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|fmt| fmt.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .context("surface reports no texture formats")?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("viewer-device"),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::default(),
        }))
        .context("failed to acquire GPU device")?;

        let size = window.inner_size();
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);
        info!(
            width = surface_config.width,
            height = surface_config.height,
            format = ?surface_config.format,
            max_texture = device.limits().max_texture_dimension_2d,
            "viewer surface configured",
        );

        let renderer = StereoRenderer::new(&device, format);
        let mut overlay = StatusOverlay::new(&device, &queue, format, self.cfg.font.as_deref());
        overlay.resize(size, window.scale_factor());

        self.gpu = Some(GpuState {
            surface,
            surface_config,
            device,
            queue,
            renderer,
            overlay,
        });
        self.sync_presenter();
        Ok(())
    }

    fn handle_resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        let (Some(gpu), Some(window)) = (self.gpu.as_mut(), self.window.as_ref()) else {
            return;
        };
        gpu.surface_config.width = new_size.width.max(1);
        gpu.surface_config.height = new_size.height.max(1);
        gpu.surface.configure(&gpu.device, &gpu.surface_config);
        gpu.overlay.resize(new_size, window.scale_factor());
        debug!(
            width = gpu.surface_config.width,
            height = gpu.surface_config.height,
            "viewer surface resized",
        );
        self.request_redraw();
    }

    fn draw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(window) = self.window.clone() else {
            return;
        };
        let status = self.session.status(self.mode);
        let Some(gpu) = self.gpu.as_mut() else {
            return;
        };

        let frame = match gpu.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(SurfaceError::Outdated) | Err(SurfaceError::Lost) => {
                info!("viewer surface lost; reconfiguring");
                self.handle_resize(window.inner_size());
                return;
            }
            Err(SurfaceError::OutOfMemory) => {
                error!("viewer surface out of memory; exiting event loop");
                event_loop.exit();
                return;
            }
            Err(SurfaceError::Timeout) => {
                warn!("viewer surface acquisition timed out");
                return;
            }
            Err(SurfaceError::Other) => {
                warn!("viewer surface reported an unknown error; retrying");
                self.handle_resize(window.inner_size());
                return;
            }
        };

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("viewer-encoder"),
            });

        self.pending_redraw = false;

        gpu.renderer.render(
            &gpu.queue,
            &mut encoder,
            &view,
            (gpu.surface_config.width, gpu.surface_config.height),
            self.mode,
            &self.cfg.camera,
            self.palette.background,
        );

        let (colour, anchor) = match status.tone {
            Tone::Info => (self.palette.font, OverlayAnchor::Center),
            Tone::Error => (self.palette.error, OverlayAnchor::Center),
            Tone::Caption => (self.palette.font, OverlayAnchor::Bottom),
        };
        gpu.overlay.set_message(&status.text, colour, anchor);
        gpu.overlay.render(&mut encoder, &view);

        gpu.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
    }

    fn request_redraw(&mut self) {
        self.pending_redraw = true;
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    /// Bring the scene in line with the session's pack.
    fn sync_presenter(&mut self) {
        let Some(gpu) = self.gpu.as_mut() else {
            return;
        };
        let Some(pack) = self.session.pack().cloned() else {
            self.presenter.unmount(&mut gpu.renderer);
            return;
        };

        let textures = GpuTextureFactory::new(&gpu.device, &gpu.queue);
        match self.presenter.mount(
            &pack,
            &self.assets,
            &textures,
            &mut gpu.renderer,
            &self.cfg.presenter,
        ) {
            Ok(Presentation::Presented(geometry)) => {
                info!(
                    pack = %pack.id(),
                    width_m = geometry.width,
                    height_m = geometry.height,
                    mode = %self.mode,
                    "stereo pack mounted"
                );
                self.session.on_presented(pack.id());
            }
            Ok(Presentation::Unchanged) => {}
            Err(err) => {
                self.presenter.unmount(&mut gpu.renderer);
                self.session.on_presentation_failed(&err);
            }
        }
    }

    fn open_picker(&mut self, eye: Eye) {
        if self.dialog_open {
            debug!(%eye, "file dialog already open");
            return;
        }
        if self.session.stage() != Stage::Picking {
            return;
        }
        self.dialog_open = true;
        let proxy = self.proxy.clone();
        self.runtime.spawn(async move {
            let picked = pick_image(eye).await;
            if proxy.send_event(ViewerEvent::Picked(eye, picked)).is_err() {
                debug!(%eye, "viewer closed before the pick arrived");
            }
        });
    }

    fn confirm(&mut self) {
        let Some(request) = self.session.confirm() else {
            if !self.session.is_ready() {
                debug!("confirm ignored; both eyes are not picked yet");
            }
            return;
        };
        let id = request.request;
        if let Err(err) = self.load_tx.try_send(request) {
            let reason = match err {
                TrySendError::Full(_) => "loader is busy",
                TrySendError::Closed(_) => "loader has stopped",
            };
            warn!(request = id, reason, "load request not delivered");
            self.session.on_pair_loaded(PairLoaded {
                request: id,
                result: Err(PresentationError::Interrupted {
                    reason: reason.to_string(),
                }),
            });
        }
    }

    fn apply(&mut self, action: ViewerAction) {
        match action {
            ViewerAction::Pick(eye) => self.open_picker(eye),
            ViewerAction::Clear(eye) => {
                self.session.clear(eye);
            }
            ViewerAction::Confirm => self.confirm(),
            ViewerAction::Back => {
                if !self.session.dismiss_error() {
                    self.session.back();
                }
            }
            ViewerAction::CycleMode => {
                self.mode = self.mode.next();
                info!(mode = %self.mode, "stereo mode changed");
            }
        }
        self.sync_presenter();
        self.request_redraw();
    }
}

impl ApplicationHandler<ViewerEvent> for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.cancel.is_cancelled() {
            event_loop.exit();
            return;
        }

        let Some(window) = self.ensure_window(event_loop) else {
            event_loop.exit();
            return;
        };

        if self.gpu.is_none() {
            if let Err(err) = self.init_gpu(window) {
                error!(error = ?err, "failed to initialize GPU state");
                event_loop.exit();
                return;
            }
        }

        self.request_redraw();
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        if window.id() != window_id {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("viewer window close requested");
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                self.handle_resize(new_size);
            }
            WindowEvent::ScaleFactorChanged {
                mut inner_size_writer,
                ..
            } => {
                let size = window.inner_size();
                let _ = inner_size_writer.request_inner_size(size);
                self.handle_resize(size);
            }
            WindowEvent::ModifiersChanged(modifiers) => {
                self.modifiers = modifiers.state();
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key,
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                if let Some(action) = action_for_key(&logical_key, self.modifiers) {
                    debug!(?action, "viewer key");
                    self.apply(action);
                }
            }
            WindowEvent::RedrawRequested => {
                self.draw(event_loop);
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if self.pending_redraw {
            if let Some(window) = self.window.as_ref() {
                window.request_redraw();
            }
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: ViewerEvent) {
        match event {
            ViewerEvent::Cancelled => {
                info!("viewer received cancellation event");
                event_loop.exit();
                return;
            }
            ViewerEvent::Picked(eye, picked) => {
                self.dialog_open = false;
                match picked {
                    Some(picked) => {
                        self.session.pick(eye, picked);
                    }
                    None => debug!(%eye, "file dialog dismissed"),
                }
            }
            ViewerEvent::PairLoaded(loaded) => {
                self.session.on_pair_loaded(loaded);
                self.sync_presenter();
            }
        }
        self.request_redraw();
    }
}

/// Run the viewer on the calling thread until the window closes or `cancel` fires.
pub fn run_windowed(
    cfg: Configuration,
    session: StereoSession,
    load_tx: mpsc::Sender<LoadPair>,
    mut from_loader: mpsc::Receiver<PairLoaded>,
    cancel: CancellationToken,
) -> Result<()> {
    let event_loop = EventLoop::<ViewerEvent>::with_user_event()
        .build()
        .context("failed to build viewer event loop")?;
    let proxy = event_loop.create_proxy();

    let cancel_task = {
        let cancel = cancel.clone();
        let proxy = proxy.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            let _ = proxy.send_event(ViewerEvent::Cancelled);
        })
    };

    let forward_task = {
        let proxy = proxy.clone();
        tokio::spawn(async move {
            while let Some(loaded) = from_loader.recv().await {
                if proxy.send_event(ViewerEvent::PairLoaded(loaded)).is_err() {
                    break;
                }
            }
        })
    };

    let mut app = ViewerApp::new(cfg, session, cancel, proxy, load_tx)?;
    let run_result = event_loop.run_app(&mut app);
    cancel_task.abort();
    forward_task.abort();

    run_result.context("viewer event loop failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(text: &str) -> Key {
        Key::Character(text.into())
    }

    #[test]
    fn letters_pick_and_shift_clears() {
        let none = ModifiersState::empty();
        assert_eq!(
            action_for_key(&key("l"), none),
            Some(ViewerAction::Pick(Eye::Left))
        );
        assert_eq!(
            action_for_key(&key("R"), none),
            Some(ViewerAction::Pick(Eye::Right))
        );
        assert_eq!(
            action_for_key(&key("L"), ModifiersState::SHIFT),
            Some(ViewerAction::Clear(Eye::Left))
        );
        assert_eq!(
            action_for_key(&key("m"), none),
            Some(ViewerAction::CycleMode)
        );
        assert_eq!(action_for_key(&key("x"), none), None);
    }

    #[test]
    fn named_keys_confirm_and_go_back() {
        let none = ModifiersState::empty();
        assert_eq!(
            action_for_key(&Key::Named(NamedKey::Enter), none),
            Some(ViewerAction::Confirm)
        );
        assert_eq!(
            action_for_key(&Key::Named(NamedKey::Escape), none),
            Some(ViewerAction::Back)
        );
        assert_eq!(action_for_key(&Key::Named(NamedKey::Tab), none), None);
    }
}
