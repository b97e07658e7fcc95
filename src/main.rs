use anyhow::{anyhow, Context, Result};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::*,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{Key, NamedKey},
    window::{Window, WindowAttributes, WindowId},
};

mod camera;
mod config;
mod geometry;
mod globe;
mod grid;
mod interaction;
mod layer;
mod metrics;
mod overlay;
mod plan;
mod primitives;
mod render;
mod schedule;
mod view;

use camera::Camera;
use config::Config;
use globe::Globe;
use interaction::ClickOutcome;
use layer::H3Layer;
use overlay::OverlayRenderer;
use primitives::ScreenPoint;
use render::{Capabilities, FrameTargets};

const WINDOW_TITLE: &str = "H3 Globe Grid";

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        error!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let config = Config::load()?;
    let event_loop = EventLoop::new().context("creating event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = H3GlobeApp::new(config);
    event_loop.run_app(&mut app)?;
    app.fatal.map_or(Ok(()), Err)
}

struct State {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    caps: Capabilities,
    targets: FrameTargets,
    globe: Globe,
    overlay: OverlayRenderer,
    camera: Camera,
    layer: H3Layer,
    cursor: Option<ScreenPoint>,
}

impl State {
    async fn new(window: Arc<Window>, app_config: Config) -> Result<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window.clone())
            .context("creating window surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("no compatible GPU adapter")?;
        info!("using adapter {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .context("requesting GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| anyhow!("surface reports no texture formats"))?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let caps = Capabilities::negotiate(&adapter, surface_format);
        let targets = FrameTargets::new(&device, &config, &caps);
        let camera = Camera::new(&device, config.width, config.height);
        let globe = Globe::new(&device, &camera, &caps);
        let mut overlay = OverlayRenderer::new(&device, &camera, &caps);

        let start_enabled = app_config.layer_enabled;
        let mut layer = H3Layer::new(app_config);
        if start_enabled {
            layer.enable(Instant::now(), camera.pose(), &mut overlay);
        }

        let state = Self {
            window,
            surface,
            device,
            queue,
            config,
            caps,
            targets,
            globe,
            overlay,
            camera,
            layer,
            cursor: None,
        };
        state.update_title();
        Ok(state)
    }

    fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
            self.targets = FrameTargets::new(&self.device, &self.config, &self.caps);
            self.camera.resize(new_size.width, new_size.height);
            self.layer.request_recompute(Instant::now());
        }
    }

    fn update_title(&self) {
        let title = match (self.layer.is_enabled(), self.layer.selected_cell()) {
            (false, _) => format!("{WINDOW_TITLE} (grid off)"),
            (true, Some(cell)) => format!("{WINDOW_TITLE} - cell {cell}"),
            (true, None) => WINDOW_TITLE.to_string(),
        };
        self.window.set_title(&title);
    }

    /// Feeds one window event to the camera and the grid layer.
    fn input(&mut self, event: &WindowEvent) {
        let now = Instant::now();
        if self.camera.process_input(event) {
            self.layer.request_recompute(now);
        }

        match event {
            WindowEvent::CursorMoved { position, .. } => {
                let point = ScreenPoint::new(position.x as f32, position.y as f32);
                self.cursor = Some(point);
                self.layer.pointer_move(point, now);
            }
            WindowEvent::CursorLeft { .. } => {
                self.cursor = None;
                self.layer.pointer_leave(now);
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                let Some(at) = self.cursor else { return };
                match state {
                    ElementState::Pressed => self.layer.pointer_down(at),
                    ElementState::Released => {
                        self.layer.pointer_up();
                        let outcome = self.layer.click(at, self.camera.pose(), now);
                        if matches!(outcome, Some(ClickOutcome::Selected(_) | ClickOutcome::Deselected)) {
                            self.update_title();
                        }
                    }
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        state: ElementState::Pressed,
                        logical_key: Key::Character(key),
                        repeat: false,
                        ..
                    },
                ..
            } if key.eq_ignore_ascii_case("g") => {
                let enabled = self.layer.toggle(now, self.camera.pose(), &mut self.overlay);
                debug!("grid toggled, now {}", if enabled { "on" } else { "off" });
                self.update_title();
            }
            _ => {}
        }
    }

    fn update(&mut self) {
        let now = Instant::now();
        if self.camera.update() {
            self.layer.request_recompute(now);
        }
        self.camera.update_buffer(&self.queue);

        if let Some(stats) = self.layer.tick(now, self.camera.pose(), &mut self.overlay) {
            if stats.created + stats.removed > 0 {
                debug!("grid reconcile: {stats:?}, {} outlines", self.overlay.outline_count());
            }
        }
        self.overlay.upload(&self.device);
    }

    fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let frame = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let (view, resolve_target) = self.targets.color_attachment(&frame);

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.05,
                            g: 0.05,
                            b: 0.15,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: self.targets.depth_view(),
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            self.globe.render(&mut render_pass, &self.camera);
            self.overlay.render(&mut render_pass, &self.camera);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }
}

struct H3GlobeApp {
    config: Config,
    state: Option<State>,
    fatal: Option<anyhow::Error>,
}

impl H3GlobeApp {
    fn new(config: Config) -> Self {
        Self {
            config,
            state: None,
            fatal: None,
        }
    }

    fn init(&self, event_loop: &ActiveEventLoop) -> Result<State> {
        let window_attributes = WindowAttributes::default()
            .with_title(WINDOW_TITLE)
            .with_inner_size(winit::dpi::PhysicalSize::new(1280, 720));
        let window = event_loop
            .create_window(window_attributes)
            .context("creating window")?;
        pollster::block_on(State::new(Arc::new(window), self.config.clone()))
    }
}

impl ApplicationHandler for H3GlobeApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        match self.init(event_loop) {
            Ok(state) => self.state = Some(state),
            Err(err) => {
                self.fatal = Some(err);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(state) = self.state.as_mut() else { return };
        if window_id != state.window.id() {
            return;
        }

        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        state: ElementState::Pressed,
                        logical_key: Key::Named(NamedKey::Escape),
                        ..
                    },
                ..
            } => {
                state.layer.disable(&mut state.overlay);
                event_loop.exit();
            }
            WindowEvent::Resized(physical_size) => state.resize(physical_size),
            WindowEvent::RedrawRequested => {
                state.update();
                match state.render() {
                    Ok(()) => {}
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        state.resize(state.window.inner_size())
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        self.fatal = Some(anyhow!("GPU out of memory"));
                        event_loop.exit();
                    }
                    Err(e) => warn!("dropped frame: {e:?}"),
                }
            }
            other => state.input(&other),
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.window.request_redraw();
        }
    }
}
