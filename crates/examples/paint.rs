//! Interactive radiance cascades painting
//!
//! Controls:
//!   Left drag   paint with the current colour
//!   1-5         pick colour (5 is a black occluder)
//!   S           toggle sun, Left/Right rotate it
//!   A           toggle amortized updates
//!   Tab         cycle preview stage
//!   T           toggle GPU pass timing
//!   C           clear
//!   Escape      exit

use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::{Vec2, Vec4};
use penumbra::{Brush, GpuBackend, RadianceConfig, RadiancePipeline, Stage};
use winit::{
    application::ApplicationHandler,
    event::*,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

const PALETTE: [Vec4; 5] = [
    Vec4::new(1.0, 0.85, 0.6, 1.0),
    Vec4::new(1.0, 0.35, 0.2, 1.0),
    Vec4::new(0.3, 0.8, 0.4, 1.0),
    Vec4::new(0.3, 0.5, 1.0, 1.0),
    Vec4::new(0.0, 0.0, 0.0, 1.0),
];

fn main() {
    env_logger::init();
    log::info!("Starting Penumbra paint example");

    let event_loop = EventLoop::new().expect("Failed to create event loop");
    let mut app = App { state: None };
    event_loop.run_app(&mut app).expect("Event loop error");
}

struct App {
    state: Option<AppState>,
}

struct AppState {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: Arc<wgpu::Device>,
    surface_config: wgpu::SurfaceConfiguration,
    pipeline: RadiancePipeline<GpuBackend>,
    cursor: Vec2,
    last_timing: Instant,
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        let window = Arc::new(
            event_loop
                .create_window(
                    Window::default_attributes()
                        .with_title("Penumbra - Radiance Cascades")
                        .with_inner_size(winit::dpi::LogicalSize::new(768u32, 768u32)),
                )
                .expect("Failed to create window"),
        );

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window.clone())
            .expect("Failed to create surface");

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .expect("Failed to find adapter");

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Main Device"),
                required_features: adapter.features() & wgpu::Features::TIMESTAMP_QUERY,
                required_limits: adapter.limits(),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None,
        ))
        .expect("Failed to create device");
        let device = Arc::new(device);
        let queue = Arc::new(queue);

        // The composite is already display-encoded, so avoid a second sRGB encode
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let size = window.inner_size();
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let backend = GpuBackend::new(device.clone(), queue, surface_format);
        let config = RadianceConfig::default().with_amortized(true);
        let pipeline = RadiancePipeline::new(backend, surface_config.width, surface_config.height, config)
            .expect("Failed to create radiance pipeline");

        self.state = Some(AppState {
            window,
            surface,
            device,
            surface_config,
            pipeline,
            cursor: Vec2::ZERO,
            last_timing: Instant::now(),
        });
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(state) = &mut self.state else { return };
        let now = Instant::now();

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Shutting down");
                event_loop.exit();
            }
            WindowEvent::KeyboardInput {
                event: KeyEvent {
                    state: ElementState::Pressed,
                    physical_key: PhysicalKey::Code(key),
                    ..
                },
                ..
            } => {
                if key == KeyCode::Escape {
                    event_loop.exit();
                } else {
                    state.handle_key(key, now);
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                state.cursor = Vec2::new(position.x as f32, position.y as f32);
                if let Err(e) = state.pipeline.move_to(state.cursor, now) {
                    log::error!("Paint error: {}", e);
                }
            }
            WindowEvent::MouseInput {
                state: button_state,
                button: MouseButton::Left,
                ..
            } => match button_state {
                ElementState::Pressed => state.pipeline.start_drawing(state.cursor, now),
                ElementState::Released => {
                    if let Err(e) = state.pipeline.stop_drawing(state.cursor, false, now) {
                        log::error!("Paint error: {}", e);
                    }
                }
            },
            WindowEvent::CursorLeft { .. } => {
                if let Err(e) = state.pipeline.stop_drawing(state.cursor, true, now) {
                    log::error!("Paint error: {}", e);
                }
            }
            WindowEvent::Resized(size) if size.width > 0 && size.height > 0 => {
                state.surface_config.width = size.width;
                state.surface_config.height = size.height;
                state.surface.configure(&state.device, &state.surface_config);
                if let Err(e) = state.pipeline.resize(size.width, size.height, now) {
                    log::error!("Resize error: {}", e);
                }
            }
            WindowEvent::RedrawRequested => {
                state.render(now);
                state.window.request_redraw();
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.window.request_redraw();
        }
    }
}

impl AppState {
    fn handle_key(&mut self, key: KeyCode, now: Instant) {
        let mut config = self.pipeline.config().clone();
        match key {
            KeyCode::Digit1 | KeyCode::Digit2 | KeyCode::Digit3 | KeyCode::Digit4 | KeyCode::Digit5 => {
                let index = match key {
                    KeyCode::Digit1 => 0,
                    KeyCode::Digit2 => 1,
                    KeyCode::Digit3 => 2,
                    KeyCode::Digit4 => 3,
                    _ => 4,
                };
                let brush = self.pipeline.scene().brush();
                self.pipeline.scene_mut().set_brush(Brush {
                    color: PALETTE[index],
                    ..brush
                });
                return;
            }
            KeyCode::KeyC => {
                self.pipeline.scene_mut().clear();
                return;
            }
            KeyCode::KeyT => {
                let backend = self.pipeline.backend_mut();
                let enabled = backend.set_timing(!backend.is_timing());
                log::info!("GPU pass timing {}", if enabled { "on" } else { "off" });
                return;
            }
            KeyCode::KeyS => config.enable_sun = !config.enable_sun,
            KeyCode::ArrowLeft => config.sun_angle -= 0.1,
            KeyCode::ArrowRight => config.sun_angle += 0.1,
            KeyCode::KeyA => config.amortized = !config.amortized,
            KeyCode::Tab => {
                config.stage = match config.stage {
                    Stage::Full => Stage::Seed,
                    Stage::Seed => Stage::Jfa,
                    Stage::Jfa => Stage::DistanceField,
                    Stage::DistanceField => Stage::Full,
                }
            }
            _ => return,
        }
        log::info!(
            "Sun {} at {:.1} rad, amortized {}, stage {:?}",
            config.enable_sun,
            config.sun_angle,
            config.amortized,
            config.stage
        );
        if let Err(e) = self.pipeline.reconfigure(config, now) {
            log::error!("Invalid configuration: {}", e);
        }
    }

    fn render(&mut self, now: Instant) {
        if let Err(e) = self.pipeline.tick(now) {
            log::error!("Tick error: {}", e);
            return;
        }

        let output = match self.surface.get_current_texture() {
            Ok(t) => t,
            Err(e) => {
                log::warn!("Surface error: {:?}", e);
                return;
            }
        };
        let mut view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
        if let Err(e) = self.pipeline.render(&mut view) {
            log::error!("Render error: {}", e);
        }
        output.present();

        if now.duration_since(self.last_timing) >= Duration::from_secs(1) {
            self.last_timing = now;
            match self.pipeline.backend_mut().take_timings() {
                Ok(timings) => {
                    for timing in timings {
                        log::info!("{:>12}: {:.3} ms x{}", timing.label, timing.average_ms(), timing.dispatches);
                    }
                }
                Err(e) => log::warn!("Timing readback failed: {}", e),
            }
        }
    }
}
