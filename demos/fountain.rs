//! Interactive fountain demo.
//!
//! Left-drag orbits the camera, the wheel zooms, right-click fires a burst
//! where the cursor ray meets the backstop (pushed back out along its normal)
//! and space toggles continuous emission. The scene capture holds a backstop
//! plane facing the camera that particles bounce off.
//!
//! Run with: `cargo run --example fountain`

use std::sync::Arc;
use std::time::Instant;

use poolfx::prelude::*;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

const CAPACITY: u32 = 40_000;
const BACKSTOP_DEPTH: f32 = 0.99;
const NORMAL_CHANNEL: usize = 2;
/// Distance from the backstop hit point to the burst origin, along its normal.
const BURST_STANDOFF: f32 = 3.0;

struct Camera {
    yaw: f32,
    pitch: f32,
    distance: f32,
    target: Vec3,
}

impl Camera {
    fn new() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.25,
            distance: 6.0,
            target: Vec3::new(0.0, 1.0, 0.0),
        }
    }

    fn position(&self) -> Vec3 {
        let x = self.distance * self.pitch.cos() * self.yaw.sin();
        let y = self.distance * self.pitch.sin();
        let z = self.distance * self.pitch.cos() * self.yaw.cos();
        self.target + Vec3::new(x, y, z)
    }

    fn view_proj(&self, aspect: f32) -> Mat4 {
        let view = Mat4::look_at_rh(self.position(), self.target, Vec3::Y);
        let proj = Mat4::perspective_rh(45.0_f32.to_radians(), aspect, 0.1, 100.0);
        proj * view
    }

    /// World-space normal of the backstop, facing the camera.
    fn backstop_normal(&self) -> Vec3 {
        (self.position() - self.target).normalize_or_zero()
    }

    /// The backstop normal encoded as a colour.
    fn backstop_normal_color(&self) -> wgpu::Color {
        let n = self.backstop_normal();
        wgpu::Color {
            r: (n.x * 0.5 + 0.5) as f64,
            g: (n.y * 0.5 + 0.5) as f64,
            b: (n.z * 0.5 + 0.5) as f64,
            a: 1.0,
        }
    }
}

struct DemoState {
    surface: wgpu::Surface<'static>,
    context: GpuContext,
    config: wgpu::SurfaceConfiguration,
    depth_texture: wgpu::TextureView,
    capture: Arc<SceneCapture>,
    system: ParticleSystem<GpuBackend>,
    camera: Camera,
    /// Cursor position in pixels of a burst to fire on the next frame.
    pending_burst: Option<Vec2>,
    last_frame_time: Instant,
}

impl DemoState {
    async fn new(window: Arc<Window>) -> Self {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance.create_surface(window).expect("failed to create surface");

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .expect("no compatible adapter");

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Fountain Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .expect("failed to create device");
        let context = GpuContext::from_parts(Arc::new(device), Arc::new(queue));

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&context.device, &config);
        let depth_texture = create_depth_texture(&context.device, &config);

        let capture = Arc::new(SceneCapture::new(context.clone()));
        capture.resize(config.width, config.height);

        let system_config = SystemConfig::new(CAPACITY)
            .with_group_width(64)
            .with_gravity(Vec3::new(0.0, -4.0, 0.0))
            .with_cadence(EmissionCadence::Continuous)
            .with_emit(EmitParams::fountain())
            .with_collision(CollisionConfig {
                normal_channel: NORMAL_CHANNEL,
                ..Default::default()
            });

        let backend = GpuBackend::new(context.clone(), surface_format);
        let mut system = ParticleSystem::new(backend, SourceMesh::tetrahedron(), system_config)
            .expect("invalid particle system config")
            .with_provider(capture.clone());
        system.start().expect("failed to start particle system");

        Self {
            surface,
            context,
            config,
            depth_texture,
            capture,
            system,
            camera: Camera::new(),
            pending_burst: None,
            last_frame_time: Instant::now(),
        }
    }

    fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.context.device, &self.config);
            self.depth_texture = create_depth_texture(&self.context.device, &self.config);
            self.capture.resize(new_size.width, new_size.height);
        }
    }

    fn toggle_cadence(&mut self) {
        let cadence = match self.system.config().cadence {
            EmissionCadence::Continuous => EmissionCadence::OnRequest,
            EmissionCadence::OnRequest => EmissionCadence::Continuous,
        };
        let config = self.system.config().clone().with_cadence(cadence);
        if let Err(e) = self.system.reconfigure(config) {
            log::error!("reconfigure failed: {e}");
        }
    }

    /// Cast the cursor into the scene: the backstop sits at a constant depth,
    /// so the hit point is the cursor unprojected at that depth.
    fn burst_origin(&self, cursor: Vec2, viewport: Vec2) -> Vec3 {
        let ndc = Vec2::new(cursor.x / viewport.x * 2.0 - 1.0, 1.0 - cursor.y / viewport.y * 2.0);
        let inverse = self.camera.view_proj(viewport.x / viewport.y).inverse();
        let hit = inverse.project_point3(Vec3::new(ndc.x, ndc.y, BACKSTOP_DEPTH));
        hit + self.camera.backstop_normal() * BURST_STANDOFF
    }

    fn render(&mut self) -> std::result::Result<(), wgpu::SurfaceError> {
        let now = Instant::now();
        let delta_time = (now - self.last_frame_time).as_secs_f32().min(0.1);
        self.last_frame_time = now;

        let output = self.surface.get_current_texture()?;
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Fountain Encoder"),
            });

        if let Some(targets) = self.capture.targets() {
            let normal = self.camera.backstop_normal_color();
            let color_attachments: Vec<_> = targets
                .channels
                .iter()
                .enumerate()
                .map(|(index, channel)| {
                    Some(wgpu::RenderPassColorAttachment {
                        view: channel.as_ref(),
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(if index == NORMAL_CHANNEL {
                                normal
                            } else {
                                wgpu::Color::TRANSPARENT
                            }),
                            store: wgpu::StoreOp::Store,
                        },
                    })
                })
                .collect();

            encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Capture Pass"),
                color_attachments: &color_attachments,
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: targets.depth.as_ref(),
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(BACKSTOP_DEPTH),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        self.context.queue.submit(std::iter::once(encoder.finish()));

        let viewport = Vec2::new(self.config.width as f32, self.config.height as f32);
        let mut input = FrameInput::new(delta_time)
            .with_camera(self.camera.view_proj(viewport.x / viewport.y), viewport);
        if let Some(cursor) = self.pending_burst.take() {
            let origin = self.burst_origin(cursor, viewport);
            input = input.with_emit(EmitRequest::at(origin));
        }

        match self.system.step(&input) {
            Ok(report) => log::trace!("{:?}", report),
            Err(e) => log::error!("step failed: {e}"),
        }

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Fountain Draw Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Particle Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.02,
                            g: 0.02,
                            b: 0.04,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.system.draw(&mut render_pass);
        }

        self.context.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }
}

fn create_depth_texture(
    device: &wgpu::Device,
    config: &wgpu::SurfaceConfiguration,
) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size: wgpu::Extent3d {
            width: config.width,
            height: config.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: poolfx::gpu::DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

#[derive(Default)]
struct App {
    window: Option<Arc<Window>>,
    state: Option<DemoState>,
    mouse_pressed: bool,
    last_mouse_pos: Option<(f64, f64)>,
    cursor: Option<(f64, f64)>,
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            let window_attrs = Window::default_attributes()
                .with_title("poolfx - fountain")
                .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));

            let window = Arc::new(
                event_loop
                    .create_window(window_attrs)
                    .expect("failed to create window"),
            );
            self.window = Some(window.clone());
            self.state = Some(pollster::block_on(DemoState::new(window)));
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                if let Some(state) = &mut self.state {
                    state.system.stop();
                }
                event_loop.exit();
            }
            WindowEvent::Resized(physical_size) => {
                if let Some(state) = &mut self.state {
                    state.resize(physical_size);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Space),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                if let Some(state) = &mut self.state {
                    state.toggle_cadence();
                }
            }
            WindowEvent::MouseInput { state, button, .. } => match button {
                MouseButton::Left => {
                    self.mouse_pressed = state == ElementState::Pressed;
                    if !self.mouse_pressed {
                        self.last_mouse_pos = None;
                    }
                }
                MouseButton::Right if state == ElementState::Pressed => {
                    if let Some(demo) = &mut self.state {
                        if let Some((x, y)) = self.cursor {
                            demo.pending_burst = Some(Vec2::new(x as f32, y as f32));
                        }
                    }
                }
                _ => {}
            },
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = Some((position.x, position.y));
                if self.mouse_pressed {
                    if let Some((last_x, last_y)) = self.last_mouse_pos {
                        let dx = position.x - last_x;
                        let dy = position.y - last_y;

                        if let Some(state) = &mut self.state {
                            state.camera.yaw -= dx as f32 * 0.005;
                            state.camera.pitch += dy as f32 * 0.005;
                            state.camera.pitch = state.camera.pitch.clamp(-1.5, 1.5);
                        }
                    }
                    self.last_mouse_pos = Some((position.x, position.y));
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 * 0.1,
                };
                if let Some(state) = &mut self.state {
                    state.camera.distance -= scroll * 0.3;
                    state.camera.distance = state.camera.distance.clamp(1.0, 30.0);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Some(state) = &mut self.state {
                    match state.render() {
                        Ok(_) => {}
                        Err(wgpu::SurfaceError::Lost) => state.resize(winit::dpi::PhysicalSize {
                            width: state.config.width,
                            height: state.config.height,
                        }),
                        Err(wgpu::SurfaceError::OutOfMemory) => event_loop.exit(),
                        Err(e) => log::warn!("render error: {:?}", e),
                    }
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let event_loop = EventLoop::new().expect("failed to create event loop");
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::default();
    if let Err(e) = event_loop.run_app(&mut app) {
        log::error!("event loop error: {e}");
    }
}
