use std::sync::Arc;

use log::debug;

use super::draw::TileRenderer;
use super::kernels::ComputeKernels;
use super::pool::PoolBuffers;
use super::{GpuContext, DEPTH_FORMAT};
use crate::backend::{Backend, SessionLayout};
use crate::error::Result;
use crate::provider::CollisionTextures;
use crate::system::ParticleSystem;
use crate::uniforms::{EmitUniforms, UpdateUniforms};

/// GPU buffers and pipelines for one running span.
pub struct GpuSession {
    pub pool: PoolBuffers,
    pub kernels: ComputeKernels,
    pub renderer: TileRenderer,
    capacity: u32,
}

impl GpuSession {
    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

/// Backend running the kernels as wgpu compute passes.
pub struct GpuBackend {
    context: GpuContext,
    color_format: wgpu::TextureFormat,
    depth_format: Option<wgpu::TextureFormat>,
}

impl GpuBackend {
    /// Tiles render into `color_format` targets with a [`DEPTH_FORMAT`] depth
    /// attachment.
    pub fn new(context: GpuContext, color_format: wgpu::TextureFormat) -> Self {
        Self {
            context,
            color_format,
            depth_format: Some(DEPTH_FORMAT),
        }
    }

    /// Override the depth attachment format, or render without depth.
    pub fn with_depth_format(mut self, format: Option<wgpu::TextureFormat>) -> Self {
        self.depth_format = format;
        self
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    fn submit(&self, label: &str, encode: impl FnOnce(&mut wgpu::CommandEncoder)) {
        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        encode(&mut encoder);
        self.context.queue.submit(std::iter::once(encoder.finish()));
    }
}

impl Backend for GpuBackend {
    type Session = GpuSession;
    type Texture = Arc<wgpu::TextureView>;

    fn open_session(&mut self, layout: &SessionLayout<'_>) -> Result<GpuSession> {
        let device = &self.context.device;
        let pool = PoolBuffers::new(device, layout.capacity);
        let kernels = ComputeKernels::new(device, layout.capacity, layout.group_width, &pool);
        let renderer = TileRenderer::new(
            device,
            layout.mesh,
            &kernels.particles,
            self.color_format,
            self.depth_format,
        );
        debug!(
            "gpu session: {} slots, {} tiles",
            layout.capacity,
            renderer.tile_count()
        );

        Ok(GpuSession {
            pool,
            kernels,
            renderer,
            capacity: layout.capacity,
        })
    }

    fn dispatch_init(&mut self, session: &mut GpuSession, groups: u32) -> Result<()> {
        let params = UpdateUniforms {
            capacity: session.capacity,
            ..bytemuck::Zeroable::zeroed()
        };
        session.kernels.write_update(&self.context.queue, &params);
        session.pool.reset(&self.context.queue, session.capacity);
        self.submit("Init Encoder", |encoder| session.kernels.encode_init(encoder, groups));
        Ok(())
    }

    fn dispatch_update(
        &mut self,
        session: &mut GpuSession,
        params: &UpdateUniforms,
        collision: Option<&CollisionTextures<Arc<wgpu::TextureView>>>,
        groups: u32,
    ) -> Result<()> {
        let queue = &self.context.queue;
        session.kernels.write_update(queue, params);
        session.renderer.write_camera(queue, params.view_proj());

        let collision_group = collision.map(|textures| {
            session
                .kernels
                .collision_bind_group(&self.context.device, &textures.depth, &textures.normal)
        });
        self.submit("Update Encoder", |encoder| {
            session
                .kernels
                .encode_update(encoder, collision_group.as_ref(), groups)
        });
        Ok(())
    }

    fn read_pool_size(&mut self, session: &mut GpuSession) -> Result<u32> {
        Ok(session
            .pool
            .read_size(&self.context.device, &self.context.queue)?)
    }

    fn dispatch_emit(
        &mut self,
        session: &mut GpuSession,
        params: &EmitUniforms,
        groups: u32,
    ) -> Result<()> {
        session.kernels.write_emit(&self.context.queue, params);
        self.submit("Emit Encoder", |encoder| session.kernels.encode_emit(encoder, groups));
        Ok(())
    }

    fn close_session(&mut self, session: GpuSession) {
        self.context.device.poll(wgpu::Maintain::Wait);
        session.renderer.destroy();
        session.kernels.destroy();
        session.pool.destroy();
    }
}

impl ParticleSystem<GpuBackend> {
    /// Draw every tile into `render_pass`. Does nothing while stopped.
    ///
    /// The camera used is the `view_proj` of the last step.
    pub fn draw(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        if let Some(session) = self.session() {
            session.renderer.draw(render_pass);
        }
    }
}
