//! wgpu backend.
//!
//! [`GpuContext`] owns the device and queue. [`GpuBackend`] implements
//! [`Backend`](crate::Backend) on top of it: each session allocates the
//! particle buffer, the free-list buffers, the compute pipelines and a
//! [`TileRenderer`] for the combined mesh.

mod backend;
mod capture;
mod draw;
mod kernels;
mod pool;

pub use backend::{GpuBackend, GpuSession};
pub use capture::{CaptureViews, SceneCapture};
pub use draw::TileRenderer;
pub use kernels::ComputeKernels;
pub use pool::PoolBuffers;

use std::sync::Arc;

use log::info;

use crate::error::GpuError;

/// Depth format used for the tile pipeline and the scene capture.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Format of the scene capture's colour channels.
pub const CHANNEL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Device and queue shared by the backend, the renderer and the capture.
#[derive(Clone)]
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
}

impl GpuContext {
    /// Request an adapter (compatible with `surface` if given) and a device.
    pub async fn new(
        instance: &wgpu::Instance,
        surface: Option<&wgpu::Surface<'_>>,
    ) -> Result<Self, GpuError> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: surface,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        info!("using adapter {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("poolfx Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }

    /// A context with no surface, blocking on adapter and device creation.
    pub fn headless() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        pollster::block_on(Self::new(&instance, None))
    }

    pub fn from_parts(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self { device, queue }
    }
}
