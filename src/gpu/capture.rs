//! Scene depth/normal capture targets.
//!
//! The application renders its scene into [`SceneCapture::targets`] (depth
//! plus up to [`CHANNEL_COUNT`] colour channels, normals in channel 2 by
//! default) before stepping the particle system. Targets are recreated only
//! when the viewport size changes.

use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use super::{GpuContext, CHANNEL_FORMAT, DEPTH_FORMAT};
use crate::provider::{DepthNormalProvider, CHANNEL_COUNT};

/// Views of the current capture targets.
#[derive(Debug, Clone)]
pub struct CaptureViews {
    pub width: u32,
    pub height: u32,
    pub depth: Arc<wgpu::TextureView>,
    pub channels: [Arc<wgpu::TextureView>; CHANNEL_COUNT],
}

struct CaptureTargets {
    views: CaptureViews,
    textures: Vec<wgpu::Texture>,
}

impl CaptureTargets {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let create = |label: &str, format: wgpu::TextureFormat| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            })
        };
        let view = |texture: &wgpu::Texture| Arc::new(texture.create_view(&wgpu::TextureViewDescriptor::default()));

        let depth_texture = create("Capture Depth", DEPTH_FORMAT);
        let channel_textures: [wgpu::Texture; CHANNEL_COUNT] = [
            create("Capture Channel 0", CHANNEL_FORMAT),
            create("Capture Channel 1", CHANNEL_FORMAT),
            create("Capture Channel 2", CHANNEL_FORMAT),
            create("Capture Channel 3", CHANNEL_FORMAT),
        ];

        let views = CaptureViews {
            width,
            height,
            depth: view(&depth_texture),
            channels: [
                view(&channel_textures[0]),
                view(&channel_textures[1]),
                view(&channel_textures[2]),
                view(&channel_textures[3]),
            ],
        };

        let mut textures = vec![depth_texture];
        textures.extend(channel_textures);
        Self { views, textures }
    }

    fn destroy(&self) {
        for texture in &self.textures {
            texture.destroy();
        }
    }
}

/// A [`DepthNormalProvider`] backed by render targets sized to the viewport.
pub struct SceneCapture {
    context: GpuContext,
    targets: RwLock<Option<CaptureTargets>>,
}

impl SceneCapture {
    /// No targets exist until the first [`resize`](Self::resize).
    pub fn new(context: GpuContext) -> Self {
        Self {
            context,
            targets: RwLock::new(None),
        }
    }

    /// Match the viewport size. Returns `true` if the targets were recreated.
    pub fn resize(&self, width: u32, height: u32) -> bool {
        let (width, height) = (width.max(1), height.max(1));
        let mut targets = self.targets.write();
        if let Some(current) = targets.as_ref() {
            if current.views.width == width && current.views.height == height {
                return false;
            }
            current.destroy();
        }
        debug!("scene capture resized to {}x{}", width, height);
        *targets = Some(CaptureTargets::new(&self.context.device, width, height));
        true
    }

    /// Free the targets. The provider reports no frame until the next resize.
    pub fn release(&self) {
        if let Some(targets) = self.targets.write().take() {
            targets.destroy();
        }
    }

    /// Views to render the scene into.
    pub fn targets(&self) -> Option<CaptureViews> {
        self.targets.read().as_ref().map(|t| t.views.clone())
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        self.targets
            .read()
            .as_ref()
            .map(|t| (t.views.width, t.views.height))
    }
}

impl DepthNormalProvider for SceneCapture {
    type Texture = Arc<wgpu::TextureView>;

    fn current_depth_texture(&self) -> Option<Arc<wgpu::TextureView>> {
        self.targets.read().as_ref().map(|t| t.views.depth.clone())
    }

    fn current_channel_texture(&self, index: usize) -> Option<Arc<wgpu::TextureView>> {
        self.targets
            .read()
            .as_ref()
            .and_then(|t| t.views.channels.get(index).cloned())
    }
}

impl Drop for SceneCapture {
    fn drop(&mut self) {
        self.release();
    }
}
