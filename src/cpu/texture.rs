//! Host-memory collision textures.

use std::sync::Arc;

use glam::{UVec2, Vec4};
use parking_lot::RwLock;

use crate::kernel::TexelSource;
use crate::provider::{DepthNormalProvider, CHANNEL_COUNT};

/// A row-major RGBA float image. Depth images store the depth in `x`.
#[derive(Debug, Clone, PartialEq)]
pub struct CpuTexture {
    width: u32,
    height: u32,
    texels: Vec<Vec4>,
}

impl CpuTexture {
    /// A texture filled with one value.
    pub fn filled(width: u32, height: u32, value: Vec4) -> Self {
        Self {
            width,
            height,
            texels: vec![value; (width * height) as usize],
        }
    }

    /// A depth texture at constant depth.
    pub fn depth(width: u32, height: u32, depth: f32) -> Self {
        Self::filled(width, height, Vec4::new(depth, 0.0, 0.0, 0.0))
    }

    /// A normal texture encoding `normal` as `n * 0.5 + 0.5`.
    pub fn normal(width: u32, height: u32, normal: glam::Vec3) -> Self {
        let encoded = normal.normalize_or_zero() * 0.5 + 0.5;
        Self::filled(width, height, encoded.extend(1.0))
    }

    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> Vec4) -> Self {
        let texels = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();
        Self { width, height, texels }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> Option<Vec4> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.texels.get((y * self.width + x) as usize).copied()
    }

    pub fn set(&mut self, x: u32, y: u32, value: Vec4) {
        if x < self.width && y < self.height {
            self.texels[(y * self.width + x) as usize] = value;
        }
    }
}

impl TexelSource for CpuTexture {
    fn dimensions(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }

    fn load(&self, coord: UVec2) -> Vec4 {
        self.get(coord.x, coord.y).unwrap_or(Vec4::ZERO)
    }
}

#[derive(Debug, Default)]
struct CapturedFrame {
    depth: Option<Arc<CpuTexture>>,
    channels: [Option<Arc<CpuTexture>>; CHANNEL_COUNT],
}

/// A provider whose frame is set by the caller, for headless runs and tests.
#[derive(Debug, Default)]
pub struct StaticCapture {
    frame: RwLock<CapturedFrame>,
}

impl StaticCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_depth(&self, depth: CpuTexture) {
        self.frame.write().depth = Some(Arc::new(depth));
    }

    pub fn set_channel(&self, index: usize, texture: CpuTexture) {
        if let Some(slot) = self.frame.write().channels.get_mut(index) {
            *slot = Some(Arc::new(texture));
        }
    }

    /// Forget the captured frame.
    pub fn clear(&self) {
        *self.frame.write() = CapturedFrame::default();
    }
}

impl DepthNormalProvider for StaticCapture {
    type Texture = Arc<CpuTexture>;

    fn current_depth_texture(&self) -> Option<Arc<CpuTexture>> {
        self.frame.read().depth.clone()
    }

    fn current_channel_texture(&self, index: usize) -> Option<Arc<CpuTexture>> {
        self.frame.read().channels.get(index).cloned().flatten()
    }
}
