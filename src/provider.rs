//! Scene depth/normal input for collision.
//!
//! A [`DepthNormalProvider`] is injected into a
//! [`ParticleSystem`](crate::ParticleSystem) with `with_provider`. Before each
//! update the system asks it for the current depth texture and the configured
//! normal channel; if either is missing the frame runs without collision.

/// Number of colour channels a provider exposes.
pub const CHANNEL_COUNT: usize = 4;

/// Source of scene depth and normal textures, refreshed once per frame.
///
/// `Texture` is a backend handle: `Arc<wgpu::TextureView>` for the GPU backend,
/// `Arc<CpuTexture>` for the CPU backend.
pub trait DepthNormalProvider: Send + Sync {
    type Texture;

    /// Depth of the last captured frame, or `None` if nothing has been
    /// captured yet.
    fn current_depth_texture(&self) -> Option<Self::Texture>;

    /// Colour channel `index` of the last captured frame. Indices at or above
    /// [`CHANNEL_COUNT`] return `None`.
    fn current_channel_texture(&self, index: usize) -> Option<Self::Texture>;
}

/// The pair of textures bound to the update kernel for one step.
#[derive(Debug, Clone)]
pub struct CollisionTextures<T> {
    pub depth: T,
    /// Normals encoded as `rgb * 0.5 + 0.5`.
    pub normal: T,
}

impl<T> CollisionTextures<T> {
    /// Fetch both textures, or `None` if the provider has no complete frame.
    pub fn fetch<P>(provider: &P, normal_channel: usize) -> Option<Self>
    where
        P: DepthNormalProvider<Texture = T> + ?Sized,
    {
        let depth = provider.current_depth_texture()?;
        let normal = provider.current_channel_texture(normal_channel)?;
        Some(Self { depth, normal })
    }
}

/// What happened to collision on a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionStatus {
    /// No provider injected, or collision disabled in the config.
    #[default]
    Disabled,
    /// A provider is injected but had no frame; collision skipped.
    ProviderUnavailable,
    /// Textures were bound and the kernel collided against them.
    Applied,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        depth: Option<u32>,
    }

    impl DepthNormalProvider for Fixed {
        type Texture = u32;

        fn current_depth_texture(&self) -> Option<u32> {
            self.depth
        }

        fn current_channel_texture(&self, index: usize) -> Option<u32> {
            (index < CHANNEL_COUNT).then_some(10 + index as u32)
        }
    }

    #[test]
    fn test_fetch_requires_both_textures() {
        let ready = Fixed { depth: Some(1) };
        let textures = CollisionTextures::fetch(&ready, 2).unwrap();
        assert_eq!(textures.depth, 1);
        assert_eq!(textures.normal, 12);

        assert!(CollisionTextures::fetch(&ready, CHANNEL_COUNT).is_none());
        assert!(CollisionTextures::fetch(&Fixed { depth: None }, 0).is_none());
    }
}
