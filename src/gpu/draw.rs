//! Combined-mesh tile rendering.
//!
//! The combined mesh is uploaded once per session. Each tile is the same
//! vertex and index buffer drawn with a different [`TileUniforms`] block,
//! selected with a dynamic offset into one uniform buffer.

use std::num::NonZeroU64;

use glam::Mat4;
use wgpu::util::DeviceExt;

use crate::mesh::{CombinedMesh, MeshVertex};
use crate::shaders::draw_shader;
use crate::uniforms::{CameraUniforms, TileUniforms};

/// Round `size` up to a multiple of `alignment`.
pub(crate) fn aligned_stride(size: u64, alignment: u64) -> u64 {
    size.div_ceil(alignment.max(1)) * alignment.max(1)
}

/// Draws every tile of a combined mesh against the shared particle buffer.
pub struct TileRenderer {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    camera_buffer: wgpu::Buffer,
    tile_buffer: wgpu::Buffer,
    tile_stride: u64,
    tile_count: u32,
    scene_bind_group: wgpu::BindGroup,
    tile_bind_group: wgpu::BindGroup,
    pipeline: wgpu::RenderPipeline,
}

impl TileRenderer {
    pub fn new(
        device: &wgpu::Device,
        mesh: &CombinedMesh,
        particles: &wgpu::Buffer,
        color_format: wgpu::TextureFormat,
        depth_format: Option<wgpu::TextureFormat>,
    ) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Combined Mesh Vertex Buffer"),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Combined Mesh Index Buffer"),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Tile Camera Buffer"),
            contents: bytemuck::bytes_of(&CameraUniforms::new(Mat4::IDENTITY)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        // One TileUniforms per tile, each at a dynamic-offset-aligned stride.
        let tile_size = std::mem::size_of::<TileUniforms>() as u64;
        let tile_stride = aligned_stride(
            tile_size,
            device.limits().min_uniform_buffer_offset_alignment as u64,
        );
        let mut tile_data = vec![0u8; (tile_stride * mesh.tile_count().max(1) as u64) as usize];
        for tile in &mesh.tiles {
            let uniforms = TileUniforms {
                id_offset: tile.id_offset,
                copies_per_tile: mesh.copies_per_tile,
                capacity: mesh.capacity(),
                _pad: 0,
            };
            let start = (tile.index as u64 * tile_stride) as usize;
            tile_data[start..start + tile_size as usize].copy_from_slice(bytemuck::bytes_of(&uniforms));
        }
        let tile_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Tile Uniform Buffer"),
            contents: &tile_data,
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let scene_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Tile Scene Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let tile_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Tile Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(tile_size),
                },
                count: None,
            }],
        });

        let scene_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Tile Scene Bind Group"),
            layout: &scene_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: camera_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: particles.as_entire_binding(),
                },
            ],
        });

        let tile_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Tile Bind Group"),
            layout: &tile_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &tile_buffer,
                    offset: 0,
                    size: NonZeroU64::new(tile_size),
                }),
            }],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Tile Shader"),
            source: wgpu::ShaderSource::Wgsl(draw_shader().into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Tile Pipeline Layout"),
            bind_group_layouts: &[&scene_layout, &tile_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Tile Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[MeshVertex::layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: color_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                ..Default::default()
            },
            depth_stencil: depth_format.map(|format| wgpu::DepthStencilState {
                format,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.index_count(),
            camera_buffer,
            tile_buffer,
            tile_stride,
            tile_count: mesh.tile_count(),
            scene_bind_group,
            tile_bind_group,
            pipeline,
        }
    }

    pub fn write_camera(&self, queue: &wgpu::Queue, view_proj: Mat4) {
        queue.write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(&CameraUniforms::new(view_proj)));
    }

    /// One indexed draw per tile.
    pub fn draw(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, &self.scene_bind_group, &[]);
        render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        render_pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);

        for tile in 0..self.tile_count {
            let offset = (tile as u64 * self.tile_stride) as u32;
            render_pass.set_bind_group(1, &self.tile_bind_group, &[offset]);
            render_pass.draw_indexed(0..self.index_count, 0, 0..1);
        }
    }

    pub fn tile_count(&self) -> u32 {
        self.tile_count
    }

    pub fn destroy(&self) {
        self.vertex_buffer.destroy();
        self.index_buffer.destroy();
        self.camera_buffer.destroy();
        self.tile_buffer.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligned_stride() {
        assert_eq!(aligned_stride(16, 256), 256);
        assert_eq!(aligned_stride(256, 256), 256);
        assert_eq!(aligned_stride(257, 256), 512);
        assert_eq!(aligned_stride(16, 0), 16);
    }
}
