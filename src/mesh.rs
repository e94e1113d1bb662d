//! Source meshes and the combined-mesh tiles used to draw particles.
//!
//! A graphics API caps the number of vertices one draw call may reference. To
//! draw `capacity` particles without one draw per particle, the source mesh is
//! copied as many times as fits under that ceiling into a single combined
//! mesh. Every vertex of copy `k` carries `k` in its second UV channel, so the
//! vertex shader can find its particle slot as `tile.id_offset + k`. The same
//! combined mesh is drawn once per tile with a different `id_offset`.
//!
//! ```text
//! copies_per_tile = vertex_ceiling / source_vertex_count
//! tile_count      = ceil(capacity / copies_per_tile)
//! ```
//!
//! # Presets
//!
//! ```ignore
//! SourceMesh::cube()        // 24 vertices, flat shaded
//! SourceMesh::tetrahedron() // 12 vertices
//! SourceMesh::octahedron()  // 24 vertices
//! SourceMesh::quad()        // 4 vertices, facing +Z
//! ```

use std::ops::Range;

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};

use crate::error::{ParticleError, Result};

/// Default per-draw vertex ceiling (16-bit index range minus the restart value).
pub const VERTEX_CEILING: u32 = 65534;

/// Half-extent of the default culling box.
pub const DEFAULT_BOUNDS_HALF_EXTENT: f32 = 100.0;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Cube centred on the origin.
    pub fn cube(half_extent: f32) -> Self {
        Self {
            min: Vec3::splat(-half_extent),
            max: Vec3::splat(half_extent),
        }
    }

    /// Tight box around a point set. `None` for an empty set.
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let first = *points.first()?;
        Some(points.iter().fold(Self::new(first, first), |b, p| Self {
            min: b.min.min(*p),
            max: b.max.max(*p),
        }))
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Grow the box by `margin` on every side.
    pub fn expanded(&self, margin: f32) -> Self {
        Self {
            min: self.min - Vec3::splat(margin),
            max: self.max + Vec3::splat(margin),
        }
    }
}

/// A triangle-list mesh to be replicated once per particle.
///
/// Only `positions` and `indices` are required. Empty `normals` are
/// recalculated from the faces, empty `tangents` default to `(1, 0, 0, 1)` and
/// empty `uv0` to zero.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceMesh {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec4>,
    pub uv0: Vec<Vec2>,
    pub indices: Vec<u32>,
}

impl SourceMesh {
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        Self {
            positions,
            indices,
            ..Default::default()
        }
    }

    pub fn with_normals(mut self, normals: Vec<Vec3>) -> Self {
        self.normals = normals;
        self
    }

    pub fn with_tangents(mut self, tangents: Vec<Vec4>) -> Self {
        self.tangents = tangents;
        self
    }

    pub fn with_uv0(mut self, uv0: Vec<Vec2>) -> Self {
        self.uv0 = uv0;
        self
    }

    pub fn vertex_count(&self) -> u32 {
        self.positions.len() as u32
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Check that the mesh is a well-formed triangle list.
    pub fn validate(&self) -> Result<()> {
        let vertex_count = self.positions.len();
        if vertex_count == 0 {
            return Err(ParticleError::InvalidMesh("mesh has no vertices".into()));
        }
        if self.indices.is_empty() || self.indices.len() % 3 != 0 {
            return Err(ParticleError::InvalidMesh(format!(
                "index count {} is not a non-empty multiple of 3",
                self.indices.len()
            )));
        }
        if let Some(bad) = self.indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(ParticleError::InvalidMesh(format!(
                "index {bad} out of range for {vertex_count} vertices"
            )));
        }
        for (name, len) in [
            ("normals", self.normals.len()),
            ("tangents", self.tangents.len()),
            ("uv0", self.uv0.len()),
        ] {
            if len != 0 && len != vertex_count {
                return Err(ParticleError::InvalidMesh(format!(
                    "{name} has {len} entries, expected 0 or {vertex_count}"
                )));
            }
        }
        Ok(())
    }

    /// Area-weighted vertex normals computed from the triangles.
    pub fn recalculate_normals(&self) -> Vec<Vec3> {
        let mut normals = vec![Vec3::ZERO; self.positions.len()];
        for tri in self.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            let face = (self.positions[b] - self.positions[a]).cross(self.positions[c] - self.positions[a]);
            normals[a] += face;
            normals[b] += face;
            normals[c] += face;
        }
        normals
            .into_iter()
            .map(|n| n.try_normalize().unwrap_or(Vec3::Y))
            .collect()
    }

    /// Build a flat-shaded mesh from convex polygons (fan-triangulated).
    ///
    /// Each face gets its own vertices so normals stay sharp.
    pub fn from_faces(faces: &[&[Vec3]]) -> Self {
        let mut mesh = Self::default();
        for face in faces {
            if face.len() < 3 {
                continue;
            }
            let base = mesh.positions.len() as u32;
            let normal = (face[1] - face[0]).cross(face[2] - face[0]).normalize_or_zero();
            let tangent = (face[1] - face[0]).normalize_or_zero().extend(1.0);
            for (i, p) in face.iter().enumerate() {
                let angle = i as f32 / face.len() as f32 * std::f32::consts::TAU;
                mesh.positions.push(*p);
                mesh.normals.push(normal);
                mesh.tangents.push(tangent);
                mesh.uv0.push(Vec2::new(angle.cos(), angle.sin()) * 0.5 + 0.5);
            }
            for i in 1..face.len() as u32 - 1 {
                mesh.indices.extend_from_slice(&[base, base + i, base + i + 1]);
            }
        }
        mesh
    }

    /// Cube (6 faces, 24 vertices).
    pub fn cube() -> Self {
        let s = 0.5;
        let v000 = Vec3::new(-s, -s, -s);
        let v001 = Vec3::new(-s, -s, s);
        let v010 = Vec3::new(-s, s, -s);
        let v011 = Vec3::new(-s, s, s);
        let v100 = Vec3::new(s, -s, -s);
        let v101 = Vec3::new(s, -s, s);
        let v110 = Vec3::new(s, s, -s);
        let v111 = Vec3::new(s, s, s);

        Self::from_faces(&[
            &[v001, v101, v111, v011], // +Z
            &[v100, v000, v010, v110], // -Z
            &[v101, v100, v110, v111], // +X
            &[v000, v001, v011, v010], // -X
            &[v011, v111, v110, v010], // +Y
            &[v000, v100, v101, v001], // -Y
        ])
    }

    /// Tetrahedron (4 faces, 12 vertices).
    pub fn tetrahedron() -> Self {
        let s = 0.5;
        let v0 = Vec3::new(s, s, s);
        let v1 = Vec3::new(s, -s, -s);
        let v2 = Vec3::new(-s, s, -s);
        let v3 = Vec3::new(-s, -s, s);

        Self::from_faces(&[&[v0, v1, v2], &[v0, v3, v1], &[v0, v2, v3], &[v1, v3, v2]])
    }

    /// Octahedron (8 faces, 24 vertices).
    pub fn octahedron() -> Self {
        let s = 0.5;
        let px = Vec3::new(s, 0.0, 0.0);
        let nx = Vec3::new(-s, 0.0, 0.0);
        let py = Vec3::new(0.0, s, 0.0);
        let ny = Vec3::new(0.0, -s, 0.0);
        let pz = Vec3::new(0.0, 0.0, s);
        let nz = Vec3::new(0.0, 0.0, -s);

        Self::from_faces(&[
            &[py, pz, px],
            &[py, px, nz],
            &[py, nz, nx],
            &[py, nx, pz],
            &[ny, px, pz],
            &[ny, nz, px],
            &[ny, nx, nz],
            &[ny, pz, nx],
        ])
    }

    /// Unit quad in the XY plane facing +Z.
    pub fn quad() -> Self {
        let s = 0.5;
        Self::from_faces(&[&[
            Vec3::new(-s, -s, 0.0),
            Vec3::new(s, -s, 0.0),
            Vec3::new(s, s, 0.0),
            Vec3::new(-s, s, 0.0),
        ]])
    }
}

/// Interleaved vertex of the combined mesh.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 4],
    pub uv0: [f32; 2],
    /// `(copy, copy)`: the copy's index within its tile.
    pub uv1: [f32; 2],
}

impl MeshVertex {
    pub const ATTRIBUTES: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x3,
        2 => Float32x4,
        3 => Float32x2,
        4 => Float32x2
    ];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }

    /// Copy index stored in the second UV channel.
    pub fn copy_index(&self) -> u32 {
        self.uv1[0] as u32
    }
}

/// One draw unit: the combined mesh drawn with a fixed slot offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshTile {
    pub index: u32,
    /// First slot addressed by this tile (`index * copies_per_tile`).
    pub id_offset: u32,
    /// Slots this tile can show, clipped to the pool capacity.
    pub slot_range: Range<u32>,
}

impl MeshTile {
    /// Global slot for a copy in this tile, or `None` past the pool capacity.
    pub fn slot_for_copy(&self, copy: u32) -> Option<u32> {
        let slot = self.id_offset + copy;
        self.slot_range.contains(&slot).then_some(slot)
    }
}

/// The source mesh replicated to fill one draw call, plus its tile table.
///
/// Immutable once built. Rebuild when the source mesh or the capacity changes.
#[derive(Debug, Clone)]
pub struct CombinedMesh {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
    pub copies_per_tile: u32,
    pub tiles: Vec<MeshTile>,
    /// Culling bound. Instance positions are only known in the vertex stage,
    /// so this is an oversized fixed box rather than a tight fit.
    pub bounds: Aabb,
    capacity: u32,
    source_vertex_count: u32,
}

impl CombinedMesh {
    /// Replicate `source` into tiles covering `capacity` slots.
    pub fn build(source: &SourceMesh, capacity: u32, vertex_ceiling: u32) -> Result<Self> {
        source.validate()?;
        if capacity == 0 {
            return Err(ParticleError::InvalidConfig("capacity must be at least 1".into()));
        }

        let vertex_count = source.vertex_count();
        let copies_per_tile = vertex_ceiling / vertex_count;
        if copies_per_tile == 0 {
            return Err(ParticleError::CapacityMismatch {
                vertex_count,
                ceiling: vertex_ceiling,
            });
        }
        let tile_count = capacity.div_ceil(copies_per_tile);

        let template = copy_template(source);

        let mut vertices = Vec::with_capacity((copies_per_tile * vertex_count) as usize);
        let mut indices = Vec::with_capacity(copies_per_tile as usize * source.indices.len());
        for copy in 0..copies_per_tile {
            let id = copy as f32;
            vertices.extend(template.iter().map(|v| MeshVertex { uv1: [id, id], ..*v }));
            let base = copy * vertex_count;
            indices.extend(source.indices.iter().map(|i| base + i));
        }

        let tiles = (0..tile_count)
            .map(|index| {
                let id_offset = index * copies_per_tile;
                MeshTile {
                    index,
                    id_offset,
                    slot_range: id_offset..(id_offset + copies_per_tile).min(capacity),
                }
            })
            .collect();

        Ok(Self {
            vertices,
            indices,
            copies_per_tile,
            tiles,
            bounds: Aabb::cube(DEFAULT_BOUNDS_HALF_EXTENT),
            capacity,
            source_vertex_count: vertex_count,
        })
    }

    /// Replace the culling bound, e.g. with the known simulation extent.
    pub fn with_bounds(mut self, bounds: Aabb) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn tile_count(&self) -> u32 {
        self.tiles.len() as u32
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Vertices referenced by one tile draw.
    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn source_vertex_count(&self) -> u32 {
        self.source_vertex_count
    }

    /// Whether this mesh was built for a different capacity or from different
    /// source geometry. Compares the first copy's vertices and indices, so a
    /// moved or rescaled mesh with the same counts still needs a rebuild.
    pub fn needs_rebuild(&self, source: &SourceMesh, capacity: u32) -> bool {
        if self.capacity != capacity
            || self.source_vertex_count != source.vertex_count()
            || self.indices.get(..source.indices.len()) != Some(source.indices.as_slice())
        {
            return true;
        }
        let first_copy = &self.vertices[..self.source_vertex_count as usize];
        source.validate().is_err() || copy_template(source) != first_copy
    }
}

/// One copy of `source` as interleaved vertices, with `uv1` left at copy 0.
fn copy_template(source: &SourceMesh) -> Vec<MeshVertex> {
    let normals = if source.normals.is_empty() {
        source.recalculate_normals()
    } else {
        source.normals.clone()
    };

    (0..source.positions.len())
        .map(|i| MeshVertex {
            position: source.positions[i].to_array(),
            normal: normals[i].to_array(),
            tangent: source.tangents.get(i).copied().unwrap_or(Vec4::new(1.0, 0.0, 0.0, 1.0)).to_array(),
            uv0: source.uv0.get(i).copied().unwrap_or(Vec2::ZERO).to_array(),
            uv1: [0.0; 2],
        })
        .collect()
}
