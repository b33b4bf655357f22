use crate::{
    error::{DeformError, DeformResult},
    mesh::MeshVertex,
};
use bevy::{
    prelude::*,
    render::{
        mesh::{Indices, PrimitiveTopology},
        primitives::Aabb,
        render_asset::RenderAssetUsages,
        render_resource::VertexFormat,
    },
};
use itertools::Itertools;

bitflags::bitflags! {
    /// Flags controlling the checks performed while uploading mesh data.
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct MeshUpdateFlags: u32 {
        const NONE                  = 0;
        /// Skips checking the uploaded indices against the vertex count.
        const DONT_VALIDATE_INDICES = (1 << 0);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VertexAttribute {
    Position,
    TexCoord0,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexAttributeDescriptor {
    pub attribute: VertexAttribute,
    pub format: VertexFormat,
}

/// The layout of [`MeshVertex`]: a three component position followed by a two component uv.
pub const DEFORMABLE_VERTEX_LAYOUT: [VertexAttributeDescriptor; 2] = [
    VertexAttributeDescriptor {
        attribute: VertexAttribute::Position,
        format: VertexFormat::Float32x3,
    },
    VertexAttributeDescriptor {
        attribute: VertexAttribute::TexCoord0,
        format: VertexFormat::Float32x2,
    },
];

/// A sub-range of the index buffer rendered as an independent draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubMeshDescriptor {
    pub index_start: usize,
    pub index_count: usize,
    pub topology: PrimitiveTopology,
}

impl SubMeshDescriptor {
    pub fn new(index_start: usize, index_count: usize) -> Self {
        Self {
            index_start,
            index_count,
            topology: PrimitiveTopology::TriangleList,
        }
    }

    #[inline]
    pub fn range(&self) -> std::ops::Range<usize> {
        self.index_start..self.index_start + self.index_count
    }
}

/// The CPU mirror of the renderable mesh of an active deformable mesh.
///
/// The vertex buffer is uploaded once, while the index buffer and the submeshes change every tick.
/// Bounds, normals and tangents are derived from the currently declared submeshes and have to be
/// recalculated after the topology changed.
pub struct TessellatedMesh {
    layout: Vec<VertexAttributeDescriptor>,
    vertices: Vec<MeshVertex>,
    indices: Vec<u32>,
    submeshes: Vec<SubMeshDescriptor>,
    bounds: Aabb,
    normals: Vec<Vec3>,
    tangents: Vec<Vec4>,
}

impl TessellatedMesh {
    pub fn new(submesh_count: usize) -> Self {
        Self {
            layout: Vec::new(),
            vertices: Vec::new(),
            indices: Vec::new(),
            submeshes: vec![SubMeshDescriptor::new(0, 0); submesh_count],
            bounds: Aabb::default(),
            normals: Vec::new(),
            tangents: Vec::new(),
        }
    }

    /// Declares the vertex layout and resizes the vertex buffer to `vertex_count` zeroed vertices.
    pub fn set_vertex_buffer_params(
        &mut self,
        vertex_count: usize,
        layout: &[VertexAttributeDescriptor],
    ) {
        self.layout = layout.to_vec();
        self.vertices.clear();
        self.vertices.resize(vertex_count, MeshVertex::default());
        self.normals.clear();
        self.tangents.clear();
    }

    pub fn set_vertex_buffer_data(&mut self, data: &[MeshVertex], start: usize) -> DeformResult<()> {
        let end = start + data.len();

        if end > self.vertices.len() {
            return Err(DeformError::UploadOutOfRange {
                start,
                len: data.len(),
                size: self.vertices.len(),
            });
        }

        self.vertices[start..end].copy_from_slice(data);
        Ok(())
    }

    /// Resizes the 32 bit index buffer to `index_count` indices.
    ///
    /// All submeshes are reset to empty ranges and have to be declared again.
    pub fn set_index_buffer_params(&mut self, index_count: usize) {
        self.indices.clear();
        self.indices.resize(index_count, 0);
        self.submeshes
            .iter_mut()
            .for_each(|submesh| *submesh = SubMeshDescriptor::new(0, 0));
    }

    pub fn set_index_buffer_data(
        &mut self,
        data: &[u32],
        start: usize,
        flags: MeshUpdateFlags,
    ) -> DeformResult<()> {
        let end = start + data.len();

        if end > self.indices.len() {
            return Err(DeformError::UploadOutOfRange {
                start,
                len: data.len(),
                size: self.indices.len(),
            });
        }

        if !flags.contains(MeshUpdateFlags::DONT_VALIDATE_INDICES) {
            let vertex_count = self.vertices.len();

            if let Some(&index) = data.iter().find(|&&index| index as usize >= vertex_count) {
                return Err(DeformError::IndexOutOfRange {
                    index,
                    vertex_count,
                });
            }
        }

        self.indices[start..end].copy_from_slice(data);
        Ok(())
    }

    pub fn set_sub_mesh(&mut self, index: usize, descriptor: SubMeshDescriptor) -> DeformResult<()> {
        let index_count = self.indices.len();
        let range = descriptor.range();

        if range.end > index_count {
            return Err(DeformError::SubMeshRange {
                start: range.start,
                end: range.end,
                index_count,
            });
        }

        let submesh = self
            .submeshes
            .get_mut(index)
            .ok_or(DeformError::UnknownSubMesh(index))?;
        *submesh = descriptor;

        Ok(())
    }

    /// Iterates over the triangles of all declared submeshes.
    fn triangles(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        self.submeshes.iter().flat_map(|submesh| {
            self.indices[submesh.range()]
                .chunks_exact(3)
                .map(|triangle| {
                    [
                        triangle[0] as usize,
                        triangle[1] as usize,
                        triangle[2] as usize,
                    ]
                })
        })
    }

    /// Recomputes the bounds from the vertices referenced by the submeshes.
    pub fn recalculate_bounds(&mut self) {
        let bounds = self
            .triangles()
            .flatten()
            .map(|index| self.vertices[index].position())
            .fold(None, |bounds: Option<(Vec3, Vec3)>, position| match bounds {
                Some((min, max)) => Some((min.min(position), max.max(position))),
                None => Some((position, position)),
            });

        self.bounds = match bounds {
            Some((min, max)) => Aabb::from_min_max(min, max),
            None => Aabb::default(),
        };
    }

    /// Recomputes area weighted vertex normals. Unreferenced vertices get a zero normal.
    pub fn recalculate_normals(&mut self) {
        let mut normals = vec![Vec3::ZERO; self.vertices.len()];

        for [a, b, c] in self.triangles() {
            let (pa, pb, pc) = (
                self.vertices[a].position(),
                self.vertices[b].position(),
                self.vertices[c].position(),
            );
            let normal = (pb - pa).cross(pc - pa);

            normals[a] += normal;
            normals[b] += normal;
            normals[c] += normal;
        }

        normals
            .iter_mut()
            .for_each(|normal| *normal = normal.normalize_or_zero());

        self.normals = normals;
    }

    /// Recomputes tangents from the uv derivatives of each triangle.
    ///
    /// Requires up to date normals, the w component stores the handedness of the bitangent.
    pub fn recalculate_tangents(&mut self) {
        if self.normals.len() != self.vertices.len() {
            self.recalculate_normals();
        }

        let mut tangents = vec![Vec3::ZERO; self.vertices.len()];
        let mut bitangents = vec![Vec3::ZERO; self.vertices.len()];

        for triangle in self.triangles() {
            let [a, b, c] = triangle.map(|index| self.vertices[index]);

            let (e1, e2) = (b.position() - a.position(), c.position() - a.position());
            let (d1, d2) = (b.uv() - a.uv(), c.uv() - a.uv());

            let determinant = d1.x * d2.y - d2.x * d1.y;

            if determinant.abs() <= f32::EPSILON {
                continue;
            }

            let r = 1.0 / determinant;
            let tangent = (e1 * d2.y - e2 * d1.y) * r;
            let bitangent = (e2 * d1.x - e1 * d2.x) * r;

            for index in triangle {
                tangents[index] += tangent;
                bitangents[index] += bitangent;
            }
        }

        self.tangents = tangents
            .into_iter()
            .zip_eq(bitangents)
            .zip_eq(&self.normals)
            .map(|((tangent, bitangent), &normal)| {
                let tangent = (tangent - normal * normal.dot(tangent)).normalize_or_zero();
                let handedness = if normal.cross(tangent).dot(bitangent) < 0.0 {
                    -1.0
                } else {
                    1.0
                };

                tangent.extend(handedness)
            })
            .collect();
    }

    #[inline]
    pub fn layout(&self) -> &[VertexAttributeDescriptor] {
        &self.layout
    }

    #[inline]
    pub fn is_layout_declared(&self) -> bool {
        !self.layout.is_empty()
    }

    #[inline]
    pub fn vertices(&self) -> &[MeshVertex] {
        &self.vertices
    }

    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    #[inline]
    pub fn submeshes(&self) -> &[SubMeshDescriptor] {
        &self.submeshes
    }

    pub fn submesh_indices(&self, index: usize) -> DeformResult<&[u32]> {
        let submesh = self
            .submeshes
            .get(index)
            .ok_or(DeformError::UnknownSubMesh(index))?;

        Ok(&self.indices[submesh.range()])
    }

    #[inline]
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    #[inline]
    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    #[inline]
    pub fn tangents(&self) -> &[Vec4] {
        &self.tangents
    }

    /// Converts one submesh into a bevy [`Mesh`] sharing the full vertex buffer.
    pub fn to_bevy_mesh(&self, submesh: usize) -> DeformResult<Mesh> {
        let positions = self.vertices.iter().map(|vertex| vertex.position).collect_vec();
        let uvs = self.vertices.iter().map(|vertex| vertex.uv).collect_vec();

        let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default())
            .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, positions)
            .with_inserted_attribute(Mesh::ATTRIBUTE_UV_0, uvs);

        self.update_bevy_mesh(submesh, &mut mesh)?;
        Ok(mesh)
    }

    /// Writes the indices of one submesh and the derived attributes into a mesh created by
    /// [`TessellatedMesh::to_bevy_mesh`].
    ///
    /// Positions and uvs are left untouched, they only change with a new activation.
    pub fn update_bevy_mesh(&self, submesh: usize, mesh: &mut Mesh) -> DeformResult<()> {
        let indices = self.submesh_indices(submesh)?.to_vec();
        mesh.insert_indices(Indices::U32(indices));

        if self.normals.len() == self.vertices.len() {
            let normals = self.normals.iter().map(|normal| normal.to_array()).collect_vec();
            mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, normals);
        } else {
            mesh.remove_attribute(Mesh::ATTRIBUTE_NORMAL);
        }

        if self.tangents.len() == self.vertices.len() {
            let tangents = self.tangents.iter().map(|tangent| tangent.to_array()).collect_vec();
            mesh.insert_attribute(Mesh::ATTRIBUTE_TANGENT, tangents);
        } else {
            mesh.remove_attribute(Mesh::ATTRIBUTE_TANGENT);
        }

        Ok(())
    }
}
