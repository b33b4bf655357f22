//! This module contains the CPU side geometry of a deformable mesh.
//!
//! A [`SourceMesh`] is the immutable reference geometry, shared with the renderer.
//! While a mesh is active, the [`VertexCache`](vertex_cache::VertexCache) interleaves its
//! attributes once and the [`MeshRebuilder`](rebuilder::MeshRebuilder) keeps the
//! [`TessellatedMesh`](tessellated_mesh::TessellatedMesh) in sync with the latest
//! triangle partition.

use crate::error::{DeformError, DeformResult};
use bevy::{
    prelude::*,
    render::mesh::{Indices, VertexAttributeValues},
};
use bytemuck::{Pod, Zeroable};

pub mod rebuilder;
pub mod tessellated_mesh;
pub mod vertex_cache;

/// The interleaved vertex layout uploaded to the tessellated mesh.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Zeroable, Pod)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

impl MeshVertex {
    #[inline]
    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    #[inline]
    pub fn uv(&self) -> Vec2 {
        Vec2::from_array(self.uv)
    }
}

/// The immutable reference geometry of a deformable mesh.
#[derive(Clone, Debug, Default)]
pub struct SourceMesh {
    positions: Vec<Vec3>,
    uvs: Vec<Vec2>,
    indices: Vec<u32>,
}

impl SourceMesh {
    /// Creates a source mesh, rejecting inconsistent attribute and index arrays.
    pub fn new(positions: Vec<Vec3>, uvs: Vec<Vec2>, indices: Vec<u32>) -> DeformResult<Self> {
        let mesh = Self {
            positions,
            uvs,
            indices,
        };
        mesh.validate()?;
        Ok(mesh)
    }

    /// Reads positions, uvs and triangle indices from a bevy [`Mesh`].
    pub fn from_bevy_mesh(mesh: &Mesh) -> DeformResult<Self> {
        let positions = match mesh.attribute(Mesh::ATTRIBUTE_POSITION) {
            Some(VertexAttributeValues::Float32x3(positions)) => {
                positions.iter().copied().map(Vec3::from_array).collect()
            }
            _ => return Err(DeformError::MissingAttribute("position")),
        };

        let uvs = match mesh.attribute(Mesh::ATTRIBUTE_UV_0) {
            Some(VertexAttributeValues::Float32x2(uvs)) => {
                uvs.iter().copied().map(Vec2::from_array).collect()
            }
            _ => return Err(DeformError::MissingAttribute("uv")),
        };

        let indices = match mesh.indices() {
            Some(Indices::U32(indices)) => indices.clone(),
            Some(Indices::U16(indices)) => indices.iter().map(|&index| index as u32).collect(),
            None => return Err(DeformError::MissingAttribute("indices")),
        };

        Self::new(positions, uvs, indices)
    }

    fn validate(&self) -> DeformResult<()> {
        if self.positions.len() != self.uvs.len() {
            return Err(DeformError::MismatchedAttributes {
                positions: self.positions.len(),
                uvs: self.uvs.len(),
            });
        }

        if self.indices.len() % 3 != 0 {
            return Err(DeformError::PartialTriangle(self.indices.len()));
        }

        if let Some(&index) = self
            .indices
            .iter()
            .find(|&&index| index as usize >= self.positions.len())
        {
            return Err(DeformError::IndexOutOfRange {
                index,
                vertex_count: self.positions.len(),
            });
        }

        Ok(())
    }

    #[inline]
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    #[inline]
    pub fn uvs(&self) -> &[Vec2] {
        &self.uvs
    }

    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}
