use crate::{
    error::{DeformError, DeformResult},
    mesh::{MeshVertex, SourceMesh},
};
use rayon::prelude::*;

/// The interleaved attributes of every source vertex, immutable once built.
pub type VertexAttributeBuffer = Vec<MeshVertex>;

/// Owns the interleaved vertex attributes of a mesh while it is active.
#[derive(Default)]
pub struct VertexCache {
    buffer: Option<VertexAttributeBuffer>,
}

impl VertexCache {
    /// Interleaves positions and uvs of the source mesh.
    ///
    /// A previously built buffer is replaced.
    pub fn build(&mut self, source: &SourceMesh) -> DeformResult<&VertexAttributeBuffer> {
        let (positions, uvs) = (source.positions(), source.uvs());

        if positions.len() != uvs.len() {
            return Err(DeformError::MismatchedAttributes {
                positions: positions.len(),
                uvs: uvs.len(),
            });
        }

        let buffer = positions
            .par_iter()
            .zip(uvs.par_iter())
            .map(|(position, uv)| MeshVertex {
                position: position.to_array(),
                uv: uv.to_array(),
            })
            .collect();

        Ok(&*self.buffer.insert(buffer))
    }

    /// Frees the buffer, calling it without a built buffer does nothing.
    pub fn release(&mut self) {
        self.buffer = None;
    }

    #[inline]
    pub fn get(&self) -> Option<&VertexAttributeBuffer> {
        self.buffer.as_ref()
    }

    #[inline]
    pub fn is_built(&self) -> bool {
        self.buffer.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::tests::grid_mesh;

    #[test]
    fn interleaves_attributes_in_vertex_order() {
        let source = grid_mesh(2);
        let mut cache = VertexCache::default();

        let buffer = cache.build(&source).unwrap();
        assert_eq!(buffer.len(), source.vertex_count());

        for (vertex, (position, uv)) in buffer
            .iter()
            .zip(source.positions().iter().zip(source.uvs()))
        {
            assert_eq!(vertex.position(), *position);
            assert_eq!(vertex.uv(), *uv);
        }
    }

    #[test]
    fn release_is_idempotent() {
        let mut cache = VertexCache::default();
        cache.release();
        assert!(!cache.is_built());

        cache.build(&grid_mesh(1)).unwrap();
        assert!(cache.is_built());

        cache.release();
        cache.release();
        assert!(cache.get().is_none());
    }
}
