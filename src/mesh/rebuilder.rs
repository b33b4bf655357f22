use crate::{
    config::SubmeshLayout,
    culling::partition::IndexPartition,
    error::DeformResult,
    mesh::{
        tessellated_mesh::{
            MeshUpdateFlags, SubMeshDescriptor, TessellatedMesh, DEFORMABLE_VERTEX_LAYOUT,
        },
        MeshVertex,
    },
};

/// The submesh holding the triangles rendered without tessellation.
pub const UNAFFECTED_SUBMESH: usize = 0;
/// The submesh holding the triangles rendered with tessellation.
pub const AFFECTED_SUBMESH: usize = 1;

/// Keeps the tessellated mesh in sync with the latest triangle partition.
pub struct MeshRebuilder {
    layout: SubmeshLayout,
    mesh: Option<TessellatedMesh>,
}

impl MeshRebuilder {
    pub fn new(layout: SubmeshLayout) -> Self {
        Self { layout, mesh: None }
    }

    /// Creates an empty tessellated mesh, the vertices are uploaded by the first rebuild.
    pub fn allocate(&mut self) {
        self.mesh = Some(TessellatedMesh::new(self.layout.submesh_count()));
    }

    /// Drops the tessellated mesh, calling it without a mesh does nothing.
    pub fn release(&mut self) {
        self.mesh = None;
    }

    #[inline]
    pub fn mesh(&self) -> Option<&TessellatedMesh> {
        self.mesh.as_ref()
    }

    #[inline]
    pub fn layout(&self) -> SubmeshLayout {
        self.layout
    }

    /// Uploads the index groups of `partition` and recomputes the derived geometry.
    ///
    /// The vertex layout and data are only uploaded on the first call after allocation.
    pub fn rebuild(&mut self, vertices: &[MeshVertex], partition: &IndexPartition) -> DeformResult<()> {
        let layout = self.layout;
        let mesh = self.mesh.get_or_insert_with(|| TessellatedMesh::new(layout.submesh_count()));

        if !mesh.is_layout_declared() {
            mesh.set_vertex_buffer_params(vertices.len(), &DEFORMABLE_VERTEX_LAYOUT);
            mesh.set_vertex_buffer_data(vertices, 0)?;
        }

        let unaffected = partition.unaffected.len();
        let affected = match layout {
            SubmeshLayout::Dual => partition.affected.len(),
            SubmeshLayout::UnaffectedOnly => 0,
        };

        // the partition only contains source indices, which were validated on activation
        let flags = MeshUpdateFlags::DONT_VALIDATE_INDICES;

        mesh.set_index_buffer_params(unaffected + affected);
        mesh.set_index_buffer_data(&partition.unaffected, 0, flags)?;
        mesh.set_sub_mesh(UNAFFECTED_SUBMESH, SubMeshDescriptor::new(0, unaffected))?;

        if layout == SubmeshLayout::Dual {
            mesh.set_index_buffer_data(&partition.affected, unaffected, flags)?;
            mesh.set_sub_mesh(AFFECTED_SUBMESH, SubMeshDescriptor::new(unaffected, affected))?;
        }

        mesh.recalculate_bounds();
        mesh.recalculate_normals();
        mesh.recalculate_tangents();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        culling::partition::TrianglePartitioner,
        mesh::{tests::grid_mesh, vertex_cache::VertexCache},
    };
    use bevy::prelude::*;

    fn split_grid(size: u32, is_affected: impl Fn(usize) -> bool + Sync) -> (Vec<MeshVertex>, IndexPartition) {
        let source = grid_mesh(size);
        let mut cache = VertexCache::default();
        let vertices = cache.build(&source).unwrap().clone();

        let mut partition = IndexPartition::default();
        TrianglePartitioner::new(source.triangle_count()).partition(
            source.indices(),
            is_affected,
            &mut partition,
        );

        (vertices, partition)
    }

    #[test]
    fn dual_layout_declares_both_groups() {
        let (vertices, partition) = split_grid(4, |triangle| triangle < 4);
        let mut rebuilder = MeshRebuilder::new(SubmeshLayout::Dual);
        rebuilder.allocate();
        rebuilder.rebuild(&vertices, &partition).unwrap();

        let mesh = rebuilder.mesh().unwrap();
        assert_eq!(mesh.vertices(), vertices.as_slice());
        assert_eq!(mesh.indices().len(), 96);
        assert_eq!(mesh.submeshes()[UNAFFECTED_SUBMESH], SubMeshDescriptor::new(0, 84));
        assert_eq!(mesh.submeshes()[AFFECTED_SUBMESH], SubMeshDescriptor::new(84, 12));
        assert_eq!(
            mesh.submesh_indices(AFFECTED_SUBMESH).unwrap(),
            partition.affected.as_slice()
        );
        assert_eq!(Vec3::from(mesh.bounds().max()), Vec3::new(4.0, 0.0, 4.0));
        assert_eq!(mesh.normals().len(), vertices.len());
        assert_eq!(mesh.tangents().len(), vertices.len());
    }

    #[test]
    fn unaffected_only_layout_drops_the_affected_group() {
        let (vertices, partition) = split_grid(2, |triangle| triangle % 2 == 0);
        let mut rebuilder = MeshRebuilder::new(SubmeshLayout::UnaffectedOnly);
        rebuilder.rebuild(&vertices, &partition).unwrap();

        let mesh = rebuilder.mesh().unwrap();
        assert_eq!(mesh.submeshes().len(), 1);
        assert_eq!(mesh.indices(), partition.unaffected.as_slice());
    }

    #[test]
    fn empty_groups_produce_empty_submeshes() {
        let (vertices, partition) = split_grid(2, |_| false);
        let mut rebuilder = MeshRebuilder::new(SubmeshLayout::Dual);
        rebuilder.allocate();
        rebuilder.rebuild(&vertices, &partition).unwrap();

        let mesh = rebuilder.mesh().unwrap();
        assert_eq!(mesh.submeshes()[AFFECTED_SUBMESH], SubMeshDescriptor::new(24, 0));

        rebuilder.rebuild(&vertices, &IndexPartition::default()).unwrap();
        let mesh = rebuilder.mesh().unwrap();
        assert!(mesh.indices().is_empty());
        assert_eq!(mesh.submeshes()[UNAFFECTED_SUBMESH], SubMeshDescriptor::new(0, 0));
    }

    #[test]
    fn vertices_are_uploaded_once() {
        let (vertices, partition) = split_grid(1, |_| true);
        let mut rebuilder = MeshRebuilder::new(SubmeshLayout::Dual);
        rebuilder.allocate();
        rebuilder.rebuild(&vertices, &partition).unwrap();

        // later rebuilds keep the uploaded vertex data
        rebuilder.rebuild(&[], &partition).unwrap();
        assert_eq!(rebuilder.mesh().unwrap().vertices().len(), 4);

        rebuilder.release();
        rebuilder.release();
        assert!(rebuilder.mesh().is_none());
    }
}
