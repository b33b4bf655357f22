use crate::{
    config::{ClassifierStrategy, DeformationConfig},
    culling::{
        kernel::{CullingKernel, CullingParams},
        partition::{IndexPartition, TrianglePartitioner},
    },
    error::DeformResult,
    mesh::MeshVertex,
    trace::maps::TraceTextures,
};
use bevy::{prelude::*, render::primitives::Aabb};

/// The per tick inputs of a classification.
#[derive(Clone, Copy)]
pub struct ClassifyInputs<'a> {
    pub local_to_world: Mat4,
    pub target_position: Vec3,
    pub traces: Option<&'a TraceTextures>,
}

/// Buffers sized to the triangle count, allocated while the mesh is active.
struct ClassifierScratch {
    flags: Vec<u32>,
    partitioner: TrianglePartitioner,
}

/// Splits the triangles of a mesh into the ones that need tessellation and the rest.
pub struct TriangleClassifier {
    strategy: ClassifierStrategy,
    bound_size: Vec3,
    bound_radius: f32,
    trace_threshold: f32,
    kernel: Box<dyn CullingKernel>,
    scratch: Option<ClassifierScratch>,
}

impl TriangleClassifier {
    pub fn new(config: &DeformationConfig, kernel: Box<dyn CullingKernel>) -> Self {
        Self {
            strategy: config.strategy,
            bound_size: config.bound_size(),
            bound_radius: config.cull_bound_radius(),
            trace_threshold: config.trace_threshold,
            kernel,
            scratch: None,
        }
    }

    #[inline]
    pub fn strategy(&self) -> ClassifierStrategy {
        self.strategy
    }

    #[inline]
    pub fn is_allocated(&self) -> bool {
        self.scratch.is_some()
    }

    /// Allocates the classification buffer and the partition arenas for the given geometry.
    pub fn allocate(&mut self, vertices: &[MeshVertex], indices: &[u32]) {
        let triangle_count = indices.len() / 3;

        if self.strategy == ClassifierStrategy::Gpu {
            self.kernel.bind_geometry(vertices, indices);
        }

        self.scratch = Some(ClassifierScratch {
            flags: vec![0; triangle_count],
            partitioner: TrianglePartitioner::new(triangle_count),
        });
    }

    /// Frees all buffers, calling it on a released classifier does nothing.
    pub fn release(&mut self) {
        if self.scratch.take().is_some() {
            self.kernel.release();
        }
    }

    /// Classifies every triangle of `indices` and writes both groups into `output`.
    ///
    /// Without allocated buffers or triangles both groups are left empty.
    pub fn classify(
        &mut self,
        vertices: &[MeshVertex],
        indices: &[u32],
        inputs: ClassifyInputs,
        output: &mut IndexPartition,
    ) -> DeformResult<()> {
        output.affected.clear();
        output.unaffected.clear();

        let Some(scratch) = self.scratch.as_mut() else {
            return Ok(());
        };

        if scratch.partitioner.triangle_count() == 0 {
            return Ok(());
        }

        match self.strategy {
            ClassifierStrategy::Gpu => {
                let params = CullingParams {
                    target_position: inputs.target_position,
                    bound_radius: self.bound_radius,
                    trace_threshold: self.trace_threshold,
                    local_to_world: inputs.local_to_world,
                    traces: inputs.traces,
                    triangle_count: scratch.partitioner.triangle_count(),
                };

                // blocks until the flags are in host memory
                self.kernel.dispatch(&params)?.wait(&mut scratch.flags)?;

                scratch
                    .partitioner
                    .partition_flags(indices, &scratch.flags, output);
            }
            ClassifierStrategy::Cpu => {
                let bounds = Aabb::from_min_max(
                    inputs.target_position - self.bound_size * 0.5,
                    inputs.target_position + self.bound_size * 0.5,
                );
                let (min, max) = (Vec3::from(bounds.min()), Vec3::from(bounds.max()));
                let local_to_world = inputs.local_to_world;

                scratch.partitioner.partition(
                    indices,
                    |triangle| {
                        indices[triangle * 3..triangle * 3 + 3].iter().any(|&index| {
                            let position = local_to_world
                                .transform_point3(vertices[index as usize].position());
                            position.cmpge(min).all() && position.cmple(max).all()
                        })
                    },
                    output,
                );
            }
        }

        Ok(())
    }
}
