use crate::{
    error::{DeformError, DeformResult},
    mesh::MeshVertex,
    trace::maps::TraceTextures,
};
use async_channel::{Receiver, Sender};
use bevy::prelude::*;
use rayon::prelude::*;
use std::sync::Arc;

/// The uniforms bound for a single culling dispatch.
#[derive(Clone, Copy)]
pub struct CullingParams<'a> {
    pub target_position: Vec3,
    /// Side length of the square around the target, in which triangles are considered.
    pub bound_radius: f32,
    /// Minimal trace depth for a vertex to count as pressed.
    pub trace_threshold: f32,
    pub local_to_world: Mat4,
    pub traces: Option<&'a TraceTextures>,
    pub triangle_count: usize,
}

/// A pending copy of the classification buffer into host memory.
///
/// The kernel side sends the raw buffer contents once they are mapped.
pub struct ReadbackRequest {
    receiver: Receiver<Vec<u8>>,
}

impl ReadbackRequest {
    pub fn channel() -> (Sender<Vec<u8>>, Self) {
        let (sender, receiver) = async_channel::bounded(1);
        (sender, Self { receiver })
    }

    /// Blocks until the buffer is mapped and copies one flag per triangle into `flags`.
    pub fn wait(self, flags: &mut [u32]) -> DeformResult<()> {
        let data = self
            .receiver
            .recv_blocking()
            .map_err(|error| DeformError::Readback(error.to_string()))?;

        let expected = flags.len() * size_of::<u32>();
        if data.len() != expected {
            return Err(DeformError::ReadbackSize {
                expected: flags.len(),
                actual: data.len() / size_of::<u32>(),
            });
        }

        bytemuck::cast_slice_mut::<u32, u8>(flags).copy_from_slice(&data);
        Ok(())
    }
}

/// A compute kernel writing one classification flag per triangle.
///
/// Geometry is bound once per activation, the dispatch runs every tick.
pub trait CullingKernel: Send + Sync {
    fn bind_geometry(&mut self, vertices: &[MeshVertex], indices: &[u32]);

    /// Starts classifying `params.triangle_count` triangles.
    fn dispatch(&mut self, params: &CullingParams) -> DeformResult<ReadbackRequest>;

    /// Frees the bound geometry, calling it without bound geometry does nothing.
    fn release(&mut self);
}

/// Evaluates the culling kernel on the CPU.
///
/// A triangle is flagged when any of its vertices lies in the xz square around the target
/// and the trace heightmap holds a depth above the threshold at that vertex.
#[derive(Default)]
pub struct SoftwareCullingKernel {
    geometry: Option<(Arc<[MeshVertex]>, Arc<[u32]>)>,
}

impl SoftwareCullingKernel {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_bound(&self) -> bool {
        self.geometry.is_some()
    }
}

impl CullingKernel for SoftwareCullingKernel {
    fn bind_geometry(&mut self, vertices: &[MeshVertex], indices: &[u32]) {
        self.geometry = Some((vertices.into(), indices.into()));
    }

    fn dispatch(&mut self, params: &CullingParams) -> DeformResult<ReadbackRequest> {
        let (vertices, indices) = self
            .geometry
            .as_ref()
            .ok_or_else(|| DeformError::Readback("no geometry bound".into()))?;
        let traces = params
            .traces
            .ok_or_else(|| DeformError::Readback("no trace heightmap bound".into()))?;

        let half_size = params.bound_radius * 0.5;
        let target = params.target_position.xz();

        let flags: Vec<u32> = indices
            .par_chunks_exact(3)
            .take(params.triangle_count)
            .map(|triangle| {
                let pressed = triangle.iter().any(|&index| {
                    let position = params
                        .local_to_world
                        .transform_point3(vertices[index as usize].position())
                        .xz();
                    let offset = (position - target).abs();

                    offset.max_element() <= half_size
                        && traces.sample_depth(position) > params.trace_threshold
                });

                pressed as u32
            })
            .collect();

        let (sender, request) = ReadbackRequest::channel();
        sender
            .try_send(bytemuck::cast_slice(&flags).to_vec())
            .map_err(|error| DeformError::Readback(error.to_string()))?;

        Ok(request)
    }

    fn release(&mut self) {
        self.geometry = None;
    }
}
