use crate::error::{DeformError, DeformResult};
use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};

/// The triangles of a mesh split into the affected and the unaffected group.
///
/// Each group stores whole triangles (three indices each) in their original winding.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexPartition {
    pub affected: Vec<u32>,
    pub unaffected: Vec<u32>,
}

impl IndexPartition {
    #[inline]
    pub fn len(&self) -> usize {
        self.affected.len() + self.unaffected.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn affected_triangle_count(&self) -> usize {
        self.affected.len() / 3
    }

    #[inline]
    pub fn unaffected_triangle_count(&self) -> usize {
        self.unaffected.len() / 3
    }

    /// Checks that the partition covers all `index_count` source indices.
    pub fn ensure_complete(&self, index_count: usize) -> DeformResult<()> {
        if self.len() != index_count {
            return Err(DeformError::IncompletePartition {
                expected: index_count,
                actual: self.len(),
            });
        }

        Ok(())
    }
}

/// A fixed capacity index arena, filled concurrently by claiming whole triangle slots.
struct TriangleArena {
    /// The number of claimed triangle slots.
    cursor: AtomicU32,
    indices: Vec<AtomicU32>,
}

impl TriangleArena {
    fn with_capacity(triangle_count: usize) -> Self {
        Self {
            cursor: AtomicU32::new(0),
            indices: (0..triangle_count * 3).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    fn push(&self, triangle: &[u32]) {
        let slot = self.cursor.fetch_add(1, Ordering::Relaxed) as usize * 3;

        for (entry, &index) in self.indices[slot..slot + 3].iter().zip(triangle) {
            entry.store(index, Ordering::Relaxed);
        }
    }

    fn drain_into(&mut self, output: &mut Vec<u32>) {
        let count = *self.cursor.get_mut() as usize * 3;

        output.clear();
        output.extend(self.indices[..count].iter_mut().map(|index| *index.get_mut()));

        *self.cursor.get_mut() = 0;
    }
}

/// Splits triangles into two groups in parallel, based on one flag per triangle.
///
/// The arenas are sized for the worst case (all triangles in one group) once, so that no
/// reallocation happens while workers write concurrently. Every triangle claims its slot with an
/// atomic increment of the group cursor, so the order inside a group depends on scheduling.
pub struct TrianglePartitioner {
    affected: TriangleArena,
    unaffected: TriangleArena,
    triangle_count: usize,
}

impl TrianglePartitioner {
    pub fn new(triangle_count: usize) -> Self {
        Self {
            affected: TriangleArena::with_capacity(triangle_count),
            unaffected: TriangleArena::with_capacity(triangle_count),
            triangle_count,
        }
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.triangle_count
    }

    /// Partitions the triangles of `indices` according to `is_affected`, evaluated once per
    /// triangle index.
    pub fn partition(
        &mut self,
        indices: &[u32],
        is_affected: impl Fn(usize) -> bool + Sync,
        output: &mut IndexPartition,
    ) {
        debug_assert_eq!(indices.len(), self.triangle_count * 3);

        let (affected, unaffected) = (&self.affected, &self.unaffected);

        indices
            .par_chunks_exact(3)
            .enumerate()
            .for_each(|(triangle, vertices)| {
                if is_affected(triangle) {
                    affected.push(vertices);
                } else {
                    unaffected.push(vertices);
                }
            });

        // the parallel iterator has joined all workers at this point
        self.affected.drain_into(&mut output.affected);
        self.unaffected.drain_into(&mut output.unaffected);
    }

    /// Partitions based on a classification buffer holding `0` (unaffected) or `1` (affected).
    pub fn partition_flags(&mut self, indices: &[u32], flags: &[u32], output: &mut IndexPartition) {
        self.partition(indices, |triangle| flags[triangle] != 0, output);
    }
}
