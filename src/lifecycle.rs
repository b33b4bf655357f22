use crate::{
    config::{ClassifierStrategy, DeformationConfig},
    culling::{
        classifier::{ClassifyInputs, TriangleClassifier},
        kernel::CullingKernel,
        partition::IndexPartition,
        spatial_gate::{GateZone, SpatialGate},
    },
    error::{DeformError, DeformResult},
    mesh::{
        rebuilder::MeshRebuilder, tessellated_mesh::TessellatedMesh, vertex_cache::VertexCache,
        SourceMesh,
    },
    trace::maps::TraceTextures,
};
use bevy::prelude::*;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ActivationState {
    #[default]
    Inactive,
    Active,
}

/// The mesh the renderer of the owner should draw.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MeshBinding {
    #[default]
    Original,
    Tessellated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Activated,
    Deactivated,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    /// No classification ran this tick.
    Idle,
    Rebuilt {
        affected_triangles: usize,
        unaffected_triangles: usize,
    },
    /// The classification or the rebuild failed, the previous mesh stays in place.
    Skipped(DeformError),
    ActivationFailed(DeformError),
}

/// Summarizes what a single [`LifecycleController::tick`] did.
#[derive(Clone, Debug, PartialEq)]
pub struct TickReport {
    pub zone: GateZone,
    pub transition: Option<Transition>,
    pub outcome: TickOutcome,
}

/// Drives a single deformable mesh through its `Inactive -> Active -> Inactive` lifecycle.
///
/// All buffers of the pipeline (vertex cache, classification scratch and tessellated mesh) are
/// allocated when the mesh is activated and freed when it is deactivated, nowhere else.
pub struct LifecycleController {
    gate: SpatialGate,
    strategy: ClassifierStrategy,
    source: Arc<SourceMesh>,
    state: ActivationState,
    binding: MeshBinding,
    vertex_cache: VertexCache,
    classifier: TriangleClassifier,
    rebuilder: MeshRebuilder,
    /// The partition of the last successful rebuild.
    partition: IndexPartition,
    /// Receives each classification, swapped into `partition` once the rebuild succeeded.
    staged: IndexPartition,
    frame_count: u64,
}

impl LifecycleController {
    pub fn new(
        config: &DeformationConfig,
        source: Arc<SourceMesh>,
        kernel: Box<dyn CullingKernel>,
    ) -> DeformResult<Self> {
        config.validate()?;

        Ok(Self {
            gate: SpatialGate::new(config.activation_radius, config.deactivation_radius)?,
            strategy: config.strategy,
            source,
            state: ActivationState::Inactive,
            binding: MeshBinding::Original,
            vertex_cache: VertexCache::default(),
            classifier: TriangleClassifier::new(config, kernel),
            rebuilder: MeshRebuilder::new(config.submesh_layout),
            partition: IndexPartition::default(),
            staged: IndexPartition::default(),
            frame_count: 0,
        })
    }

    /// Allocates the pipeline and binds the tessellated mesh, does nothing while active.
    ///
    /// The vertex cache is built first, so an invalid mesh fails before anything else is allocated.
    pub fn on_activate(&mut self) -> DeformResult<()> {
        if self.state == ActivationState::Active {
            return Ok(());
        }

        let vertices = self.vertex_cache.build(&self.source)?;
        self.classifier.allocate(vertices, self.source.indices());
        self.rebuilder.allocate();

        self.state = ActivationState::Active;
        self.binding = MeshBinding::Tessellated;

        info!(
            "Activated deformable mesh with {} triangles.",
            self.source.triangle_count()
        );

        Ok(())
    }

    /// Frees the pipeline and binds the original mesh again, does nothing while inactive.
    pub fn on_deactivate(&mut self) {
        let was_active = self.state == ActivationState::Active;

        self.classifier.release();
        self.rebuilder.release();
        self.vertex_cache.release();
        self.partition = IndexPartition::default();
        self.staged = IndexPartition::default();

        self.state = ActivationState::Inactive;
        self.binding = MeshBinding::Original;

        if was_active {
            info!("Deactivated deformable mesh.");
        }
    }

    /// Advances the lifecycle by one frame.
    ///
    /// With the gpu strategy and no trace maps, the target is never considered near.
    pub fn tick(
        &mut self,
        local_to_world: Mat4,
        target_position: Vec3,
        traces: Option<&TraceTextures>,
    ) -> TickReport {
        self.frame_count += 1;

        let owner = local_to_world.transform_point3(Vec3::ZERO).xz();
        let zone = self.gate.evaluate(owner, target_position.xz());
        let inert = self.strategy == ClassifierStrategy::Gpu && traces.is_none();

        let mut report = TickReport {
            zone,
            transition: None,
            outcome: TickOutcome::Idle,
        };

        match zone {
            GateZone::Far => {
                if self.is_active() {
                    self.on_deactivate();
                    report.transition = Some(Transition::Deactivated);
                }
                return report;
            }
            GateZone::Near if !inert && !self.is_active() => {
                if let Err(error) = self.on_activate() {
                    warn!("Failed to activate deformable mesh: {error}");
                    report.outcome = TickOutcome::ActivationFailed(error);
                    return report;
                }
                report.transition = Some(Transition::Activated);
            }
            _ => {}
        }

        if !self.is_active() || inert {
            return report;
        }

        let inputs = ClassifyInputs {
            local_to_world,
            target_position,
            traces,
        };

        report.outcome = match self.update_mesh(inputs) {
            Ok(()) => {
                debug!(
                    "Partitioned {} affected and {} unaffected triangles.",
                    self.partition.affected_triangle_count(),
                    self.partition.unaffected_triangle_count()
                );

                TickOutcome::Rebuilt {
                    affected_triangles: self.partition.affected_triangle_count(),
                    unaffected_triangles: self.partition.unaffected_triangle_count(),
                }
            }
            Err(error) => {
                warn!("Skipped deformable mesh update: {error}");
                TickOutcome::Skipped(error)
            }
        };

        report
    }

    fn update_mesh(&mut self, inputs: ClassifyInputs) -> DeformResult<()> {
        let Some(vertices) = self.vertex_cache.get() else {
            return Ok(());
        };
        let indices = self.source.indices();

        self.classifier
            .classify(vertices, indices, inputs, &mut self.staged)?;
        self.staged.ensure_complete(indices.len())?;
        self.rebuilder.rebuild(vertices, &self.staged)?;

        std::mem::swap(&mut self.partition, &mut self.staged);
        Ok(())
    }

    #[inline]
    pub fn state(&self) -> ActivationState {
        self.state
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.state == ActivationState::Active
    }

    #[inline]
    pub fn binding(&self) -> MeshBinding {
        self.binding
    }

    /// The number of ticks since creation.
    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    #[inline]
    pub fn source(&self) -> &Arc<SourceMesh> {
        &self.source
    }

    #[inline]
    pub fn partition(&self) -> &IndexPartition {
        &self.partition
    }

    #[inline]
    pub fn tessellated_mesh(&self) -> Option<&TessellatedMesh> {
        self.rebuilder.mesh()
    }
}
