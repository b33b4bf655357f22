use crate::{
    config::DeformationConfig,
    culling::kernel::{CullingKernel, SoftwareCullingKernel},
    error::DeformResult,
    lifecycle::{LifecycleController, MeshBinding, TickOutcome, TickReport, Transition},
    mesh::{
        rebuilder::{AFFECTED_SUBMESH, UNAFFECTED_SUBMESH},
        tessellated_mesh::TessellatedMesh,
        SourceMesh,
    },
    trace::maps::TraceMaps,
};
use bevy::{ecs::query::QuerySingleError, prelude::*};
use std::sync::Arc;

/// Marks the entity whose position drives the deformation, usually the player.
#[derive(Clone, Copy, Debug, Default, Component)]
pub struct DeformationTarget;

/// Turns the [`Mesh3d`] of an entity into a mesh that is tessellated around the target.
///
/// While the target is near, the [`Mesh3d`] handle is swapped to a mesh containing the
/// unaffected triangles, and the affected triangles are written to [`DeformableMesh::affected_mesh`]
/// for a tessellating material to pick up. Far away, the original mesh is restored.
#[derive(Default, Component)]
pub struct DeformableMesh {
    kernel: Option<Box<dyn CullingKernel>>,
    controller: Option<LifecycleController>,
    original: Option<Handle<Mesh>>,
    tessellated: Option<Handle<Mesh>>,
    affected: Option<Handle<Mesh>>,
    failed: bool,
}

impl DeformableMesh {
    /// Uses a custom culling kernel for the gpu strategy.
    pub fn with_kernel(kernel: impl CullingKernel + 'static) -> Self {
        Self {
            kernel: Some(Box::new(kernel)),
            ..default()
        }
    }

    #[inline]
    pub fn controller(&self) -> Option<&LifecycleController> {
        self.controller.as_ref()
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.controller
            .as_ref()
            .is_some_and(LifecycleController::is_active)
    }

    /// The handle of the mesh holding the affected triangles, while active.
    #[inline]
    pub fn affected_mesh(&self) -> Option<&Handle<Mesh>> {
        self.affected.as_ref()
    }

    #[inline]
    pub fn original_mesh(&self) -> Option<&Handle<Mesh>> {
        self.original.as_ref()
    }

    fn init_controller(
        &mut self,
        config: &DeformationConfig,
        meshes: &Assets<Mesh>,
        handle: &Handle<Mesh>,
    ) -> Option<&mut LifecycleController> {
        if self.controller.is_none() && !self.failed {
            // wait for the mesh to finish loading
            let mesh = meshes.get(handle)?;

            let controller = SourceMesh::from_bevy_mesh(mesh).and_then(|source| {
                let kernel = self
                    .kernel
                    .take()
                    .unwrap_or_else(|| Box::new(SoftwareCullingKernel::new()));
                LifecycleController::new(config, Arc::new(source), kernel)
            });

            match controller {
                Ok(controller) => {
                    self.original = Some(handle.clone());
                    self.controller = Some(controller);
                }
                Err(error) => {
                    warn!("Mesh can not be deformed: {error}");
                    self.failed = true;
                }
            }
        }

        self.controller.as_mut()
    }

    fn write_meshes(&mut self, meshes: &mut Assets<Mesh>) -> DeformResult<()> {
        let Some(mesh) = self
            .controller
            .as_ref()
            .and_then(LifecycleController::tessellated_mesh)
        else {
            return Ok(());
        };

        write_mesh(meshes, &mut self.tessellated, mesh, UNAFFECTED_SUBMESH)?;

        if mesh.submeshes().len() > AFFECTED_SUBMESH {
            write_mesh(meshes, &mut self.affected, mesh, AFFECTED_SUBMESH)?;
        }

        Ok(())
    }

    fn release_meshes(&mut self, meshes: &mut Assets<Mesh>) {
        for handle in [self.tessellated.take(), self.affected.take()]
            .into_iter()
            .flatten()
        {
            meshes.remove(handle.id());
        }
    }

    fn bound_handle(&self) -> Option<&Handle<Mesh>> {
        match self.controller.as_ref()?.binding() {
            MeshBinding::Original => self.original.as_ref(),
            MeshBinding::Tessellated => self.tessellated.as_ref(),
        }
    }
}

/// Updates the asset behind `handle` in place, or adds it on the first write of an activation.
fn write_mesh(
    meshes: &mut Assets<Mesh>,
    handle: &mut Option<Handle<Mesh>>,
    mesh: &TessellatedMesh,
    submesh: usize,
) -> DeformResult<()> {
    if let Some(id) = handle.as_ref().map(Handle::id) {
        if let Some(asset) = meshes.get_mut(id) {
            return mesh.update_bevy_mesh(submesh, asset);
        }
    }

    *handle = Some(meshes.add(mesh.to_bevy_mesh(submesh)?));
    Ok(())
}

/// Counters of the deformation pipeline, the per frame values are reset every update.
#[derive(Clone, Debug, Default, Resource)]
pub struct DeformationStats {
    pub active_meshes: usize,
    pub affected_triangles: usize,
    pub unaffected_triangles: usize,
    pub activations: usize,
    pub deactivations: usize,
    pub skipped_ticks: usize,
}

impl DeformationStats {
    pub fn begin_frame(&mut self) {
        self.active_meshes = 0;
        self.affected_triangles = 0;
        self.unaffected_triangles = 0;
    }

    pub fn record(&mut self, report: &TickReport, active: bool) {
        match report.transition {
            Some(Transition::Activated) => self.activations += 1,
            Some(Transition::Deactivated) => self.deactivations += 1,
            None => {}
        }

        match report.outcome {
            TickOutcome::Rebuilt {
                affected_triangles,
                unaffected_triangles,
            } => {
                self.affected_triangles += affected_triangles;
                self.unaffected_triangles += unaffected_triangles;
            }
            TickOutcome::Skipped(_) | TickOutcome::ActivationFailed(_) => self.skipped_ticks += 1,
            TickOutcome::Idle => {}
        }

        if active {
            self.active_meshes += 1;
        }
    }
}

pub fn update_deformable_meshes(
    config: Res<DeformationConfig>,
    trace_maps: Res<TraceMaps>,
    mut stats: ResMut<DeformationStats>,
    mut meshes: ResMut<Assets<Mesh>>,
    targets: Query<&GlobalTransform, With<DeformationTarget>>,
    mut deformables: Query<(&GlobalTransform, &mut Mesh3d, &mut DeformableMesh)>,
    mut warned: Local<bool>,
) {
    stats.begin_frame();

    let target = match targets.get_single() {
        Ok(target) => target.translation(),
        Err(QuerySingleError::MultipleEntities(_)) => {
            if !*warned {
                warn!("Several deformation targets found, pausing deformable meshes.");
                *warned = true;
            }
            return;
        }
        Err(QuerySingleError::NoEntities(_)) => return,
    };

    for (transform, mut mesh3d, mut deformable) in &mut deformables {
        let Some(controller) = deformable.init_controller(&config, &meshes, &mesh3d.0) else {
            continue;
        };

        let report = controller.tick(transform.compute_matrix(), target, trace_maps.get());
        stats.record(&report, controller.is_active());

        if report.transition == Some(Transition::Deactivated) {
            deformable.release_meshes(&mut meshes);
        }

        if matches!(report.outcome, TickOutcome::Rebuilt { .. }) {
            if let Err(error) = deformable.write_meshes(&mut meshes) {
                warn!("Failed to write tessellated mesh: {error}");
            }
        }

        if let Some(handle) = deformable.bound_handle() {
            if mesh3d.0 != *handle {
                mesh3d.0 = handle.clone();
            }
        }
    }
}
