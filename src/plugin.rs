use crate::{
    config::DeformationConfig,
    deformable_mesh::{update_deformable_meshes, DeformationStats},
    trace::{
        generator::{generate_traces, TraceGenerator},
        maps::TraceMaps,
    },
};
use bevy::{prelude::*, transform::TransformSystem};

/// Labels the systems of the deformation pipeline, in execution order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, SystemSet)]
pub enum DeformationSet {
    GenerateTraces,
    UpdateMeshes,
}

/// Adds trace generation and the per frame update of every [`DeformableMesh`](crate::deformable_mesh::DeformableMesh).
#[derive(Clone, Default)]
pub struct DeformationPlugin {
    pub config: DeformationConfig,
}

impl DeformationPlugin {
    pub fn new(config: DeformationConfig) -> Self {
        Self { config }
    }
}

impl Plugin for DeformationPlugin {
    fn build(&self, app: &mut App) {
        let config = match self.config.validate() {
            Ok(()) => self.config.clone(),
            Err(error) => {
                error!("Invalid deformation config, falling back to the defaults: {error}");
                DeformationConfig::default()
            }
        };

        app.insert_resource(TraceGenerator::from(&config))
            .insert_resource(config)
            .init_resource::<TraceMaps>()
            .init_resource::<DeformationStats>()
            .configure_sets(
                PostUpdate,
                (DeformationSet::GenerateTraces, DeformationSet::UpdateMeshes)
                    .chain()
                    .after(TransformSystem::TransformPropagate),
            )
            .add_systems(
                PostUpdate,
                (
                    generate_traces.in_set(DeformationSet::GenerateTraces),
                    update_deformable_meshes.in_set(DeformationSet::UpdateMeshes),
                ),
            );
    }
}
