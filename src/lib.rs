//! This crate deforms terrain meshes where the player walks over them.
//!
//! # Background
//! Tessellating a whole terrain mesh to display footprints would be far too expensive.
//! Instead, only the triangles close to the player are tessellated and displaced by a
//! trace heightmap, while the rest of the mesh is rendered as is.
//!
//! ## Which meshes are deformed?
//! Every [`DeformableMesh`](deformable_mesh::DeformableMesh) is driven by a
//! [`LifecycleController`](lifecycle::LifecycleController). When the
//! [`DeformationTarget`](deformable_mesh::DeformationTarget) comes close, the controller
//! allocates the pipeline of the mesh, and when the target is far away again, it frees everything
//! and restores the original mesh. A hysteresis band between both radii prevents meshes from
//! toggling every frame.
//!
//! ## Which triangles are tessellated?
//! Each frame the [`TriangleClassifier`](culling::classifier::TriangleClassifier) splits the
//! triangles of an active mesh into an affected and an unaffected group, either with a culling
//! kernel that samples the trace heightmap or with a simple box test around the target.
//! The [`MeshRebuilder`](mesh::rebuilder::MeshRebuilder) then uploads both groups as separate
//! submeshes of the [`TessellatedMesh`](mesh::tessellated_mesh::TessellatedMesh).
//!
//! ## Where do the traces come from?
//! The [`TraceGenerator`](trace::generator::TraceGenerator) stamps the feet of the
//! [`TraceEmitter`](trace::generator::TraceEmitter) into the shared
//! [`TraceMaps`](trace::maps::TraceMaps) and lets old traces refill over time.

pub mod config;
pub mod culling;
pub mod deformable_mesh;
pub mod error;
pub mod lifecycle;
pub mod mesh;
pub mod plugin;
pub mod trace;

pub mod prelude {
    #[doc(hidden)]
    pub use crate::{
        config::{ClassifierStrategy, DeformationConfig, SubmeshLayout, TraceConfig},
        culling::kernel::{CullingKernel, SoftwareCullingKernel},
        deformable_mesh::{DeformableMesh, DeformationStats, DeformationTarget},
        error::{DeformError, DeformResult},
        lifecycle::{ActivationState, LifecycleController},
        plugin::{DeformationPlugin, DeformationSet},
        trace::{
            generator::{TraceEmitter, TraceGenerator},
            maps::TraceMaps,
        },
    };
}
