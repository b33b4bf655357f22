//! Decides each tick which triangles of an active mesh are near enough to the target to be
//! tessellated.
//!
//! The [`SpatialGate`](spatial_gate::SpatialGate) activates and deactivates whole meshes, while the
//! [`TriangleClassifier`](classifier::TriangleClassifier) splits the triangles of an active mesh
//! into an [`IndexPartition`](partition::IndexPartition).

pub mod classifier;
pub mod kernel;
pub mod partition;
pub mod spatial_gate;
