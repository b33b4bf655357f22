use crate::error::{DeformError, DeformResult};
use bevy::prelude::*;

/// The zone of the target relative to a deformable mesh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateZone {
    /// Within the activation radius, the mesh should be active.
    Near,
    /// Between both radii, the current state persists.
    Mid,
    /// Beyond the deactivation radius, the mesh should be torn down.
    Far,
}

/// Decides whether a mesh should be deformed based on the horizontal distance to the target.
///
/// The distance is measured with the Chebyshev metric in the xz plane, which matches the square
/// footprint of the trace heightmap. The band between both radii prevents the mesh from toggling
/// when the target moves along the activation boundary.
#[derive(Clone, Copy, Debug)]
pub struct SpatialGate {
    activation_radius: f32,
    deactivation_radius: f32,
}

impl SpatialGate {
    pub fn new(activation_radius: f32, deactivation_radius: f32) -> DeformResult<Self> {
        if !(activation_radius >= 0.0 && deactivation_radius > activation_radius) {
            return Err(DeformError::InvalidRadii {
                activation: activation_radius,
                deactivation: deactivation_radius,
            });
        }

        Ok(Self {
            activation_radius,
            deactivation_radius,
        })
    }

    #[inline]
    pub fn chebyshev_distance(owner_xz: Vec2, target_xz: Vec2) -> f32 {
        let delta = (owner_xz - target_xz).abs();
        delta.x.max(delta.y)
    }

    pub fn evaluate(&self, owner_xz: Vec2, target_xz: Vec2) -> GateZone {
        let distance = Self::chebyshev_distance(owner_xz, target_xz);

        if distance <= self.activation_radius {
            GateZone::Near
        } else if distance > self.deactivation_radius {
            GateZone::Far
        } else {
            GateZone::Mid
        }
    }

    #[inline]
    pub fn activation_radius(&self) -> f32 {
        self.activation_radius
    }

    #[inline]
    pub fn deactivation_radius(&self) -> f32 {
        self.deactivation_radius
    }
}

impl Default for SpatialGate {
    fn default() -> Self {
        Self {
            activation_radius: 16.0,
            deactivation_radius: 32.0,
        }
    }
}
