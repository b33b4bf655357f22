use crate::error::{DeformError, DeformResult};
use anyhow::{Context, Result};
use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Selects how the triangles of a deformable mesh are classified each tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassifierStrategy {
    /// A culling kernel writes one flag per triangle, which is read back before partitioning.
    #[default]
    Gpu,
    /// Each triangle is tested against a box around the target on the CPU.
    Cpu,
}

/// Selects which index groups are uploaded to the tessellated mesh.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmeshLayout {
    /// Submesh 0 holds the unaffected triangles, submesh 1 the affected ones.
    #[default]
    Dual,
    /// Only the unaffected triangles are uploaded (submesh 0).
    UnaffectedOnly,
}

impl SubmeshLayout {
    pub fn submesh_count(self) -> usize {
        match self {
            SubmeshLayout::Dual => 2,
            SubmeshLayout::UnaffectedOnly => 1,
        }
    }
}

/// Parameters of the trace heightmap and of the foot stamping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Texels along each side of the trace heightmap and timer map.
    pub resolution: u32,
    /// World units covered by the maps along each side.
    pub world_size: f32,
    /// Side length of the texel window updated around each foot.
    pub stamp_size: u32,
    /// Radius of a single footprint in world units.
    pub foot_radius: f32,
    /// Depth of a footprint at its center.
    pub max_depth: f32,
    /// A foot only leaves a trace while it is at most this high above the player base.
    pub contact_height: f32,
    /// Seconds a texel stays untouched before it starts refilling.
    pub refill_delay: f32,
    /// Depth recovered per second while refilling.
    pub refill_rate: f32,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            resolution: 1024,
            world_size: 16.0,
            stamp_size: 32,
            foot_radius: 0.12,
            max_depth: 0.1,
            contact_height: 0.15,
            refill_delay: 5.0,
            refill_rate: 0.02,
        }
    }
}

impl TraceConfig {
    #[inline]
    pub fn texels_per_unit(&self) -> f32 {
        self.resolution as f32 / self.world_size
    }
}

/// The configuration of the deformation pipeline.
///
/// It is shared by every [`DeformableMesh`](crate::deformable_mesh::DeformableMesh)
/// and by the trace generator.
#[derive(Clone, Debug, PartialEq, Resource, Serialize, Deserialize)]
#[serde(default)]
pub struct DeformationConfig {
    /// Chebyshev distance at or below which a mesh becomes active.
    pub activation_radius: f32,
    /// Chebyshev distance above which an active mesh is torn down.
    pub deactivation_radius: f32,
    /// Size of the box around the target used by the cpu strategy.
    pub bound_size: [f32; 3],
    pub strategy: ClassifierStrategy,
    pub submesh_layout: SubmeshLayout,
    /// Minimal trace depth for the culling kernel to mark a triangle as affected.
    pub trace_threshold: f32,
    pub trace: TraceConfig,
}

impl Default for DeformationConfig {
    fn default() -> Self {
        Self {
            activation_radius: 16.0,
            deactivation_radius: 32.0,
            bound_size: [16.0, 100.0, 16.0],
            strategy: ClassifierStrategy::default(),
            submesh_layout: SubmeshLayout::default(),
            trace_threshold: 0.0,
            trace: TraceConfig::default(),
        }
    }
}

impl DeformationConfig {
    pub fn from_ron_str(source: &str) -> Result<Self> {
        let config: Self = ron::from_str(source).context("failed to parse deformation config")?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a config from a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)
            .with_context(|| format!("failed to read deformation config {}", path.display()))?;

        Self::from_ron_str(&source).with_context(|| format!("in {}", path.display()))
    }

    pub fn to_ron_string(&self) -> Result<String> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    pub fn validate(&self) -> DeformResult<()> {
        if !(self.activation_radius >= 0.0 && self.deactivation_radius > self.activation_radius) {
            return Err(DeformError::InvalidRadii {
                activation: self.activation_radius,
                deactivation: self.deactivation_radius,
            });
        }

        if self.bound_size.iter().any(|&size| !(size > 0.0)) {
            return Err(DeformError::InvalidConfig(format!(
                "bound size {:?} must be positive",
                self.bound_size
            )));
        }

        let trace = &self.trace;

        if trace.resolution == 0
            || trace.stamp_size == 0
            || trace.stamp_size > trace.resolution
            || trace.resolution % trace.stamp_size != 0
        {
            return Err(DeformError::InvalidConfig(format!(
                "trace resolution {} must be a multiple of the stamp size {}",
                trace.resolution, trace.stamp_size
            )));
        }

        if !(trace.world_size > 0.0) {
            return Err(DeformError::InvalidConfig(format!(
                "trace world size {} must be positive",
                trace.world_size
            )));
        }

        Ok(())
    }

    #[inline]
    pub fn bound_size(&self) -> Vec3 {
        Vec3::from_array(self.bound_size)
    }

    /// The extent handed to the culling kernel, matching the x size of the bound.
    #[inline]
    pub fn cull_bound_radius(&self) -> f32 {
        self.bound_size[0]
    }
}
