//! The trace heightmap shared by all deformable meshes.
//!
//! The [`TraceGenerator`](generator::TraceGenerator) presses the feet of the player into the
//! heightmap and refills old traces. Culling kernels sample it to find triangles that need
//! tessellation.

use crate::trace::maps::TraceTextures;
use anyhow::{Context, Result};
use image::{ImageBuffer, Luma};
use std::path::Path;

pub mod generator;
pub mod maps;

/// Writes the heightmap as a 16 bit grayscale image, with `max_depth` mapped to white.
///
/// The image shows the window in world orientation, starting at its origin texel.
pub fn export_heightmap(textures: &TraceTextures, max_depth: f32, path: &Path) -> Result<()> {
    let resolution = textures.resolution();
    let origin = textures.origin();

    let image = ImageBuffer::from_fn(resolution, resolution, |x, y| {
        let texel = origin + bevy::math::IVec2::new(x as i32, y as i32);
        let depth = (textures.heightmap.get(texel) / max_depth).clamp(0.0, 1.0);
        Luma([(depth * u16::MAX as f32) as u16])
    });

    image
        .save(path)
        .with_context(|| format!("failed to write heightmap {}", path.display()))
}
