use crate::cli::{Cli, ProbeBar};
use bevy::{
    prelude::*,
    render::{
        mesh::{Indices, PrimitiveTopology},
        render_asset::RenderAssetUsages,
    },
};
use indicatif::ParallelProgressIterator;
use itertools::{iproduct, Itertools};
use rayon::prelude::*;

/// Height of the rolling hills of the generated field.
const AMPLITUDE: f32 = 0.5;

fn height(world: Vec2) -> f32 {
    AMPLITUDE * (world.x * 0.15).sin() * (world.y * 0.1).cos()
}

/// A grid of `resolution`x`resolution` quads covering `size` units, centered on `center`.
///
/// Positions are local to the tile, heights are sampled in world space so neighbouring tiles match.
pub(crate) fn tile_mesh(center: Vec2, resolution: u32, size: f32) -> Mesh {
    let row = resolution + 1;
    let spacing = size / resolution as f32;

    let (positions, uvs): (Vec<[f32; 3]>, Vec<[f32; 2]>) = iproduct!(0..row, 0..row)
        .map(|(z, x)| {
            let local = Vec2::new(x as f32, z as f32) * spacing - size / 2.0;
            let position = [local.x, height(center + local), local.y];
            let uv = [x as f32 / resolution as f32, z as f32 / resolution as f32];
            (position, uv)
        })
        .unzip();

    let indices = iproduct!(0..resolution, 0..resolution)
        .flat_map(|(z, x)| {
            let i = z * row + x;
            [i, i + row, i + 1, i + 1, i + row, i + row + 1]
        })
        .collect_vec();

    Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default())
        .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, positions)
        .with_inserted_attribute(Mesh::ATTRIBUTE_UV_0, uvs)
        .with_inserted_indices(Indices::U32(indices))
}

/// Generates the tile meshes of the field in parallel, centered on the origin.
pub(crate) fn generate_field(cli: &Cli) -> Vec<(Vec3, Mesh)> {
    let offset = (cli.tiles as f32 - 1.0) * cli.tile_size / 2.0;
    let centers = iproduct!(0..cli.tiles, 0..cli.tiles)
        .map(|(z, x)| Vec2::new(x as f32, z as f32) * cli.tile_size - offset)
        .collect_vec();

    let progress_bar = ProbeBar::new("Generating", centers.len() as u64);

    let tiles = centers
        .into_par_iter()
        .progress_with(progress_bar.bar().clone())
        .map(|center| {
            let mesh = tile_mesh(center, cli.tile_resolution, cli.tile_size);
            (Vec3::new(center.x, 0.0, center.y), mesh)
        })
        .collect();

    progress_bar.finish();

    tiles
}
