use crate::{
    cli::{Cli, ProbeBar},
    terrain::generate_field,
};
use anyhow::{Context, Result};
use bevy::{log::LogPlugin, prelude::*};
use bevy_terrain_deform::{prelude::*, trace::export_heightmap};
use std::time::Instant;

/// Sideways distance of each foot from the center of the player.
const FOOT_OFFSET: f32 = 0.15;
/// Height of a raised foot above the player base.
const STEP_HEIGHT: f32 = 0.3;

#[derive(Clone, Copy, Resource)]
struct Walker {
    feet: [Entity; 2],
    player: Entity,
}

#[derive(Default)]
struct Summary {
    max_active_meshes: usize,
    max_affected_triangles: usize,
}

fn load_config(cli: &Cli) -> Result<DeformationConfig> {
    let mut config = match &cli.config {
        Some(path) => DeformationConfig::load(path)?,
        None => DeformationConfig::default(),
    };

    if let Some(strategy) = cli.strategy {
        config.strategy = strategy.into();
    }

    config.validate()?;
    Ok(config)
}

fn build_app(cli: &Cli, config: DeformationConfig) -> App {
    let mut app = App::new();
    app.add_plugins((
        MinimalPlugins,
        LogPlugin::default(),
        AssetPlugin::default(),
        DeformationPlugin::new(config),
    ))
    .init_asset::<Mesh>();

    for (translation, mesh) in generate_field(cli) {
        let handle = app.world_mut().resource_mut::<Assets<Mesh>>().add(mesh);

        app.world_mut().spawn((
            Mesh3d(handle),
            Transform::from_translation(translation),
            GlobalTransform::from_translation(translation),
            DeformableMesh::default(),
        ));
    }

    let feet = [(); 2].map(|_| app.world_mut().spawn(GlobalTransform::default()).id());
    let player = app
        .world_mut()
        .spawn((
            DeformationTarget,
            TraceEmitter {
                feet: feet.to_vec(),
            },
            GlobalTransform::default(),
        ))
        .id();

    app.insert_resource(Walker { feet, player });
    app.finish();
    app.cleanup();

    app
}

/// Places the player for the given frame, alternating the planted foot.
fn walk(world: &mut World, start: Vec3, stride: f32, step: u32) -> Vec3 {
    let Walker { feet, player } = *world.resource::<Walker>();
    let position = start + Vec3::X * stride * step as f32;

    for (side, foot) in feet.into_iter().enumerate() {
        let planted = (step as usize + side) % 2 == 0;
        let offset = Vec3::new(
            0.0,
            if planted { 0.0 } else { STEP_HEIGHT },
            if side == 0 { -FOOT_OFFSET } else { FOOT_OFFSET },
        );

        world
            .entity_mut(foot)
            .insert(GlobalTransform::from_translation(position + offset));
    }

    world
        .entity_mut(player)
        .insert(GlobalTransform::from_translation(position));

    position
}

pub fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    println!(
        "Probing the {:?} strategy on {tiles}x{tiles} tiles with {quads}x{quads} quads each.",
        config.strategy,
        tiles = cli.tiles,
        quads = cli.tile_resolution
    );

    let mut app = build_app(&cli, config.clone());

    let start = Vec3::new(-(cli.tiles as f32) * cli.tile_size / 2.0 - 8.0, 0.0, 0.0);
    let mut summary = Summary::default();
    let start_probing = Instant::now();
    let progress_bar = ProbeBar::new("Walking", cli.steps as u64);

    for step in 0..cli.steps {
        let position = walk(app.world_mut(), start, cli.stride, step);
        app.update();

        let stats = app.world().resource::<DeformationStats>();
        summary.max_active_meshes = summary.max_active_meshes.max(stats.active_meshes);
        summary.max_affected_triangles = summary.max_affected_triangles.max(stats.affected_triangles);

        if cli.report_every > 0 && step % cli.report_every == 0 {
            progress_bar.bar().println(format!(
                "frame {step:>5} at x = {:>7.2}: {} active meshes, {} affected / {} unaffected triangles",
                position.x, stats.active_meshes, stats.affected_triangles, stats.unaffected_triangles
            ));
        }

        progress_bar.bar().inc(1);
    }

    progress_bar.finish();

    let stats = app.world().resource::<DeformationStats>();
    println!(
        "{} activations, {} deactivations, {} skipped ticks.",
        stats.activations, stats.deactivations, stats.skipped_ticks
    );
    println!(
        "At most {} meshes were active with {} affected triangles.",
        summary.max_active_meshes, summary.max_affected_triangles
    );
    println!("Probing took: {:?}", start_probing.elapsed());

    if let Some(path) = &cli.export {
        let textures = app
            .world()
            .resource::<TraceMaps>()
            .get()
            .context("no trace maps were created")?;
        export_heightmap(textures, config.trace.max_depth, path)?;
        println!("Wrote the trace heightmap to {}.", path.display());
    }

    app.world_mut().resource_mut::<TraceMaps>().teardown();

    Ok(())
}
