use bevy::{
    prelude::*,
    render::{
        mesh::{Indices, PrimitiveTopology},
        render_asset::RenderAssetUsages,
    },
};
use bevy_terrain_deform::{
    culling::kernel::{CullingKernel, CullingParams, ReadbackRequest},
    mesh::MeshVertex,
    prelude::*,
};

fn flat_mesh(size: u32) -> Mesh {
    let row = size + 1;
    let mut positions = Vec::new();
    let mut uvs = Vec::new();
    let mut indices = Vec::new();

    for z in 0..row {
        for x in 0..row {
            positions.push([x as f32, 0.0, z as f32]);
            uvs.push([x as f32 / size as f32, z as f32 / size as f32]);
        }
    }

    for z in 0..size {
        for x in 0..size {
            let i = z * row + x;
            indices.extend([i, i + row, i + 1, i + 1, i + row, i + row + 1]);
        }
    }

    Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default())
        .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, positions)
        .with_inserted_attribute(Mesh::ATTRIBUTE_UV_0, uvs)
        .with_inserted_indices(Indices::U32(indices))
}

fn app(strategy: ClassifierStrategy) -> App {
    let config = DeformationConfig {
        strategy,
        ..default()
    };

    let mut app = App::new();
    app.add_plugins((MinimalPlugins, AssetPlugin::default(), DeformationPlugin::new(config)))
        .init_asset::<Mesh>();
    app
}

fn spawn_terrain(app: &mut App) -> (Entity, Handle<Mesh>) {
    spawn_deformable(app, DeformableMesh::default())
}

fn spawn_deformable(app: &mut App, deformable: DeformableMesh) -> (Entity, Handle<Mesh>) {
    let handle = app
        .world_mut()
        .resource_mut::<Assets<Mesh>>()
        .add(flat_mesh(8));

    let entity = app
        .world_mut()
        .spawn((Mesh3d(handle.clone()), GlobalTransform::default(), deformable))
        .id();

    (entity, handle)
}

fn move_to(app: &mut App, entity: Entity, translation: Vec3) {
    app.world_mut()
        .entity_mut(entity)
        .insert(GlobalTransform::from_translation(translation));
}

#[test]
fn approaching_target_swaps_the_mesh() {
    let mut app = app(ClassifierStrategy::Cpu);
    let (terrain, original) = spawn_terrain(&mut app);
    let target = app
        .world_mut()
        .spawn((DeformationTarget, GlobalTransform::from_xyz(100.0, 0.0, 0.0)))
        .id();

    app.update();
    assert_eq!(app.world().get::<Mesh3d>(terrain).unwrap().0, original);
    assert!(!app.world().get::<DeformableMesh>(terrain).unwrap().is_active());

    move_to(&mut app, target, Vec3::new(4.0, 0.0, 4.0));
    app.update();

    let deformable = app.world().get::<DeformableMesh>(terrain).unwrap();
    assert!(deformable.is_active());
    let affected = deformable.affected_mesh().unwrap().clone();

    let bound = app.world().get::<Mesh3d>(terrain).unwrap().0.clone();
    assert_ne!(bound, original);

    let meshes = app.world().resource::<Assets<Mesh>>();
    // the default bound covers the whole mesh, so every triangle is affected
    assert_eq!(meshes.get(&bound).unwrap().indices().unwrap().len(), 0);
    assert_eq!(meshes.get(&affected).unwrap().indices().unwrap().len(), 384);
    assert!(meshes.get(&affected).unwrap().attribute(Mesh::ATTRIBUTE_NORMAL).is_some());

    let stats = app.world().resource::<DeformationStats>();
    assert_eq!(stats.active_meshes, 1);
    assert_eq!(stats.affected_triangles, 128);
    assert_eq!(stats.activations, 1);

    // within the hysteresis band the mesh stays active
    move_to(&mut app, target, Vec3::new(30.0, 0.0, 0.0));
    app.update();
    assert!(app.world().get::<DeformableMesh>(terrain).unwrap().is_active());

    move_to(&mut app, target, Vec3::new(40.0, 0.0, 0.0));
    app.update();

    let deformable = app.world().get::<DeformableMesh>(terrain).unwrap();
    assert!(!deformable.is_active());
    assert!(deformable.affected_mesh().is_none());
    assert_eq!(app.world().get::<Mesh3d>(terrain).unwrap().0, original);
    assert_eq!(app.world().resource::<DeformationStats>().deactivations, 1);
}

#[test]
fn gpu_strategy_follows_the_traces() {
    let mut app = app(ClassifierStrategy::Gpu);
    let (terrain, _) = spawn_terrain(&mut app);

    let feet = vec![
        app.world_mut()
            .spawn(GlobalTransform::from_xyz(4.0, 0.0, 4.0))
            .id(),
        app.world_mut()
            .spawn(GlobalTransform::from_xyz(4.0, 1.0, 6.0))
            .id(),
    ];
    app.world_mut().spawn((
        DeformationTarget,
        TraceEmitter { feet },
        GlobalTransform::from_xyz(4.0, 0.0, 5.0),
    ));

    app.update();

    assert!(app.world().resource::<TraceMaps>().is_initialized());

    let deformable = app.world().get::<DeformableMesh>(terrain).unwrap();
    assert!(deformable.is_active());

    // only the planted foot at (4, 4) pressed the six triangles around that vertex
    let partition = deformable.controller().unwrap().partition();
    assert_eq!(partition.affected_triangle_count(), 6);
    assert_eq!(partition.unaffected_triangle_count(), 122);
}

#[test]
fn gpu_strategy_without_traces_stays_inactive() {
    let mut app = app(ClassifierStrategy::Gpu);
    let (terrain, original) = spawn_terrain(&mut app);
    app.world_mut()
        .spawn((DeformationTarget, GlobalTransform::from_xyz(4.0, 0.0, 4.0)));

    app.update();

    assert!(!app.world().resource::<TraceMaps>().is_initialized());
    assert!(!app.world().get::<DeformableMesh>(terrain).unwrap().is_active());
    assert_eq!(app.world().get::<Mesh3d>(terrain).unwrap().0, original);
}

#[test]
fn meshes_without_uvs_are_left_alone() {
    let mut app = app(ClassifierStrategy::Cpu);
    let handle = app.world_mut().resource_mut::<Assets<Mesh>>().add(
        Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default())
            .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, vec![[0.0, 0.0, 0.0]; 3])
            .with_inserted_indices(Indices::U32(vec![0, 1, 2])),
    );
    let terrain = app
        .world_mut()
        .spawn((
            Mesh3d(handle.clone()),
            GlobalTransform::default(),
            DeformableMesh::default(),
        ))
        .id();
    app.world_mut()
        .spawn((DeformationTarget, GlobalTransform::default()));

    app.update();
    app.update();

    let deformable = app.world().get::<DeformableMesh>(terrain).unwrap();
    assert!(deformable.controller().is_none());
    assert_eq!(app.world().get::<Mesh3d>(terrain).unwrap().0, handle);
}

#[test]
fn rebuilds_update_the_mesh_assets_in_place() {
    let mut app = app(ClassifierStrategy::Cpu);
    let (terrain, _) = spawn_terrain(&mut app);
    let target = app
        .world_mut()
        .spawn((DeformationTarget, GlobalTransform::from_xyz(4.0, 0.0, 4.0)))
        .id();

    app.update();
    let bound = app.world().get::<Mesh3d>(terrain).unwrap().0.clone();
    let affected = app
        .world()
        .get::<DeformableMesh>(terrain)
        .unwrap()
        .affected_mesh()
        .unwrap()
        .clone();

    // the bound now only reaches the first two quad columns
    move_to(&mut app, target, Vec3::new(-7.0, 0.0, 4.0));
    app.update();

    assert_eq!(app.world().get::<Mesh3d>(terrain).unwrap().0, bound);
    let deformable = app.world().get::<DeformableMesh>(terrain).unwrap();
    assert_eq!(deformable.affected_mesh(), Some(&affected));

    let meshes = app.world().resource::<Assets<Mesh>>();
    assert_eq!(meshes.len(), 3);
    assert_eq!(meshes.get(&affected).unwrap().indices().unwrap().len(), 96);
    assert_eq!(meshes.get(&bound).unwrap().indices().unwrap().len(), 288);
    assert_eq!(meshes.get(&bound).unwrap().count_vertices(), 81);
}

/// Reports every triangle as pressed, whatever the trace heightmap holds.
struct PressEverything;

impl CullingKernel for PressEverything {
    fn bind_geometry(&mut self, _vertices: &[MeshVertex], _indices: &[u32]) {}

    fn dispatch(&mut self, params: &CullingParams) -> DeformResult<ReadbackRequest> {
        let (sender, request) = ReadbackRequest::channel();
        let flags = (0..params.triangle_count)
            .flat_map(|_| 1u32.to_ne_bytes())
            .collect();
        sender.try_send(flags).unwrap();
        Ok(request)
    }

    fn release(&mut self) {}
}

#[test]
fn custom_kernels_drive_the_gpu_strategy() {
    let mut app = app(ClassifierStrategy::Gpu);
    let (terrain, _) = spawn_deformable(&mut app, DeformableMesh::with_kernel(PressEverything));
    // an emitter without feet only creates the trace maps
    app.world_mut().spawn((
        DeformationTarget,
        TraceEmitter::default(),
        GlobalTransform::from_xyz(4.0, 0.0, 4.0),
    ));

    app.update();

    let deformable = app.world().get::<DeformableMesh>(terrain).unwrap();
    assert!(deformable.is_active());

    let partition = deformable.controller().unwrap().partition();
    assert_eq!(partition.affected_triangle_count(), 128);
    assert_eq!(partition.unaffected_triangle_count(), 0);
}

#[test]
fn several_targets_pause_the_meshes() {
    let mut app = app(ClassifierStrategy::Cpu);
    let (terrain, original) = spawn_terrain(&mut app);
    for x in [2.0, 6.0] {
        app.world_mut()
            .spawn((DeformationTarget, GlobalTransform::from_xyz(x, 0.0, 4.0)));
    }

    app.update();
    app.update();

    assert!(app.world().get::<DeformableMesh>(terrain).unwrap().controller().is_none());
    assert_eq!(app.world().get::<Mesh3d>(terrain).unwrap().0, original);
    assert_eq!(app.world().resource::<DeformationStats>().active_meshes, 0);
}
