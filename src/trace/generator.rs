use crate::{
    config::{DeformationConfig, TraceConfig},
    trace::maps::{TraceMaps, TraceTextures},
};
use bevy::prelude::*;
use itertools::iproduct;
use ndarray::Zip;

/// Marks the player whose feet press traces into the heightmap.
#[derive(Clone, Debug, Default, Component)]
pub struct TraceEmitter {
    /// The foot entities, their global translation is stamped each frame.
    pub feet: Vec<Entity>,
}

/// Presses footprints into the trace heightmap and lets old footprints refill over time.
#[derive(Clone, Debug, Default, Resource)]
pub struct TraceGenerator {
    config: TraceConfig,
}

impl TraceGenerator {
    pub fn new(config: TraceConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    /// Stamps a single foot, returns whether the foot was planted and left a trace.
    ///
    /// Only the `stamp_size` x `stamp_size` texels around the foot are touched.
    /// Depths are max-combined, so overlapping footprints never cancel each other out.
    pub fn stamp_foot(
        &self,
        textures: &mut TraceTextures,
        foot: Vec3,
        player: Vec3,
        time: f32,
    ) -> bool {
        if foot.y - player.y > self.config.contact_height {
            return false;
        }

        let center = textures.world_to_texel(foot.xz());
        let half = self.config.stamp_size as i32 / 2;
        let radius = self.config.foot_radius;

        for (z, x) in iproduct!(-half..half, -half..half) {
            let texel = center + IVec2::new(x, z);

            if !textures.contains_texel(texel) {
                continue;
            }

            let distance = textures.texel_center(texel).distance(foot.xz());
            if distance >= radius {
                continue;
            }

            // smoothstep falloff towards the rim of the footprint
            let t = 1.0 - distance / radius;
            let depth = self.config.max_depth * t * t * (3.0 - 2.0 * t);

            if depth > textures.heightmap.get(texel) {
                textures.heightmap.set(texel, depth);
            }
            textures.timer_map.set(texel, time);
        }

        true
    }

    /// Raises every texel that was not stamped for `refill_delay` seconds back towards zero.
    pub fn refill(&self, textures: &mut TraceTextures, time: f32, delta_time: f32) {
        let TraceConfig {
            refill_delay,
            refill_rate,
            ..
        } = self.config;
        let TraceTextures {
            heightmap,
            timer_map,
            ..
        } = textures;

        Zip::from(heightmap.data_mut())
            .and(timer_map.data())
            .par_for_each(|depth, &stamped| {
                if time - stamped > refill_delay {
                    *depth = (*depth - refill_rate * delta_time).max(0.0);
                }
            });
    }

    /// Runs a full frame: creates the maps if needed, follows the player, stamps the feet
    /// and refills.
    pub fn update(
        &self,
        maps: &mut TraceMaps,
        player: Vec3,
        feet: impl IntoIterator<Item = Vec3>,
        time: f32,
        delta_time: f32,
    ) -> usize {
        let textures = maps.get_or_init(&self.config, time);
        textures.recenter(player.xz(), time);

        let planted = feet
            .into_iter()
            .filter(|&foot| self.stamp_foot(textures, foot, player, time))
            .count();

        self.refill(textures, time, delta_time);

        planted
    }
}

impl From<&DeformationConfig> for TraceGenerator {
    fn from(config: &DeformationConfig) -> Self {
        Self::new(config.trace.clone())
    }
}

pub fn generate_traces(
    time: Res<Time>,
    generator: Res<TraceGenerator>,
    mut maps: ResMut<TraceMaps>,
    emitters: Query<(&GlobalTransform, &TraceEmitter)>,
    feet: Query<&GlobalTransform>,
) {
    let Ok((player, emitter)) = emitters.get_single() else {
        return;
    };

    let feet = emitter
        .feet
        .iter()
        .filter_map(|&foot| feet.get(foot).ok())
        .map(|transform| transform.translation());

    generator.update(
        &mut maps,
        player.translation(),
        feet,
        time.elapsed_secs(),
        time.delta_secs(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> TraceGenerator {
        TraceGenerator::new(TraceConfig {
            resolution: 64,
            world_size: 4.0,
            stamp_size: 16,
            foot_radius: 0.25,
            max_depth: 0.1,
            contact_height: 0.15,
            refill_delay: 5.0,
            refill_rate: 0.02,
        })
    }

    #[test]
    fn planted_foot_leaves_a_trace() {
        let generator = generator();
        let mut textures = TraceTextures::new(generator.config(), 0.0);
        let foot = Vec3::new(0.5, 0.05, 0.5);

        assert!(generator.stamp_foot(&mut textures, foot, Vec3::ZERO, 1.0));

        let center = textures.sample_depth(foot.xz());
        let rim = textures.sample_depth(foot.xz() + Vec2::new(0.2, 0.0));
        assert!(center > 0.09 && center <= 0.1);
        assert!(rim > 0.0 && rim < center);
        assert_eq!(textures.sample_depth(foot.xz() + Vec2::new(0.3, 0.0)), 0.0);
        assert_eq!(textures.timer_map.get(textures.world_to_texel(foot.xz())), 1.0);
    }

    #[test]
    fn raised_foot_leaves_no_trace() {
        let generator = generator();
        let mut textures = TraceTextures::new(generator.config(), 0.0);
        let foot = Vec3::new(0.0, 0.5, 0.0);

        assert!(!generator.stamp_foot(&mut textures, foot, Vec3::ZERO, 1.0));
        assert!(textures.heightmap.data().iter().all(|&depth| depth == 0.0));
    }

    #[test]
    fn overlapping_footprints_keep_the_deepest_depth() {
        let generator = generator();
        let mut textures = TraceTextures::new(generator.config(), 0.0);

        generator.stamp_foot(&mut textures, Vec3::ZERO, Vec3::ZERO, 1.0);
        let depth = textures.sample_depth(Vec2::new(0.01, 0.01));

        generator.stamp_foot(&mut textures, Vec3::new(0.2, 0.0, 0.0), Vec3::ZERO, 2.0);
        assert_eq!(textures.sample_depth(Vec2::new(0.01, 0.01)), depth);
    }

    #[test]
    fn traces_refill_after_the_delay() {
        let generator = generator();
        let mut textures = TraceTextures::new(generator.config(), 0.0);
        let foot = Vec2::new(0.01, 0.01);

        generator.stamp_foot(&mut textures, foot.extend(0.0).xzy(), Vec3::ZERO, 0.0);
        let depth = textures.sample_depth(foot);

        generator.refill(&mut textures, 4.0, 1.0);
        assert_eq!(textures.sample_depth(foot), depth);

        generator.refill(&mut textures, 6.0, 1.0);
        assert!((textures.sample_depth(foot) - (depth - 0.02)).abs() < 1e-6);

        generator.refill(&mut textures, 20.0, 10.0);
        assert_eq!(textures.sample_depth(foot), 0.0);
    }

    #[test]
    fn update_initializes_the_maps_and_follows_the_player() {
        let generator = generator();
        let mut maps = TraceMaps::default();
        let player = Vec3::new(10.0, 0.0, 10.0);

        let planted = generator.update(
            &mut maps,
            player,
            [player + Vec3::new(0.1, 0.0, 0.0), player + Vec3::Y],
            0.0,
            0.016,
        );

        assert_eq!(planted, 1);
        let textures = maps.get().unwrap();
        assert!(textures.sample_depth(player.xz() + Vec2::new(0.1, 0.0)) > 0.0);
    }
}
