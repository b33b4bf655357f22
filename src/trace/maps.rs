use crate::config::TraceConfig;
use bevy::prelude::*;
use ndarray::Array2;

/// A square grid of texels, addressed with wrapping (toroidal) texel coordinates.
pub struct TexelGrid {
    data: Array2<f32>,
}

impl TexelGrid {
    pub fn new(resolution: u32, value: f32) -> Self {
        Self {
            data: Array2::from_elem((resolution as usize, resolution as usize), value),
        }
    }

    #[inline]
    pub fn resolution(&self) -> u32 {
        self.data.nrows() as u32
    }

    #[inline]
    fn wrap(&self, texel: IVec2) -> [usize; 2] {
        let resolution = self.resolution() as i32;
        [
            texel.y.rem_euclid(resolution) as usize,
            texel.x.rem_euclid(resolution) as usize,
        ]
    }

    #[inline]
    pub fn get(&self, texel: IVec2) -> f32 {
        self.data[self.wrap(texel)]
    }

    #[inline]
    pub fn set(&mut self, texel: IVec2, value: f32) {
        let index = self.wrap(texel);
        self.data[index] = value;
    }

    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }

    fn fill_column(&mut self, x: i32, value: f32) {
        let [_, column] = self.wrap(IVec2::new(x, 0));
        self.data.column_mut(column).fill(value);
    }

    fn fill_row(&mut self, z: i32, value: f32) {
        let [row, _] = self.wrap(IVec2::new(0, z));
        self.data.row_mut(row).fill(value);
    }

    #[inline]
    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut Array2<f32> {
        &mut self.data
    }
}

/// The trace heightmap and the timer map covering a square window around the player.
///
/// Texels are anchored in world space: a texel keeps its world location while the window moves,
/// only the texels scrolling into the window are cleared (see [`TraceTextures::recenter`]).
/// The heightmap stores the depth a surface is pressed down by, the timer map the time
/// each texel was last stamped.
pub struct TraceTextures {
    pub heightmap: TexelGrid,
    pub timer_map: TexelGrid,
    texels_per_unit: f32,
    /// The global texel coordinate of the first texel of the window.
    origin: IVec2,
}

impl TraceTextures {
    /// Creates cleared maps with the window centered on the world origin.
    pub fn new(config: &TraceConfig, time: f32) -> Self {
        let resolution = config.resolution;

        Self {
            heightmap: TexelGrid::new(resolution, 0.0),
            timer_map: TexelGrid::new(resolution, time),
            texels_per_unit: config.texels_per_unit(),
            origin: IVec2::splat(-(resolution as i32) / 2),
        }
    }

    #[inline]
    pub fn resolution(&self) -> u32 {
        self.heightmap.resolution()
    }

    #[inline]
    pub fn texels_per_unit(&self) -> f32 {
        self.texels_per_unit
    }

    #[inline]
    pub fn origin(&self) -> IVec2 {
        self.origin
    }

    #[inline]
    pub fn world_to_texel(&self, world_xz: Vec2) -> IVec2 {
        (world_xz * self.texels_per_unit).floor().as_ivec2()
    }

    #[inline]
    pub fn texel_center(&self, texel: IVec2) -> Vec2 {
        (texel.as_vec2() + 0.5) / self.texels_per_unit
    }

    #[inline]
    pub fn contains_texel(&self, texel: IVec2) -> bool {
        let end = self.origin + IVec2::splat(self.resolution() as i32);
        texel.cmpge(self.origin).all() && texel.cmplt(end).all()
    }

    /// The trace depth at a world position, zero outside of the window.
    pub fn sample_depth(&self, world_xz: Vec2) -> f32 {
        let texel = self.world_to_texel(world_xz);

        if self.contains_texel(texel) {
            self.heightmap.get(texel)
        } else {
            0.0
        }
    }

    /// Resets every texel, as if nothing was ever stamped before `time`.
    pub fn clear(&mut self, time: f32) {
        self.heightmap.fill(0.0);
        self.timer_map.fill(time);
    }

    fn clear_column(&mut self, x: i32, time: f32) {
        self.heightmap.fill_column(x, 0.0);
        self.timer_map.fill_column(x, time);
    }

    fn clear_row(&mut self, z: i32, time: f32) {
        self.heightmap.fill_row(z, 0.0);
        self.timer_map.fill_row(z, time);
    }

    /// Moves the window to be centered on `center_xz`.
    ///
    /// Texel columns and rows entering the window still hold the data of the world location
    /// one window size away and are cleared.
    pub fn recenter(&mut self, center_xz: Vec2, time: f32) {
        let resolution = self.resolution() as i32;
        let origin = self.world_to_texel(center_xz) - IVec2::splat(resolution / 2);
        let delta = origin - self.origin;

        if delta == IVec2::ZERO {
            return;
        }

        if delta.x.abs() >= resolution || delta.y.abs() >= resolution {
            self.clear(time);
        } else {
            let entering_columns = if delta.x > 0 {
                self.origin.x + resolution..origin.x + resolution
            } else {
                origin.x..self.origin.x
            };
            let entering_rows = if delta.y > 0 {
                self.origin.y + resolution..origin.y + resolution
            } else {
                origin.y..self.origin.y
            };

            for x in entering_columns {
                self.clear_column(x, time);
            }
            for z in entering_rows {
                self.clear_row(z, time);
            }
        }

        self.origin = origin;
    }
}

/// Owns the trace textures shared by all deformable meshes and the trace generator.
///
/// The textures are created lazily on first use and keep their size until they are torn down.
#[derive(Default, Resource)]
pub struct TraceMaps {
    textures: Option<TraceTextures>,
}

impl TraceMaps {
    pub fn get_or_init(&mut self, config: &TraceConfig, time: f32) -> &mut TraceTextures {
        self.textures.get_or_insert_with(|| {
            info!(
                "Creating trace maps with {0}x{0} texels covering {1}x{1} units.",
                config.resolution, config.world_size
            );
            TraceTextures::new(config, time)
        })
    }

    #[inline]
    pub fn get(&self) -> Option<&TraceTextures> {
        self.textures.as_ref()
    }

    #[inline]
    pub fn get_mut(&mut self) -> Option<&mut TraceTextures> {
        self.textures.as_mut()
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.textures.is_some()
    }

    /// Frees the textures, calling it on uninitialized maps does nothing.
    pub fn teardown(&mut self) {
        if self.textures.take().is_some() {
            info!("Released the trace maps.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> TraceConfig {
        TraceConfig {
            resolution: 64,
            world_size: 4.0,
            stamp_size: 16,
            ..default()
        }
    }

    #[test]
    fn maps_are_created_once_and_torn_down() {
        let mut maps = TraceMaps::default();
        assert!(maps.get().is_none());

        let config = TraceConfig::default();
        maps.get_or_init(&config, 0.0)
            .heightmap
            .set(IVec2::new(3, 4), 1.0);

        // a second call keeps the existing textures
        let textures = maps.get_or_init(&config, 10.0);
        assert_eq!(textures.resolution(), 1024);
        assert_eq!(textures.heightmap.get(IVec2::new(3, 4)), 1.0);
        assert_eq!(textures.timer_map.get(IVec2::ZERO), 0.0);

        maps.teardown();
        maps.teardown();
        assert!(!maps.is_initialized());
    }

    #[test]
    fn created_maps_are_cleared_to_the_creation_time() {
        let mut textures = TraceTextures::new(&small_config(), 3.0);
        assert!(textures.heightmap.data().iter().all(|&depth| depth == 0.0));
        assert!(textures.timer_map.data().iter().all(|&time| time == 3.0));

        textures.heightmap.set(IVec2::new(1, 2), 0.5);
        textures.timer_map.set(IVec2::new(1, 2), 4.0);
        textures.clear(6.0);
        assert_eq!(textures.heightmap.get(IVec2::new(1, 2)), 0.0);
        assert!(textures.timer_map.data().iter().all(|&time| time == 6.0));
    }

    #[test]
    fn sampling_outside_of_the_window_is_zero() {
        let mut textures = TraceTextures::new(&small_config(), 0.0);
        textures.heightmap.fill(1.0);

        // the window spans 4x4 units around the origin
        assert_eq!(textures.sample_depth(Vec2::new(1.9, -1.9)), 1.0);
        assert_eq!(textures.sample_depth(Vec2::new(2.1, 0.0)), 0.0);
        assert_eq!(textures.sample_depth(Vec2::new(0.0, -2.1)), 0.0);
    }

    #[test]
    fn recenter_clears_entering_texels_only() {
        let mut textures = TraceTextures::new(&small_config(), 0.0);
        let trace = Vec2::new(0.5, 0.5);
        let texel = textures.world_to_texel(trace);
        textures.heightmap.set(texel, 0.5);

        // move by one unit (16 texels), the trace stays inside the window
        textures.recenter(Vec2::new(1.0, 0.0), 2.0);
        assert_eq!(textures.sample_depth(trace), 0.5);
        assert_eq!(textures.origin(), IVec2::new(-16, -32));

        // entering columns are reset to the current time
        let entering = textures.world_to_texel(Vec2::new(2.5, 0.5));
        assert_eq!(textures.sample_depth(Vec2::new(2.5, 0.5)), 0.0);
        assert_eq!(textures.timer_map.get(entering), 2.0);

        // moving the window away and back drops the trace
        textures.recenter(Vec2::new(3.0, 0.0), 3.0);
        textures.recenter(Vec2::new(0.0, 0.0), 4.0);
        assert_eq!(textures.sample_depth(trace), 0.0);
    }

    #[test]
    fn teleporting_clears_everything() {
        let mut textures = TraceTextures::new(&small_config(), 0.0);
        textures.heightmap.fill(1.0);

        textures.recenter(Vec2::new(100.0, 100.0), 5.0);
        assert!(textures.heightmap.data().iter().all(|&depth| depth == 0.0));
        assert!(textures.timer_map.data().iter().all(|&time| time == 5.0));
    }
}
