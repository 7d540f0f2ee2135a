//! Density sampling for terrain chunks
//!
//! Every lattice point is classified solid or empty from a per-column height
//! field plus 3-D noise layers for caves, cave entrances and overhangs.
//! Classification is a pure function of the configuration and the world
//! position, so chunks and points can be sampled in any order on any thread.

use glam::{IVec2, IVec3, UVec3};
use rayon::prelude::*;

use crate::chunk::{index_for_pos, pos_for_index, ChunkDims, DensityGrid, EMPTY, SOLID};
use crate::noise_field::{NoiseField, NoiseSettings};
use crate::terrain_config::{SamplingMode, TerrainConfig};

/// Everything at or below this height is solid
pub const SOLID_GROUND_HEIGHT: i32 = 2;

/// Top of the band where cave floors get micro-relief
pub const CAVE_FLOOR_HEIGHT: i32 = SOLID_GROUND_HEIGHT + 5;

const CAVE_FLOOR_OFFSET: f32 = 690823.234;
const CAVE_FLOOR_LOW: NoiseSettings = NoiseSettings::new(0.5, CAVE_FLOOR_OFFSET);
const CAVE_FLOOR_HIGH: NoiseSettings = NoiseSettings::new(3.0, CAVE_FLOOR_OFFSET);

/// Erosion layer that shrinks the overhang band with height
const OVERHANG_NOISE: NoiseSettings = NoiseSettings::new(0.5, 345.345);

/// Domain of the ratio noise, sampled along world X only
const RATIO_DOMAIN: IVec2 = IVec2::new(1234, 1);

/// Values shared by every point of one (x, z) column
#[derive(Debug, Clone, Copy)]
struct Column {
    /// Blend factor between the two cave floor octaves
    ratio: f32,
    /// Height-field contribution above the ground level
    terrain: i32,
    surface_height: i32,
    /// Raw overhang noise, scaled by height per point
    overhang: f32,
}

/// Classifies lattice points and fills density grids
#[derive(Debug, Clone)]
pub struct DensitySampler {
    config: TerrainConfig,
    noise: NoiseField,
    dims: ChunkDims,
}

impl DensitySampler {
    pub fn new(config: TerrainConfig, dims: ChunkDims) -> Self {
        let noise = NoiseField::new(config.seed);
        Self { config, noise, dims }
    }

    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    pub fn dims(&self) -> ChunkDims {
        self.dims
    }

    /// Noise domain: the padded lattice of one chunk
    #[inline]
    fn domain(&self) -> IVec3 {
        self.dims.padded().as_ivec3()
    }

    #[inline]
    fn domain_2d(&self) -> IVec2 {
        let d = self.domain();
        IVec2::new(d.x, d.z)
    }

    fn column(&self, world_x: i32, world_z: i32) -> Column {
        let xz = IVec2::new(world_x, world_z);
        let ratio =
            self.noise.perlin_2d_int(IVec2::new(world_x, 1), self.config.ratio_noise, RATIO_DOMAIN);
        let height_noise =
            self.noise.perlin_2d_int(xz, self.config.surface_noise, self.domain_2d());
        let terrain = (height_noise * self.config.terrain_height as f32).ceil() as i32;
        let overhang = self.noise.perlin_2d_int(xz, OVERHANG_NOISE, self.domain_2d());

        Column {
            ratio,
            terrain,
            surface_height: terrain + self.config.ground_height,
            overhang,
        }
    }

    /// Density of a single world lattice point
    pub fn sample_point(&self, world: IVec3) -> f32 {
        let column = self.column(world.x, world.z);
        self.classify(world, &column)
    }

    /// Strict priority order; later branches assume earlier ones failed.
    fn classify(&self, world: IVec3, column: &Column) -> f32 {
        let y = world.y;
        let cave = &self.config.cave;

        if y <= column.surface_height {
            if y <= SOLID_GROUND_HEIGHT {
                return SOLID;
            }

            let cave_noise = self.noise.perlin_3d_int(world, cave.cave_noise, self.domain());
            let is_cave = cave.cave_threshold.contains_squared(cave_noise * cave_noise);

            if y < column.surface_height + cave.relative_cave_height {
                if !is_cave {
                    return SOLID;
                }
                if y <= CAVE_FLOOR_HEIGHT {
                    let xz = IVec2::new(world.x, world.z);
                    let low = self.noise.perlin_2d_int(xz, CAVE_FLOOR_LOW, self.domain_2d());
                    let high = self.noise.perlin_2d_int(xz, CAVE_FLOOR_HIGH, self.domain_2d());
                    let blended = low * column.ratio + (1.0 - column.ratio) * high;
                    return if y as f32 <= CAVE_FLOOR_HEIGHT as f32 * 2.0 * blended {
                        SOLID
                    } else {
                        EMPTY
                    };
                }
                return EMPTY;
            }

            if is_cave {
                let entrance =
                    self.noise.perlin_3d_int(world, cave.entrance_noise, self.domain());
                if cave.entrance_threshold.contains(entrance) {
                    return EMPTY;
                }
            }
            return SOLID;
        }

        let max_surface_height = column.terrain as f32 - (y as f32 / 2.0 * column.overhang);
        if y as f32 <= column.surface_height as f32 + max_surface_height {
            let surface = self.noise.perlin_3d_int(world, self.config.surface_noise, self.domain());
            if self.config.surface_threshold.contains(surface) {
                return SOLID;
            }
        }
        EMPTY
    }

    /// Sample the padded lattice of the chunk at `coord`
    pub fn sample_chunk(&self, coord: IVec3, mode: SamplingMode) -> DensityGrid {
        let mut grid = DensityGrid::new_empty(self.dims.padded());
        self.fill(&mut grid, coord, mode);
        grid
    }

    /// Overwrite every value of `grid` with the samples for `coord`
    pub fn fill(&self, grid: &mut DensityGrid, coord: IVec3, mode: SamplingMode) {
        let _span = tracing::trace_span!("sample_chunk", ?coord, ?mode).entered();
        match mode {
            SamplingMode::PerChunk => self.fill_per_chunk(grid, coord),
            SamplingMode::PerPoint { batch_size } => {
                self.fill_per_point(grid, coord, batch_size.max(1))
            }
        }
    }

    /// One sequential pass, column by column
    fn fill_per_chunk(&self, grid: &mut DensityGrid, coord: IVec3) {
        let origin = self.dims.origin(coord);
        let dim = grid.dims();
        let values = grid.values_mut();

        for x in 0..dim.x {
            for z in 0..dim.z {
                let world_x = origin.x + x as i32;
                let world_z = origin.z + z as i32;
                let column = self.column(world_x, world_z);
                for y in 0..dim.y {
                    let world = IVec3::new(world_x, origin.y + y as i32, world_z);
                    values[index_for_pos(x, y, z, dim)] = self.classify(world, &column);
                }
            }
        }
    }

    /// Every point independently, scheduled in batches of `batch_size`
    fn fill_per_point(&self, grid: &mut DensityGrid, coord: IVec3, batch_size: usize) {
        let origin = self.dims.origin(coord);
        let dim = grid.dims();

        grid.values_mut()
            .par_chunks_mut(batch_size)
            .enumerate()
            .for_each(|(batch, values)| {
                let start = batch * batch_size;
                for (i, value) in values.iter_mut().enumerate() {
                    let local: UVec3 = pos_for_index(start + i, dim);
                    *value = self.sample_point(origin + local.as_ivec3());
                }
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain_config::Threshold;
    use test_case::test_case;

    fn flat_sampler(width: u32, height: u32, ground: i32) -> DensitySampler {
        DensitySampler::new(TerrainConfig::flat(ground), ChunkDims::new(width, height))
    }

    #[test]
    fn test_flat_world_is_a_slab() {
        let sampler = flat_sampler(4, 8, 2);
        let grid = sampler.sample_chunk(IVec3::ZERO, SamplingMode::PerChunk);
        assert_eq!(grid.dims(), UVec3::new(5, 8, 5));
        for z in 0..5 {
            for y in 0..8 {
                for x in 0..5 {
                    let expected = if y <= 2 { SOLID } else { EMPTY };
                    assert_eq!(grid.get(x, y, z), expected, "at ({}, {}, {})", x, y, z);
                }
            }
        }
        assert_eq!(grid.solid_count(), 5 * 5 * 3);
    }

    #[test]
    fn test_bottom_layers_always_solid() {
        let sampler = DensitySampler::new(TerrainConfig::default(), ChunkDims::new(8, 48));
        for coord in [IVec3::ZERO, IVec3::new(-3, 0, 7), IVec3::new(11, 0, -2)] {
            let grid = sampler.sample_chunk(coord, SamplingMode::PerChunk);
            for z in 0..9 {
                for x in 0..9 {
                    for y in 0..=SOLID_GROUND_HEIGHT {
                        assert_eq!(grid.get(x, y, z), SOLID);
                    }
                }
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let a = DensitySampler::new(TerrainConfig::default(), ChunkDims::new(8, 48));
        let b = DensitySampler::new(TerrainConfig::default(), ChunkDims::new(8, 48));
        let coord = IVec3::new(2, 0, -1);
        assert_eq!(
            a.sample_chunk(coord, SamplingMode::PerChunk),
            b.sample_chunk(coord, SamplingMode::PerChunk)
        );
    }

    #[test_case(1)]
    #[test_case(7)]
    #[test_case(64)]
    #[test_case(100_000)]
    fn test_per_point_matches_per_chunk(batch_size: usize) {
        let sampler = DensitySampler::new(TerrainConfig::default(), ChunkDims::new(8, 48));
        let coord = IVec3::new(-1, 0, 3);
        let chunk = sampler.sample_chunk(coord, SamplingMode::PerChunk);
        let point = sampler.sample_chunk(coord, SamplingMode::PerPoint { batch_size });
        assert_eq!(chunk, point);
    }

    #[test]
    fn test_padding_matches_neighbour() {
        let sampler = DensitySampler::new(TerrainConfig::default(), ChunkDims::new(8, 48));
        let left = sampler.sample_chunk(IVec3::ZERO, SamplingMode::PerChunk);
        let right = sampler.sample_chunk(IVec3::new(1, 0, 0), SamplingMode::PerChunk);
        for z in 0..9 {
            for y in 0..48 {
                assert_eq!(left.get(8, y, z), right.get(0, y, z));
            }
        }
    }

    #[test]
    fn test_matching_cave_threshold_hollows_band() {
        let mut config = TerrainConfig::flat(20);
        config.cave.relative_cave_height = -4;
        let sampler = DensitySampler::new(config, ChunkDims::new(4, 32));
        let grid = sampler.sample_chunk(IVec3::ZERO, SamplingMode::PerChunk);

        for z in 0..5 {
            for x in 0..5 {
                for y in 0..=SOLID_GROUND_HEIGHT {
                    assert_eq!(grid.get(x, y, z), SOLID);
                }
                // cave interior and entrance band are carved out
                for y in (CAVE_FLOOR_HEIGHT + 1)..=20 {
                    assert_eq!(grid.get(x, y, z), EMPTY, "at ({}, {}, {})", x, y, z);
                }
            }
        }
    }

    #[test]
    fn test_unmatched_cave_threshold_keeps_rock() {
        let mut config = TerrainConfig::flat(20);
        config.cave.cave_threshold = Threshold::new(Some(1.0), Some(1.0));
        let sampler = DensitySampler::new(config, ChunkDims::new(4, 32));
        let grid = sampler.sample_chunk(IVec3::ZERO, SamplingMode::PerChunk);

        for z in 0..5 {
            for x in 0..5 {
                for y in 0..32 {
                    let expected = if y <= 20 { SOLID } else { EMPTY };
                    assert_eq!(grid.get(x, y, z), expected);
                }
            }
        }
    }

    #[test]
    fn test_rejecting_entrance_threshold_keeps_band_solid() {
        let mut config = TerrainConfig::flat(20);
        config.cave.relative_cave_height = -4;
        config.cave.entrance_threshold = Threshold::new(Some(1.0), Some(1.0));
        let sampler = DensitySampler::new(config, ChunkDims::new(4, 32));
        let grid = sampler.sample_chunk(IVec3::new(3, 0, -1), SamplingMode::PerChunk);

        for z in 0..5 {
            for x in 0..5 {
                for y in (CAVE_FLOOR_HEIGHT + 1)..16 {
                    assert_eq!(grid.get(x, y, z), EMPTY, "at ({}, {}, {})", x, y, z);
                }
                for y in 16..=20 {
                    assert_eq!(grid.get(x, y, z), SOLID, "at ({}, {}, {})", x, y, z);
                }
                for y in 21..32 {
                    assert_eq!(grid.get(x, y, z), EMPTY);
                }
            }
        }
    }

    #[test]
    fn test_cave_floor_relief_follows_blended_noise() {
        let config = TerrainConfig::flat(20);
        let field = NoiseField::new(config.seed);
        let ratio_noise = config.ratio_noise;
        let sampler = DensitySampler::new(config, ChunkDims::new(4, 32));
        let domain = IVec2::new(5, 5);

        for coord in [IVec3::ZERO, IVec3::new(-2, 0, 3), IVec3::new(6, 0, -5)] {
            let grid = sampler.sample_chunk(coord, SamplingMode::PerChunk);
            let origin = sampler.dims().origin(coord);
            for z in 0..5 {
                for x in 0..5 {
                    let xz = IVec2::new(origin.x + x, origin.z + z);
                    let ratio =
                        field.perlin_2d_int(IVec2::new(xz.x, 1), ratio_noise, RATIO_DOMAIN);
                    let low = field.perlin_2d_int(xz, CAVE_FLOOR_LOW, domain);
                    let high = field.perlin_2d_int(xz, CAVE_FLOOR_HIGH, domain);
                    let blended = low * ratio + (1.0 - ratio) * high;
                    let relief = CAVE_FLOOR_HEIGHT as f32 * 2.0 * blended;

                    for y in (SOLID_GROUND_HEIGHT + 1)..=CAVE_FLOOR_HEIGHT {
                        let expected = if y as f32 <= relief { SOLID } else { EMPTY };
                        assert_eq!(
                            grid.get(x, y, z),
                            expected,
                            "at ({}, {}, {}) with relief {}",
                            xz.x,
                            y,
                            xz.y,
                            relief
                        );
                    }
                }
            }
        }
    }

    /// Hills up to 20 above the ground with solid rock underneath
    fn hill_sampler(surface_threshold: Threshold) -> DensitySampler {
        let mut config = TerrainConfig::flat(SOLID_GROUND_HEIGHT);
        config.terrain_height = 20;
        config.surface_threshold = surface_threshold;
        config.cave.cave_threshold = Threshold::new(Some(1.0), Some(1.0));
        DensitySampler::new(config, ChunkDims::new(4, 48))
    }

    #[test_case(Threshold::OPEN ; "open")]
    #[test_case(Threshold::new(Some(0.5), None) ; "upper half")]
    #[test_case(Threshold::new(Some(1.0), Some(1.0)) ; "rejecting")]
    fn test_overhangs_follow_surface_threshold(threshold: Threshold) {
        let sampler = hill_sampler(threshold);
        let config = sampler.config().clone();
        let field = NoiseField::new(config.seed);
        let domain = sampler.dims().padded().as_ivec3();
        let domain_2d = IVec2::new(domain.x, domain.z);
        let coord = IVec3::new(1, 0, -1);
        let origin = sampler.dims().origin(coord);
        let grid = sampler.sample_chunk(coord, SamplingMode::PerChunk);

        let mut within_height = 0;
        for z in 0..5 {
            for x in 0..5 {
                let xz = IVec2::new(origin.x + x, origin.z + z);
                let height_noise = field.perlin_2d_int(xz, config.surface_noise, domain_2d);
                let terrain = (height_noise * config.terrain_height as f32).ceil() as i32;
                let surface = terrain + config.ground_height;
                let overhang = field.perlin_2d_int(xz, OVERHANG_NOISE, domain_2d);

                for y in 0..48 {
                    let expected = if y <= surface {
                        SOLID
                    } else {
                        let max_height =
                            surface as f32 + (terrain as f32 - y as f32 / 2.0 * overhang);
                        let noise = field.perlin_3d_int(
                            origin + IVec3::new(x, y, z),
                            config.surface_noise,
                            domain,
                        );
                        if y as f32 <= max_height {
                            within_height += 1;
                        }
                        if y as f32 <= max_height && threshold.contains(noise) {
                            SOLID
                        } else {
                            EMPTY
                        }
                    };
                    assert_eq!(grid.get(x, y, z), expected, "at ({}, {}, {})", xz.x, y, xz.y);
                }
            }
        }
        assert!(within_height > 0, "no point above the surface is within overhang height");
    }

    #[test]
    fn test_sample_point_agrees_with_grid() {
        let sampler = DensitySampler::new(TerrainConfig::default(), ChunkDims::new(8, 48));
        let coord = IVec3::new(4, 0, -6);
        let grid = sampler.sample_chunk(coord, SamplingMode::PerChunk);
        let origin = sampler.dims().origin(coord);
        for (x, y, z) in [(0, 0, 0), (3, 20, 5), (8, 47, 8), (1, 30, 2)] {
            assert_eq!(
                grid.get(x, y, z),
                sampler.sample_point(origin + IVec3::new(x, y, z))
            );
        }
    }
}
