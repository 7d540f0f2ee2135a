//! Configuration for terrain generation and the build pipeline
//!
//! Loaded from a JSON file (see [`WorldConfig::load`]). Every section has a
//! default, so a partial file only needs the values it changes.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::chunk::{
    ChunkDims, EMPTY, MAX_CHUNK_HEIGHT, MAX_CHUNK_WIDTH, MAX_PADDED_VOLUME, SOLID, WORLD_LIMIT,
};
use crate::error::ConfigError;
use crate::material::MaterialPolicy;
use crate::noise_field::NoiseSettings;

/// Accepted range for a noise value. A `None` bound disables that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    #[serde(default)]
    pub min: Option<f32>,
    #[serde(default)]
    pub max: Option<f32>,
}

impl Threshold {
    /// Both sides disabled: every value is accepted
    pub const OPEN: Threshold = Threshold { min: None, max: None };

    pub const fn new(min: Option<f32>, max: Option<f32>) -> Self {
        Self { min, max }
    }

    /// Build from sentinel-style bounds where a negative value disables
    /// that side
    pub fn from_bounds(min: f32, max: f32) -> Self {
        Self {
            min: (min >= 0.0).then_some(min),
            max: (max >= 0.0).then_some(max),
        }
    }

    #[inline]
    pub fn contains(&self, value: f32) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }

    /// Test an already-squared value against the squared bounds
    #[inline]
    pub fn contains_squared(&self, value_sq: f32) -> bool {
        self.min.map_or(true, |min| value_sq >= min * min)
            && self.max.map_or(true, |max| value_sq <= max * max)
    }

    fn validate(&self, layer: &'static str) -> Result<(), ConfigError> {
        for bound in [self.min, self.max].into_iter().flatten() {
            if !bound.is_finite() {
                return Err(ConfigError::NonFiniteValue { field: layer });
            }
            if !(0.0..=1.0).contains(&bound) {
                return Err(ConfigError::ThresholdOutOfRange { layer, bound });
            }
        }
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(ConfigError::InvertedThreshold { layer });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaveSettings {
    /// Applied to the squared cave noise
    pub cave_threshold: Threshold,
    pub cave_noise: NoiseSettings,
    pub entrance_threshold: Threshold,
    pub entrance_noise: NoiseSettings,
    /// Offset from the surface where the cave band ends; negative keeps
    /// caves below the surface
    pub relative_cave_height: i32,
}

impl Default for CaveSettings {
    fn default() -> Self {
        Self {
            cave_threshold: Threshold::new(Some(0.46), Some(0.53)),
            cave_noise: NoiseSettings::new(1.5, 300.0),
            entrance_threshold: Threshold::new(Some(0.52), None),
            entrance_noise: NoiseSettings::new(1.0, 700.0),
            relative_cave_height: -4,
        }
    }
}

/// Immutable description of deterministic terrain generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    pub ground_height: i32,
    pub terrain_height: i32,
    pub surface_noise: NoiseSettings,
    pub surface_threshold: Threshold,
    pub ratio_noise: NoiseSettings,
    pub cave: CaveSettings,
    /// Permutation seed of the gradient noise
    pub seed: u32,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            ground_height: 20,
            terrain_height: 24,
            surface_noise: NoiseSettings::new(0.35, 1000.0),
            surface_threshold: Threshold::new(Some(0.56), None),
            ratio_noise: NoiseSettings::new(1.0, 50.0),
            cave: CaveSettings::default(),
            seed: 0,
        }
    }
}

impl TerrainConfig {
    /// Flat ground at `ground_height` with every noise threshold disabled
    pub fn flat(ground_height: i32) -> Self {
        Self {
            ground_height,
            terrain_height: 0,
            surface_threshold: Threshold::OPEN,
            cave: CaveSettings {
                cave_threshold: Threshold::OPEN,
                entrance_threshold: Threshold::OPEN,
                ..CaveSettings::default()
            },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let heights = 0..=WORLD_LIMIT;
        if !heights.contains(&self.ground_height)
            || !heights.contains(&self.terrain_height)
            || self.ground_height + self.terrain_height > WORLD_LIMIT
        {
            return Err(ConfigError::InvalidTerrainHeight {
                ground_height: self.ground_height,
                terrain_height: self.terrain_height,
            });
        }
        if !(-WORLD_LIMIT..=WORLD_LIMIT).contains(&self.cave.relative_cave_height) {
            return Err(ConfigError::InvalidCaveHeight {
                relative_cave_height: self.cave.relative_cave_height,
            });
        }

        let layers = [
            ("surface_noise", self.surface_noise),
            ("ratio_noise", self.ratio_noise),
            ("cave_noise", self.cave.cave_noise),
            ("entrance_noise", self.cave.entrance_noise),
        ];
        for (layer, noise) in layers {
            if !noise.scale.is_finite() || noise.scale <= 0.0 {
                return Err(ConfigError::InvalidNoiseScale { layer });
            }
            if !noise.offset.is_finite() {
                return Err(ConfigError::NonFiniteValue { field: layer });
            }
        }

        self.surface_threshold.validate("surface_threshold")?;
        self.cave.cave_threshold.validate("cave_threshold")?;
        self.cave.entrance_threshold.validate("entrance_threshold")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkSettings {
    pub width: u32,
    pub height: u32,
    /// Isosurface level between SOLID and EMPTY
    pub iso_threshold: f32,
}

impl Default for ChunkSettings {
    fn default() -> Self {
        Self { width: 16, height: 64, iso_threshold: 0.5 }
    }
}

impl ChunkSettings {
    pub fn dims(&self) -> ChunkDims {
        ChunkDims::new(self.width, self.height)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_CHUNK_WIDTH).contains(&self.width)
            || !(2..=MAX_CHUNK_HEIGHT).contains(&self.height)
            || self.dims().padded_volume() > MAX_PADDED_VOLUME
        {
            return Err(ConfigError::InvalidDimension { width: self.width, height: self.height });
        }
        if !self.iso_threshold.is_finite() {
            return Err(ConfigError::NonFiniteValue { field: "iso_threshold" });
        }
        if self.iso_threshold <= SOLID.min(EMPTY) || self.iso_threshold >= SOLID.max(EMPTY) {
            return Err(ConfigError::ThresholdOutOfRange {
                layer: "iso_threshold",
                bound: self.iso_threshold,
            });
        }
        Ok(())
    }
}

/// How density sampling is split into work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamplingMode {
    /// One sequential unit touches every point of its chunk
    PerChunk,
    /// Every lattice point is an independent task, scheduled in batches
    PerPoint { batch_size: usize },
}

impl Default for SamplingMode {
    fn default() -> Self {
        Self::PerChunk
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub sampling: SamplingMode,
    /// Worker thread count; 0 uses the available parallelism
    pub worker_threads: usize,
}

impl PipelineSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.sampling {
            SamplingMode::PerPoint { batch_size: 0 } => Err(ConfigError::InvalidBatchSize),
            _ => Ok(()),
        }
    }
}

/// Everything needed to build a world
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub chunk: ChunkSettings,
    pub terrain: TerrainConfig,
    pub pipeline: PipelineSettings,
    pub materials: MaterialPolicy,
}

impl WorldConfig {
    /// Read and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_json(&content)?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: WorldConfig =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty JSON, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }
        let content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))?;
        tracing::info!("Saved configuration to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunk.validate()?;
        self.terrain.validate()?;
        self.pipeline.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(WorldConfig::default().validate(), Ok(()));
        assert_eq!(TerrainConfig::flat(2).validate(), Ok(()));
    }

    #[test]
    fn test_serialize_deserialize() {
        let config = WorldConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized = WorldConfig::from_json(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = WorldConfig::from_json(r#"{ "chunk": { "width": 8 } }"#).unwrap();
        assert_eq!(config.chunk.width, 8);
        assert_eq!(config.chunk.height, ChunkSettings::default().height);
        assert_eq!(config.terrain, TerrainConfig::default());

        let config =
            WorldConfig::from_json(r#"{ "terrain": { "cave": { "relative_cave_height": -6 } } }"#)
                .unwrap();
        let defaults = CaveSettings::default();
        assert_eq!(config.terrain.cave.relative_cave_height, -6);
        assert_eq!(config.terrain.cave.cave_threshold, defaults.cave_threshold);
        assert_eq!(config.terrain.cave.entrance_noise, defaults.entrance_noise);
        assert_eq!(config.terrain.ground_height, TerrainConfig::default().ground_height);
    }

    #[test]
    fn test_partial_noise_settings_use_defaults() {
        let config =
            WorldConfig::from_json(r#"{ "terrain": { "surface_noise": { "scale": 2.0 } } }"#)
                .unwrap();
        assert_eq!(config.terrain.surface_noise, NoiseSettings::new(2.0, 0.0));
        assert_eq!(config.terrain.ratio_noise, TerrainConfig::default().ratio_noise);

        let config = WorldConfig::from_json(
            r#"{ "terrain": { "cave": { "cave_noise": { "offset": 12.5 } } } }"#,
        )
        .unwrap();
        assert_eq!(config.terrain.cave.cave_noise, NoiseSettings::new(1.0, 12.5));
    }

    #[test]
    fn test_sampling_mode_json() {
        let config = WorldConfig::from_json(
            r#"{ "pipeline": { "sampling": { "PerPoint": { "batch_size": 32 } } } }"#,
        )
        .unwrap();
        assert_eq!(config.pipeline.sampling, SamplingMode::PerPoint { batch_size: 32 });
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("voxel_terrain_cfg_{}", std::process::id()));
        let path = dir.join("world.json");
        let mut config = WorldConfig::default();
        config.terrain.seed = 42;
        config.save(&path).unwrap();
        let loaded = WorldConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = WorldConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test_case(0.4, 0.6, true)]
    #[test_case(0.4, 0.6, false ; "checks squared")]
    fn test_threshold_bounds(min: f32, max: f32, plain: bool) {
        let t = Threshold::new(Some(min), Some(max));
        if plain {
            assert!(t.contains(0.5));
            assert!(!t.contains(0.39));
            assert!(!t.contains(0.61));
        } else {
            assert!(t.contains_squared(0.25));
            assert!(!t.contains_squared(0.15));
            assert!(!t.contains_squared(0.37));
        }
    }

    #[test]
    fn test_sentinel_bounds_disable_sides() {
        let t = Threshold::from_bounds(-1.0, 0.3);
        assert_eq!(t, Threshold::new(None, Some(0.3)));
        assert!(t.contains(0.0));
        assert!(!t.contains(0.31));
        assert!(Threshold::from_bounds(-1.0, -1.0).contains(123.0));
    }

    #[test]
    fn test_rejects_zero_scale() {
        let mut terrain = TerrainConfig::default();
        terrain.cave.cave_noise.scale = 0.0;
        assert_eq!(
            terrain.validate(),
            Err(ConfigError::InvalidNoiseScale { layer: "cave_noise" })
        );
    }

    #[test]
    fn test_rejects_inverted_threshold() {
        let mut terrain = TerrainConfig::default();
        terrain.surface_threshold = Threshold::new(Some(0.8), Some(0.2));
        assert_eq!(
            terrain.validate(),
            Err(ConfigError::InvertedThreshold { layer: "surface_threshold" })
        );
    }

    #[test]
    fn test_rejects_negative_bound() {
        let mut terrain = TerrainConfig::default();
        terrain.cave.entrance_threshold = Threshold::new(Some(-0.5), None);
        assert!(matches!(
            terrain.validate(),
            Err(ConfigError::ThresholdOutOfRange { layer: "entrance_threshold", .. })
        ));
    }

    #[test_case(0, 64)]
    #[test_case(16, 1)]
    #[test_case(u32::MAX, 64 ; "width overflows padding")]
    #[test_case(16, u32::MAX ; "height beyond i32")]
    #[test_case(MAX_CHUNK_WIDTH + 1, 8 ; "width over the cap")]
    #[test_case(16, MAX_CHUNK_HEIGHT + 1 ; "height over the cap")]
    #[test_case(MAX_CHUNK_WIDTH, MAX_CHUNK_HEIGHT ; "volume over the cap")]
    fn test_rejects_bad_dimensions(width: u32, height: u32) {
        let chunk = ChunkSettings { width, height, ..ChunkSettings::default() };
        assert_eq!(chunk.validate(), Err(ConfigError::InvalidDimension { width, height }));
    }

    #[test]
    fn test_accepts_largest_chunk_within_volume() {
        let chunk = ChunkSettings { width: MAX_CHUNK_WIDTH, height: 64, ..ChunkSettings::default() };
        assert_eq!(chunk.validate(), Ok(()));
        assert!(chunk.dims().padded_volume() <= MAX_PADDED_VOLUME);
    }

    #[test_case(i32::MAX, 5 ; "sum overflows")]
    #[test_case(WORLD_LIMIT, 1 ; "sum past the limit")]
    #[test_case(0, WORLD_LIMIT + 1 ; "terrain past the limit")]
    #[test_case(-1, 0 ; "negative ground")]
    #[test_case(20, -1 ; "negative terrain")]
    fn test_rejects_bad_terrain_height(ground_height: i32, terrain_height: i32) {
        let mut terrain = TerrainConfig::flat(ground_height);
        terrain.terrain_height = terrain_height;
        assert_eq!(
            terrain.validate(),
            Err(ConfigError::InvalidTerrainHeight { ground_height, terrain_height })
        );
    }

    #[test]
    fn test_accepts_terrain_up_to_world_limit() {
        let mut terrain = TerrainConfig::flat(WORLD_LIMIT - 10);
        terrain.terrain_height = 10;
        assert_eq!(terrain.validate(), Ok(()));
    }

    #[test_case(i32::MIN)]
    #[test_case(WORLD_LIMIT + 1)]
    fn test_rejects_bad_cave_height(relative_cave_height: i32) {
        let mut terrain = TerrainConfig::default();
        terrain.cave.relative_cave_height = relative_cave_height;
        assert_eq!(
            terrain.validate(),
            Err(ConfigError::InvalidCaveHeight { relative_cave_height })
        );
    }

    #[test]
    fn test_rejects_zero_batch() {
        let pipeline = PipelineSettings {
            sampling: SamplingMode::PerPoint { batch_size: 0 },
            worker_threads: 0,
        };
        assert_eq!(pipeline.validate(), Err(ConfigError::InvalidBatchSize));
    }
}
