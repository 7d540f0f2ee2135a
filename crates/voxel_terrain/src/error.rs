//! Error types for configuration, the build pipeline, and the world facade

use glam::IVec3;

use crate::chunk::{MAX_CHUNK_HEIGHT, MAX_CHUNK_WIDTH, MAX_PADDED_VOLUME, WORLD_LIMIT};
use crate::job_queue::JobState;

/// Errors raised while loading or validating configuration
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Chunk width or height is out of range, or the padded lattice is too
    /// large
    InvalidDimension { width: u32, height: u32 },

    /// A noise layer has a zero, negative or non-finite scale
    InvalidNoiseScale { layer: &'static str },

    /// A value that must be finite is NaN or infinite
    NonFiniteValue { field: &'static str },

    /// A threshold bound lies outside [0, 1]
    ThresholdOutOfRange { layer: &'static str, bound: f32 },

    /// Both threshold bounds are enabled and min > max
    InvertedThreshold { layer: &'static str },

    /// Ground or terrain height is negative, or the tallest possible
    /// surface lies beyond the world limit
    InvalidTerrainHeight { ground_height: i32, terrain_height: i32 },

    /// Cave band offset lies beyond the world limit
    InvalidCaveHeight { relative_cave_height: i32 },

    /// Point-parallel sampling with a zero batch size
    InvalidBatchSize,

    /// IO error while reading or writing a config file
    Io(String),

    /// Config file could not be parsed or serialized
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidDimension { width, height } => {
                write!(
                    f,
                    "Invalid chunk dimensions {}x{} (width 1..={}, height 2..={}, at most {} padded points)",
                    width, height, MAX_CHUNK_WIDTH, MAX_CHUNK_HEIGHT, MAX_PADDED_VOLUME
                )
            }
            ConfigError::InvalidNoiseScale { layer } => {
                write!(f, "Noise scale for '{}' must be finite and > 0", layer)
            }
            ConfigError::NonFiniteValue { field } => write!(f, "Value '{}' is not finite", field),
            ConfigError::ThresholdOutOfRange { layer, bound } => {
                write!(f, "Threshold bound {} for '{}' is outside [0, 1]", bound, layer)
            }
            ConfigError::InvertedThreshold { layer } => {
                write!(f, "Threshold for '{}' has min > max", layer)
            }
            ConfigError::InvalidTerrainHeight { ground_height, terrain_height } => write!(
                f,
                "Ground height ({}) and terrain height ({}) must be >= 0 and sum to at most {}",
                ground_height, terrain_height, WORLD_LIMIT
            ),
            ConfigError::InvalidCaveHeight { relative_cave_height } => write!(
                f,
                "Relative cave height {} is outside -{}..={}",
                relative_cave_height, WORLD_LIMIT, WORLD_LIMIT
            ),
            ConfigError::InvalidBatchSize => write!(f, "Point sampling batch size must be >= 1"),
            ConfigError::Io(s) => write!(f, "IO error: {}", s),
            ConfigError::Parse(s) => write!(f, "Parse error: {}", s),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors raised by the chunk build pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// A build job was moved to a state that does not follow its current one
    InvalidTransition { coord: IVec3, from: JobState, to: JobState },

    /// The chunk is already built or in flight
    ChunkAlreadyBuilt(IVec3),

    /// The chunk is not in the live set
    ChunkNotBuilt(IVec3),

    /// The chunk's lattice lies outside the world coordinate limit
    CoordinateOutOfRange(IVec3),

    /// A unit was dropped before reporting completion (worker panicked)
    WorkerLost(IVec3),

    /// The worker pool could not be created
    ThreadPool(String),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::InvalidTransition { coord, from, to } => {
                write!(f, "Chunk {} cannot move from {:?} to {:?}", coord, from, to)
            }
            PipelineError::ChunkAlreadyBuilt(coord) => write!(f, "Chunk {} is already built", coord),
            PipelineError::ChunkNotBuilt(coord) => write!(f, "Chunk {} is not built", coord),
            PipelineError::CoordinateOutOfRange(coord) => {
                write!(f, "Chunk {} lies outside the world limit of {}", coord, WORLD_LIMIT)
            }
            PipelineError::WorkerLost(coord) => {
                write!(f, "Build unit for chunk {} stopped without a result", coord)
            }
            PipelineError::ThreadPool(s) => write!(f, "Thread pool error: {}", s),
        }
    }
}

impl std::error::Error for PipelineError {}

/// Top-level error for world operations
#[derive(Debug, Clone, PartialEq)]
pub enum TerrainError {
    Config(ConfigError),
    Pipeline(PipelineError),
}

impl std::fmt::Display for TerrainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerrainError::Config(e) => write!(f, "Configuration error: {}", e),
            TerrainError::Pipeline(e) => write!(f, "Pipeline error: {}", e),
        }
    }
}

impl std::error::Error for TerrainError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TerrainError::Config(e) => Some(e),
            TerrainError::Pipeline(e) => Some(e),
        }
    }
}

impl From<ConfigError> for TerrainError {
    fn from(e: ConfigError) -> Self {
        TerrainError::Config(e)
    }
}

impl From<PipelineError> for TerrainError {
    fn from(e: PipelineError) -> Self {
        TerrainError::Pipeline(e)
    }
}
