#![forbid(unsafe_code)]
#![deny(warnings)]
pub mod chunk;
pub mod error;
pub mod generator;
pub mod job_queue;
pub mod marching_cubes;
pub mod material;
pub mod meshing;
pub mod noise_field;
pub mod terrain_config;
pub mod world;

pub use chunk::{ChunkDims, DensityGrid, SolidMask, EMPTY, SOLID, WORLD_LIMIT};
pub use error::{ConfigError, PipelineError, TerrainError};
pub use generator::DensitySampler;
pub use job_queue::{BuildPipeline, CompletionToken, JobBoard, JobState};
pub use material::{MaterialPalette, MaterialPolicy, MaterialTag};
pub use meshing::{MeshBuffers, MeshUpload};
pub use noise_field::{NoiseField, NoiseSettings};
pub use terrain_config::{
    CaveSettings, ChunkSettings, PipelineSettings, SamplingMode, TerrainConfig, Threshold,
    WorldConfig,
};
pub use world::{MeshCollector, MeshConsumer, TerrainWorld};
