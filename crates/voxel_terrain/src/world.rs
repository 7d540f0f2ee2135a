//! Live set of built chunks and the hand-off to a mesh consumer
//!
//! All mutation of the chunk map happens on the caller's thread after the
//! pipeline has finished every unit of a batch. Builds borrow the world
//! mutably, so a chunk cannot be retired while one of its units still runs.

use glam::IVec3;
use std::collections::HashMap;

use crate::chunk::{ChunkDims, SolidMask, EMPTY};
use crate::error::{PipelineError, TerrainError};
use crate::job_queue::{BuildPipeline, JobState};
use crate::meshing::MeshUpload;
use crate::terrain_config::WorldConfig;

/// Receiver of finished chunk meshes (renderer, exporter, ...)
pub trait MeshConsumer {
    /// Take ownership of a chunk's mesh
    fn upload(&mut self, coord: IVec3, mesh: MeshUpload);

    /// The chunk was retired; drop anything held for it
    fn discard(&mut self, coord: IVec3);
}

/// Consumer that keeps every mesh in memory
#[derive(Debug, Default, Clone)]
pub struct MeshCollector {
    pub meshes: HashMap<IVec3, MeshUpload>,
}

impl MeshConsumer for MeshCollector {
    fn upload(&mut self, coord: IVec3, mesh: MeshUpload) {
        self.meshes.insert(coord, mesh);
    }

    fn discard(&mut self, coord: IVec3) {
        self.meshes.remove(&coord);
    }
}

/// What the world keeps for a built chunk once its buffers are handed off
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub coord: IVec3,
    pub solids: SolidMask,
    pub vertex_count: usize,
    pub triangle_count: usize,
}

#[derive(Debug)]
pub struct TerrainWorld<C: MeshConsumer> {
    config: WorldConfig,
    pipeline: BuildPipeline,
    chunks: HashMap<IVec3, ChunkRecord>,
    consumer: C,
}

impl<C: MeshConsumer> TerrainWorld<C> {
    pub fn new(config: WorldConfig, consumer: C) -> Result<Self, TerrainError> {
        config.validate()?;
        let pipeline = BuildPipeline::new(&config)?;
        tracing::info!(
            width = config.chunk.width,
            height = config.chunk.height,
            seed = config.terrain.seed,
            threads = pipeline.thread_count(),
            "Terrain world ready"
        );
        Ok(Self { config, pipeline, chunks: HashMap::new(), consumer })
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn dims(&self) -> ChunkDims {
        self.pipeline.dims()
    }

    pub fn consumer(&self) -> &C {
        &self.consumer
    }

    pub fn consumer_mut(&mut self) -> &mut C {
        &mut self.consumer
    }

    pub fn into_consumer(self) -> C {
        self.consumer
    }

    pub fn chunk(&self, coord: IVec3) -> Option<&ChunkRecord> {
        self.chunks.get(&coord)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_built(&self, coord: IVec3) -> bool {
        self.chunks.contains_key(&coord)
    }

    pub fn coords(&self) -> impl Iterator<Item = IVec3> + '_ {
        self.chunks.keys().copied()
    }

    pub fn state(&self, coord: IVec3) -> Option<JobState> {
        self.pipeline.board().state(coord)
    }

    pub fn build_chunk(&mut self, coord: IVec3) -> Result<&ChunkRecord, TerrainError> {
        self.build_all(&[coord])?;
        self.chunks
            .get(&coord)
            .ok_or(TerrainError::Pipeline(PipelineError::ChunkNotBuilt(coord)))
    }

    /// Build a batch of chunks in parallel and hand their meshes over
    ///
    /// Nothing is recorded unless the whole batch succeeds.
    pub fn build_all(&mut self, coords: &[IVec3]) -> Result<usize, TerrainError> {
        let _span = tracing::info_span!("build_all", chunks = coords.len()).entered();
        if let Some(&coord) = coords.iter().find(|c| self.chunks.contains_key(*c)) {
            tracing::warn!(?coord, "Rejected build of a live chunk");
            return Err(PipelineError::ChunkAlreadyBuilt(coord).into());
        }

        let completed = self.pipeline.run(coords)?;
        let count = completed.len();

        for job in completed {
            let record = ChunkRecord {
                coord: job.coord,
                solids: job.grid.compact(),
                vertex_count: job.mesh.vertex_count(),
                triangle_count: job.mesh.triangle_count(),
            };
            self.consumer.upload(job.coord, job.mesh.into_upload(&self.config.materials));
            self.chunks.insert(job.coord, record);
        }

        tracing::info!(built = count, live = self.chunks.len(), "Chunks built");
        Ok(count)
    }

    /// Build an `n x n` square of chunks centred on the origin at y = 0
    pub fn build_square(&mut self, n: u32) -> Result<usize, TerrainError> {
        self.build_all(&square_coords(n))
    }

    /// Remove a chunk from the live set and tell the consumer to drop it
    pub fn retire_chunk(&mut self, coord: IVec3) -> Result<ChunkRecord, TerrainError> {
        let Some(record) = self.chunks.remove(&coord) else {
            tracing::warn!(?coord, "Rejected retire of an unknown chunk");
            return Err(PipelineError::ChunkNotBuilt(coord).into());
        };
        self.pipeline.release(coord)?;
        self.consumer.discard(coord);
        tracing::info!(?coord, live = self.chunks.len(), "Chunk retired");
        Ok(record)
    }

    /// Density at a world lattice point; [`EMPTY`] if its chunk is not built
    pub fn density_at(&self, world: IVec3) -> f32 {
        let dims = self.dims();
        let Some(record) = self.chunks.get(&dims.chunk_of(world)) else {
            return EMPTY;
        };
        let local = dims.local_of(world).as_ivec3();
        record.solids.get(local.x, local.y, local.z)
    }
}

/// Chunk coordinates of an `n x n` square, x and z in `-floor(n/2)..ceil(n/2)`
pub fn square_coords(n: u32) -> Vec<IVec3> {
    let lo = -((n / 2) as i32);
    let hi = n.div_ceil(2) as i32;
    (lo..hi)
        .flat_map(|x| (lo..hi).map(move |z| IVec3::new(x, 0, z)))
        .collect()
}
