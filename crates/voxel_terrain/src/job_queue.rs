//! Parallel chunk build pipeline
//!
//! Pipeline: Pending → Sampling → Meshing → Complete
//!
//! Each chunk runs as two units on a rayon thread pool. The sampling unit
//! consumes a [`PendingJob`] and, once the grid is fully written, spawns the
//! meshing unit with the resulting [`SampledJob`], the only value meshing
//! accepts. No worker ever blocks waiting for another. The final result
//! comes back through a one-shot crossbeam channel.

use crossbeam_channel::{bounded, Receiver, TryRecvError};
use dashmap::DashMap;
use glam::IVec3;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use crate::chunk::{ChunkDims, DensityGrid};
use crate::error::PipelineError;
use crate::generator::DensitySampler;
use crate::marching_cubes;
use crate::material::MaterialPolicy;
use crate::meshing::MeshBuffers;
use crate::terrain_config::{SamplingMode, WorldConfig};

/// Build state of one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Pending,
    Sampling,
    Meshing,
    Complete,
}

impl JobState {
    /// States only move forward, one step at a time
    pub fn can_advance_to(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Pending, JobState::Sampling)
                | (JobState::Sampling, JobState::Meshing)
                | (JobState::Meshing, JobState::Complete)
        )
    }
}

/// Thread-safe map of chunk coordinate to build state
#[derive(Debug, Clone, Default)]
pub struct JobBoard {
    states: Arc<DashMap<IVec3, JobState>>,
}

impl JobBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, coord: IVec3) -> Option<JobState> {
        self.states.get(&coord).map(|s| *s)
    }

    pub fn contains(&self, coord: IVec3) -> bool {
        self.states.contains_key(&coord)
    }

    /// Register a new job; fails if the chunk is already tracked
    pub fn insert_pending(&self, coord: IVec3) -> Result<(), PipelineError> {
        use dashmap::mapref::entry::Entry;
        match self.states.entry(coord) {
            Entry::Occupied(_) => Err(PipelineError::ChunkAlreadyBuilt(coord)),
            Entry::Vacant(slot) => {
                slot.insert(JobState::Pending);
                Ok(())
            }
        }
    }

    pub fn advance(&self, coord: IVec3, to: JobState) -> Result<(), PipelineError> {
        let mut state = self
            .states
            .get_mut(&coord)
            .ok_or(PipelineError::ChunkNotBuilt(coord))?;
        if !state.can_advance_to(to) {
            return Err(PipelineError::InvalidTransition { coord, from: *state, to });
        }
        *state = to;
        Ok(())
    }

    pub fn remove(&self, coord: IVec3) -> Option<JobState> {
        self.states.remove(&coord).map(|(_, s)| s)
    }

    pub fn count(&self, state: JobState) -> usize {
        self.states.iter().filter(|e| *e.value() == state).count()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// A chunk whose grid storage is allocated but not yet written
#[derive(Debug)]
pub struct PendingJob {
    coord: IVec3,
    grid: DensityGrid,
}

impl PendingJob {
    pub fn new(coord: IVec3, dims: ChunkDims) -> Self {
        Self { coord, grid: DensityGrid::new_empty(dims.padded()) }
    }

    pub fn coord(&self) -> IVec3 {
        self.coord
    }

    /// Fill the whole grid; the returned job is the only way to mesh it
    pub fn sample(mut self, sampler: &DensitySampler, mode: SamplingMode) -> SampledJob {
        sampler.fill(&mut self.grid, self.coord, mode);
        SampledJob { coord: self.coord, grid: self.grid }
    }
}

/// A chunk with a fully populated density grid
#[derive(Debug)]
pub struct SampledJob {
    coord: IVec3,
    grid: DensityGrid,
}

impl SampledJob {
    pub fn coord(&self) -> IVec3 {
        self.coord
    }

    pub fn grid(&self) -> &DensityGrid {
        &self.grid
    }

    pub fn mesh(self, origin: IVec3, threshold: f32, policy: &MaterialPolicy) -> CompletedJob {
        let mesh = marching_cubes::extract(&self.grid, origin, threshold, policy);
        CompletedJob { coord: self.coord, grid: self.grid, mesh }
    }
}

/// Output of a finished build, handed back to the orchestrating thread
#[derive(Debug)]
pub struct CompletedJob {
    pub coord: IVec3,
    pub grid: DensityGrid,
    pub mesh: MeshBuffers,
}

/// One-shot handle for a submitted chunk build
#[derive(Debug)]
pub struct CompletionToken {
    coord: IVec3,
    rx: Receiver<Result<CompletedJob, PipelineError>>,
}

impl CompletionToken {
    pub fn coord(&self) -> IVec3 {
        self.coord
    }

    /// Block until the unit finishes
    pub fn wait(self) -> Result<CompletedJob, PipelineError> {
        self.rx.recv().map_err(|_| PipelineError::WorkerLost(self.coord))?
    }

    /// `None` while the unit is still running
    pub fn try_wait(&self) -> Option<Result<CompletedJob, PipelineError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(PipelineError::WorkerLost(self.coord))),
        }
    }
}

/// Shared, read-only inputs of every build unit
#[derive(Debug)]
struct BuildContext {
    sampler: DensitySampler,
    mode: SamplingMode,
    threshold: f32,
    policy: MaterialPolicy,
}

/// Schedules chunk builds on a dedicated worker pool
pub struct BuildPipeline {
    pool: ThreadPool,
    context: Arc<BuildContext>,
    board: JobBoard,
}

impl std::fmt::Debug for BuildPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildPipeline")
            .field("threads", &self.pool.current_num_threads())
            .field("context", &self.context)
            .field("board", &self.board)
            .finish()
    }
}

impl BuildPipeline {
    /// `config` is expected to be validated already
    pub fn new(config: &WorldConfig) -> Result<Self, PipelineError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.pipeline.worker_threads)
            .thread_name(|i| format!("terrain-worker-{}", i))
            .panic_handler(|_| tracing::error!("Terrain worker panicked outside a build unit"))
            .build()
            .map_err(|e| PipelineError::ThreadPool(e.to_string()))?;

        tracing::debug!(threads = pool.current_num_threads(), "Created build pipeline");

        Ok(Self {
            pool,
            context: Arc::new(BuildContext {
                sampler: DensitySampler::new(config.terrain.clone(), config.chunk.dims()),
                mode: config.pipeline.sampling,
                threshold: config.chunk.iso_threshold,
                policy: config.materials,
            }),
            board: JobBoard::new(),
        })
    }

    pub fn board(&self) -> &JobBoard {
        &self.board
    }

    pub fn sampler(&self) -> &DensitySampler {
        &self.context.sampler
    }

    pub fn dims(&self) -> ChunkDims {
        self.context.sampler.dims()
    }

    pub fn thread_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Schedule one chunk: a sampling unit followed by its meshing unit
    pub fn submit(&self, coord: IVec3) -> Result<CompletionToken, PipelineError> {
        self.check_coord(coord)?;
        self.board.insert_pending(coord)?;

        let (tx, rx) = bounded(1);
        let context = Arc::clone(&self.context);
        let board = self.board.clone();

        self.pool.spawn(move || {
            let sampled = guarded(coord, || sample_unit(&context, &board, coord));
            match sampled {
                // runs on the same pool as the sampling unit
                Ok(sampled) => rayon::spawn(move || {
                    let result = guarded(coord, || mesh_unit(&context, &board, sampled));
                    // receiver may be gone if the caller abandoned the token
                    let _ = tx.send(result);
                }),
                Err(e) => {
                    let _ = tx.send(Err(e));
                }
            }
        });

        Ok(CompletionToken { coord, rx })
    }

    /// Build every chunk in `coords` and wait for all of them
    ///
    /// Either every chunk completes or none is kept on the board.
    pub fn run(&self, coords: &[IVec3]) -> Result<Vec<CompletedJob>, PipelineError> {
        let mut seen = HashSet::with_capacity(coords.len());
        for &coord in coords {
            self.check_coord(coord)?;
            if !seen.insert(coord) || self.board.contains(coord) {
                return Err(PipelineError::ChunkAlreadyBuilt(coord));
            }
        }

        let start = Instant::now();
        let tokens = self.submit_all(coords)?;

        let mut completed = Vec::with_capacity(tokens.len());
        let mut failure = None;
        for token in tokens {
            let coord = token.coord();
            match token.wait() {
                Ok(job) => completed.push(job),
                Err(e) => {
                    tracing::warn!(?coord, "Chunk build failed: {}", e);
                    failure.get_or_insert(e);
                }
            }
        }

        if let Some(e) = failure {
            for &coord in coords {
                self.board.remove(coord);
            }
            return Err(e);
        }

        tracing::debug!(
            chunks = completed.len(),
            elapsed_ms = start.elapsed().as_secs_f32() * 1000.0,
            "Pipeline batch complete"
        );
        Ok(completed)
    }

    /// Submit every chunk, or none of them
    ///
    /// When a submit fails, the units already scheduled are waited for and
    /// their chunks removed from the board before the error is returned.
    fn submit_all(&self, coords: &[IVec3]) -> Result<Vec<CompletionToken>, PipelineError> {
        let mut tokens = Vec::with_capacity(coords.len());
        for &coord in coords {
            match self.submit(coord) {
                Ok(token) => tokens.push(token),
                Err(e) => {
                    tracing::warn!(?coord, "Batch submit failed, rolling back: {}", e);
                    for token in tokens {
                        let submitted = token.coord();
                        let _ = token.wait();
                        self.board.remove(submitted);
                    }
                    return Err(e);
                }
            }
        }
        Ok(tokens)
    }

    fn check_coord(&self, coord: IVec3) -> Result<(), PipelineError> {
        self.dims()
            .checked_origin(coord)
            .map(|_| ())
            .ok_or(PipelineError::CoordinateOutOfRange(coord))
    }

    /// Forget a chunk so it can be built again
    pub fn release(&self, coord: IVec3) -> Result<(), PipelineError> {
        match self.board.state(coord) {
            None => Err(PipelineError::ChunkNotBuilt(coord)),
            Some(JobState::Complete) => {
                self.board.remove(coord);
                Ok(())
            }
            Some(from) => Err(PipelineError::InvalidTransition {
                coord,
                from,
                to: JobState::Pending,
            }),
        }
    }
}

/// Run a unit, turning a panic into [`PipelineError::WorkerLost`]
fn guarded<T>(
    coord: IVec3,
    unit: impl FnOnce() -> Result<T, PipelineError>,
) -> Result<T, PipelineError> {
    catch_unwind(AssertUnwindSafe(unit)).unwrap_or_else(|_| {
        tracing::error!(?coord, "Build unit panicked");
        Err(PipelineError::WorkerLost(coord))
    })
}

fn sample_unit(
    context: &BuildContext,
    board: &JobBoard,
    coord: IVec3,
) -> Result<SampledJob, PipelineError> {
    let _span = tracing::debug_span!("sample_unit", ?coord).entered();
    board.advance(coord, JobState::Sampling)?;
    tracing::debug!("Sampling started");

    let job = PendingJob::new(coord, context.sampler.dims());
    let sampled = job.sample(&context.sampler, context.mode);

    board.advance(coord, JobState::Meshing)?;
    tracing::debug!(solids = sampled.grid().solid_count(), "Sampling finished");
    Ok(sampled)
}

fn mesh_unit(
    context: &BuildContext,
    board: &JobBoard,
    sampled: SampledJob,
) -> Result<CompletedJob, PipelineError> {
    let coord = sampled.coord();
    let _span = tracing::debug_span!("mesh_unit", ?coord).entered();

    let origin = context.sampler.dims().origin(coord);
    let completed = sampled.mesh(origin, context.threshold, &context.policy);

    board.advance(coord, JobState::Complete)?;
    tracing::debug!(triangles = completed.mesh.triangle_count(), "Meshing finished");
    Ok(completed)
}
