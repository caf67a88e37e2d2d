//! Shared-memory strategies that rendezvous once per round by joining.

use rand::rngs::StdRng;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::buffer::DoubleBuffer;
use crate::dispatch::{conclude, Dispatch};
use crate::error::{Error, Result};
use crate::partition::{partition, Segment};
use crate::rule::RuleParams;
use crate::util;

/// Computes the whole road as a single segment on the calling thread.
pub struct Sequential {
    rng: StdRng,
}

impl Sequential {
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            rng: util::worker_rng(seed, 0),
        }
    }
}

impl Dispatch for Sequential {
    fn name(&self) -> &str {
        "sequential"
    }

    fn round(&mut self, engine: &mut DoubleBuffer, params: &RuleParams, round: usize) -> Result<()> {
        let segment = Segment::new(0, engine.partition_size());
        let result = engine.compute(segment, params, &mut self.rng);
        conclude(engine, round, vec![result])
    }
}

/// Spawns a fresh thread for every segment of every round, joining them all
/// before the swap.
pub struct Scoped {
    workers: usize,
    rngs: Vec<StdRng>,
}

impl Scoped {
    pub fn new(workers: usize, seed: Option<u64>) -> Self {
        Self {
            workers,
            rngs: util::worker_rngs(seed, workers),
        }
    }
}

impl Dispatch for Scoped {
    fn name(&self) -> &str {
        "scoped"
    }

    fn round(&mut self, engine: &mut DoubleBuffer, params: &RuleParams, round: usize) -> Result<()> {
        let segments = partition(engine.partition_size(), self.workers)?;
        let shared: &DoubleBuffer = engine;
        let rngs = &mut self.rngs;
        let results = std::thread::scope(|s| {
            let handles = segments
                .iter()
                .zip(rngs.iter_mut())
                .map(|(segment, rng)| {
                    let segment = *segment;
                    s.spawn(move || shared.compute(segment, params, rng))
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|handle| handle.join().map_err(|_| Error::WorkerPanicked).and_then(|r| r))
                .collect::<Vec<_>>()
        });
        conclude(engine, round, results)
    }
}

/// Processes segments as a parallel iterator on a dedicated rayon pool.
pub struct Rayon {
    workers: usize,
    pool: ThreadPool,
    rngs: Vec<StdRng>,
}

impl Rayon {
    pub fn new(workers: usize, seed: Option<u64>) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("nasch-rayon-{}", i))
            .build()
            .map_err(|e| Error::Other(format!("failed building thread pool: {}", e)))?;
        Ok(Self {
            workers,
            pool,
            rngs: util::worker_rngs(seed, workers),
        })
    }
}

impl Dispatch for Rayon {
    fn name(&self) -> &str {
        "rayon"
    }

    fn round(&mut self, engine: &mut DoubleBuffer, params: &RuleParams, round: usize) -> Result<()> {
        let segments = partition(engine.partition_size(), self.workers)?;
        let shared: &DoubleBuffer = engine;
        let rngs = &mut self.rngs;
        let results = self.pool.install(|| {
            segments
                .par_iter()
                .zip(rngs.par_iter_mut())
                .map(|(segment, rng)| shared.compute(*segment, params, rng))
                .collect::<Vec<_>>()
        });
        conclude(engine, round, results)
    }
}
