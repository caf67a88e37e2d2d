//! Persistent workers synchronized by the cyclic round barrier.
//!
//! Worker threads live for the whole run. During a round each one holds a
//! shared read lock on the engine while computing its segment, then arrives
//! at the barrier. The last one to arrive takes the exclusive lock and
//! advances the engine, so the swap can't overlap with a compute.

use std::sync::{Mutex, RwLock};
use std::time::Duration;

use rand::rngs::StdRng;

use crate::buffer::DoubleBuffer;
use crate::dispatch::{pick_error, Dispatch};
use crate::error::{Error, Result};
use crate::partition::partition;
use crate::round::{AbortOnPanic, RoundBarrier};
use crate::rule::RuleParams;
use crate::sim::{unobserved, RoundObserver};
use crate::util;

pub struct Barrier {
    workers: usize,
    timeout: Option<Duration>,
    rngs: Vec<StdRng>,
}

impl Barrier {
    pub fn new(workers: usize, seed: Option<u64>) -> Self {
        Self {
            workers,
            timeout: None,
            rngs: util::worker_rngs(seed, workers),
        }
    }

    /// Sets the maximum time a worker waits at the rendezvous.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Dispatch for Barrier {
    fn name(&self) -> &str {
        "barrier"
    }

    fn round(&mut self, engine: &mut DoubleBuffer, params: &RuleParams, round: usize) -> Result<()> {
        let mut clock = round;
        self.run(engine, params, 1, &mut clock, &mut unobserved)
    }

    fn run(
        &mut self,
        engine: &mut DoubleBuffer,
        params: &RuleParams,
        rounds: usize,
        clock: &mut usize,
        observer: &mut dyn RoundObserver,
    ) -> Result<()> {
        if rounds == 0 {
            return Ok(());
        }
        let segments = partition(engine.partition_size(), self.workers)?;
        if segments.is_empty() {
            // nothing to compute, rounds reduce to bare swaps
            for _ in 0..rounds {
                engine.advance()?;
                *clock += 1;
                observer.observe(*clock, engine);
            }
            return Ok(());
        }

        let start = *clock;
        let barrier = RoundBarrier::new(segments.len(), rounds).with_timeout(self.timeout);
        let shared = RwLock::new(std::mem::take(engine));
        let observer = Mutex::new(observer);
        let rngs = &mut self.rngs;
        debug!(
            "starting {} barrier workers for {} rounds",
            segments.len(),
            rounds
        );

        let results = std::thread::scope(|s| {
            let handles = segments
                .iter()
                .zip(rngs.iter_mut())
                .map(|(segment, rng)| {
                    let segment = *segment;
                    let (barrier, shared, observer) = (&barrier, &shared, &observer);
                    s.spawn(move || -> Result<()> {
                        let _guard = AbortOnPanic(barrier);
                        loop {
                            let computed = match shared.read() {
                                Ok(engine) => engine.compute(segment, params, rng),
                                Err(_) => Err(Error::LockPoisoned("engine".to_string())),
                            };
                            if let Err(e) = computed {
                                barrier.abort();
                                return Err(e);
                            }
                            let more = barrier.arrive(|generation| {
                                let mut engine = shared
                                    .write()
                                    .map_err(|_| Error::LockPoisoned("engine".to_string()))?;
                                engine.advance()?;
                                let mut observer = observer
                                    .lock()
                                    .map_err(|_| Error::LockPoisoned("observer".to_string()))?;
                                observer.observe(start + generation + 1, &engine);
                                Ok(())
                            })?;
                            if !more {
                                return Ok(());
                            }
                        }
                    })
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|handle| handle.join().map_err(|_| Error::WorkerPanicked).and_then(|r| r))
                .collect::<Vec<_>>()
        });

        *engine = shared
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *clock = start + barrier.completed();

        match pick_error(results) {
            None => Ok(()),
            Some(e) => {
                engine.discard();
                error!("barrier run stopped at round {}: {}", clock, e);
                Err(e)
            }
        }
    }
}
