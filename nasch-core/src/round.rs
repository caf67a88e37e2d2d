//! Cyclic round barrier.
//!
//! Coordinates a fixed number of parties processing the same rounds. Each
//! party signals the end of its compute phase by calling
//! [`RoundBarrier::arrive`]. The last party to arrive runs the round's swap
//! action while all the others are parked, then releases everyone into the
//! next round.
//!
//! Any failure breaks the barrier: parties currently waiting, and parties
//! arriving later, are all released with an error so that nobody waits for
//! a rendezvous that can never complete.
//!
//! [`RoundBarrier::arrive`]: struct.RoundBarrier.html#method.arrive

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Observable phase of the round protocol.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundState {
    /// Parties are computing, some have not yet arrived
    Computing,
    /// All parties arrived, the swap action is running
    Swapping,
    /// All rounds are done or the barrier was broken
    Idle,
}

#[derive(Debug)]
struct Inner {
    state: RoundState,
    arrived: usize,
    /// Number of completed rounds
    generation: usize,
    rounds_left: usize,
    broken: bool,
}

#[derive(Debug)]
pub struct RoundBarrier {
    parties: usize,
    timeout: Option<Duration>,
    inner: Mutex<Inner>,
    cvar: Condvar,
}

impl RoundBarrier {
    /// Creates a barrier for `parties` parties that will process `rounds`
    /// rounds in total.
    pub fn new(parties: usize, rounds: usize) -> Self {
        let state = if rounds == 0 || parties == 0 {
            RoundState::Idle
        } else {
            RoundState::Computing
        };
        Self {
            parties,
            timeout: None,
            inner: Mutex::new(Inner {
                state,
                arrived: 0,
                generation: 0,
                rounds_left: rounds,
                broken: false,
            }),
            cvar: Condvar::new(),
        }
    }

    /// Sets the maximum time a party will wait for the others to arrive.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // the inner state stays consistent even if a swap action panicked
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> RoundState {
        self.lock().state
    }

    /// Number of rounds completed so far.
    pub fn completed(&self) -> usize {
        self.lock().generation
    }

    pub fn is_broken(&self) -> bool {
        self.lock().broken
    }

    /// Breaks the barrier, releasing all waiting parties with an error.
    pub fn abort(&self) {
        let mut inner = self.lock();
        if !inner.broken {
            warn!("round {} aborted", inner.generation);
        }
        inner.broken = true;
        inner.state = RoundState::Idle;
        self.cvar.notify_all();
    }

    /// Signals that the calling party finished computing the current round.
    ///
    /// Blocks until all parties arrived. The last one runs `on_complete`,
    /// passing it the index of the round being completed. The action runs
    /// exactly once per round and never while any party is still computing.
    ///
    /// Returns whether there are more rounds to process.
    pub fn arrive<F>(&self, on_complete: F) -> Result<bool>
    where
        F: FnOnce(usize) -> Result<()>,
    {
        let mut inner = self.lock();
        let generation = inner.generation;
        if inner.broken {
            return Err(Error::RoundAborted(generation));
        }
        if inner.state == RoundState::Idle {
            return Err(Error::ProtocolViolation(
                "arrived at a barrier with no rounds left".to_string(),
            ));
        }

        inner.arrived += 1;
        if inner.arrived == self.parties {
            inner.state = RoundState::Swapping;
            trace!("round {}: all {} parties arrived", generation, self.parties);
            if let Err(e) = on_complete(generation) {
                inner.broken = true;
                inner.state = RoundState::Idle;
                self.cvar.notify_all();
                return Err(e);
            }
            inner.arrived = 0;
            inner.generation += 1;
            inner.rounds_left -= 1;
            inner.state = if inner.rounds_left == 0 {
                RoundState::Idle
            } else {
                RoundState::Computing
            };
            self.cvar.notify_all();
            return Ok(inner.rounds_left > 0);
        }

        let deadline = self.timeout.map(|t| Instant::now() + t);
        while inner.generation == generation && !inner.broken {
            inner = match deadline {
                None => self
                    .cvar
                    .wait(inner)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        inner.broken = true;
                        inner.state = RoundState::Idle;
                        self.cvar.notify_all();
                        error!("round {} timed out waiting for the rendezvous", generation);
                        return Err(Error::RoundTimedOut(generation));
                    }
                    self.cvar
                        .wait_timeout(inner, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
        if inner.generation == generation {
            return Err(Error::RoundAborted(generation));
        }
        Ok(inner.rounds_left > 0)
    }
}

/// Breaks the barrier if the owning thread unwinds, so that peers don't
/// wait forever for a party that will never arrive.
pub(crate) struct AbortOnPanic<'a>(pub &'a RoundBarrier);

impl<'a> Drop for AbortOnPanic<'a> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.abort();
        }
    }
}
