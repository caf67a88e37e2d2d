//! Pluggable strategies for spreading the per-round work.
//!
//! Every strategy drives the same [`DoubleBuffer`] through the same round
//! protocol: partition, compute each segment against the read snapshot,
//! wait for all segments to finish, then advance. They only differ in where
//! the segments get computed.
//!
//! [`DoubleBuffer`]: ../buffer/struct.DoubleBuffer.html

pub mod barrier;
pub mod local;

pub use barrier::Barrier;
pub use local::{Rayon, Scoped, Sequential};

use std::str::FromStr;

use crate::buffer::DoubleBuffer;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::rule::RuleParams;
use crate::sim::RoundObserver;

/// Round execution strategy.
pub trait Dispatch: Send {
    /// Short name used in logs and benchmark tables.
    fn name(&self) -> &str;

    /// Processes a single round, including the final advance.
    ///
    /// On error the engine's write buffer is discarded and the read snapshot
    /// is left at the last consistent state.
    fn round(&mut self, engine: &mut DoubleBuffer, params: &RuleParams, round: usize)
        -> Result<()>;

    /// Processes `rounds` consecutive rounds, incrementing `clock` and
    /// notifying the observer after each completed one.
    fn run(
        &mut self,
        engine: &mut DoubleBuffer,
        params: &RuleParams,
        rounds: usize,
        clock: &mut usize,
        observer: &mut dyn RoundObserver,
    ) -> Result<()> {
        for _ in 0..rounds {
            self.round(engine, params, *clock)?;
            *clock += 1;
            debug!("[{}] completed round {}", self.name(), clock);
            observer.observe(*clock, engine);
        }
        Ok(())
    }
}

/// Closes a round given the results of all its segments: advances the
/// engine if every segment succeeded, discards the write buffer otherwise.
pub(crate) fn conclude(
    engine: &mut DoubleBuffer,
    round: usize,
    results: Vec<Result<()>>,
) -> Result<()> {
    match pick_error(results) {
        None => match engine.advance() {
            Ok(()) => Ok(()),
            Err(e) => {
                engine.discard();
                error!("round {} failed to advance: {}", round, e);
                Err(e)
            }
        },
        Some(e) => {
            engine.discard();
            error!("round {} aborted: {}", round, e);
            Err(e)
        }
    }
}

/// Picks the root cause out of a set of results, preferring errors that
/// aren't mere consequences of another party's failure.
pub(crate) fn pick_error<T>(results: Vec<Result<T>>) -> Option<Error> {
    let mut secondary = None;
    for result in results {
        if let Err(e) = result {
            if !e.is_secondary() {
                return Some(e);
            }
            if secondary.is_none() {
                secondary = Some(e);
            }
        }
    }
    secondary
}

/// Names of the available local strategies.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Sequential,
    Scoped,
    Rayon,
    Barrier,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Sequential,
        Strategy::Scoped,
        Strategy::Rayon,
        Strategy::Barrier,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Sequential => "sequential",
            Strategy::Scoped => "scoped",
            Strategy::Rayon => "rayon",
            Strategy::Barrier => "barrier",
        }
    }

    /// Builds the dispatcher using worker count, seed and timeouts from
    /// the config.
    pub fn dispatcher(&self, config: &Config) -> Result<Box<dyn Dispatch>> {
        let dispatch: Box<dyn Dispatch> = match self {
            Strategy::Sequential => Box::new(Sequential::new(config.seed)),
            Strategy::Scoped => Box::new(Scoped::new(config.workers, config.seed)),
            Strategy::Rayon => Box::new(Rayon::new(config.workers, config.seed)?),
            Strategy::Barrier => Box::new(
                Barrier::new(config.workers, config.seed).with_timeout(config.round_timeout()),
            ),
        };
        Ok(dispatch)
    }
}

impl FromStr for Strategy {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sequential" | "seq" => Ok(Strategy::Sequential),
            "scoped" | "threads" => Ok(Strategy::Scoped),
            "rayon" | "stream" => Ok(Strategy::Rayon),
            "barrier" | "cyclic" => Ok(Strategy::Barrier),
            _ => Err(Error::Other(format!("unknown strategy: {}", s))),
        }
    }
}
