//! Top-level simulation driver.

use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::buffer::{DoubleBuffer, Layout};
use crate::config::Config;
use crate::dispatch::Dispatch;
use crate::error::{Error, Result};
use crate::road::{PositionedVehicle, Road};

/// Hook invoked after every completed round with the new clock value and a
/// read-only view of the engine.
pub trait RoundObserver: Send {
    fn observe(&mut self, clock: usize, engine: &DoubleBuffer);
}

impl<F> RoundObserver for F
where
    F: FnMut(usize, &DoubleBuffer) + Send,
{
    fn observe(&mut self, clock: usize, engine: &DoubleBuffer) {
        self(clock, engine)
    }
}

/// Observer that ignores all rounds.
pub fn unobserved(_: usize, _: &DoubleBuffer) {}

/// Traffic simulation on a circular road.
///
/// Owns the configuration, the double-buffered road state and the dispatch
/// strategy used to process rounds. The clock counts completed rounds.
pub struct Sim {
    config: Config,
    engine: DoubleBuffer,
    dispatch: Box<dyn Dispatch>,
    clock: usize,
}

impl Sim {
    /// Creates a new simulation with vehicles placed at random, using the
    /// configured seed if any.
    pub fn new(config: Config, layout: Layout, dispatch: Box<dyn Dispatch>) -> Result<Self> {
        config.validate()?;
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let road = Road::random(&config, &mut rng)?;
        info!(
            "created road: length {}, {} vehicles, {} layout, {} dispatch",
            road.len(),
            road.vehicle_count(),
            layout.as_str(),
            dispatch.name()
        );
        Ok(Self {
            engine: DoubleBuffer::new(&road, layout),
            config,
            dispatch,
            clock: 0,
        })
    }

    /// Creates a new simulation starting from a fixed road. Road length and
    /// vehicle count in the config are overridden by the road's.
    pub fn from_road(
        mut config: Config,
        road: Road,
        layout: Layout,
        dispatch: Box<dyn Dispatch>,
    ) -> Result<Self> {
        config.road_length = road.len();
        config.vehicle_count = road.vehicle_count();
        config.validate()?;
        if let Some(vehicle) = road.vehicles().iter().find(|v| v.velocity > config.max_velocity) {
            return Err(Error::InvalidConfig(format!(
                "vehicle at cell {} exceeds max velocity ({} > {})",
                vehicle.position, vehicle.velocity, config.max_velocity
            )));
        }
        Ok(Self {
            engine: DoubleBuffer::new(&road, layout),
            config,
            dispatch,
            clock: 0,
        })
    }

    /// Processes a single round.
    pub fn step(&mut self) -> Result<()> {
        self.step_with(&mut unobserved)
    }

    pub fn step_with(&mut self, observer: &mut dyn RoundObserver) -> Result<()> {
        let params = self.config.rule_params();
        self.dispatch
            .run(&mut self.engine, &params, 1, &mut self.clock, observer)
    }

    /// Processes all the remaining rounds up to the configured step count.
    pub fn run(&mut self) -> Result<()> {
        self.run_with(&mut unobserved)
    }

    /// Same as [`run`], notifying the observer after every round.
    ///
    /// [`run`]: #method.run
    pub fn run_with(&mut self, observer: &mut dyn RoundObserver) -> Result<()> {
        let remaining = self.config.steps.saturating_sub(self.clock);
        let params = self.config.rule_params();
        let started = Instant::now();
        info!(
            "running {} rounds with {} dispatch",
            remaining,
            self.dispatch.name()
        );
        let result = self
            .dispatch
            .run(&mut self.engine, &params, remaining, &mut self.clock, observer);
        match &result {
            Ok(()) => info!(
                "finished at round {} in {} ms",
                self.clock,
                started.elapsed().as_millis()
            ),
            Err(e) => error!("stopped at round {}: {}", self.clock, e),
        }
        result
    }

    pub fn clock(&self) -> usize {
        self.clock
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn layout(&self) -> Layout {
        self.engine.layout()
    }

    pub fn dispatch_name(&self) -> &str {
        self.dispatch.name()
    }

    pub fn engine(&self) -> &DoubleBuffer {
        &self.engine
    }

    /// Current road state.
    pub fn road(&self) -> Road {
        self.engine.road()
    }

    /// Current vehicles in ascending cell order.
    pub fn vehicles(&self) -> Vec<PositionedVehicle> {
        self.engine.vehicles()
    }

    /// Average velocity across all vehicles, zero for an empty road.
    pub fn mean_velocity(&self) -> f64 {
        let vehicles = self.engine.vehicles();
        if vehicles.is_empty() {
            return 0.;
        }
        vehicles.iter().map(|v| v.velocity).sum::<usize>() as f64 / vehicles.len() as f64
    }
}
