//! This library implements the core engine of a Nagel-Schreckenberg traffic
//! simulation on a circular road.
//!
//! Programming interface is centered around the [`Sim`] structure, which
//! owns the road state and advances it in bulk-synchronous rounds. Every
//! round takes a frozen snapshot of the road, applies the update rule to
//! every vehicle against that snapshot, scatters the results into a second
//! buffer and finally swaps the two buffers. How the per-round work gets
//! spread is decided by a pluggable [`Dispatch`] strategy: a plain loop on
//! the calling thread, fresh threads per round, a rayon pool, persistent
//! threads synchronized by a cyclic barrier, or remote workers reached
//! through a transport.
//!
//! # Road representations
//!
//! The road can be processed either *cell-indexed*, where each cell holds
//! an optional vehicle and the position is implicit, or *list-indexed*,
//! where vehicles are kept in an ordered list with explicit positions. Both
//! are selected with [`Layout`] and produce the same results.
//!
//! # Networking
//!
//! By itself, this library does not provide any networking capability. It
//! defines the distributed protocol messages, the worker-side compute
//! routine and the master-side dispatch over an abstract
//! [`distr::WorkerConnection`]. For a TCP implementation see `nasch-net`.
//!
//! ## Example
//!
//! ```ignore
//! use nasch_core::{Config, Layout, Sim, Strategy};
//!
//! let config = Config::default();
//! let dispatch = Strategy::Barrier.dispatcher(&config).unwrap();
//! let mut sim = Sim::new(config, Layout::Cells, dispatch).unwrap();
//! sim.run().unwrap();
//! println!("{}", sim.road());
//! ```
//!
//! [`Sim`]: sim/struct.Sim.html
//! [`Dispatch`]: dispatch/trait.Dispatch.html
//! [`Layout`]: buffer/enum.Layout.html
//! [`distr::WorkerConnection`]: distr/trait.WorkerConnection.html

#[macro_use]
extern crate serde;
#[macro_use]
extern crate log;

// reexports
pub use buffer::{DoubleBuffer, Layout};
pub use config::Config;
pub use dispatch::{Dispatch, Strategy};
pub use error::{Error, Result};
pub use partition::{partition, Segment};
pub use road::{Occupancy, PositionedVehicle, Road, Vehicle};
pub use round::{RoundBarrier, RoundState};
pub use rule::RuleParams;
pub use sim::{RoundObserver, Sim};

pub mod buffer;
pub mod config;
pub mod dispatch;
pub mod distr;
pub mod error;
pub mod partition;
pub mod road;
pub mod round;
pub mod rule;
pub mod sim;

mod util;

pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");

/// Cell index type used throughout the library.
pub type CellIndex = usize;
/// Vehicle velocity, in cells per round.
pub type Velocity = usize;
