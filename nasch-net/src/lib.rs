//! This library provides the networking layer for distributed `nasch`
//! simulations.
//!
//! `nasch-core` defines the master (`Central`) and the worker-side compute
//! service (`SimNode`), along with the messages they exchange. It leaves
//! the actual transport open behind the `WorkerConnection` trait. This
//! library fills it in with a plain TCP byte stream.
//!
//! # Constructs
//!
//! - [`Worker`] binds an address and serves any number of masters, one
//!   thread per connection, each backed by its own `SimNode`.
//! - [`TcpConnection`] is the master's side of a single worker connection,
//!   implementing `WorkerConnection`.
//! - [`Registry`] maps worker identifiers to addresses and connects to all
//!   of them at once, producing a ready-to-use `Central`.
//!
//! # Wire format
//!
//! Every message is a single frame: a little-endian `u32` body length, one
//! flag byte and the bincode-encoded body. With the `lz4` feature enabled
//! larger bodies can be compressed, which is signalled with the lowest bit
//! of the flag byte.
//!
//! [`Worker`]: worker/struct.Worker.html
//! [`TcpConnection`]: coord/struct.TcpConnection.html
//! [`Registry`]: registry/struct.Registry.html

#[macro_use]
extern crate log;

pub mod coord;
pub mod error;
pub mod registry;
pub mod sig;
pub mod socket;
pub mod worker;

pub use coord::TcpConnection;
pub use error::{Error, Result};
pub use registry::Registry;
pub use socket::{CompressionPolicy, SocketConfig};
pub use worker::Worker;

/// Sequence number used to pair responses with requests.
pub type SeqId = u32;
