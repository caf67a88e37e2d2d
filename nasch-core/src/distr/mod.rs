//! Provides functionality related to distributed computation.
//!
//! The master ([`Central`]) holds the canonical road state. Every round it
//! sends a copy of the full read snapshot to each worker together with the
//! worker's share of the work, waits for all the responses, merges them
//! into the write buffer and advances.
//!
//! Definitions are kept transport-agnostic: the master only talks to
//! workers through the [`WorkerConnection`] trait.
//!
//! [`Central`]: central/struct.Central.html
//! [`WorkerConnection`]: trait.WorkerConnection.html

pub mod central;
pub mod node;

pub use central::Central;
pub use node::SimNode;

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::partition::Segment;
use crate::road::{PositionedVehicle, Road};
use crate::rule::RuleParams;

/// Worker's share of a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Assignment {
    /// All vehicles sitting in the cell range, cell-indexed layout
    Range(Segment),
    /// Explicit list of vehicles, list-indexed layout
    Vehicles(Vec<PositionedVehicle>),
}

/// Request to apply the update rule to the assigned vehicles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeRequest {
    pub round: usize,
    pub params: RuleParams,
    /// Immutable copy of the full read snapshot
    pub snapshot: Arc<Road>,
    pub assignment: Assignment,
}

/// Updated vehicles for a single request.
///
/// For a vehicle list assignment the order matches the request's list. For
/// a range assignment vehicles come in ascending order of their original
/// cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeResponse {
    pub round: usize,
    pub vehicles: Vec<PositionedVehicle>,
}

/// Definition encompassing all possible messages exchanged between the
/// master and a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Signal {
    /// Request worker to compute its share of a round
    ComputeSegment(ComputeRequest),
    /// Sent by worker once its share of the round is computed
    SegmentComputed(ComputeResponse),
    /// Sent by worker if it couldn't process the request
    ComputeFailed(String),
    Ping,
    Pong,
    /// Master is done with the worker
    Disconnect,
}

/// Master's handle to a single worker.
///
/// One call is one synchronous round-trip. Calls are never retried.
pub trait WorkerConnection: Send {
    /// Identifier of the worker, as used in the registry
    fn id(&self) -> &str;

    /// Sends the request and blocks until the response arrives, or until
    /// `timeout` elapses.
    fn compute(
        &mut self,
        request: &ComputeRequest,
        timeout: Option<Duration>,
    ) -> Result<ComputeResponse>;

    /// Tells the worker the master is done. Errors are not fatal.
    fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }
}

/// In-process connection calling directly into a worker node.
pub struct LocalConnection {
    id: String,
    node: SimNode,
}

impl LocalConnection {
    pub fn new(id: &str, node: SimNode) -> Self {
        Self {
            id: id.to_string(),
            node,
        }
    }
}

impl WorkerConnection for LocalConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn compute(
        &mut self,
        request: &ComputeRequest,
        _timeout: Option<Duration>,
    ) -> Result<ComputeResponse> {
        match self.node.handle(Signal::ComputeSegment(request.clone())) {
            Some(Signal::SegmentComputed(response)) => Ok(response),
            Some(Signal::ComputeFailed(reason)) => Err(Error::WorkerFailed {
                worker: self.id.clone(),
                reason,
            }),
            other => Err(Error::ProtocolViolation(format!(
                "unexpected answer from worker {}: {:?}",
                self.id, other
            ))),
        }
    }
}
