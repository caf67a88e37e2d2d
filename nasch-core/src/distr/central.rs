//! Master-side dispatch over remote workers.

use std::sync::Arc;
use std::time::Duration;

use crate::buffer::{DoubleBuffer, Layout};
use crate::dispatch::{conclude, Dispatch};
use crate::distr::{Assignment, ComputeRequest, ComputeResponse, LocalConnection, SimNode, WorkerConnection};
use crate::error::{Error, Result};
use crate::partition::{partition, Segment};
use crate::rule::RuleParams;

/// Distributed master.
///
/// Partitions each round among the connected workers, issues all the
/// requests concurrently and waits for every response before merging.
/// Any failed, late or malformed response aborts the round.
pub struct Central {
    connections: Vec<Box<dyn WorkerConnection>>,
    timeout: Option<Duration>,
}

impl Central {
    pub fn new(connections: Vec<Box<dyn WorkerConnection>>) -> Result<Self> {
        if connections.is_empty() {
            return Err(Error::InvalidConfig(
                "distributed dispatch needs at least one worker".to_string(),
            ));
        }
        Ok(Self {
            connections,
            timeout: None,
        })
    }

    /// Creates a master backed by `workers` in-process nodes.
    pub fn local(workers: usize, seed: Option<u64>) -> Result<Self> {
        let connections = (0..workers)
            .map(|i| {
                let node = SimNode::new(seed.map(|s| s.wrapping_add(i as u64)));
                Box::new(LocalConnection::new(&format!("local{}", i), node))
                    as Box<dyn WorkerConnection>
            })
            .collect();
        Central::new(connections)
    }

    /// Sets the maximum time to wait for a single worker's response.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn worker_ids(&self) -> Vec<String> {
        self.connections.iter().map(|c| c.id().to_string()).collect()
    }

    /// Tells all the workers the master is done with them and drops the
    /// connections.
    pub fn disconnect(&mut self) {
        for mut connection in self.connections.drain(..) {
            if let Err(e) = connection.disconnect() {
                warn!("failed disconnecting worker {}: {}", connection.id(), e);
            }
        }
    }

    fn requests(
        engine: &DoubleBuffer,
        segments: &[Segment],
        params: &RuleParams,
        round: usize,
    ) -> Result<Vec<ComputeRequest>> {
        let snapshot = Arc::new(engine.road());
        segments
            .iter()
            .map(|segment| {
                let assignment = match engine.layout() {
                    Layout::Cells => Assignment::Range(*segment),
                    Layout::Vehicles => Assignment::Vehicles(engine.assigned(*segment)?),
                };
                Ok(ComputeRequest {
                    round,
                    params: *params,
                    snapshot: snapshot.clone(),
                    assignment,
                })
            })
            .collect()
    }

    /// Checks the response against its request and scatters it into the
    /// engine's write buffer.
    fn merge(
        engine: &DoubleBuffer,
        worker: &str,
        segment: Segment,
        request: &ComputeRequest,
        response: ComputeResponse,
    ) -> Result<()> {
        if response.round != request.round {
            return Err(Error::ProtocolViolation(format!(
                "worker {} answered round {} during round {}",
                worker, response.round, request.round
            )));
        }
        let expected = match &request.assignment {
            Assignment::Range(segment) => engine.occupied_in(*segment),
            Assignment::Vehicles(vehicles) => vehicles.len(),
        };
        if response.vehicles.len() != expected {
            return Err(Error::ProtocolViolation(format!(
                "worker {} returned {} vehicles, expected {}",
                worker,
                response.vehicles.len(),
                expected
            )));
        }
        let length = engine.road_length();
        if let Some(vehicle) = response.vehicles.iter().find(|v| v.position >= length) {
            return Err(Error::ProtocolViolation(format!(
                "worker {} placed a vehicle at cell {} on a road of length {}",
                worker, vehicle.position, length
            )));
        }
        let limit = request.params.max_velocity;
        if let Some(vehicle) = response.vehicles.iter().find(|v| v.velocity > limit) {
            return Err(Error::ProtocolViolation(format!(
                "worker {} returned velocity {} above the limit of {}",
                worker, vehicle.velocity, limit
            )));
        }
        engine.scatter(segment, &response.vehicles)
    }
}

impl Drop for Central {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl Dispatch for Central {
    fn name(&self) -> &str {
        "distributed"
    }

    fn round(&mut self, engine: &mut DoubleBuffer, params: &RuleParams, round: usize) -> Result<()> {
        let segments = partition(engine.partition_size(), self.connections.len())?;
        let requests = Central::requests(engine, &segments, params, round)?;
        let timeout = self.timeout;
        let connections = &mut self.connections;

        let responses = std::thread::scope(|s| {
            let handles = connections
                .iter_mut()
                .zip(requests.iter())
                .map(|(connection, request)| {
                    s.spawn(move || {
                        let id = connection.id().to_string();
                        (id, connection.compute(request, timeout))
                    })
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(answer) => answer,
                    Err(_) => (String::new(), Err(Error::WorkerPanicked)),
                })
                .collect::<Vec<_>>()
        });

        let shared: &DoubleBuffer = engine;
        let results = responses
            .into_iter()
            .zip(segments.iter().zip(requests.iter()))
            .map(|((worker, response), (segment, request))| {
                let response = response?;
                Central::merge(shared, &worker, *segment, request, response)
            })
            .collect::<Vec<_>>();
        conclude(engine, round, results)
    }
}
