//! Worker-side compute service.

use rand::rngs::StdRng;

use crate::distr::{Assignment, ComputeRequest, ComputeResponse, Signal};
use crate::error::{Error, Result};
use crate::road::{Occupancy, PositionedVehicle};
use crate::rule;
use crate::util;

/// Stateless compute node.
///
/// Everything needed to process a request travels with it, so the node
/// only keeps its own random number generator between requests.
pub struct SimNode {
    rng: StdRng,
}

impl SimNode {
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            rng: util::worker_rng(seed, 0),
        }
    }

    /// Applies the update rule to the assigned vehicles, measuring gaps in
    /// the request's snapshot.
    pub fn compute(&mut self, request: &ComputeRequest) -> Result<ComputeResponse> {
        let snapshot = &*request.snapshot;
        let length = snapshot.len();
        if length == 0 {
            return Err(Error::ProtocolViolation("empty snapshot".to_string()));
        }
        let mut vehicles = Vec::new();
        match &request.assignment {
            Assignment::Range(segment) => {
                if segment.end > length || segment.start > segment.end {
                    return Err(Error::ProtocolViolation(format!(
                        "range [{}, {}) outside road of length {}",
                        segment.start, segment.end, length
                    )));
                }
                for cell in segment.range() {
                    if let Some(vehicle) = snapshot.get(cell) {
                        let (position, velocity) = rule::apply(
                            snapshot,
                            cell,
                            vehicle.velocity,
                            &request.params,
                            &mut self.rng,
                        );
                        vehicles.push(PositionedVehicle::new(position, velocity));
                    }
                }
            }
            Assignment::Vehicles(assigned) => {
                vehicles.reserve(assigned.len());
                for vehicle in assigned {
                    if !snapshot.is_occupied(vehicle.position) {
                        return Err(Error::ProtocolViolation(format!(
                            "assigned vehicle at cell {} is missing from the snapshot",
                            vehicle.position
                        )));
                    }
                    let (position, velocity) = rule::apply(
                        snapshot,
                        vehicle.position,
                        vehicle.velocity,
                        &request.params,
                        &mut self.rng,
                    );
                    vehicles.push(PositionedVehicle::new(position, velocity));
                }
            }
        }
        trace!(
            "round {}: computed {} vehicles",
            request.round,
            vehicles.len()
        );
        Ok(ComputeResponse {
            round: request.round,
            vehicles,
        })
    }

    /// Handles a single incoming signal, returning the answer if one is
    /// due.
    pub fn handle(&mut self, signal: Signal) -> Option<Signal> {
        match signal {
            Signal::Ping => Some(Signal::Pong),
            Signal::ComputeSegment(request) => Some(match self.compute(&request) {
                Ok(response) => Signal::SegmentComputed(response),
                Err(e) => {
                    warn!("failed computing round {}: {}", request.round, e);
                    Signal::ComputeFailed(e.to_string())
                }
            }),
            Signal::Disconnect => None,
            other => Some(Signal::ComputeFailed(format!(
                "unexpected signal: {:?}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::Segment;
    use crate::road::Road;
    use crate::rule::RuleParams;
    use std::sync::Arc;

    fn request(assignment: Assignment) -> ComputeRequest {
        let snapshot = Road::from_vehicles(
            10,
            &[
                PositionedVehicle::new(0, 2),
                PositionedVehicle::new(3, 1),
                PositionedVehicle::new(7, 0),
            ],
        )
        .unwrap();
        ComputeRequest {
            round: 4,
            params: RuleParams {
                max_velocity: 5,
                slowdown_probability: 0.,
            },
            snapshot: Arc::new(snapshot),
            assignment,
        }
    }

    #[test]
    fn range_assignment_only_moves_vehicles_in_range() {
        let mut node = SimNode::new(Some(1));
        let response = node
            .compute(&request(Assignment::Range(Segment::new(2, 10))))
            .unwrap();
        assert_eq!(response.round, 4);
        assert_eq!(
            response.vehicles,
            vec![PositionedVehicle::new(5, 2), PositionedVehicle::new(8, 1)]
        );
    }

    #[test]
    fn vehicle_assignment_keeps_list_order() {
        let mut node = SimNode::new(None);
        let assigned = vec![PositionedVehicle::new(7, 0), PositionedVehicle::new(0, 2)];
        let response = node
            .compute(&request(Assignment::Vehicles(assigned)))
            .unwrap();
        assert_eq!(
            response.vehicles,
            vec![PositionedVehicle::new(8, 1), PositionedVehicle::new(2, 2)]
        );
    }

    #[test]
    fn bad_assignments_are_reported() {
        let mut node = SimNode::new(None);
        assert!(node
            .compute(&request(Assignment::Range(Segment::new(5, 11))))
            .is_err());
        let ghost = vec![PositionedVehicle::new(5, 1)];
        match node.handle(Signal::ComputeSegment(request(Assignment::Vehicles(ghost)))) {
            Some(Signal::ComputeFailed(_)) => (),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn answers_ping() {
        let mut node = SimNode::new(None);
        assert_eq!(node.handle(Signal::Ping), Some(Signal::Pong));
        assert_eq!(node.handle(Signal::Disconnect), None);
    }
}
