//! Nagel-Schreckenberg update rule.
//!
//! Given a vehicle's position and velocity plus a frozen view of the road,
//! computes the vehicle's next velocity and position. The four phases are
//! applied in order: acceleration, gap clamping, random slowdown and
//! movement.

use rand::Rng;

use crate::road::Occupancy;
use crate::{CellIndex, Velocity};

/// Parameters of the update rule shared by every vehicle.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleParams {
    pub max_velocity: Velocity,
    pub slowdown_probability: f64,
}

/// Distance to the nearest occupied cell ahead of `position`.
///
/// Only cells within `min(Vmax, L-1)` are inspected. If none of them is
/// occupied the returned gap is one past that bound, which never constrains
/// a velocity capped at `Vmax`.
pub fn gap_ahead<O: Occupancy + ?Sized>(
    road: &O,
    position: CellIndex,
    max_velocity: Velocity,
) -> usize {
    let length = road.length();
    let bound = max_velocity.min(length.saturating_sub(1));
    for distance in 1..=bound {
        if road.is_occupied((position + distance) % length) {
            return distance;
        }
    }
    bound + 1
}

/// Computes the velocity the vehicle at `position` will have next round.
pub fn next_velocity<O: Occupancy + ?Sized, R: Rng + ?Sized>(
    road: &O,
    position: CellIndex,
    velocity: Velocity,
    params: &RuleParams,
    rng: &mut R,
) -> Velocity {
    // acceleration
    let mut v = velocity.saturating_add(1).min(params.max_velocity);
    // gap clamping
    let gap = gap_ahead(road, position, params.max_velocity);
    v = v.min(gap - 1);
    // random slowdown
    if params.slowdown_probability > 0. && rng.gen_bool(params.slowdown_probability) {
        v = v.saturating_sub(1);
    }
    v
}

/// Applies the full rule, returning `(new_position, new_velocity)`.
pub fn apply<O: Occupancy + ?Sized, R: Rng + ?Sized>(
    road: &O,
    position: CellIndex,
    velocity: Velocity,
    params: &RuleParams,
    rng: &mut R,
) -> (CellIndex, Velocity) {
    let v = next_velocity(road, position, velocity, params, rng);
    ((position + v) % road.length(), v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::road::{PositionedVehicle, Road};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn deterministic(max_velocity: Velocity) -> RuleParams {
        RuleParams {
            max_velocity,
            slowdown_probability: 0.,
        }
    }

    #[test]
    fn lone_vehicle_accelerates() {
        let road = Road::from_vehicles(100, &[PositionedVehicle::new(0, 2)]).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(apply(&road, 0, 2, &deterministic(5), &mut rng), (3, 3));
    }

    #[test]
    fn velocity_is_clamped_by_gap() {
        let road = Road::from_vehicles(
            10,
            &[PositionedVehicle::new(0, 2), PositionedVehicle::new(3, 1)],
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(gap_ahead(&road, 0, 5), 3);
        assert_eq!(apply(&road, 0, 2, &deterministic(5), &mut rng), (2, 2));
    }

    #[test]
    fn blocked_vehicle_stops() {
        let road = Road::from_vehicles(
            5,
            &[PositionedVehicle::new(4, 3), PositionedVehicle::new(0, 0)],
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        // wraps around to the vehicle sitting in cell 0
        assert_eq!(apply(&road, 4, 3, &deterministic(5), &mut rng), (4, 0));
    }

    #[test]
    fn full_road_never_moves() {
        let vehicles: Vec<_> = (0..6).map(|p| PositionedVehicle::new(p, 1)).collect();
        let road = Road::from_vehicles(6, &vehicles).unwrap();
        let params = RuleParams {
            max_velocity: 5,
            slowdown_probability: 0.5,
        };
        let mut rng = StdRng::seed_from_u64(9);
        for v in &vehicles {
            assert_eq!(apply(&road, v.position, v.velocity, &params, &mut rng), (v.position, 0));
        }
    }

    #[test]
    fn gap_bound_respects_short_roads() {
        // single vehicle on a road shorter than Vmax can't lap itself
        let road = Road::from_vehicles(3, &[PositionedVehicle::new(1, 0)]).unwrap();
        assert_eq!(gap_ahead(&road, 1, 5), 3);
        let mut rng = StdRng::seed_from_u64(0);
        let (pos, v) = apply(&road, 1, 0, &deterministic(5), &mut rng);
        assert_eq!(v, 1);
        assert_eq!(pos, 2);
    }

    #[test]
    fn acceleration_saturates_at_the_velocity_limit() {
        let road = Road::new(4);
        let mut rng = StdRng::seed_from_u64(0);
        let params = deterministic(usize::MAX);
        assert_eq!(apply(&road, 0, usize::MAX, &params, &mut rng), (3, 3));
    }

    #[test]
    fn certain_slowdown_always_brakes() {
        let road = Road::from_vehicles(100, &[PositionedVehicle::new(10, 4)]).unwrap();
        let params = RuleParams {
            max_velocity: 5,
            slowdown_probability: 1.,
        };
        let mut rng = StdRng::seed_from_u64(42);
        assert_eq!(apply(&road, 10, 4, &params, &mut rng), (14, 4));
        assert_eq!(next_velocity(&road, 10, 0, &params, &mut rng), 0);
    }
}
