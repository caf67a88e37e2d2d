//! Circular road model.

use std::fmt;

use rand::seq::index::sample;
use rand::Rng;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::{CellIndex, Velocity};

/// A single vehicle sitting in a cell.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vehicle {
    pub velocity: Velocity,
}

impl Vehicle {
    pub fn new(velocity: Velocity) -> Self {
        Self { velocity }
    }
}

/// Vehicle with an explicit cell position, used by the list-indexed layout
/// and by the distributed protocol.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionedVehicle {
    pub position: CellIndex,
    pub velocity: Velocity,
}

impl PositionedVehicle {
    pub fn new(position: CellIndex, velocity: Velocity) -> Self {
        Self { position, velocity }
    }
}

/// Read-only view on cell occupancy, the only thing the update rule needs
/// to know about the road.
pub trait Occupancy {
    fn length(&self) -> usize;
    fn is_occupied(&self, cell: CellIndex) -> bool;
}

/// Ring of cells, each either vacant or holding exactly one vehicle.
///
/// Cell `L-1` is followed by cell `0`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Road {
    cells: Vec<Option<Vehicle>>,
}

impl Road {
    /// Creates an empty road with `length` cells.
    pub fn new(length: usize) -> Self {
        Self {
            cells: vec![None; length],
        }
    }

    pub fn from_cells(cells: Vec<Option<Vehicle>>) -> Self {
        Self { cells }
    }

    /// Builds a road out of explicitly positioned vehicles.
    pub fn from_vehicles(length: usize, vehicles: &[PositionedVehicle]) -> Result<Self> {
        let mut road = Road::new(length);
        for vehicle in vehicles {
            road.place(vehicle.position, Vehicle::new(vehicle.velocity))?;
        }
        Ok(road)
    }

    /// Places `config.vehicle_count` vehicles at distinct random cells,
    /// each with a random velocity in `[0, Vmax]`.
    pub fn random<R: Rng>(config: &Config, rng: &mut R) -> Result<Self> {
        if config.vehicle_count > config.road_length {
            return Err(Error::InvalidConfig(format!(
                "can't place {} vehicles on {} cells",
                config.vehicle_count, config.road_length
            )));
        }
        let mut road = Road::new(config.road_length);
        for cell in sample(rng, config.road_length, config.vehicle_count).into_iter() {
            let velocity = rng.gen_range(0, config.max_velocity.saturating_add(1));
            road.cells[cell] = Some(Vehicle::new(velocity));
        }
        Ok(road)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, cell: CellIndex) -> Option<&Vehicle> {
        self.cells.get(cell).and_then(|c| c.as_ref())
    }

    pub fn cells(&self) -> &[Option<Vehicle>] {
        &self.cells
    }

    /// Puts a vehicle into a vacant cell.
    pub fn place(&mut self, cell: CellIndex, vehicle: Vehicle) -> Result<()> {
        let len = self.cells.len();
        match self.cells.get_mut(cell) {
            None => Err(Error::Other(format!(
                "cell {} out of range for road of length {}",
                cell, len
            ))),
            Some(Some(_)) => Err(Error::Collision(cell)),
            Some(slot) => {
                *slot = Some(vehicle);
                Ok(())
            }
        }
    }

    pub fn vehicle_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    /// Returns all vehicles in ascending cell order.
    pub fn vehicles(&self) -> Vec<PositionedVehicle> {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(position, cell)| {
                cell.map(|v| PositionedVehicle::new(position, v.velocity))
            })
            .collect()
    }

    /// Sum of all vehicle velocities, handy for flow statistics.
    pub fn total_velocity(&self) -> usize {
        self.cells.iter().flatten().map(|v| v.velocity).sum()
    }
}

impl Occupancy for Road {
    fn length(&self) -> usize {
        self.cells.len()
    }

    fn is_occupied(&self, cell: CellIndex) -> bool {
        matches!(self.cells.get(cell), Some(Some(_)))
    }
}

impl fmt::Display for Road {
    /// Renders vacant cells as `.` and occupied ones as the vehicle velocity.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for cell in &self.cells {
            let c = match cell {
                None => '.',
                Some(v) => std::char::from_digit(v.velocity as u32, 36).unwrap_or('#'),
            };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn random_road_places_requested_vehicles() {
        let config = Config {
            road_length: 100,
            vehicle_count: 37,
            max_velocity: 5,
            ..Config::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let road = Road::random(&config, &mut rng).unwrap();
        assert_eq!(road.len(), 100);
        assert_eq!(road.vehicle_count(), 37);
        assert!(road.vehicles().iter().all(|v| v.velocity <= 5));
    }

    #[test]
    fn full_road_is_allowed() {
        let config = Config {
            road_length: 8,
            vehicle_count: 8,
            ..Config::default()
        };
        let road = Road::random(&config, &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(road.vehicle_count(), 8);
    }

    #[test]
    fn placing_into_occupied_cell_collides() {
        let mut road = Road::new(4);
        road.place(2, Vehicle::new(1)).unwrap();
        match road.place(2, Vehicle::new(0)) {
            Err(Error::Collision(2)) => (),
            other => panic!("expected collision, got {:?}", other),
        }
        assert!(road.place(4, Vehicle::new(0)).is_err());
    }

    #[test]
    fn display_renders_velocities() {
        let road = Road::from_vehicles(
            6,
            &[PositionedVehicle::new(0, 2), PositionedVehicle::new(4, 0)],
        )
        .unwrap();
        assert_eq!(road.to_string(), "2...0.");
    }
}
