//! Double-buffered road state.
//!
//! The engine keeps two cell arrays. The `read` buffer is the frozen
//! snapshot of the current round, every gap is measured against it. The
//! `write` buffer collects the results of the round. Once all of the round's
//! work is in, [`DoubleBuffer::advance`] swaps the two and clears the new
//! `write` buffer.
//!
//! Computing only needs a shared reference, so segments can be processed
//! concurrently from any number of threads. Writes into the `write` buffer
//! are done with atomic compare-and-swap, which also lets the engine catch a
//! collision instead of silently overwriting a vehicle. Advancing requires
//! an exclusive reference, so it can't overlap with any in-flight compute.
//!
//! [`DoubleBuffer::advance`]: struct.DoubleBuffer.html#method.advance

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;

use crate::error::{Error, Result};
use crate::partition::Segment;
use crate::road::{Occupancy, PositionedVehicle, Road, Vehicle};
use crate::rule::{self, RuleParams};
use crate::{CellIndex, Velocity};

/// Representation used to drive the per-round computation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Work is partitioned over cells, the vehicle position is implicit.
    Cells,
    /// Work is partitioned over an ordered list of positioned vehicles.
    Vehicles,
}

impl Default for Layout {
    fn default() -> Self {
        Layout::Cells
    }
}

impl FromStr for Layout {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "cells" | "cell" | "memory" => Ok(Layout::Cells),
            "vehicles" | "list" | "position" => Ok(Layout::Vehicles),
            _ => Err(Error::Other(format!("unknown layout: {}", s))),
        }
    }
}

impl Layout {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layout::Cells => "cells",
            Layout::Vehicles => "vehicles",
        }
    }
}

const VACANT: usize = 0;

/// Cell array that can be written from many threads at once.
///
/// Each slot holds `0` for a vacant cell or `velocity + 1` for an occupied
/// one.
#[derive(Debug, Default)]
struct CellBuffer {
    cells: Vec<AtomicUsize>,
}

impl CellBuffer {
    fn new(length: usize) -> Self {
        Self {
            cells: (0..length).map(|_| AtomicUsize::new(VACANT)).collect(),
        }
    }

    fn from_road(road: &Road) -> Self {
        Self {
            cells: road
                .cells()
                .iter()
                .map(|c| AtomicUsize::new(c.map_or(VACANT, |v| v.velocity.saturating_add(1))))
                .collect(),
        }
    }

    fn get(&self, cell: CellIndex) -> Option<Velocity> {
        match self.cells.get(cell).map(|c| c.load(Ordering::Acquire)) {
            None | Some(VACANT) => None,
            Some(encoded) => Some(encoded - 1),
        }
    }

    fn place(&self, cell: CellIndex, velocity: Velocity) -> Result<()> {
        let slot = self.cells.get(cell).ok_or_else(|| {
            Error::ProtocolViolation(format!(
                "target cell {} outside road of length {}",
                cell,
                self.cells.len()
            ))
        })?;
        slot.compare_exchange(VACANT, velocity.saturating_add(1), Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| Error::Collision(cell))
    }

    fn clear(&mut self) {
        for cell in self.cells.iter_mut() {
            *cell.get_mut() = VACANT;
        }
    }

    fn count(&self) -> usize {
        self.cells
            .iter()
            .filter(|c| c.load(Ordering::Acquire) != VACANT)
            .count()
    }

    fn to_road(&self) -> Road {
        Road::from_cells(
            (0..self.cells.len())
                .map(|cell| self.get(cell).map(Vehicle::new))
                .collect(),
        )
    }
}

impl Occupancy for CellBuffer {
    fn length(&self) -> usize {
        self.cells.len()
    }

    fn is_occupied(&self, cell: CellIndex) -> bool {
        self.get(cell).is_some()
    }
}

/// Two-arena road state advanced in bulk-synchronous rounds.
#[derive(Debug, Default)]
pub struct DoubleBuffer {
    layout: Layout,
    read: CellBuffer,
    write: CellBuffer,
    vehicle_count: usize,
    /// Ordered vehicle list, list-indexed layout only
    vehicles: Vec<PositionedVehicle>,
    /// Target cell `+ 1` computed for each listed vehicle this round
    targets: Vec<AtomicUsize>,
}

impl DoubleBuffer {
    pub fn new(road: &Road, layout: Layout) -> Self {
        let vehicles = match layout {
            Layout::Cells => Vec::new(),
            Layout::Vehicles => road.vehicles(),
        };
        Self {
            layout,
            read: CellBuffer::from_road(road),
            write: CellBuffer::new(road.len()),
            vehicle_count: road.vehicle_count(),
            targets: (0..vehicles.len()).map(|_| AtomicUsize::new(VACANT)).collect(),
            vehicles,
        }
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn road_length(&self) -> usize {
        self.read.cells.len()
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicle_count
    }

    /// Size of the index space the partitioner splits: road length for the
    /// cell-indexed layout, vehicle count for the list-indexed one.
    pub fn partition_size(&self) -> usize {
        match self.layout {
            Layout::Cells => self.road_length(),
            Layout::Vehicles => self.vehicles.len(),
        }
    }

    /// Materializes the current read snapshot.
    pub fn road(&self) -> Road {
        self.read.to_road()
    }

    /// Vehicles of the current read snapshot in ascending cell order.
    pub fn vehicles(&self) -> Vec<PositionedVehicle> {
        (0..self.road_length())
            .filter_map(|cell| {
                self.read
                    .get(cell)
                    .map(|velocity| PositionedVehicle::new(cell, velocity))
            })
            .collect()
    }

    /// Number of vehicles in the read snapshot whose cell falls within
    /// `segment`.
    pub fn occupied_in(&self, segment: Segment) -> usize {
        segment
            .range()
            .filter(|cell| self.read.is_occupied(*cell))
            .count()
    }

    /// Listed vehicles assigned to `segment`, list-indexed layout only.
    pub fn assigned(&self, segment: Segment) -> Result<Vec<PositionedVehicle>> {
        self.check_segment(segment)?;
        match self.layout {
            Layout::Vehicles => Ok(self.vehicles[segment.range()].to_vec()),
            Layout::Cells => Err(Error::Other(
                "vehicle assignment requires the list-indexed layout".to_string(),
            )),
        }
    }

    fn check_segment(&self, segment: Segment) -> Result<()> {
        if segment.start > segment.end || segment.end > self.partition_size() {
            return Err(Error::ProtocolViolation(format!(
                "segment [{}, {}) outside partition space of size {}",
                segment.start,
                segment.end,
                self.partition_size()
            )));
        }
        Ok(())
    }

    /// Applies the update rule to every vehicle of `segment`, measuring gaps
    /// in the read snapshot and placing results into the write buffer.
    pub fn compute<R: Rng + ?Sized>(
        &self,
        segment: Segment,
        params: &RuleParams,
        rng: &mut R,
    ) -> Result<()> {
        self.check_segment(segment)?;
        trace!(
            "computing {:?} segment [{}, {})",
            self.layout,
            segment.start,
            segment.end
        );
        match self.layout {
            Layout::Cells => {
                for cell in segment.range() {
                    if let Some(velocity) = self.read.get(cell) {
                        let (target, velocity) =
                            rule::apply(&self.read, cell, velocity, params, rng);
                        self.write.place(target, velocity)?;
                    }
                }
            }
            Layout::Vehicles => {
                for index in segment.range() {
                    let vehicle = &self.vehicles[index];
                    let (target, velocity) =
                        rule::apply(&self.read, vehicle.position, vehicle.velocity, params, rng);
                    self.write.place(target, velocity)?;
                    self.targets[index].store(target + 1, Ordering::Release);
                }
            }
        }
        Ok(())
    }

    /// Merges vehicles computed elsewhere for `segment` into the write
    /// buffer.
    ///
    /// For the list-indexed layout `updated` must hold exactly one entry per
    /// listed vehicle of the segment, in list order.
    pub fn scatter(&self, segment: Segment, updated: &[PositionedVehicle]) -> Result<()> {
        self.check_segment(segment)?;
        if self.layout == Layout::Vehicles && updated.len() != segment.len() {
            return Err(Error::ProtocolViolation(format!(
                "expected {} vehicles for segment [{}, {}), got {}",
                segment.len(),
                segment.start,
                segment.end,
                updated.len()
            )));
        }
        for (offset, vehicle) in updated.iter().enumerate() {
            self.write.place(vehicle.position, vehicle.velocity)?;
            if self.layout == Layout::Vehicles {
                self.targets[segment.start + offset].store(vehicle.position + 1, Ordering::Release);
            }
        }
        Ok(())
    }

    /// Ends the round: the write buffer becomes the new read snapshot and
    /// the old snapshot is cleared for reuse.
    ///
    /// Fails without touching the state if the write buffer doesn't hold a
    /// complete round, in which case the caller should [`discard`] it.
    ///
    /// [`discard`]: #method.discard
    pub fn advance(&mut self) -> Result<()> {
        let written = self.write.count();
        if written != self.vehicle_count {
            return Err(Error::ProtocolViolation(format!(
                "write buffer holds {} vehicles, expected {}",
                written, self.vehicle_count
            )));
        }
        if self.layout == Layout::Vehicles {
            let mut next = Vec::with_capacity(self.vehicles.len());
            for (index, target) in self.targets.iter_mut().enumerate() {
                let position = match *target.get_mut() {
                    VACANT => {
                        return Err(Error::ProtocolViolation(format!(
                            "vehicle {} was not computed this round",
                            index
                        )))
                    }
                    encoded => encoded - 1,
                };
                let velocity = self.write.get(position).ok_or_else(|| {
                    Error::ProtocolViolation(format!("target cell {} is vacant", position))
                })?;
                next.push(PositionedVehicle::new(position, velocity));
            }
            self.vehicles = next;
            for target in self.targets.iter_mut() {
                *target.get_mut() = VACANT;
            }
        }
        std::mem::swap(&mut self.read, &mut self.write);
        self.write.clear();
        Ok(())
    }

    /// Throws away everything written during the current round, leaving the
    /// read snapshot as the last consistent state.
    pub fn discard(&mut self) {
        self.write.clear();
        for target in self.targets.iter_mut() {
            *target.get_mut() = VACANT;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::partition;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn scenario_road() -> Road {
        Road::from_vehicles(
            10,
            &[
                PositionedVehicle::new(0, 2),
                PositionedVehicle::new(3, 1),
                PositionedVehicle::new(7, 0),
            ],
        )
        .unwrap()
    }

    fn params() -> RuleParams {
        RuleParams {
            max_velocity: 5,
            slowdown_probability: 0.,
        }
    }

    #[test]
    fn compute_leaves_snapshot_untouched_until_advance() {
        for layout in &[Layout::Cells, Layout::Vehicles] {
            let road = scenario_road();
            let mut engine = DoubleBuffer::new(&road, *layout);
            let mut rng = StdRng::seed_from_u64(0);
            for segment in partition(engine.partition_size(), 3).unwrap() {
                engine.compute(segment, &params(), &mut rng).unwrap();
                assert_eq!(engine.road(), road);
            }
            engine.advance().unwrap();
            assert_eq!(
                engine.vehicles(),
                vec![
                    PositionedVehicle::new(2, 2),
                    PositionedVehicle::new(5, 2),
                    PositionedVehicle::new(8, 1),
                ]
            );
        }
    }

    #[test]
    fn incomplete_round_can_not_advance() {
        for layout in &[Layout::Cells, Layout::Vehicles] {
            let road = scenario_road();
            let mut engine = DoubleBuffer::new(&road, *layout);
            let mut rng = StdRng::seed_from_u64(0);
            let segments = partition(engine.partition_size(), 2).unwrap();
            engine.compute(segments[0], &params(), &mut rng).unwrap();
            match engine.advance() {
                Err(Error::ProtocolViolation(_)) => (),
                other => panic!("expected protocol violation, got {:?}", other),
            }
            engine.discard();
            assert_eq!(engine.road(), road);

            // a clean retry of the full round still works after the discard
            for segment in segments {
                engine.compute(segment, &params(), &mut rng).unwrap();
            }
            engine.advance().unwrap();
            assert_eq!(engine.vehicles().len(), 3);
        }
    }

    #[test]
    fn scatter_detects_collisions() {
        let engine = DoubleBuffer::new(&scenario_road(), Layout::Cells);
        let segment = Segment::new(0, 10);
        let result = engine.scatter(
            segment,
            &[PositionedVehicle::new(4, 1), PositionedVehicle::new(4, 2)],
        );
        match result {
            Err(Error::Collision(4)) => (),
            other => panic!("expected collision, got {:?}", other),
        }
    }

    #[test]
    fn scatter_rejects_wrong_list_length() {
        let engine = DoubleBuffer::new(&scenario_road(), Layout::Vehicles);
        assert!(engine
            .scatter(Segment::new(0, 2), &[PositionedVehicle::new(1, 1)])
            .is_err());
        assert!(engine
            .scatter(Segment::new(0, 4), &[])
            .is_err());
    }

    #[test]
    fn list_layout_assigns_vehicles_by_index() {
        let engine = DoubleBuffer::new(&scenario_road(), Layout::Vehicles);
        assert_eq!(engine.partition_size(), 3);
        assert_eq!(
            engine.assigned(Segment::new(1, 3)).unwrap(),
            vec![PositionedVehicle::new(3, 1), PositionedVehicle::new(7, 0)]
        );
        let cells = DoubleBuffer::new(&scenario_road(), Layout::Cells);
        assert_eq!(cells.partition_size(), 10);
        assert_eq!(cells.occupied_in(Segment::new(0, 5)), 2);
    }

    #[test]
    fn layout_parses_from_str() {
        assert_eq!("cells".parse::<Layout>().unwrap(), Layout::Cells);
        assert_eq!("List".parse::<Layout>().unwrap(), Layout::Vehicles);
        assert!("grid".parse::<Layout>().is_err());
    }
}
