//! Hand-checked rounds on a small road, run through every dispatch
//! strategy and both layouts.

use nasch_core::distr::Central;
use nasch_core::{Config, Dispatch, Layout, PositionedVehicle, Road, Sim, Strategy};

fn config(steps: usize, workers: usize) -> Config {
    Config {
        max_velocity: 5,
        slowdown_probability: 0.,
        steps,
        workers,
        seed: Some(0),
        ..Config::default()
    }
}

fn road() -> Road {
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

fn dispatchers(config: &Config) -> Vec<Box<dyn Dispatch>> {
    let mut dispatchers: Vec<Box<dyn Dispatch>> = Strategy::ALL
        .iter()
        .map(|s| s.dispatcher(config).unwrap())
        .collect();
    dispatchers.push(Box::new(Central::local(config.workers, config.seed).unwrap()));
    dispatchers
}

#[test]
fn two_rounds_match_hand_computation() {
    for workers in 1..=4 {
        let config = config(2, workers);
        for layout in &[Layout::Cells, Layout::Vehicles] {
            for dispatch in dispatchers(&config) {
                let name = dispatch.name().to_string();
                let mut sim = Sim::from_road(config.clone(), road(), *layout, dispatch).unwrap();

                sim.step().unwrap();
                assert_eq!(
                    sim.vehicles(),
                    vec![
                        PositionedVehicle::new(2, 2),
                        PositionedVehicle::new(5, 2),
                        PositionedVehicle::new(8, 1),
                    ],
                    "round 1, {} dispatch, {:?} layout, {} workers",
                    name,
                    layout,
                    workers
                );

                sim.step().unwrap();
                assert_eq!(
                    sim.vehicles(),
                    vec![
                        PositionedVehicle::new(0, 2),
                        PositionedVehicle::new(4, 2),
                        PositionedVehicle::new(7, 2),
                    ],
                    "round 2, {} dispatch, {:?} layout, {} workers",
                    name,
                    layout,
                    workers
                );
                assert_eq!(sim.clock(), 2);
                assert_eq!(sim.road().to_string(), "2...2..2..");
            }
        }
    }
}

#[test]
fn lone_vehicle_clamps_only_at_max_velocity() {
    let road = Road::from_vehicles(100, &[PositionedVehicle::new(0, 2)]).unwrap();
    let config = config(4, 1);
    let dispatch = Strategy::Sequential.dispatcher(&config).unwrap();
    let mut sim = Sim::from_road(config, road, Layout::Cells, dispatch).unwrap();
    let mut positions = Vec::new();
    sim.run_with(&mut |_: usize, engine: &nasch_core::DoubleBuffer| {
        positions.push(engine.vehicles()[0]);
    })
    .unwrap();
    assert_eq!(
        positions,
        vec![
            PositionedVehicle::new(3, 3),
            PositionedVehicle::new(7, 4),
            PositionedVehicle::new(12, 5),
            PositionedVehicle::new(17, 5),
        ]
    );
}
