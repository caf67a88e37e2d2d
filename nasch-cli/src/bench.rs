//! Measure the processing speed and memory use of all dispatch strategies.

#[cfg(feature = "psutils")]
extern crate psutil;

use std::time::{Duration, Instant};

use anyhow::Result;

use nasch_core::distr::Central;
use nasch_core::{Config, Dispatch, Layout, Sim, Strategy};

/// Timing and memory figures of a successful benchmark.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub mean: Duration,
    /// Highest resident memory sampled around the runs, in megabytes
    pub peak_mb: Option<f64>,
}

/// Outcome of benchmarking a single strategy and layout combination.
#[derive(Debug)]
pub struct BenchResult {
    pub name: String,
    pub outcome: std::result::Result<Measurement, String>,
}

/// Runs the full simulation `repeats` times for every strategy and layout
/// combination, plus in-process distributed dispatch. A failing
/// combination is recorded in its row without stopping the others.
pub fn run_all(config: &Config, repeats: usize, warmup: bool) -> Vec<BenchResult> {
    let mut results = Vec::new();
    for layout in &[Layout::Cells, Layout::Vehicles] {
        for strategy in Strategy::ALL.iter() {
            let name = format!("{}/{}", strategy.as_str(), layout.as_str());
            results.push(measure(&name, config, *layout, repeats, warmup, || {
                Ok(strategy.dispatcher(config)?)
            }));
        }
        let name = format!("distributed-local/{}", layout.as_str());
        results.push(measure(&name, config, *layout, repeats, warmup, || {
            let central = Central::local(config.workers, config.seed)?;
            Ok(Box::new(central) as Box<dyn Dispatch>)
        }));
    }
    results
}

/// Benchmarks a single combination, turning any failure into the row's
/// outcome.
pub fn measure<F>(
    name: &str,
    config: &Config,
    layout: Layout,
    repeats: usize,
    warmup: bool,
    dispatcher: F,
) -> BenchResult
where
    F: Fn() -> Result<Box<dyn Dispatch>>,
{
    info!("benchmarking {}", name);
    let outcome = timed_runs(config, layout, repeats, warmup, dispatcher).map_err(|e| {
        warn!("benchmark {} failed: {}", name, e);
        e.to_string()
    });
    BenchResult {
        name: name.to_string(),
        outcome,
    }
}

fn timed_runs<F>(
    config: &Config,
    layout: Layout,
    repeats: usize,
    warmup: bool,
    dispatcher: F,
) -> Result<Measurement>
where
    F: Fn() -> Result<Box<dyn Dispatch>>,
{
    if warmup {
        Sim::new(config.clone(), layout, dispatcher()?)?.run()?;
    }
    let mut total = Duration::from_millis(0);
    let mut peak: Option<f64> = None;
    for _ in 0..repeats.max(1) {
        let mut sim = Sim::new(config.clone(), layout, dispatcher()?)?;
        sample_peak(&mut peak);
        let start = Instant::now();
        sim.run()?;
        total += start.elapsed();
        // sampled while the finished run's buffers are still alive
        sample_peak(&mut peak);
    }
    Ok(Measurement {
        mean: total / repeats.max(1) as u32,
        peak_mb: peak,
    })
}

fn sample_peak(peak: &mut Option<f64>) {
    if let Some(mb) = resident_memory_mb() {
        *peak = Some(peak.map_or(mb, |p| p.max(mb)));
    }
}

pub fn format_row(result: &BenchResult) -> String {
    match &result.outcome {
        Ok(measurement) => {
            let peak = match measurement.peak_mb {
                Some(mb) => format!("{:.1}", mb),
                None => "n/a".to_string(),
            };
            format!(
                "{:<28} | {:>12.3} | {:>12}",
                result.name,
                measurement.mean.as_secs_f64() * 1000.,
                peak
            )
        }
        Err(reason) => format!("{:<28} | FAILED: {}", result.name, reason),
    }
}

pub fn print_table(results: &[BenchResult]) {
    println!(
        "\n{:<28} | {:>12} | {:>12}\n{}",
        "strategy/layout",
        "mean (ms)",
        "peak (MB)",
        "-".repeat(58)
    );
    for result in results {
        println!("{}", format_row(result));
    }
}

/// Resident memory of the current process in megabytes.
#[cfg(feature = "psutils")]
pub fn resident_memory_mb() -> Option<f64> {
    let process = psutil::process::Process::current().ok()?;
    let mem = process.memory_info().ok()?;
    Some(mem.rss() as f64 / 1000000.0)
}

#[cfg(not(feature = "psutils"))]
pub fn resident_memory_mb() -> Option<f64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> Config {
        Config {
            road_length: 60,
            vehicle_count: 20,
            steps: 5,
            workers: 2,
            seed: Some(5),
            ..Config::default()
        }
    }

    #[test]
    fn failing_combination_is_recorded_and_others_still_run() {
        let config = small_config();
        let mut results = vec![measure("broken/cells", &config, Layout::Cells, 1, false, || {
            Err(anyhow::Error::msg("no workers reachable"))
        })];
        results.extend(run_all(&config, 1, false));

        assert_eq!(results.len(), 11);
        assert_eq!(
            results[0].outcome,
            Err("no workers reachable".to_string())
        );
        assert!(format_row(&results[0]).contains("FAILED: no workers reachable"));
        for result in &results[1..] {
            assert!(result.outcome.is_ok(), "{} failed: {:?}", result.name, result.outcome);
        }
    }

    #[test]
    fn successful_row_reports_mean_time() {
        let config = small_config();
        let result = measure("sequential/cells", &config, Layout::Cells, 2, true, || {
            Ok(Strategy::Sequential.dispatcher(&config)?)
        });
        let measurement = result.outcome.unwrap();
        assert!(format_row(&BenchResult {
            name: "sequential/cells".to_string(),
            outcome: Ok(measurement),
        })
        .starts_with("sequential/cells"));
    }
}
