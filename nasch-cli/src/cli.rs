//! Application definition.

extern crate simplelog;

use std::time::{Duration, Instant};

use anyhow::{Error, Result};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};

use nasch_core::{Config, Dispatch, DoubleBuffer, Layout, Sim, Strategy};
use nasch_net::{CompressionPolicy, Registry, SocketConfig, Worker};

use crate::bench;
use crate::render::Renderer;

pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");
pub const AUTHORS: &'static str = env!("CARGO_PKG_AUTHORS");

/// Arguments shared by all subcommands that set up a simulation.
fn sim_args<'a, 'b>() -> Vec<Arg<'a, 'b>> {
    vec![
        Arg::with_name("config")
            .long("config")
            .short("c")
            .takes_value(true)
            .value_name("path")
            .help("Path to a toml or yaml config file"),
        Arg::with_name("road-length")
            .long("road-length")
            .short("l")
            .takes_value(true)
            .value_name("cells")
            .help("Number of cells on the road"),
        Arg::with_name("vehicles")
            .long("vehicles")
            .short("n")
            .takes_value(true)
            .value_name("count")
            .help("Number of vehicles on the road"),
        Arg::with_name("max-velocity")
            .long("max-velocity")
            .takes_value(true)
            .value_name("cells")
            .help("Maximum vehicle velocity, in cells per round"),
        Arg::with_name("probability")
            .long("probability")
            .short("p")
            .takes_value(true)
            .value_name("p")
            .help("Probability of random slowdown"),
        Arg::with_name("steps")
            .long("steps")
            .short("s")
            .takes_value(true)
            .value_name("rounds")
            .help("Number of rounds to process"),
        Arg::with_name("seed")
            .long("seed")
            .takes_value(true)
            .value_name("u64")
            .help("Seed for the random number generators"),
        Arg::with_name("layout")
            .long("layout")
            .takes_value(true)
            .value_name("layout")
            .possible_values(&["cells", "vehicles"])
            .default_value("cells")
            .help("Road representation used for processing"),
    ]
}

fn visual_args<'a, 'b>() -> Vec<Arg<'a, 'b>> {
    vec![
        Arg::with_name("visual")
            .long("visual")
            .help("Print the road after every round"),
        Arg::with_name("delay")
            .long("delay")
            .takes_value(true)
            .value_name("millis")
            .help("Delay after printing each round"),
        Arg::with_name("plain")
            .long("plain")
            .help("Print rounds without colors and screen clearing"),
    ]
}

pub fn app<'a, 'b>() -> App<'a, 'b> {
    App::new("nasch")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .version(VERSION)
        .author(AUTHORS)
        .about("Run Nagel-Schreckenberg traffic simulations on a circular road,\n\
                locally or distributed across a cluster of workers.")
        .arg(Arg::with_name("verbosity")
            .long("verbosity")
            .short("v")
            .takes_value(true)
            .default_value("info")
            .value_name("verb")
            .global(true)
            .help("Set the verbosity of the log output"))

        // run subcommand
        .subcommand(SubCommand::with_name("run")
            .display_order(10)
            .about("Run a local simulation")
            .args(&sim_args())
            .args(&visual_args())
            .arg(Arg::with_name("strategy")
                .long("strategy")
                .takes_value(true)
                .value_name("name")
                .possible_values(&["sequential", "scoped", "rayon", "barrier"])
                .default_value("barrier")
                .help("How the work of each round is spread"))
            .arg(Arg::with_name("workers")
                .long("workers")
                .short("w")
                .takes_value(true)
                .value_name("count")
                .help("Number of parallel workers (defaults to number of cores)"))
            .arg(Arg::with_name("round-timeout")
                .long("round-timeout")
                .takes_value(true)
                .value_name("millis")
                .help("Abort if a worker waits longer than this at the end of a round")))

        // bench subcommand
        .subcommand(SubCommand::with_name("bench")
            .display_order(11)
            .about("Compare processing speed and memory use of all strategies")
            .args(&sim_args()[..7])
            .arg(Arg::with_name("workers")
                .long("workers")
                .short("w")
                .takes_value(true)
                .value_name("count")
                .help("Number of parallel workers (defaults to number of cores)"))
            .arg(Arg::with_name("repeats")
                .long("repeats")
                .short("r")
                .takes_value(true)
                .value_name("count")
                .default_value("5")
                .help("Number of measured runs per strategy"))
            .arg(Arg::with_name("no-warmup")
                .long("no-warmup")
                .help("Skip the unmeasured warmup run")))

        // worker subcommand
        .subcommand(SubCommand::with_name("worker")
            .display_order(20)
            .about("Start a worker node")
            .arg(Arg::with_name("ip")
                .long("ip")
                .takes_value(true)
                .value_name("ip-address")
                .default_value(nasch_net::worker::WORKER_ADDRESS)
                .help("Set the ip address for the worker, together with port"))
            .arg(Arg::with_name("seed")
                .long("seed")
                .takes_value(true)
                .value_name("u64")
                .help("Seed for the random number generators"))
            .arg(Arg::with_name("compression")
                .long("compression")
                .takes_value(true)
                .value_name("policy")
                .default_value("none")
                .help("What outgoing messages should be compressed: all, none or a byte threshold")))

        // master subcommand
        .subcommand(SubCommand::with_name("master")
            .display_order(21)
            .about("Run a simulation distributed across remote workers")
            .args(&sim_args())
            .args(&visual_args())
            .arg(Arg::with_name("workers")
                .long("workers")
                .short("w")
                .required(true)
                .takes_value(true)
                .value_name("registry")
                .help("Comma-separated list of workers, as `address` or `id=address`"))
            .arg(Arg::with_name("timeout")
                .long("timeout")
                .short("t")
                .takes_value(true)
                .value_name("millis")
                .help("Abort if a worker doesn't respond within this time (0 waits forever)"))
            .arg(Arg::with_name("compression")
                .long("compression")
                .takes_value(true)
                .value_name("policy")
                .default_value("none")
                .help("What outgoing messages should be compressed: all, none or a byte threshold")))
}

pub fn app_matches() -> ArgMatches<'static> {
    app().get_matches()
}

/// Runs based on specified subcommand.
pub fn start(matches: ArgMatches) -> Result<()> {
    match matches.subcommand() {
        ("run", Some(m)) => start_run(m),
        ("bench", Some(m)) => start_bench(m),
        ("worker", Some(m)) => start_worker(m),
        ("master", Some(m)) => start_master(m),
        _ => Ok(()),
    }
}

fn parse_arg<T>(matches: &ArgMatches, name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match matches.value_of(name) {
        Some(s) => s
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::msg(format!("invalid value for --{}: {} ({})", name, s, e))),
        None => Ok(None),
    }
}

/// Reads the config file if one was given and applies overrides from the
/// command line.
fn load_config(matches: &ArgMatches) -> Result<Config> {
    let mut config = match matches.value_of("config") {
        Some(path) => Config::from_path(path)?,
        None => Config::default(),
    };
    if let Some(l) = parse_arg(matches, "road-length")? {
        config.road_length = l;
    }
    if let Some(n) = parse_arg(matches, "vehicles")? {
        config.vehicle_count = n;
    }
    if let Some(v) = parse_arg(matches, "max-velocity")? {
        config.max_velocity = v;
    }
    if let Some(p) = parse_arg(matches, "probability")? {
        config.slowdown_probability = p;
    }
    if let Some(s) = parse_arg(matches, "steps")? {
        config.steps = s;
    }
    if let Some(seed) = parse_arg(matches, "seed")? {
        config.seed = Some(seed);
    }
    if matches.is_present("visual") {
        config.visual.enabled = true;
    }
    if let Some(d) = parse_arg(matches, "delay")? {
        config.visual.delay_ms = d;
    }
    if let Some(t) = parse_arg::<u64>(matches, "round-timeout")? {
        config.round_timeout_ms = Some(t);
    }
    config.validate()?;
    Ok(config)
}

fn parse_compression(matches: &ArgMatches) -> Result<CompressionPolicy> {
    match matches.value_of("compression") {
        None | Some("none") => Ok(CompressionPolicy::Nothing),
        Some("all") => Ok(CompressionPolicy::Everything),
        Some(s) => s
            .parse::<usize>()
            .map(CompressionPolicy::LargerThan)
            .map_err(|_| Error::msg(format!("invalid compression policy: {}", s))),
    }
}

/// Runs the simulation to the end, drawing every round if enabled.
fn run_sim(mut sim: Sim, plain: bool) -> Result<()> {
    let started = Instant::now();
    let visual = sim.config().visual.clone();
    if visual.enabled {
        let mut renderer = Renderer::new(
            Duration::from_millis(visual.delay_ms),
            sim.config().max_velocity,
        );
        if plain {
            renderer = renderer.plain();
        }
        renderer.draw(sim.clock(), &sim.road());
        sim.run_with(&mut |clock: usize, engine: &DoubleBuffer| {
            renderer.draw(clock, &engine.road())
        })?;
    } else {
        sim.run()?;
    }
    println!(
        "finished {} rounds ({} dispatch, {} layout): {} vehicles on {} cells, \
         mean velocity {:.3}, took {} ms",
        sim.clock(),
        sim.dispatch_name(),
        sim.layout().as_str(),
        sim.vehicles().len(),
        sim.config().road_length,
        sim.mean_velocity(),
        started.elapsed().as_millis()
    );
    Ok(())
}

fn start_run(matches: &ArgMatches) -> Result<()> {
    setup_log_verbosity(matches);
    let mut config = load_config(matches)?;
    if let Some(w) = parse_arg(matches, "workers")? {
        config.workers = w;
    }
    config.validate()?;
    let layout: Layout = parse_arg(matches, "layout")?.unwrap_or(Layout::Cells);
    let strategy: Strategy = parse_arg(matches, "strategy")?.unwrap_or(Strategy::Barrier);

    let dispatch = strategy.dispatcher(&config)?;
    let sim = Sim::new(config, layout, dispatch)?;
    run_sim(sim, matches.is_present("plain"))
}

fn start_bench(matches: &ArgMatches) -> Result<()> {
    setup_log_verbosity(matches);
    let mut config = load_config(matches)?;
    if let Some(w) = parse_arg(matches, "workers")? {
        config.workers = w;
    }
    config.validate()?;
    config.visual.enabled = false;
    let repeats: usize = parse_arg(matches, "repeats")?.unwrap_or(5);

    println!(
        "benchmarking {} rounds on {} cells with {} vehicles, {} workers, {} runs each",
        config.steps, config.road_length, config.vehicle_count, config.workers, repeats
    );
    let results = bench::run_all(&config, repeats, !matches.is_present("no-warmup"));
    bench::print_table(&results);
    Ok(())
}

fn start_worker(matches: &ArgMatches) -> Result<()> {
    setup_log_verbosity(matches);
    let socket_config = SocketConfig {
        compression: parse_compression(matches)?,
        ..SocketConfig::default()
    };
    let worker = Worker::new_with_config(matches.value_of("ip"), socket_config)?
        .with_seed(parse_arg(matches, "seed")?);
    println!("Now listening on {}", worker.local_addr()?);
    worker.serve()?;
    Ok(())
}

fn start_master(matches: &ArgMatches) -> Result<()> {
    setup_log_verbosity(matches);
    let mut config = load_config(matches)?;
    if let Some(t) = parse_arg::<u64>(matches, "timeout")? {
        config.worker_timeout_ms = if t == 0 { None } else { Some(t) };
    }
    let layout: Layout = parse_arg(matches, "layout")?.unwrap_or(Layout::Cells);
    let registry: Registry = parse_arg(matches, "workers")?
        .ok_or_else(|| Error::msg("worker registry must be provided"))?;

    let socket_config = SocketConfig {
        compression: parse_compression(matches)?,
        ..SocketConfig::default()
    };
    print!("connecting to {} workers... ", registry.len());
    let central = registry.connect(socket_config, config.worker_timeout())?;
    println!("success");
    config.workers = registry.len();

    let sim = Sim::new(config, layout, Box::new(central) as Box<dyn Dispatch>)?;
    run_sim(sim, matches.is_present("plain"))
}

fn setup_log_verbosity(matches: &ArgMatches) {
    use self::simplelog::{LevelFilter, TermLogger};
    let level_filter = match matches.value_of("verbosity") {
        Some(s) => match s {
            "0" | "none" => LevelFilter::Off,
            "1" | "err" | "error" | "min" => LevelFilter::Error,
            "2" | "warn" | "warning" | "default" => LevelFilter::Warn,
            "3" | "info" => LevelFilter::Info,
            "4" | "debug" => LevelFilter::Debug,
            "5" | "trace" | "max" | "all" => LevelFilter::Trace,
            _ => LevelFilter::Warn,
        },
        _ => LevelFilter::Warn,
    };
    let mut config_builder = simplelog::ConfigBuilder::new();
    let logger_conf = config_builder
        .set_time_level(LevelFilter::Error)
        .set_target_level(LevelFilter::Debug)
        .set_location_level(LevelFilter::Error)
        .set_time_format_str("%H:%M:%S%.6f")
        .build();
    if TermLogger::init(level_filter, logger_conf, simplelog::TerminalMode::Mixed).is_err() {
        eprintln!("failed initializing logger");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let matches = app().get_matches_from(vec![
            "nasch", "run", "-l", "40", "-n", "12", "-p", "0.1", "--steps", "9", "--seed", "3",
            "--visual", "--delay", "0",
        ]);
        let m = matches.subcommand_matches("run").unwrap();
        let config = load_config(m).unwrap();
        assert_eq!(config.road_length, 40);
        assert_eq!(config.vehicle_count, 12);
        assert_eq!(config.slowdown_probability, 0.1);
        assert_eq!(config.steps, 9);
        assert_eq!(config.seed, Some(3));
        assert!(config.visual.enabled);
        assert_eq!(config.visual.delay_ms, 0);
    }

    #[test]
    fn inconsistent_overrides_are_rejected() {
        let matches = app().get_matches_from(vec!["nasch", "run", "-l", "5", "-n", "6"]);
        let m = matches.subcommand_matches("run").unwrap();
        assert!(load_config(m).is_err());
    }

    #[test]
    fn compression_policies() {
        let matches = app().get_matches_from(vec![
            "nasch", "master", "-w", "127.0.0.1:1", "--compression", "4096",
        ]);
        let m = matches.subcommand_matches("master").unwrap();
        assert_eq!(parse_compression(m).unwrap(), CompressionPolicy::LargerThan(4096));
    }
}
