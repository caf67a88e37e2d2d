use std::net::{SocketAddr, TcpListener};
use std::thread;
use std::time::Duration;

use nasch_core::distr;
use nasch_core::{Config, Layout, Sim, Strategy};
use nasch_net::sig::Signal;
use nasch_net::socket::FramedStream;
use nasch_net::{CompressionPolicy, Registry, SocketConfig, Worker};

/// Captures log output with the test harness. Only the first call installs
/// the logger.
fn setup_logging() {
    let _ = simplelog::TestLogger::init(
        simplelog::LevelFilter::Debug,
        simplelog::Config::default(),
    );
}

fn config() -> Config {
    setup_logging();
    Config {
        road_length: 200,
        vehicle_count: 70,
        slowdown_probability: 0.,
        steps: 25,
        workers: 3,
        seed: Some(77),
        worker_timeout_ms: Some(5000),
        ..Config::default()
    }
}

/// Starts a worker on an ephemeral port serving a single master.
fn spawn_worker(config: SocketConfig) -> SocketAddr {
    let worker = Worker::new_with_config(Some("127.0.0.1:0"), config).unwrap();
    let addr = worker.local_addr().unwrap();
    thread::spawn(move || worker.serve_connections(Some(1)));
    addr
}

fn registry(addrs: &[SocketAddr]) -> Registry {
    let list = addrs
        .iter()
        .enumerate()
        .map(|(n, a)| format!("w{}={}", n, a))
        .collect::<Vec<_>>()
        .join(",");
    list.parse().unwrap()
}

fn reference(layout: Layout) -> Vec<nasch_core::PositionedVehicle> {
    let config = config();
    let dispatch = Strategy::Sequential.dispatcher(&config).unwrap();
    let mut sim = Sim::new(config, layout, dispatch).unwrap();
    sim.run().unwrap();
    sim.vehicles()
}

#[test]
fn tcp_workers_match_sequential_run() {
    for layout in &[Layout::Cells, Layout::Vehicles] {
        let socket_config = SocketConfig::default();
        let addrs: Vec<_> = (0..3).map(|_| spawn_worker(socket_config)).collect();
        let config = config();
        let central = registry(&addrs)
            .connect(socket_config, config.worker_timeout())
            .unwrap();
        assert_eq!(central.worker_ids(), vec!["w0", "w1", "w2"]);

        let mut sim = Sim::new(config, *layout, Box::new(central)).unwrap();
        sim.run().unwrap();
        assert_eq!(sim.clock(), 25);
        assert_eq!(sim.vehicles(), reference(*layout));
    }
}

#[cfg(feature = "lz4")]
#[test]
fn compressed_transport_gives_same_result() {
    let socket_config = SocketConfig {
        compression: CompressionPolicy::Everything,
        ..SocketConfig::default()
    };
    let addrs: Vec<_> = (0..2).map(|_| spawn_worker(socket_config)).collect();
    let central = registry(&addrs).connect(socket_config, None).unwrap();
    let mut sim = Sim::new(config(), Layout::Cells, Box::new(central)).unwrap();
    sim.run().unwrap();
    assert_eq!(sim.vehicles(), reference(Layout::Cells));
}

#[test]
fn unreachable_worker_fails_startup() {
    // grab a free port and release it again
    let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
    let result = registry(&[addr]).connect(SocketConfig::default(), None);
    assert!(result.is_err());
}

#[test]
fn silent_worker_times_out_and_state_is_kept() {
    // fake worker that completes the handshake but never answers a request
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut stream = FramedStream::new(stream, SocketConfig::default()).unwrap();
        let (id, _) = stream.recv_sig().unwrap().into_inner();
        stream
            .send_sig(&Signal::from(id, distr::Signal::Pong))
            .unwrap();
        let _ = stream.recv_sig();
        thread::sleep(Duration::from_secs(2));
    });

    let mut config = config();
    config.worker_timeout_ms = Some(200);
    let central = registry(&[addr])
        .connect(SocketConfig::default(), config.worker_timeout())
        .unwrap();
    let mut sim = Sim::new(config, Layout::Cells, Box::new(central)).unwrap();
    let before = sim.road();
    match sim.step() {
        Err(nasch_core::Error::WorkerTimedOut { worker, round }) => {
            assert_eq!(worker, "w0");
            assert_eq!(round, 0);
        }
        other => panic!("expected worker timeout, got {:?}", other),
    }
    assert_eq!(sim.clock(), 0);
    assert_eq!(sim.road(), before);

    // the late answer may still arrive, the connection must not be reused
    match sim.step() {
        Err(nasch_core::Error::WorkerFailed { worker, reason }) => {
            assert_eq!(worker, "w0");
            assert!(reason.contains("earlier failed request"), "{}", reason);
        }
        other => panic!("expected refused request, got {:?}", other),
    }
    assert_eq!(sim.clock(), 0);
    assert_eq!(sim.road(), before);
}
