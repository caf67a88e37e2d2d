use std::net::{SocketAddr, TcpListener, TcpStream};
use std::str::FromStr;
use std::thread::{self, JoinHandle};

use nasch_core::distr::SimNode;

use crate::error::{Error, Result};
use crate::sig::Signal;
use crate::socket::{FramedStream, SocketConfig};

/// Default address the worker listens on.
pub const WORKER_ADDRESS: &str = "0.0.0.0:5912";

/// Compute worker reachable over TCP.
///
/// Every accepted master connection is handled on its own thread with its
/// own `SimNode`. The worker answers requests strictly in the order they
/// arrive on the connection, one at a time, until the master disconnects.
pub struct Worker {
    listener: TcpListener,
    config: SocketConfig,
    seed: Option<u64>,
}

impl Worker {
    /// Creates a new `Worker` listening on the given address, or on the
    /// default one.
    pub fn new(addr: Option<&str>) -> Result<Worker> {
        Worker::new_with_config(addr, SocketConfig::default())
    }

    pub fn new_with_config(addr: Option<&str>, config: SocketConfig) -> Result<Worker> {
        let address = SocketAddr::from_str(addr.unwrap_or(WORKER_ADDRESS))?;
        let listener = TcpListener::bind(address)?;
        info!("worker listening on {}", listener.local_addr()?);
        Ok(Worker {
            listener,
            config,
            seed: None,
        })
    }

    /// Seeds the random number generators of the nodes created for incoming
    /// connections.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections forever, serving each on a separate thread.
    pub fn serve(&self) -> Result<()> {
        self.serve_connections(None)
    }

    /// Accepts up to `limit` connections, waiting for all of them to close
    /// before returning.
    pub fn serve_connections(&self, limit: Option<usize>) -> Result<()> {
        let mut handles: Vec<JoinHandle<()>> = Vec::new();
        for (n, stream) in self.listener.incoming().enumerate() {
            reap_finished(&mut handles);
            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    warn!("failed accepting connection: {}", e);
                    continue;
                }
            };
            let node = SimNode::new(self.seed.map(|s| s.wrapping_add(n as u64)));
            let config = self.config;
            handles.push(thread::spawn(move || {
                if let Err(e) = handle_connection(stream, config, node) {
                    error!("connection closed with error: {}", e);
                }
            }));
            if limit.map_or(false, |l| n + 1 >= l) {
                break;
            }
        }
        for handle in handles {
            handle
                .join()
                .map_err(|_| Error::Other("connection thread panicked".to_string()))?;
        }
        Ok(())
    }
}

/// Drops the handles of connection threads that already exited.
fn reap_finished(handles: &mut Vec<JoinHandle<()>>) {
    let (finished, running): (Vec<_>, Vec<_>) =
        handles.drain(..).partition(|handle| handle.is_finished());
    for handle in finished {
        if handle.join().is_err() {
            error!("connection thread panicked");
        }
    }
    *handles = running;
}

/// Serves a single master connection until it disconnects.
fn handle_connection(stream: TcpStream, config: SocketConfig, mut node: SimNode) -> Result<()> {
    let mut stream = FramedStream::new(stream, config)?;
    let peer = stream.peer_addr()?;
    info!("master connected from {}", peer);
    loop {
        let (id, sig) = match stream.recv_sig() {
            Ok(sig) => sig.into_inner(),
            Err(Error::HostUnreachable) => {
                info!("master {} went away", peer);
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        match node.handle(sig) {
            Some(answer) => stream.send_sig(&Signal::from(id, answer))?,
            None => {
                info!("master {} disconnected", peer);
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn wait_until_finished(handles: &[JoinHandle<()>], count: usize) {
        while handles.iter().filter(|h| h.is_finished()).count() < count {
            thread::yield_now();
        }
    }

    #[test]
    fn finished_connection_threads_are_reaped() {
        let (tx, rx) = mpsc::channel::<()>();
        let mut handles: Vec<JoinHandle<()>> = (0..3).map(|_| thread::spawn(|| ())).collect();
        handles.push(thread::spawn(move || {
            let _ = rx.recv();
        }));
        wait_until_finished(&handles, 3);
        reap_finished(&mut handles);
        assert_eq!(handles.len(), 1);

        tx.send(()).unwrap();
        wait_until_finished(&handles, 1);
        reap_finished(&mut handles);
        assert!(handles.is_empty());
    }

    #[test]
    fn worker_serves_a_limited_number_of_masters() {
        let worker = Worker::new(Some("127.0.0.1:0")).unwrap();
        let addr = worker.local_addr().unwrap();
        let server = thread::spawn(move || worker.serve_connections(Some(2)));
        for n in 0..2 {
            let mut stream = FramedStream::connect(addr, SocketConfig::default()).unwrap();
            stream
                .send_sig(&Signal::from(n, nasch_core::distr::Signal::Ping))
                .unwrap();
            let (id, answer) = stream.recv_sig().unwrap().into_inner();
            assert_eq!(id, n);
            assert_eq!(answer, nasch_core::distr::Signal::Pong);
            stream
                .send_sig(&Signal::from(n + 1, nasch_core::distr::Signal::Disconnect))
                .unwrap();
        }
        server.join().unwrap().unwrap();
    }
}
