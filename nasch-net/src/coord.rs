//! Master-side connections to remote workers.

use std::net::SocketAddr;
use std::time::Duration;

use nasch_core::distr::{self, ComputeRequest, ComputeResponse, WorkerConnection};

use crate::error::{Error, Result};
use crate::sig::Signal;
use crate::socket::{FramedStream, SocketConfig};
use crate::SeqId;

/// Single worker as seen by the master.
pub struct TcpConnection {
    id: String,
    addr: SocketAddr,
    stream: FramedStream,
    next_seq: SeqId,
    /// Set once a request failed midway, the stream may hold a stale answer
    failed: bool,
}

impl TcpConnection {
    /// Connects to the worker and verifies it responds to a ping.
    pub fn connect(id: &str, addr: SocketAddr, config: SocketConfig) -> Result<Self> {
        let stream = FramedStream::connect(addr, config)?;
        let mut connection = Self {
            id: id.to_string(),
            addr,
            stream,
            next_seq: 0,
            failed: false,
        };
        connection.stream.set_read_timeout(config.connect_timeout)?;
        match connection.exchange(distr::Signal::Ping)? {
            distr::Signal::Pong => (),
            other => return Err(Error::HandshakeFailed(format!("{:?}", other))),
        }
        debug!("handshake with worker {} at {} complete", id, addr);
        Ok(connection)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Sends a signal and waits for the paired answer.
    fn exchange(&mut self, sig: distr::Signal) -> Result<distr::Signal> {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.stream.send_sig(&Signal::from(seq, sig))?;
        let (id, answer) = self.stream.recv_sig()?.into_inner();
        if id != seq {
            return Err(Error::SequenceMismatch {
                expected: seq,
                got: id,
            });
        }
        Ok(answer)
    }

    /// Whether the connection was given up after a failed request.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Gives up the connection so that a late answer is never taken for
    /// the response to a later request.
    fn fail(&mut self) {
        self.failed = true;
        if let Err(e) = self.stream.shutdown() {
            debug!("failed shutting down stream to worker {}: {}", self.id, e);
        }
    }
}

impl WorkerConnection for TcpConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn compute(
        &mut self,
        request: &ComputeRequest,
        timeout: Option<Duration>,
    ) -> nasch_core::Result<ComputeResponse> {
        if self.failed {
            return Err(nasch_core::Error::WorkerFailed {
                worker: self.id.clone(),
                reason: "connection closed after an earlier failed request".to_string(),
            });
        }
        self.stream.set_read_timeout(timeout)?;
        match self.exchange(distr::Signal::ComputeSegment(request.clone())) {
            Ok(distr::Signal::SegmentComputed(response)) => Ok(response),
            Ok(distr::Signal::ComputeFailed(reason)) => Err(nasch_core::Error::WorkerFailed {
                worker: self.id.clone(),
                reason,
            }),
            Ok(other) => Err(nasch_core::Error::ProtocolViolation(format!(
                "unexpected answer from worker {}: {:?}",
                self.id, other
            ))),
            Err(Error::TimedOut) => {
                self.fail();
                warn!("worker {} timed out during round {}", self.id, request.round);
                Err(nasch_core::Error::WorkerTimedOut {
                    worker: self.id.clone(),
                    round: request.round,
                })
            }
            Err(e) => {
                self.fail();
                error!("worker {} failed during round {}: {}", self.id, request.round, e);
                Err(nasch_core::Error::WorkerFailed {
                    worker: self.id.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    fn disconnect(&mut self) -> nasch_core::Result<()> {
        if self.failed {
            return Ok(());
        }
        let seq = self.next_seq;
        self.stream
            .send_sig(&Signal::from(seq, distr::Signal::Disconnect))?;
        self.stream.shutdown()?;
        Ok(())
    }
}
