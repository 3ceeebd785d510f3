//! Background UDP receiver holding only the latest decoded packet.
//!
//! The receive thread owns the socket. Each accepted packet overwrites the
//! single shared slot; the control loop takes non-blocking snapshots.

use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use ssp_telemetry_core::{TelemetryError, TelemetryResult, unix_timestamp};
use tracing::{debug, trace};

/// Receive timeout; bounds how long `stop` waits for the thread.
pub const RECV_TIMEOUT: Duration = Duration::from_millis(200);

const MAX_DATAGRAM: usize = 2048;

/// A decoded packet plus when it arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct Stamped<T> {
    pub value: T,
    /// Monotonic receipt time, used for staleness.
    pub received_at: Instant,
    /// Wall-clock receipt time, used as the frame timestamp.
    pub wall_ts: f64,
    /// Count of accepted packets, starting at 1.
    pub seq: u64,
}

impl<T> Stamped<T> {
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.received_at)
    }
}

type Slot<T> = Arc<Mutex<Option<Stamped<T>>>>;

pub struct UdpReceiver<T> {
    local_addr: SocketAddr,
    latest: Slot<T>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl<T> std::fmt::Debug for UdpReceiver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpReceiver")
            .field("local_addr", &self.local_addr)
            .field("running", &self.thread.is_some())
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + 'static> UdpReceiver<T> {
    /// Bind `addr` and start the receive thread. Packets for which `decode`
    /// returns `None` are dropped.
    pub fn spawn(
        source_id: &str,
        addr: SocketAddr,
        decode: fn(&[u8]) -> Option<T>,
    ) -> TelemetryResult<Self> {
        let socket = UdpSocket::bind(addr).map_err(|e| {
            TelemetryError::not_available(source_id, format!("cannot bind UDP {addr}: {e}"))
        })?;
        socket.set_read_timeout(Some(RECV_TIMEOUT))?;
        let local_addr = socket.local_addr()?;

        let latest: Slot<T> = Arc::new(Mutex::new(None));
        let stop = Arc::new(AtomicBool::new(false));

        let thread = std::thread::Builder::new()
            .name(format!("ssp-udp-{source_id}"))
            .spawn({
                let latest = Arc::clone(&latest);
                let stop = Arc::clone(&stop);
                let source_id = source_id.to_string();
                move || receive_loop(&source_id, &socket, decode, &latest, &stop)
            })?;

        debug!(source_id, %local_addr, "UDP receiver started");
        Ok(Self {
            local_addr,
            latest,
            stop,
            thread: Some(thread),
        })
    }

    /// Snapshot of the most recent accepted packet.
    pub fn latest(&self) -> Option<Stamped<T>> {
        self.latest.lock().clone()
    }
}

impl<T> UdpReceiver<T> {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Signal the thread and wait for it; returns within one receive timeout.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            debug!(local_addr = %self.local_addr, "UDP receive thread panicked");
        }
    }
}

impl<T> Drop for UdpReceiver<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn receive_loop<T>(
    source_id: &str,
    socket: &UdpSocket,
    decode: fn(&[u8]) -> Option<T>,
    latest: &Mutex<Option<Stamped<T>>>,
    stop: &AtomicBool,
) {
    let mut buf = [0u8; MAX_DATAGRAM];
    let mut seq: u64 = 0;

    while !stop.load(Ordering::Acquire) {
        let len = match socket.recv_from(&mut buf) {
            Ok((len, _peer)) => len,
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                continue;
            }
            // Windows reports ICMP port-unreachable on UDP sockets as a reset.
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => continue,
            Err(e) => {
                debug!(source_id, error = %e, "UDP receive failed; stopping receiver");
                break;
            }
        };

        let Some(value) = buf.get(..len).and_then(decode) else {
            trace!(source_id, len, "dropped undecodable datagram");
            continue;
        };

        seq = seq.wrapping_add(1);
        *latest.lock() = Some(Stamped {
            value,
            received_at: Instant::now(),
            wall_ts: unix_timestamp(),
            seq,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn decode_first_byte(data: &[u8]) -> Option<u8> {
        data.first().copied().filter(|b| *b != 0)
    }

    fn wait_for<T: Clone + Send + 'static>(
        rx: &UdpReceiver<T>,
        pred: impl Fn(&Stamped<T>) -> bool,
    ) -> Option<Stamped<T>> {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Some(s) = rx.latest().filter(|s| pred(s)) {
                return Some(s);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        None
    }

    #[test]
    fn keeps_only_latest_decoded_packet() -> TestResult {
        let mut rx = UdpReceiver::spawn(
            "test",
            SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            decode_first_byte,
        )?;
        let tx = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))?;

        tx.send_to(&[7], rx.local_addr())?;
        let first = wait_for(&rx, |s| s.value == 7).ok_or("first packet not received")?;
        assert_eq!(first.seq, 1);

        tx.send_to(&[0], rx.local_addr())?;
        tx.send_to(&[9], rx.local_addr())?;
        let second = wait_for(&rx, |s| s.value == 9).ok_or("second packet not received")?;
        assert_eq!(second.seq, 2);

        rx.stop();
        Ok(())
    }

    #[test]
    fn stop_returns_promptly() -> TestResult {
        let mut rx = UdpReceiver::<u8>::spawn(
            "test",
            SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            decode_first_byte,
        )?;
        let started = Instant::now();
        rx.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(rx.latest().is_none());
        Ok(())
    }

    #[test]
    fn bind_conflict_is_not_available() -> TestResult {
        let taken = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))?;
        let result = UdpReceiver::spawn("test", taken.local_addr()?, decode_first_byte);
        assert!(matches!(result, Err(TelemetryError::NotAvailable { .. })));
        Ok(())
    }
}
