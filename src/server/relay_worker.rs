use std::{
    io::ErrorKind,
    net::{SocketAddr, UdpSocket},
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
    time::{Duration, Instant},
};

use log::{debug, info, warn};

use super::ServerError;

/// Largest payload a single UDP datagram can carry.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// How long a blocked receive waits before checking for a stop request.
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// A subscriber that sends nothing to the output port for this long is dropped.
pub const SUBSCRIBER_TIMEOUT: Duration = Duration::from_secs(10);

/// Subscriber addresses with the time each one was last heard from.
#[derive(Debug, Default)]
pub struct Subscribers {
    addresses: Mutex<Vec<(SocketAddr, Instant)>>,
}

impl Subscribers {
    /// Returns false when `address` was already subscribed; its deadline is
    /// pushed back either way.
    pub fn refresh(&self, address: SocketAddr, now: Instant) -> bool {
        let mut lock = self.addresses.lock().unwrap();
        if let Some((_, seen)) = lock.iter_mut().find(|(x, _)| *x == address) {
            *seen = now;
            return false;
        }
        lock.push((address, now));
        true
    }

    pub fn remove(&self, address: SocketAddr) {
        let mut lock = self.addresses.lock().unwrap();
        lock.retain(|&(x, _)| x != address);
    }

    /// Drops every subscriber not heard from within `timeout` of `now`.
    pub fn prune(&self, now: Instant, timeout: Duration) -> Vec<SocketAddr> {
        let mut lock = self.addresses.lock().unwrap();
        let mut expired = Vec::new();
        lock.retain(|&(address, seen)| {
            let alive = now.saturating_duration_since(seen) <= timeout;
            if !alive {
                expired.push(address);
            }
            alive
        });
        expired
    }

    pub fn snapshot(&self) -> Vec<SocketAddr> {
        let lock = self.addresses.lock().unwrap();
        lock.iter().map(|&(address, _)| address).collect()
    }

    pub fn len(&self) -> usize {
        self.addresses.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
pub struct RelayWorker {
    input: UdpSocket,
    output: UdpSocket,
    subscribers: Subscribers,
    subscriber_timeout: Duration,
    stopped: AtomicBool,
}

impl RelayWorker {
    pub fn new(
        input: UdpSocket,
        output: UdpSocket,
        subscriber_timeout: Duration,
    ) -> std::io::Result<Self> {
        input.set_read_timeout(Some(POLL_INTERVAL))?;
        output.set_read_timeout(Some(POLL_INTERVAL))?;

        Ok(Self {
            input,
            output,
            subscribers: Subscribers::default(),
            subscriber_timeout,
            stopped: AtomicBool::new(false),
        })
    }

    pub fn subscribers(&self) -> &Subscribers {
        &self.subscribers
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    /// Registers or refreshes the sender of every datagram that reaches the
    /// output port.
    pub fn accept_subscribers(&self) -> Result<(), ServerError> {
        self.receive_until_stopped(&self.output, |_, address| {
            if self.subscribers.refresh(address, Instant::now()) {
                info!(
                    "New subscriber {}, {} subscribed",
                    address,
                    self.subscribers.len()
                );
            }
        })
    }

    /// Sends every datagram that reaches the input port to all live
    /// subscribers, dropping the expired ones first.
    pub fn forward_frames(&self) -> Result<(), ServerError> {
        self.receive_until_stopped(&self.input, |frame, source| {
            debug!("Frame of {} bytes from {}", frame.len(), source);

            for expired in self.subscribers.prune(Instant::now(), self.subscriber_timeout) {
                info!("Subscriber {} timed out", expired);
            }

            for client in self.subscribers.snapshot() {
                if let Err(err) = self.output.send_to(frame, client) {
                    warn!("Dropping subscriber {}: {}", client, err);
                    self.subscribers.remove(client);
                }
            }
        })
    }

    fn receive_until_stopped<F>(&self, socket: &UdpSocket, mut on_datagram: F) -> Result<(), ServerError>
    where
        F: FnMut(&[u8], SocketAddr),
    {
        let mut buffer = vec![0; MAX_DATAGRAM_SIZE];

        let result = loop {
            if self.is_stopped() {
                break Ok(());
            }

            match socket.recv_from(&mut buffer) {
                Ok((n, address)) => on_datagram(&buffer[..n], address),
                Err(err) if is_transient(&err) => continue,
                Err(err) => break Err(ServerError::Receive(err)),
            }
        };

        // the sibling loop has to stop as well
        self.stop();
        result
    }
}

fn is_transient(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::WouldBlock
            | ErrorKind::TimedOut
            | ErrorKind::Interrupted
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionRefused
    )
}
