use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket},
    time::Duration,
};

use log::info;

mod errors;
pub mod relay_worker;

pub use errors::ServerError;

use self::relay_worker::{RelayWorker, SUBSCRIBER_TIMEOUT};

/// Takes over the process once the launcher has resolved the ports.
///
/// Under normal operation `serve` never returns.
pub trait Serve {
    fn serve(&self, input_port: u16, output_port: u16) -> Result<(), ServerError>;
}

impl<T: Serve + ?Sized> Serve for &T {
    fn serve(&self, input_port: u16, output_port: u16) -> Result<(), ServerError> {
        (**self).serve(input_port, output_port)
    }
}

impl<T: Serve + ?Sized> Serve for Box<T> {
    fn serve(&self, input_port: u16, output_port: u16) -> Result<(), ServerError> {
        (**self).serve(input_port, output_port)
    }
}

/// Fans datagrams out from the input port to whoever subscribed on the
/// output port. Payloads are forwarded untouched.
///
/// A subscriber stays subscribed only while it keeps sending a datagram to
/// the output port at least once per subscriber timeout.
#[derive(Debug, Clone, Copy)]
pub struct RelayServer {
    host: IpAddr,
    subscriber_timeout: Duration,
}

impl Default for RelayServer {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            subscriber_timeout: SUBSCRIBER_TIMEOUT,
        }
    }
}

impl RelayServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(host: IpAddr) -> Self {
        Self {
            host,
            ..Default::default()
        }
    }

    pub fn subscriber_timeout(mut self, timeout: Duration) -> Self {
        self.subscriber_timeout = timeout;
        self
    }

    /// Port 0 binds an ephemeral port.
    pub fn bind(&self, input_port: u16, output_port: u16) -> Result<BoundRelay, ServerError> {
        let input = self.bind_socket(input_port)?;
        let output = self.bind_socket(output_port)?;

        let input_addr = input.local_addr().map_err(ServerError::LocalAddress)?;
        let output_addr = output.local_addr().map_err(ServerError::LocalAddress)?;

        let worker = RelayWorker::new(input, output, self.subscriber_timeout)
            .map_err(ServerError::LocalAddress)?;

        Ok(BoundRelay {
            input_addr,
            output_addr,
            worker,
        })
    }

    fn bind_socket(&self, port: u16) -> Result<UdpSocket, ServerError> {
        UdpSocket::bind((self.host, port)).map_err(|source| ServerError::Bind { port, source })
    }
}

impl Serve for RelayServer {
    fn serve(&self, input_port: u16, output_port: u16) -> Result<(), ServerError> {
        let relay = self.bind(input_port, output_port)?;

        info!("Input socket listening on {}", relay.input_addr());
        info!("Output socket listening on {}", relay.output_addr());

        relay.run()
    }
}

#[derive(Debug)]
pub struct BoundRelay {
    input_addr: SocketAddr,
    output_addr: SocketAddr,
    worker: RelayWorker,
}

impl BoundRelay {
    pub fn input_addr(&self) -> SocketAddr {
        self.input_addr
    }

    pub fn output_addr(&self) -> SocketAddr {
        self.output_addr
    }

    pub fn subscriber_count(&self) -> usize {
        self.worker.subscribers().len()
    }

    /// Makes `run` return within one poll interval.
    pub fn stop(&self) {
        self.worker.stop();
    }

    /// Blocks until `stop` is called or either socket fails.
    pub fn run(&self) -> Result<(), ServerError> {
        std::thread::scope(|s| {
            let subscriptions = s.spawn(|| self.worker.accept_subscribers());

            let forwarding = self.worker.forward_frames();

            let subscriptions = subscriptions
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic));

            forwarding.and(subscriptions)
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn loopback() -> RelayServer {
        RelayServer::with_host(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    #[test]
    fn test_forwards_frame_unchanged() {
        let relay = loopback().bind(0, 0).unwrap();

        let camera = UdpSocket::bind("127.0.0.1:0").unwrap();
        let viewer = UdpSocket::bind("127.0.0.1:0").unwrap();
        viewer
            .set_read_timeout(Some(Duration::from_millis(100)))
            .unwrap();

        let frame: Vec<u8> = (0..=255).collect();

        std::thread::scope(|s| {
            let running = s.spawn(|| relay.run());

            let mut buffer = [0; 1024];
            let mut received = None;
            for _ in 0..50 {
                viewer.send_to(b"subscribe", relay.output_addr()).unwrap();
                camera.send_to(&frame, relay.input_addr()).unwrap();

                if let Ok((n, from)) = viewer.recv_from(&mut buffer) {
                    received = Some((buffer[..n].to_vec(), from));
                    break;
                }
            }

            relay.stop();
            assert!(running.join().unwrap().is_ok());

            let (payload, from) = received.expect("no frame reached the subscriber");
            assert_eq!(payload, frame);
            assert_eq!(from, relay.output_addr());
        });

        assert_eq!(relay.subscriber_count(), 1);
    }

    #[test]
    fn test_silent_subscriber_is_dropped() {
        let relay = loopback()
            .subscriber_timeout(Duration::from_millis(300))
            .bind(0, 0)
            .unwrap();

        let camera = UdpSocket::bind("127.0.0.1:0").unwrap();

        std::thread::scope(|s| {
            let running = s.spawn(|| relay.run());

            let viewers: Vec<UdpSocket> = (0..5)
                .map(|_| UdpSocket::bind("127.0.0.1:0").unwrap())
                .collect();

            for _ in 0..50 {
                for viewer in &viewers {
                    viewer.send_to(b"subscribe", relay.output_addr()).unwrap();
                }
                if relay.subscriber_count() == viewers.len() {
                    break;
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            let subscribed = relay.subscriber_count();

            // the viewers go away without saying so
            drop(viewers);

            for _ in 0..100 {
                camera.send_to(b"frame", relay.input_addr()).unwrap();
                if relay.subscriber_count() == 0 {
                    break;
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            let remaining = relay.subscriber_count();

            relay.stop();
            assert!(running.join().unwrap().is_ok());

            assert_eq!(subscribed, 5);
            assert_eq!(remaining, 0);
        });
    }

    #[test]
    fn test_port_in_use() {
        let taken = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        match loopback().bind(port, 0) {
            Err(ServerError::Bind { port: failed, .. }) => assert_eq!(failed, port),
            other => panic!("expected bind error, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_ports_are_ephemeral() {
        let relay = loopback().bind(0, 0).unwrap();

        assert_ne!(relay.input_addr().port(), 0);
        assert_ne!(relay.output_addr().port(), 0);
        assert_ne!(relay.input_addr(), relay.output_addr());
    }
}
