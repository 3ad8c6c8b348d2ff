use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Error binding socket on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("Error receiving datagram: {0}")]
    Receive(std::io::Error),
    #[error("Error reading local address: {0}")]
    LocalAddress(std::io::Error),
}
