//! Error types for the gRPC surface and the daemon.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// gRPC transport error
    #[error("grpc transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

/// Result type alias using the rpc Error.
pub type Result<T> = std::result::Result<T, Error>;
