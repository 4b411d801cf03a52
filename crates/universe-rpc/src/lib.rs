//! Universe RPC
//!
//! The gRPC surface of a universe node and the shared runtime utilities the
//! daemon uses.
//!
//! ## Module Structure
//!
//! - `proto` - Generated protobuf types
//! - `convert` - Wire/domain conversions
//! - `service` - Server-side `Universe` implementation
//! - `client` - `UniverseRemote` over gRPC, with a channel-caching connector
//! - `server` - Server builder with graceful shutdown
//! - `tracing` - Logging setup and segment prefixes

pub mod client;
pub mod convert;
pub mod error;
pub mod server;
pub mod service;
pub mod shutdown;
pub mod tracing;

pub mod proto {
    tonic::include_proto!("universerpc");
}

pub use client::{GrpcConnector, GrpcRemote};
pub use error::{Error, Result};
pub use server::{RpcServer, DEFAULT_RPC_PORT, MAX_MESSAGE_SIZE};
pub use service::UniverseService;
pub use shutdown::shutdown_signal;
