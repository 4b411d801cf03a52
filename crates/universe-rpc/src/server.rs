//! gRPC server wiring for a universe node.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::info;
use universe_sync::UniverseNode;

use crate::error::Result;
use crate::proto::universe_server::UniverseServer;
use crate::service::UniverseService;
use crate::shutdown::shutdown_signal;
use crate::tracing::prefix::{PULSE_CLOSE, PULSE_OPEN};

/// Default gRPC port.
pub const DEFAULT_RPC_PORT: u16 = 10029;

/// Message size limit, both directions. `AssetLeaves` carries a whole
/// universe in one message.
pub const MAX_MESSAGE_SIZE: usize = 256 * 1024 * 1024;

pub struct RpcServer {
    node: Arc<UniverseNode>,
    address: SocketAddr,
}

impl RpcServer {
    pub fn new(node: Arc<UniverseNode>) -> Self {
        Self {
            node,
            address: SocketAddr::from(([127, 0, 0, 1], DEFAULT_RPC_PORT)),
        }
    }

    pub fn address(mut self, address: SocketAddr) -> Self {
        self.address = address;
        self
    }

    /// The tonic service, for callers assembling their own router.
    pub fn service(&self) -> UniverseServer<UniverseService> {
        UniverseServer::new(UniverseService::new(self.node.clone()))
            .max_decoding_message_size(MAX_MESSAGE_SIZE)
            .max_encoding_message_size(MAX_MESSAGE_SIZE)
    }

    /// Serve until Ctrl+C or SIGTERM.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(shutdown_signal()).await
    }

    pub async fn serve_with_shutdown(self, signal: impl Future<Output = ()>) -> Result<()> {
        info!("{} Universe RPC listening on {}", PULSE_OPEN, self.address);
        Server::builder()
            .add_service(self.service())
            .serve_with_shutdown(self.address, signal)
            .await?;
        info!("{} Universe RPC stopped", PULSE_CLOSE);
        Ok(())
    }

    /// Serve on an already bound listener. Used when the port is picked by
    /// the OS.
    pub async fn serve_with_listener(
        self,
        listener: TcpListener,
        signal: impl Future<Output = ()>,
    ) -> Result<()> {
        let local = listener.local_addr()?;
        info!("{} Universe RPC listening on {}", PULSE_OPEN, local);
        Server::builder()
            .add_service(self.service())
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), signal)
            .await?;
        info!("{} Universe RPC stopped", PULSE_CLOSE);
        Ok(())
    }
}
