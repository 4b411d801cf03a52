//! gRPC client side of the sync protocol.
//!
//! [`GrpcConnector`] hands out [`GrpcRemote`]s over cached channels, so a
//! node can reach its peers with the same [`UniverseRemote`] contract the
//! syncer and federation use in-process.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Status};
use tracing::debug;
use universe_core::{CommitmentRoot, LeafKey, LeafWithProof, SyncMode, UniverseError, UniverseId};
use universe_sync::{
    ErrorClass, RemoteConnector, SyncError, SyncResult, UniverseLeaves, UniverseRemote,
};

use crate::convert;
use crate::server::MAX_MESSAGE_SIZE;
use crate::proto::{
    universe_client::UniverseClient, AssetLeafKeysRequest, AssetLeavesRequest,
    AssetRootQuery, AssetRootRequest, PushLeavesRequest,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Prefix `http://` unless the host already carries a scheme.
pub fn endpoint_uri(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    }
}

/// Map a status returned by `host` back into a sync error.
///
/// Transport-level codes become retryable network errors; everything else
/// keeps the class the serving node reported.
pub fn status_error(host: &str, status: Status) -> SyncError {
    let class = match status.code() {
        Code::Unavailable | Code::DeadlineExceeded | Code::Cancelled | Code::Unknown => {
            return SyncError::network(host, status.message());
        }
        Code::InvalidArgument => ErrorClass::Validation,
        Code::NotFound => ErrorClass::NotFound,
        Code::AlreadyExists => ErrorClass::Conflict,
        Code::FailedPrecondition => ErrorClass::Verification,
        _ => ErrorClass::Validation,
    };
    SyncError::remote(class, status.message())
}

// Malformed responses are the remote's fault, not ours.
fn malformed(err: UniverseError) -> SyncError {
    SyncError::remote(ErrorClass::Validation, format!("malformed response: {}", err))
}

/// A peer reached over gRPC.
pub struct GrpcRemote {
    host: String,
    client: UniverseClient<Channel>,
}

impl GrpcRemote {
    pub fn new(host: impl Into<String>, channel: Channel) -> Self {
        Self {
            host: host.into(),
            client: UniverseClient::new(channel)
                .max_decoding_message_size(MAX_MESSAGE_SIZE)
                .max_encoding_message_size(MAX_MESSAGE_SIZE),
        }
    }

    // Clients are cheap to clone and share the channel.
    fn client(&self) -> UniverseClient<Channel> {
        self.client.clone()
    }

    fn fail(&self, status: Status) -> SyncError {
        status_error(&self.host, status)
    }
}

#[async_trait]
impl UniverseRemote for GrpcRemote {
    fn host(&self) -> &str {
        &self.host
    }

    async fn asset_roots(&self) -> SyncResult<BTreeMap<UniverseId, CommitmentRoot>> {
        let response = self
            .client()
            .asset_roots(AssetRootRequest {})
            .await
            .map_err(|s| self.fail(s))?;
        convert::roots_from_proto(response.into_inner()).map_err(malformed)
    }

    async fn query_root(&self, id: &UniverseId) -> SyncResult<CommitmentRoot> {
        let response = self
            .client()
            .query_asset_roots(AssetRootQuery {
                id: Some(convert::id_to_proto(id)),
            })
            .await
            .map_err(|s| self.fail(s))?;
        let (_, root) =
            convert::root_from_proto(response.into_inner().asset_root).map_err(malformed)?;
        Ok(root)
    }

    async fn leaf_keys(&self, id: &UniverseId, mode: SyncMode) -> SyncResult<Vec<LeafKey>> {
        let response = self
            .client()
            .asset_leaf_keys(AssetLeafKeysRequest {
                id: Some(convert::id_to_proto(id)),
                mode: convert::mode_to_proto(mode),
            })
            .await
            .map_err(|s| self.fail(s))?;
        response
            .into_inner()
            .asset_keys
            .into_iter()
            .map(|key| convert::key_from_proto(Some(key)))
            .collect::<Result<_, _>>()
            .map_err(malformed)
    }

    async fn fetch_leaves(&self, id: &UniverseId, mode: SyncMode) -> SyncResult<UniverseLeaves> {
        let response = self
            .client()
            .asset_leaves(AssetLeavesRequest {
                id: Some(convert::id_to_proto(id)),
                mode: convert::mode_to_proto(mode),
            })
            .await
            .map_err(|s| self.fail(s))?
            .into_inner();
        let (_, root) = convert::root_from_proto(response.root).map_err(malformed)?;
        let leaves = response
            .leaves
            .into_iter()
            .map(convert::leaf_with_proof_from_proto)
            .collect::<Result<_, _>>()
            .map_err(malformed)?;
        Ok(UniverseLeaves { root, leaves })
    }

    async fn push_leaves(
        &self,
        id: &UniverseId,
        source_root: CommitmentRoot,
        leaves: &[LeafWithProof],
    ) -> SyncResult<CommitmentRoot> {
        let request = PushLeavesRequest {
            source_root: Some(convert::root_to_proto(id, &source_root)),
            leaves: leaves.iter().map(convert::leaf_with_proof_to_proto).collect(),
        };
        let response = self
            .client()
            .push_leaves(request)
            .await
            .map_err(|s| self.fail(s))?;
        let (_, root) = convert::root_from_proto(response.into_inner().root).map_err(malformed)?;
        Ok(root)
    }
}

/// Connects to peers over gRPC, reusing one channel per host.
#[derive(Default)]
pub struct GrpcConnector {
    channels: Mutex<HashMap<String, Channel>>,
}

impl GrpcConnector {
    pub fn new() -> Self {
        Self::default()
    }

    async fn channel(&self, host: &str) -> SyncResult<Channel> {
        let cached = self.channels.lock().get(host).cloned();
        if let Some(channel) = cached {
            return Ok(channel);
        }

        let endpoint = Endpoint::from_shared(endpoint_uri(host))
            .map_err(|e| {
                SyncError::remote(ErrorClass::Validation, format!("invalid host {}: {}", host, e))
            })?
            .connect_timeout(CONNECT_TIMEOUT);
        let channel = endpoint
            .connect()
            .await
            .map_err(|e| SyncError::network(host, e))?;

        debug!("Connected to universe server {}", host);
        self.channels
            .lock()
            .insert(host.to_string(), channel.clone());
        Ok(channel)
    }
}

#[async_trait]
impl RemoteConnector for GrpcConnector {
    async fn connect(&self, host: &str) -> SyncResult<Arc<dyn UniverseRemote>> {
        let channel = self.channel(host).await?;
        Ok(Arc::new(GrpcRemote::new(host, channel)))
    }
}
