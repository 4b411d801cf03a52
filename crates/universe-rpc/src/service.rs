//! gRPC service implementation over a [`UniverseNode`].

use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};
use universe_core::UniverseError;
use universe_sync::{ErrorClass, SyncError, SyncTargets, UniverseNode};

use crate::convert;
use crate::proto::{
    universe_server::Universe, AddFederationServerRequest, AddFederationServerResponse,
    AssetLeafKeyResponse, AssetLeafKeysRequest, AssetLeafResponse, AssetLeavesRequest,
    AssetRootQuery, AssetRootRequest, AssetRootResponse, DeleteFederationServerRequest,
    DeleteFederationServerResponse, ListFederationServersRequest, ListFederationServersResponse,
    PushLeavesRequest, PushLeavesResponse, QueryRootResponse, SyncRequest, SyncResponse,
    UniverseFederationServer,
};
use crate::tracing::prefix;

/// Map a universe error to its gRPC status.
pub fn universe_status(err: &UniverseError) -> Status {
    class_status(ErrorClass::from(err), err.to_string())
}

/// Map a sync error to its gRPC status.
pub fn sync_status(err: &SyncError) -> Status {
    match err {
        SyncError::Timeout(_) => Status::deadline_exceeded(err.to_string()),
        _ => class_status(err.class(), err.to_string()),
    }
}

fn class_status(class: ErrorClass, message: String) -> Status {
    match class {
        ErrorClass::Validation => Status::invalid_argument(message),
        ErrorClass::NotFound => Status::not_found(message),
        ErrorClass::Conflict => Status::already_exists(message),
        ErrorClass::Verification => Status::failed_precondition(message),
        ErrorClass::Network => Status::unavailable(message),
    }
}

fn hosts(servers: Vec<UniverseFederationServer>) -> Result<Vec<String>, Status> {
    servers
        .into_iter()
        .map(|server| {
            let host = server.host.trim().to_string();
            if host.is_empty() {
                Err(Status::invalid_argument("federation server host is empty"))
            } else {
                Ok(host)
            }
        })
        .collect()
}

/// Universe gRPC service.
pub struct UniverseService {
    node: Arc<UniverseNode>,
}

impl UniverseService {
    pub fn new(node: Arc<UniverseNode>) -> Self {
        Self { node }
    }
}

#[tonic::async_trait]
impl Universe for UniverseService {
    async fn asset_roots(
        &self,
        _request: Request<AssetRootRequest>,
    ) -> Result<Response<AssetRootResponse>, Status> {
        let roots = self.node.asset_roots();
        debug!("Serving {} universe roots", roots.len());
        Ok(Response::new(convert::roots_to_proto(&roots)))
    }

    async fn query_asset_roots(
        &self,
        request: Request<AssetRootQuery>,
    ) -> Result<Response<QueryRootResponse>, Status> {
        let id = convert::id_from_proto(request.into_inner().id)
            .map_err(|e| universe_status(&e))?;
        let root = self.node.query_root(&id).map_err(|e| universe_status(&e))?;
        Ok(Response::new(QueryRootResponse {
            asset_root: Some(convert::root_to_proto(&id, &root)),
        }))
    }

    async fn asset_leaf_keys(
        &self,
        request: Request<AssetLeafKeysRequest>,
    ) -> Result<Response<AssetLeafKeyResponse>, Status> {
        let req = request.into_inner();
        let id = convert::id_from_proto(req.id).map_err(|e| universe_status(&e))?;
        let mode = convert::mode_from_proto(req.mode).map_err(|e| universe_status(&e))?;
        let keys = self
            .node
            .leaf_keys(&id, mode)
            .map_err(|e| universe_status(&e))?;
        Ok(Response::new(AssetLeafKeyResponse {
            asset_keys: keys.iter().map(convert::key_to_proto).collect(),
        }))
    }

    async fn asset_leaves(
        &self,
        request: Request<AssetLeavesRequest>,
    ) -> Result<Response<AssetLeafResponse>, Status> {
        let req = request.into_inner();
        let id = convert::id_from_proto(req.id).map_err(|e| universe_status(&e))?;
        let mode = convert::mode_from_proto(req.mode).map_err(|e| universe_status(&e))?;
        let served = self.node.leaves(&id, mode).map_err(|e| universe_status(&e))?;
        debug!("Serving {} leaves of {}", served.leaves.len(), id);
        Ok(Response::new(AssetLeafResponse {
            root: Some(convert::root_to_proto(&id, &served.root)),
            leaves: served
                .leaves
                .iter()
                .map(convert::leaf_with_proof_to_proto)
                .collect(),
        }))
    }

    async fn push_leaves(
        &self,
        request: Request<PushLeavesRequest>,
    ) -> Result<Response<PushLeavesResponse>, Status> {
        let req = request.into_inner();
        let (id, source_root) =
            convert::root_from_proto(req.source_root).map_err(|e| universe_status(&e))?;
        let leaves = req
            .leaves
            .into_iter()
            .map(convert::leaf_with_proof_from_proto)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| universe_status(&e))?;

        debug!("{} Received push of {} leaves for {}", prefix::SYNC, leaves.len(), id);
        let root = self
            .node
            .receive_push(&id, source_root, leaves)
            .map_err(|e| {
                warn!("Rejected push for {}: {}", id, e);
                sync_status(&e)
            })?;
        Ok(Response::new(PushLeavesResponse {
            root: Some(convert::root_to_proto(&id, &root)),
        }))
    }

    async fn sync_universe(
        &self,
        request: Request<SyncRequest>,
    ) -> Result<Response<SyncResponse>, Status> {
        let req = request.into_inner();
        let host = req.universe_host.trim().to_string();
        if host.is_empty() {
            return Err(Status::invalid_argument("universe host is empty"));
        }
        let mode = convert::mode_from_proto(req.sync_mode).map_err(|e| universe_status(&e))?;
        let targets = req
            .sync_targets
            .into_iter()
            .map(|id| convert::id_from_proto(Some(id)))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| universe_status(&e))?;

        info!("{} Syncing from {} ({:?})", prefix::SYNC, host, mode);
        let report = self
            .node
            .sync_universe(&host, mode, &SyncTargets::from_ids(targets))
            .await
            .map_err(|e| sync_status(&e))?;

        Ok(Response::new(SyncResponse {
            synced_universes: report.diffs.iter().map(convert::diff_to_proto).collect(),
            failed_universes: report
                .failures
                .iter()
                .map(convert::failure_to_proto)
                .collect(),
        }))
    }

    async fn add_federation_server(
        &self,
        request: Request<AddFederationServerRequest>,
    ) -> Result<Response<AddFederationServerResponse>, Status> {
        for host in hosts(request.into_inner().servers)? {
            self.node.add_federation_server(&host);
        }
        Ok(Response::new(AddFederationServerResponse {}))
    }

    async fn list_federation_servers(
        &self,
        _request: Request<ListFederationServersRequest>,
    ) -> Result<Response<ListFederationServersResponse>, Status> {
        Ok(Response::new(ListFederationServersResponse {
            servers: self
                .node
                .list_federation_servers()
                .iter()
                .map(convert::server_to_proto)
                .collect(),
        }))
    }

    async fn delete_federation_server(
        &self,
        request: Request<DeleteFederationServerRequest>,
    ) -> Result<Response<DeleteFederationServerResponse>, Status> {
        for host in hosts(request.into_inner().servers)? {
            self.node.delete_federation_server(&host);
        }
        Ok(Response::new(DeleteFederationServerResponse {}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto;
    use pretty_assertions::assert_eq;
    use tonic::Code;
    use universe_core::{AssetGenesis, AssetType, LeafKey, LeafKind, OutPoint, UniverseLeaf};
    use universe_sync::testing::LocalNetwork;
    use universe_sync::NodeConfig;

    fn local_service() -> (UniverseService, Arc<UniverseNode>) {
        let network = LocalNetwork::new();
        let node = network.spawn_node("local", NodeConfig::default());
        (UniverseService::new(node.clone()), node)
    }

    fn mint(node: &UniverseNode, n: u8) -> universe_core::UniverseId {
        let leaf = UniverseLeaf {
            genesis: AssetGenesis {
                first_prev_out: OutPoint::new([n; 32], 0),
                tag: format!("asset-{}", n),
                meta_hash: [0u8; 32],
                output_index: 0,
                asset_type: AssetType::Normal,
            },
            group_key: None,
            amount: 100,
            kind: LeafKind::Issuance,
            proof: vec![n],
        };
        let id = leaf.universe_id();
        node.admit(LeafKey::new(OutPoint::new([n; 32], 1), [n; 32]), leaf)
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_roots_listing_matches_query() {
        let (service, node) = local_service();
        let id = mint(&node, 1);

        let roots = service
            .asset_roots(Request::new(AssetRootRequest {}))
            .await
            .unwrap()
            .into_inner();
        let listed = roots.universe_roots[&id.universe_key_hex()].clone();

        let queried = service
            .query_asset_roots(Request::new(AssetRootQuery {
                id: Some(convert::id_to_proto(&id)),
            }))
            .await
            .unwrap()
            .into_inner()
            .asset_root
            .unwrap();
        assert_eq!(listed, queried);
    }

    #[tokio::test]
    async fn test_query_errors_map_to_codes() {
        let (service, _node) = local_service();

        let status = service
            .query_asset_roots(Request::new(AssetRootQuery { id: None }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);

        let status = service
            .query_asset_roots(Request::new(AssetRootQuery {
                id: Some(proto::Id {
                    id: Some(proto::id::Id::AssetId(vec![2u8; 32])),
                }),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::NotFound);
    }

    #[tokio::test]
    async fn test_federation_membership() {
        let (service, _node) = local_service();
        let server = |host: &str| UniverseFederationServer {
            host: host.to_string(),
            ..Default::default()
        };

        service
            .add_federation_server(Request::new(AddFederationServerRequest {
                servers: vec![server("peer:10029"), server("peer:10029")],
            }))
            .await
            .unwrap();
        let listed = service
            .list_federation_servers(Request::new(ListFederationServersRequest {}))
            .await
            .unwrap()
            .into_inner()
            .servers;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].host, "peer:10029");

        service
            .delete_federation_server(Request::new(DeleteFederationServerRequest {
                servers: vec![server("peer:10029")],
            }))
            .await
            .unwrap();
        let listed = service
            .list_federation_servers(Request::new(ListFederationServersRequest {}))
            .await
            .unwrap()
            .into_inner()
            .servers;
        assert!(listed.is_empty());

        let status = service
            .add_federation_server(Request::new(AddFederationServerRequest {
                servers: vec![server("  ")],
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_tampered_push_is_rejected() {
        let (service, node) = local_service();
        let id = mint(&node, 3);
        let leaves = service
            .asset_leaves(Request::new(AssetLeavesRequest {
                id: Some(convert::id_to_proto(&id)),
                mode: proto::UniverseSyncMode::SyncFull as i32,
            }))
            .await
            .unwrap()
            .into_inner();

        let mut tampered = leaves.leaves.clone();
        if let Some(leaf) = tampered[0].leaf.as_mut() {
            leaf.amount += 1;
        }
        let (other, other_node) = local_service();
        let status = other
            .push_leaves(Request::new(PushLeavesRequest {
                source_root: leaves.root.clone(),
                leaves: tampered,
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::FailedPrecondition);
        assert!(other_node.query_root(&id).is_err());

        let accepted = other
            .push_leaves(Request::new(PushLeavesRequest {
                source_root: leaves.root.clone(),
                leaves: leaves.leaves,
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(accepted.root, leaves.root);
    }

    #[tokio::test]
    async fn test_sync_requires_host() {
        let (service, _node) = local_service();
        let status = service
            .sync_universe(Request::new(SyncRequest {
                universe_host: String::new(),
                sync_mode: 0,
                sync_targets: Vec::new(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);

        let status = service
            .sync_universe(Request::new(SyncRequest {
                universe_host: "missing".into(),
                sync_mode: 0,
                sync_targets: Vec::new(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::Unavailable);
    }
}
