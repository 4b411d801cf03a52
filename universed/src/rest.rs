//! JSON/HTTP mapping of the read side of the universe service.
//!
//! Endpoints:
//! - GET /roots                     - All non-empty universe roots
//! - GET /roots/asset-id/:hex       - Root of an asset universe
//! - GET /roots/group-key/:hex      - Root of a group universe (schnorr key)
//! - GET /leaves/asset-id/:hex      - Leaves with proofs of an asset universe
//! - GET /leaves/group-key/:hex     - Leaves with proofs of a group universe
//!
//! Leaf endpoints take an optional `?mode=issuance_only|full` (default full).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use universe_core::{
    AssetId, CommitmentRoot, CompressedProof, GroupKey, LeafKey, SyncMode, UniverseError,
    UniverseId, UniverseLeaf,
};
use universe_sync::UniverseNode;

pub fn router(node: Arc<UniverseNode>) -> Router {
    Router::new()
        .route("/roots", get(roots))
        .route("/roots/asset-id/:hex", get(asset_root))
        .route("/roots/group-key/:hex", get(group_root))
        .route("/leaves/asset-id/:hex", get(asset_leaves))
        .route("/leaves/group-key/:hex", get(group_leaves))
        .with_state(node)
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<UniverseError> for ApiError {
    fn from(err: UniverseError) -> Self {
        let status = match err {
            UniverseError::Validation(_) => StatusCode::BAD_REQUEST,
            UniverseError::NotFound(_) => StatusCode::NOT_FOUND,
            UniverseError::Conflict { .. } => StatusCode::CONFLICT,
            UniverseError::Verification(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Serialize)]
pub struct RootView {
    pub id: UniverseId,
    pub universe_key: String,
    pub root: CommitmentRoot,
}

impl RootView {
    fn new(id: UniverseId, root: CommitmentRoot) -> Self {
        Self {
            universe_key: id.universe_key_hex(),
            id,
            root,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RootsView {
    pub universe_roots: BTreeMap<String, RootView>,
}

#[derive(Debug, Serialize)]
pub struct LeafView {
    pub key: LeafKey,
    pub leaf: UniverseLeaf,
    pub proof: CompressedProof,
}

#[derive(Debug, Serialize)]
pub struct LeavesView {
    pub root: RootView,
    pub leaves: Vec<LeafView>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LeavesQuery {
    pub mode: Option<SyncMode>,
}

pub async fn roots(State(node): State<Arc<UniverseNode>>) -> Json<RootsView> {
    let universe_roots = node
        .asset_roots()
        .into_iter()
        .map(|(id, root)| (id.universe_key_hex(), RootView::new(id, root)))
        .collect();
    Json(RootsView { universe_roots })
}

fn root_of(node: &UniverseNode, id: UniverseId) -> ApiResult<RootView> {
    let root = node.query_root(&id)?;
    Ok(Json(RootView::new(id, root)))
}

pub async fn asset_root(
    State(node): State<Arc<UniverseNode>>,
    Path(hex): Path<String>,
) -> ApiResult<RootView> {
    root_of(&node, AssetId::from_hex(&hex)?.into())
}

pub async fn group_root(
    State(node): State<Arc<UniverseNode>>,
    Path(hex): Path<String>,
) -> ApiResult<RootView> {
    root_of(&node, GroupKey::from_hex(&hex)?.into())
}

fn leaves_of(node: &UniverseNode, id: UniverseId, query: LeavesQuery) -> ApiResult<LeavesView> {
    let served = node.leaves(&id, query.mode.unwrap_or(SyncMode::Full))?;
    Ok(Json(LeavesView {
        root: RootView::new(id, served.root),
        leaves: served
            .leaves
            .into_iter()
            .map(|l| LeafView {
                proof: l.proof.compress(),
                key: l.key,
                leaf: l.leaf,
            })
            .collect(),
    }))
}

pub async fn asset_leaves(
    State(node): State<Arc<UniverseNode>>,
    Path(hex): Path<String>,
    Query(query): Query<LeavesQuery>,
) -> ApiResult<LeavesView> {
    leaves_of(&node, AssetId::from_hex(&hex)?.into(), query)
}

pub async fn group_leaves(
    State(node): State<Arc<UniverseNode>>,
    Path(hex): Path<String>,
    Query(query): Query<LeavesQuery>,
) -> ApiResult<LeavesView> {
    leaves_of(&node, GroupKey::from_hex(&hex)?.into(), query)
}
