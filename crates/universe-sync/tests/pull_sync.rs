//! Pull reconciliation between nodes on an in-process network.

mod common;

use common::{fast_config, grouped_leaf, key, leaf, universe};
use pretty_assertions::assert_eq;
use std::time::Duration;
use universe_core::{GroupKey, LeafEntry, LeafKind, SyncMode, UniverseId};
use universe_sync::testing::LocalNetwork;
use universe_sync::{ErrorClass, NodeConfig, SyncConfig, SyncError, SyncTargets};

#[tokio::test]
async fn pull_copies_issuance_leaves() {
    let network = LocalNetwork::new();
    let a = network.spawn_node("a", fast_config());
    let b = network.spawn_node("b", fast_config());
    let id = universe("gold");

    let l1 = LeafEntry::new(key(1), leaf("gold", 10, LeafKind::Issuance));
    let l2 = LeafEntry::new(key(2), leaf("gold", 20, LeafKind::Issuance));
    a.admit(l1.key, l1.leaf.clone()).unwrap();
    a.admit(l2.key, l2.leaf.clone()).unwrap();

    let report = b
        .sync_universe("a", SyncMode::IssuanceOnly, &SyncTargets::All)
        .await
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(report.diffs.len(), 1);
    let diff = &report.diffs[0];
    assert_eq!(diff.universe_id, id);
    assert_eq!(diff.old_root, None);
    assert_eq!(diff.new_root, a.query_root(&id).unwrap());

    let mut new_leaves = diff.new_leaves.clone();
    new_leaves.sort_by_key(|e| e.key);
    let mut expected = vec![l1, l2];
    expected.sort_by_key(|e| e.key);
    assert_eq!(new_leaves, expected);

    assert_eq!(b.query_root(&id).unwrap(), a.query_root(&id).unwrap());
}

#[tokio::test]
async fn repeated_sync_yields_no_diff() {
    let network = LocalNetwork::new();
    let a = network.spawn_node("a", fast_config());
    let b = network.spawn_node("b", fast_config());
    a.admit(key(1), leaf("gold", 10, LeafKind::Issuance)).unwrap();

    let first = b
        .sync_universe("a", SyncMode::IssuanceOnly, &SyncTargets::All)
        .await
        .unwrap();
    assert_eq!(first.diffs.len(), 1);

    let second = b
        .sync_universe("a", SyncMode::IssuanceOnly, &SyncTargets::All)
        .await
        .unwrap();
    assert!(second.diffs.is_empty());
    assert!(second.failures.is_empty());
}

#[tokio::test]
async fn issuance_only_skips_transfers() {
    let network = LocalNetwork::new();
    let a = network.spawn_node("a", fast_config());
    let b = network.spawn_node("b", fast_config());
    let c = network.spawn_node("c", fast_config());
    let id = universe("gold");

    a.admit(key(1), leaf("gold", 10, LeafKind::Issuance)).unwrap();
    a.admit(key(2), leaf("gold", 3, LeafKind::Transfer)).unwrap();

    // Partial view: no root comparison, no failure.
    let partial = b
        .sync_universe("a", SyncMode::IssuanceOnly, &SyncTargets::All)
        .await
        .unwrap();
    assert!(partial.is_complete());
    assert_eq!(partial.diffs[0].new_leaves.len(), 1);
    assert_eq!(b.query_root(&id).unwrap().leaf_count, 1);
    assert_ne!(b.query_root(&id), a.query_root(&id));

    let full = c
        .sync_universe("a", SyncMode::Full, &SyncTargets::All)
        .await
        .unwrap();
    assert!(full.is_complete());
    assert_eq!(full.diffs[0].new_leaves.len(), 2);
    assert_eq!(c.query_root(&id), a.query_root(&id));
}

#[tokio::test]
async fn targets_limit_reconciled_universes() {
    let network = LocalNetwork::new();
    let a = network.spawn_node("a", fast_config());
    let b = network.spawn_node("b", fast_config());

    a.admit(key(1), leaf("gold", 10, LeafKind::Issuance)).unwrap();
    a.admit(key(2), leaf("silver", 10, LeafKind::Issuance)).unwrap();

    let targets = SyncTargets::from_ids([universe("silver")]);
    let report = b.sync_universe("a", SyncMode::Full, &targets).await.unwrap();

    assert_eq!(report.diffs.len(), 1);
    assert_eq!(report.diffs[0].universe_id, universe("silver"));
    assert!(b.query_root(&universe("gold")).is_err());

    assert_eq!(SyncTargets::from_ids(Vec::<UniverseId>::new()), SyncTargets::All);
}

#[tokio::test]
async fn local_only_universes_are_kept() {
    let network = LocalNetwork::new();
    let a = network.spawn_node("a", fast_config());
    let b = network.spawn_node("b", fast_config());

    a.admit(key(1), leaf("gold", 10, LeafKind::Issuance)).unwrap();
    b.admit(key(2), leaf("copper", 5, LeafKind::Issuance)).unwrap();
    let before = b.query_root(&universe("copper")).unwrap();

    b.sync_universe("a", SyncMode::Full, &SyncTargets::All)
        .await
        .unwrap();

    assert_eq!(b.query_root(&universe("copper")).unwrap(), before);
    assert_eq!(b.asset_roots().len(), 2);
}

#[tokio::test]
async fn tampered_leaves_are_rejected() {
    let network = LocalNetwork::new();
    let a = network.spawn_node("a", fast_config());
    let b = network.spawn_node("b", fast_config());
    let id = universe("gold");

    a.admit(key(1), leaf("gold", 10, LeafKind::Issuance)).unwrap();
    a.admit(key(2), leaf("gold", 20, LeafKind::Issuance)).unwrap();
    network.set_tampered("a", true);

    let report = b
        .sync_universe("a", SyncMode::Full, &SyncTargets::All)
        .await
        .unwrap();

    let failure = report.failure_for(&id).unwrap();
    assert_eq!(failure.class(), ErrorClass::Verification);
    assert!(matches!(failure.error, SyncError::InvalidProof { .. }));

    // The untouched leaf still verified and stays applied.
    let diff = report.diff_for(&id).unwrap();
    assert_eq!(diff.new_leaves.len(), 1);
    assert_eq!(b.query_root(&id).unwrap().leaf_count, 1);

    network.set_tampered("a", false);
    let healed = b
        .sync_universe("a", SyncMode::Full, &SyncTargets::All)
        .await
        .unwrap();
    assert!(healed.is_complete());
    assert_eq!(b.query_root(&id), a.query_root(&id));
}

#[tokio::test]
async fn conflict_is_isolated_to_its_universe() {
    let network = LocalNetwork::new();
    let a = network.spawn_node("a", fast_config());
    let b = network.spawn_node("b", fast_config());

    a.admit(key(1), leaf("gold", 10, LeafKind::Issuance)).unwrap();
    a.admit(key(2), leaf("silver", 7, LeafKind::Issuance)).unwrap();

    let mut other = leaf("gold", 10, LeafKind::Issuance);
    other.proof = b"different proof".to_vec();
    b.admit(key(1), other).unwrap();

    let report = b
        .sync_universe("a", SyncMode::Full, &SyncTargets::All)
        .await
        .unwrap();

    let failure = report.failure_for(&universe("gold")).unwrap();
    assert_eq!(failure.class(), ErrorClass::Conflict);
    assert!(report.diff_for(&universe("gold")).is_none());

    assert!(report.diff_for(&universe("silver")).is_some());
    assert_eq!(
        b.query_root(&universe("silver")),
        a.query_root(&universe("silver"))
    );
}

#[tokio::test]
async fn unreachable_peer_fails_whole_call() {
    let network = LocalNetwork::new();
    let _a = network.spawn_node("a", fast_config());
    let b = network.spawn_node("b", fast_config());
    network.set_offline("a", true);

    let err = b
        .sync_universe("a", SyncMode::Full, &SyncTargets::All)
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Network);

    let err = b
        .sync_universe("nowhere", SyncMode::Full, &SyncTargets::All)
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Network);
}

#[tokio::test]
async fn group_universe_syncs_by_group_key() {
    let network = LocalNetwork::new();
    let a = network.spawn_node("a", fast_config());
    let b = network.spawn_node("b", fast_config());

    let mut raw = vec![0x02];
    raw.extend([0x33; 32]);
    let group = GroupKey::from_slice(&raw).unwrap();
    a.admit(key(1), grouped_leaf("series-1", group, 1)).unwrap();
    a.admit(key(2), grouped_leaf("series-2", group, 1)).unwrap();

    b.sync_universe("a", SyncMode::IssuanceOnly, &SyncTargets::All)
        .await
        .unwrap();

    let id = UniverseId::GroupKey(group);
    let queried = b.query_root(&id).unwrap();
    assert_eq!(queried.leaf_count, 2);
    assert_eq!(b.asset_roots()[&id], queried);
    assert_eq!(a.query_root(&id).unwrap(), queried);
}

#[tokio::test]
async fn extra_local_leaf_reports_root_mismatch() {
    let network = LocalNetwork::new();
    let a = network.spawn_node("a", fast_config());
    let b = network.spawn_node("b", fast_config());
    let id = universe("gold");

    a.admit(key(1), leaf("gold", 10, LeafKind::Issuance)).unwrap();
    a.admit(key(2), leaf("gold", 20, LeafKind::Issuance)).unwrap();
    b.admit(key(3), leaf("gold", 5, LeafKind::Issuance)).unwrap();

    let report = b
        .sync_universe("a", SyncMode::Full, &SyncTargets::All)
        .await
        .unwrap();

    // Every fetched leaf verified and applied, but b keeps a leaf a lacks.
    let diff = report.diff_for(&id).unwrap();
    assert_eq!(diff.new_leaves.len(), 2);
    let failure = report.failure_for(&id).unwrap();
    assert_eq!(failure.class(), ErrorClass::Verification);
    match &failure.error {
        SyncError::RootMismatch { local, remote, .. } => {
            assert_eq!(*remote, a.query_root(&id).unwrap());
            assert_eq!(*local, b.query_root(&id).unwrap());
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(b.query_root(&id).unwrap().leaf_count, 3);
}

#[tokio::test]
async fn slow_peer_hits_sync_deadline() {
    let network = LocalNetwork::new();
    let a = network.spawn_node("a", fast_config());
    let b = network.spawn_node(
        "b",
        NodeConfig {
            sync: SyncConfig {
                sync_timeout: Duration::from_millis(50),
                ..SyncConfig::default()
            },
            ..fast_config()
        },
    );
    a.admit(key(1), leaf("gold", 10, LeafKind::Issuance)).unwrap();
    b.admit(key(2), leaf("copper", 7, LeafKind::Issuance)).unwrap();
    let before = b.asset_roots();

    network.set_delay("a", Duration::from_millis(300));
    let err = b
        .sync_universe("a", SyncMode::Full, &SyncTargets::All)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Timeout(_)));
    assert_eq!(err.class(), ErrorClass::Network);
    assert_eq!(b.asset_roots(), before);

    network.set_delay("a", Duration::ZERO);
    let report = b
        .sync_universe("a", SyncMode::Full, &SyncTargets::All)
        .await
        .unwrap();
    assert!(report.is_complete());
    assert_eq!(b.query_root(&universe("gold")), a.query_root(&universe("gold")));
}

#[tokio::test]
async fn deadline_during_fetch_fails_only_that_universe() {
    let network = LocalNetwork::new();
    let a = network.spawn_node("a", fast_config());
    let b = network.spawn_node(
        "b",
        NodeConfig {
            sync: SyncConfig {
                sync_timeout: Duration::from_millis(300),
                ..SyncConfig::default()
            },
            ..fast_config()
        },
    );
    a.admit(key(1), leaf("gold", 10, LeafKind::Issuance)).unwrap();

    // Listing roots fits in the budget, listing plus fetching does not.
    network.set_delay("a", Duration::from_millis(200));
    let report = b
        .sync_universe("a", SyncMode::Full, &SyncTargets::All)
        .await
        .unwrap();

    assert!(report.diffs.is_empty());
    let failure = report.failure_for(&universe("gold")).unwrap();
    assert!(matches!(failure.error, SyncError::Timeout(_)));
    assert!(b.registry().ids().is_empty());
}

#[tokio::test]
async fn fully_rejected_universe_is_not_created() {
    let network = LocalNetwork::new();
    let a = network.spawn_node("a", fast_config());
    let b = network.spawn_node("b", fast_config());
    let id = universe("gold");

    a.admit(key(1), leaf("gold", 10, LeafKind::Issuance)).unwrap();
    network.set_tampered("a", true);

    let report = b
        .sync_universe("a", SyncMode::Full, &SyncTargets::All)
        .await
        .unwrap();

    assert!(matches!(
        report.failure_for(&id).unwrap().error,
        SyncError::InvalidProof { .. }
    ));
    assert!(report.diff_for(&id).is_none());
    assert!(b.registry().ids().is_empty());
    assert!(b.asset_roots().is_empty());
}
