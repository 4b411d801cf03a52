#![allow(dead_code)]

use std::time::Duration;
use universe_core::{
    AssetGenesis, AssetType, GroupKey, LeafKey, LeafKind, OutPoint, UniverseId, UniverseLeaf,
};
use universe_sync::{FederationConfig, NodeConfig, RetryPolicy, UniverseNode};

pub fn genesis(tag: &str) -> AssetGenesis {
    AssetGenesis {
        first_prev_out: OutPoint::new([0x42; 32], 1),
        tag: tag.to_string(),
        meta_hash: [0u8; 32],
        output_index: 0,
        asset_type: AssetType::Normal,
    }
}

pub fn universe(tag: &str) -> UniverseId {
    UniverseId::AssetId(genesis(tag).asset_id())
}

pub fn key(n: u8) -> LeafKey {
    LeafKey::new(OutPoint::new([n; 32], n as u32), [n.wrapping_add(100); 32])
}

pub fn leaf(tag: &str, amount: u64, kind: LeafKind) -> UniverseLeaf {
    UniverseLeaf {
        genesis: genesis(tag),
        group_key: None,
        amount,
        kind,
        proof: format!("{}:{}", tag, amount).into_bytes(),
    }
}

pub fn grouped_leaf(tag: &str, group: GroupKey, amount: u64) -> UniverseLeaf {
    UniverseLeaf {
        group_key: Some(group),
        ..leaf(tag, amount, LeafKind::Issuance)
    }
}

/// Short retry delays so failure paths finish quickly.
pub fn fast_config() -> NodeConfig {
    NodeConfig {
        federation: FederationConfig {
            retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(10),
                max_backoff: Duration::from_millis(40),
                multiplier: 2,
                push_timeout: Duration::from_secs(2),
            },
            sync_on_add: false,
            ..FederationConfig::default()
        },
        ..NodeConfig::default()
    }
}

/// Poll `check` until it holds or five seconds pass.
pub async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..500 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

pub fn same_root(a: &UniverseNode, b: &UniverseNode, id: &UniverseId) -> bool {
    match (a.query_root(id), b.query_root(id)) {
        (Ok(x), Ok(y)) => x == y,
        _ => false,
    }
}
