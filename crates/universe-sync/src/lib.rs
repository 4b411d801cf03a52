//! Universe Sync
//!
//! Replication between universe nodes: pull reconciliation against a single
//! peer ([`Syncer`]), federation membership with asynchronous push fan-out
//! ([`FederationManager`]), and the [`UniverseNode`] that ties them to a
//! registry. Transports plug in through [`UniverseRemote`] and
//! [`RemoteConnector`]; [`testing::LocalNetwork`] is an in-process one.

pub mod config;
pub mod error;
pub mod federation;
pub mod node;
pub mod remote;
pub mod syncer;
pub mod testing;

pub use config::{FederationConfig, NodeConfig, RetryPolicy, SyncConfig};
pub use error::{ErrorClass, SyncError, SyncResult};
pub use federation::{FederationManager, FederationServer, PeerStats, PushOutcome};
pub use node::UniverseNode;
pub use remote::{RemoteConnector, UniverseLeaves, UniverseRemote};
pub use syncer::{SyncDiff, SyncFailure, SyncReport, SyncTargets, Syncer};
