//! chain-pool - shared session pool for blockchain full-node connections
//!
//! Lazily creates client sessions keyed by network identity
//! (`genesis_id@url`), shares them across callers, polls each live
//! session in the background for new head blocks, and evicts sessions
//! that sit idle past a threshold.
//!
//! ```text
//! gid ──► NodeResolver ──► NodeDescriptor ──► Signature ──► registry
//!                                                              │
//!                              miss: ClientFactory build       │
//!                              + poller + reaper               │
//!                                                              ▼
//!                                 TrackedClient (activity-tracking wrapper)
//! ```
//!
//! Dependents observe the pool through two keyed stores with per-key
//! change notification: gid → signature ([`Pool::groups`]) and
//! signature → latest head or heartbeat ([`Pool::heads`]).
//!
//! The pool owns no blockchain protocol logic. Resolution and
//! client/transport construction are supplied by the embedding
//! application via [`NodeResolver`] and [`ClientFactory`].

pub mod client;
pub mod config;
pub mod node;
pub mod pool;
pub mod store;
pub mod types;

mod poller;

pub use client::{BlockRef, ChainClient, ClientFactory, TrackedClient, Transport};
pub use config::PoolConfig;
pub use node::{NodeDescriptor, NodeResolver, Signature};
pub use pool::Pool;
pub use store::WatchStore;
pub use types::{PoolError, Result};
