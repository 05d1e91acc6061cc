//! Node descriptors and network identity
//!
//! A node descriptor pairs a chain genesis id with an endpoint URL. Two
//! descriptors with the same genesis and URL denote the same remote node,
//! so they collapse to one pooled instance via [`Signature`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::Result;

/// Description of a remote full node, produced by a [`NodeResolver`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Genesis block id identifying the chain
    pub genesis_id: String,
    /// Endpoint URL of the full node
    pub url: String,
}

/// Deterministic key for a unique (chain genesis, endpoint) pair.
///
/// Equal descriptors collapse to one signature, and therefore to one
/// pooled instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature(String);

impl Signature {
    /// Compute the signature of a node descriptor: `genesis_id@url`
    pub fn of(node: &NodeDescriptor) -> Self {
        Self(format!("{}@{}", node.genesis_id, node.url))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps a logical network-group id to a node descriptor.
///
/// Implemented by the embedding application; the pool never retries a
/// failed resolution.
pub trait NodeResolver: Send + Sync {
    /// Resolve a network-group id, failing with
    /// [`PoolError::UnknownNetwork`](crate::PoolError::UnknownNetwork)
    /// for unknown gids.
    fn resolve(&self, gid: &str) -> Result<NodeDescriptor>;
}
