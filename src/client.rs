//! Client/transport seams and the activity-tracking wrapper
//!
//! The pool manages opaque client/transport pairs built by an external
//! [`ClientFactory`]. Callers never see the raw client: [`Pool::get`]
//! (crate::Pool::get) hands out a [`TrackedClient`] that forwards every
//! call unchanged after refreshing the owning instance's last-access
//! timestamp. The wrapper is a pure side channel, never an error boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::node::NodeDescriptor;
use crate::types::Result;

/// Reference to a block on a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    /// Block id
    pub id: String,
    /// Block number
    pub number: u64,
    /// Parent block id
    pub parent_id: String,
    /// Block timestamp (unix seconds)
    pub timestamp: u64,
}

/// Query surface of a blockchain client.
///
/// The concrete operations are irrelevant to pool logic; the pool only
/// needs a statically known surface so the activity wrapper can forward
/// each call after touching the timestamp.
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    /// Fetch the current best block
    async fn best_block(&self) -> Result<BlockRef>;

    /// Fetch a block by id, `None` if the node does not know it
    async fn block(&self, id: &str) -> Result<Option<BlockRef>>;
}

/// Connection transport paired with a client.
///
/// Exposes the head-ticker capability the poller drives, plus teardown.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Suspend until the node reports a new head block, returning its id
    async fn next_head(&self) -> Result<String>;

    /// Close the underlying connection. Idempotence is not required;
    /// the pool guarantees at most one call per transport.
    fn close(&self);
}

/// Builds a client/transport pair from a node descriptor.
///
/// Implemented by the embedding application. A failed build surfaces to
/// the caller that triggered it and leaves nothing registered.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    type Client: ChainClient;
    type Transport: Transport;

    async fn build(&self, node: &NodeDescriptor) -> Result<(Self::Client, Self::Transport)>;
}

/// Factories can be shared: the pool takes ownership of its factory,
/// while the application keeps its own handle.
#[async_trait]
impl<F: ClientFactory> ClientFactory for Arc<F> {
    type Client = F::Client;
    type Transport = F::Transport;

    async fn build(&self, node: &NodeDescriptor) -> Result<(Self::Client, Self::Transport)> {
        (**self).build(node).await
    }
}

/// Pool-local monotonic clock.
///
/// Milliseconds since pool construction, measured on `tokio::time` so
/// paused-time tests drive eviction deterministically.
#[derive(Debug, Clone)]
pub(crate) struct Clock {
    epoch: tokio::time::Instant,
}

impl Clock {
    pub(crate) fn new() -> Self {
        Self {
            epoch: tokio::time::Instant::now(),
        }
    }

    pub(crate) fn now_millis(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

/// Shared last-access cell for one pooled instance.
///
/// Touched by `get()` and by every wrapped client call; read by the
/// idle reaper. Plain atomics, no lock.
#[derive(Debug)]
pub struct Activity {
    clock: Clock,
    last_access: AtomicU64,
}

impl Activity {
    pub(crate) fn new(clock: Clock) -> Self {
        let now = clock.now_millis();
        Self {
            clock,
            last_access: AtomicU64::new(now),
        }
    }

    /// Record an access now
    pub fn touch(&self) {
        self.last_access
            .store(self.clock.now_millis(), Ordering::Relaxed);
    }

    /// Time since the last recorded access
    pub fn idle(&self) -> Duration {
        let idle = self
            .clock
            .now_millis()
            .saturating_sub(self.last_access.load(Ordering::Relaxed));
        Duration::from_millis(idle)
    }
}

/// Activity-tracking wrapper around a [`ChainClient`].
///
/// Implements the same call surface as the wrapped client; each call
/// first refreshes the shared activity cell, then forwards unchanged.
pub struct TrackedClient<C> {
    inner: Arc<C>,
    activity: Arc<Activity>,
}

impl<C> TrackedClient<C> {
    pub(crate) fn new(inner: C, activity: Arc<Activity>) -> Self {
        Self {
            inner: Arc::new(inner),
            activity,
        }
    }
}

impl<C> Clone for TrackedClient<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            activity: Arc::clone(&self.activity),
        }
    }
}

#[async_trait]
impl<C: ChainClient> ChainClient for TrackedClient<C> {
    async fn best_block(&self) -> Result<BlockRef> {
        self.activity.touch();
        self.inner.best_block().await
    }

    async fn block(&self, id: &str) -> Result<Option<BlockRef>> {
        self.activity.touch();
        self.inner.block(id).await
    }
}
