//! Session pool core
//!
//! Registry of live node sessions keyed by [`Signature`], with lazy
//! get-or-create, shared access through the activity-tracking wrapper,
//! and TTL eviction of idle instances.
//!
//! ## Data flow
//!
//! ```text
//! caller ── gid ──► resolver ── descriptor ──► signature
//!                                                  │
//!                               ┌──── hit ─────────┤ registry lookup
//!                               ▼                  ▼ miss
//!                        refresh timestamp   factory build + wrap
//!                               │            spawn poller + reaper
//!                               └──────┬───────────┘
//!                                      ▼
//!                        GroupStore[gid] = signature
//!                        return TrackedClient
//! ```
//!
//! ## Thread safety
//!
//! The registry is a DashMap of per-signature slots; each slot holds a
//! `tokio::sync::OnceCell` so concurrent callers for one signature
//! observe exactly one factory build. The map shard lock is never held
//! across an await; the slot is cloned out before initialization runs.

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::client::{Activity, ClientFactory, Clock, TrackedClient, Transport};
use crate::config::PoolConfig;
use crate::node::{NodeDescriptor, NodeResolver, Signature};
use crate::poller::spawn_head_poller;
use crate::store::WatchStore;
use crate::types::{PoolError, Result};

/// Registry slot for one signature.
///
/// The cell serializes construction; the id distinguishes this slot
/// from any successor created for the same signature after eviction.
/// A failed build marks the slot dead before the registry entry is
/// removed, so callers queued on the cell retry with a fresh slot
/// instead of initializing one the registry no longer holds.
struct Slot<F: ClientFactory> {
    id: u64,
    cell: OnceCell<Arc<Instance<F>>>,
    dead: AtomicBool,
}

/// A live client/transport pair plus its activity timestamp.
///
/// Exclusively owned by the registry; the wrapper and the poller hold
/// only the shared activity cell and the closed flag.
struct Instance<F: ClientFactory> {
    signature: Signature,
    slot_id: u64,
    client: TrackedClient<F::Client>,
    transport: Arc<F::Transport>,
    activity: Arc<Activity>,
    closed: Arc<AtomicBool>,
    poller: Mutex<Option<JoinHandle<()>>>,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

/// State shared between the pool handle and its background tasks
struct Shared<F: ClientFactory> {
    registry: DashMap<Signature, Arc<Slot<F>>>,
    groups: WatchStore<String, Signature>,
    heads: Arc<WatchStore<Signature, String>>,
    config: PoolConfig,
    clock: Clock,
    closed: AtomicBool,
    slot_seq: AtomicU64,
}

impl<F: ClientFactory> Shared<F> {
    /// Tear down one instance: close the transport, drop the registry
    /// entry, signal the poller and cancel its outstanding wait.
    ///
    /// The closed flag guards the transport so `close()` runs at most
    /// once per instance, whichever of reaper or shutdown gets here
    /// first.
    fn teardown(&self, inst: &Instance<F>, reason: &str) {
        if inst.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        inst.transport.close();
        self.registry
            .remove_if(&inst.signature, |_, slot| slot.id == inst.slot_id);

        if let Some(handle) = inst.poller.lock().ok().and_then(|mut h| h.take()) {
            handle.abort();
        }

        info!(signature = %inst.signature, reason, "instance destroyed");
    }
}

/// Shared session pool for blockchain full-node connections.
///
/// Constructed once at session start and passed by reference to all
/// consumers; torn down with [`Pool::shutdown`].
pub struct Pool<R, F: ClientFactory> {
    resolver: R,
    factory: F,
    shared: Arc<Shared<F>>,
}

impl<R, F> Pool<R, F>
where
    R: NodeResolver,
    F: ClientFactory + 'static,
{
    /// Create a pool with default timing configuration
    pub fn new(resolver: R, factory: F) -> Self {
        Self::with_config(resolver, factory, PoolConfig::default())
    }

    /// Create a pool with custom timing configuration
    pub fn with_config(resolver: R, factory: F, config: PoolConfig) -> Self {
        Self {
            resolver,
            factory,
            shared: Arc::new(Shared {
                registry: DashMap::new(),
                groups: WatchStore::new(),
                heads: Arc::new(WatchStore::new()),
                config,
                clock: Clock::new(),
                closed: AtomicBool::new(false),
                slot_seq: AtomicU64::new(0),
            }),
        }
    }

    /// Get the shared client for a network group, creating the session
    /// on first use.
    ///
    /// Resolution failures and factory failures surface to this caller;
    /// a failed build leaves no registry entry behind, so the next call
    /// retries clean. Callers queued on the same in-flight build do not
    /// inherit the failure; they retry with a fresh slot.
    pub async fn get(&self, gid: &str) -> Result<TrackedClient<F::Client>> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(PoolError::Closed);
        }

        let node = self.resolver.resolve(gid)?;
        let signature = Signature::of(&node);

        let client = loop {
            let slot = {
                let entry = self
                    .shared
                    .registry
                    .entry(signature.clone())
                    .or_insert_with(|| {
                        Arc::new(Slot {
                            id: self.shared.slot_seq.fetch_add(1, Ordering::Relaxed),
                            cell: OnceCell::new(),
                            dead: AtomicBool::new(false),
                        })
                    });
                Arc::clone(entry.value())
            };

            let mut stale_slot = false;
            let init = slot
                .cell
                .get_or_try_init(|| {
                    let stale_slot = &mut stale_slot;
                    let slot = &slot;
                    let node = &node;
                    let signature = &signature;
                    async move {
                        if slot.dead.load(Ordering::SeqCst) {
                            // A failed build abandoned this slot while we
                            // queued on the cell. The error never surfaces;
                            // the stale flag routes it to a retry below.
                            *stale_slot = true;
                            return Err(PoolError::Closed);
                        }
                        match self.create_instance(node, signature, slot.id).await {
                            Ok(inst) => Ok(inst),
                            Err(e) => {
                                // Set before this future resolves, so every
                                // queued waiter observes it
                                slot.dead.store(true, Ordering::SeqCst);
                                Err(e)
                            }
                        }
                    }
                })
                .await;

            match init {
                Ok(inst) => {
                    if inst.closed.load(Ordering::SeqCst) {
                        // Lost a race with the reaper: drop the stale
                        // slot and create a fresh instance.
                        self.shared
                            .registry
                            .remove_if(&signature, |_, s| s.id == slot.id);
                        continue;
                    }
                    inst.activity.touch();
                    break inst.client.clone();
                }
                Err(e) => {
                    // A dead slot can never initialize, so removing by id
                    // alone cannot drop a live instance.
                    self.shared
                        .registry
                        .remove_if(&signature, |_, s| s.id == slot.id);
                    if stale_slot {
                        continue;
                    }
                    return Err(e);
                }
            }
        };

        self.shared.groups.publish(gid.to_string(), signature);
        Ok(client)
    }

    /// Resolve a network-group id without touching the pool
    pub fn resolve_node(&self, gid: &str) -> Result<NodeDescriptor> {
        self.resolver.resolve(gid)
    }

    /// Observable gid → signature map, written on every successful
    /// resolution
    pub fn groups(&self) -> &WatchStore<String, Signature> {
        &self.shared.groups
    }

    /// Observable signature → latest head map, written by the pollers
    pub fn heads(&self) -> &WatchStore<Signature, String> {
        &self.shared.heads
    }

    /// Number of live instances
    pub fn instance_count(&self) -> usize {
        self.shared
            .registry
            .iter()
            .filter(|e| {
                e.value()
                    .cell
                    .get()
                    .map(|inst| !inst.closed.load(Ordering::SeqCst))
                    .unwrap_or(false)
            })
            .count()
    }

    /// Whether a live instance exists for this signature
    pub fn contains(&self, signature: &Signature) -> bool {
        self.shared
            .registry
            .get(signature)
            .map(|slot| slot.cell.initialized())
            .unwrap_or(false)
    }

    /// Tear down every live instance and refuse further `get()` calls.
    ///
    /// Closes each transport exactly once and cancels all pollers and
    /// reapers; no background work survives shutdown.
    pub fn shutdown(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let slots: Vec<Arc<Slot<F>>> = self
            .shared
            .registry
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();

        for slot in slots {
            if let Some(inst) = slot.cell.get() {
                self.shared.teardown(inst, "shutdown");
                if let Some(handle) = inst.reaper.lock().ok().and_then(|mut h| h.take()) {
                    handle.abort();
                }
            }
        }

        self.shared.registry.clear();
        info!("session pool shut down");
    }

    /// Build and register a new instance: factory build, wrap, seed the
    /// head store, then start the poller and the reaper.
    async fn create_instance(
        &self,
        node: &NodeDescriptor,
        signature: &Signature,
        slot_id: u64,
    ) -> Result<Arc<Instance<F>>> {
        let (client, transport) = self.factory.build(node).await?;

        let activity = Arc::new(Activity::new(self.shared.clock.clone()));
        let transport = Arc::new(transport);
        let closed = Arc::new(AtomicBool::new(false));

        let inst = Arc::new(Instance {
            signature: signature.clone(),
            slot_id,
            client: TrackedClient::new(client, Arc::clone(&activity)),
            transport: Arc::clone(&transport),
            activity,
            closed: Arc::clone(&closed),
            poller: Mutex::new(None),
            reaper: Mutex::new(None),
        });

        info!(signature = %signature, "instance created");

        // The head store entry exists as soon as polling starts
        self.shared.heads.publish(signature.clone(), String::new());

        let poller = spawn_head_poller(
            signature.clone(),
            transport,
            closed,
            Arc::clone(&self.shared.heads),
            self.shared.config.poll_window,
        );
        if let Ok(mut slot) = inst.poller.lock() {
            *slot = Some(poller);
        }

        let reaper = spawn_reaper(Arc::clone(&self.shared), Arc::clone(&inst));
        if let Ok(mut slot) = inst.reaper.lock() {
            *slot = Some(reaper);
        }

        Ok(inst)
    }
}

/// Per-instance idle sweep.
///
/// Fires at a fixed cadence; access refreshes only the compared
/// timestamp, never the timer's phase. The task ends after evicting its
/// instance, or when the instance was torn down elsewhere.
fn spawn_reaper<F: ClientFactory + 'static>(
    shared: Arc<Shared<F>>,
    inst: Arc<Instance<F>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut sweep = tokio::time::interval(shared.config.sweep_interval);

        loop {
            sweep.tick().await;

            if inst.closed.load(Ordering::SeqCst) {
                break;
            }

            let idle = inst.activity.idle();
            if idle >= shared.config.idle_timeout {
                shared.teardown(&inst, "idle");
                break;
            }

            debug!(signature = %inst.signature, idle_ms = idle.as_millis() as u64, "idle sweep");
        }
    })
}
