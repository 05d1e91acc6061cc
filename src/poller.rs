//! Head poller
//!
//! One background task per live instance. Each iteration races the
//! transport's head ticker against the poll window; the winner decides
//! what lands in the head store: a real block id, or a stringified
//! wall-clock timestamp as a heartbeat. The losing branch is dropped by
//! `select!`, so no wait or timer outlives the iteration.
//!
//! Termination is cooperative: the reaper sets the instance's closed
//! flag, which the loop observes at the top. An in-flight race may
//! complete once more before the task exits; the single stray publish
//! this can leave in the head store is tolerated by dependents.
//!
//! Ticker failure is fatal to this instance's poller: the task stops
//! without retry and recovery is left to the idle sweep plus a future
//! `get()` re-creating the instance.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::client::Transport;
use crate::node::Signature;
use crate::store::WatchStore;

/// Spawn the poll loop for one instance
pub(crate) fn spawn_head_poller<T: Transport>(
    signature: Signature,
    transport: Arc<T>,
    closed: Arc<AtomicBool>,
    heads: Arc<WatchStore<Signature, String>>,
    poll_window: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(signature = %signature, "head poller started");

        loop {
            if closed.load(Ordering::SeqCst) {
                break;
            }

            tokio::select! {
                head = transport.next_head() => match head {
                    Ok(id) => heads.publish(signature.clone(), id),
                    Err(e) => {
                        warn!(signature = %signature, error = %e, "head ticker failed, stopping poller");
                        break;
                    }
                },
                _ = tokio::time::sleep(poll_window) => {
                    heads.publish(signature.clone(), heartbeat());
                }
            }
        }

        debug!(signature = %signature, "head poller stopped");
    })
}

/// Synthetic head value published when no real head arrives in time
fn heartbeat() -> String {
    Utc::now().timestamp_millis().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeDescriptor;
    use crate::types::{PoolError, Result};
    use async_trait::async_trait;
    use tokio::sync::{mpsc, Mutex};

    struct ChannelTransport {
        heads: Mutex<mpsc::UnboundedReceiver<String>>,
    }

    #[async_trait]
    impl Transport for ChannelTransport {
        async fn next_head(&self) -> Result<String> {
            let mut rx = self.heads.lock().await;
            match rx.recv().await {
                Some(head) => Ok(head),
                None => Err(PoolError::Ticker("ticker closed".to_string())),
            }
        }

        fn close(&self) {}
    }

    fn fixture() -> (
        Signature,
        mpsc::UnboundedSender<String>,
        Arc<ChannelTransport>,
        Arc<AtomicBool>,
        Arc<WatchStore<Signature, String>>,
    ) {
        let node = NodeDescriptor {
            genesis_id: "G1".to_string(),
            url: "http://node1".to_string(),
        };
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Signature::of(&node),
            tx,
            Arc::new(ChannelTransport {
                heads: Mutex::new(rx),
            }),
            Arc::new(AtomicBool::new(false)),
            Arc::new(WatchStore::new()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_real_heads() {
        let (sig, tx, transport, closed, heads) = fixture();
        let handle = spawn_head_poller(
            sig.clone(),
            transport,
            closed,
            Arc::clone(&heads),
            Duration::from_secs(30),
        );

        tx.send("0xh1".to_string()).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(heads.get(&sig), Some("0xh1".to_string()));

        tx.send("0xh2".to_string()).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(heads.get(&sig), Some("0xh2".to_string()));

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_when_no_head_in_window() {
        let (sig, _tx, transport, closed, heads) = fixture();
        let handle = spawn_head_poller(
            sig.clone(),
            transport,
            closed,
            Arc::clone(&heads),
            Duration::from_secs(30),
        );

        tokio::time::sleep(Duration::from_secs(31)).await;
        let beat = heads.get(&sig).expect("heartbeat published");
        assert!(beat.parse::<i64>().is_ok(), "heartbeat is a millis stamp: {beat}");

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_flag_terminates_loop() {
        let (sig, _tx, transport, closed, heads) = fixture();
        let handle = spawn_head_poller(
            sig.clone(),
            transport,
            Arc::clone(&closed),
            heads,
            Duration::from_secs(30),
        );

        closed.store(true, Ordering::SeqCst);
        // The in-flight race completes at the window edge, then the flag
        // is observed at loop top.
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(handle.is_finished());
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_error_is_fatal_to_the_poller() {
        let (sig, tx, transport, closed, heads) = fixture();
        let handle = spawn_head_poller(
            sig.clone(),
            transport,
            closed,
            Arc::clone(&heads),
            Duration::from_secs(30),
        );

        drop(tx);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(handle.is_finished());

        // No heartbeats after termination
        let before = heads.get(&sig);
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(heads.get(&sig), before);
    }
}
