use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use kite_data::StorageError;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// The lease-renewal closure armed for one kite: writes a fresh lease into
/// storage with the registration's current URL and key id.
pub type UpdateFn =
    Arc<dyn Fn() -> BoxFuture<'static, Result<(), StorageError>> + Send + Sync>;

enum Ping {
    Beat,
    /// A reconnect while supervision is live swaps in a fresh update
    /// closure so URL and key id stay current.
    Replace(UpdateFn),
}

struct Supervision {
    ping_tx: mpsc::Sender<Ping>,
    generation: u64,
}

struct SupervisorInner {
    grace: Duration,
    update_interval: Duration,
    active: Mutex<HashMap<String, Supervision>>,
    generation: AtomicU64,
    cancel: CancellationToken,
}

/// Per-kite heartbeat supervision.
///
/// Every active kite has its own task waiting on pings. Silence longer
/// than `heartbeat_interval + heartbeat_delay` ends supervision; the
/// storage entry is left to the TTL mechanism. Pings renew the storage
/// lease at most once per `update_interval`; early pings only reset the
/// silence timer.
#[derive(Clone)]
pub struct HeartbeatSupervisor {
    inner: Arc<SupervisorInner>,
}

impl HeartbeatSupervisor {
    pub fn new(
        heartbeat_interval: Duration,
        heartbeat_delay: Duration,
        update_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(SupervisorInner {
                grace: heartbeat_interval + heartbeat_delay,
                update_interval,
                active: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
                cancel,
            }),
        }
    }

    /// Begin (or refresh) supervision for a kite id.
    ///
    /// If a supervision task already runs (the kite reconnected before
    /// its silence timer fired), the existing timer is reset and the
    /// update closure replaced; the map update and the ping hand-off
    /// happen under one lock.
    pub fn arm(&self, id: &str, update: UpdateFn) {
        let mut active = self.inner.active.lock().unwrap();
        if let Some(supervision) = active.get(id) {
            let replaced = supervision.ping_tx.try_send(Ping::Replace(update.clone())).is_ok();
            if replaced {
                tracing::debug!(id, "heartbeat supervision re-armed");
                return;
            }
            // The task is already draining away; fall through and replace
            // it outright.
        }

        let (ping_tx, ping_rx) = mpsc::channel(8);
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
        active.insert(
            id.to_string(),
            Supervision {
                ping_tx,
                generation,
            },
        );
        drop(active);

        tracing::debug!(id, "heartbeat supervision armed");
        tokio::spawn(supervise(
            self.inner.clone(),
            id.to_string(),
            generation,
            ping_rx,
            update,
        ));
    }

    /// Record a ping. Returns `false` when the id is not under
    /// supervision; the caller must be told to register again.
    pub fn beat(&self, id: &str) -> bool {
        let active = self.inner.active.lock().unwrap();
        match active.get(id) {
            Some(supervision) => supervision.ping_tx.try_send(Ping::Beat).is_ok(),
            None => false,
        }
    }

    /// Whether a kite id is currently supervised.
    pub fn is_supervised(&self, id: &str) -> bool {
        self.inner.active.lock().unwrap().contains_key(id)
    }

    pub fn active_count(&self) -> usize {
        self.inner.active.lock().unwrap().len()
    }
}

async fn supervise(
    inner: Arc<SupervisorInner>,
    id: String,
    generation: u64,
    mut ping_rx: mpsc::Receiver<Ping>,
    mut update: UpdateFn,
) {
    // The arming registration just wrote a fresh lease.
    let mut last_write = Instant::now();

    loop {
        tokio::select! {
            _ = inner.cancel.cancelled() => break,
            _ = tokio::time::sleep(inner.grace) => {
                tracing::info!(id, "kite went silent, ending supervision");
                break;
            }
            ping = ping_rx.recv() => match ping {
                None => break,
                Some(Ping::Replace(fresh)) => {
                    update = fresh;
                }
                Some(Ping::Beat) => {
                    if last_write.elapsed() >= inner.update_interval {
                        match update().await {
                            Ok(()) => last_write = Instant::now(),
                            Err(err) => {
                                // Transient storage trouble: the next beat
                                // retries, the lease is still ticking.
                                tracing::warn!(id, error = %err, "lease renewal failed");
                            }
                        }
                    }
                }
            },
        }
    }

    // Remove only our own supervision record; a replacement armed while
    // we were draining must stay.
    let mut active = inner.active.lock().unwrap();
    if active
        .get(&id)
        .map(|supervision| supervision.generation == generation)
        .unwrap_or(false)
    {
        active.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_update(counter: Arc<AtomicUsize>) -> UpdateFn {
        Arc::new(move || {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    fn supervisor() -> HeartbeatSupervisor {
        HeartbeatSupervisor::new(
            Duration::from_secs(10),
            Duration::from_secs(20),
            Duration::from_secs(60),
            CancellationToken::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn silence_ends_supervision() {
        let hb = supervisor();
        hb.arm("uuid-1", counting_update(Arc::new(AtomicUsize::new(0))));
        assert!(hb.is_supervised("uuid-1"));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(!hb.is_supervised("uuid-1"));
        assert!(!hb.beat("uuid-1"), "a late ping must trigger re-registration");
    }

    #[tokio::test(start_paused = true)]
    async fn beats_reset_the_silence_timer() {
        let hb = supervisor();
        hb.arm("uuid-1", counting_update(Arc::new(AtomicUsize::new(0))));

        for _ in 0..12 {
            tokio::time::sleep(Duration::from_secs(10)).await;
            assert!(hb.beat("uuid-1"));
        }
        // Two minutes of regular pings later, still supervised.
        assert!(hb.is_supervised("uuid-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn storage_writes_are_throttled_to_the_update_interval() {
        let counter = Arc::new(AtomicUsize::new(0));
        let hb = supervisor();
        hb.arm("uuid-1", counting_update(counter.clone()));

        // Ping every 10 s for 130 s: the gate opens at 60 and 120.
        for _ in 0..13 {
            tokio::time::sleep(Duration::from_secs(10)).await;
            hb.beat("uuid-1");
            tokio::task::yield_now().await;
        }
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_swaps_the_update_closure() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let hb = supervisor();

        hb.arm("uuid-1", counting_update(first.clone()));
        hb.arm("uuid-1", counting_update(second.clone()));

        // Beat through the update gate; the write at t = 60 must go
        // through the replacement closure.
        for _ in 0..6 {
            tokio::time::sleep(Duration::from_secs(10)).await;
            hb.beat("uuid-1");
            tokio::task::yield_now().await;
        }

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_all_supervision() {
        let cancel = CancellationToken::new();
        let hb = HeartbeatSupervisor::new(
            Duration::from_secs(10),
            Duration::from_secs(20),
            Duration::from_secs(60),
            cancel.clone(),
        );
        hb.arm("a", counting_update(Arc::new(AtomicUsize::new(0))));
        hb.arm("b", counting_update(Arc::new(AtomicUsize::new(0))));
        assert_eq!(hb.active_count(), 2);

        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(hb.active_count(), 0);
    }
}
