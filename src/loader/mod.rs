/// Three-state data loading with stale-result suppression
use crate::errors::ApiResult;
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, error};

/// Result of the most recent load, as a view renders it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum LoadState<T> {
    Pending,
    Failed(String),
    Ready(T),
}

impl<T> LoadState<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, LoadState::Pending)
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            LoadState::Ready(v) => Some(v),
            _ => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> LoadState<U> {
        match self {
            LoadState::Pending => LoadState::Pending,
            LoadState::Failed(msg) => LoadState::Failed(msg),
            LoadState::Ready(v) => LoadState::Ready(f(v)),
        }
    }
}

#[derive(Debug, Clone)]
struct Slot<T> {
    generation: u64,
    state: LoadState<T>,
}

/// Holds one view's load state.
///
/// Every `begin` stamps a new generation; `commit` only lands when its
/// generation is still the latest, so a slow superseded request can never
/// overwrite fresher state. `load` also aborts the superseded task.
pub struct Loader<T> {
    label: &'static str,
    failure_message: &'static str,
    slot: watch::Sender<Slot<T>>,
    in_flight: Mutex<Option<AbortHandle>>,
}

impl<T> Loader<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(label: &'static str, failure_message: &'static str) -> Self {
        let (slot, _) = watch::channel(Slot {
            generation: 0,
            state: LoadState::Pending,
        });
        Self {
            label,
            failure_message,
            slot,
            in_flight: Mutex::new(None),
        }
    }

    /// Start a new generation and switch to `Pending`
    pub fn begin(&self) -> u64 {
        let mut generation = 0;
        self.slot.send_modify(|slot| {
            slot.generation += 1;
            slot.state = LoadState::Pending;
            generation = slot.generation;
        });
        generation
    }

    /// Apply a finished load; returns false when the result was stale
    pub fn commit(&self, generation: u64, result: ApiResult<T>) -> bool {
        let state = match result {
            Ok(value) => LoadState::Ready(value),
            Err(e) => {
                error!("{} load failed (generation {}): {}", self.label, generation, e);
                LoadState::Failed(self.failure_message.to_string())
            }
        };

        let applied = self.slot.send_if_modified(|slot| {
            if slot.generation != generation {
                return false;
            }
            slot.state = state;
            true
        });

        if !applied {
            debug!(
                "{} dropped stale result of generation {} (current {})",
                self.label,
                generation,
                self.generation()
            );
        }
        applied
    }

    /// Run `fut` as the newest generation, cancelling the previous one
    pub fn load<F>(self: &Arc<Self>, fut: F) -> u64
    where
        F: Future<Output = ApiResult<T>> + Send + 'static,
    {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());

        let generation = self.begin();
        let loader = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let result = fut.await;
            loader.commit(generation, result);
        });

        if let Some(previous) = in_flight.replace(handle.abort_handle()) {
            previous.abort();
        }
        generation
    }

    pub fn snapshot(&self) -> LoadState<T> {
        self.slot.borrow().state.clone()
    }

    /// State together with the generation that produced it
    pub fn snapshot_with_generation(&self) -> (u64, LoadState<T>) {
        let slot = self.slot.borrow();
        (slot.generation, slot.state.clone())
    }

    pub fn generation(&self) -> u64 {
        self.slot.borrow().generation
    }

    /// Nothing has been requested yet
    pub fn is_idle(&self) -> bool {
        self.generation() == 0
    }

    /// Wait until the current generation leaves `Pending`
    pub async fn settled(&self) -> LoadState<T> {
        let mut rx = self.slot.subscribe();
        let settled = match rx.wait_for(|slot| !slot.state.is_pending()).await {
            Ok(slot) => slot.state.clone(),
            Err(_) => LoadState::Pending,
        };
        settled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ApiError;
    use std::time::Duration;
    use tokio::sync::oneshot;

    const FAILED: &str = "Failed to fetch test data. Please try again later.";

    fn loader() -> Arc<Loader<u32>> {
        Arc::new(Loader::new("test", FAILED))
    }

    #[test]
    fn test_begin_switches_to_pending() {
        let l = loader();
        assert!(l.is_idle());
        let g = l.begin();
        assert!(l.commit(g, Ok(1)));
        assert_eq!(l.snapshot(), LoadState::Ready(1));

        let g2 = l.begin();
        assert_eq!(g2, g + 1);
        assert_eq!(l.snapshot(), LoadState::Pending);
    }

    #[test]
    fn test_stale_commit_is_dropped() {
        let l = loader();
        let old = l.begin();
        let new = l.begin();

        assert!(l.commit(new, Ok(2)));
        assert!(!l.commit(old, Ok(1)));
        assert_eq!(l.snapshot(), LoadState::Ready(2));
    }

    #[test]
    fn test_stale_commit_does_not_resolve_pending() {
        let l = loader();
        let old = l.begin();
        let _new = l.begin();

        assert!(!l.commit(old, Ok(1)));
        assert_eq!(l.snapshot(), LoadState::Pending);
    }

    #[test]
    fn test_failure_uses_fixed_message() {
        let l = loader();
        let g = l.begin();
        l.commit(g, Err(ApiError::NotFound("socket closed: secret detail".into())));
        assert_eq!(l.snapshot(), LoadState::Failed(FAILED.to_string()));
    }

    #[tokio::test]
    async fn test_load_resolves_ready() {
        let l = loader();
        l.load(async { Ok(5) });
        assert_eq!(l.settled().await, LoadState::Ready(5));
    }

    #[tokio::test]
    async fn test_late_superseded_load_cannot_overwrite() {
        let l = loader();
        let (release_old, old_gate) = oneshot::channel::<()>();

        l.load(async move {
            let _ = old_gate.await;
            Ok(1)
        });
        l.load(async { Ok(2) });
        assert_eq!(l.settled().await, LoadState::Ready(2));

        let _ = release_old.send(());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(l.snapshot(), LoadState::Ready(2));
    }

    #[tokio::test]
    async fn test_superseded_task_is_aborted() {
        let l = loader();
        let (tx, rx) = oneshot::channel::<()>();

        l.load(async move {
            // Dropping `tx` on abort closes the channel.
            let _guard = tx;
            futures::future::pending::<()>().await;
            Ok(1)
        });
        l.load(async { Ok(2) });

        let closed = tokio::time::timeout(Duration::from_secs(1), rx).await;
        assert!(matches!(closed, Ok(Err(_))));
    }

    #[test]
    fn test_state_serialization() {
        let ready = serde_json::to_value(LoadState::Ready(3)).unwrap();
        assert_eq!(ready, serde_json::json!({"status": "ready", "data": 3}));

        let pending = serde_json::to_value(LoadState::<u32>::Pending).unwrap();
        assert_eq!(pending, serde_json::json!({"status": "pending"}));

        let failed = serde_json::to_value(LoadState::<u32>::Failed("x".into())).unwrap();
        assert_eq!(failed, serde_json::json!({"status": "failed", "data": "x"}));
    }
}
