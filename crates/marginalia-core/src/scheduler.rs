//! Per-session cancellable auto-close timers.
//!
//! Each session has at most one armed timer. Arming replaces (and cancels)
//! the previous one. When a timer fires, live conditions are re-checked
//! through [`AutoCloseTarget`] before anything is closed; a suppressed timer
//! is simply dropped and is not re-armed.

use crate::session::SessionId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// The owner of the sessions a scheduler closes.
#[async_trait]
pub trait AutoCloseTarget: Send + Sync {
    /// Fire-time check scoped to `id`: pinned, hovered, or mid-gesture.
    async fn is_close_suppressed(&self, id: &SessionId) -> bool;

    /// Closes the session. Only called when not suppressed.
    async fn auto_close(&self, id: &SessionId);
}

#[derive(Debug)]
struct TimerSlot {
    generation: u64,
    token: CancellationToken,
}

#[derive(Debug, Clone, Default)]
pub struct AutoCloseScheduler {
    slots: Arc<Mutex<HashMap<SessionId, TimerSlot>>>,
    generation: Arc<AtomicU64>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AutoCloseScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the timer for `id`, replacing any outstanding one.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self, id: SessionId, delay: Duration, target: Weak<dyn AutoCloseTarget>) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancellationToken::new();

        if let Some(previous) = lock(&self.slots).insert(
            id.clone(),
            TimerSlot {
                generation,
                token: token.clone(),
            },
        ) {
            previous.token.cancel();
        }
        tracing::trace!("[AutoClose] Armed {} ({:?})", id, delay);

        let slots = Arc::clone(&self.slots);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            let still_current = {
                let mut slots = lock(&slots);
                match slots.get(&id) {
                    Some(slot) if slot.generation == generation => {
                        slots.remove(&id);
                        true
                    }
                    _ => false,
                }
            };
            if !still_current {
                return;
            }

            let Some(target) = target.upgrade() else {
                return;
            };
            if target.is_close_suppressed(&id).await {
                tracing::debug!("[AutoClose] Suppressed close of {}", id);
                return;
            }
            tracing::debug!("[AutoClose] Closing {}", id);
            target.auto_close(&id).await;
        });
    }

    /// Disarms the timer for `id`. Returns whether one was armed.
    pub fn cancel(&self, id: &SessionId) -> bool {
        match lock(&self.slots).remove(id) {
            Some(slot) => {
                slot.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Disarms every timer.
    pub fn cancel_all(&self) {
        for (_, slot) in lock(&self.slots).drain() {
            slot.token.cancel();
        }
    }

    pub fn is_armed(&self, id: &SessionId) -> bool {
        lock(&self.slots).contains_key(id)
    }

    /// Number of live timers across all sessions.
    pub fn armed_count(&self) -> usize {
        lock(&self.slots).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[derive(Default)]
    struct RecordingTarget {
        suppressed: AtomicBool,
        closed: Mutex<Vec<SessionId>>,
    }

    #[async_trait]
    impl AutoCloseTarget for RecordingTarget {
        async fn is_close_suppressed(&self, _id: &SessionId) -> bool {
            self.suppressed.load(Ordering::SeqCst)
        }

        async fn auto_close(&self, id: &SessionId) {
            self.closed.lock().unwrap().push(id.clone());
        }
    }

    fn weak(target: &Arc<RecordingTarget>) -> Weak<dyn AutoCloseTarget> {
        let target: Arc<dyn AutoCloseTarget> = target.clone();
        Arc::downgrade(&target)
    }

    const DELAY: Duration = Duration::from_millis(800);

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let scheduler = AutoCloseScheduler::new();
        let target = Arc::new(RecordingTarget::default());
        let id = SessionId::from("s1");

        scheduler.schedule(id.clone(), DELAY, weak(&target));
        assert!(scheduler.is_armed(&id));

        tokio::time::sleep(DELAY + Duration::from_millis(1)).await;
        assert_eq!(*target.closed.lock().unwrap(), vec![id.clone()]);
        assert!(!scheduler.is_armed(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rescheduling_keeps_single_timer() {
        let scheduler = AutoCloseScheduler::new();
        let target = Arc::new(RecordingTarget::default());
        let id = SessionId::from("s1");

        for _ in 0..4 {
            scheduler.schedule(id.clone(), DELAY, weak(&target));
            assert_eq!(scheduler.armed_count(), 1);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(target.closed.lock().unwrap().len(), 1);
        assert_eq!(scheduler.armed_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_close() {
        let scheduler = AutoCloseScheduler::new();
        let target = Arc::new(RecordingTarget::default());
        let id = SessionId::from("s1");

        scheduler.schedule(id.clone(), DELAY, weak(&target));
        assert!(scheduler.cancel(&id));
        assert!(!scheduler.cancel(&id));

        tokio::time::sleep(DELAY * 2).await;
        assert!(target.closed.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_suppressed_at_fire_time_is_not_rearmed() {
        let scheduler = AutoCloseScheduler::new();
        let target = Arc::new(RecordingTarget::default());
        let id = SessionId::from("s1");

        scheduler.schedule(id.clone(), DELAY, weak(&target));
        // Pointer entered during the delay window
        target.suppressed.store(true, Ordering::SeqCst);

        tokio::time::sleep(DELAY * 2).await;
        assert!(target.closed.lock().unwrap().is_empty());
        assert!(!scheduler.is_armed(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timers_are_scoped_per_session() {
        let scheduler = AutoCloseScheduler::new();
        let target = Arc::new(RecordingTarget::default());
        let a = SessionId::from("a");
        let b = SessionId::from("b");

        scheduler.schedule(a.clone(), DELAY, weak(&target));
        scheduler.schedule(b.clone(), DELAY * 2, weak(&target));
        scheduler.cancel(&a);
        assert_eq!(scheduler.armed_count(), 1);

        tokio::time::sleep(DELAY * 3).await;
        assert_eq!(*target.closed.lock().unwrap(), vec![b]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all() {
        let scheduler = AutoCloseScheduler::new();
        let target = Arc::new(RecordingTarget::default());
        scheduler.schedule(SessionId::from("a"), DELAY, weak(&target));
        scheduler.schedule(SessionId::from("b"), DELAY, weak(&target));

        scheduler.cancel_all();
        assert_eq!(scheduler.armed_count(), 0);
        tokio::time::sleep(DELAY * 2).await;
        assert!(target.closed.lock().unwrap().is_empty());
    }
}
