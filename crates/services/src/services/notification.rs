//! Transient user-facing notifications with auto-dismiss timers.

use std::{
    collections::HashMap,
    sync::{Arc, Weak},
    time::Duration,
};

use domain::models::notification::{DEFAULT_NOTIFICATION_MS, Notification, NotificationKind};
use parking_lot::Mutex;
use tokio::{runtime::Handle, sync::watch, task::AbortHandle};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Default)]
struct State {
    entries: Vec<Notification>,
    timers: HashMap<Uuid, AbortHandle>,
}

struct Inner {
    state: Mutex<State>,
    changes: watch::Sender<Arc<Vec<Notification>>>,
    default_duration_ms: u64,
}

impl Inner {
    fn publish(&self, state: &State) {
        self.changes.send_replace(Arc::new(state.entries.clone()));
    }

    fn expire(&self, id: Uuid) {
        let mut state = self.state.lock();
        state.timers.remove(&id);
        let before = state.entries.len();
        state.entries.retain(|n| n.id != id);
        if state.entries.len() != before {
            debug!(notification_id = %id, "Notification expired");
            self.publish(&state);
        }
    }
}

/// Cloneable handle; all clones share the same list.
#[derive(Clone)]
pub struct NotificationService {
    inner: Arc<Inner>,
}

impl Default for NotificationService {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFICATION_MS)
    }
}

impl NotificationService {
    pub fn new(default_duration_ms: u64) -> Self {
        let (changes, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                changes,
                default_duration_ms,
            }),
        }
    }

    /// Add a notification and schedule its removal.
    ///
    /// `duration_ms` defaults to the service default; `Some(0)` keeps the
    /// notification until [`dismiss`](Self::dismiss) is called. Outside a
    /// tokio runtime no timer can be scheduled and the entry persists.
    pub fn emit(
        &self,
        kind: NotificationKind,
        message: impl Into<String>,
        title: Option<String>,
        duration_ms: Option<u64>,
    ) -> Uuid {
        let duration_ms = duration_ms.unwrap_or(self.inner.default_duration_ms);
        let notification = Notification::new(kind, message, title, duration_ms);
        let id = notification.id;

        let mut state = self.inner.state.lock();
        debug!(notification_id = %id, kind = %kind, duration_ms, "Notification emitted");
        state.entries.push(notification);

        if duration_ms > 0 {
            match Handle::try_current() {
                Ok(handle) => {
                    let weak: Weak<Inner> = Arc::downgrade(&self.inner);
                    let task = handle.spawn(async move {
                        tokio::time::sleep(Duration::from_millis(duration_ms)).await;
                        if let Some(inner) = weak.upgrade() {
                            inner.expire(id);
                        }
                    });
                    state.timers.insert(id, task.abort_handle());
                }
                Err(_) => {
                    warn!(notification_id = %id, "No runtime available, notification will not auto-dismiss");
                }
            }
        }

        self.inner.publish(&state);
        id
    }

    pub fn success(&self, message: impl Into<String>) -> Uuid {
        self.emit(NotificationKind::Success, message, None, None)
    }

    pub fn error(&self, message: impl Into<String>) -> Uuid {
        self.emit(NotificationKind::Error, message, None, None)
    }

    pub fn warning(&self, message: impl Into<String>) -> Uuid {
        self.emit(NotificationKind::Warning, message, None, None)
    }

    pub fn info(&self, message: impl Into<String>) -> Uuid {
        self.emit(NotificationKind::Info, message, None, None)
    }

    /// Remove a notification now and cancel its timer. Returns false if it was already gone.
    pub fn dismiss(&self, id: Uuid) -> bool {
        let mut state = self.inner.state.lock();
        if let Some(timer) = state.timers.remove(&id) {
            timer.abort();
        }
        let before = state.entries.len();
        state.entries.retain(|n| n.id != id);
        let removed = state.entries.len() != before;
        if removed {
            debug!(notification_id = %id, "Notification dismissed");
            self.inner.publish(&state);
        }
        removed
    }

    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        for (_, timer) in state.timers.drain() {
            timer.abort();
        }
        state.entries.clear();
        self.inner.publish(&state);
    }

    pub fn list(&self) -> Vec<Notification> {
        self.inner.state.lock().entries.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Notification>>> {
        self.inner.changes.subscribe()
    }

    pub fn pending_timers(&self) -> usize {
        self.inner.state.lock().timers.len()
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::sleep;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_notification_expires_after_duration() {
        let service = NotificationService::default();
        service.emit(NotificationKind::Success, "Technicien assigné", None, None);
        assert_eq!(service.list().len(), 1);

        sleep(Duration::from_millis(4_999)).await;
        assert_eq!(service.list().len(), 1);

        sleep(Duration::from_millis(2)).await;
        assert!(service.list().is_empty());
        assert_eq!(service.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_cancels_pending_timer() {
        let service = NotificationService::default();
        let id = service.emit(NotificationKind::Info, "deleted", None, None);

        sleep(Duration::from_millis(100)).await;
        assert!(service.dismiss(id));
        assert!(service.list().is_empty());
        assert_eq!(service.pending_timers(), 0);

        let rx = service.subscribe();
        sleep(Duration::from_secs(10)).await;
        assert!(!rx.has_changed().unwrap());
        assert!(service.list().is_empty());
        assert!(!service.dismiss(id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_duration_persists() {
        let service = NotificationService::default();
        let id = service.emit(
            NotificationKind::Warning,
            "Connexion perdue",
            Some("Réseau".to_string()),
            Some(0),
        );
        assert_eq!(service.pending_timers(), 0);

        sleep(Duration::from_secs(60)).await;
        let list = service.list();
        assert_eq!(list.len(), 1);
        assert!(list[0].is_persistent());
        assert_eq!(list[0].title.as_deref(), Some("Réseau"));

        service.dismiss(id);
        assert!(service.list().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_only_removes_its_own_entry() {
        let service = NotificationService::new(1_000);
        service.info("first");
        sleep(Duration::from_millis(500)).await;
        service.emit(NotificationKind::Error, "second", None, None);

        sleep(Duration::from_millis(600)).await;
        let remaining: Vec<_> = service.list().into_iter().map(|n| n.message).collect();
        assert_eq!(remaining, vec!["second".to_string()]);
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let service = NotificationService::default();
        let mut rx = service.subscribe();
        service.error("Échec de la suppression");
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().len(), 1);

        service.clear();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_empty());
        assert_eq!(service.pending_timers(), 0);
    }

    #[test]
    fn test_emit_outside_runtime_keeps_entry() {
        let service = NotificationService::default();
        service.success("ok");
        assert_eq!(service.list().len(), 1);
        assert_eq!(service.pending_timers(), 0);
    }
}
