/// In-process registry of live notification sessions.
///
/// Each connected WebSocket joins exactly one group keyed by its own
/// user id. Delivery is at-most-once per session and fire-and-forget:
/// a full buffer or a closed session drops the event, the persisted
/// row remains queryable.
use crate::db::models::Notification;
use dashmap::DashMap;
use std::collections::HashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Per-session event buffer before slow consumers start dropping
const SESSION_BUFFER: usize = 16;

#[derive(Default)]
pub struct NotificationHub {
    groups: DashMap<i64, HashMap<Uuid, mpsc::Sender<Notification>>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self {
            groups: DashMap::new(),
        }
    }

    /// Register a session in the group for `user_id`.
    pub fn join(&self, user_id: i64) -> (Uuid, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(SESSION_BUFFER);
        let session_id = Uuid::new_v4();

        self.groups
            .entry(user_id)
            .or_default()
            .insert(session_id, tx);

        tracing::debug!(user_id, %session_id, "notification session joined");
        (session_id, rx)
    }

    /// Remove a session, dropping the group once it empties.
    pub fn leave(&self, user_id: i64, session_id: &Uuid) {
        if let Some(mut group) = self.groups.get_mut(&user_id) {
            group.remove(session_id);
            drop(group);
            self.groups.remove_if(&user_id, |_, g| g.is_empty());
        }

        tracing::debug!(user_id, %session_id, "notification session left");
    }

    /// Push an event to every live session in the group.
    ///
    /// Returns how many sessions accepted it. Sessions with a full
    /// buffer are skipped, not awaited.
    pub fn send(&self, user_id: i64, notification: &Notification) -> usize {
        let Some(group) = self.groups.get(&user_id) else {
            return 0;
        };

        let mut delivered = 0;
        for (session_id, tx) in group.iter() {
            match tx.try_send(notification.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        user_id,
                        %session_id,
                        "notification buffer full, dropping event"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }

        delivered
    }

    /// Total live sessions across all groups
    pub fn connection_count(&self) -> usize {
        self.groups.iter().map(|group| group.len()).sum()
    }
}
