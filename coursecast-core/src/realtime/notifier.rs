//! Per-user direct notification routing
//!
//! Maps a user id to at most one live connection. Delivery is best-effort:
//! a notification for an unbound user is dropped, not queued. Callers that
//! need durability persist the notification themselves before calling
//! `notify`.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::events::ChannelEvent;
use crate::models::{ConnectionId, UserId};

/// The single live connection bound for a user.
struct Binding {
    connection_id: ConnectionId,
    sender: mpsc::UnboundedSender<ChannelEvent>,
}

/// Routes direct notifications to the user's bound connection.
#[derive(Clone)]
pub struct UserNotificationRouter {
    bindings: Arc<DashMap<UserId, Binding>>,
}

impl UserNotificationRouter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bindings: Arc::new(DashMap::new()),
        }
    }

    /// Record the live connection for a user, superseding any previous
    /// binding. The superseded connection is not closed by this call.
    pub fn bind(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
        sender: mpsc::UnboundedSender<ChannelEvent>,
    ) {
        let previous = self.bindings.insert(
            user_id.clone(),
            Binding {
                connection_id: connection_id.clone(),
                sender,
            },
        );

        if let Some(old) = previous {
            debug!(
                user_id = %user_id,
                superseded = %old.connection_id,
                connection_id = %connection_id,
                "Notification binding superseded"
            );
        } else {
            info!(
                user_id = %user_id,
                connection_id = %connection_id,
                "Notification binding established"
            );
        }
    }

    /// Remove the binding only if it still refers to the given connection.
    ///
    /// Guards against a stale close erasing a newer binding when close and
    /// re-open race out of order. Returns whether a binding was removed.
    pub fn unbind(&self, user_id: &UserId, connection_id: &ConnectionId) -> bool {
        let removed = self
            .bindings
            .remove_if(user_id, |_, binding| {
                binding.connection_id == *connection_id
            })
            .is_some();

        if removed {
            info!(
                user_id = %user_id,
                connection_id = %connection_id,
                "Notification binding removed"
            );
        }

        removed
    }

    /// Deliver a payload to the user's bound connection, if any.
    ///
    /// Silently drops the notification when no live binding exists. A send
    /// failure drops the binding. Returns whether the payload was handed to
    /// a live connection.
    pub fn notify(&self, user_id: &UserId, payload: serde_json::Value) -> bool {
        let Some(binding) = self.bindings.get(user_id) else {
            trace!(user_id = %user_id, "No notification binding, dropping payload");
            return false;
        };

        let connection_id = binding.connection_id.clone();
        let delivered = binding
            .sender
            .send(ChannelEvent::Notification { payload })
            .is_ok();
        drop(binding); // release the map guard before any removal

        if delivered {
            debug!(
                user_id = %user_id,
                connection_id = %connection_id,
                "Notification delivered"
            );
        } else {
            warn!(
                user_id = %user_id,
                connection_id = %connection_id,
                "Notification send failed, dropping binding"
            );
            self.unbind(user_id, &connection_id);
        }

        delivered
    }

    /// Whether a user currently has a live binding.
    #[must_use]
    pub fn is_bound(&self, user_id: &UserId) -> bool {
        self.bindings.contains_key(user_id)
    }

    /// Number of live bindings.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }
}

impl Default for UserNotificationRouter {
    fn default() -> Self {
        Self::new()
    }
}
