//! Live connection registry
//!
//! Accepts classified connections, enforces capacity limits, and routes
//! each one into the course channel hub or the user notification router.
//! Owns connection lifecycle state; `on_close` is the single teardown path
//! and is idempotent.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::channel::{CourseChannelHub, SubscriptionKind};
use super::events::ChannelEvent;
use super::intent::ConnectionIntent;
use super::notifier::UserNotificationRouter;
use super::presence::PresenceTracker;
use crate::models::{ConnectionId, UserId};
use crate::{Error, Result};

/// Lifecycle state of a registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closing,
    Closed,
}

/// Everything the transport layer hands over when a connection is accepted.
pub struct ConnectionHandle {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub sender: mpsc::UnboundedSender<ChannelEvent>,
}

/// Registered connection bookkeeping.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub intent: ConnectionIntent,
    pub state: ConnectionState,
    pub connected_at: Instant,
    pub last_activity: Instant,
}

impl ConnectionInfo {
    fn new(connection_id: ConnectionId, user_id: UserId, intent: ConnectionIntent) -> Self {
        let now = Instant::now();
        Self {
            connection_id,
            user_id,
            intent,
            state: ConnectionState::Open,
            connected_at: now,
            last_activity: now,
        }
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Capacity limits applied at accept time.
#[derive(Debug, Clone)]
pub struct RealtimeLimits {
    /// Maximum total connections
    pub max_total: usize,

    /// Maximum connections per user
    pub max_per_user: usize,
}

impl Default for RealtimeLimits {
    fn default() -> Self {
        Self {
            max_total: 10000,
            max_per_user: 5,
        }
    }
}

/// Tracks live connections and their subscription membership.
#[derive(Clone)]
pub struct ConnectionRegistry {
    /// All active connections by connection_id
    connections: Arc<DashMap<ConnectionId, ConnectionInfo>>,

    /// Connections by user_id
    user_connections: Arc<DashMap<UserId, Vec<ConnectionId>>>,

    hub: CourseChannelHub,
    notifier: UserNotificationRouter,
    presence: PresenceTracker,
    limits: Arc<RealtimeLimits>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new(
        hub: CourseChannelHub,
        notifier: UserNotificationRouter,
        presence: PresenceTracker,
        limits: RealtimeLimits,
    ) -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
            user_connections: Arc::new(DashMap::new()),
            hub,
            notifier,
            presence,
            limits: Arc::new(limits),
        }
    }

    /// Register a classified connection and route it to its subsystem.
    ///
    /// Course subscriptions trigger a presence announcement so the whole
    /// channel (the new connection included) receives the updated roster.
    pub fn accept(&self, intent: ConnectionIntent, handle: ConnectionHandle) -> Result<()> {
        let ConnectionHandle {
            connection_id,
            user_id,
            sender,
        } = handle;

        if self.connections.len() >= self.limits.max_total {
            return Err(Error::ConnectionLimit(format!(
                "server at capacity ({} connections)",
                self.limits.max_total
            )));
        }

        if let Some(user_conns) = self.user_connections.get(&user_id) {
            if user_conns.len() >= self.limits.max_per_user {
                return Err(Error::ConnectionLimit(format!(
                    "too many connections for this user (max {})",
                    self.limits.max_per_user
                )));
            }
        }

        self.connections.insert(
            connection_id.clone(),
            ConnectionInfo::new(connection_id.clone(), user_id.clone(), intent.clone()),
        );
        self.user_connections
            .entry(user_id.clone())
            .or_default()
            .push(connection_id.clone());

        match &intent {
            ConnectionIntent::ChatSubscribe(course_id) => {
                self.hub.subscribe(
                    course_id.clone(),
                    user_id.clone(),
                    connection_id.clone(),
                    SubscriptionKind::Chat,
                    sender,
                );
                self.presence.announce(course_id);
            }
            ConnectionIntent::PresenceSubscribe(course_id) => {
                self.hub.subscribe(
                    course_id.clone(),
                    user_id.clone(),
                    connection_id.clone(),
                    SubscriptionKind::Presence,
                    sender,
                );
                self.presence.announce(course_id);
            }
            ConnectionIntent::NotificationBind(bind_user) => {
                self.notifier
                    .bind(bind_user.clone(), connection_id.clone(), sender);
            }
        }

        info!(
            connection_id = %connection_id,
            user_id = %user_id,
            total_connections = self.connections.len(),
            "Connection registered"
        );

        Ok(())
    }

    /// Record inbound activity for a connection.
    pub fn record_activity(&self, connection_id: &ConnectionId) {
        if let Some(mut conn) = self.connections.get_mut(connection_id) {
            conn.last_activity = Instant::now();
        }
    }

    /// Mark a connection as shutting down.
    pub fn mark_closing(&self, connection_id: &ConnectionId) {
        if let Some(mut conn) = self.connections.get_mut(connection_id) {
            conn.state = ConnectionState::Closing;
        }
    }

    /// Remove a connection from whichever membership structure holds it.
    ///
    /// Idempotent: closing an unknown or already-closed connection is a
    /// no-op. Course unsubscriptions trigger a presence announcement for
    /// the remaining channel members.
    pub fn on_close(&self, connection_id: &ConnectionId) {
        let Some((_, conn_info)) = self.connections.remove(connection_id) else {
            debug!(connection_id = %connection_id, "Close for unknown connection ignored");
            return;
        };

        if let Some(mut user_conns) = self.user_connections.get_mut(&conn_info.user_id) {
            user_conns.retain(|id| id != connection_id);
            if user_conns.is_empty() {
                drop(user_conns);
                self.user_connections.remove(&conn_info.user_id);
            }
        }

        match &conn_info.intent {
            ConnectionIntent::ChatSubscribe(_) | ConnectionIntent::PresenceSubscribe(_) => {
                if let Some(course_id) = self.hub.unsubscribe(connection_id) {
                    self.presence.announce(&course_id);
                }
            }
            ConnectionIntent::NotificationBind(user_id) => {
                self.notifier.unbind(user_id, connection_id);
            }
        }

        info!(
            connection_id = %connection_id,
            user_id = %conn_info.user_id,
            duration = ?conn_info.duration(),
            "Connection closed"
        );
    }

    /// Get a snapshot of a connection's bookkeeping.
    #[must_use]
    pub fn get_connection(&self, connection_id: &ConnectionId) -> Option<ConnectionInfo> {
        self.connections.get(connection_id).map(|c| c.clone())
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of live connections for a user.
    #[must_use]
    pub fn user_connection_count(&self, user_id: &UserId) -> usize {
        self.user_connections
            .get(user_id)
            .map_or(0, |conns| conns.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CourseId;

    fn registry(limits: RealtimeLimits) -> ConnectionRegistry {
        let hub = CourseChannelHub::new();
        let notifier = UserNotificationRouter::new();
        let presence = PresenceTracker::new(hub.clone());
        ConnectionRegistry::new(hub, notifier, presence, limits)
    }

    fn handle(user: &str, conn: &str) -> (ConnectionHandle, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            ConnectionHandle {
                connection_id: ConnectionId::from_string(conn.to_string()),
                user_id: UserId::from_string(user.to_string()),
                sender: tx,
            },
            rx,
        )
    }

    #[tokio::test]
    async fn test_accept_chat_subscription_announces_presence() {
        let registry = registry(RealtimeLimits::default());
        let course = CourseId::from_string("course1".to_string());

        let (h, mut rx) = handle("user1", "conn1");
        registry
            .accept(ConnectionIntent::ChatSubscribe(course.clone()), h)
            .unwrap();

        assert_eq!(registry.connection_count(), 1);
        let event = rx.try_recv().unwrap();
        assert_eq!(
            event.to_text().unwrap(),
            r#"{"type":"presence","users":["user1"]}"#
        );
    }

    #[tokio::test]
    async fn test_close_reannounces_to_remaining_members() {
        let registry = registry(RealtimeLimits::default());
        let course = CourseId::from_string("course7".to_string());

        let (h1, _rx1) = handle("user1", "conn1");
        let (h2, mut rx2) = handle("user2", "conn2");
        registry
            .accept(ConnectionIntent::ChatSubscribe(course.clone()), h1)
            .unwrap();
        registry
            .accept(ConnectionIntent::ChatSubscribe(course.clone()), h2)
            .unwrap();

        // Drain conn2's own join announcement
        while rx2.try_recv().is_ok() {}

        registry.on_close(&ConnectionId::from_string("conn1".to_string()));

        let event = rx2.try_recv().unwrap();
        assert_eq!(
            event.to_text().unwrap(),
            r#"{"type":"presence","users":["user2"]}"#
        );
        assert_eq!(registry.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_accept_notification_bind() {
        let registry = registry(RealtimeLimits::default());
        let user = UserId::from_string("user1".to_string());

        let (h, _rx) = handle("user1", "conn1");
        registry
            .accept(ConnectionIntent::NotificationBind(user.clone()), h)
            .unwrap();

        assert!(registry.notifier.is_bound(&user));

        registry.on_close(&ConnectionId::from_string("conn1".to_string()));
        assert!(!registry.notifier.is_bound(&user));
    }

    #[tokio::test]
    async fn test_on_close_is_idempotent() {
        let registry = registry(RealtimeLimits::default());
        let course = CourseId::from_string("course1".to_string());
        let conn = ConnectionId::from_string("conn1".to_string());

        let (h, _rx) = handle("user1", "conn1");
        registry
            .accept(ConnectionIntent::ChatSubscribe(course), h)
            .unwrap();

        registry.on_close(&conn);
        registry.on_close(&conn); // second close must be a no-op

        assert_eq!(registry.connection_count(), 0);
        assert_eq!(
            registry.user_connection_count(&UserId::from_string("user1".to_string())),
            0
        );
    }

    #[tokio::test]
    async fn test_per_user_limit() {
        let registry = registry(RealtimeLimits {
            max_per_user: 2,
            ..Default::default()
        });
        let course = CourseId::from_string("course1".to_string());

        let (h1, _rx1) = handle("user1", "conn1");
        let (h2, _rx2) = handle("user1", "conn2");
        let (h3, _rx3) = handle("user1", "conn3");

        assert!(registry
            .accept(ConnectionIntent::ChatSubscribe(course.clone()), h1)
            .is_ok());
        assert!(registry
            .accept(ConnectionIntent::ChatSubscribe(course.clone()), h2)
            .is_ok());

        let err = registry
            .accept(ConnectionIntent::ChatSubscribe(course), h3)
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionLimit(_)));
        assert_eq!(registry.connection_count(), 2);
    }

    #[tokio::test]
    async fn test_total_limit() {
        let registry = registry(RealtimeLimits {
            max_total: 1,
            ..Default::default()
        });
        let course = CourseId::from_string("course1".to_string());

        let (h1, _rx1) = handle("user1", "conn1");
        let (h2, _rx2) = handle("user2", "conn2");

        assert!(registry
            .accept(ConnectionIntent::ChatSubscribe(course.clone()), h1)
            .is_ok());
        let err = registry
            .accept(ConnectionIntent::ChatSubscribe(course), h2)
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionLimit(_)));
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let registry = registry(RealtimeLimits::default());
        let course = CourseId::from_string("course1".to_string());
        let conn = ConnectionId::from_string("conn1".to_string());

        let (h, _rx) = handle("user1", "conn1");
        registry
            .accept(ConnectionIntent::ChatSubscribe(course), h)
            .unwrap();

        assert_eq!(
            registry.get_connection(&conn).unwrap().state,
            ConnectionState::Open
        );

        registry.mark_closing(&conn);
        assert_eq!(
            registry.get_connection(&conn).unwrap().state,
            ConnectionState::Closing
        );

        registry.on_close(&conn);
        assert!(registry.get_connection(&conn).is_none());
    }
}
