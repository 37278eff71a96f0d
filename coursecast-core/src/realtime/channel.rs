//! Per-course broadcast channels
//!
//! Groups subscriber senders by course id. Channels are created lazily on
//! first subscription and removed as soon as their subscriber set empties,
//! so idle courses hold no memory.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::events::ChannelEvent;
use crate::models::{ConnectionId, CourseId, UserId};

/// What a subscriber signed up for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKind {
    /// Chat + presence frames
    Chat,
    /// Presence frames only
    Presence,
}

impl SubscriptionKind {
    fn accepts(self, event: &ChannelEvent) -> bool {
        match self {
            Self::Chat => true,
            Self::Presence => !event.is_chat(),
        }
    }
}

/// One connection's membership in a course channel.
struct Subscriber {
    connection_id: ConnectionId,
    user_id: UserId,
    kind: SubscriptionKind,
    sender: mpsc::UnboundedSender<ChannelEvent>,
}

/// Fan-out hub for course channels.
///
/// The only component allowed to mutate course membership. All operations
/// are synchronous and in-memory; actual socket writes happen in each
/// connection's forwarding task, downstream of the mpsc queue, which also
/// preserves per-channel FIFO ordering per receiver.
#[derive(Clone)]
pub struct CourseChannelHub {
    /// Map of course_id -> subscribers
    channels: Arc<DashMap<CourseId, Vec<Subscriber>>>,

    /// Map of connection_id -> course_id for cleanup
    connections: Arc<DashMap<ConnectionId, CourseId>>,
}

impl CourseChannelHub {
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            connections: Arc::new(DashMap::new()),
        }
    }

    /// Subscribe a connection to a course channel.
    ///
    /// Idempotent per connection: a connection already subscribed anywhere
    /// is unsubscribed first, so it belongs to at most one channel.
    pub fn subscribe(
        &self,
        course_id: CourseId,
        user_id: UserId,
        connection_id: ConnectionId,
        kind: SubscriptionKind,
        sender: mpsc::UnboundedSender<ChannelEvent>,
    ) {
        if self.connections.contains_key(&connection_id) {
            warn!(
                connection_id = %connection_id,
                "Connection re-subscribed, superseding previous membership"
            );
            self.unsubscribe(&connection_id);
        }

        let subscriber = Subscriber {
            connection_id: connection_id.clone(),
            user_id: user_id.clone(),
            kind,
            sender,
        };

        self.channels
            .entry(course_id.clone())
            .or_default()
            .push(subscriber);
        self.connections.insert(connection_id.clone(), course_id.clone());

        info!(
            course_id = %course_id,
            user_id = %user_id,
            connection_id = %connection_id,
            "Connection subscribed to course channel"
        );
    }

    /// Remove a connection from its channel.
    ///
    /// Deletes the channel entry when the subscriber set empties. Removing
    /// an absent connection is a no-op. Returns the course the connection
    /// was subscribed to, if any.
    pub fn unsubscribe(&self, connection_id: &ConnectionId) -> Option<CourseId> {
        let (_, course_id) = self.connections.remove(connection_id)?;

        if let Some(mut subscribers) = self.channels.get_mut(&course_id) {
            subscribers.retain(|sub| sub.connection_id != *connection_id);

            if subscribers.is_empty() {
                drop(subscribers); // Drop the RefMut before removing
                self.channels.remove(&course_id);
                debug!(course_id = %course_id, "Course channel empty, removed");
            }
        }

        info!(
            course_id = %course_id,
            connection_id = %connection_id,
            "Connection unsubscribed from course channel"
        );

        Some(course_id)
    }

    /// Broadcast an event to every subscriber of a course channel whose
    /// kind accepts it, except `exclude`.
    ///
    /// Best-effort: a failed send evicts that subscriber and never blocks
    /// or aborts delivery to the rest. Returns the number of deliveries.
    pub fn broadcast(
        &self,
        course_id: &CourseId,
        event: &ChannelEvent,
        exclude: Option<&ConnectionId>,
    ) -> usize {
        let mut sent_count = 0;
        let mut failed_connections = Vec::new();

        if let Some(subscribers) = self.channels.get(course_id) {
            for subscriber in subscribers.iter() {
                if Some(&subscriber.connection_id) == exclude {
                    continue;
                }
                if !subscriber.kind.accepts(event) {
                    continue;
                }

                if subscriber.sender.send(event.clone()).is_ok() {
                    sent_count += 1;
                } else {
                    warn!(
                        course_id = %course_id,
                        connection_id = %subscriber.connection_id,
                        event_type = %event.event_type(),
                        "Failed to send event, marking connection for eviction"
                    );
                    failed_connections.push(subscriber.connection_id.clone());
                }
            }
        }

        // Evict dead subscribers outside the read guard
        for connection_id in failed_connections {
            self.unsubscribe(&connection_id);
        }

        if sent_count > 0 {
            debug!(
                course_id = %course_id,
                sent_count = sent_count,
                event_type = %event.event_type(),
                "Broadcast complete"
            );
        }

        sent_count
    }

    /// Deduplicated, sorted user ids of the channel's current subscribers.
    #[must_use]
    pub fn roster(&self, course_id: &CourseId) -> Vec<UserId> {
        let mut users: Vec<UserId> = self
            .channels
            .get(course_id)
            .map(|subscribers| subscribers.iter().map(|sub| sub.user_id.clone()).collect())
            .unwrap_or_default();

        users.sort();
        users.dedup();
        users
    }

    /// Number of subscribers in a course channel.
    #[must_use]
    pub fn subscriber_count(&self, course_id: &CourseId) -> usize {
        self.channels
            .get(course_id)
            .map_or(0, |subscribers| subscribers.len())
    }

    /// Whether a channel currently exists for the course.
    #[must_use]
    pub fn channel_exists(&self, course_id: &CourseId) -> bool {
        self.channels.contains_key(course_id)
    }

    /// Number of active course channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Total subscribed connections across all channels.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl Default for CourseChannelHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscribe(
        hub: &CourseChannelHub,
        course: &str,
        user: &str,
        conn: &str,
        kind: SubscriptionKind,
    ) -> mpsc::UnboundedReceiver<ChannelEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        hub.subscribe(
            CourseId::from_string(course.to_string()),
            UserId::from_string(user.to_string()),
            ConnectionId::from_string(conn.to_string()),
            kind,
            tx,
        );
        rx
    }

    #[tokio::test]
    async fn test_subscribe_and_broadcast() {
        let hub = CourseChannelHub::new();
        let course = CourseId::from_string("course1".to_string());

        let mut rx_a = subscribe(&hub, "course1", "user_a", "conn_a", SubscriptionKind::Chat);
        let mut rx_b = subscribe(&hub, "course1", "user_b", "conn_b", SubscriptionKind::Chat);

        let event = ChannelEvent::Presence {
            users: hub.roster(&course),
        };
        let sent = hub.broadcast(&course, &event, None);

        assert_eq!(sent, 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_broadcast_excludes_connection() {
        let hub = CourseChannelHub::new();
        let course = CourseId::from_string("course1".to_string());

        let mut rx_a = subscribe(&hub, "course1", "user_a", "conn_a", SubscriptionKind::Chat);
        let mut rx_b = subscribe(&hub, "course1", "user_b", "conn_b", SubscriptionKind::Chat);
        let mut rx_c = subscribe(&hub, "course1", "user_c", "conn_c", SubscriptionKind::Chat);

        let event = ChannelEvent::Error {
            message: "x".to_string(),
        };
        let exclude = ConnectionId::from_string("conn_a".to_string());
        let sent = hub.broadcast(&course, &event, Some(&exclude));

        assert_eq!(sent, 2);
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_c.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_presence_subscriber_never_receives_chat() {
        let hub = CourseChannelHub::new();
        let course = CourseId::from_string("course1".to_string());

        let mut rx_chat = subscribe(&hub, "course1", "user_a", "conn_a", SubscriptionKind::Chat);
        let mut rx_presence =
            subscribe(&hub, "course1", "user_b", "conn_b", SubscriptionKind::Presence);

        let message = crate::models::ChatMessage::new(
            course.clone(),
            UserId::from_string("user_a".to_string()),
            "hi".to_string(),
        );
        let sent = hub.broadcast(&course, &ChannelEvent::Chat { message }, None);

        assert_eq!(sent, 1);
        assert!(rx_chat.try_recv().is_ok());
        assert!(rx_presence.try_recv().is_err());

        // Presence frames reach both
        let sent = hub.broadcast(
            &course,
            &ChannelEvent::Presence {
                users: hub.roster(&course),
            },
            None,
        );
        assert_eq!(sent, 2);
    }

    #[tokio::test]
    async fn test_empty_channel_is_removed() {
        let hub = CourseChannelHub::new();
        let course = CourseId::from_string("course1".to_string());

        let _rx = subscribe(&hub, "course1", "user_a", "conn_a", SubscriptionKind::Chat);
        assert!(hub.channel_exists(&course));

        hub.unsubscribe(&ConnectionId::from_string("conn_a".to_string()));
        assert!(!hub.channel_exists(&course));
        assert_eq!(hub.channel_count(), 0);
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let hub = CourseChannelHub::new();
        let conn = ConnectionId::from_string("conn_a".to_string());

        let _rx = subscribe(&hub, "course1", "user_a", "conn_a", SubscriptionKind::Chat);

        assert!(hub.unsubscribe(&conn).is_some());
        assert!(hub.unsubscribe(&conn).is_none());
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_dead_subscriber_evicted_on_broadcast() {
        let hub = CourseChannelHub::new();
        let course = CourseId::from_string("course1".to_string());

        let rx_a = subscribe(&hub, "course1", "user_a", "conn_a", SubscriptionKind::Chat);
        let mut rx_b = subscribe(&hub, "course1", "user_b", "conn_b", SubscriptionKind::Chat);

        drop(rx_a); // transport died without unsubscribing

        let event = ChannelEvent::Error {
            message: "x".to_string(),
        };
        let sent = hub.broadcast(&course, &event, None);

        assert_eq!(sent, 1);
        assert!(rx_b.try_recv().is_ok());
        assert_eq!(hub.subscriber_count(&course), 1);
    }

    #[tokio::test]
    async fn test_resubscribe_supersedes() {
        let hub = CourseChannelHub::new();
        let course1 = CourseId::from_string("course1".to_string());
        let course2 = CourseId::from_string("course2".to_string());

        let _rx1 = subscribe(&hub, "course1", "user_a", "conn_a", SubscriptionKind::Chat);
        let _rx2 = subscribe(&hub, "course2", "user_a", "conn_a", SubscriptionKind::Chat);

        assert!(!hub.channel_exists(&course1));
        assert_eq!(hub.subscriber_count(&course2), 1);
        assert_eq!(hub.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_roster_deduplicates_users() {
        let hub = CourseChannelHub::new();
        let course = CourseId::from_string("course1".to_string());

        let _rx1 = subscribe(&hub, "course1", "user_a", "conn_1", SubscriptionKind::Chat);
        let _rx2 = subscribe(&hub, "course1", "user_a", "conn_2", SubscriptionKind::Presence);
        let _rx3 = subscribe(&hub, "course1", "user_b", "conn_3", SubscriptionKind::Chat);

        let roster = hub.roster(&course);
        assert_eq!(
            roster,
            vec![
                UserId::from_string("user_a".to_string()),
                UserId::from_string("user_b".to_string()),
            ]
        );
    }
}
