//! Course presence tracking
//!
//! The roster is derived from live channel membership, never stored. Every
//! membership change triggers a recomputation and a broadcast of the
//! authoritative roster to the whole channel, including the connection
//! whose state just changed.

use tracing::debug;

use super::channel::CourseChannelHub;
use super::events::ChannelEvent;
use crate::models::{CourseId, UserId};

/// Answers "who is currently viewing course X" and announces changes.
#[derive(Clone)]
pub struct PresenceTracker {
    hub: CourseChannelHub,
}

impl PresenceTracker {
    #[must_use]
    pub fn new(hub: CourseChannelHub) -> Self {
        Self { hub }
    }

    /// The set of user ids currently connected to the course channel.
    #[must_use]
    pub fn current_users(&self, course_id: &CourseId) -> Vec<UserId> {
        self.hub.roster(course_id)
    }

    /// Recompute the roster and broadcast it to the channel.
    pub fn announce(&self, course_id: &CourseId) {
        let users = self.hub.roster(course_id);
        let count = users.len();

        let sent = self
            .hub
            .broadcast(course_id, &ChannelEvent::Presence { users }, None);

        debug!(
            course_id = %course_id,
            roster_size = count,
            sent_count = sent,
            "Presence roster announced"
        );
    }
}
