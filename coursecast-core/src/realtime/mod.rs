//! Real-time fan-out layer
//!
//! Tracks live WebSocket connections and routes them into per-course
//! broadcast channels or per-user notification bindings. Membership state
//! lives in concurrent maps owned by the hub and the router; no other
//! component mutates it directly.

pub mod channel;
pub mod events;
pub mod intent;
pub mod notifier;
pub mod presence;
pub mod registry;

pub use channel::{CourseChannelHub, SubscriptionKind};
pub use events::ChannelEvent;
pub use intent::ConnectionIntent;
pub use notifier::UserNotificationRouter;
pub use presence::PresenceTracker;
pub use registry::{ConnectionHandle, ConnectionRegistry, ConnectionState, RealtimeLimits};
