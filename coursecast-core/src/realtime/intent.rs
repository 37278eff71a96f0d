//! Connection intent classification
//!
//! An inbound connection declares what it wants through its request path.
//! Classification happens exactly once, before the transport upgrade; the
//! rest of the system dispatches on the resulting enum and never re-parses
//! the path.

use crate::models::{CourseId, UserId};
use crate::{Error, Result};

/// What a connection was accepted for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionIntent {
    /// Subscribe to a course's chat + presence stream
    ChatSubscribe(CourseId),
    /// Subscribe to a course's presence stream only
    PresenceSubscribe(CourseId),
    /// Bind as the user's live notification connection
    NotificationBind(UserId),
}

impl ConnectionIntent {
    /// Classify a request path (plus raw query string) into an intent.
    ///
    /// Recognized path families:
    /// - `/ws/chat/{course_id}`
    /// - `/ws/presence/{course_id}`
    /// - `/ws/notifications?user_id={id}`
    ///
    /// Anything else is `Error::UnknownPath` and the upgrade is refused;
    /// no unclassified handle is ever registered.
    pub fn classify(path: &str, query: Option<&str>) -> Result<Self> {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

        match segments.as_slice() {
            ["ws", "chat", course_id] if !course_id.is_empty() => Ok(Self::ChatSubscribe(
                CourseId::from_string((*course_id).to_string()),
            )),
            ["ws", "presence", course_id] if !course_id.is_empty() => Ok(Self::PresenceSubscribe(
                CourseId::from_string((*course_id).to_string()),
            )),
            ["ws", "notifications"] => {
                let user_id = query
                    .and_then(|q| query_param(q, "user_id"))
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| {
                        Error::Validation("missing user_id query parameter".to_string())
                    })?;
                Ok(Self::NotificationBind(UserId::from_string(user_id)))
            }
            _ => Err(Error::UnknownPath(path.to_string())),
        }
    }

    /// The course this intent subscribes to, if any.
    #[must_use]
    pub fn course_id(&self) -> Option<&CourseId> {
        match self {
            Self::ChatSubscribe(course_id) | Self::PresenceSubscribe(course_id) => Some(course_id),
            Self::NotificationBind(_) => None,
        }
    }
}

/// Extract a single parameter from a raw query string.
#[must_use]
pub fn query_param(query: &str, key: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key).then(|| v.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_chat_path() {
        let intent = ConnectionIntent::classify("/ws/chat/course42", None).unwrap();
        assert_eq!(
            intent,
            ConnectionIntent::ChatSubscribe(CourseId::from_string("course42".to_string()))
        );
    }

    #[test]
    fn test_classify_presence_path() {
        let intent = ConnectionIntent::classify("/ws/presence/course42", None).unwrap();
        assert_eq!(
            intent,
            ConnectionIntent::PresenceSubscribe(CourseId::from_string("course42".to_string()))
        );
    }

    #[test]
    fn test_classify_notifications_path() {
        let intent =
            ConnectionIntent::classify("/ws/notifications", Some("user_id=u7&token=abc")).unwrap();
        assert_eq!(
            intent,
            ConnectionIntent::NotificationBind(UserId::from_string("u7".to_string()))
        );
    }

    #[test]
    fn test_notifications_without_user_id_is_invalid() {
        let err = ConnectionIntent::classify("/ws/notifications", Some("token=abc")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_unknown_path_is_rejected() {
        let err = ConnectionIntent::classify("/ws/grades/course42", None).unwrap_err();
        assert!(matches!(err, Error::UnknownPath(_)));

        let err = ConnectionIntent::classify("/ws/chat", None).unwrap_err();
        assert!(matches!(err, Error::UnknownPath(_)));
    }

    #[test]
    fn test_query_param() {
        assert_eq!(
            query_param("user_id=u7&token=abc", "token"),
            Some("abc".to_string())
        );
        assert_eq!(query_param("user_id=u7", "token"), None);
    }
}
