pub mod chat;
pub mod id;

pub use chat::{ChatHistoryQuery, ChatMessage, SendChatRequest};
pub use id::{ConnectionId, CourseId, UserId};
