pub mod chat;

pub use chat::{ChatRepository, ChatStore};
