pub mod auth;
pub mod chat;

pub use auth::{Claims, TokenService};
pub use chat::ChatService;
