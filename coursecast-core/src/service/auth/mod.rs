//! Session/identity collaborator
//!
//! coursecast does not implement login; it consumes tokens minted by the
//! LMS and resolves them to a user id at subscribe time.

pub mod jwt;

pub use jwt::{Claims, TokenService};
