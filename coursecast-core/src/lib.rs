pub mod bootstrap;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod realtime;
pub mod repository;
pub mod service;

pub use config::Config;
pub use error::{Error, Result};
