//! # Wallcast Core
//! Shared types, collaborator traits, errors, and configuration.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::WallcastConfig;
pub use error::{Result, SendError, WallcastError};
