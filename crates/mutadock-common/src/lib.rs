//! Shared types, errors, and pocket configuration used across the mutadock crates.

pub mod error;
pub mod entities;
pub mod pocket_config;

// Re-export commonly used types
pub use error::{MutadockError, Result};
pub use entities::{GridBox, Vec3};
pub use pocket_config::PocketConfig;
