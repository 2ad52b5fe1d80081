//! UI-side command handlers
//!
//! Thin async operations over [`AppState`](crate::AppState). Commands that
//! change what the daemon should do raise the change signal.
//! Commands are organized into different modules based on their functionality.

pub mod config;
pub mod download;
pub mod playlist;
pub mod registry;
pub mod system;

// Re-export all command functions for easy access
pub use config::*;
pub use download::*;
pub use playlist::*;
pub use registry::*;
pub use system::*;
