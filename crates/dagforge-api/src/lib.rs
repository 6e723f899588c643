//! API server for dagforge.
//!
//! Serves project and job registration, graph inspection and "deploy now"
//! over HTTP/JSON.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::{ServerArgs, Settings};
pub use state::AppState;
