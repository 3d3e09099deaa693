//! # Rafflebox
//!
//! A ticket sales server for numbered raffles, usable both as a standalone
//! binary and as a library.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! rafflebox = { version = "0.0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rafflebox::config::Config;
//! use rafflebox::server::{AppState, create_router};
//! use rafflebox::store::{SqliteStore, Store};
//!
//! let config = Config::load(None).unwrap();
//! let store = SqliteStore::new(config.server.db_path()).unwrap();
//! store.initialize().unwrap();
//!
//! let state = Arc::new(AppState::new(Arc::new(store), config));
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `rafflebox` binary. Disable with `default-features = false`.

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod notify;
pub mod orders;
pub mod payments;
pub mod raffles;
pub mod ratelimit;
pub mod recovery;
pub mod server;
pub mod store;
pub mod types;
