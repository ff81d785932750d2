//! # sensorlink-core
//!
//! Reporting client for capture sensors.
//!
//! Protocol parsers on a sensor discover accounts, images and traffic
//! statistics. This library persists those reports either into a local
//! SQLite store (standalone sensor) or forwards them to a central collector
//! over HTTP (distributed deployment), behind one set of calls.
//!
//! This library provides:
//! - [`SensorClient`], the router parsers call into
//! - Local and remote [`transport::Transport`] implementations
//! - Content-addressed image deduplication ([`images`])
//! - Credential masking ([`anonymize`])
//! - Append-only stat emission ([`stats`])
//! - Configuration, logging and the SQLite store
//!
//! ## Example
//!
//! ```rust,no_run
//! use sensorlink_core::{Config, SensorClient};
//!
//! // Load configuration
//! let config = Config::load().expect("failed to load config");
//!
//! // Log in and pick local or remote mode
//! let client = SensorClient::connect(&config).expect("failed to connect");
//! client.image("/var/spool/captures/cat.jpg").expect("failed to record image");
//! ```

// Re-export commonly used items at the crate root
pub use client::SensorClient;
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use types::*;

// Public modules
pub mod anonymize;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod images;
pub mod logging;
pub mod sanitize;
pub mod stats;
pub mod transport;
pub mod types;
