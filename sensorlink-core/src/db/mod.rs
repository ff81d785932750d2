//! Database layer for sensorlink
//!
//! This module provides the local store used in standalone deployments:
//! - Schema migrations
//! - A connection pool with scoped release
//! - Repository functions for accounts, images and stats

pub mod pool;
pub mod repo;
pub mod schema;

pub use pool::{ConnectionPool, PooledConnection};
pub use repo::Database;
