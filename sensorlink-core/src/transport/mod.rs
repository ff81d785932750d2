//! Transports: where report calls end up
//!
//! [`SensorClient`](crate::SensorClient) picks one [`Transport`] when it is
//! constructed and sends every `account`/`image`/`stat` report through it:
//! - [`LocalTransport`] writes straight into the SQLite store
//! - [`RemoteTransport`] posts to the collector through the [`Channel`]
//!
//! Control-plane calls (login, reset, service control) always use the
//! channel and are not part of this trait.

pub mod channel;
pub mod local;
pub mod remote;

pub use channel::{Channel, Payload, PendingRequest, Reply};
pub use local::LocalTransport;
pub use remote::RemoteTransport;

use std::path::Path;

use crate::error::Result;
use crate::types::{AccountOutcome, AccountRecord, ImageOutcome, Mode, StatRecord};

/// A destination for sensor reports
pub trait Transport: Send + Sync {
    /// Which deployment mode this transport serves
    fn mode(&self) -> Mode;

    /// Record a captured credential
    fn account(&self, account: &AccountRecord) -> Result<AccountOutcome>;

    /// Record a captured image file.
    ///
    /// Returns [`Error::MissingArtifact`](crate::Error::MissingArtifact) when
    /// the file is not on this sensor.
    fn image(&self, path: &Path) -> Result<ImageOutcome>;

    /// Record a per-interval protocol count
    fn stat(&self, stat: &StatRecord) -> Result<()>;
}
