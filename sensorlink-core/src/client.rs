//! Sensor-side reporting client
//!
//! [`SensorClient`] is the one object a protocol parser talks to. It offers
//! the same calls whether the sensor is standalone (reports go into the
//! local SQLite store) or part of a distributed deployment (reports are
//! posted to a collector).
//!
//! ## Blocking contract
//!
//! | Call | Local mode | Remote mode |
//! |------|------------|-------------|
//! | `login` | blocks (HTTP) | blocks (HTTP) |
//! | `account`, `image`, `stat` | blocks (store write) | returns once queued |
//! | `reset` | returns once queued | returns once queued |
//! | `services`, `start`, `stop` | blocks (HTTP, JSON) | blocks (HTTP, JSON) |
//!
//! ## Example
//!
//! ```rust,no_run
//! use sensorlink_core::{AccountRecord, Config, SensorClient};
//!
//! let config = Config::load().expect("failed to load config");
//! let client = SensorClient::connect(&config).expect("collector login failed");
//!
//! client
//!     .account(&AccountRecord::new("bob", "secret", "ftp login", "ftp", "ftpparser"))
//!     .expect("failed to record account");
//! client.stat("ftp", 42).expect("failed to record stat");
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::Span;

use crate::config::{Config, TransportConfig};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::transport::{Channel, LocalTransport, Payload, RemoteTransport, Transport};
use crate::types::{
    AccountOutcome, AccountRecord, ImageOutcome, Mode, SensorIdentity, ServiceAction, StatRecord,
};

pub const LOGIN_PATH: &str = "/post/login";
pub const RESET_PATH: &str = "/post/reset";
pub const SERVICES_PATH: &str = "/post/services";

/// Reporting client for one sensor identity
pub struct SensorClient {
    identity: SensorIdentity,
    channel: Arc<Channel>,
    transport: Box<dyn Transport>,
    span: Span,
}

impl SensorClient {
    /// Build a client from configuration and log in to the collector.
    ///
    /// Local mode opens (and migrates) the store named by `database.path`.
    /// Fails if the collector cannot be reached or rejects the login.
    pub fn connect(config: &Config) -> Result<Self> {
        config.validate()?;

        let identity = config.sensor.identity();
        let mode = config.sensor.resolved_mode();

        let database = match mode {
            Mode::Local => {
                let db = Database::open_with(&config.database.resolved_path(), &config.database)?;
                db.migrate()?;
                Some(Arc::new(db))
            }
            Mode::Remote => None,
        };

        Self::with_parts(
            identity,
            &config.sensor.password,
            mode,
            &config.transport,
            database,
        )
    }

    /// Build a client from already-resolved parts and log in.
    ///
    /// `database` is required for [`Mode::Local`] and ignored otherwise.
    pub fn with_parts(
        identity: SensorIdentity,
        password: &str,
        mode: Mode,
        transport: &TransportConfig,
        database: Option<Arc<Database>>,
    ) -> Result<Self> {
        let span = tracing::info_span!(
            "sensor",
            username = %identity.username,
            host = %identity.host,
            mode = %mode
        );

        let channel = Arc::new(Channel::new(&identity, transport, span.clone())?);

        let transport: Box<dyn Transport> = match mode {
            Mode::Local => {
                let db = database.ok_or_else(|| {
                    Error::Config("local mode requires a database".to_string())
                })?;
                Box::new(LocalTransport::new(db, identity.anonymize, span.clone()))
            }
            Mode::Remote => Box::new(RemoteTransport::new(Arc::clone(&channel), span.clone())),
        };

        let client = Self {
            identity,
            channel,
            transport,
            span,
        };
        client.login(&client.identity.username, password)?;
        Ok(client)
    }

    pub fn identity(&self) -> &SensorIdentity {
        &self.identity
    }

    /// Mode chosen at construction
    pub fn mode(&self) -> Mode {
        self.transport.mode()
    }

    /// Establish the collector session. Always remote, always blocking.
    pub fn login(&self, username: &str, password: &str) -> Result<()> {
        self.channel.call(
            LOGIN_PATH,
            Payload::Form(vec![
                ("username", username.to_string()),
                ("password", password.to_string()),
            ]),
        )?;

        let _enter = self.span.enter();
        tracing::info!(url = %self.channel.url(LOGIN_PATH), "Logged in to collector");
        Ok(())
    }

    /// Report a captured credential
    pub fn account(&self, account: &AccountRecord) -> Result<AccountOutcome> {
        self.transport.account(account)
    }

    /// Report a captured image file.
    ///
    /// A file that does not exist is logged and skipped, not an error.
    pub fn image(&self, path: impl AsRef<Path>) -> Result<ImageOutcome> {
        let path = path.as_ref();
        match self.transport.image(path) {
            Err(Error::MissingArtifact(missing)) => {
                let _enter = self.span.enter();
                tracing::error!(file = %missing.display(), "Image does not exist, skipping");
                Ok(ImageOutcome::Skipped)
            }
            other => other,
        }
    }

    /// Report the packet count seen for `proto` during the last interval
    pub fn stat(&self, proto: &str, count: i64) -> Result<()> {
        let stat = StatRecord::new(proto, self.identity.username.as_str(), count);
        self.transport.stat(&stat)
    }

    /// Ask the collector to reset one of its data sets (`images`, `accounts`, ...)
    pub fn reset(&self, env: &str) {
        self.channel
            .fire(RESET_PATH, Payload::Form(vec![("type", env.to_string())]));
    }

    /// Current status of the collector-side services
    pub fn services(&self) -> Result<serde_json::Value> {
        self.service(ServiceAction::None, "none")
    }

    /// Start a collector-side service
    pub fn start(&self, name: &str) -> Result<serde_json::Value> {
        self.service(ServiceAction::Start, name)
    }

    /// Stop a collector-side service
    pub fn stop(&self, name: &str) -> Result<serde_json::Value> {
        self.service(ServiceAction::Stop, name)
    }

    fn service(&self, action: ServiceAction, parser: &str) -> Result<serde_json::Value> {
        let reply = self.channel.call(
            SERVICES_PATH,
            Payload::Form(vec![
                ("action", action.as_str().to_string()),
                ("parser", parser.to_string()),
            ]),
        )?;
        reply.json()
    }

    /// Wait up to `grace` for queued reports to reach the collector
    pub fn flush(&self, grace: Duration) -> bool {
        self.channel.drain(grace)
    }
}
