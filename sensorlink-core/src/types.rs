//! Core domain types for sensorlink
//!
//! These types describe what a sensor reports, independent of whether the
//! report lands in the local store or travels to a collector.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Sensor** | A capture node running protocol parsers and one [`crate::SensorClient`] |
//! | **Collector** | The remote service receiving HTTP-posted reports from sensors |
//! | **Account** | A credential observed on the wire by a parser |
//! | **Image** | A captured artifact, deduplicated by content hash |
//! | **Stat** | A per-interval packet count for one protocol |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Host names that select the local store when the mode is `auto`
pub const LOOPBACK_HOSTS: &[&str] = &["localhost", "127.0.0.1"];

// ============================================
// Sensor identity
// ============================================

/// Who this client reports as and where the collector lives.
///
/// Built once from configuration and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorIdentity {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Mask captured passwords before local storage
    pub anonymize: bool,
    /// Talk https to the collector
    pub ssl: bool,
}

impl SensorIdentity {
    /// `http://host:port` or `https://host:port`
    pub fn base_url(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// Whether the configured host names this machine
    pub fn is_loopback(&self) -> bool {
        LOOPBACK_HOSTS.contains(&self.host.as_str())
    }
}

// ============================================
// Mode
// ============================================

/// Where report calls are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Direct writes to the local SQLite store
    Local,
    /// HTTP posts to the collector
    Remote,
}

impl Mode {
    /// Loopback detection: `localhost`/`127.0.0.1` is local, anything else remote
    pub fn detect(host: &str) -> Self {
        if LOOPBACK_HOSTS.contains(&host) {
            Mode::Local
        } else {
            Mode::Remote
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Local => "local",
            Mode::Remote => "remote",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================
// Reports
// ============================================

/// A credential discovered by a protocol parser.
///
/// The password may already be masked by the time this is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub username: String,
    pub password: String,
    /// Free-text context (e.g. "ftp login", target host)
    pub info: String,
    /// Protocol the credential was seen on
    pub proto: String,
    /// Parser that found it
    pub parser: String,
}

impl AccountRecord {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        info: impl Into<String>,
        proto: impl Into<String>,
        parser: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            info: info.into(),
            proto: proto.into(),
            parser: parser.into(),
        }
    }
}

/// A stored image artifact.
///
/// Keyed by the hash of its bytes; the only record that is updated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    /// Hex SHA-256 of `data`
    pub hash: String,
    /// Extension of the file it was first seen as
    pub filetype: String,
    pub data: Vec<u8>,
    /// Last time these bytes were reported
    pub last_seen_at: DateTime<Utc>,
    /// Number of times these bytes were reported
    pub count: i64,
}

/// One per-interval packet count observation. Never merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatRecord {
    pub proto: String,
    /// Sensor that observed the traffic
    pub username: String,
    pub count: i64,
    pub created_at: DateTime<Utc>,
}

impl StatRecord {
    pub fn new(proto: impl Into<String>, username: impl Into<String>, count: i64) -> Self {
        Self {
            proto: proto.into(),
            username: username.into(),
            count,
            created_at: Utc::now(),
        }
    }
}

// ============================================
// Outcomes
// ============================================

/// What happened to an account report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountOutcome {
    /// New row written to the local store
    Inserted,
    /// An identical (username, password, info) row already existed
    Duplicate,
    /// Password was empty after masking; nothing stored
    EmptyPassword,
    /// Handed to the collector channel
    Queued,
}

/// What happened to an image report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
    /// First sighting of these bytes
    Inserted { hash: String },
    /// Known bytes; counter bumped to `count`
    Updated { hash: String, count: i64 },
    /// Upload handed to the collector channel
    Queued,
    /// The file does not exist on this sensor
    Skipped,
}

/// Collector-side service control verb
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    /// Status query only
    None,
    Start,
    Stop,
}

impl ServiceAction {
    /// Wire value of the `action` field
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceAction::None => "none",
            ServiceAction::Start => "Start",
            ServiceAction::Stop => "Stop",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(host: &str, ssl: bool) -> SensorIdentity {
        SensorIdentity {
            host: host.to_string(),
            port: 8080,
            username: "sensor01".to_string(),
            anonymize: true,
            ssl,
        }
    }

    #[test]
    fn test_mode_detect() {
        assert_eq!(Mode::detect("127.0.0.1"), Mode::Local);
        assert_eq!(Mode::detect("localhost"), Mode::Local);
        assert_eq!(Mode::detect("10.1.1.20"), Mode::Remote);
        assert_eq!(Mode::detect("collector.example.net"), Mode::Remote);
        // Only the exact loopback names count
        assert_eq!(Mode::detect("127.0.0.2"), Mode::Remote);
    }

    #[test]
    fn test_base_url_scheme() {
        assert_eq!(identity("10.0.0.1", false).base_url(), "http://10.0.0.1:8080");
        assert_eq!(identity("10.0.0.1", true).base_url(), "https://10.0.0.1:8080");
    }

    #[test]
    fn test_identity_loopback() {
        assert!(identity("localhost", false).is_loopback());
        assert!(!identity("sensor.lan", false).is_loopback());
    }

    #[test]
    fn test_service_action_wire_names() {
        assert_eq!(ServiceAction::None.as_str(), "none");
        assert_eq!(ServiceAction::Start.as_str(), "Start");
        assert_eq!(ServiceAction::Stop.as_str(), "Stop");
    }
}
