//! Stat emission
//!
//! Stats are append-only: every emitted count becomes its own row and is
//! never merged with earlier ones. Summing over an interval is left to
//! whoever reads the table. [`StatTally`] is the parser-side helper that
//! accumulates packet counts between emissions.

use crate::client::SensorClient;
use crate::db::Database;
use crate::error::Result;
use crate::types::StatRecord;
use rusqlite::Connection;
use std::collections::BTreeMap;

/// Appends stat observations to the local store
#[derive(Debug, Default, Clone, Copy)]
pub struct StatEmitter;

impl StatEmitter {
    pub fn new() -> Self {
        Self
    }

    /// Append one observation. No lookup, no dedup.
    pub fn emit(&self, conn: &Connection, stat: &StatRecord) -> Result<()> {
        Database::insert_stat(conn, stat)?;
        tracing::debug!(
            proto = %stat.proto,
            count = stat.count,
            username = %stat.username,
            "Added stat"
        );
        Ok(())
    }
}

/// Per-protocol packet counter for one reporting interval
#[derive(Debug, Default)]
pub struct StatTally {
    counts: BTreeMap<String, i64>,
}

impl StatTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `packets` to the running count for `proto`
    pub fn observe(&mut self, proto: &str, packets: i64) {
        *self.counts.entry(proto.to_string()).or_insert(0) += packets;
    }

    /// Current count for `proto` in this interval
    pub fn get(&self, proto: &str) -> i64 {
        self.counts.get(proto).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Take the interval's counts, sorted by protocol, and start a new interval
    pub fn drain(&mut self) -> Vec<(String, i64)> {
        std::mem::take(&mut self.counts).into_iter().collect()
    }

    /// Emit one stat per protocol seen this interval and reset.
    ///
    /// A protocol leaves the tally only once its stat was accepted, so on
    /// error the unsent counts are still here for the next flush. Returns
    /// the number of stats emitted.
    pub fn flush(&mut self, client: &SensorClient) -> Result<usize> {
        let mut emitted = 0;
        while let Some((proto, count)) = self
            .counts
            .first_key_value()
            .map(|(proto, count)| (proto.clone(), *count))
        {
            client.stat(&proto, count)?;
            self.counts.remove(&proto);
            emitted += 1;
        }
        Ok(emitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_emit_appends_every_call() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("sensor.db")).unwrap();
        db.migrate().unwrap();
        let emitter = StatEmitter::new();

        for _ in 0..5 {
            let stat = StatRecord::new("http", "sensor01", 42);
            db.transaction(|tx| emitter.emit(tx, &stat)).unwrap();
        }

        assert_eq!(db.count_stats(Some("http")).unwrap(), 5);
        assert!(db.list_stats().unwrap().iter().all(|s| s.count == 42));
    }

    #[test]
    fn test_tally_accumulates_and_drains() {
        let mut tally = StatTally::new();
        tally.observe("http", 10);
        tally.observe("ftp", 1);
        tally.observe("http", 5);

        assert_eq!(tally.get("http"), 15);
        assert_eq!(tally.get("smtp"), 0);

        let counts = tally.drain();
        assert_eq!(
            counts,
            vec![("ftp".to_string(), 1), ("http".to_string(), 15)]
        );
        assert!(tally.is_empty());
        assert!(tally.drain().is_empty());
    }
}
