//! Content-addressable image store
//!
//! Images are keyed by the SHA-256 of their bytes, never by filename. The
//! same picture captured by many sensors, or many times by one, lives in a
//! single row whose counter records how often it was seen.

use crate::db::Database;
use crate::error::Result;
use crate::types::ImageOutcome;
use chrono::Utc;
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Returns the 64-character hex SHA-256 digest of `data`
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// File type recorded for an image: the extension of the name it was seen under
pub fn file_type(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Dedup/upsert logic for captured images
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageStore;

impl ImageStore {
    pub fn new() -> Self {
        Self
    }

    /// Record one sighting of `data`, originally named `source`.
    ///
    /// Must run inside a transaction so the lookup and the write see the
    /// same state. Known hash: timestamp refreshed, count + 1. Unknown hash:
    /// new row with count 1.
    pub fn record(&self, conn: &Connection, source: &Path, data: &[u8]) -> Result<ImageOutcome> {
        let hash = content_hash(data);
        let now = Utc::now();

        match Database::find_image_count(conn, &hash)? {
            Some(_) => {
                let count = Database::touch_image(conn, &hash, now)?;
                tracing::debug!(hash = %hash, count, "Updated image");
                Ok(ImageOutcome::Updated { hash, count })
            }
            None => {
                let filetype = file_type(source);
                Database::insert_image(conn, &hash, &filetype, data, now)?;
                tracing::debug!(hash = %hash, filetype = %filetype, "Added image");
                Ok(ImageOutcome::Inserted { hash })
            }
        }
    }
}
