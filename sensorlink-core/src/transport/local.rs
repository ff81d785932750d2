//! Local persistence adapter for standalone sensors

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use tracing::Span;

use super::Transport;
use crate::anonymize::anonymize;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::images::ImageStore;
use crate::sanitize::clean;
use crate::stats::StatEmitter;
use crate::types::{AccountOutcome, AccountRecord, ImageOutcome, Mode, StatRecord};

/// Writes reports into the local store, one transaction per call
pub struct LocalTransport {
    db: Arc<Database>,
    images: ImageStore,
    stats: StatEmitter,
    anonymize: bool,
    span: Span,
}

impl LocalTransport {
    pub fn new(db: Arc<Database>, anonymize: bool, span: Span) -> Self {
        Self {
            db,
            images: ImageStore::new(),
            stats: StatEmitter::new(),
            anonymize,
            span,
        }
    }

    /// The store this transport writes to
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// The row that would be stored for `account`: masked, then escaped
    fn stored_form(&self, account: &AccountRecord) -> AccountRecord {
        let password = anonymize(&account.password, self.anonymize);
        AccountRecord {
            username: clean(&account.username),
            password: clean(&password),
            info: clean(&account.info),
            proto: clean(&account.proto),
            parser: clean(&account.parser),
        }
    }
}

impl Transport for LocalTransport {
    fn mode(&self) -> Mode {
        Mode::Local
    }

    fn account(&self, account: &AccountRecord) -> Result<AccountOutcome> {
        let _enter = self.span.enter();
        let stored = self.stored_form(account);

        if stored.password.is_empty() {
            tracing::debug!(username = %stored.username, "Ignoring account without password");
            return Ok(AccountOutcome::EmptyPassword);
        }

        let outcome = self.db.transaction(|tx| {
            if Database::account_exists(tx, &stored)? {
                return Ok(AccountOutcome::Duplicate);
            }
            Database::insert_account(tx, &stored)?;
            Ok(AccountOutcome::Inserted)
        })?;

        if outcome == AccountOutcome::Inserted {
            tracing::debug!(
                username = %stored.username,
                info = %stored.info,
                proto = %stored.proto,
                parser = %stored.parser,
                "Added account"
            );
        }
        Ok(outcome)
    }

    fn image(&self, path: &Path) -> Result<ImageOutcome> {
        let _enter = self.span.enter();

        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::MissingArtifact(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };

        self.db
            .transaction(|tx| self.images.record(tx, path, &data))
    }

    fn stat(&self, stat: &StatRecord) -> Result<()> {
        let _enter = self.span.enter();
        self.db.transaction(|tx| self.stats.emit(tx, stat))
    }
}
