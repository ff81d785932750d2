//! Remote transport: reports posted to the collector, fire-and-forget

use std::path::Path;
use std::sync::Arc;

use tracing::Span;

use super::channel::{Channel, Payload};
use super::Transport;
use crate::error::{Error, Result};
use crate::images::file_type;
use crate::types::{AccountOutcome, AccountRecord, ImageOutcome, Mode, StatRecord};

pub const ACCOUNT_PATH: &str = "/post/account";
pub const IMAGE_PATH: &str = "/post/image";
pub const STAT_PATH: &str = "/post/stat";

/// Forwards reports to the collector without waiting for the answer
pub struct RemoteTransport {
    channel: Arc<Channel>,
    span: Span,
}

impl RemoteTransport {
    pub fn new(channel: Arc<Channel>, span: Span) -> Self {
        Self { channel, span }
    }
}

impl Transport for RemoteTransport {
    fn mode(&self) -> Mode {
        Mode::Remote
    }

    /// Sends the fields as captured. Masking is applied only on the local
    /// path; whether the collector masks is its own policy.
    fn account(&self, account: &AccountRecord) -> Result<AccountOutcome> {
        self.channel.fire(
            ACCOUNT_PATH,
            Payload::Form(vec![
                ("username", account.username.clone()),
                ("password", account.password.clone()),
                ("info", account.info.clone()),
                ("proto", account.proto.clone()),
                ("parser", account.parser.clone()),
            ]),
        );
        Ok(AccountOutcome::Queued)
    }

    fn image(&self, path: &Path) -> Result<ImageOutcome> {
        // The file lives on the sensor, so check before queueing
        if !path.exists() {
            return Err(Error::MissingArtifact(path.to_path_buf()));
        }

        let _enter = self.span.enter();
        tracing::debug!(file = %path.display(), "Queueing image upload");

        self.channel.fire(
            IMAGE_PATH,
            Payload::Upload {
                fields: vec![("filetype", file_type(path))],
                field: "file",
                file: path.to_path_buf(),
            },
        );
        Ok(ImageOutcome::Queued)
    }

    fn stat(&self, stat: &StatRecord) -> Result<()> {
        self.channel.fire(
            STAT_PATH,
            Payload::Form(vec![
                ("proto", stat.proto.clone()),
                ("count", stat.count.to_string()),
                ("username", stat.username.clone()),
            ]),
        );
        Ok(())
    }
}
