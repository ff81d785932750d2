//! Async HTTP channel to the collector
//!
//! Every request runs on a private tokio runtime and must hold one of
//! `workers` semaphore permits while it talks to the collector, so at most
//! `workers` requests are in flight and the rest wait their turn. Callers get
//! a [`PendingRequest`] back immediately and decide whether to block on it
//! ([`PendingRequest::wait`]) or let it run unobserved
//! ([`PendingRequest::detach`]). Failures are logged here either way.
//!
//! The blocking helpers must be called from synchronous code; calling them
//! from inside another tokio runtime panics. Dropping a channel from async
//! code is allowed but skips the drain.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, Span};

use crate::config::TransportConfig;
use crate::error::{Error, Result};
use crate::types::SensorIdentity;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Body of a collector request
#[derive(Debug, Clone)]
pub enum Payload {
    /// `application/x-www-form-urlencoded` fields
    Form(Vec<(&'static str, String)>),
    /// Multipart form: text fields plus one file read from disk by the worker
    Upload {
        fields: Vec<(&'static str, String)>,
        field: &'static str,
        file: PathBuf,
    },
}

/// A successful collector response
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Reply {
    /// Parse the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Handle to a request running on the channel's worker pool
pub struct PendingRequest {
    path: &'static str,
    handle: JoinHandle<Result<Reply>>,
    runtime: Handle,
}

impl PendingRequest {
    /// Block the calling thread until the collector answers
    pub fn wait(self) -> Result<Reply> {
        let path = self.path;
        self.runtime
            .block_on(self.handle)
            .map_err(|e| Error::Transport(format!("request to {} aborted: {}", path, e)))?
    }

    /// Let the request finish on its own; the outcome only shows up in logs
    pub fn detach(self) {}

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// HTTP channel bound to one collector endpoint
pub struct Channel {
    base_url: String,
    http: reqwest::Client,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    handle: Handle,
    runtime: Option<Runtime>,
    max_retries: usize,
    drain_timeout: Duration,
    span: Span,
}

impl Channel {
    /// Create a channel for the collector named by `identity`
    pub fn new(identity: &SensorIdentity, config: &TransportConfig, span: Span) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("sensorlink-http")
            .enable_all()
            .build()
            .map_err(|e| Error::Transport(format!("failed to create runtime: {}", e)))?;

        // The cookie store carries the session established by login
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .cookie_store(true)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: identity.base_url(),
            http,
            permits: Arc::new(Semaphore::new(config.workers.max(1))),
            tracker: TaskTracker::new(),
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
            max_retries: config.max_retries,
            drain_timeout: Duration::from_secs(config.drain_timeout_secs),
            span,
        })
    }

    /// Full URL for a collector path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Queue a request on the worker pool.
    ///
    /// `retries` bounds how many extra attempts a transient failure gets.
    pub fn submit(&self, path: &'static str, payload: Payload, retries: usize) -> PendingRequest {
        let http = self.http.clone();
        let url = self.url(path);
        let permits = Arc::clone(&self.permits);

        let task = async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| Error::Transport("worker pool closed".to_string()))?;

            tracing::debug!(url = %url, "CLIENT request");
            let result = send_with_retry(&http, &url, path, &payload, retries).await;
            if let Err(e) = &result {
                log_failure(path, &payload, e);
            }
            result
        }
        .instrument(self.span.clone());

        PendingRequest {
            path,
            handle: self.tracker.spawn_on(task, &self.handle),
            runtime: self.handle.clone(),
        }
    }

    /// Blocking request with the configured retry budget
    pub fn call(&self, path: &'static str, payload: Payload) -> Result<Reply> {
        self.submit(path, payload, self.max_retries).wait()
    }

    /// Single-attempt request whose result nobody waits for
    pub fn fire(&self, path: &'static str, payload: Payload) {
        self.submit(path, payload, 0).detach();
    }

    /// Requests queued or running right now
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait up to `grace` for every queued request to finish.
    ///
    /// Returns false if requests were still running when time ran out.
    pub fn drain(&self, grace: Duration) -> bool {
        if self.tracker.is_empty() {
            return true;
        }

        self.tracker.close();
        let tracker = self.tracker.clone();
        let drained = self.handle.block_on(async move {
            tokio::time::timeout(grace, tracker.wait()).await.is_ok()
        });
        self.tracker.reopen();
        drained
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        // Blocking on the drain would panic inside another runtime
        if Handle::try_current().is_ok() {
            if !self.tracker.is_empty() {
                let _enter = self.span.enter();
                tracing::warn!(
                    pending = self.tracker.len(),
                    "Channel dropped inside an async context, not waiting for collector requests"
                );
            }
        } else if !self.drain(self.drain_timeout) {
            let _enter = self.span.enter();
            tracing::warn!(
                pending = self.tracker.len(),
                "Dropping collector requests still in flight"
            );
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

async fn send_with_retry(
    http: &reqwest::Client,
    url: &str,
    path: &str,
    payload: &Payload,
    retries: usize,
) -> Result<Reply> {
    let mut delay = INITIAL_BACKOFF;
    let mut attempt = 0;

    loop {
        match send_once(http, url, path, payload).await {
            Ok(reply) => return Ok(reply),
            Err(e) if attempt < retries && e.is_retryable() => {
                attempt += 1;
                tracing::debug!(
                    path,
                    attempt,
                    max_attempts = retries + 1,
                    ?delay,
                    error = %e,
                    "Retrying collector request"
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, MAX_BACKOFF);
            }
            Err(e) => return Err(e),
        }
    }
}

async fn send_once(
    http: &reqwest::Client,
    url: &str,
    path: &str,
    payload: &Payload,
) -> Result<Reply> {
    let request = match payload {
        Payload::Form(fields) => http.post(url).form(fields),
        Payload::Upload {
            fields,
            field,
            file,
        } => {
            let data = tokio::fs::read(file).await?;
            let file_name = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            let mut form = Form::new();
            for (name, value) in fields {
                form = form.text(*name, value.clone());
            }
            form = form.part(*field, Part::bytes(data).file_name(file_name));
            http.post(url).multipart(form)
        }
    };

    let response = request.send().await.map_err(|e| Error::Http {
        url: url.to_string(),
        source: e,
    })?;

    let status = response.status();
    let body = response.bytes().await.map_err(|e| Error::Http {
        url: url.to_string(),
        source: e,
    })?;

    if !status.is_success() {
        return Err(Error::Collector {
            path: path.to_string(),
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        });
    }

    Ok(Reply {
        status: status.as_u16(),
        body: body.to_vec(),
    })
}

/// Uploads distinguish a file that vanished or can't be read from a
/// collector that can't be reached; both are dropped without retry.
fn log_failure(path: &str, payload: &Payload, error: &Error) {
    match (payload, error) {
        (Payload::Upload { file, .. }, Error::Io(e)) => {
            tracing::warn!(file = %file.display(), error = %e, "Upload skipped, file unreadable");
        }
        (Payload::Upload { file, .. }, _) => {
            let size_kb = std::fs::metadata(file).map(|m| m.len() / 1024).unwrap_or(0);
            tracing::error!(
                file = %file.display(),
                size_kb,
                error = %error,
                "Upload failed"
            );
        }
        (Payload::Form(_), _) => {
            tracing::warn!(path, error = %error, "Collector request failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(port: u16, ssl: bool) -> SensorIdentity {
        SensorIdentity {
            host: "127.0.0.1".to_string(),
            port,
            username: "sensor01".to_string(),
            anonymize: true,
            ssl,
        }
    }

    fn config() -> TransportConfig {
        TransportConfig {
            workers: 2,
            timeout_secs: 2,
            connect_timeout_secs: 1,
            max_retries: 0,
            drain_timeout_secs: 1,
        }
    }

    #[test]
    fn test_url_scheme_follows_ssl_flag() {
        let plain = Channel::new(&identity(8080, false), &config(), Span::none()).unwrap();
        assert_eq!(plain.url("/post/stat"), "http://127.0.0.1:8080/post/stat");

        let tls = Channel::new(&identity(8443, true), &config(), Span::none()).unwrap();
        assert_eq!(tls.url("/post/login"), "https://127.0.0.1:8443/post/login");
    }

    #[test]
    fn test_reply_json() {
        let reply = Reply {
            status: 200,
            body: br#"{"ftp": "running"}"#.to_vec(),
        };
        let value: serde_json::Value = reply.json().unwrap();
        assert_eq!(value["ftp"], "running");

        let garbage = Reply {
            status: 200,
            body: b"<html>".to_vec(),
        };
        assert!(matches!(
            garbage.json::<serde_json::Value>(),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_unreachable_collector_surfaces_on_wait() {
        // Nothing listens on the discard port
        let channel = Channel::new(&identity(9, false), &config(), Span::none()).unwrap();
        let result = channel.call("/post/services", Payload::Form(vec![]));
        assert!(matches!(result, Err(Error::Http { .. })));
    }

    #[test]
    fn test_drain_with_nothing_in_flight() {
        let channel = Channel::new(&identity(9, false), &config(), Span::none()).unwrap();
        assert_eq!(channel.in_flight(), 0);
        assert!(channel.drain(Duration::from_millis(10)));
    }

    #[test]
    fn test_drop_inside_async_context_skips_drain() {
        // Non-routable address keeps the connect attempt pending
        let unroutable = SensorIdentity {
            host: "10.255.255.1".to_string(),
            ..identity(80, false)
        };
        let channel = Channel::new(&unroutable, &config(), Span::none()).unwrap();
        channel.fire("/post/stat", Payload::Form(vec![("proto", "http".to_string())]));

        let outer = tokio::runtime::Runtime::new().unwrap();
        let dropped = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            outer.block_on(async move { drop(channel) })
        }));
        assert!(dropped.is_ok());
    }

    #[test]
    fn test_missing_upload_file_is_io_error() {
        let channel = Channel::new(&identity(9, false), &config(), Span::none()).unwrap();
        let result = channel
            .submit(
                "/post/image",
                Payload::Upload {
                    fields: vec![("filetype", "png".to_string())],
                    field: "file",
                    file: PathBuf::from("/nonexistent/capture.png"),
                },
                0,
            )
            .wait();
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
