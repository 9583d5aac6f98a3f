// File download over a preferred or a fallback transport.

use crate::error::{OperationError, ValidationError};
use crate::settings::ModuleSettings;
use anyhow::anyhow;
use async_trait::async_trait;
use futures::StreamExt;
use recipe_sdk::{HttpClientSettings, HttpUtil, TraceLevel, TraceWriter, UrlUtil};
use reqwest::{Client, StatusCode};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use url::Url;

/// Bytes between two progress lines.
const PROGRESS_STEP: u64 = 1024 * 1024;

/// A validated download: where from and where to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    source: Url,
    destination: PathBuf,
}

impl TransferRequest {
    /// Fails when `source_url` does not parse as a URL with a scheme.
    pub fn new(source_url: &str, destination: impl Into<PathBuf>) -> Result<Self, ValidationError> {
        let source = UrlUtil::parse_with_scheme(source_url).ok_or_else(|| {
            ValidationError::InvalidArgument(format!("The URL \"{source_url}\" is not valid."))
        })?;
        Ok(Self {
            source,
            destination: destination.into(),
        })
    }

    pub fn source(&self) -> &Url {
        &self.source
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// The source without credentials, for messages.
    fn display_source(&self) -> String {
        UrlUtil::without_credentials(&self.source).to_string()
    }

    fn transport_error(&self, cause: impl Into<anyhow::Error>) -> OperationError {
        OperationError::Transport {
            url: self.display_source(),
            cause: cause.into(),
        }
    }
}

/// Cumulative progress of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub transferred: u64,
    /// Announced body length, when the source told us.
    pub total: Option<u64>,
}

pub type ProgressSink<'a> = &'a (dyn Fn(TransferProgress) + Send + Sync);

/// One mechanism for fetching a resource into a local file.
///
/// Implementations write into a temporary file next to the destination and
/// only move it into place once the whole body arrived, so a failed transfer
/// never leaves a partial destination behind.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this transport can serve `url` in the current runtime.
    fn is_available(&self, url: &Url) -> bool;

    /// Fetch the resource, returning the number of bytes written.
    async fn transfer(
        &self,
        request: &TransferRequest,
        progress: ProgressSink<'_>,
    ) -> Result<u64, OperationError>;
}

/// Streaming HTTP(S) transport: follows redirects and reports progress per
/// received chunk.
pub struct HttpClientTransport {
    client: Option<Client>,
}

impl HttpClientTransport {
    pub fn new(settings: &HttpClientSettings) -> Self {
        let client = match HttpUtil::create_http_client(settings) {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!("HTTP client unavailable, downloads use the fallback transport: {e}");
                None
            }
        };
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpClientTransport {
    fn name(&self) -> &'static str {
        "http-client"
    }

    fn is_available(&self, url: &Url) -> bool {
        self.client.is_some() && UrlUtil::is_http(url)
    }

    async fn transfer(
        &self,
        request: &TransferRequest,
        progress: ProgressSink<'_>,
    ) -> Result<u64, OperationError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| request.transport_error(anyhow!("the HTTP client could not be built")))?;

        let response = client
            .get(request.source().clone())
            .send()
            .await
            .map_err(|e| request.transport_error(e))?;
        ensure_ok(request, response.status())?;

        let total = response.content_length();
        let mut partial = PartialDownload::create(request.destination())?;
        let mut transferred = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| request.transport_error(e))?;
            partial.write(&chunk).await?;
            transferred += chunk.len() as u64;
            progress(TransferProgress { transferred, total });
        }

        partial.commit().await?;
        Ok(transferred)
    }
}

/// Sequential read-then-write transport without progress. Serves `file://`
/// sources from disk and HTTP(S) sources chunk by chunk.
pub struct StreamTransport {
    client: Option<Client>,
}

impl StreamTransport {
    /// Uses the same client policy (timeouts, TLS, user agent) as the
    /// preferred transport.
    pub fn new(settings: &HttpClientSettings) -> Self {
        let client = match HttpUtil::create_http_client(settings) {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!("HTTP client unavailable, only file:// downloads are possible: {e}");
                None
            }
        };
        Self { client }
    }

    async fn read_file(&self, request: &TransferRequest) -> Result<u64, OperationError> {
        let source = request
            .source()
            .to_file_path()
            .map_err(|()| request.transport_error(anyhow!("not a local file URL")))?;
        let mut reader = tokio::fs::File::open(&source)
            .await
            .map_err(|e| request.transport_error(e))?;

        let mut partial = PartialDownload::create(request.destination())?;
        let copied = tokio::io::copy(&mut reader, &mut partial.file)
            .await
            .map_err(|e| request.transport_error(e))?;
        partial.commit().await?;
        Ok(copied)
    }

    async fn read_http(&self, request: &TransferRequest) -> Result<u64, OperationError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| request.transport_error(anyhow!("no HTTP client available")))?;
        let response = client
            .get(request.source().clone())
            .send()
            .await
            .map_err(|e| request.transport_error(e))?;
        ensure_ok(request, response.status())?;

        let mut partial = PartialDownload::create(request.destination())?;
        let mut copied = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| request.transport_error(e))?;
            partial.write(&chunk).await?;
            copied += chunk.len() as u64;
        }
        partial.commit().await?;
        Ok(copied)
    }
}

#[async_trait]
impl Transport for StreamTransport {
    fn name(&self) -> &'static str {
        "stream"
    }

    fn is_available(&self, url: &Url) -> bool {
        UrlUtil::is_file(url) || (self.client.is_some() && UrlUtil::is_http(url))
    }

    async fn transfer(
        &self,
        request: &TransferRequest,
        _progress: ProgressSink<'_>,
    ) -> Result<u64, OperationError> {
        let url = request.source();
        if UrlUtil::is_file(url) {
            self.read_file(request).await
        } else if UrlUtil::is_http(url) {
            self.read_http(request).await
        } else {
            Err(request.transport_error(anyhow!("unsupported URL scheme '{}'", url.scheme())))
        }
    }
}

fn ensure_ok(request: &TransferRequest, status: StatusCode) -> Result<(), OperationError> {
    if status == StatusCode::OK {
        Ok(())
    } else {
        Err(OperationError::HttpStatus {
            url: request.display_source(),
            status: status.as_u16(),
        })
    }
}

/// Temporary file beside the destination. Deleted on drop unless committed.
struct PartialDownload {
    file: tokio::fs::File,
    path: TempPath,
    destination: PathBuf,
}

impl PartialDownload {
    fn create(destination: &Path) -> Result<Self, OperationError> {
        let dir = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let (file, path) = tempfile::Builder::new()
            .prefix(".download-")
            .tempfile_in(dir)
            .map_err(|e| write_error(destination, e))?
            .into_parts();
        Ok(Self {
            file: tokio::fs::File::from_std(file),
            path,
            destination: destination.to_path_buf(),
        })
    }

    async fn write(&mut self, chunk: &[u8]) -> Result<(), OperationError> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| write_error(&self.destination, e))
    }

    async fn commit(self) -> Result<(), OperationError> {
        let Self {
            mut file,
            path,
            destination,
        } = self;
        file.flush()
            .await
            .map_err(|e| write_error(&destination, e))?;
        file.sync_all()
            .await
            .map_err(|e| write_error(&destination, e))?;
        drop(file);
        path.persist(&destination)
            .map_err(|e| write_error(&destination, e))?;
        Ok(())
    }
}

fn write_error(destination: &Path, cause: impl Into<anyhow::Error>) -> OperationError {
    OperationError::Write {
        path: destination.to_path_buf(),
        cause: cause.into(),
    }
}

/// Write to a download sink. A sink that panics loses the message, the
/// download carries on.
pub(crate) fn write_guarded(trace: &dyn TraceWriter, level: TraceLevel, message: &str) {
    if catch_unwind(AssertUnwindSafe(|| trace.write(level, message))).is_err() {
        tracing::debug!("Trace sink panicked while writing a download message");
    }
}

/// Nothing reported yet.
const NOT_REPORTED: u64 = u64::MAX;

/// Turns cumulative progress into throttled trace lines.
struct ProgressReporter<'a> {
    trace: &'a dyn TraceWriter,
    next_report: AtomicU64,
    last_reported: AtomicU64,
}

impl<'a> ProgressReporter<'a> {
    fn new(trace: &'a dyn TraceWriter) -> Self {
        Self {
            trace,
            next_report: AtomicU64::new(0),
            last_reported: AtomicU64::new(NOT_REPORTED),
        }
    }

    fn report(&self, progress: TransferProgress) {
        let complete = progress.total == Some(progress.transferred);
        if !complete && progress.transferred < self.next_report.load(Ordering::Relaxed) {
            return;
        }
        self.next_report.store(
            (progress.transferred / PROGRESS_STEP + 1) * PROGRESS_STEP,
            Ordering::Relaxed,
        );

        let total = progress
            .total
            .map_or_else(|| "?".to_string(), |total| total.to_string());
        self.emit(progress.transferred, &total);
    }

    /// Close a reported transfer with a `done/done` line, unless the last
    /// chunk was already reported.
    fn finish(&self, transferred: u64) {
        let last = self.last_reported.load(Ordering::Relaxed);
        if last != NOT_REPORTED && last != transferred {
            self.emit(transferred, &transferred.to_string());
        }
    }

    fn emit(&self, transferred: u64, total: &str) {
        self.last_reported.store(transferred, Ordering::Relaxed);
        write_guarded(
            self.trace,
            TraceLevel::Info,
            &format!("Downloading {transferred}/{total}"),
        );
    }
}

/// Chooses a transport once per download and runs it.
pub struct FileTransfer {
    preferred: Option<Box<dyn Transport>>,
    fallback: Box<dyn Transport>,
    trace: Arc<dyn TraceWriter>,
}

impl FileTransfer {
    pub fn new(settings: &ModuleSettings, trace: Arc<dyn TraceWriter>) -> Self {
        let preferred: Option<Box<dyn Transport>> = if settings.enable_http_client {
            Some(Box::new(HttpClientTransport::new(&settings.http)))
        } else {
            None
        };
        Self::with_transports(preferred, Box::new(StreamTransport::new(&settings.http)), trace)
    }

    pub fn with_transports(
        preferred: Option<Box<dyn Transport>>,
        fallback: Box<dyn Transport>,
        trace: Arc<dyn TraceWriter>,
    ) -> Self {
        Self {
            preferred,
            fallback,
            trace,
        }
    }

    /// The preferred transport when it is enabled and can serve `url`,
    /// otherwise the fallback.
    pub fn select(&self, url: &Url) -> &dyn Transport {
        match &self.preferred {
            Some(preferred) if preferred.is_available(url) => preferred.as_ref(),
            _ => self.fallback.as_ref(),
        }
    }

    /// Exactly one attempt on exactly one transport.
    pub async fn download(&self, request: &TransferRequest) -> Result<u64, OperationError> {
        let transport = self.select(request.source());
        write_guarded(
            self.trace.as_ref(),
            TraceLevel::Verbose,
            &format!(
                "Using the {} transport for {}",
                transport.name(),
                request.display_source()
            ),
        );

        let reporter = ProgressReporter::new(self.trace.as_ref());
        let sink = |progress: TransferProgress| reporter.report(progress);
        let transferred = transport.transfer(request, &sink).await?;
        reporter.finish(transferred);
        Ok(transferred)
    }
}
