mod stream;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use serde::Deserialize;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};
use url::Url;
use crate::config::Config;
use crate::core::{ImportError, ImportInitiator, Result, UploadResponse};

pub use stream::CountingStream;

/// Multipart field every file is sent under
pub const FILES_FIELD: &str = "files";

pub const ACCEPTED_EXTENSIONS: &[&str] = &["csv", "xlsx", "xls"];

/// Local checks run before any request: at least one file, every file a
/// spreadsheet by extension, every path an existing regular file.
pub async fn validate_files(files: &[PathBuf]) -> Result<()> {
    if files.is_empty() {
        return Err(ImportError::NoFiles);
    }

    for path in files {
        if spreadsheet_mime(path).is_none() {
            return Err(ImportError::UnsupportedFileType(path.display().to_string()));
        }

        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(ImportError::InvalidFile(format!("{} is not a file", path.display())));
        }
    }

    Ok(())
}

fn spreadsheet_mime(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "csv" => Some("text/csv"),
        "xlsx" => Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
        "xls" => Some("application/vnd.ms-excel"),
        _ => None,
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

/// Pulls a human readable reason out of a rejection body, if there is one.
fn rejection_message(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    parsed
        .message
        .or(parsed.error)
        .filter(|message| !message.trim().is_empty())
}

/// Sends the selected files to the import endpoint as one multipart request.
#[derive(Debug, Clone)]
pub struct HttpInitiator {
    client: Client,
    endpoint: Url,
    token: Option<String>,
}

impl HttpInitiator {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: Url::parse(endpoint)?,
            token: None,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let initiator = Self::new(&config.import_endpoint, config.request_timeout())?;
        Ok(match &config.token {
            Some(token) => initiator.with_token(token),
            None => initiator,
        })
    }

    /// Sent verbatim as the `Authorization` header.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn build_form(&self, files: &[PathBuf], sent: &Arc<AtomicU64>) -> Result<(Form, u64)> {
        let mut form = Form::new();
        let mut total_bytes = 0;

        for path in files {
            let file_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| ImportError::InvalidFile(format!("{} has no usable file name", path.display())))?
                .to_string();
            let mime = spreadsheet_mime(path)
                .ok_or_else(|| ImportError::UnsupportedFileType(path.display().to_string()))?;

            let file = File::open(path).await?;
            let length = file.metadata().await?.len();
            total_bytes += length;

            let stream = CountingStream::new(ReaderStream::new(file), sent.clone());
            let part = Part::stream_with_length(Body::wrap_stream(stream), length)
                .file_name(file_name)
                .mime_str(mime)?;

            debug!(file = %path.display(), length, "adding import file");
            form = form.part(FILES_FIELD, part);
        }

        Ok((form, total_bytes))
    }
}

#[async_trait]
impl ImportInitiator for HttpInitiator {
    async fn start_import(&self, files: &[PathBuf]) -> Result<UploadResponse> {
        validate_files(files).await?;

        let sent = Arc::new(AtomicU64::new(0));
        let (form, total_bytes) = self.build_form(files, &sent).await?;

        let mut request = self.client.post(self.endpoint.clone()).multipart(form);
        if let Some(token) = &self.token {
            request = request.header(
                AUTHORIZATION,
                HeaderValue::from_str(token)
                    .map_err(|err| ImportError::internal_error(format!("invalid token header: {}", err)))?,
            );
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = rejection_message(&body)
                .unwrap_or_else(|| format!("Upload failed with status {}", status));
            return Err(ImportError::server_error(status.as_u16(), message));
        }

        let accepted: UploadResponse = response.json().await?;
        if accepted.upload_id.as_str().trim().is_empty() {
            return Err(ImportError::InvalidResponse("empty uploadId".to_string()));
        }

        info!(
            upload_id = %accepted.upload_id,
            total = ?accepted.total,
            bytes = sent.load(Ordering::Relaxed),
            expected = total_bytes,
            "import upload accepted"
        );

        Ok(accepted)
    }
}
