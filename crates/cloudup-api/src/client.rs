//! reqwest implementation of the storage backend.

use futures::TryStreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use cloudup_core::BackendError;
use cloudup_ops::{ProgressReporter, StorageBackend, TransferSignal, UploadRequest};

use crate::config::ClientConfig;

#[derive(Debug, Deserialize)]
struct ExistsResponse {
    exists: bool,
}

/// Storage backend speaking the server's REST API.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    server_url: String,
    auth_token: Option<String>,
}

impl HttpBackend {
    /// Build a backend from client settings.
    pub fn new(config: &ClientConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .user_agent(config.user_agent())
            .build()
            .map_err(|e| BackendError::Connection(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            server_url: config.server_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        let request = self
            .client
            .request(method, format!("{}/{endpoint}", self.server_url));
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send_upload(
        &self,
        request: UploadRequest,
        progress: ProgressReporter,
    ) -> Result<(), BackendError> {
        let file = tokio::fs::File::open(&request.source)
            .await
            .map_err(|e| BackendError::Source {
                path: request.source.clone(),
                message: e.to_string(),
            })?;

        let mut sent = 0u64;
        let reporter = progress.clone();
        let stream = ReaderStream::new(file).inspect_ok(move |chunk| {
            sent += chunk.len() as u64;
            reporter.report(sent);
        });

        let part = Part::stream_with_length(Body::wrap_stream(stream), request.size)
            .file_name(request.file_name.clone())
            .mime_str("application/octet-stream")
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        let mut form = Form::new()
            .part("file", part)
            .text("path", request.folder_path.clone());
        if let Some(action) = request.conflict_action {
            form = form.text("conflictAction", action.as_str());
        }
        if let Some(name) = request.custom_name.clone() {
            form = form.text("customName", name);
        }

        let response = self
            .request(Method::POST, "files/upload")
            .multipart(form)
            .send()
            .await
            .map_err(connection_error)?;
        check_status(response).await?;

        progress.report(request.size);
        tracing::debug!(
            file = %request.file_name,
            folder = %request.folder_path,
            bytes = request.size,
            "file uploaded"
        );
        Ok(())
    }
}

impl StorageBackend for HttpBackend {
    async fn folder_exists(&self, name: &str, parent_path: &str) -> Result<bool, BackendError> {
        let response = self
            .request(Method::GET, "folders/check-exists")
            .query(&[("name", name), ("parentPath", parent_path)])
            .send()
            .await
            .map_err(connection_error)?;
        let body: ExistsResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        tracing::debug!(name, parent_path, exists = body.exists, "folder existence checked");
        Ok(body.exists)
    }

    async fn upload_file(
        &self,
        request: UploadRequest,
        progress: ProgressReporter,
        signal: TransferSignal,
    ) -> Result<(), BackendError> {
        if signal.is_aborted() {
            return Err(BackendError::Cancelled);
        }
        let file_name = request.file_name.clone();

        // Dropping the request future closes the connection.
        tokio::select! {
            biased;
            _ = signal.aborted() => {
                tracing::debug!(file = %file_name, "upload aborted");
                Err(BackendError::Cancelled)
            }
            result = self.send_upload(request, progress) => result,
        }
    }
}

fn connection_error(err: reqwest::Error) -> BackendError {
    BackendError::Connection(err.to_string())
}

/// Turn a non-2xx response into [`BackendError::Status`].
async fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
        body.trim().to_string()
    };
    Err(BackendError::Status {
        status: status.as_u16(),
        message,
    })
}
