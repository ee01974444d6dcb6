//! HTTP transport
//!
//! [`Transport`] implementation against the remote library server's REST
//! API. Owns the error classification the engine depends on: anything
//! that never produced an HTTP status (connect failure, timeout, broken
//! body) is a network-class error, a 404 is a definitive not-found, any
//! other non-success status is a definitive remote failure.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::config::Config;
use crate::sync::transport::{
    NoteMetadata, ProgressUpdate, RemoteDocument, RemoteNote, Transport, TransportError,
    TransportResult, UploadMeta,
};

/// Request timeout in seconds
const REQUEST_TIMEOUT: u64 = 30;

/// REST client for the remote library server
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedResponse {
    #[serde(default)]
    id: Option<String>,
}

impl HttpTransport {
    pub fn new(base_url: &str, api_token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT))
            .user_agent(concat!("tome/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        })
    }

    /// Build a transport from configuration; requires a server URL
    pub fn from_config(config: &Config) -> Result<Self> {
        let url = config
            .server_url
            .as_deref()
            .context("No server URL configured; set server_url or TOME_SERVER_URL")?;
        Self::new(url, config.api_token.clone())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> TransportResult<Response> {
        let response = builder.send().await.map_err(classify)?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(TransportError::NotFound),
            status if !status.is_success() => {
                Err(TransportError::Remote(format!("HTTP {}", status)))
            }
            _ => Ok(response),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> TransportResult<T> {
        let builder = self.authorize(self.client.get(self.endpoint(path)).query(query));
        let response = self.send(builder).await?;
        response.json().await.map_err(classify)
    }
}

/// Failures with no HTTP status are transient; the engine may conclude
/// nothing from them
fn classify(e: reqwest::Error) -> TransportError {
    TransportError::Network(e.to_string())
}

fn since_query(since: Option<DateTime<Utc>>) -> Vec<(&'static str, String)> {
    since
        .map(|s| vec![("since", s.to_rfc3339())])
        .unwrap_or_default()
}

#[async_trait]
impl Transport for HttpTransport {
    async fn search_by_title(&self, query: &str) -> TransportResult<Option<RemoteDocument>> {
        debug!(query, "searching remote documents");
        let matches: Vec<RemoteDocument> = self
            .get_json("/api/documents", &[("title", query.to_string())])
            .await?;
        Ok(matches.into_iter().next())
    }

    async fn upload_document(&self, bytes: &[u8], meta: &UploadMeta) -> TransportResult<String> {
        debug!(title = meta.title, size = bytes.len(), "uploading document");
        let file = Part::bytes(bytes.to_vec()).file_name(meta.filename.clone());
        let mut form = Form::new()
            .part("file", file)
            .text("title", meta.title.clone())
            .text("author", meta.author.clone())
            .text("origin", meta.origin_tag.clone());
        if let Some(total_pages) = meta.total_pages {
            form = form.text("total_pages", total_pages.to_string());
        }

        let builder = self.authorize(self.client.post(self.endpoint("/api/documents")));
        let response = self.send(builder.multipart(form)).await?;
        let created: CreatedResponse = response.json().await.map_err(classify)?;
        Ok(created.id.unwrap_or_default())
    }

    async fn get_document(&self, id: &str) -> TransportResult<RemoteDocument> {
        self.get_json(&format!("/api/documents/{}", id), &[]).await
    }

    async fn list_documents(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> TransportResult<Vec<RemoteDocument>> {
        self.get_json("/api/documents", &since_query(since)).await
    }

    async fn download_file(&self, id: &str) -> TransportResult<Vec<u8>> {
        let builder = self.authorize(
            self.client
                .get(self.endpoint(&format!("/api/documents/{}/file", id))),
        );
        let response = self.send(builder).await?;
        let bytes = response.bytes().await.map_err(classify)?;
        Ok(bytes.to_vec())
    }

    async fn update_progress(&self, update: &ProgressUpdate) -> TransportResult<()> {
        debug!(
            document_id = update.document_id,
            page = update.current_page,
            "pushing progress"
        );
        let body = serde_json::json!({
            "current_page": update.current_page,
            "status": update.status,
        });
        let builder = self.authorize(
            self.client
                .patch(self.endpoint(&format!("/api/documents/{}/progress", update.document_id)))
                .json(&body),
        );
        self.send(builder).await?;
        Ok(())
    }

    async fn create_note(&self, document_id: &str, content: &str) -> TransportResult<String> {
        let body = serde_json::json!({ "content": content });
        let builder = self.authorize(
            self.client
                .post(self.endpoint(&format!("/api/documents/{}/notes", document_id)))
                .json(&body),
        );
        let response = self.send(builder).await?;
        let created: CreatedResponse = response.json().await.map_err(classify)?;
        Ok(created.id.unwrap_or_default())
    }

    async fn update_note(&self, id: &str, metadata: &NoteMetadata) -> TransportResult<()> {
        let body = serde_json::json!({ "metadata": metadata });
        let builder = self.authorize(
            self.client
                .patch(self.endpoint(&format!("/api/notes/{}", id)))
                .json(&body),
        );
        self.send(builder).await?;
        Ok(())
    }

    async fn list_notes(
        &self,
        document_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> TransportResult<Vec<RemoteNote>> {
        self.get_json(
            &format!("/api/documents/{}/notes", document_id),
            &since_query(since),
        )
        .await
    }

    async fn health_check(&self) -> TransportResult<bool> {
        let builder = self.authorize(self.client.get(self.endpoint("/api/health")));
        match self.send(builder).await {
            Ok(_) => Ok(true),
            Err(TransportError::Network(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_cleanly() {
        let t = HttpTransport::new("http://localhost:9000/", None).unwrap();
        assert_eq!(t.endpoint("/api/documents"), "http://localhost:9000/api/documents");
        assert_eq!(t.endpoint("api/health"), "http://localhost:9000/api/health");
    }

    #[test]
    fn test_from_config_requires_server_url() {
        let config = Config {
            data_dir: std::path::PathBuf::from("/tmp"),
            server_url: None,
            api_token: None,
            sync_enabled: true,
            debounce_ms: 2000,
            poll_interval_secs: 300,
        };
        assert!(HttpTransport::from_config(&config).is_err());
    }

    #[test]
    fn test_since_query_shape() {
        assert!(since_query(None).is_empty());
        let q = since_query(Some(Utc::now()));
        assert_eq!(q.len(), 1);
        assert_eq!(q[0].0, "since");
    }
}
