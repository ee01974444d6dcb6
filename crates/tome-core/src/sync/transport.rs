//! Remote transport contract
//!
//! The reconciliation engine talks to the remote store only through this
//! trait. Implementations own wire formats and authentication; the engine
//! never inspects them. The error taxonomy is the part the engine relies
//! on: a network-class failure draws no conclusion (nothing is mutated, no
//! cursor advances), while a definitive not-found invalidates identity.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{AnnotationKind, ReadingStatus};

/// Errors a transport call can report
#[derive(Error, Debug)]
pub enum TransportError {
    /// Transient network failure: retry on a later pass, conclude nothing
    #[error("Network error: {0}")]
    Network(String),

    /// The remote entity definitively does not exist
    #[error("Remote entity not found")]
    NotFound,

    /// Definitive remote failure that is not a missing entity
    #[error("Remote error: {0}")]
    Remote(String),
}

impl TransportError {
    /// Whether this failure is transient (no state may be mutated)
    pub fn is_network(&self) -> bool {
        matches!(self, TransportError::Network(_))
    }
}

/// Result type for transport calls
pub type TransportResult<T> = Result<T, TransportError>;

/// A document as the remote store describes it
///
/// Remote pages are 0-based, unlike local books.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteDocument {
    pub id: String,
    pub title: String,
    pub author: String,
    /// MIME type or extension hint
    pub format: Option<String>,
    /// Current page, 0-based
    pub current_page: u32,
    pub total_pages: u32,
    pub status: ReadingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A note as the remote store describes it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteNote {
    pub id: String,
    pub document_id: String,
    pub content: String,
    /// Structured metadata attached after creation; absent for notes that
    /// were never tagged by a replica
    pub metadata: Option<NoteMetadata>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Structured metadata carried on a remote note
///
/// `origin_id` is the discriminator between notes some replica created
/// (and therefore owns an identity for) and foreign notes created outside
/// any replica.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NoteMetadata {
    /// The local annotation id of the replica that created the note
    pub origin_id: Option<Uuid>,
    /// Logical write time of the originating replica
    pub updated_at: Option<DateTime<Utc>>,
    /// Soft delete marker; value is the time of deletion
    pub deleted_at: Option<DateTime<Utc>>,
    pub anchor: Option<String>,
    pub color: Option<String>,
    pub kind: Option<AnnotationKind>,
    /// Free-text note attached to the annotation
    pub note: Option<String>,
}

/// Metadata accompanying a document upload
#[derive(Debug, Clone, PartialEq)]
pub struct UploadMeta {
    pub title: String,
    pub author: String,
    pub total_pages: Option<u32>,
    pub filename: String,
    /// Identifies which application wrote the document
    pub origin_tag: String,
}

/// A progress update pushed to the remote store
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub document_id: String,
    /// Current page, 0-based
    pub current_page: u32,
    pub status: Option<ReadingStatus>,
}

/// Network boundary of the reconciliation engine
///
/// Every method must be safe to call repeatedly; the engine relies on
/// retrying failed passes.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Look up a document by title; `None` means definitively absent
    async fn search_by_title(&self, query: &str) -> TransportResult<Option<RemoteDocument>>;

    /// Upload a document; callers guard against empty payloads
    async fn upload_document(&self, bytes: &[u8], meta: &UploadMeta) -> TransportResult<String>;

    /// Fetch one document snapshot
    async fn get_document(&self, id: &str) -> TransportResult<RemoteDocument>;

    /// List documents changed at or after `since`
    async fn list_documents(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> TransportResult<Vec<RemoteDocument>>;

    /// Download a document's file content
    async fn download_file(&self, id: &str) -> TransportResult<Vec<u8>>;

    /// Push a reading-position update
    async fn update_progress(&self, update: &ProgressUpdate) -> TransportResult<()>;

    /// Create a note with content only; metadata is attached separately
    async fn create_note(&self, document_id: &str, content: &str) -> TransportResult<String>;

    /// Attach structured metadata to an existing note
    async fn update_note(&self, id: &str, metadata: &NoteMetadata) -> TransportResult<()>;

    /// List a document's notes changed at or after `since`
    async fn list_notes(
        &self,
        document_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> TransportResult<Vec<RemoteNote>>;

    /// Whether the remote store is reachable
    async fn health_check(&self) -> TransportResult<bool>;
}
