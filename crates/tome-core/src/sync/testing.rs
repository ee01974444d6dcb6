//! Scripted in-memory transport for engine tests

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::ReadingStatus;
use crate::sync::identity::normalize;
use crate::sync::transport::{
    NoteMetadata, ProgressUpdate, RemoteDocument, RemoteNote, Transport, TransportError,
    TransportResult, UploadMeta,
};

/// In-memory [`Transport`] with scripted failures and a call log
#[derive(Default)]
pub struct MockTransport {
    pub documents: Mutex<Vec<RemoteDocument>>,
    pub notes: Mutex<Vec<RemoteNote>>,
    pub files: Mutex<HashMap<String, Vec<u8>>>,

    /// Method names that should fail with a network-class error
    pub fail_network: Mutex<HashSet<&'static str>>,
    /// Document ids whose file download fails with a network-class error
    pub fail_download_for: Mutex<HashSet<String>>,
    /// Document ids whose note listing reports the document as gone
    pub notes_gone_for: Mutex<HashSet<String>>,
    /// Note ids whose metadata attach fails with a definitive error
    pub fail_metadata_for: Mutex<HashSet<String>>,
    /// Make note creation succeed but deliver no usable id
    pub create_note_returns_empty_id: Mutex<bool>,

    // Call log
    pub uploads: Mutex<Vec<UploadMeta>>,
    pub progress_updates: Mutex<Vec<ProgressUpdate>>,
    pub created_notes: Mutex<Vec<(String, String)>>,
    pub metadata_updates: Mutex<Vec<(String, NoteMetadata)>>,
    pub searches: Mutex<Vec<String>>,

    next_id: Mutex<u32>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with_network(&self, method: &'static str) {
        self.fail_network.lock().unwrap().insert(method);
    }

    pub fn add_document(&self, doc: RemoteDocument) {
        self.documents.lock().unwrap().push(doc);
    }

    pub fn add_note(&self, note: RemoteNote) {
        self.notes.lock().unwrap().push(note);
    }

    pub fn set_file(&self, id: &str, bytes: &[u8]) {
        self.files.lock().unwrap().insert(id.to_string(), bytes.to_vec());
    }

    fn check(&self, method: &'static str) -> TransportResult<()> {
        if self.fail_network.lock().unwrap().contains(method) {
            return Err(TransportError::Network(format!("{} unavailable", method)));
        }
        Ok(())
    }

    fn fresh_id(&self, prefix: &str) -> String {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        format!("{}-{}", prefix, next)
    }
}

/// Build a remote document snapshot for tests
pub fn remote_document(id: &str, title: &str, author: &str) -> RemoteDocument {
    RemoteDocument {
        id: id.to_string(),
        title: title.to_string(),
        author: author.to_string(),
        format: Some("epub".to_string()),
        current_page: 0,
        total_pages: 0,
        status: ReadingStatus::Unread,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// Build a remote note snapshot for tests
pub fn remote_note(id: &str, document_id: &str, content: &str) -> RemoteNote {
    RemoteNote {
        id: id.to_string(),
        document_id: document_id.to_string(),
        content: content.to_string(),
        metadata: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn search_by_title(&self, query: &str) -> TransportResult<Option<RemoteDocument>> {
        self.check("search_by_title")?;
        self.searches.lock().unwrap().push(query.to_string());
        let documents = self.documents.lock().unwrap();
        Ok(documents
            .iter()
            .find(|d| normalize(&d.title) == normalize(query))
            .cloned())
    }

    async fn upload_document(&self, bytes: &[u8], meta: &UploadMeta) -> TransportResult<String> {
        self.check("upload_document")?;
        let id = self.fresh_id("doc");
        self.files.lock().unwrap().insert(id.clone(), bytes.to_vec());
        let mut doc = remote_document(&id, &meta.title, &meta.author);
        doc.total_pages = meta.total_pages.unwrap_or(0);
        self.documents.lock().unwrap().push(doc);
        self.uploads.lock().unwrap().push(meta.clone());
        Ok(id)
    }

    async fn get_document(&self, id: &str) -> TransportResult<RemoteDocument> {
        self.check("get_document")?;
        self.documents
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or(TransportError::NotFound)
    }

    async fn list_documents(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> TransportResult<Vec<RemoteDocument>> {
        self.check("list_documents")?;
        let documents = self.documents.lock().unwrap();
        Ok(documents
            .iter()
            .filter(|d| since.map_or(true, |s| d.updated_at > s))
            .cloned()
            .collect())
    }

    async fn download_file(&self, id: &str) -> TransportResult<Vec<u8>> {
        self.check("download_file")?;
        if self.fail_download_for.lock().unwrap().contains(id) {
            return Err(TransportError::Network("download failed".to_string()));
        }
        self.files
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or(TransportError::NotFound)
    }

    async fn update_progress(&self, update: &ProgressUpdate) -> TransportResult<()> {
        self.check("update_progress")?;
        self.progress_updates.lock().unwrap().push(update.clone());
        Ok(())
    }

    async fn create_note(&self, document_id: &str, content: &str) -> TransportResult<String> {
        self.check("create_note")?;
        if *self.create_note_returns_empty_id.lock().unwrap() {
            self.created_notes
                .lock()
                .unwrap()
                .push((document_id.to_string(), content.to_string()));
            return Ok(String::new());
        }
        let id = self.fresh_id("note");
        self.notes
            .lock()
            .unwrap()
            .push(remote_note(&id, document_id, content));
        self.created_notes
            .lock()
            .unwrap()
            .push((document_id.to_string(), content.to_string()));
        Ok(id)
    }

    async fn update_note(&self, id: &str, metadata: &NoteMetadata) -> TransportResult<()> {
        self.check("update_note")?;
        if self.fail_metadata_for.lock().unwrap().contains(id) {
            return Err(TransportError::Remote("metadata rejected".to_string()));
        }
        let mut notes = self.notes.lock().unwrap();
        let note = notes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or(TransportError::NotFound)?;
        note.metadata = Some(metadata.clone());
        self.metadata_updates
            .lock()
            .unwrap()
            .push((id.to_string(), metadata.clone()));
        Ok(())
    }

    async fn list_notes(
        &self,
        document_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> TransportResult<Vec<RemoteNote>> {
        self.check("list_notes")?;
        if self.notes_gone_for.lock().unwrap().contains(document_id) {
            return Err(TransportError::NotFound);
        }
        let notes = self.notes.lock().unwrap();
        Ok(notes
            .iter()
            .filter(|n| n.document_id == document_id)
            .filter(|n| since.map_or(true, |s| n.updated_at > s))
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> TransportResult<bool> {
        self.check("health_check")?;
        Ok(true)
    }
}
