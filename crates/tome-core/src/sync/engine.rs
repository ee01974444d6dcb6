//! Reconciliation engine
//!
//! Ties the store, a transport, and the scheduler together. The engine is
//! the only writer during a pass: the store sits behind a mutex and every
//! flight does its read-modify-write against the latest local snapshot.
//!
//! Callers report local edits through the `notify_*` methods and the
//! engine decides when the network is touched. Failures never propagate
//! out of scheduled passes; they are logged and the state simply does not
//! advance until a later pass succeeds.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use serde::Serialize;
use tokio::sync::{watch, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::models::Book;
use crate::storage::LibraryStore;
use crate::sync::cursor::{SyncKey, SyncScope};
use crate::sync::scheduler::Scheduler;
use crate::sync::transport::Transport;
use crate::sync::{library, notes, progress};

/// Direction of a manual pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncDirection {
    #[default]
    Both,
    PullOnly,
    PushOnly,
}

impl SyncDirection {
    fn pulls(self) -> bool {
        self != SyncDirection::PushOnly
    }

    fn pushes(self) -> bool {
        self != SyncDirection::PullOnly
    }
}

/// Counts accumulated over one manual pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub books_imported: usize,
    pub books_uploaded: usize,
    pub progress_applied: usize,
    pub progress_pushed: usize,
    pub notes_merged: usize,
    pub notes_pushed: usize,
    pub failures: usize,
}

/// Long-lived coordinator for reconciliation passes
pub struct SyncEngine {
    store: Mutex<LibraryStore>,
    transport: Arc<dyn Transport>,
    scheduler: std::sync::Mutex<Scheduler>,
    debounce: Duration,
    poll_interval: Duration,
}

impl SyncEngine {
    pub fn new(store: LibraryStore, transport: Arc<dyn Transport>, config: &Config) -> Self {
        let debounce = Duration::from_millis(config.debounce_ms);
        Self {
            store: Mutex::new(store),
            transport,
            scheduler: std::sync::Mutex::new(Scheduler::new(debounce)),
            debounce,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
        }
    }

    /// Lock the underlying store for direct reads
    pub async fn store(&self) -> MutexGuard<'_, LibraryStore> {
        self.store.lock().await
    }

    // ==================== Local edit notifications ====================

    /// A book's reading position changed locally
    pub fn notify_progress_changed(&self, book_id: &str) {
        self.record(SyncKey::progress(book_id));
    }

    /// A book's annotations changed locally
    pub fn notify_notes_changed(&self, book_id: &str) {
        self.record(SyncKey::notes(book_id));
    }

    /// The set of local books changed
    pub fn notify_library_changed(&self) {
        self.record(SyncKey::library());
    }

    fn record(&self, key: SyncKey) {
        self.scheduler.lock().unwrap().record_mutation(key, Instant::now());
    }

    // ==================== Passes ====================

    /// One-shot pull when a book is opened for reading
    ///
    /// Pulls remote progress and notes so the reader starts from the
    /// furthest known position. Skipped for keys already in flight.
    /// Returns the book as it stands after the merge.
    pub async fn on_book_opened(&self, book_id: &str) -> Result<Option<Book>> {
        let progress_key = SyncKey::progress(book_id);
        let notes_key = SyncKey::notes(book_id);
        let (pull_progress, pull_notes) = {
            let mut scheduler = self.scheduler.lock().unwrap();
            (
                scheduler.try_begin(progress_key.clone()),
                scheduler.try_begin(notes_key.clone()),
            )
        };

        let store = self.store.lock().await;
        if pull_progress {
            if let Err(e) = progress::pull_progress(&store, self.transport.as_ref(), book_id).await
            {
                warn!(book_id, "on-open progress pull failed: {e:#}");
            }
            self.scheduler.lock().unwrap().complete(&progress_key, Instant::now());
        }
        if pull_notes {
            if let Err(e) = notes::pull_notes(&store, self.transport.as_ref(), book_id).await {
                warn!(book_id, "on-open notes pull failed: {e:#}");
            }
            self.scheduler.lock().unwrap().complete(&notes_key, Instant::now());
        }

        Ok(store.get_book(book_id)?)
    }

    /// Run every pass whose debounce window has expired
    pub async fn tick(&self, now: Instant) {
        let due = self.scheduler.lock().unwrap().take_due(now);
        for key in due {
            debug!(%key, "running scheduled pass");
            self.run_key(&key).await;
            self.scheduler.lock().unwrap().complete(&key, Instant::now());
        }
    }

    /// Push pass for one key; failures are logged, never propagated
    async fn run_key(&self, key: &SyncKey) {
        let store = self.store.lock().await;
        let transport = self.transport.as_ref();
        let result = match (key.scope, key.book_id.as_deref()) {
            (SyncScope::Library, _) => library::push_library(&store, transport)
                .await
                .map(|_| ()),
            (SyncScope::Progress, Some(book_id)) => {
                progress::push_progress(&store, transport, book_id)
                    .await
                    .map(|_| ())
            }
            (SyncScope::Notes, Some(book_id)) => notes::push_notes(&store, transport, book_id)
                .await
                .map(|_| ()),
            _ => Ok(()),
        };
        if let Err(e) = result {
            warn!(%key, "scheduled pass failed: {e:#}");
        }
    }

    /// Periodic library pull, guarded like any other flight
    pub async fn poll_library(&self) {
        let key = SyncKey::library();
        if !self.scheduler.lock().unwrap().try_begin(key.clone()) {
            return;
        }
        let store = self.store.lock().await;
        if let Err(e) = library::pull_library(&store, self.transport.as_ref()).await {
            warn!("periodic library pull failed: {e:#}");
        }
        drop(store);
        self.scheduler.lock().unwrap().complete(&key, Instant::now());
    }

    /// Manual full pass: converge from the remote first, then publish
    ///
    /// With a book id, only that book's progress and notes move. Without
    /// one, library membership is reconciled too and every active book is
    /// visited. Per-item failures are counted, not fatal; the report says
    /// what actually moved.
    pub async fn sync_once(
        &self,
        book_id: Option<&str>,
        direction: SyncDirection,
    ) -> Result<SyncReport> {
        let store = self.store.lock().await;
        let transport = self.transport.as_ref();
        let mut report = SyncReport::default();

        if let Some(id) = book_id {
            if store.get_book(id)?.is_none() {
                bail!("No book with id {}", id);
            }
        }

        if direction.pulls() && book_id.is_none() {
            match library::pull_library(&store, transport).await {
                Ok(outcome) => {
                    report.books_imported += outcome.imported;
                    report.failures += outcome.skipped;
                }
                Err(e) => {
                    warn!("library pull failed: {e:#}");
                    report.failures += 1;
                }
            }
        }

        // Recomputed after the library pull so fresh imports are visited
        let targets: Vec<String> = match book_id {
            Some(id) => vec![id.to_string()],
            None => store.active_books()?.into_iter().map(|b| b.id).collect(),
        };

        if direction.pulls() {
            for id in &targets {
                match progress::pull_progress(&store, transport, id).await {
                    Ok(progress::ProgressPull::Applied { .. }) => report.progress_applied += 1,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(book_id = id, "progress pull failed: {e:#}");
                        report.failures += 1;
                    }
                }
                match notes::pull_notes(&store, transport, id).await {
                    Ok(notes::NotesPull::Merged(merged)) => {
                        report.notes_merged += merged.inserted + merged.updated + merged.deleted;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(book_id = id, "notes pull failed: {e:#}");
                        report.failures += 1;
                    }
                }
            }
        }

        if direction.pushes() {
            if book_id.is_none() {
                match library::push_library(&store, transport).await {
                    Ok(outcome) => {
                        report.books_uploaded += outcome.uploaded;
                        report.failures += outcome.skipped;
                    }
                    Err(e) => {
                        warn!("library push failed: {e:#}");
                        report.failures += 1;
                    }
                }
            }
            for id in &targets {
                match progress::push_progress(&store, transport, id).await {
                    Ok(progress::ProgressPush::Pushed { .. }) => report.progress_pushed += 1,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(book_id = id, "progress push failed: {e:#}");
                        report.failures += 1;
                    }
                }
                match notes::push_notes(&store, transport, id).await {
                    Ok(outcome) => {
                        report.notes_pushed += outcome.pushed;
                        report.failures += outcome.failed;
                    }
                    Err(e) => {
                        warn!(book_id = id, "notes push failed: {e:#}");
                        report.failures += 1;
                    }
                }
            }
        }

        info!(?report, "manual sync pass complete");
        Ok(report)
    }

    // ==================== Driver ====================

    /// Drive the engine until the shutdown signal flips
    ///
    /// Due keys are checked at a fraction of the debounce window; the
    /// library is pulled on the configured poll interval (and once at
    /// startup). On shutdown, buffered edits are flushed before return.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let granularity = (self.debounce / 2).max(Duration::from_millis(10));
        let mut ticker = tokio::time::interval(granularity);
        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = poll.tick() => self.poll_library().await,
                _ = ticker.tick() => self.tick(Instant::now()).await,
            }
        }

        self.drain().await;
        info!("sync engine stopped");
    }

    /// Flush buffered edits and run them now
    pub async fn drain(&self) {
        self.scheduler.lock().unwrap().flush(Instant::now());
        self.tick(Instant::now()).await;
    }
}
