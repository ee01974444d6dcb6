//! Sync command handler

use std::sync::Arc;

use anyhow::{bail, Result};

use tome_core::{Config, HttpTransport, LibraryStore, SyncDirection, SyncEngine};

use crate::commands::resolve_book_id;
use crate::output::Output;

/// Run a manual reconciliation pass
pub async fn run(
    config: &Config,
    store: LibraryStore,
    book: Option<String>,
    direction: SyncDirection,
    output: &Output,
) -> Result<()> {
    if !config.sync_enabled {
        bail!(
            "Sync is not enabled. Enable it with:\n  \
             tome config set sync_enabled true\n  \
             tome config set server_url http://your-server:9000"
        );
    }
    if config.server_url.is_none() {
        bail!(
            "Server URL not configured. Set it with:\n  \
             tome config set server_url http://your-server:9000"
        );
    }

    let book_id = match book {
        Some(ref id) => Some(resolve_book_id(&store, id)?),
        None => None,
    };

    let transport = Arc::new(HttpTransport::from_config(config)?);
    let engine = SyncEngine::new(store, transport, config);

    output.message("Syncing...");
    let report = engine.sync_once(book_id.as_deref(), direction).await?;

    if output.is_json() {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.failures > 0 {
        output.message(&format!(
            "Sync finished with {} item(s) skipped; they will be retried",
            report.failures
        ));
    } else {
        output.success("Sync complete");
    }
    output.message(&format!(
        "  Books: {} imported, {} uploaded",
        report.books_imported, report.books_uploaded
    ));
    output.message(&format!(
        "  Progress: {} applied, {} pushed",
        report.progress_applied, report.progress_pushed
    ));
    output.message(&format!(
        "  Notes: {} merged, {} pushed",
        report.notes_merged, report.notes_pushed
    ));

    Ok(())
}
