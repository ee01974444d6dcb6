//! Status command handler

use anyhow::Result;

use tome_core::{Config, HttpTransport, LibraryStore, Transport};

use crate::output::{Output, OutputFormat};

/// Show library and sync status
pub async fn show(config: &Config, store: &LibraryStore, output: &Output) -> Result<()> {
    let books = store.book_count().unwrap_or(0);
    let annotations = store.annotation_count().unwrap_or(0);
    let linked = linked_count(store);

    let server = match &config.server_url {
        Some(_) if config.sync_enabled => Some(check_server(config).await),
        _ => None,
    };

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "sync_enabled": config.sync_enabled,
                    "server_url": config.server_url,
                    "server_reachable": server,
                    "storage": {
                        "location": config.data_dir,
                    },
                    "counts": {
                        "books": books,
                        "linked_books": linked,
                        "annotations": annotations
                    }
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", books);
        }
        OutputFormat::Human => {
            println!("Tome Status");
            println!("===========");
            println!();
            println!("Sync:");
            println!(
                "  Status: {}",
                if config.sync_enabled {
                    "enabled"
                } else {
                    "disabled"
                }
            );
            if let Some(ref url) = config.server_url {
                println!("  Server: {}", url);
            }
            if let Some(reachable) = server {
                println!(
                    "  Health: {}",
                    if reachable { "reachable" } else { "unreachable" }
                );
            }
            println!();
            println!("Storage:");
            println!("  Location: {}", config.data_dir.display());
            println!();
            println!("Contents:");
            println!("  Books:       {} ({} linked)", books, linked);
            println!("  Annotations: {}", annotations);
        }
    }

    Ok(())
}

async fn check_server(config: &Config) -> bool {
    match HttpTransport::from_config(config) {
        Ok(transport) => transport.health_check().await.unwrap_or(false),
        Err(_) => false,
    }
}

fn linked_count(store: &LibraryStore) -> usize {
    store
        .active_books()
        .map(|books| {
            books
                .iter()
                .filter(|b| matches!(store.document_link(&b.id), Ok(Some(_))))
                .count()
        })
        .unwrap_or(0)
}
