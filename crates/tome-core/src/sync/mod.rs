//! Reconciliation between the local library and a remote store
//!
//! The local replica is always usable offline; this module converges it
//! with the remote library server when one is configured.
//!
//! ## Structure
//!
//! - `transport`: the network boundary trait and its error taxonomy
//! - `http`: the REST implementation of the transport
//! - `identity`: local book <-> remote document correspondence
//! - `cursor`: sync scopes and per-(scope, book) keying
//! - `progress` / `notes` / `library`: the three reconcilers, each a
//!   pure decision function plus an orchestrating pass
//! - `scheduler`: debounce and single-flight bookkeeping
//! - `engine`: ties store, transport, and scheduler together
//!
//! ## Usage
//!
//! ```ignore
//! let transport = Arc::new(HttpTransport::from_config(&config)?);
//! let engine = SyncEngine::new(store, transport, &config);
//! let report = engine.sync_once(None, SyncDirection::Both).await?;
//! ```

pub mod cursor;
pub mod engine;
pub mod http;
pub mod identity;
pub mod library;
pub mod notes;
pub mod progress;
pub mod scheduler;
#[cfg(test)]
pub(crate) mod testing;
pub mod transport;

pub use cursor::{SyncKey, SyncScope};
pub use engine::{SyncDirection, SyncEngine, SyncReport};
pub use http::HttpTransport;
pub use transport::{Transport, TransportError, TransportResult};
