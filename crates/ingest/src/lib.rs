//! Dataset ingestion.
//!
//! This crate turns the manifest into a catalog, plans full-vs-delta
//! updates per dataset, and drives versioned index builds behind the
//! reindex lock, with a cron scheduler for unattended operation.

mod error;
mod indexer;
mod loader;
mod manifest;
mod schedule;
mod updater;

pub use error::IngestError;
pub use indexer::{Indexer, IngestConfig, UpdateSummary};
pub use loader::{build_client, fetch_json, fetch_yaml, local_path, FetchSettings, LineSource};
pub use manifest::{ExternalCatalog, Manifest};
pub use schedule::{parse_crontab, random_minute_hourly, spawn_cron};
pub use updater::{DatasetUpdater, EntityOp, OpKind, OpStream};
