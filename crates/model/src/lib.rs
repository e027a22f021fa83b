//! Data model for the screening service.
//!
//! This crate defines the entity record, the schema taxonomy with its is-a
//! lattice, property types with their index groups, and the dataset catalog.
//! It carries no I/O; the index, ingest, and server layers build on it.

mod dataset;
mod entity;
mod error;
mod property;
pub mod schema;

pub use dataset::{iso_to_version, Catalog, Dataset};
pub use entity::Entity;
pub use error::ModelError;
pub use property::{PropType, Property};
pub use schema::{NameKind, Schema};
