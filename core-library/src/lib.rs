//! # Catalog Library Module
//!
//! Owns the local metadata catalog and the repository used to read and write
//! it.
//!
//! ## Overview
//!
//! This module manages:
//! - The `CatalogRecord` model and its forward-only status graph
//! - SQLite connection pooling and embedded migrations
//! - The `CatalogStore` repository (records plus a string config table)

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use db::{create_pool, create_test_pool, DatabaseConfig, Location};
pub use error::{LibraryError, Result};
pub use models::{CatalogRecord, RecordStatus};
pub use repositories::{CatalogStore, SqliteCatalogStore};
