//! # Repository Pattern Implementation
//!
//! - Traits define the interface the sync core consumes
//! - SQLite implementations use sqlx for async database access
//! - All operations return `Result<T>`; missing rows and keys surface as
//!   `LibraryError::NotFound`

pub mod catalog;

pub use catalog::{CatalogStore, SqliteCatalogStore, LAST_SYNC_KEY};
