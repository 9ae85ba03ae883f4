//! # Book Catalog Common Library
//!
//! Shared code for the catalog server and its maintenance commands:
//! - Error type and result alias
//! - Configuration and root folder resolution
//! - Database initialization (schema, SystemInfo versions)
//! - Text normalization and author-name parsing
//! - Password policy and hashing
//! - Colour contrast checks for user preferences
//! - Duplicate-candidate key computation

pub mod authors;
pub mod colors;
pub mod config;
pub mod db;
pub mod duplicates;
pub mod error;
pub mod password;
pub mod text;

pub use error::{Error, Result};

/// Schema version written to `SystemInfo.schema_version`
pub const SCHEMA_VERSION: &str = "2.3.4";
