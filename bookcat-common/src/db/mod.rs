//! Database initialization and SystemInfo bookkeeping

pub mod init;

pub use init::{init_database, read_system_info, sync_system_info};
