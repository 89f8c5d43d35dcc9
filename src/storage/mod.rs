mod repository;

pub use repository::*;

/// SQL migration for actors, customers and transactions
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");

/// SQL migration for the audit streams and their shared sequence counter
pub const MIGRATION_002_AUDIT: &str = include_str!("migrations/002_audit.sql");
