//! Repository layer for database persistence.
//!
//! All database access uses Diesel with diesel-async. SQLite is the default
//! backend; PostgreSQL is available behind the `postgres` feature.

pub mod diesel_context;
pub mod diesel_document;
pub mod diesel_models;
pub mod diesel_quote;
pub mod pool;
pub mod util;

pub use diesel_context::DieselDbContext;
pub use diesel_document::{DieselDocumentRepository, DocumentWriteError};
pub use diesel_quote::{DieselQuoteRepository, QuoteChanges};
pub use pool::{DbError, DbPool};

use chrono::{DateTime, Utc};

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}
