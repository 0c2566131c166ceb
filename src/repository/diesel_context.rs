//! Diesel database context: owns the pool and hands out repositories.

use std::path::Path;

use diesel_async::SimpleAsyncConnection;

use super::diesel_document::DieselDocumentRepository;
use super::diesel_quote::DieselQuoteRepository;
use super::pool::{DbError, DbPool, SqliteConn};
use crate::with_conn_split;

#[cfg(feature = "postgres")]
use diesel_async::AsyncPgConnection;

/// Entry point for database access. Create one per command or server and
/// obtain repositories from it.
///
/// ```ignore
/// let ctx = DieselDbContext::from_url(&settings.database_url())?;
/// ctx.init_schema().await?;
/// let docs = ctx.documents().list(Some("user-1")).await?;
/// ```
#[derive(Clone)]
pub struct DieselDbContext {
    pool: DbPool,
}

impl DieselDbContext {
    /// SQLite database at `db_path`.
    pub fn new(db_path: &Path) -> Self {
        Self {
            pool: DbPool::sqlite_from_path(db_path),
        }
    }

    /// SQLite path / `sqlite:` URL, or a `postgres://` URL.
    pub fn from_url(database_url: &str) -> Result<Self, DbError> {
        Ok(Self {
            pool: DbPool::from_url(database_url)?,
        })
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn documents(&self) -> DieselDocumentRepository {
        DieselDocumentRepository::new(self.pool.clone())
    }

    pub fn quotes(&self) -> DieselQuoteRepository {
        DieselQuoteRepository::new(self.pool.clone())
    }

    /// Create all tables that don't exist yet.
    pub async fn init_schema(&self) -> Result<(), DbError> {
        with_conn_split!(self.pool,
            sqlite: conn => {
                Self::init_sqlite_schema(&mut conn).await
            },
            postgres: conn => {
                Self::init_postgres_schema(&mut conn).await
            }
        )
    }

    async fn init_sqlite_schema(conn: &mut SqliteConn) -> Result<(), DbError> {
        conn.batch_execute(
            r#"
            PRAGMA journal_mode = WAL;

            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                name TEXT NOT NULL,
                format_version TEXT NOT NULL DEFAULT '1.0',
                current_page INTEGER NOT NULL DEFAULT 0,
                page_count INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'complete',
                total_chunks INTEGER,
                chunk_index INTEGER,
                chunk_size INTEGER,
                revision INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- One row per non-empty (layer, page) image reference
            CREATE TABLE IF NOT EXISTS document_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id TEXT NOT NULL,
                layer TEXT NOT NULL,
                page_index INTEGER NOT NULL,
                image TEXT NOT NULL,
                UNIQUE(document_id, layer, page_index),
                FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS ingest_chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                received_at TEXT NOT NULL,
                UNIQUE(document_id, chunk_index),
                FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS quotes (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                number TEXT NOT NULL,
                client_name TEXT NOT NULL,
                client_email TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'Pending',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(owner_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_entries_document ON document_entries(document_id, layer);
            CREATE INDEX IF NOT EXISTS idx_quotes_owner_kind ON quotes(owner_id, kind, created_at);
            "#,
        )
        .await
    }

    #[cfg(feature = "postgres")]
    async fn init_postgres_schema(conn: &mut AsyncPgConnection) -> Result<(), DbError> {
        use diesel_async::RunQueryDsl;

        // PostgreSQL requires separate statements
        let statements = [
            r#"CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                name TEXT NOT NULL,
                format_version TEXT NOT NULL DEFAULT '1.0',
                current_page INTEGER NOT NULL DEFAULT 0,
                page_count INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'complete',
                total_chunks INTEGER,
                chunk_index INTEGER,
                chunk_size INTEGER,
                revision BIGINT NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS document_entries (
                id SERIAL PRIMARY KEY,
                document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                layer TEXT NOT NULL,
                page_index INTEGER NOT NULL,
                image TEXT NOT NULL,
                UNIQUE(document_id, layer, page_index)
            )"#,
            r#"CREATE TABLE IF NOT EXISTS ingest_chunks (
                id SERIAL PRIMARY KEY,
                document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                chunk_index INTEGER NOT NULL,
                received_at TEXT NOT NULL,
                UNIQUE(document_id, chunk_index)
            )"#,
            r#"CREATE TABLE IF NOT EXISTS quotes (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                number TEXT NOT NULL,
                client_name TEXT NOT NULL,
                client_email TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'Pending',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )"#,
            "CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(owner_id, created_at)",
            "CREATE INDEX IF NOT EXISTS idx_entries_document ON document_entries(document_id, layer)",
            "CREATE INDEX IF NOT EXISTS idx_quotes_owner_kind ON quotes(owner_id, kind, created_at)",
        ];

        for stmt in statements {
            diesel::sql_query(stmt).execute(conn).await?;
        }

        Ok(())
    }

    /// Names of all user tables.
    pub async fn list_tables(&self) -> Result<Vec<String>, DbError> {
        with_conn_split!(self.pool,
            sqlite: conn => {
                let rows: Vec<TableName> = diesel_async::RunQueryDsl::load(
                    diesel::sql_query(
                        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
                    ),
                    &mut conn,
                )
                .await?;
                Ok(rows.into_iter().map(|r| r.name).collect())
            },
            postgres: conn => {
                use diesel_async::RunQueryDsl;
                let rows: Vec<TableName> = diesel::sql_query(
                    "SELECT tablename as name FROM pg_tables WHERE schemaname = 'public' ORDER BY tablename",
                )
                .load(&mut conn)
                .await?;
                Ok(rows.into_iter().map(|r| r.name).collect())
            }
        )
    }
}

#[derive(diesel::QueryableByName)]
struct TableName {
    #[diesel(sql_type = diesel::sql_types::Text)]
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_init_schema_creates_tables() {
        let dir = tempdir().unwrap();
        let ctx = DieselDbContext::new(&dir.path().join("arcus.db"));

        ctx.init_schema().await.unwrap();
        // Idempotent
        ctx.init_schema().await.unwrap();

        let tables = ctx.list_tables().await.unwrap();
        for expected in ["documents", "document_entries", "ingest_chunks", "quotes"] {
            assert!(tables.contains(&expected.to_string()), "missing {expected}");
        }
    }
}
