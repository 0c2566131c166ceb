//! Diesel ORM models for database tables.

use diesel::prelude::*;

use crate::schema;

/// Document header row.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::documents)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DocumentRecord {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub format_version: String,
    pub current_page: i32,
    pub page_count: i32,
    pub status: String,
    pub total_chunks: Option<i32>,
    pub chunk_index: Option<i32>,
    pub chunk_size: Option<i32>,
    pub revision: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::documents)]
pub struct NewDocument<'a> {
    pub id: &'a str,
    pub owner_id: &'a str,
    pub name: &'a str,
    pub format_version: &'a str,
    pub current_page: i32,
    pub page_count: i32,
    pub status: &'a str,
    pub total_chunks: Option<i32>,
    pub chunk_index: Option<i32>,
    pub chunk_size: Option<i32>,
    pub revision: i64,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

/// One image reference: `layer` array, position `page_index`.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = schema::document_entries)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct EntryRecord {
    pub layer: String,
    pub page_index: i32,
    pub image: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::document_entries)]
pub struct NewEntry<'a> {
    pub document_id: &'a str,
    pub layer: &'a str,
    pub page_index: i32,
    pub image: &'a str,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::ingest_chunks)]
pub struct NewIngestChunk<'a> {
    pub document_id: &'a str,
    pub chunk_index: i32,
    pub received_at: &'a str,
}

/// Takeoff or invoice row.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::quotes)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct QuoteRecord {
    pub id: String,
    pub owner_id: String,
    pub kind: String,
    pub number: String,
    pub client_name: String,
    pub client_email: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::quotes)]
pub struct NewQuote<'a> {
    pub id: &'a str,
    pub owner_id: &'a str,
    pub kind: &'a str,
    pub number: &'a str,
    pub client_name: &'a str,
    pub client_email: &'a str,
    pub status: &'a str,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}
