//! Document repository.
//!
//! Headers live in `documents`; every non-empty image reference is one row
//! in `document_entries` keyed by (document, layer, page index), and arrays
//! are materialized on read with empty placeholders for gaps. Mutations run
//! as read-modify-write inside a single transaction and only persist the
//! cells they touched, so concurrent batches writing disjoint pages of the
//! same document don't clobber each other.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};
use thiserror::Error;
use tracing::{info, warn};

use super::diesel_models::{DocumentRecord, EntryRecord, NewDocument, NewEntry, NewIngestChunk};
use super::parse_datetime;
use super::pool::{DbError, DbPool};
use super::util::{opt_i32, opt_u32, to_i32, to_usize};
use crate::ingest::reassemble::{self, CanvasPatch, Cell, MergeError};
use crate::ingest::IngestCanvas;
use crate::models::{CanvasData, Document, DocumentStatus, DocumentSummary, LayerKey};
use crate::schema::{document_entries, documents, ingest_chunks};
use crate::with_conn;

/// Why a document write was refused.
#[derive(Debug, Error)]
pub enum DocumentWriteError {
    /// Missing, or owned by someone else.
    #[error("document not found")]
    NotFound,

    #[error("revision conflict: expected {expected}, current is {current}")]
    Conflict { expected: i64, current: i64 },

    #[error(transparent)]
    Invalid(#[from] MergeError),

    #[error(transparent)]
    Database(#[from] DbError),
}

/// What a mutation changed, for persistence.
#[derive(Debug, Default)]
struct Mutation {
    cells: Vec<Cell>,
    /// Arrays replaced wholesale.
    replaced: Vec<LayerKey>,
    /// Ingest chunk received with this write.
    chunk: Option<u32>,
}

/// Diesel-backed document repository.
#[derive(Clone)]
pub struct DieselDocumentRepository {
    pool: DbPool,
}

impl DieselDocumentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Count all documents.
    pub async fn count(&self) -> Result<u64, DbError> {
        let count: i64 = with_conn!(self.pool, conn => {
            documents::table.count().get_result(&mut conn).await
        })?;
        Ok(count as u64)
    }

    /// Insert a new document with all of its entries.
    ///
    /// `first_chunk` records the ingest chunk that created it, if any.
    pub async fn create(&self, doc: &Document, first_chunk: Option<u32>) -> Result<(), DbError> {
        let _guard = self.pool.write_guard().await;
        let created_at = doc.created_at.to_rfc3339();
        let updated_at = doc.updated_at.to_rfc3339();
        let created_at = created_at.as_str();
        let updated_at = updated_at.as_str();

        with_conn!(self.pool, conn => {
            conn.transaction(|conn| {
                Box::pin(async move {
                    diesel::insert_into(documents::table)
                        .values(&NewDocument {
                            id: &doc.id,
                            owner_id: &doc.owner_id,
                            name: &doc.name,
                            format_version: &doc.canvas.version,
                            current_page: to_i32(doc.canvas.current_page)?,
                            page_count: to_i32(doc.canvas.page_count())?,
                            status: doc.status.as_str(),
                            total_chunks: opt_i32(doc.canvas.total_chunks),
                            chunk_index: opt_i32(doc.canvas.chunk_index),
                            chunk_size: opt_i32(doc.canvas.chunk_size),
                            revision: doc.revision,
                            created_at,
                            updated_at,
                        })
                        .execute(conn)
                        .await?;

                    for key in LayerKey::ALL {
                        for (index, image) in doc.canvas.layer(key).iter().enumerate() {
                            if image.is_empty() {
                                continue;
                            }
                            diesel::insert_into(document_entries::table)
                                .values(&NewEntry {
                                    document_id: &doc.id,
                                    layer: key.as_str(),
                                    page_index: to_i32(index)?,
                                    image,
                                })
                                .execute(conn)
                                .await?;
                        }
                    }

                    if let Some(chunk) = first_chunk {
                        diesel::insert_into(ingest_chunks::table)
                            .values(&NewIngestChunk {
                                document_id: &doc.id,
                                chunk_index: chunk as i32,
                                received_at: created_at,
                            })
                            .execute(conn)
                            .await?;
                    }

                    Ok::<(), DbError>(())
                })
            })
            .await
        })?;

        info!(
            "Created document {} '{}' ({} pages, {})",
            doc.id,
            doc.name,
            doc.canvas.page_count(),
            doc.status.as_str()
        );
        Ok(())
    }

    /// Get a document by id regardless of owner.
    pub async fn get(&self, id: &str) -> Result<Option<Document>, DbError> {
        let loaded: Option<(DocumentRecord, Vec<EntryRecord>)> = with_conn!(self.pool, conn => {
            let record: Option<DocumentRecord> = documents::table
                .find(id)
                .select(DocumentRecord::as_select())
                .first(&mut conn)
                .await
                .optional()?;
            match record {
                Some(record) => {
                    let entries: Vec<EntryRecord> = document_entries::table
                        .filter(document_entries::document_id.eq(id))
                        .select(EntryRecord::as_select())
                        .load(&mut conn)
                        .await?;
                    Ok::<_, DbError>(Some((record, entries)))
                }
                None => Ok(None),
            }
        })?;

        Ok(loaded.map(|(record, entries)| build_document(record, entries)))
    }

    /// Get a document if it belongs to `owner_id`.
    pub async fn get_owned(&self, owner_id: &str, id: &str) -> Result<Option<Document>, DbError> {
        Ok(self.get(id).await?.filter(|doc| doc.owner_id == owner_id))
    }

    /// List document headers, oldest first, optionally for one owner.
    pub async fn list(&self, owner_id: Option<&str>) -> Result<Vec<DocumentSummary>, DbError> {
        let records: Vec<DocumentRecord> = with_conn!(self.pool, conn => {
            let mut query = documents::table
                .select(DocumentRecord::as_select())
                .order((documents::created_at.asc(), documents::id.asc()))
                .into_boxed();
            if let Some(owner) = owner_id {
                query = query.filter(documents::owner_id.eq(owner));
            }
            query.load(&mut conn).await
        })?;

        Ok(records
            .into_iter()
            .map(|record| DocumentSummary {
                status: DocumentStatus::from_str(&record.status)
                    .unwrap_or(DocumentStatus::Complete),
                page_count: to_usize(record.page_count),
                created_at: parse_datetime(&record.created_at),
                updated_at: parse_datetime(&record.updated_at),
                id: record.id,
                name: record.name,
            })
            .collect())
    }

    /// Merge a follow-up ingest batch into an existing document.
    pub async fn merge_batch(
        &self,
        owner_id: &str,
        id: &str,
        batch: &IngestCanvas,
    ) -> Result<Document, DocumentWriteError> {
        let batch = batch.clone();
        self.mutate(owner_id, id, None, move |doc| {
            let cells = reassemble::merge_batch(&mut doc.canvas, &batch)?;
            let tracked = doc.canvas.total_chunks.is_some();
            Ok(Mutation {
                cells,
                chunk: batch.chunk_index.filter(|_| tracked),
                ..Default::default()
            })
        })
        .await
    }

    /// Partial update: omitted fields keep their stored values.
    pub async fn update(
        &self,
        owner_id: &str,
        id: &str,
        name: Option<String>,
        patch: Option<CanvasPatch>,
        expected_revision: Option<i64>,
    ) -> Result<Document, DocumentWriteError> {
        self.mutate(owner_id, id, expected_revision, move |doc| {
            if let Some(name) = name {
                doc.name = name;
            }
            let replaced = match &patch {
                Some(patch) => reassemble::apply_patch(&mut doc.canvas, patch)?,
                None => Vec::new(),
            };
            Ok(Mutation {
                replaced,
                ..Default::default()
            })
        })
        .await
    }

    /// Overwrite one entry of one array. `page` defaults to the stored
    /// current page.
    pub async fn write_entry(
        &self,
        owner_id: &str,
        id: &str,
        layer: LayerKey,
        page: Option<usize>,
        image: &str,
        expected_revision: Option<i64>,
    ) -> Result<Document, DocumentWriteError> {
        let image = image.to_string();
        self.mutate(owner_id, id, expected_revision, move |doc| {
            let page = page.unwrap_or(doc.canvas.current_page);
            let cell = reassemble::write_detection(&mut doc.canvas, layer, page, &image)?;
            Ok(Mutation {
                cells: vec![cell],
                ..Default::default()
            })
        })
        .await
    }

    /// Set the lifecycle status (used when an upload is abandoned).
    pub async fn set_status(
        &self,
        owner_id: &str,
        id: &str,
        status: DocumentStatus,
    ) -> Result<Document, DocumentWriteError> {
        self.mutate(owner_id, id, None, move |doc| {
            doc.status = status;
            Ok(Mutation::default())
        })
        .await
    }

    /// Delete a document owned by `owner_id`. Returns false if absent.
    pub async fn delete(&self, owner_id: &str, id: &str) -> Result<bool, DbError> {
        let _guard = self.pool.write_guard().await;

        with_conn!(self.pool, conn => {
            conn.transaction(|conn| {
                Box::pin(async move {
                    let owned: Option<String> = documents::table
                        .find(id)
                        .select(documents::owner_id)
                        .first(conn)
                        .await
                        .optional()?;
                    if owned.as_deref() != Some(owner_id) {
                        return Ok(false);
                    }

                    diesel::delete(document_entries::table.filter(document_entries::document_id.eq(id)))
                        .execute(conn)
                        .await?;
                    diesel::delete(ingest_chunks::table.filter(ingest_chunks::document_id.eq(id)))
                        .execute(conn)
                        .await?;
                    let rows = diesel::delete(documents::table.find(id))
                        .execute(conn)
                        .await?;

                    Ok::<bool, DbError>(rows > 0)
                })
            })
            .await
        })
    }

    /// Load, mutate and persist a document in one transaction.
    async fn mutate<F>(
        &self,
        owner_id: &str,
        id: &str,
        expected_revision: Option<i64>,
        apply: F,
    ) -> Result<Document, DocumentWriteError>
    where
        F: FnOnce(&mut Document) -> Result<Mutation, DocumentWriteError> + Send,
    {
        let _guard = self.pool.write_guard().await;

        with_conn!(self.pool, conn => {
            conn.transaction(|conn| {
                Box::pin(async move {
                    let record: Option<DocumentRecord> = documents::table
                        .find(id)
                        .select(DocumentRecord::as_select())
                        .first(conn)
                        .await
                        .optional()?;
                    let record = match record {
                        Some(record) if record.owner_id == owner_id => record,
                        _ => return Err(DocumentWriteError::NotFound),
                    };
                    if let Some(expected) = expected_revision {
                        if expected != record.revision {
                            return Err(DocumentWriteError::Conflict {
                                expected,
                                current: record.revision,
                            });
                        }
                    }

                    let entries: Vec<EntryRecord> = document_entries::table
                        .filter(document_entries::document_id.eq(id))
                        .select(EntryRecord::as_select())
                        .load(conn)
                        .await?;
                    let mut doc = build_document(record, entries);
                    let mutation = apply(&mut doc)?;
                    let now = Utc::now();
                    let now_str = now.to_rfc3339();

                    for layer in &mutation.replaced {
                        diesel::delete(
                            document_entries::table
                                .filter(document_entries::document_id.eq(id))
                                .filter(document_entries::layer.eq(layer.as_str())),
                        )
                        .execute(conn)
                        .await?;

                        for (index, image) in doc.canvas.layer(*layer).iter().enumerate() {
                            if image.is_empty() {
                                continue;
                            }
                            diesel::insert_into(document_entries::table)
                                .values(&NewEntry {
                                    document_id: id,
                                    layer: layer.as_str(),
                                    page_index: to_i32(index)?,
                                    image,
                                })
                                .execute(conn)
                                .await?;
                        }
                    }

                    for cell in &mutation.cells {
                        let image = doc
                            .canvas
                            .layer(cell.layer)
                            .get(cell.index)
                            .map(String::as_str)
                            .unwrap_or("");
                        let page_index = to_i32(cell.index)?;

                        if image.is_empty() {
                            diesel::delete(
                                document_entries::table
                                    .filter(document_entries::document_id.eq(id))
                                    .filter(document_entries::layer.eq(cell.layer.as_str()))
                                    .filter(document_entries::page_index.eq(page_index)),
                            )
                            .execute(conn)
                            .await?;
                        } else {
                            diesel::insert_into(document_entries::table)
                                .values(&NewEntry {
                                    document_id: id,
                                    layer: cell.layer.as_str(),
                                    page_index,
                                    image,
                                })
                                .on_conflict((
                                    document_entries::document_id,
                                    document_entries::layer,
                                    document_entries::page_index,
                                ))
                                .do_update()
                                .set(document_entries::image.eq(image))
                                .execute(conn)
                                .await?;
                        }
                    }

                    if let Some(chunk) = mutation.chunk {
                        diesel::insert_into(ingest_chunks::table)
                            .values(&NewIngestChunk {
                                document_id: id,
                                chunk_index: chunk as i32,
                                received_at: &now_str,
                            })
                            .on_conflict((ingest_chunks::document_id, ingest_chunks::chunk_index))
                            .do_nothing()
                            .execute(conn)
                            .await?;

                        if doc.status == DocumentStatus::Ingesting {
                            if let Some(total) = doc.canvas.total_chunks {
                                let received: i64 = ingest_chunks::table
                                    .filter(ingest_chunks::document_id.eq(id))
                                    .filter(ingest_chunks::chunk_index.lt(to_i32(total as usize)?))
                                    .count()
                                    .get_result(conn)
                                    .await?;

                                if received >= i64::from(total) {
                                    info!(
                                        "Document {} complete: {} chunks, {} pages",
                                        id,
                                        total,
                                        doc.canvas.page_count()
                                    );
                                    doc.status = DocumentStatus::Complete;
                                    doc.canvas.total_chunks = None;
                                    doc.canvas.chunk_index = None;
                                    doc.canvas.chunk_size = None;
                                }
                            }
                        }
                    }

                    doc.revision += 1;
                    doc.updated_at = now;
                    diesel::update(documents::table.find(id))
                        .set((
                            documents::name.eq(&doc.name),
                            documents::format_version.eq(&doc.canvas.version),
                            documents::current_page.eq(to_i32(doc.canvas.current_page)?),
                            documents::page_count.eq(to_i32(doc.canvas.page_count())?),
                            documents::status.eq(doc.status.as_str()),
                            documents::total_chunks.eq(opt_i32(doc.canvas.total_chunks)),
                            documents::chunk_index.eq(opt_i32(doc.canvas.chunk_index)),
                            documents::chunk_size.eq(opt_i32(doc.canvas.chunk_size)),
                            documents::revision.eq(doc.revision),
                            documents::updated_at.eq(&now_str),
                        ))
                        .execute(conn)
                        .await?;

                    Ok(doc)
                })
            })
            .await
        })
    }
}

/// Materialize a document from its header and entry rows.
fn build_document(record: DocumentRecord, entries: Vec<EntryRecord>) -> Document {
    let mut canvas = CanvasData {
        version: record.format_version,
        pages: vec![String::new(); to_usize(record.page_count)],
        current_page: to_usize(record.current_page),
        total_chunks: opt_u32(record.total_chunks),
        chunk_index: opt_u32(record.chunk_index),
        chunk_size: opt_u32(record.chunk_size),
        ..Default::default()
    };

    for entry in entries {
        let Some(key) = LayerKey::from_str(&entry.layer) else {
            warn!("Skipping entry with unknown layer '{}' in {}", entry.layer, record.id);
            continue;
        };
        let index = to_usize(entry.page_index);
        let array = canvas.layer_mut(key);
        if array.len() <= index {
            array.resize(index + 1, String::new());
        }
        array[index] = entry.image;
    }

    Document {
        status: DocumentStatus::from_str(&record.status).unwrap_or(DocumentStatus::Complete),
        revision: record.revision,
        created_at: parse_datetime(&record.created_at),
        updated_at: parse_datetime(&record.updated_at),
        id: record.id,
        owner_id: record.owner_id,
        name: record.name,
        canvas,
    }
}
