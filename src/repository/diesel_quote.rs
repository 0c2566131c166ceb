//! Takeoff and invoice records.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::diesel_models::{NewQuote, QuoteRecord};
use super::parse_datetime;
use super::pool::{DbError, DbPool};
use crate::models::{Quote, QuoteKind, QuoteStatus};
use crate::schema::quotes;
use crate::with_conn;

/// Fields a quote update may change.
#[derive(Debug, Clone, Default)]
pub struct QuoteChanges {
    pub number: Option<String>,
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub status: Option<QuoteStatus>,
}

#[derive(Clone)]
pub struct DieselQuoteRepository {
    pool: DbPool,
}

impl DieselQuoteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, quote: &Quote) -> Result<(), DbError> {
        let created_at = quote.created_at.to_rfc3339();
        let updated_at = quote.updated_at.to_rfc3339();
        let _guard = self.pool.write_guard().await;

        with_conn!(self.pool, conn => {
            diesel::insert_into(quotes::table)
                .values(&NewQuote {
                    id: &quote.id,
                    owner_id: &quote.owner_id,
                    kind: quote.kind.as_str(),
                    number: &quote.number,
                    client_name: &quote.client_name,
                    client_email: &quote.client_email,
                    status: quote.status.as_str(),
                    created_at: &created_at,
                    updated_at: &updated_at,
                })
                .execute(&mut conn)
                .await
        })?;
        Ok(())
    }

    /// Quotes of one kind for an owner, oldest first.
    pub async fn list(&self, owner_id: &str, kind: QuoteKind) -> Result<Vec<Quote>, DbError> {
        let records: Vec<QuoteRecord> = with_conn!(self.pool, conn => {
            quotes::table
                .filter(quotes::owner_id.eq(owner_id))
                .filter(quotes::kind.eq(kind.as_str()))
                .order((quotes::created_at.asc(), quotes::id.asc()))
                .select(QuoteRecord::as_select())
                .load(&mut conn)
                .await
        })?;
        Ok(records.into_iter().map(Quote::from).collect())
    }

    pub async fn get(
        &self,
        owner_id: &str,
        kind: QuoteKind,
        id: &str,
    ) -> Result<Option<Quote>, DbError> {
        let record: Option<QuoteRecord> = with_conn!(self.pool, conn => {
            quotes::table
                .find(id)
                .filter(quotes::owner_id.eq(owner_id))
                .filter(quotes::kind.eq(kind.as_str()))
                .select(QuoteRecord::as_select())
                .first(&mut conn)
                .await
                .optional()
        })?;
        Ok(record.map(Quote::from))
    }

    /// Apply `changes`; returns the updated quote or `None` if not found.
    pub async fn update(
        &self,
        owner_id: &str,
        kind: QuoteKind,
        id: &str,
        changes: QuoteChanges,
    ) -> Result<Option<Quote>, DbError> {
        let Some(mut quote) = self.get(owner_id, kind, id).await? else {
            return Ok(None);
        };

        if let Some(number) = changes.number {
            quote.number = number;
        }
        if let Some(client_name) = changes.client_name {
            quote.client_name = client_name;
        }
        if let Some(client_email) = changes.client_email {
            quote.client_email = client_email;
        }
        if let Some(status) = changes.status {
            quote.status = status;
        }
        quote.updated_at = Utc::now();
        let updated_at = quote.updated_at.to_rfc3339();
        let _guard = self.pool.write_guard().await;

        with_conn!(self.pool, conn => {
            diesel::update(quotes::table.find(id))
                .set((
                    quotes::number.eq(&quote.number),
                    quotes::client_name.eq(&quote.client_name),
                    quotes::client_email.eq(&quote.client_email),
                    quotes::status.eq(quote.status.as_str()),
                    quotes::updated_at.eq(&updated_at),
                ))
                .execute(&mut conn)
                .await
        })?;
        Ok(Some(quote))
    }

    pub async fn delete(&self, owner_id: &str, kind: QuoteKind, id: &str) -> Result<bool, DbError> {
        let _guard = self.pool.write_guard().await;
        let rows = with_conn!(self.pool, conn => {
            diesel::delete(
                quotes::table
                    .filter(quotes::id.eq(id))
                    .filter(quotes::owner_id.eq(owner_id))
                    .filter(quotes::kind.eq(kind.as_str())),
            )
            .execute(&mut conn)
            .await
        })?;
        Ok(rows > 0)
    }
}

impl From<QuoteRecord> for Quote {
    fn from(record: QuoteRecord) -> Self {
        Quote {
            kind: QuoteKind::from_str(&record.kind).unwrap_or(QuoteKind::Takeoff),
            status: QuoteStatus::from_str(&record.status).unwrap_or_default(),
            created_at: parse_datetime(&record.created_at),
            updated_at: parse_datetime(&record.updated_at),
            id: record.id,
            owner_id: record.owner_id,
            number: record.number,
            client_name: record.client_name,
            client_email: record.client_email,
        }
    }
}
