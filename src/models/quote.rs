//! Takeoff quotes and invoices shown on the dashboard.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which ledger a quote record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteKind {
    Takeoff,
    Invoice,
}

impl QuoteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Takeoff => "takeoff",
            Self::Invoice => "invoice",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "takeoff" => Some(Self::Takeoff),
            "invoice" => Some(Self::Invoice),
            _ => None,
        }
    }
}

/// Approval state of a quote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuoteStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl QuoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(Self::Pending),
            "Approved" => Some(Self::Approved),
            "Rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// A takeoff quote or invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub id: String,
    pub owner_id: String,
    pub kind: QuoteKind,
    /// Human-facing quote or invoice number.
    pub number: String,
    pub client_name: String,
    pub client_email: String,
    pub status: QuoteStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quote {
    pub fn new(
        owner_id: String,
        kind: QuoteKind,
        number: String,
        client_name: String,
        client_email: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id,
            kind,
            number,
            client_name,
            client_email,
            status: QuoteStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}
