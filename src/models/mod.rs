//! Data models for arcus.

mod document;
mod layer;
mod quote;

pub use document::{
    CanvasData, CategoryArrays, Document, DocumentStatus, DocumentSummary, CANVAS_FORMAT_VERSION,
};
pub use layer::{Availability, BaseCategory, LayerKey, ViewerToggles};
pub use quote::{Quote, QuoteKind, QuoteStatus};
