//! HTTP request handlers for the web server.

mod detection_api;
mod documents_api;
mod layers_api;
mod quotes_api;

pub use detection_api::record_detection;
pub use documents_api::{
    abort_document, delete_document, get_document, ingest_document, list_documents,
    update_document,
};
pub use layers_api::layer_visibility;
pub use quotes_api::{create_quote, delete_quote, list_quotes, update_quote};
