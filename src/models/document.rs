//! Document models for multi-page floor plans and their detection overlays.
//!
//! A document owns an ordered list of page images plus seven category arrays,
//! each index-aligned with `pages`. Entries may be empty strings for pages a
//! detection has not been run on yet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::layer::LayerKey;

/// Current canvas payload format version.
pub const CANVAS_FORMAT_VERSION: &str = "1.0";

/// Ingestion/lifecycle status of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Chunks are still arriving.
    Ingesting,
    /// Every page batch has been applied.
    Complete,
    /// The uploader gave up part way through.
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingesting => "ingesting",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ingesting" => Some(Self::Ingesting),
            "complete" => Some(Self::Complete),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// The seven detection overlay arrays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryArrays {
    #[serde(default)]
    pub complete_doors_and_windows: Vec<String>,
    #[serde(default)]
    pub single_doors: Vec<String>,
    #[serde(default)]
    pub double_doors: Vec<String>,
    #[serde(default)]
    pub windows: Vec<String>,
    #[serde(default)]
    pub single_doors_and_windows: Vec<String>,
    #[serde(default)]
    pub single_doors_and_double_doors: Vec<String>,
    #[serde(default)]
    pub double_doors_and_windows: Vec<String>,
}

/// Page and overlay data of a document, as exchanged with the viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasData {
    pub version: String,
    pub pages: Vec<String>,
    pub current_page: usize,
    /// Only present while a chunked upload is in progress.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u32>,
    /// Pages per chunk, fixed by the first batch of the upload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u32>,
    #[serde(flatten)]
    pub layers: CategoryArrays,
}

impl Default for CanvasData {
    fn default() -> Self {
        Self {
            version: CANVAS_FORMAT_VERSION.to_string(),
            pages: Vec::new(),
            current_page: 0,
            total_chunks: None,
            chunk_index: None,
            chunk_size: None,
            layers: CategoryArrays::default(),
        }
    }
}

impl CanvasData {
    pub fn with_pages(pages: Vec<String>) -> Self {
        Self {
            pages,
            ..Default::default()
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Borrow the array named by `key`.
    pub fn layer(&self, key: LayerKey) -> &[String] {
        match key {
            LayerKey::Pages => &self.pages,
            LayerKey::CompleteDoorsAndWindows => &self.layers.complete_doors_and_windows,
            LayerKey::SingleDoors => &self.layers.single_doors,
            LayerKey::DoubleDoors => &self.layers.double_doors,
            LayerKey::Windows => &self.layers.windows,
            LayerKey::SingleDoorsAndWindows => &self.layers.single_doors_and_windows,
            LayerKey::SingleDoorsAndDoubleDoors => &self.layers.single_doors_and_double_doors,
            LayerKey::DoubleDoorsAndWindows => &self.layers.double_doors_and_windows,
        }
    }

    pub fn layer_mut(&mut self, key: LayerKey) -> &mut Vec<String> {
        match key {
            LayerKey::Pages => &mut self.pages,
            LayerKey::CompleteDoorsAndWindows => &mut self.layers.complete_doors_and_windows,
            LayerKey::SingleDoors => &mut self.layers.single_doors,
            LayerKey::DoubleDoors => &mut self.layers.double_doors,
            LayerKey::Windows => &mut self.layers.windows,
            LayerKey::SingleDoorsAndWindows => &mut self.layers.single_doors_and_windows,
            LayerKey::SingleDoorsAndDoubleDoors => &mut self.layers.single_doors_and_double_doors,
            LayerKey::DoubleDoorsAndWindows => &mut self.layers.double_doors_and_windows,
        }
    }

    /// Non-empty entry of `key` at `page`, if any.
    pub fn entry(&self, key: LayerKey, page: usize) -> Option<&str> {
        self.layer(key)
            .get(page)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// A persisted document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub status: DocumentStatus,
    /// Incremented on every write; used for optimistic concurrency checks.
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "canvasData")]
    pub canvas: CanvasData,
}

impl Document {
    pub fn new(id: String, owner_id: String, name: String, canvas: CanvasData) -> Self {
        let now = Utc::now();
        Self {
            id,
            owner_id,
            name,
            status: DocumentStatus::Complete,
            revision: 0,
            created_at: now,
            updated_at: now,
            canvas,
        }
    }

    /// Whether a chunked upload for this document never finished.
    pub fn is_incomplete(&self) -> bool {
        self.status != DocumentStatus::Complete
    }
}

/// Lightweight listing entry; page payloads are excluded.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub id: String,
    pub name: String,
    pub status: DocumentStatus,
    pub page_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Document> for DocumentSummary {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id.clone(),
            name: doc.name.clone(),
            status: doc.status,
            page_count: doc.canvas.page_count(),
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canvas_json_shape() {
        let mut canvas = CanvasData::with_pages(vec!["p0".into(), "p1".into()]);
        canvas.layers.single_doors = vec!["".into(), "sd1".into()];

        let json = serde_json::to_value(&canvas).unwrap();
        assert_eq!(json["version"], "1.0");
        assert_eq!(json["currentPage"], 0);
        assert_eq!(json["single_doors"][1], "sd1");
        assert!(json.get("totalChunks").is_none());
        assert!(json["complete_doors_and_windows"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_canvas_missing_layers_default_empty() {
        let canvas: CanvasData =
            serde_json::from_str(r#"{"version":"1.0","pages":["a"],"currentPage":0}"#).unwrap();
        assert_eq!(canvas.pages, vec!["a".to_string()]);
        for key in LayerKey::CATEGORIES {
            assert!(canvas.layer(key).is_empty());
        }
    }

    #[test]
    fn test_entry_skips_empty_strings() {
        let mut canvas = CanvasData::with_pages(vec!["p0".into()]);
        canvas.layers.windows = vec!["".into()];
        assert_eq!(canvas.entry(LayerKey::Pages, 0), Some("p0"));
        assert_eq!(canvas.entry(LayerKey::Windows, 0), None);
        assert_eq!(canvas.entry(LayerKey::Windows, 5), None);
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            DocumentStatus::Ingesting,
            DocumentStatus::Complete,
            DocumentStatus::Failed,
        ] {
            assert_eq!(DocumentStatus::from_str(status.as_str()), Some(status));
        }
    }
}
