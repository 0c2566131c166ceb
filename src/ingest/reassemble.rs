//! Document reassembly rules.
//!
//! These functions mutate an in-memory [`CanvasData`] and report which cells
//! they touched; the repository persists exactly those cells inside one
//! transaction. Page arrays only grow here: a batch write extends with empty
//! placeholders so indices stay aligned, and never truncates.

use serde::Deserialize;
use thiserror::Error;

use super::IngestCanvas;
use crate::models::{CanvasData, LayerKey, CANVAS_FORMAT_VERSION};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("{0}")]
    Invalid(String),
}

/// One (layer, page) position written by a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell {
    pub layer: LayerKey,
    pub index: usize,
}

/// Upper bound on the pages a document may hold.
pub const MAX_DOCUMENT_PAGES: usize = 10_000;

/// Absolute index of a batch's first page, or `None` on overflow.
///
/// With a chunk size the position is `chunk_index * chunk_size`; without one
/// the batch is appended after the existing pages.
pub fn batch_offset(
    existing_len: usize,
    chunk_index: u32,
    chunk_size: Option<u32>,
) -> Option<usize> {
    match chunk_size {
        Some(size) => (chunk_index as usize).checked_mul(size as usize),
        None => Some(existing_len),
    }
}

/// Write `incoming` into `array` starting at `offset`.
pub fn place(array: &mut Vec<String>, offset: usize, incoming: &[String]) -> std::ops::Range<usize> {
    let end = offset + incoming.len();
    if array.len() < end {
        array.resize(end, String::new());
    }
    array[offset..end].clone_from_slice(incoming);
    offset..end
}

/// Overwrite exactly one entry, padding with placeholders if needed.
pub fn write_entry(array: &mut Vec<String>, index: usize, value: &str) {
    if array.len() <= index {
        array.resize(index + 1, String::new());
    }
    array[index] = value.to_string();
}

/// Check the structural invariants of a canvas.
pub fn validate(canvas: &CanvasData) -> Result<(), MergeError> {
    let page_count = canvas.pages.len();
    if page_count > 0 && canvas.current_page >= page_count {
        return Err(MergeError::Invalid(format!(
            "currentPage {} out of range for {} pages",
            canvas.current_page, page_count
        )));
    }
    for key in LayerKey::CATEGORIES {
        let len = canvas.layer(key).len();
        if len > page_count {
            return Err(MergeError::Invalid(format!(
                "{} has {} entries but the document has {} pages",
                key, len, page_count
            )));
        }
    }
    Ok(())
}

/// Build the canvas for a document created by a first batch.
pub fn initial_canvas(batch: &IngestCanvas) -> Result<CanvasData, MergeError> {
    match batch.chunk_index {
        Some(0) | None => {}
        Some(i) => return Err(MergeError::Invalid(format!("chunk {} requires a documentId", i))),
    }
    if batch.chunk_size == Some(0) {
        return Err(MergeError::Invalid("chunkSize must be at least 1".to_string()));
    }
    if batch.pages.len() > MAX_DOCUMENT_PAGES {
        return Err(MergeError::Invalid(format!(
            "{} pages exceed the {}-page limit",
            batch.pages.len(),
            MAX_DOCUMENT_PAGES
        )));
    }

    let total_chunks = batch.total_chunks.filter(|t| *t > 1);
    if let Some(total) = total_chunks {
        if total as usize > MAX_DOCUMENT_PAGES {
            return Err(MergeError::Invalid(format!(
                "{} chunks exceed the {}-page limit",
                total, MAX_DOCUMENT_PAGES
            )));
        }
    }
    let chunk_size = total_chunks.and(batch.chunk_size);
    if let (Some(total), Some(size)) = (total_chunks, chunk_size) {
        if batch.pages.len() > size as usize {
            return Err(MergeError::Invalid(format!(
                "batch has {} pages but chunkSize is {}",
                batch.pages.len(),
                size
            )));
        }
        let capacity = (total as usize).checked_mul(size as usize);
        if capacity.map_or(true, |pages| pages > MAX_DOCUMENT_PAGES) {
            return Err(MergeError::Invalid(format!(
                "{} chunks of {} pages exceed the {}-page limit",
                total, size, MAX_DOCUMENT_PAGES
            )));
        }
    }

    let canvas = CanvasData {
        version: batch
            .version
            .clone()
            .unwrap_or_else(|| CANVAS_FORMAT_VERSION.to_string()),
        pages: batch.pages.clone(),
        current_page: batch.current_page.unwrap_or(0),
        total_chunks,
        chunk_index: total_chunks.map(|_| 0),
        chunk_size,
        layers: batch.layers.clone(),
    };
    validate(&canvas)?;
    Ok(canvas)
}

/// Check a batch header against the upload recorded on `canvas` and return
/// the chunk size to place it with.
///
/// While an upload is in progress the stored `totalChunks` and `chunkSize`
/// are authoritative; the batch may repeat them but not change them.
fn check_header(
    canvas: &CanvasData,
    batch: &IngestCanvas,
    chunk_index: u32,
) -> Result<Option<u32>, MergeError> {
    if batch.chunk_size == Some(0) {
        return Err(MergeError::Invalid("chunkSize must be at least 1".to_string()));
    }

    let Some(total) = canvas.total_chunks else {
        if let Some(total) = batch.total_chunks {
            if chunk_index >= total {
                return Err(MergeError::Invalid(format!(
                    "chunkIndex {} out of range for {} chunks",
                    chunk_index, total
                )));
            }
        }
        return Ok(batch.chunk_size);
    };

    if let Some(claimed) = batch.total_chunks {
        if claimed != total {
            return Err(MergeError::Invalid(format!(
                "totalChunks {} does not match the upload's {}",
                claimed, total
            )));
        }
    }
    if chunk_index >= total {
        return Err(MergeError::Invalid(format!(
            "chunkIndex {} out of range for {} chunks",
            chunk_index, total
        )));
    }
    match (canvas.chunk_size, batch.chunk_size) {
        (Some(stored), Some(claimed)) if stored != claimed => Err(MergeError::Invalid(format!(
            "chunkSize {} does not match the upload's {}",
            claimed, stored
        ))),
        (stored, claimed) => Ok(stored.or(claimed)),
    }
}

/// Largest page count a merge may grow `canvas` to.
fn page_limit(canvas: &CanvasData, chunk_size: Option<u32>) -> usize {
    match (canvas.total_chunks, chunk_size) {
        (Some(total), Some(size)) => (total as usize)
            .saturating_mul(size as usize)
            .min(MAX_DOCUMENT_PAGES),
        _ => MAX_DOCUMENT_PAGES,
    }
}

/// Merge a follow-up batch into `canvas`. Category arrays present in the
/// batch are placed at the same offset as its pages.
pub fn merge_batch(canvas: &mut CanvasData, batch: &IngestCanvas) -> Result<Vec<Cell>, MergeError> {
    let chunk_index = batch
        .chunk_index
        .ok_or_else(|| MergeError::Invalid("chunkIndex is required with documentId".into()))?;
    let chunk_size = check_header(canvas, batch, chunk_index)?;

    if let Some(size) = chunk_size {
        if batch.pages.len() > size as usize {
            return Err(MergeError::Invalid(format!(
                "batch has {} pages but chunkSize is {}",
                batch.pages.len(),
                size
            )));
        }
    }
    for key in LayerKey::CATEGORIES {
        if batch.layers_for(key).len() > batch.pages.len() {
            return Err(MergeError::Invalid(format!(
                "{} has more entries than the batch has pages",
                key
            )));
        }
    }

    let limit = page_limit(canvas, chunk_size);
    let offset = batch_offset(canvas.pages.len(), chunk_index, chunk_size)
        .filter(|offset| {
            offset
                .checked_add(batch.pages.len())
                .is_some_and(|end| end <= limit)
        })
        .ok_or_else(|| {
            MergeError::Invalid(format!(
                "chunk {} would place pages beyond the {}-page limit",
                chunk_index, limit
            ))
        })?;

    let mut cells = Vec::new();
    for index in place(&mut canvas.pages, offset, &batch.pages) {
        cells.push(Cell {
            layer: LayerKey::Pages,
            index,
        });
    }

    for key in LayerKey::CATEGORIES {
        let incoming = batch.layers_for(key);
        if incoming.is_empty() {
            continue;
        }
        for index in place(canvas.layer_mut(key), offset, incoming) {
            cells.push(Cell { layer: key, index });
        }
    }

    if canvas.total_chunks.is_some() {
        canvas.chunk_index = Some(chunk_index);
        if canvas.chunk_size.is_none() {
            canvas.chunk_size = chunk_size;
        }
    }
    validate(canvas)?;
    Ok(cells)
}

/// Write one detection result into a category array.
pub fn write_detection(
    canvas: &mut CanvasData,
    layer: LayerKey,
    page: usize,
    value: &str,
) -> Result<Cell, MergeError> {
    if page >= canvas.pages.len() {
        return Err(MergeError::Invalid(format!(
            "page {} out of range for {} pages",
            page,
            canvas.pages.len()
        )));
    }
    write_entry(canvas.layer_mut(layer), page, value);
    Ok(Cell { layer, index: page })
}

/// Partial canvas update; omitted fields keep their stored values.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasPatch {
    pub version: Option<String>,
    pub pages: Option<Vec<String>>,
    pub current_page: Option<usize>,
    #[serde(flatten)]
    pub layers: LayerPatch,
}

/// Replacement category arrays, any subset.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LayerPatch {
    pub complete_doors_and_windows: Option<Vec<String>>,
    pub single_doors: Option<Vec<String>>,
    pub double_doors: Option<Vec<String>>,
    pub windows: Option<Vec<String>>,
    pub single_doors_and_windows: Option<Vec<String>>,
    pub single_doors_and_double_doors: Option<Vec<String>>,
    pub double_doors_and_windows: Option<Vec<String>>,
}

impl LayerPatch {
    pub fn get(&self, key: LayerKey) -> Option<&Vec<String>> {
        match key {
            LayerKey::Pages => None,
            LayerKey::CompleteDoorsAndWindows => self.complete_doors_and_windows.as_ref(),
            LayerKey::SingleDoors => self.single_doors.as_ref(),
            LayerKey::DoubleDoors => self.double_doors.as_ref(),
            LayerKey::Windows => self.windows.as_ref(),
            LayerKey::SingleDoorsAndWindows => self.single_doors_and_windows.as_ref(),
            LayerKey::SingleDoorsAndDoubleDoors => self.single_doors_and_double_doors.as_ref(),
            LayerKey::DoubleDoorsAndWindows => self.double_doors_and_windows.as_ref(),
        }
    }
}

/// Apply a patch and return the arrays it replaced wholesale.
pub fn apply_patch(canvas: &mut CanvasData, patch: &CanvasPatch) -> Result<Vec<LayerKey>, MergeError> {
    let mut replaced = Vec::new();

    if let Some(version) = &patch.version {
        canvas.version = version.clone();
    }
    if let Some(pages) = &patch.pages {
        canvas.pages = pages.clone();
        replaced.push(LayerKey::Pages);
    }
    if let Some(current_page) = patch.current_page {
        canvas.current_page = current_page;
    }
    for key in LayerKey::CATEGORIES {
        if let Some(values) = patch.layers.get(key) {
            *canvas.layer_mut(key) = values.clone();
            replaced.push(key);
        }
    }

    validate(canvas)?;
    Ok(replaced)
}

impl IngestCanvas {
    /// Category entries carried by this batch.
    pub fn layers_for(&self, key: LayerKey) -> &[String] {
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
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn chunk(index: u32, pages: &[&str]) -> IngestCanvas {
        IngestCanvas {
            pages: strings(pages),
            total_chunks: Some(3),
            chunk_index: Some(index),
            chunk_size: Some(2),
            document_id: Some("doc".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_out_of_order_batches_land_at_absolute_offsets() {
        let mut canvas = CanvasData::with_pages(strings(&["p0", "p1"]));
        canvas.total_chunks = Some(3);
        canvas.chunk_size = Some(2);

        merge_batch(&mut canvas, &chunk(2, &["p4"])).unwrap();
        assert_eq!(canvas.pages, strings(&["p0", "p1", "", "", "p4"]));

        merge_batch(&mut canvas, &chunk(1, &["p2", "p3"])).unwrap();
        assert_eq!(canvas.pages, strings(&["p0", "p1", "p2", "p3", "p4"]));
        assert_eq!(canvas.chunk_index, Some(1));
    }

    #[test]
    fn test_rewriting_a_batch_is_idempotent() {
        let mut once = CanvasData::with_pages(strings(&["p0", "p1"]));
        merge_batch(&mut once, &chunk(1, &["p2", "p3"])).unwrap();

        let mut twice = once.clone();
        let cells = merge_batch(&mut twice, &chunk(1, &["p2", "p3"])).unwrap();
        assert_eq!(once, twice);
        assert_eq!(cells.len(), 2);
    }

    #[test]
    fn test_merges_never_shrink_pages() {
        let mut canvas = CanvasData::with_pages(strings(&["p0", "p1", "p2", "p3", "p4"]));
        let mut last = canvas.pages.len();
        for (i, pages) in [(0u32, &["a", "b"][..]), (2, &["e"][..]), (1, &["c", "d"][..])] {
            merge_batch(&mut canvas, &chunk(i, pages)).unwrap();
            assert!(canvas.pages.len() >= last);
            last = canvas.pages.len();
        }
        assert_eq!(canvas.pages, strings(&["a", "b", "c", "d", "e"]));
    }

    #[test]
    fn test_append_variant_without_chunk_size() {
        let mut canvas = CanvasData::with_pages(strings(&["p0"]));
        let mut batch = chunk(1, &["p1", "p2"]);
        batch.chunk_size = None;
        merge_batch(&mut canvas, &batch).unwrap();
        assert_eq!(canvas.pages, strings(&["p0", "p1", "p2"]));
    }

    #[test]
    fn test_batch_category_arrays_follow_page_offset() {
        let mut canvas = CanvasData::with_pages(strings(&["p0", "p1"]));
        let mut batch = chunk(1, &["p2", "p3"]);
        batch.layers.windows = strings(&["", "w3"]);
        let cells = merge_batch(&mut canvas, &batch).unwrap();

        assert_eq!(canvas.layers.windows, strings(&["", "", "", "w3"]));
        assert!(cells.contains(&Cell {
            layer: LayerKey::Windows,
            index: 3
        }));
    }

    fn uploading(pages: &[&str]) -> CanvasData {
        let mut canvas = CanvasData::with_pages(strings(pages));
        canvas.total_chunks = Some(3);
        canvas.chunk_index = Some(0);
        canvas.chunk_size = Some(2);
        canvas
    }

    #[test]
    fn test_oversized_chunk_header_is_rejected() {
        let mut huge = chunk(u32::MAX - 1, &["x"]);
        huge.total_chunks = Some(u32::MAX);
        huge.chunk_size = Some(u32::MAX);

        let mut plain = CanvasData::with_pages(strings(&["p0"]));
        let before = plain.clone();
        assert!(merge_batch(&mut plain, &huge).is_err());
        assert_eq!(plain, before);

        let mut canvas = uploading(&["p0", "p1"]);
        huge.total_chunks = None;
        huge.chunk_size = None;
        assert!(merge_batch(&mut canvas, &huge).is_err());
        assert_eq!(canvas, uploading(&["p0", "p1"]));
    }

    #[test]
    fn test_offset_beyond_page_limit_is_rejected() {
        let mut canvas = CanvasData::with_pages(strings(&["p0"]));
        let mut batch = chunk(MAX_DOCUMENT_PAGES as u32, &["x"]);
        batch.total_chunks = None;
        batch.chunk_size = Some(1);
        assert!(merge_batch(&mut canvas, &batch).is_err());
        assert_eq!(canvas.pages, strings(&["p0"]));

        batch.chunk_index = Some(MAX_DOCUMENT_PAGES as u32 - 1);
        merge_batch(&mut canvas, &batch).unwrap();
        assert_eq!(canvas.pages.len(), MAX_DOCUMENT_PAGES);
    }

    #[test]
    fn test_chunk_index_checked_against_stored_total() {
        let mut canvas = uploading(&["p0", "p1"]);
        for index in [3, 7, 8] {
            let mut batch = chunk(index, &["x", "y"]);
            batch.total_chunks = None;
            let err = merge_batch(&mut canvas, &batch).unwrap_err();
            assert!(matches!(err, MergeError::Invalid(_)));
        }
        assert_eq!(canvas, uploading(&["p0", "p1"]));
    }

    #[test]
    fn test_chunk_header_must_match_stored_upload() {
        let mut canvas = uploading(&["p0", "p1"]);

        let mut regrown = chunk(1, &["p2", "p3"]);
        regrown.total_chunks = Some(4);
        assert!(merge_batch(&mut canvas, &regrown).is_err());

        let mut resized = chunk(1, &["p3", "p4", "p5"]);
        resized.chunk_size = Some(3);
        assert!(merge_batch(&mut canvas, &resized).is_err());

        let mut zero = chunk(1, &[]);
        zero.chunk_size = Some(0);
        assert!(merge_batch(&mut canvas, &zero).is_err());

        assert_eq!(canvas, uploading(&["p0", "p1"]));

        let mut bare = chunk(1, &["p2", "p3"]);
        bare.total_chunks = None;
        bare.chunk_size = None;
        merge_batch(&mut canvas, &bare).unwrap();
        assert_eq!(canvas.pages, strings(&["p0", "p1", "p2", "p3"]));
    }

    #[test]
    fn test_batch_larger_than_chunk_size_is_rejected() {
        let mut canvas = uploading(&["p0", "p1"]);
        assert!(merge_batch(&mut canvas, &chunk(1, &["p2", "p3", "p4"])).is_err());
        assert!(merge_batch(&mut canvas, &chunk(2, &["p4", "p5", "p6"])).is_err());
        assert_eq!(canvas.pages, strings(&["p0", "p1"]));
    }

    #[test]
    fn test_initial_canvas_records_chunk_size() {
        let batch = IngestCanvas {
            pages: strings(&["p0", "p1"]),
            total_chunks: Some(3),
            chunk_index: Some(0),
            chunk_size: Some(2),
            ..Default::default()
        };
        let canvas = initial_canvas(&batch).unwrap();
        assert_eq!(canvas.total_chunks, Some(3));
        assert_eq!(canvas.chunk_size, Some(2));
    }

    #[test]
    fn test_initial_canvas_limits() {
        let first = |total: u32, size: u32, pages: &[&str]| IngestCanvas {
            pages: strings(pages),
            total_chunks: Some(total),
            chunk_index: Some(0),
            chunk_size: Some(size),
            ..Default::default()
        };
        assert!(initial_canvas(&first(u32::MAX, u32::MAX, &["p0"])).is_err());
        assert!(initial_canvas(&first(2, u32::MAX, &["p0"])).is_err());
        assert!(initial_canvas(&first(3, 0, &["p0"])).is_err());
        assert!(initial_canvas(&first(3, 1, &["p0", "p1"])).is_err());
        assert!(initial_canvas(&first(100, 100, &["p0"])).is_ok());
    }

    #[test]
    fn test_initial_canvas_rejects_later_chunk() {
        let batch = IngestCanvas {
            pages: strings(&["p"]),
            chunk_index: Some(1),
            ..Default::default()
        };
        assert!(initial_canvas(&batch).is_err());
    }

    #[test]
    fn test_initial_canvas_single_chunk_is_complete() {
        let batch = IngestCanvas {
            pages: strings(&["p"]),
            total_chunks: Some(1),
            chunk_index: Some(0),
            ..Default::default()
        };
        let canvas = initial_canvas(&batch).unwrap();
        assert_eq!(canvas.total_chunks, None);
        assert_eq!(canvas.chunk_index, None);
        assert_eq!(canvas.version, CANVAS_FORMAT_VERSION);
    }

    #[test]
    fn test_write_detection_pads_and_overwrites_one_entry() {
        let mut canvas = CanvasData::with_pages(strings(&["p0", "p1", "p2"]));
        canvas.layers.single_doors = strings(&["sd0"]);

        write_detection(&mut canvas, LayerKey::SingleDoors, 2, "sd2").unwrap();
        assert_eq!(canvas.layers.single_doors, strings(&["sd0", "", "sd2"]));

        write_detection(&mut canvas, LayerKey::SingleDoors, 0, "sd0b").unwrap();
        assert_eq!(canvas.layers.single_doors, strings(&["sd0b", "", "sd2"]));

        assert!(write_detection(&mut canvas, LayerKey::Windows, 3, "w").is_err());
    }

    #[test]
    fn test_patch_preserves_omitted_fields() {
        let mut canvas = CanvasData::with_pages(strings(&["p0", "p1"]));
        canvas.layers.single_doors = strings(&["sd0", "sd1"]);
        let before = canvas.clone();

        let patch: CanvasPatch = serde_json::from_str(r#"{"currentPage": 1}"#).unwrap();
        let replaced = apply_patch(&mut canvas, &patch).unwrap();

        assert!(replaced.is_empty());
        assert_eq!(canvas.current_page, 1);
        assert_eq!(canvas.layers, before.layers);
        assert_eq!(canvas.pages, before.pages);
    }

    #[test]
    fn test_patch_replaces_supplied_arrays() {
        let mut canvas = CanvasData::with_pages(strings(&["p0", "p1"]));
        canvas.layers.windows = strings(&["w0"]);

        let patch: CanvasPatch =
            serde_json::from_str(r#"{"windows": ["", "w1"], "double_doors": []}"#).unwrap();
        let replaced = apply_patch(&mut canvas, &patch).unwrap();

        assert_eq!(canvas.layers.windows, strings(&["", "w1"]));
        assert_eq!(replaced, vec![LayerKey::DoubleDoors, LayerKey::Windows]);
    }

    #[test]
    fn test_patch_validation() {
        let mut canvas = CanvasData::with_pages(strings(&["p0"]));
        let patch: CanvasPatch = serde_json::from_str(r#"{"currentPage": 4}"#).unwrap();
        assert!(apply_patch(&mut canvas.clone(), &patch).is_err());

        let patch: CanvasPatch = serde_json::from_str(r#"{"windows": ["a", "b"]}"#).unwrap();
        assert!(apply_patch(&mut canvas, &patch).is_err());
    }
}
