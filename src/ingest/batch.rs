//! Upload unit builder.

use super::IngestError;

/// A contiguous run of pages sent in one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// 0-based batch index.
    pub index: u32,
    /// Total number of batches in the upload.
    pub total: u32,
    /// Pages per batch for this upload; the last batch may be shorter.
    pub chunk_size: u32,
    /// Document name, carried by the first batch only.
    pub name: Option<String>,
    pub pages: Vec<String>,
}

impl Batch {
    /// Absolute index of this batch's first page.
    pub fn offset(&self) -> usize {
        self.index as usize * self.chunk_size as usize
    }

    pub fn is_first(&self) -> bool {
        self.index == 0
    }
}

/// Split `pages` into batches of at most `chunk_size`, in source order.
pub fn plan_batches(
    name: &str,
    pages: Vec<String>,
    chunk_size: usize,
) -> Result<Vec<Batch>, IngestError> {
    if pages.is_empty() {
        return Err(IngestError::Validation(
            "document has no pages to upload".to_string(),
        ));
    }
    if chunk_size == 0 {
        return Err(IngestError::Validation(
            "chunk size must be at least 1".to_string(),
        ));
    }

    let total = pages.len().div_ceil(chunk_size);
    let total = u32::try_from(total)
        .map_err(|_| IngestError::Validation(format!("too many batches: {}", total)))?;
    let chunk_size_u32 = u32::try_from(chunk_size)
        .map_err(|_| IngestError::Validation(format!("chunk size too large: {}", chunk_size)))?;

    let mut batches = Vec::with_capacity(total as usize);
    let mut pages = pages.into_iter();
    for index in 0..total {
        let chunk: Vec<String> = pages.by_ref().take(chunk_size).collect();
        batches.push(Batch {
            index,
            total,
            chunk_size: chunk_size_u32,
            name: (index == 0).then(|| name.to_string()),
            pages: chunk,
        });
    }

    Ok(batches)
}
