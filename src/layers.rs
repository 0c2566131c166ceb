//! Layer resolution: which image array represents the current view of a page.
//!
//! Detection runs produce one overlay per base category (single doors, double
//! doors, windows) and one per combination of them. Given the viewer toggles,
//! [`resolve`] picks the single composite key to show. A category counts as
//! shown on a page only when its toggle is on *and* its own array has an image
//! for that page.

use crate::models::{Availability, BaseCategory, CanvasData, LayerKey, ViewerToggles};

/// Map a set of shown base categories to the composite key naming exactly them.
pub fn key_for(availability: Availability) -> LayerKey {
    match (
        availability.single_doors,
        availability.double_doors,
        availability.windows,
    ) {
        (true, true, true) => LayerKey::CompleteDoorsAndWindows,
        (true, true, false) => LayerKey::SingleDoorsAndDoubleDoors,
        (true, false, true) => LayerKey::SingleDoorsAndWindows,
        (false, true, true) => LayerKey::DoubleDoorsAndWindows,
        (true, false, false) => LayerKey::SingleDoors,
        (false, true, false) => LayerKey::DoubleDoors,
        (false, false, true) => LayerKey::Windows,
        (false, false, false) => LayerKey::Pages,
    }
}

/// Base categories that are both toggled on and detected on `page`.
pub fn availability(canvas: &CanvasData, page: usize, toggles: ViewerToggles) -> Availability {
    let shown = |category: BaseCategory| {
        toggles.get(category) && canvas.entry(category.layer_key(), page).is_some()
    };
    Availability::new(
        shown(BaseCategory::SingleDoors),
        shown(BaseCategory::DoubleDoors),
        shown(BaseCategory::Windows),
    )
}

/// Pick the layer key to display for `page`.
///
/// Always returns one of the eight keys. The chosen array is not guaranteed to
/// hold an entry for the page; use [`resolve_image`] for the value with the
/// `pages` fallback applied.
pub fn resolve(page: usize, canvas: &CanvasData, toggles: ViewerToggles) -> LayerKey {
    let detected = BaseCategory::ALL
        .iter()
        .any(|category| canvas.entry(category.layer_key(), page).is_some());
    if !detected {
        return LayerKey::Pages;
    }

    key_for(availability(canvas, page, toggles))
}

/// The image chosen for a page along with the key it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedView<'a> {
    /// Key picked by [`resolve`].
    pub resolved: LayerKey,
    /// Key the image was actually read from (`pages` after a fallback).
    pub source: LayerKey,
    pub image: &'a str,
}

impl ResolvedView<'_> {
    pub fn fell_back(&self) -> bool {
        self.resolved != self.source
    }
}

/// Resolve `page` to an image, falling back to `pages` when the resolved
/// array has no entry there. Returns `None` only if `pages` has none either.
pub fn resolve_image(
    page: usize,
    canvas: &CanvasData,
    toggles: ViewerToggles,
) -> Option<ResolvedView<'_>> {
    let resolved = resolve(page, canvas, toggles);
    lookup_with_fallback(canvas, page, resolved)
}

/// Read `key` at `page`, falling back to `pages`.
pub fn lookup_with_fallback(
    canvas: &CanvasData,
    page: usize,
    key: LayerKey,
) -> Option<ResolvedView<'_>> {
    if let Some(image) = canvas.entry(key, page) {
        return Some(ResolvedView {
            resolved: key,
            source: key,
            image,
        });
    }

    if key != LayerKey::Pages {
        tracing::debug!(layer = %key, page, "layer entry missing, showing source page");
    }

    canvas.entry(LayerKey::Pages, page).map(|image| ResolvedView {
        resolved: key,
        source: LayerKey::Pages,
        image,
    })
}
