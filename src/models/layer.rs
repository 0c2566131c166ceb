//! Layer keys and viewer toggle state.
//!
//! A layer key names one of the eight index-aligned image arrays a document
//! carries: the unannotated `pages` plus seven detection overlays.

use serde::{Deserialize, Serialize};

/// Name of an image array within a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKey {
    Pages,
    CompleteDoorsAndWindows,
    SingleDoors,
    DoubleDoors,
    Windows,
    SingleDoorsAndWindows,
    SingleDoorsAndDoubleDoors,
    DoubleDoorsAndWindows,
}

impl LayerKey {
    /// Every key, `pages` first.
    pub const ALL: [LayerKey; 8] = [
        Self::Pages,
        Self::CompleteDoorsAndWindows,
        Self::SingleDoors,
        Self::DoubleDoors,
        Self::Windows,
        Self::SingleDoorsAndWindows,
        Self::SingleDoorsAndDoubleDoors,
        Self::DoubleDoorsAndWindows,
    ];

    /// The seven detection category keys.
    pub const CATEGORIES: [LayerKey; 7] = [
        Self::CompleteDoorsAndWindows,
        Self::SingleDoors,
        Self::DoubleDoors,
        Self::Windows,
        Self::SingleDoorsAndWindows,
        Self::SingleDoorsAndDoubleDoors,
        Self::DoubleDoorsAndWindows,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pages => "pages",
            Self::CompleteDoorsAndWindows => "complete_doors_and_windows",
            Self::SingleDoors => "single_doors",
            Self::DoubleDoors => "double_doors",
            Self::Windows => "windows",
            Self::SingleDoorsAndWindows => "single_doors_and_windows",
            Self::SingleDoorsAndDoubleDoors => "single_doors_and_double_doors",
            Self::DoubleDoorsAndWindows => "double_doors_and_windows",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == s)
    }

    /// The base category this key represents, if it is one of the three.
    pub fn base_category(&self) -> Option<BaseCategory> {
        match self {
            Self::SingleDoors => Some(BaseCategory::SingleDoors),
            Self::DoubleDoors => Some(BaseCategory::DoubleDoors),
            Self::Windows => Some(BaseCategory::Windows),
            _ => None,
        }
    }
}

impl std::fmt::Display for LayerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the three independently detected categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseCategory {
    SingleDoors,
    DoubleDoors,
    Windows,
}

impl BaseCategory {
    pub const ALL: [BaseCategory; 3] = [Self::SingleDoors, Self::DoubleDoors, Self::Windows];

    pub fn layer_key(&self) -> LayerKey {
        match self {
            Self::SingleDoors => LayerKey::SingleDoors,
            Self::DoubleDoors => LayerKey::DoubleDoors,
            Self::Windows => LayerKey::Windows,
        }
    }
}

/// Per-category visibility switches owned by the viewer.
///
/// Never persisted; passed explicitly into layer resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewerToggles {
    pub single_doors: bool,
    pub double_doors: bool,
    pub windows: bool,
}

impl ViewerToggles {
    pub fn all() -> Self {
        Self {
            single_doors: true,
            double_doors: true,
            windows: true,
        }
    }

    pub fn get(&self, category: BaseCategory) -> bool {
        match category {
            BaseCategory::SingleDoors => self.single_doors,
            BaseCategory::DoubleDoors => self.double_doors,
            BaseCategory::Windows => self.windows,
        }
    }

    pub fn set(&mut self, category: BaseCategory, on: bool) {
        match category {
            BaseCategory::SingleDoors => self.single_doors = on,
            BaseCategory::DoubleDoors => self.double_doors = on,
            BaseCategory::Windows => self.windows = on,
        }
    }
}

/// Which base categories count as shown on a page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Availability {
    pub single_doors: bool,
    pub double_doors: bool,
    pub windows: bool,
}

impl Availability {
    pub fn new(single_doors: bool, double_doors: bool, windows: bool) -> Self {
        Self {
            single_doors,
            double_doors,
            windows,
        }
    }

    pub fn count(&self) -> usize {
        [self.single_doors, self.double_doors, self.windows]
            .into_iter()
            .filter(|on| *on)
            .count()
    }
}
