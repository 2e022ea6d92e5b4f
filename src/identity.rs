use std::collections::BTreeMap;

use uuid::Uuid;

use crate::domain::{Guid, HucCode};
use crate::error::RsError;

pub fn new_guid() -> Guid {
    Guid::from_uuid(Uuid::new_v4())
}

const COLUMBIA_BASIN: &[(&str, &str)] = &[
    ("Asotin", "17060103"),
    ("Entiat", "17020010"),
    ("Imnaha", "17060102"),
    ("Klickitat", "17070106"),
    ("Lemhi", "17060204"),
    ("Lochsa", "17060303"),
    ("Lower Grande Ronde", "17060106"),
    ("Lower John Day", "17070204"),
    ("Methow", "17020008"),
    ("Middle Fork John Day", "17070203"),
    ("Naches", "17030002"),
    ("North Fork John Day", "17070202"),
    ("Okanogan", "17020006"),
    ("Pahsimeroi", "17060202"),
    ("South Fork Salmon", "17060208"),
    ("Tucannon", "17060107"),
    ("Umatilla", "17070103"),
    ("Upper Grande Ronde", "17060104"),
    ("Upper John Day", "17070201"),
    ("Upper Salmon", "17060201"),
    ("Upper Yakima", "17030001"),
    ("Walla Walla", "17070102"),
    ("Wallowa", "17060105"),
    ("Wenatchee", "17020011"),
];

/// Read-only lookup from watershed name to hydrologic unit code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatershedCatalog {
    entries: BTreeMap<String, HucCode>,
}

impl WatershedCatalog {
    pub fn new(entries: impl IntoIterator<Item = (String, HucCode)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Interior Columbia River basin watersheds modeled by the conductivity tools.
    pub fn columbia_basin() -> Self {
        let entries = COLUMBIA_BASIN
            .iter()
            .filter_map(|(name, code)| Some((name.to_string(), code.parse().ok()?)))
            .collect();
        Self { entries }
    }

    /// Returns a catalog with `other` layered over `self`; later names win.
    pub fn merged(mut self, other: WatershedCatalog) -> Self {
        self.entries.extend(other.entries);
        self
    }

    pub fn resolve(&self, watershed: &str) -> Result<&HucCode, RsError> {
        self.entries
            .get(watershed.trim())
            .ok_or_else(|| RsError::WatershedNotFound(watershed.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
