use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;

use crate::error::{IngestError, RowRejection};

/// One data row, positioned against the header row of its table.
pub type RawRow = Vec<String>;

/// A retrieved sheet: header row plus at least one data row.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl Table {
    pub fn from_values(source_id: &str, mut values: Vec<Vec<String>>) -> Result<Self, IngestError> {
        if values.len() < 2 {
            return Err(IngestError::EmptyDataset {
                source_id: source_id.to_string(),
                rows: values.len(),
            });
        }
        let header = values.remove(0);
        Ok(Self { header, rows: values })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedLocation {
    pub name: String,
    pub category: String,
    /// (lat, lon)
    pub coordinates: (f64, f64),
    pub detail_html: String,
}

/// Locations grouped by category, categories kept in first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryCollection {
    groups: Vec<(String, Vec<ParsedLocation>)>,
    index: HashMap<String, usize>,
}

impl CategoryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, location: ParsedLocation) {
        match self.index.get(&location.category) {
            Some(&i) => self.groups[i].1.push(location),
            None => {
                self.index.insert(location.category.clone(), self.groups.len());
                self.groups.push((location.category.clone(), vec![location]));
            }
        }
    }

    pub fn get(&self, category: &str) -> Option<&[ParsedLocation]> {
        self.index.get(category).map(|&i| self.groups[i].1.as_slice())
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ParsedLocation])> {
        self.groups.iter().map(|(name, locs)| (name.as_str(), locs.as_slice()))
    }

    /// Number of categories.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn location_count(&self) -> usize {
        self.groups.iter().map(|(_, locs)| locs.len()).sum()
    }
}

// Serialized as a JSON object whose key order follows first-seen category order.
impl Serialize for CategoryCollection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.groups.len()))?;
        for (name, locations) in &self.groups {
            map.serialize_entry(name, locations)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionStat {
    pub id: String,
    pub name: String,
    pub population: f64,
    pub area: f64,
    pub derived_count: f64,
    pub notes: String,
}

/// Row accounting for one transform or index build.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    /// For the statistics index this counts distinct regions; rows replaced
    /// by a later duplicate are not included.
    pub accepted: usize,
    pub skipped_blank: usize,
    pub rejected: Vec<RowRejection>,
}

impl IngestReport {
    pub fn total(&self) -> usize {
        self.accepted + self.skipped_blank + self.rejected.len()
    }
}

/// Output of the row transformer for one fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LocationBatch {
    pub collection: CategoryCollection,
    pub report: IngestReport,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionState {
    pub hovered_region_id: Option<String>,
    pub selected_region_id: Option<String>,
    pub overlay_visible: bool,
}

impl InteractionState {
    pub fn is_hovered(&self, region_id: &str) -> bool {
        self.hovered_region_id.as_deref() == Some(region_id)
    }

    pub fn is_selected(&self, region_id: &str) -> bool {
        self.selected_region_id.as_deref() == Some(region_id)
    }

    /// Region whose statistics the panel should show: selection wins over hover.
    pub fn focused_region_id(&self) -> Option<&str> {
        self.selected_region_id
            .as_deref()
            .or(self.hovered_region_id.as_deref())
    }
}
