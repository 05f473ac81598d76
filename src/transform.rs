use std::collections::HashMap;
use tracing::{debug, warn};

use crate::config::LocationColumns;
use crate::error::{RejectReason, RowRejection};
use crate::types::{CategoryCollection, IngestReport, LocationBatch, ParsedLocation, RawRow};

/// Image references rendered per location.
const MAX_IMAGES: usize = 2;

/// Resolved header positions for one table.
struct ColumnIndex {
    name: Option<usize>,
    coordinates: Option<usize>,
    category: Option<usize>,
    visible: Vec<(String, usize)>,
    images: Vec<usize>,
}

impl ColumnIndex {
    fn resolve(columns: &LocationColumns, header: &[String]) -> Self {
        let col_indices: HashMap<&str, usize> = header
            .iter()
            .enumerate()
            .map(|(i, h)| (h.as_str(), i))
            .collect();

        let required = |name: &str| {
            let idx = col_indices.get(name).copied();
            if idx.is_none() {
                warn!("Column '{}' not found in header; every row will be skipped", name);
            }
            idx
        };

        Self {
            name: required(&columns.name_column),
            coordinates: required(&columns.coordinate_column),
            category: required(&columns.category_column),
            visible: columns
                .visible_columns
                .iter()
                .filter_map(|c| col_indices.get(c.as_str()).map(|&i| (c.clone(), i)))
                .collect(),
            images: columns
                .image_columns
                .iter()
                .filter_map(|c| col_indices.get(c.as_str()).copied())
                .collect(),
        }
    }
}

fn cell(row: &RawRow, idx: Option<usize>) -> &str {
    idx.and_then(|i| row.get(i)).map(|s| s.trim()).unwrap_or("")
}

/// Turns sheet rows into categorised locations. Holds only configuration,
/// so the same input always yields the same batch.
pub struct RowTransformer {
    columns: LocationColumns,
}

impl RowTransformer {
    pub fn new(columns: LocationColumns) -> Self {
        Self { columns }
    }

    pub fn transform(&self, header: &[String], rows: &[RawRow]) -> LocationBatch {
        let index = ColumnIndex::resolve(&self.columns, header);
        let mut collection = CategoryCollection::new();
        let mut report = IngestReport::default();

        for (i, row) in rows.iter().enumerate() {
            // Data rows start below the header on sheet row 1.
            let sheet_row = i + 2;
            let name = cell(row, index.name);
            let coordinate_cell = cell(row, index.coordinates);
            let category = cell(row, index.category);

            if name.is_empty() || coordinate_cell.is_empty() || category.is_empty() {
                debug!("Row {}: required cell blank, skipping", sheet_row);
                report.skipped_blank += 1;
                continue;
            }

            let Some(coordinates) = parse_coordinates(coordinate_cell) else {
                let reason = RejectReason::MalformedCoordinates {
                    cell: coordinate_cell.to_string(),
                };
                warn!("Row {} ('{}') rejected: {}", sheet_row, name, reason);
                report.rejected.push(RowRejection { row: sheet_row, reason });
                continue;
            };

            collection.push(ParsedLocation {
                name: name.to_string(),
                category: category.to_string(),
                coordinates,
                detail_html: detail_html(name, row, &index),
            });
            report.accepted += 1;
        }

        debug!(
            "Transformed {} rows: {} accepted, {} blank, {} rejected",
            rows.len(),
            report.accepted,
            report.skipped_blank,
            report.rejected.len()
        );

        LocationBatch { collection, report }
    }
}

/// Parses `"lat,lon"`. Anything other than exactly two finite numbers is `None`.
pub fn parse_coordinates(cell: &str) -> Option<(f64, f64)> {
    let mut parts = cell.split(',');
    let lat = parts.next()?.trim().parse::<f64>().ok()?;
    let lon = parts.next()?.trim().parse::<f64>().ok()?;
    if parts.next().is_some() || !lat.is_finite() || !lon.is_finite() {
        return None;
    }
    Some((lat, lon))
}

fn detail_html(name: &str, row: &RawRow, index: &ColumnIndex) -> String {
    let mut html = format!("<strong>{}</strong>", escape_html(name));

    for (label, idx) in &index.visible {
        let value = cell(row, Some(*idx));
        if value.is_empty() {
            continue;
        }
        html.push_str(&format!("<br>{}: {}", escape_html(label), escape_html(value)));
    }

    for src in index
        .images
        .iter()
        .map(|&idx| cell(row, Some(idx)))
        .filter(|src| !src.is_empty())
        .take(MAX_IMAGES)
    {
        html.push_str(&format!(
            "<br><img src=\"{}\" alt=\"{}\">",
            escape_html(src),
            escape_html(name)
        ));
    }

    html
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
