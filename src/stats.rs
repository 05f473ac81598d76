use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::StatColumns;
use crate::types::{IngestReport, RawRow, RegionStat};

/// Region statistics keyed by region identifier.
///
/// Built wholesale from one table. Rows without an identifier are skipped;
/// when an identifier repeats, the later row replaces the earlier one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatisticsJoinIndex {
    entries: HashMap<String, RegionStat>,
    report: IngestReport,
    duplicates: Vec<String>,
}

impl StatisticsJoinIndex {
    pub fn build(header: &[String], rows: &[RawRow], columns: &StatColumns) -> Self {
        let col_indices: HashMap<&str, usize> = header
            .iter()
            .enumerate()
            .map(|(i, h)| (h.as_str(), i))
            .collect();
        let position = |name: &str| col_indices.get(name).copied();

        let id_idx = position(&columns.id_column);
        if id_idx.is_none() {
            warn!("Join column '{}' not found in statistics header", columns.id_column);
        }
        let name_idx = position(&columns.name_column);
        let population_idx = position(&columns.population_column);
        let area_idx = position(&columns.area_column);
        let count_idx = position(&columns.derived_count_column);
        let notes_idx = position(&columns.notes_column);

        let mut index = Self::default();

        for (i, row) in rows.iter().enumerate() {
            let cell = move |idx: Option<usize>| idx.and_then(|i| row.get(i)).map(|s| s.trim()).unwrap_or("");

            let id = cell(id_idx);
            if id.is_empty() {
                debug!("Statistics row {} has no identifier, skipping", i + 2);
                index.report.skipped_blank += 1;
                continue;
            }

            let stat = RegionStat {
                id: id.to_string(),
                name: cell(name_idx).to_string(),
                population: coerce_number(cell(population_idx)),
                area: coerce_number(cell(area_idx)),
                derived_count: coerce_number(cell(count_idx)),
                notes: cell(notes_idx).to_string(),
            };

            if index.entries.insert(id.to_string(), stat).is_some() {
                warn!("Duplicate region id '{}' at row {}; keeping the later row", id, i + 2);
                index.duplicates.push(id.to_string());
            } else {
                index.report.accepted += 1;
            }
        }

        debug!("Indexed statistics for {} regions", index.entries.len());
        index
    }

    pub fn lookup(&self, id: &str) -> Option<&RegionStat> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn report(&self) -> &IngestReport {
        &self.report
    }

    /// Identifiers that appeared more than once, one element per overwrite.
    pub fn duplicates(&self) -> &[String] {
        &self.duplicates
    }
}

/// Blank, non-numeric and non-finite cells become 0.
pub fn coerce_number(cell: &str) -> f64 {
    cell.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// What the panel reads from. Loss of the statistics sheet degrades the panel,
/// never the map.
#[derive(Debug, Clone)]
pub enum Statistics {
    Available(Arc<StatisticsJoinIndex>),
    Unavailable { reason: String },
}

impl Statistics {
    pub fn unavailable(reason: impl ToString) -> Self {
        Statistics::Unavailable {
            reason: reason.to_string(),
        }
    }

    pub fn index(&self) -> Option<&StatisticsJoinIndex> {
        match self {
            Statistics::Available(index) => Some(index),
            Statistics::Unavailable { .. } => None,
        }
    }
}
