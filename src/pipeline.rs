use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{AppConfig, LocationsConfig, SourceConfig, StatisticsConfig};
use crate::error::IngestError;
use crate::fetch::{Clock, CsvTableSource, HttpTableSource, SystemClock, TableSource, TabularFetchCache};
use crate::stats::{Statistics, StatisticsJoinIndex};
use crate::transform::RowTransformer;
use crate::types::LocationBatch;

/// Builds the configured table source. `None` means there is no usable
/// access key, and everything fed by the sheet degrades.
pub fn build_source(config: &SourceConfig) -> Option<Arc<dyn TableSource>> {
    match config {
        SourceConfig::Http { url_template, .. } => {
            match HttpTableSource::new(url_template.clone(), config.access_key()) {
                Ok(source) => Some(Arc::new(source) as Arc<dyn TableSource>),
                Err(e) => {
                    warn!("Tabular source disabled: {}", e);
                    None
                }
            }
        }
        SourceConfig::Csv { dir } => Some(Arc::new(CsvTableSource::new(dir.clone())) as Arc<dyn TableSource>),
    }
}

struct Dataset<T> {
    sheet_id: String,
    range: String,
    cache: TabularFetchCache<T>,
}

impl<T> Dataset<T> {
    async fn fetch(&self) -> Result<Arc<T>, IngestError> {
        self.cache.fetch(&self.sheet_id, &self.range).await
    }
}

/// Fetch → cache → transform for the location sheet and the statistics sheet.
pub struct IngestionPipeline {
    locations: Option<Dataset<LocationBatch>>,
    statistics: Option<Dataset<StatisticsJoinIndex>>,
}

impl IngestionPipeline {
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(build_source(&config.source), Arc::new(SystemClock), config)
    }

    pub fn new(source: Option<Arc<dyn TableSource>>, clock: Arc<dyn Clock>, config: &AppConfig) -> Self {
        let ttl = config.cache.ttl();

        let locations = source.clone().map(|source| {
            let LocationsConfig { sheet_id, range, columns } = config.locations.clone();
            let transformer = RowTransformer::new(columns);
            Dataset {
                sheet_id,
                range,
                cache: TabularFetchCache::new(source, Arc::clone(&clock), ttl, move |table| {
                    transformer.transform(&table.header, &table.rows)
                }),
            }
        });

        let statistics = match (source, config.statistics.clone()) {
            (Some(source), Some(StatisticsConfig { sheet_id, range, columns })) => Some(Dataset {
                sheet_id,
                range,
                cache: TabularFetchCache::new(source, clock, ttl, move |table| {
                    StatisticsJoinIndex::build(&table.header, &table.rows, &columns)
                }),
            }),
            _ => None,
        };

        Self { locations, statistics }
    }

    pub async fn load_locations(&self) -> Result<Arc<LocationBatch>, IngestError> {
        let dataset = self.locations.as_ref().ok_or(IngestError::MissingAccessKey)?;
        let batch = dataset.fetch().await?;
        info!(
            "Locations ready: {} categories, {} locations, {} rows rejected",
            batch.collection.len(),
            batch.collection.location_count(),
            batch.report.rejected.len()
        );
        Ok(batch)
    }

    /// Never fails; a missing sheet, key or response yields `Unavailable`.
    pub async fn load_statistics(&self) -> Statistics {
        let Some(dataset) = &self.statistics else {
            return Statistics::unavailable("statistics source not configured");
        };
        match dataset.fetch().await {
            Ok(index) => {
                info!("Statistics ready for {} regions", index.len());
                Statistics::Available(index)
            }
            Err(e) => {
                warn!("Statistics unavailable: {}", e);
                Statistics::unavailable(e)
            }
        }
    }

    /// Forces the next load of either dataset to hit the source.
    pub fn invalidate(&self) {
        if let Some(dataset) = &self.locations {
            dataset.cache.invalidate();
        }
        if let Some(dataset) = &self.statistics {
            dataset.cache.invalidate();
        }
    }
}
