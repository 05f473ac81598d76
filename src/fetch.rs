//! Sheet retrieval and the time-boxed cache in front of it.
//!
//! A [`TabularFetchCache`] owns one entry per `(source_id, range)` and decodes
//! each retrieved [`Table`] once, on the way into the cache. Expired entries
//! are treated as absent. A failed retrieval leaves the cache untouched and
//! never falls back to an expired entry.
//!
//! Two cold-cache calls for the same key may both hit the network; whichever
//! completes last owns the entry. Responses that complete after
//! [`TabularFetchCache::invalidate`] are handed to their caller but never
//! written into the cache.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::IngestError;
use crate::types::Table;

#[async_trait]
pub trait TableSource: Send + Sync {
    /// Returns the raw cell grid; `values[0]` is the header row.
    async fn fetch_values(&self, source_id: &str, range: &str) -> Result<Vec<Vec<String>>, IngestError>;
}

/// Sheets-style values endpoint answering `{ "values": [[...], ...] }`.
pub struct HttpTableSource {
    client: reqwest::Client,
    url_template: String,
    access_key: String,
}

#[derive(Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

impl HttpTableSource {
    pub fn new(url_template: impl Into<String>, access_key: Option<String>) -> Result<Self, IngestError> {
        let access_key = access_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(IngestError::MissingAccessKey)?;
        Ok(Self {
            client: reqwest::Client::new(),
            url_template: url_template.into(),
            access_key,
        })
    }

    pub fn request_url(&self, source_id: &str, range: &str) -> Result<Url, IngestError> {
        let expanded = self
            .url_template
            .replace("{source_id}", &encode(source_id))
            .replace("{range}", &encode(range))
            .replace("{access_key}", &encode(&self.access_key));
        Url::parse(&expanded).map_err(|e| IngestError::unavailable(source_id, format!("bad url: {}", e)))
    }
}

fn encode(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

fn cell_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl TableSource for HttpTableSource {
    async fn fetch_values(&self, source_id: &str, range: &str) -> Result<Vec<Vec<String>>, IngestError> {
        let url = self.request_url(source_id, range)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| IngestError::unavailable(source_id, format!("request failed: {}", e.without_url())))?;

        if !response.status().is_success() {
            return Err(IngestError::unavailable(
                source_id,
                format!("status {}", response.status()),
            ));
        }

        let body: ValuesResponse = response
            .json()
            .await
            .map_err(|e| IngestError::unavailable(source_id, format!("invalid body: {}", e.without_url())))?;

        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect())
    }
}

/// Reads `<dir>/<source_id>.csv`. The range is ignored; the whole file is the table.
pub struct CsvTableSource {
    dir: PathBuf,
}

impl CsvTableSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn parse(source_id: &str, content: &str) -> Result<Vec<Vec<String>>, IngestError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(content.as_bytes());

        let mut values = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| IngestError::unavailable(source_id, e))?;
            values.push(record.iter().map(str::to_string).collect());
        }
        Ok(values)
    }
}

#[async_trait]
impl TableSource for CsvTableSource {
    async fn fetch_values(&self, source_id: &str, range: &str) -> Result<Vec<Vec<String>>, IngestError> {
        let path = self.dir.join(format!("{}.csv", source_id));
        debug!("Reading {:?} (range '{}' ignored for csv)", path, range);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| IngestError::unavailable(source_id, format!("{:?}: {}", path, e)))?;
        Self::parse(source_id, &content)
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DatasetKey {
    source_id: String,
    range: String,
}

impl DatasetKey {
    fn new(source_id: &str, range: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            range: range.to_string(),
        }
    }
}

struct CacheEntry<T> {
    data: Arc<T>,
    fetched_at: Instant,
}

struct CacheState<T> {
    entries: HashMap<DatasetKey, CacheEntry<T>>,
    generation: u64,
}

type Decode<T> = Box<dyn Fn(&Table) -> T + Send + Sync>;

pub struct TabularFetchCache<T> {
    source: Arc<dyn TableSource>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    decode: Decode<T>,
    state: Mutex<CacheState<T>>,
}

impl<T> TabularFetchCache<T> {
    pub fn new(
        source: Arc<dyn TableSource>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        decode: impl Fn(&Table) -> T + Send + Sync + 'static,
    ) -> Self {
        Self {
            source,
            clock,
            ttl,
            decode: Box::new(decode),
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                generation: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_valid(&self, entry: &CacheEntry<T>, now: Instant) -> bool {
        now.saturating_duration_since(entry.fetched_at) < self.ttl
    }

    pub async fn fetch(&self, source_id: &str, range: &str) -> Result<Arc<T>, IngestError> {
        let key = DatasetKey::new(source_id, range);

        let generation = {
            let mut state = self.lock();
            let now = self.clock.now();
            if let Some(entry) = state.entries.get(&key) {
                if self.is_valid(entry, now) {
                    debug!("Cache hit for {}!{}", source_id, range);
                    return Ok(Arc::clone(&entry.data));
                }
            }
            if state.entries.remove(&key).is_some() {
                debug!("Cache entry for {}!{} expired", source_id, range);
            } else {
                debug!("Cache miss for {}!{}", source_id, range);
            }
            state.generation
        };

        let values = self.source.fetch_values(source_id, range).await.map_err(|e| {
            warn!("Fetching {}!{} failed: {}", source_id, range, e);
            e
        })?;
        let table = Table::from_values(source_id, values)?;
        info!("Fetched {} data rows from {}", table.rows.len(), source_id);

        let data = Arc::new((self.decode)(&table));

        let mut state = self.lock();
        if state.generation == generation {
            state.entries.insert(
                key,
                CacheEntry {
                    data: Arc::clone(&data),
                    fetched_at: self.clock.now(),
                },
            );
        } else {
            debug!("Discarding stale response for {}!{}", source_id, range);
        }
        Ok(data)
    }

    /// Drops every entry and supersedes any retrieval still in flight.
    pub fn invalidate(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.generation += 1;
    }

    pub fn is_fresh(&self, source_id: &str, range: &str) -> bool {
        let state = self.lock();
        let now = self.clock.now();
        state
            .entries
            .get(&DatasetKey::new(source_id, range))
            .is_some_and(|entry| self.is_valid(entry, now))
    }
}
