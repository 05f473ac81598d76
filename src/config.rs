use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::fs;
use anyhow::{Context, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub source: SourceConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    pub locations: LocationsConfig,
    pub statistics: Option<StatisticsConfig>,
    pub geometry: GeometryConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Where sheets come from. `http` expands `url_template` with
/// `{source_id}`, `{range}` and `{access_key}`; `csv` reads `<dir>/<source_id>.csv`.
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    Http {
        url_template: String,
        #[serde(default = "default_access_key_env")]
        access_key_env: String,
    },
    Csv {
        dir: PathBuf,
    },
}

impl SourceConfig {
    /// Reads the access key from the configured environment variable.
    /// Blank values count as absent.
    pub fn access_key(&self) -> Option<String> {
        match self {
            SourceConfig::Http { access_key_env, .. } => std::env::var(access_key_env)
                .ok()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            SourceConfig::Csv { .. } => None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: default_ttl_secs() }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocationsConfig {
    pub sheet_id: String,
    pub range: String,
    #[serde(flatten)]
    pub columns: LocationColumns,
}

/// Header names (exact, case-sensitive) the row transformer reads.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LocationColumns {
    #[serde(default = "default_name_column")]
    pub name_column: String,
    #[serde(default = "default_coordinate_column")]
    pub coordinate_column: String,
    #[serde(default = "default_category_column")]
    pub category_column: String,
    /// Columns rendered as `label: value` lines in the detail content.
    #[serde(default)]
    pub visible_columns: Vec<String>,
    /// Columns holding image URLs; at most two are used per row.
    #[serde(default)]
    pub image_columns: Vec<String>,
}

impl Default for LocationColumns {
    fn default() -> Self {
        Self {
            name_column: default_name_column(),
            coordinate_column: default_coordinate_column(),
            category_column: default_category_column(),
            visible_columns: Vec::new(),
            image_columns: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StatisticsConfig {
    pub sheet_id: String,
    pub range: String,
    #[serde(flatten)]
    pub columns: StatColumns,
}

/// Column-name-to-field mapping for region statistics.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StatColumns {
    #[serde(default = "default_id_column")]
    pub id_column: String,
    #[serde(default = "default_stat_name_column")]
    pub name_column: String,
    #[serde(default = "default_population_column")]
    pub population_column: String,
    #[serde(default = "default_area_column")]
    pub area_column: String,
    #[serde(default = "default_derived_count_column")]
    pub derived_count_column: String,
    #[serde(default = "default_notes_column")]
    pub notes_column: String,
}

impl Default for StatColumns {
    fn default() -> Self {
        Self {
            id_column: default_id_column(),
            name_column: default_stat_name_column(),
            population_column: default_population_column(),
            area_column: default_area_column(),
            derived_count_column: default_derived_count_column(),
            notes_column: default_notes_column(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeometryConfig {
    pub regions: PathBuf,
    #[serde(default = "default_id_column")]
    pub region_id_property: String,
    #[serde(default = "default_stat_name_column")]
    pub region_name_property: String,
    pub overlay: Option<PathBuf>,
    #[serde(default = "default_discriminant_property")]
    pub overlay_discriminant_property: String,
    /// Empty means every overlay feature is rendered.
    #[serde(default)]
    pub overlay_filter: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            static_dir: default_static_dir(),
        }
    }
}

fn default_access_key_env() -> String { "SHEETS_API_KEY".to_string() }
fn default_ttl_secs() -> u64 { 300 }
fn default_name_column() -> String { "Name".to_string() }
fn default_coordinate_column() -> String { "Koordinaten".to_string() }
fn default_category_column() -> String { "Werbeträger".to_string() }
fn default_id_column() -> String { "id".to_string() }
fn default_stat_name_column() -> String { "name".to_string() }
fn default_population_column() -> String { "population".to_string() }
fn default_area_column() -> String { "area".to_string() }
fn default_derived_count_column() -> String { "count".to_string() }
fn default_notes_column() -> String { "notes".to_string() }
fn default_discriminant_property() -> String { "kind".to_string() }
fn default_port() -> u16 { 3000 }
fn default_static_dir() -> PathBuf { PathBuf::from("public") }

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }
}
