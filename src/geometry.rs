use anyhow::{anyhow, Context, Result};
use geo::MultiPolygon;
use geojson::{Feature, FeatureCollection, GeoJson};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

/// Loads a GeoJSON FeatureCollection. The whole file is read into memory.
pub fn load_feature_collection(path: &Path) -> Result<FeatureCollection> {
    info!("Loading GeoJSON from {:?}", path);
    let file = File::open(path)
        .with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
    let reader = BufReader::new(file);
    let geojson = GeoJson::from_reader(reader).context("Failed to parse GeoJSON")?;

    match geojson {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        _ => Err(anyhow!("GeoJSON must be a FeatureCollection: {:?}", path)),
    }
}

/// String or numeric property rendered as a string; anything else is `None`.
pub fn property_string(feature: &Feature, key: &str) -> Option<String> {
    let value = feature.properties.as_ref().and_then(|props| props.get(key));
    match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Polygonal geometry of a feature; points and lines yield `None`.
pub fn feature_polygons(feature: &Feature) -> Option<MultiPolygon<f64>> {
    let geometry = feature.geometry.as_ref()?;
    let geo_geometry: geo::Geometry<f64> = geometry.value.clone().try_into().ok()?;
    match geo_geometry {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon::new(vec![p])),
        _ => None,
    }
}
