//! Region and overlay layers and their per-state styling.
//!
//! Region outline prominence and overlay visibility are one visual state:
//! [`region_style`] derives both from the full [`InteractionState`].

use geo::{BoundingRect, Contains, Coord, MultiPolygon, Point, Rect};
use geojson::FeatureCollection;
use rstar::{RTree, RTreeObject, AABB};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::geometry::{feature_polygons, property_string};
use crate::types::InteractionState;

const OUTLINE_COLOR: &str = "#3388ff";
const HIGHLIGHT_COLOR: &str = "#ff7800";
const SELECTED_COLOR: &str = "#e31a1c";
const DIMMED_OPACITY: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LayerKind {
    Regions,
    Overlay,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleSpec {
    pub color: &'static str,
    pub weight: f32,
    pub opacity: f32,
    pub dash_array: Option<&'static str>,
    pub fill: bool,
    pub fill_opacity: f32,
}

/// Hovered regions get a heavy solid highlight with fill. Everything else is
/// a thin dashed outline without fill, dimmed while the overlay is shown.
/// Selection only changes the outline colour.
pub fn region_style(is_hovered: bool, is_selected: bool, overlay_visible: bool) -> StyleSpec {
    if is_hovered {
        return StyleSpec {
            color: HIGHLIGHT_COLOR,
            weight: 5.0,
            opacity: 1.0,
            dash_array: None,
            fill: true,
            fill_opacity: 0.4,
        };
    }

    StyleSpec {
        color: if is_selected { SELECTED_COLOR } else { OUTLINE_COLOR },
        weight: 1.5,
        opacity: if overlay_visible { DIMMED_OPACITY } else { 1.0 },
        dash_array: Some("4 4"),
        fill: false,
        fill_opacity: 0.0,
    }
}

/// The narrow surface of the rendering engine the core drives.
pub trait MapSurface {
    /// Creates the layer, replacing any previous layer of the same kind.
    fn create_layer(&mut self, kind: LayerKind, features: &FeatureCollection);
    fn set_feature_style(&mut self, kind: LayerKind, feature_id: &str, style: &StyleSpec);
    /// Routes pointer enter/leave and click on the layer's features back as events.
    fn attach_handlers(&mut self, kind: LayerKind);
    fn fit_bounds(&mut self, bounds: Rect<f64>);
    fn set_layer_visible(&mut self, kind: LayerKind, visible: bool);
}

#[derive(Debug, Clone)]
pub struct Region {
    pub id: String,
    pub name: String,
    pub geometry: MultiPolygon<f64>,
    pub bounds: Rect<f64>,
}

// Wrapper for RTree indexing
struct RegionEnvelope {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for RegionEnvelope {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Property names read from region and overlay features.
#[derive(Debug, Clone)]
pub struct FeatureKeys {
    pub region_id: String,
    pub region_name: String,
    pub overlay_discriminant: String,
}

pub struct RegionLayerController<S: MapSurface> {
    surface: S,
    keys: FeatureKeys,
    regions: Vec<Region>,
    by_id: HashMap<String, usize>,
    tree: RTree<RegionEnvelope>,
    overlay_loaded: bool,
}

impl<S: MapSurface> RegionLayerController<S> {
    pub fn new(surface: S, keys: FeatureKeys) -> Self {
        Self {
            surface,
            keys,
            regions: Vec::new(),
            by_id: HashMap::new(),
            tree: RTree::new(),
            overlay_loaded: false,
        }
    }

    /// Replaces the region layer. Features without an identifier or without
    /// polygonal geometry are left out. Returns the number of regions loaded.
    pub fn load_regions(&mut self, collection: FeatureCollection, state: &InteractionState) -> usize {
        let mut regions = Vec::new();
        let mut by_id = HashMap::new();
        let mut kept = Vec::new();

        for feature in collection.features {
            let Some(id) = property_string(&feature, &self.keys.region_id) else {
                warn!("Region feature without '{}' property, skipping", self.keys.region_id);
                continue;
            };
            let Some(geometry) = feature_polygons(&feature) else {
                warn!("Region '{}' has no polygon geometry, skipping", id);
                continue;
            };
            let Some(bounds) = geometry.bounding_rect() else {
                warn!("Region '{}' has empty geometry, skipping", id);
                continue;
            };
            let name = property_string(&feature, &self.keys.region_name).unwrap_or_else(|| id.clone());

            match by_id.get(&id).copied() {
                Some(i) => {
                    warn!("Duplicate region id '{}' in geometry; keeping the later feature", id);
                    regions[i] = Region { id: id.clone(), name, geometry, bounds };
                    kept[i] = feature;
                }
                None => {
                    by_id.insert(id.clone(), regions.len());
                    regions.push(Region { id, name, geometry, bounds });
                    kept.push(feature);
                }
            }
        }

        let tree_items = regions
            .iter()
            .enumerate()
            .map(|(index, region)| RegionEnvelope {
                index,
                aabb: AABB::from_corners(
                    [region.bounds.min().x, region.bounds.min().y],
                    [region.bounds.max().x, region.bounds.max().y],
                ),
            })
            .collect();

        self.tree = RTree::bulk_load(tree_items);
        self.regions = regions;
        self.by_id = by_id;

        let layer = FeatureCollection {
            bbox: collection.bbox,
            features: kept,
            foreign_members: collection.foreign_members,
        };
        self.surface.create_layer(LayerKind::Regions, &layer);
        self.surface.attach_handlers(LayerKind::Regions);
        self.restyle_all(state);

        info!("Loaded {} regions", self.regions.len());
        self.regions.len()
    }

    /// Replaces the overlay layer. A non-empty `filter` keeps only features
    /// whose discriminant is listed. Returns the number of features rendered.
    pub fn load_overlay(&mut self, collection: FeatureCollection, filter: &[String], state: &InteractionState) -> usize {
        let discriminant = &self.keys.overlay_discriminant;
        let features: Vec<_> = collection
            .features
            .into_iter()
            .filter(|feature| {
                filter.is_empty()
                    || property_string(feature, discriminant).is_some_and(|d| filter.contains(&d))
            })
            .collect();
        let count = features.len();

        let layer = FeatureCollection {
            bbox: collection.bbox,
            features,
            foreign_members: collection.foreign_members,
        };
        self.surface.create_layer(LayerKind::Overlay, &layer);
        self.surface.set_layer_visible(LayerKind::Overlay, state.overlay_visible);
        self.overlay_loaded = true;

        info!("Loaded {} overlay features", count);
        count
    }

    /// Shows or hides the overlay per `state.overlay_visible` and restyles
    /// every region, whose outline opacity follows the same flag.
    pub fn set_overlay_visible(&mut self, state: &InteractionState) {
        if self.overlay_loaded {
            self.surface.set_layer_visible(LayerKind::Overlay, state.overlay_visible);
        }
        self.restyle_all(state);
    }

    pub fn style_for_state(&self, region_id: &str, state: &InteractionState) -> StyleSpec {
        region_style(
            state.is_hovered(region_id),
            state.is_selected(region_id),
            state.overlay_visible,
        )
    }

    /// Restyles the given regions; unknown ids are ignored.
    pub fn restyle<'a>(&mut self, region_ids: impl IntoIterator<Item = &'a str>, state: &InteractionState) {
        for id in region_ids {
            if self.by_id.contains_key(id) {
                let style = self.style_for_state(id, state);
                self.surface.set_feature_style(LayerKind::Regions, id, &style);
            }
        }
    }

    pub fn restyle_all(&mut self, state: &InteractionState) {
        for region in &self.regions {
            let style = region_style(
                state.is_hovered(&region.id),
                state.is_selected(&region.id),
                state.overlay_visible,
            );
            self.surface.set_feature_style(LayerKind::Regions, &region.id, &style);
        }
    }

    /// Fits the viewport to the region. Returns false for unknown ids.
    pub fn zoom_to_region(&mut self, region_id: &str) -> bool {
        match self.region(region_id) {
            Some(region) => {
                let bounds = region.bounds;
                debug!("Zooming to region '{}'", region_id);
                self.surface.fit_bounds(bounds);
                true
            }
            None => false,
        }
    }

    /// Region containing the coordinate, if any.
    pub fn region_at(&self, lat: f64, lon: f64) -> Option<&Region> {
        let point = Point::new(lon, lat);
        let envelope = AABB::from_point([lon, lat]);

        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .filter_map(|candidate| self.regions.get(candidate.index))
            .find(|region| region.geometry.contains(&point))
    }

    pub fn contains(&self, region_id: &str) -> bool {
        self.by_id.contains_key(region_id)
    }

    pub fn region(&self, region_id: &str) -> Option<&Region> {
        self.by_id.get(region_id).and_then(|&i| self.regions.get(i))
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Bounds covering every loaded region.
    pub fn extent(&self) -> Option<Rect<f64>> {
        let mut iter = self.regions.iter().map(|r| r.bounds);
        let first = iter.next()?;
        Some(iter.fold(first, |acc, b| {
            Rect::new(
                Coord { x: acc.min().x.min(b.min().x), y: acc.min().y.min(b.min().y) },
                Coord { x: acc.max().x.max(b.max().x), y: acc.max().y.max(b.max().y) },
            )
        }))
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::tests::{collection, line_feature, square_feature};
    use crate::scene::SceneSurface;

    fn keys() -> FeatureKeys {
        FeatureKeys {
            region_id: "id".to_string(),
            region_name: "name".to_string(),
            overlay_discriminant: "kind".to_string(),
        }
    }

    fn controller() -> RegionLayerController<SceneSurface> {
        let mut layers = RegionLayerController::new(SceneSurface::default(), keys());
        layers.load_regions(
            collection(vec![
                square_feature("a", "Alpha", 0.0, 0.0, 1.0),
                square_feature("b", "Beta", 1.0, 0.0, 1.0),
                square_feature("c", "Gamma", 0.0, 1.0, 1.0),
            ]),
            &InteractionState::default(),
        );
        layers
    }

    #[test]
    fn test_style_table() {
        let hovered = region_style(true, false, true);
        assert_eq!(hovered.opacity, 1.0);
        assert!(hovered.fill);
        assert!(hovered.dash_array.is_none());

        let idle = region_style(false, false, false);
        assert_eq!(idle.opacity, 1.0);
        assert!(!idle.fill);
        assert!(idle.dash_array.is_some());
        assert!(idle.weight < hovered.weight);

        assert_eq!(region_style(false, false, true).opacity, DIMMED_OPACITY);
        assert_eq!(region_style(false, true, true).opacity, DIMMED_OPACITY);
        assert_eq!(region_style(false, true, false).color, SELECTED_COLOR);
    }

    #[test]
    fn test_overlay_dims_all_but_hovered() {
        let mut layers = controller();
        let state = InteractionState {
            hovered_region_id: Some("b".to_string()),
            selected_region_id: None,
            overlay_visible: true,
        };
        layers.set_overlay_visible(&state);

        let scene = layers.surface();
        assert_eq!(scene.style(LayerKind::Regions, "b").unwrap().opacity, 1.0);
        assert_eq!(scene.style(LayerKind::Regions, "a").unwrap().opacity, 0.2);
        assert_eq!(scene.style(LayerKind::Regions, "c").unwrap().opacity, 0.2);
    }

    #[test]
    fn test_load_regions_skips_unusable_features() {
        let mut no_id = square_feature("x", "X", 5.0, 5.0, 1.0);
        if let Some(props) = no_id.properties.as_mut() {
            props.remove("id");
        }
        let mut line = line_feature("U1");
        if let Some(props) = line.properties.as_mut() {
            props.insert("id".to_string(), serde_json::json!("line"));
        }

        let mut layers = RegionLayerController::new(SceneSurface::default(), keys());
        let loaded = layers.load_regions(
            collection(vec![square_feature("a", "Alpha", 0.0, 0.0, 1.0), no_id, line]),
            &InteractionState::default(),
        );

        assert_eq!(loaded, 1);
        assert!(layers.contains("a"));
        assert!(!layers.contains("line"));
        assert_eq!(layers.surface().feature_count(LayerKind::Regions), 1);
        assert!(layers.surface().is_interactive(LayerKind::Regions));
    }

    #[test]
    fn test_reload_replaces_regions() {
        let mut layers = controller();
        layers.load_regions(
            collection(vec![square_feature("z", "Zeta", 0.0, 0.0, 1.0)]),
            &InteractionState::default(),
        );
        assert!(!layers.contains("a"));
        assert_eq!(layers.regions().len(), 1);
        assert!(layers.surface().style(LayerKind::Regions, "a").is_none());
    }

    #[test]
    fn test_overlay_filter() {
        let mut layers = controller();
        let features = || collection(vec![line_feature("U1"), line_feature("U2"), line_feature("S1")]);

        let all = layers.load_overlay(features(), &[], &InteractionState::default());
        assert_eq!(all, 3);

        let filtered = layers.load_overlay(features(), &["U2".to_string(), "S1".to_string()], &InteractionState::default());
        assert_eq!(filtered, 2);
        assert_eq!(layers.surface().feature_count(LayerKind::Overlay), 2);
        assert!(!layers.surface().is_visible(LayerKind::Overlay));
    }

    #[test]
    fn test_region_at_and_zoom() {
        let mut layers = controller();
        assert_eq!(layers.region_at(0.5, 1.5).map(|r| r.id.as_str()), Some("b"));
        assert_eq!(layers.region_at(1.5, 0.5).map(|r| r.name.as_str()), Some("Gamma"));
        assert!(layers.region_at(10.0, 10.0).is_none());

        assert!(layers.zoom_to_region("c"));
        assert_eq!(layers.surface().viewport(), Some([0.0, 1.0, 1.0, 2.0]));
        assert!(!layers.zoom_to_region("nope"));

        let extent = layers.extent().unwrap();
        assert_eq!((extent.min().x, extent.max().x, extent.max().y), (0.0, 2.0, 2.0));
    }
}
