use geo::Rect;
use geojson::FeatureCollection;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::layers::{LayerKind, MapSurface, StyleSpec};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerScene {
    pub features: FeatureCollection,
    pub visible: bool,
    pub interactive: bool,
    pub styles: BTreeMap<String, StyleSpec>,
}

impl LayerScene {
    fn new(features: FeatureCollection) -> Self {
        Self {
            features,
            visible: true,
            interactive: false,
            styles: BTreeMap::new(),
        }
    }
}

/// Records what the core asks the rendering engine to draw, so a browser
/// front-end can replay it from one JSON document.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneSurface {
    pub regions: Option<LayerScene>,
    pub overlay: Option<LayerScene>,
    /// `[west, south, east, north]`
    pub viewport: Option<[f64; 4]>,
}

impl SceneSurface {
    fn layer(&self, kind: LayerKind) -> Option<&LayerScene> {
        match kind {
            LayerKind::Regions => self.regions.as_ref(),
            LayerKind::Overlay => self.overlay.as_ref(),
        }
    }

    fn layer_mut(&mut self, kind: LayerKind) -> Option<&mut LayerScene> {
        match kind {
            LayerKind::Regions => self.regions.as_mut(),
            LayerKind::Overlay => self.overlay.as_mut(),
        }
    }

    pub fn style(&self, kind: LayerKind, feature_id: &str) -> Option<&StyleSpec> {
        self.layer(kind).and_then(|layer| layer.styles.get(feature_id))
    }

    pub fn feature_count(&self, kind: LayerKind) -> usize {
        self.layer(kind).map_or(0, |layer| layer.features.features.len())
    }

    pub fn is_visible(&self, kind: LayerKind) -> bool {
        self.layer(kind).is_some_and(|layer| layer.visible)
    }

    pub fn is_interactive(&self, kind: LayerKind) -> bool {
        self.layer(kind).is_some_and(|layer| layer.interactive)
    }

    pub fn viewport(&self) -> Option<[f64; 4]> {
        self.viewport
    }
}

impl MapSurface for SceneSurface {
    fn create_layer(&mut self, kind: LayerKind, features: &FeatureCollection) {
        let layer = Some(LayerScene::new(features.clone()));
        match kind {
            LayerKind::Regions => self.regions = layer,
            LayerKind::Overlay => self.overlay = layer,
        }
    }

    fn set_feature_style(&mut self, kind: LayerKind, feature_id: &str, style: &StyleSpec) {
        if let Some(layer) = self.layer_mut(kind) {
            layer.styles.insert(feature_id.to_string(), style.clone());
        }
    }

    fn attach_handlers(&mut self, kind: LayerKind) {
        if let Some(layer) = self.layer_mut(kind) {
            layer.interactive = true;
        }
    }

    fn fit_bounds(&mut self, bounds: Rect<f64>) {
        self.viewport = Some([bounds.min().x, bounds.min().y, bounds.max().x, bounds.max().y]);
    }

    fn set_layer_visible(&mut self, kind: LayerKind, visible: bool) {
        if let Some(layer) = self.layer_mut(kind) {
            layer.visible = visible;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::tests::{collection, square_feature};
    use crate::layers::region_style;

    #[test]
    fn test_styles_need_a_layer() {
        let mut scene = SceneSurface::default();
        scene.set_feature_style(LayerKind::Regions, "a", &region_style(false, false, false));
        assert!(scene.style(LayerKind::Regions, "a").is_none());

        scene.create_layer(LayerKind::Regions, &collection(vec![square_feature("a", "A", 0.0, 0.0, 1.0)]));
        scene.set_feature_style(LayerKind::Regions, "a", &region_style(true, false, false));
        assert_eq!(scene.style(LayerKind::Regions, "a").unwrap().weight, 5.0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut scene = SceneSurface::default();
        scene.create_layer(LayerKind::Regions, &collection(vec![square_feature("a", "A", 0.0, 0.0, 1.0)]));
        scene.set_feature_style(LayerKind::Regions, "a", &region_style(false, false, true));
        scene.set_layer_visible(LayerKind::Regions, true);

        let json = serde_json::to_value(&scene).unwrap();
        assert_eq!(json["regions"]["styles"]["a"]["opacity"], serde_json::json!(0.2f32));
        assert_eq!(json["regions"]["features"]["type"], "FeatureCollection");
        assert!(json["overlay"].is_null());
    }
}
