//! Hover/select/overlay state and the detail panel it drives.
//!
//! [`next_state`] is the whole transition table. [`InteractionController`]
//! applies it and performs the only side effects a transition has: restyling
//! the affected regions and recomputing the panel from the statistics index.

use geojson::FeatureCollection;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::layers::{MapSurface, RegionLayerController};
use crate::stats::Statistics;
use crate::types::{InteractionState, RegionStat};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "regionId", rename_all = "camelCase")]
pub enum InteractionEvent {
    PointerEnter(String),
    PointerLeave(String),
    Click(String),
    ToggleOverlay,
    ClosePanel,
}

/// Total transition function. Events naming regions that are not loaded
/// leave the state unchanged, as does leaving a region that is not hovered.
pub fn next_state(
    state: &InteractionState,
    event: &InteractionEvent,
    is_loaded: impl Fn(&str) -> bool,
) -> InteractionState {
    let mut next = state.clone();
    match event {
        InteractionEvent::PointerEnter(id) if is_loaded(id.as_str()) => {
            next.hovered_region_id = Some(id.clone());
        }
        InteractionEvent::PointerLeave(id) if state.is_hovered(id) => {
            next.hovered_region_id = None;
        }
        InteractionEvent::Click(id) if is_loaded(id.as_str()) => {
            next.selected_region_id = Some(id.clone());
        }
        InteractionEvent::ToggleOverlay => {
            next.overlay_visible = !state.overlay_visible;
        }
        InteractionEvent::ClosePanel => {
            next.selected_region_id = None;
        }
        InteractionEvent::PointerEnter(_) | InteractionEvent::PointerLeave(_) | InteractionEvent::Click(_) => {}
    }
    next
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PanelContent {
    /// Nothing focused, or no statistics row for the focused region.
    Prompt,
    Unavailable { reason: String },
    Region { stat: RegionStat },
}

pub trait PanelControl {
    fn open(&mut self);
    fn close(&mut self);
    fn toggle(&mut self);
    fn update(&mut self, heading: Option<String>, content: PanelContent);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailPanel {
    is_open: bool,
    heading: Option<String>,
    content: PanelContent,
}

impl Default for DetailPanel {
    fn default() -> Self {
        Self {
            is_open: false,
            heading: None,
            content: PanelContent::Prompt,
        }
    }
}

impl DetailPanel {
    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn heading(&self) -> Option<&str> {
        self.heading.as_deref()
    }

    pub fn content(&self) -> &PanelContent {
        &self.content
    }
}

impl PanelControl for DetailPanel {
    fn open(&mut self) {
        self.is_open = true;
    }

    fn close(&mut self) {
        self.is_open = false;
    }

    fn toggle(&mut self) {
        self.is_open = !self.is_open;
    }

    fn update(&mut self, heading: Option<String>, content: PanelContent) {
        self.heading = heading;
        self.content = content;
    }
}

pub struct InteractionController<S: MapSurface> {
    state: InteractionState,
    layers: RegionLayerController<S>,
    panel: DetailPanel,
    statistics: Statistics,
}

impl<S: MapSurface> InteractionController<S> {
    pub fn new(layers: RegionLayerController<S>, statistics: Statistics) -> Self {
        let mut controller = Self {
            state: InteractionState::default(),
            layers,
            panel: DetailPanel::default(),
            statistics,
        };
        controller.refresh_panel();
        controller
    }

    pub fn handle(&mut self, event: &InteractionEvent) -> &InteractionState {
        let layers = &self.layers;
        let next = next_state(&self.state, event, |id| layers.contains(id));
        let previous = std::mem::replace(&mut self.state, next);
        debug!("{:?}: {:?} -> {:?}", event, previous, self.state);

        if previous.overlay_visible != self.state.overlay_visible {
            self.layers.set_overlay_visible(&self.state);
        } else {
            let affected = [
                previous.hovered_region_id.as_deref(),
                self.state.hovered_region_id.as_deref(),
                previous.selected_region_id.as_deref(),
                self.state.selected_region_id.as_deref(),
            ];
            let mut ids: Vec<&str> = affected.into_iter().flatten().collect();
            ids.sort_unstable();
            ids.dedup();
            self.layers.restyle(ids, &self.state);
        }

        match event {
            InteractionEvent::Click(id) if self.state.is_selected(id) => {
                self.layers.zoom_to_region(id);
                self.panel.open();
            }
            InteractionEvent::ClosePanel => self.panel.close(),
            _ => {}
        }

        self.refresh_panel();
        &self.state
    }

    /// Replaces the region layer and drops hover/selection pointing at
    /// regions that no longer exist.
    pub fn load_regions(&mut self, collection: FeatureCollection) -> usize {
        let loaded = self.layers.load_regions(collection, &self.state);
        let dangling = |id: Option<&str>| id.is_some_and(|id| !self.layers.contains(id));
        if dangling(self.state.hovered_region_id.as_deref()) {
            self.state.hovered_region_id = None;
        }
        if dangling(self.state.selected_region_id.as_deref()) {
            self.state.selected_region_id = None;
            self.panel.close();
        }
        self.layers.restyle_all(&self.state);
        self.refresh_panel();
        loaded
    }

    pub fn load_overlay(&mut self, collection: FeatureCollection, filter: &[String]) -> usize {
        self.layers.load_overlay(collection, filter, &self.state)
    }

    pub fn set_statistics(&mut self, statistics: Statistics) {
        self.statistics = statistics;
        self.refresh_panel();
    }

    fn refresh_panel(&mut self) {
        let focused = self.state.focused_region_id();
        let heading = focused.and_then(|id| self.layers.region(id)).map(|r| r.name.clone());

        let content = match &self.statistics {
            Statistics::Unavailable { reason } => PanelContent::Unavailable { reason: reason.clone() },
            Statistics::Available(index) => match focused.and_then(|id| index.lookup(id)) {
                Some(stat) => PanelContent::Region { stat: stat.clone() },
                None => PanelContent::Prompt,
            },
        };
        self.panel.update(heading, content);
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    pub fn panel(&self) -> &DetailPanel {
        &self.panel
    }

    pub fn layers(&self) -> &RegionLayerController<S> {
        &self.layers
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StatColumns;
    use crate::geometry::tests::{collection, line_feature, square_feature};
    use crate::layers::{FeatureKeys, LayerKind};
    use crate::scene::SceneSurface;
    use crate::stats::StatisticsJoinIndex;
    use std::sync::Arc;

    fn statistics() -> Statistics {
        let header: Vec<String> = ["id", "name", "population"].iter().map(|s| s.to_string()).collect();
        let rows = vec![
            vec!["a".to_string(), "Alpha".to_string(), "100".to_string()],
            vec!["b".to_string(), "Beta".to_string(), "".to_string()],
        ];
        Statistics::Available(Arc::new(StatisticsJoinIndex::build(&header, &rows, &StatColumns::default())))
    }

    fn controller(statistics: Statistics) -> InteractionController<SceneSurface> {
        let layers = RegionLayerController::new(
            SceneSurface::default(),
            FeatureKeys {
                region_id: "id".to_string(),
                region_name: "name".to_string(),
                overlay_discriminant: "kind".to_string(),
            },
        );
        let mut controller = InteractionController::new(layers, statistics);
        controller.load_regions(collection(vec![
            square_feature("a", "Alpha", 0.0, 0.0, 1.0),
            square_feature("b", "Beta", 1.0, 0.0, 1.0),
            square_feature("c", "Gamma", 2.0, 0.0, 1.0),
        ]));
        controller.load_overlay(collection(vec![line_feature("U1")]), &[]);
        controller
    }

    fn enter(id: &str) -> InteractionEvent {
        InteractionEvent::PointerEnter(id.to_string())
    }
    fn leave(id: &str) -> InteractionEvent {
        InteractionEvent::PointerLeave(id.to_string())
    }
    fn click(id: &str) -> InteractionEvent {
        InteractionEvent::Click(id.to_string())
    }

    fn opacity(controller: &InteractionController<SceneSurface>, id: &str) -> f32 {
        controller.layers().surface().style(LayerKind::Regions, id).unwrap().opacity
    }

    #[test]
    fn test_hover_then_leave_returns_to_idle() {
        let mut ctl = controller(statistics());
        ctl.handle(&enter("a"));
        assert_eq!(ctl.state().hovered_region_id.as_deref(), Some("a"));
        assert_eq!(ctl.panel().content(), &PanelContent::Region {
            stat: ctl.statistics().index().unwrap().lookup("a").unwrap().clone()
        });
        assert_eq!(ctl.panel().heading(), Some("Alpha"));
        assert!(!ctl.panel().is_open());

        ctl.handle(&leave("a"));
        assert_eq!(ctl.state(), &InteractionState::default());
        assert_eq!(ctl.panel().content(), &PanelContent::Prompt);
    }

    #[test]
    fn test_leave_of_other_region_keeps_hover() {
        let mut ctl = controller(statistics());
        ctl.handle(&enter("a"));
        ctl.handle(&enter("b"));
        ctl.handle(&leave("a"));
        assert_eq!(ctl.state().hovered_region_id.as_deref(), Some("b"));
    }

    #[test]
    fn test_click_selects_zooms_and_opens() {
        let mut ctl = controller(statistics());
        ctl.handle(&click("b"));

        assert_eq!(ctl.state().selected_region_id.as_deref(), Some("b"));
        assert!(ctl.panel().is_open());
        assert_eq!(ctl.layers().surface().viewport(), Some([1.0, 0.0, 2.0, 1.0]));
        match ctl.panel().content() {
            PanelContent::Region { stat } => assert_eq!(stat.population, 0.0),
            other => panic!("unexpected panel content {:?}", other),
        }
    }

    #[test]
    fn test_selection_is_sticky_across_hover() {
        let mut ctl = controller(statistics());
        ctl.handle(&click("a"));
        ctl.handle(&enter("b"));
        ctl.handle(&leave("b"));
        ctl.handle(&enter("c"));

        assert_eq!(ctl.state().selected_region_id.as_deref(), Some("a"));
        assert_eq!(ctl.panel().heading(), Some("Alpha"));

        ctl.handle(&InteractionEvent::ClosePanel);
        assert!(ctl.state().selected_region_id.is_none());
        assert!(!ctl.panel().is_open());
        // Hover on c is still there; c has no statistics row.
        assert_eq!(ctl.panel().heading(), Some("Gamma"));
        assert_eq!(ctl.panel().content(), &PanelContent::Prompt);
    }

    #[test]
    fn test_overlay_toggle_while_hovering() {
        let mut ctl = controller(statistics());
        ctl.handle(&enter("b"));
        ctl.handle(&InteractionEvent::ToggleOverlay);

        assert!(ctl.state().overlay_visible);
        assert!(ctl.layers().surface().is_visible(LayerKind::Overlay));
        assert_eq!(opacity(&ctl, "b"), 1.0);
        assert_eq!(opacity(&ctl, "a"), 0.2);
        assert_eq!(opacity(&ctl, "c"), 0.2);

        // Moving the hover keeps the dimming consistent.
        ctl.handle(&leave("b"));
        ctl.handle(&enter("a"));
        assert_eq!(opacity(&ctl, "a"), 1.0);
        assert_eq!(opacity(&ctl, "b"), 0.2);

        ctl.handle(&InteractionEvent::ToggleOverlay);
        assert!(!ctl.layers().surface().is_visible(LayerKind::Overlay));
        assert_eq!(opacity(&ctl, "b"), 1.0);
        assert_eq!(opacity(&ctl, "c"), 1.0);
    }

    #[test]
    fn test_unknown_ids_leave_state_unchanged() {
        let mut ctl = controller(statistics());
        ctl.handle(&click("a"));
        let before = ctl.state().clone();
        ctl.handle(&enter("zz"));
        ctl.handle(&click("zz"));
        ctl.handle(&leave("zz"));
        assert_eq!(ctl.state(), &before);
    }

    #[test]
    fn test_unavailable_statistics_degrade_panel() {
        let mut ctl = controller(Statistics::unavailable("status 503"));
        ctl.handle(&click("a"));
        assert_eq!(
            ctl.panel().content(),
            &PanelContent::Unavailable { reason: "status 503".to_string() }
        );
        assert_eq!(ctl.panel().heading(), Some("Alpha"));

        ctl.set_statistics(statistics());
        assert!(matches!(ctl.panel().content(), PanelContent::Region { .. }));
    }

    #[test]
    fn test_region_reload_clears_dangling_selection() {
        let mut ctl = controller(statistics());
        ctl.handle(&click("c"));
        ctl.handle(&enter("a"));
        ctl.load_regions(collection(vec![square_feature("a", "Alpha", 0.0, 0.0, 1.0)]));

        assert!(ctl.state().selected_region_id.is_none());
        assert_eq!(ctl.state().hovered_region_id.as_deref(), Some("a"));
        assert!(!ctl.panel().is_open());
    }

    #[test]
    fn test_panel_capabilities() {
        let mut panel = DetailPanel::default();
        panel.toggle();
        assert!(panel.is_open());
        panel.toggle();
        assert!(!panel.is_open());
        panel.open();
        panel.update(Some("Alpha".to_string()), PanelContent::Prompt);
        assert_eq!(panel.heading(), Some("Alpha"));
        panel.close();
        assert!(!panel.is_open());
    }

    #[test]
    fn test_events_deserialize() {
        let event: InteractionEvent = serde_json::from_str(r#"{"type":"click","regionId":"a"}"#).unwrap();
        assert_eq!(event, click("a"));
        let event: InteractionEvent = serde_json::from_str(r#"{"type":"toggleOverlay"}"#).unwrap();
        assert_eq!(event, InteractionEvent::ToggleOverlay);
    }

    #[test]
    fn test_transitions_are_total_and_selection_moves_only_on_click() {
        let alphabet = [
            enter("a"),
            enter("b"),
            enter("zz"),
            leave("a"),
            leave("b"),
            click("a"),
            click("b"),
            click("zz"),
            InteractionEvent::ToggleOverlay,
        ];
        let loaded = |id: &str| id == "a" || id == "b";

        let mut frontier = vec![InteractionState::default()];
        for _ in 0..4 {
            let mut next_frontier = Vec::new();
            for state in &frontier {
                for event in &alphabet {
                    let next = next_state(state, event, loaded);

                    if !matches!(event, InteractionEvent::Click(_)) {
                        assert_eq!(next.selected_region_id, state.selected_region_id);
                    }
                    for id in [&next.hovered_region_id, &next.selected_region_id].into_iter().flatten() {
                        assert!(loaded(id.as_str()), "state references unloaded region {}", id);
                    }
                    if !matches!(event, InteractionEvent::ToggleOverlay) {
                        assert_eq!(next.overlay_visible, state.overlay_visible);
                    }
                    next_frontier.push(next);
                }
            }
            next_frontier.sort_by_key(|s| format!("{:?}", s));
            next_frontier.dedup();
            frontier = next_frontier;
        }
        // 3 hover values x 3 selection values x 2 overlay values.
        assert_eq!(frontier.len(), 18);
    }
}
