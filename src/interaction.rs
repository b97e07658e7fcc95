use crate::geometry::CellKey;
use crate::grid::HighlightTarget;
use crate::primitives::{CameraView, GroundPicker, ScreenPoint};
use h3o::{LatLng, Resolution};
use log::info;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionParams {
    /// Pointer travel while held down that turns a press into a drag.
    pub drag_threshold_px: f32,
    pub hover_alpha: f64,
    pub selected_alpha: f64,
}

impl Default for InteractionParams {
    fn default() -> Self {
        Self {
            drag_threshold_px: 5.0,
            hover_alpha: 0.4,
            selected_alpha: 0.65,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PointerPhase {
    Idle,
    PointerDown { origin: ScreenPoint },
    /// Stays set after release until the click it produces has been swallowed.
    Dragging,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClickOutcome {
    /// The click ended a camera drag.
    Suppressed,
    Deselected,
    Selected(CellKey),
    /// Nothing selectable under the pointer.
    Missed,
}

/// Pointer, hover and selection state fed into each grid update.
#[derive(Clone, Debug)]
pub struct InteractionState {
    params: InteractionParams,
    pointer: Option<ScreenPoint>,
    phase: PointerPhase,
    hover: Option<CellKey>,
    hover_target: f64,
    selected: Option<CellKey>,
}

impl Default for InteractionState {
    fn default() -> Self {
        Self::new(InteractionParams::default())
    }
}

impl InteractionState {
    pub fn new(params: InteractionParams) -> Self {
        Self {
            params,
            pointer: None,
            phase: PointerPhase::Idle,
            hover: None,
            hover_target: 0.0,
            selected: None,
        }
    }

    pub fn pointer(&self) -> Option<ScreenPoint> {
        self.pointer
    }

    pub fn phase(&self) -> PointerPhase {
        self.phase
    }

    pub fn is_dragging(&self) -> bool {
        self.phase == PointerPhase::Dragging
    }

    pub fn hover(&self) -> Option<CellKey> {
        self.hover
    }

    pub fn selected(&self) -> Option<CellKey> {
        self.selected
    }

    pub fn pointer_down(&mut self, at: ScreenPoint) {
        self.pointer = Some(at);
        self.phase = PointerPhase::PointerDown { origin: at };
    }

    pub fn pointer_move(&mut self, to: ScreenPoint) {
        self.pointer = Some(to);
        if let PointerPhase::PointerDown { origin } = self.phase {
            let threshold = self.params.drag_threshold_px;
            if origin.distance_sq(to) > threshold * threshold {
                self.phase = PointerPhase::Dragging;
            }
        }
    }

    pub fn pointer_up(&mut self) {
        if let PointerPhase::PointerDown { .. } = self.phase {
            self.phase = PointerPhase::Idle;
        }
    }

    pub fn pointer_leave(&mut self) {
        self.pointer = None;
    }

    /// Handles a click at `at`. `primary` is the resolution new selections are made at.
    pub fn click<P: GroundPicker + ?Sized>(
        &mut self,
        at: ScreenPoint,
        picker: &P,
        primary: Resolution,
    ) -> ClickOutcome {
        if self.is_dragging() {
            self.phase = PointerPhase::Idle;
            return ClickOutcome::Suppressed;
        }
        self.phase = PointerPhase::Idle;

        if let Some(previous) = self.selected.take() {
            info!("deselected cell {previous}");
            self.clear_hover();
            return ClickOutcome::Deselected;
        }

        match picker.pick_ground(at) {
            Some(ground) => {
                let key = CellKey::from_cell(ground.to_cell(primary));
                info!("selected cell {key}");
                self.selected = Some(key);
                self.hover = Some(key);
                self.hover_target = self.params.selected_alpha;
                ClickOutcome::Selected(key)
            }
            None => ClickOutcome::Missed,
        }
    }

    /// Re-resolves the hovered cell under the pointer. A selection pins the
    /// highlight, so nothing changes while one exists.
    pub fn refresh_hover<P: GroundPicker + ?Sized>(&mut self, picker: &P, primary: Resolution) {
        if self.selected.is_some() {
            return;
        }
        match self.pointer.and_then(|p| picker.pick_ground(p)) {
            Some(ground) => {
                self.hover = Some(CellKey::from_cell(ground.to_cell(primary)));
                self.hover_target = self.params.hover_alpha;
            }
            None => self.clear_hover(),
        }
    }

    fn clear_hover(&mut self) {
        self.hover = None;
        self.hover_target = 0.0;
    }

    /// Where the grid is centred this frame: the selected cell, else the
    /// ground under the pointer, else the ground under the viewport centre.
    pub fn grid_center<C: CameraView + ?Sized>(&self, camera: &C) -> LatLng {
        if let Some(selected) = self.selected {
            return selected.center();
        }
        self.pointer
            .and_then(|p| camera.pick_ground(p))
            .or_else(|| camera.pick_ground(camera.viewport_center()))
            .unwrap_or_else(null_island)
    }

    pub fn highlight_target(&self) -> HighlightTarget {
        HighlightTarget {
            cell: self.hover,
            target_alpha: self.hover_target,
            selected: self.hover.is_some() && self.hover == self.selected,
        }
    }
}

pub(crate) fn null_island() -> LatLng {
    LatLng::new(0.0, 0.0).expect("valid lat/lng")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::testing::FakeCamera;

    const RES: Resolution = Resolution::Four;

    fn camera() -> FakeCamera {
        FakeCamera::at_height(1e6)
    }

    fn cell_at(lat: f64, lng: f64) -> CellKey {
        CellKey::from_cell(LatLng::new(lat, lng).unwrap().to_cell(RES))
    }

    #[test]
    fn click_after_drag_is_swallowed() {
        let cam = camera();
        let mut state = InteractionState::default();
        let start = FakeCamera::point_for(10.0, 10.0);
        state.pointer_down(start);
        state.pointer_move(ScreenPoint::new(start.x + 6.0, start.y));
        assert!(state.is_dragging());
        state.pointer_up();
        assert!(state.is_dragging());

        let outcome = state.click(ScreenPoint::new(start.x + 6.0, start.y), &cam, RES);
        assert_eq!(outcome, ClickOutcome::Suppressed);
        assert_eq!(state.selected(), None);
        assert!(!state.is_dragging());
    }

    #[test]
    fn small_wobble_is_still_a_click() {
        let cam = camera();
        let mut state = InteractionState::default();
        let start = FakeCamera::point_for(10.0, 10.0);
        state.pointer_down(start);
        state.pointer_move(ScreenPoint::new(start.x + 3.0, start.y + 4.0));
        assert!(!state.is_dragging());
        state.pointer_up();
        assert_eq!(state.phase(), PointerPhase::Idle);

        let outcome = state.click(start, &cam, RES);
        assert_eq!(outcome, ClickOutcome::Selected(cell_at(10.0, 10.0)));
    }

    #[test]
    fn selection_pins_hover_and_clicking_again_clears_both() {
        let cam = camera();
        let mut state = InteractionState::default();
        let at = FakeCamera::point_for(-20.0, 45.0);

        let ClickOutcome::Selected(key) = state.click(at, &cam, RES) else {
            panic!("expected a selection");
        };
        assert_eq!(state.hover(), Some(key));
        let target = state.highlight_target();
        assert!(target.selected);
        assert_eq!(target.target_alpha, 0.65);

        // moving while selected leaves the highlight alone
        state.pointer_move(FakeCamera::point_for(30.0, 30.0));
        state.refresh_hover(&cam, RES);
        assert_eq!(state.hover(), Some(key));

        let outcome = state.click(FakeCamera::point_for(50.0, 50.0), &cam, RES);
        assert_eq!(outcome, ClickOutcome::Deselected);
        assert_eq!(state.selected(), None);
        assert_eq!(state.hover(), None);
        assert_eq!(state.highlight_target(), HighlightTarget::default());
    }

    #[test]
    fn hover_tracks_pointer_and_clears_off_globe() {
        let cam = camera();
        let mut state = InteractionState::default();

        state.pointer_move(FakeCamera::point_for(5.0, 5.0));
        state.refresh_hover(&cam, RES);
        assert_eq!(state.hover(), Some(cell_at(5.0, 5.0)));
        let target = state.highlight_target();
        assert!(!target.selected);
        assert_eq!(target.target_alpha, 0.4);

        state.pointer_move(ScreenPoint::new(-50.0, -50.0));
        state.refresh_hover(&cam, RES);
        assert_eq!(state.hover(), None);

        state.pointer_move(FakeCamera::point_for(5.0, 5.0));
        state.refresh_hover(&cam, RES);
        state.pointer_leave();
        state.refresh_hover(&cam, RES);
        assert_eq!(state.hover(), None);
    }

    #[test]
    fn click_off_globe_selects_nothing() {
        let cam = camera();
        let mut state = InteractionState::default();
        let outcome = state.click(ScreenPoint::new(1000.0, 1000.0), &cam, RES);
        assert_eq!(outcome, ClickOutcome::Missed);
        assert_eq!(state.selected(), None);
    }

    #[test]
    fn grid_center_prefers_selection_then_pointer_then_viewport() {
        let cam = camera();
        let mut state = InteractionState::default();

        // viewport centre of the fake camera is (0, 0)
        let center = state.grid_center(&cam);
        assert!(center.lat().abs() < 1e-9 && center.lng().abs() < 1e-9);

        state.pointer_move(FakeCamera::point_for(12.0, -30.0));
        let center = state.grid_center(&cam);
        assert!((center.lat() - 12.0).abs() < 1e-4);
        assert!((center.lng() + 30.0).abs() < 1e-4);

        let ClickOutcome::Selected(key) = state.click(FakeCamera::point_for(40.0, 40.0), &cam, RES) else {
            panic!("expected a selection");
        };
        assert_eq!(state.grid_center(&cam), key.center());
    }
}
