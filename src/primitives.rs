//! The seam between the grid core and whatever draws it.
//!
//! The core never owns GPU objects. It tells a [`PrimitiveSink`] which cell
//! outlines exist and what they look like, and asks a [`CameraView`] where
//! the camera is and what lies under a screen point.

use crate::geometry::{CellKey, Polygon};
use h3o::LatLng;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rgba(pub [f32; 4]);

impl Rgba {
    pub fn with_alpha(self, alpha: f64) -> Self {
        let [r, g, b, _] = self.0;
        Rgba([r, g, b, alpha.clamp(0.0, 1.0) as f32])
    }

    pub fn alpha(&self) -> f32 {
        self.0[3]
    }
}

// rgb(102, 179, 224)
pub const GRID_COLOR: Rgba = Rgba([0.4, 0.701_960_8, 0.878_431_4, 1.0]);
// rgb(255, 165, 0)
pub const SELECTION_COLOR: Rgba = Rgba([1.0, 0.647_058_8, 0.0, 1.0]);

/// Drawable primitives the core creates, mutates and destroys.
pub trait PrimitiveSink {
    fn add_outline(&mut self, key: CellKey, polygon: &Polygon, color: Rgba);
    fn update_outline(&mut self, key: CellKey, polygon: &Polygon, color: Rgba);
    fn remove_outline(&mut self, key: CellKey);

    /// Creates the highlight fill, or replaces the existing one.
    fn set_fill(&mut self, polygon: &Polygon, color: Rgba);
    fn remove_fill(&mut self);
}

/// Pointer position in viewport pixels, origin top left.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenPoint {
    pub x: f32,
    pub y: f32,
}

impl ScreenPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_sq(&self, other: ScreenPoint) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

pub trait GroundPicker {
    /// Point on the globe under `point`, or `None` when it misses the globe.
    fn pick_ground(&self, point: ScreenPoint) -> Option<LatLng>;
}

pub trait CameraView: GroundPicker {
    /// Camera height above the surface, meters.
    fn height_m(&self) -> f64;
    fn fov_y_radians(&self) -> f64;
    fn aspect(&self) -> f64;
    fn viewport_center(&self) -> ScreenPoint;
}
