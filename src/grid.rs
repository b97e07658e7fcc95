use crate::geometry::{cell_to_polygon, CellKey, Polygon};
use crate::plan::RenderPlanEntry;
use crate::primitives::{PrimitiveSink, Rgba, GRID_COLOR, SELECTION_COLOR};
use h3o::{CellIndex, LatLng, Resolution};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridParams {
    /// Fraction of the gap to the target alpha closed per frame.
    pub alpha_smoothing: f64,
    /// Outline opacity at full weight; the rest is headroom for the highlight.
    pub cell_opacity_ceiling: f64,
}

impl Default for GridParams {
    fn default() -> Self {
        Self {
            alpha_smoothing: 0.22,
            cell_opacity_ceiling: 0.9,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightParams {
    pub smoothing: f64,
    /// The fill is destroyed once a fade-out drops below this.
    pub remove_below: f64,
}

impl Default for HighlightParams {
    fn default() -> Self {
        Self {
            smoothing: 0.28,
            remove_below: 0.01,
        }
    }
}

/// What the highlight overlay should track this frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HighlightTarget {
    pub cell: Option<CellKey>,
    pub target_alpha: f64,
    /// Draw in the selection accent instead of the hover colour.
    pub selected: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DisplayedCell {
    pub key: CellKey,
    pub polygon: Polygon,
    pub opacity: f64,
}

/// Frame-to-frame scalar state, kept apart from the cell maps so the
/// smoothing can be inspected without a renderer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SmoothingState {
    grid_alpha: BTreeMap<Resolution, f64>,
    highlight_alpha: f64,
}

impl SmoothingState {
    pub fn grid_alpha(&self, resolution: Resolution) -> Option<f64> {
        self.grid_alpha.get(&resolution).copied()
    }

    pub fn highlight_alpha(&self) -> f64 {
        self.highlight_alpha
    }

    fn step_grid(&mut self, resolution: Resolution, target: f64, factor: f64) -> f64 {
        // a resolution seen for the first time starts at its target
        let previous = self.grid_alpha.get(&resolution).copied().unwrap_or(target);
        let next = approach(previous, target, factor);
        self.grid_alpha.insert(resolution, next);
        next
    }
}

/// Alphas this close to their target count as settled.
const SETTLE_EPSILON: f64 = 1e-3;

fn approach(current: f64, target: f64, factor: f64) -> f64 {
    current + (target - current) * factor
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    pub unchanged: usize,
    pub skipped: usize,
    /// Some fade has not reached its target yet; another pass is needed
    /// even if nothing else changes.
    pub animating: bool,
}

struct DrawnHighlight {
    key: CellKey,
    polygon: Polygon,
    color: Rgba,
}

/// Owns every displayed cell and the highlight fill, and keeps the sink in
/// step with the latest render plan.
#[derive(Default)]
pub struct GridRegistry {
    grid_params: GridParams,
    highlight_params: HighlightParams,
    cells: BTreeMap<Resolution, HashMap<CellKey, DisplayedCell>>,
    smoothing: SmoothingState,
    highlight: Option<DrawnHighlight>,
}

impl GridRegistry {
    pub fn new(grid_params: GridParams, highlight_params: HighlightParams) -> Self {
        Self {
            grid_params,
            highlight_params,
            ..Default::default()
        }
    }

    pub fn smoothing(&self) -> &SmoothingState {
        &self.smoothing
    }

    pub fn displayed(&self, resolution: Resolution) -> impl Iterator<Item = &DisplayedCell> + '_ {
        self.cells.get(&resolution).into_iter().flat_map(|m| m.values())
    }

    pub fn displayed_count(&self) -> usize {
        self.cells.values().map(HashMap::len).sum()
    }

    pub fn has_highlight(&self) -> bool {
        self.highlight.is_some()
    }

    /// Brings the sink in line with `plan` around `center`.
    ///
    /// Cells that stay desired are mutated in place, so primitive churn is
    /// proportional to the change in the desired set, not its size.
    pub fn reconcile<S: PrimitiveSink + ?Sized>(
        &mut self,
        center: LatLng,
        plan: &[RenderPlanEntry],
        highlight: &HighlightTarget,
        sink: &mut S,
    ) -> ReconcileStats {
        let mut stats = ReconcileStats::default();
        let mut desired_by_res: HashMap<Resolution, HashSet<CellKey>> = HashMap::new();

        for entry in plan {
            if entry.opacity_weight <= 0.0 {
                self.smoothing.grid_alpha.insert(entry.resolution, 0.0);
                continue;
            }
            let displayed = self.smoothing.step_grid(
                entry.resolution,
                entry.opacity_weight,
                self.grid_params.alpha_smoothing,
            );
            if (displayed - entry.opacity_weight).abs() > SETTLE_EPSILON {
                stats.animating = true;
            }
            let opacity = self.grid_params.cell_opacity_ceiling * displayed;
            let desired = self.draw_resolution(center, entry, opacity, sink, &mut stats);
            desired_by_res.insert(entry.resolution, desired);
        }

        for (res, cells) in self.cells.iter_mut() {
            let desired = desired_by_res.get(res);
            cells.retain(|key, _| {
                if desired.is_some_and(|d| d.contains(key)) {
                    return true;
                }
                sink.remove_outline(*key);
                stats.removed += 1;
                false
            });
        }
        self.cells.retain(|_, cells| !cells.is_empty());

        self.draw_highlight(highlight, sink);
        stats.animating |= match highlight.cell {
            Some(_) => (self.smoothing.highlight_alpha - highlight.target_alpha).abs() > SETTLE_EPSILON,
            // a fill fading out lives until it is removed
            None => self.highlight.is_some(),
        };

        trace!(
            "reconciled grid: +{} ~{} -{} ={} (skipped {})",
            stats.created,
            stats.updated,
            stats.removed,
            stats.unchanged,
            stats.skipped
        );
        stats
    }

    fn draw_resolution<S: PrimitiveSink + ?Sized>(
        &mut self,
        center: LatLng,
        entry: &RenderPlanEntry,
        opacity: f64,
        sink: &mut S,
        stats: &mut ReconcileStats,
    ) -> HashSet<CellKey> {
        let color = GRID_COLOR.with_alpha(opacity);
        let center_cell = center.to_cell(entry.resolution);
        let disk: Vec<CellIndex> = center_cell.grid_disk(entry.ring_count);
        let layer = self.cells.entry(entry.resolution).or_default();
        let mut desired = HashSet::with_capacity(disk.len());

        for cell in disk {
            let key = CellKey::new(entry.resolution, cell);
            if desired.contains(&key) {
                continue;
            }
            match layer.get_mut(&key) {
                Some(existing) => {
                    if existing.opacity.to_bits() == opacity.to_bits() {
                        stats.unchanged += 1;
                    } else {
                        existing.opacity = opacity;
                        sink.update_outline(key, &existing.polygon, color);
                        stats.updated += 1;
                    }
                }
                None => {
                    let polygon = cell_to_polygon(cell);
                    if polygon.is_degenerate() {
                        debug!("skipping degenerate cell {key}");
                        stats.skipped += 1;
                        continue;
                    }
                    sink.add_outline(key, &polygon, color);
                    layer.insert(
                        key,
                        DisplayedCell {
                            key,
                            polygon,
                            opacity,
                        },
                    );
                    stats.created += 1;
                }
            }
            desired.insert(key);
        }
        desired
    }

    fn draw_highlight<S: PrimitiveSink + ?Sized>(&mut self, target: &HighlightTarget, sink: &mut S) {
        let alpha = approach(
            self.smoothing.highlight_alpha,
            target.target_alpha,
            self.highlight_params.smoothing,
        );
        self.smoothing.highlight_alpha = alpha;

        let Some(key) = target.cell else {
            // fade out whatever was highlighted last, then drop it
            if let Some(drawn) = self.highlight.as_mut() {
                if alpha < self.highlight_params.remove_below {
                    sink.remove_fill();
                    self.highlight = None;
                } else {
                    drawn.color = drawn.color.with_alpha(alpha);
                    sink.set_fill(&drawn.polygon, drawn.color);
                }
            }
            return;
        };

        let base = if target.selected { SELECTION_COLOR } else { GRID_COLOR };
        let color = base.with_alpha(alpha.clamp(0.0, 0.999));
        let polygon = match self.highlight.take() {
            Some(drawn) if drawn.key == key => {
                if drawn.color == color {
                    self.highlight = Some(drawn);
                    return;
                }
                drawn.polygon
            }
            _ => cell_to_polygon(key.cell()),
        };
        if polygon.is_degenerate() {
            sink.remove_fill();
            return;
        }
        sink.set_fill(&polygon, color);
        self.highlight = Some(DrawnHighlight { key, polygon, color });
    }

    /// Removes every primitive this registry created. Safe to call repeatedly.
    pub fn clear<S: PrimitiveSink + ?Sized>(&mut self, sink: &mut S) {
        for key in self.cells.values().flat_map(|m| m.keys()) {
            sink.remove_outline(*key);
        }
        self.cells.clear();
        if self.highlight.take().is_some() {
            sink.remove_fill();
        }
        self.smoothing = SmoothingState::default();
    }
}
