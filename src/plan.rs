use crate::metrics::ResolutionMetric;
use h3o::Resolution;
use serde::{Deserialize, Serialize};

/// How opacity falls off for resolutions away from the ideal one.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Falloff {
    /// Continuous bell curve in octaves (log2 of edge ratio).
    Gaussian { sigma: f64 },
    /// Nearest resolution gets 1, neighbours fade linearly over `fade_span` steps.
    Linear { fade_span: f64 },
}

impl Default for Falloff {
    fn default() -> Self {
        Falloff::Gaussian { sigma: 0.9 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanParams {
    /// Cells we want to see across the ground radius.
    pub desired_hex_across: f64,
    pub max_rings: u32,
    pub falloff: Falloff,
    /// Weights below this are snapped to zero.
    pub min_visible_weight: f64,
}

impl Default for PlanParams {
    fn default() -> Self {
        Self {
            desired_hex_across: 8.0,
            max_rings: 6,
            falloff: Falloff::default(),
            min_visible_weight: 0.01,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderPlanEntry {
    pub resolution: Resolution,
    pub ring_count: u32,
    pub opacity_weight: f64,
}

/// Rings and opacity for every resolution in `metrics`, in the same order.
///
/// Pure: identical inputs give bit-identical output.
pub fn compute_plan(
    metrics: &[ResolutionMetric],
    ground_radius_m: f64,
    params: &PlanParams,
) -> Vec<RenderPlanEntry> {
    let radius = if ground_radius_m.is_finite() && ground_radius_m > 0.0 {
        ground_radius_m
    } else {
        0.0
    };
    let ideal_edge = (radius / params.desired_hex_across.max(1.0)).max(1.0);
    let octaves: Vec<f64> = metrics
        .iter()
        .map(|m| (m.edge_length_m.max(1.0) / ideal_edge).log2())
        .collect();
    let weights = falloff_weights(&octaves, params.falloff);
    // the peak resolution is never snapped away, so something is always drawn
    let peak = first_max(&weights);
    let max_rings = params.max_rings.max(1);

    metrics
        .iter()
        .zip(weights)
        .enumerate()
        .map(|(i, (m, weight))| {
            let rings = (radius / m.edge_length_m.max(1.0)).ceil();
            // f64 -> u32 casts saturate
            let ring_count = (rings as u32).clamp(1, max_rings);
            let opacity_weight = if weight < params.min_visible_weight && Some(i) != peak {
                0.0
            } else {
                weight.clamp(0.0, 1.0)
            };
            RenderPlanEntry {
                resolution: m.resolution,
                ring_count,
                opacity_weight,
            }
        })
        .collect()
}

fn falloff_weights(octaves: &[f64], falloff: Falloff) -> Vec<f64> {
    match falloff {
        Falloff::Gaussian { sigma } => {
            let sigma = if sigma.is_finite() && sigma > 0.0 { sigma } else { f64::EPSILON };
            octaves
                .iter()
                .map(|d| (-0.5 * (d / sigma).powi(2)).exp())
                .collect()
        }
        Falloff::Linear { fade_span } => {
            let fade_span = fade_span.max(f64::EPSILON);
            let mut best = 0;
            let mut best_diff = f64::INFINITY;
            for (i, d) in octaves.iter().enumerate() {
                if d.abs() < best_diff {
                    best_diff = d.abs();
                    best = i;
                }
            }
            (0..octaves.len())
                .map(|i| (1.0 - i.abs_diff(best) as f64 / fade_span).max(0.0))
                .collect()
        }
    }
}

fn first_max(weights: &[f64]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, w) in weights.iter().enumerate() {
        match best {
            Some(b) if *w <= weights[b] => {}
            _ => best = Some(i),
        }
    }
    best
}

/// Resolution with the highest opacity; the first one wins ties.
pub fn primary_resolution(plan: &[RenderPlanEntry]) -> Option<Resolution> {
    let mut best: Option<&RenderPlanEntry> = None;
    for entry in plan {
        match best {
            Some(b) if entry.opacity_weight <= b.opacity_weight => {}
            _ => best = Some(entry),
        }
    }
    best.map(|e| e.resolution)
}
