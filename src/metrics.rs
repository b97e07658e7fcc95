use h3o::Resolution;
use once_cell::sync::Lazy;

/// Finest resolution the overlay will ever draw.
pub const MAX_RESOLUTION: u8 = 8;

static STANDARD_METRICS: Lazy<Vec<ResolutionMetric>> = Lazy::new(|| build_metrics(MAX_RESOLUTION));

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolutionMetric {
    pub resolution: Resolution,
    pub edge_length_m: f64,
}

/// Average edge length for every resolution in `0..=max_resolution`,
/// ordered by resolution. Anything past H3's finest level is ignored.
pub fn build_metrics(max_resolution: u8) -> Vec<ResolutionMetric> {
    (0..=max_resolution)
        .filter_map(|res| Resolution::try_from(res).ok())
        .map(|resolution| ResolutionMetric {
            resolution,
            edge_length_m: resolution.edge_length_m(),
        })
        .collect()
}

/// Table for `MAX_RESOLUTION`, built on first use and shared afterwards.
pub fn standard_metrics() -> &'static [ResolutionMetric] {
    &STANDARD_METRICS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_entry_per_resolution_in_order() {
        let metrics = build_metrics(MAX_RESOLUTION);
        assert_eq!(metrics.len(), MAX_RESOLUTION as usize + 1);
        for (i, m) in metrics.iter().enumerate() {
            assert_eq!(u8::from(m.resolution) as usize, i);
            assert!(m.edge_length_m > 0.0);
        }
    }

    #[test]
    fn edges_shrink_with_resolution() {
        let metrics = build_metrics(MAX_RESOLUTION);
        for pair in metrics.windows(2) {
            assert!(pair[1].edge_length_m < pair[0].edge_length_m);
        }
    }

    #[test]
    fn out_of_range_resolutions_are_dropped() {
        assert_eq!(build_metrics(40).len(), 16);
    }

    #[test]
    fn standard_table_is_shared() {
        assert_eq!(standard_metrics(), build_metrics(MAX_RESOLUTION).as_slice());
        assert!(std::ptr::eq(standard_metrics(), standard_metrics()));
    }
}
