/// Estimated ground footprint radius (half diagonal, meters) seen from a
/// camera at `height_m` above the surface.
///
/// Flat-plane approximation: globe curvature and camera tilt are ignored.
/// This only feeds the resolution heuristic, not geometry.
pub fn estimate_ground_radius(height_m: f64, fov_radians: f64, aspect: f64) -> f64 {
    let aspect = if aspect.is_finite() && aspect > 0.0 { aspect } else { 1.0 };
    let view_height = 2.0 * height_m * (fov_radians / 2.0).tan();
    let view_width = view_height * aspect;
    ((view_width / 2.0).powi(2) + (view_height / 2.0).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn square_viewport_at_ninety_degrees() {
        // tan(45deg) = 1, so the half extents equal the height
        let r = estimate_ground_radius(1000.0, FRAC_PI_2, 1.0);
        assert_relative_eq!(r, 1000.0 * 2f64.sqrt(), max_relative = 1e-12);
    }

    #[test]
    fn wide_viewport_grows_radius() {
        let square = estimate_ground_radius(5000.0, 1.0, 1.0);
        let wide = estimate_ground_radius(5000.0, 1.0, 16.0 / 9.0);
        assert!(wide > square);
    }

    #[test]
    fn bad_aspect_falls_back_to_one() {
        let square = estimate_ground_radius(5000.0, 1.0, 1.0);
        for aspect in [0.0, -2.0, f64::NAN, f64::INFINITY] {
            assert_relative_eq!(estimate_ground_radius(5000.0, 1.0, aspect), square);
        }
    }

    #[test]
    fn radius_scales_linearly_with_height() {
        let a = estimate_ground_radius(100.0, 0.8, 1.5);
        let b = estimate_ground_radius(300.0, 0.8, 1.5);
        assert_relative_eq!(b, 3.0 * a, max_relative = 1e-12);
    }
}
