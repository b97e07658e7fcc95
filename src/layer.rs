use crate::config::Config;
use crate::geometry::CellKey;
use crate::grid::{GridRegistry, HighlightTarget, ReconcileStats};
use crate::interaction::{null_island, ClickOutcome, InteractionState};
use crate::metrics::{standard_metrics, ResolutionMetric};
use crate::plan::{compute_plan, primary_resolution, RenderPlanEntry};
use crate::primitives::{CameraView, PrimitiveSink, ScreenPoint};
use crate::schedule::RecomputeScheduler;
use crate::view::estimate_ground_radius;
use log::{debug, info};
use std::time::Instant;

/// Everything that only exists while the overlay is switched on.
struct ActiveLayer {
    registry: GridRegistry,
    interaction: InteractionState,
    scheduler: RecomputeScheduler,
}

/// The H3 grid overlay: plans, reconciles and reacts to the pointer.
pub struct H3Layer {
    config: Config,
    metrics: &'static [ResolutionMetric],
    active: Option<ActiveLayer>,
}

impl H3Layer {
    /// Creates the layer switched off; call [`H3Layer::enable`] to draw.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            metrics: standard_metrics(),
            active: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.active.is_some()
    }

    pub fn plan_for<C: CameraView + ?Sized>(&self, camera: &C) -> Vec<RenderPlanEntry> {
        let radius = estimate_ground_radius(camera.height_m(), camera.fov_y_radians(), camera.aspect());
        compute_plan(self.metrics, radius, &self.config.plan)
    }

    /// Switches the overlay on and draws an initial grid around (0, 0).
    pub fn enable<C, S>(&mut self, now: Instant, camera: &C, sink: &mut S)
    where
        C: CameraView + ?Sized,
        S: PrimitiveSink + ?Sized,
    {
        if self.active.is_some() {
            return;
        }
        let mut active = ActiveLayer {
            registry: GridRegistry::new(self.config.grid, self.config.highlight),
            interaction: InteractionState::new(self.config.interaction),
            scheduler: RecomputeScheduler::new(self.config.schedule),
        };
        let plan = self.plan_for(camera);
        let stats = active
            .registry
            .reconcile(null_island(), &plan, &HighlightTarget::default(), sink);
        active.scheduler.request_immediate(now);
        info!(
            "H3 layer enabled ({:?} schedule, {} cells)",
            self.config.schedule, stats.created
        );
        self.active = Some(active);
    }

    /// Switches the overlay off, cancelling pending work and removing every
    /// primitive. Does nothing when already off.
    pub fn disable<S: PrimitiveSink + ?Sized>(&mut self, sink: &mut S) {
        if let Some(mut active) = self.active.take() {
            active.scheduler.cancel();
            active.registry.clear(sink);
            info!("H3 layer disabled");
        }
    }

    /// Flips the overlay and returns whether it is now on.
    pub fn toggle<C, S>(&mut self, now: Instant, camera: &C, sink: &mut S) -> bool
    where
        C: CameraView + ?Sized,
        S: PrimitiveSink + ?Sized,
    {
        if self.is_enabled() {
            self.disable(sink);
        } else {
            self.enable(now, camera, sink);
        }
        self.is_enabled()
    }

    pub fn request_recompute(&mut self, now: Instant) {
        if let Some(active) = self.active.as_mut() {
            active.scheduler.request_recompute(now);
        }
    }

    /// Per-frame entry point. Returns the reconcile statistics when the
    /// schedule allowed a recompute this frame.
    pub fn tick<C, S>(&mut self, now: Instant, camera: &C, sink: &mut S) -> Option<ReconcileStats>
    where
        C: CameraView + ?Sized,
        S: PrimitiveSink + ?Sized,
    {
        if !self.active.as_mut()?.scheduler.poll(now) {
            return None;
        }
        let plan = self.plan_for(camera);
        let active = self.active.as_mut()?;
        let primary = primary_resolution(&plan)?;
        active.interaction.refresh_hover(camera, primary);
        let center = active.interaction.grid_center(camera);
        let highlight = active.interaction.highlight_target();
        let stats = active.registry.reconcile(center, &plan, &highlight, sink);
        // fades advance one step per pass, so keep passes coming until they settle
        if stats.animating {
            active.scheduler.request_immediate(now);
        }
        Some(stats)
    }

    pub fn pointer_down(&mut self, at: ScreenPoint) {
        if let Some(active) = self.active.as_mut() {
            active.interaction.pointer_down(at);
        }
    }

    pub fn pointer_move(&mut self, at: ScreenPoint, now: Instant) {
        if let Some(active) = self.active.as_mut() {
            active.interaction.pointer_move(at);
            active.scheduler.request_recompute(now);
        }
    }

    pub fn pointer_up(&mut self) {
        if let Some(active) = self.active.as_mut() {
            active.interaction.pointer_up();
        }
    }

    pub fn pointer_leave(&mut self, now: Instant) {
        if let Some(active) = self.active.as_mut() {
            active.interaction.pointer_leave();
            active.scheduler.request_recompute(now);
        }
    }

    pub fn click<C: CameraView + ?Sized>(
        &mut self,
        at: ScreenPoint,
        camera: &C,
        now: Instant,
    ) -> Option<ClickOutcome> {
        let plan = self.plan_for(camera);
        let primary = primary_resolution(&plan)?;
        let active = self.active.as_mut()?;
        let outcome = active.interaction.click(at, camera, primary);
        debug!("click at ({}, {}): {:?}", at.x, at.y, outcome);
        if outcome != ClickOutcome::Suppressed {
            active.scheduler.request_recompute(now);
        }
        Some(outcome)
    }

    /// Currently selected cell, for display outside the layer.
    pub fn selected_cell(&self) -> Option<CellKey> {
        self.active.as_ref().and_then(|a| a.interaction.selected())
    }

    pub fn registry(&self) -> Option<&GridRegistry> {
        self.active.as_ref().map(|a| &a.registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::testing::{FakeCamera, RecordingSink};
    use crate::primitives::GroundPicker;
    use crate::schedule::SchedulePolicy;
    use approx::assert_abs_diff_eq;
    use std::time::Duration;

    fn enabled_layer(config: Config, camera: &FakeCamera, sink: &mut RecordingSink) -> (H3Layer, Instant) {
        let now = Instant::now();
        let mut layer = H3Layer::new(config);
        layer.enable(now, camera, sink);
        (layer, now)
    }

    #[test]
    fn enable_draws_and_disable_tears_down() {
        let camera = FakeCamera::at_height(1e6);
        let mut sink = RecordingSink::default();
        let (mut layer, now) = enabled_layer(Config::default(), &camera, &mut sink);
        assert!(layer.is_enabled());
        assert!(!sink.outlines.is_empty());

        layer.pointer_move(FakeCamera::point_for(10.0, 10.0), now);
        layer.tick(now, &camera, &mut sink).unwrap();
        assert!(sink.fill.is_some());

        layer.disable(&mut sink);
        assert!(!layer.is_enabled());
        assert!(sink.outlines.is_empty());
        assert!(sink.fill.is_none());

        sink.take_ops();
        layer.disable(&mut sink);
        assert!(layer.tick(now, &camera, &mut sink).is_none());
        assert_eq!(sink.take_ops(), Default::default());
    }

    #[test]
    fn only_visible_resolutions_hold_cells() {
        let camera = FakeCamera::at_height(1e6);
        let mut sink = RecordingSink::default();
        let (mut layer, now) = enabled_layer(Config::default(), &camera, &mut sink);
        layer.tick(now, &camera, &mut sink);

        let plan = layer.plan_for(&camera);
        let registry = layer.registry().unwrap();
        for entry in &plan {
            let count = registry.displayed(entry.resolution).count();
            if entry.opacity_weight == 0.0 {
                assert_eq!(count, 0, "resolution {:?} should be hidden", entry.resolution);
            } else {
                assert!(count > 0);
            }
        }
    }

    #[test]
    fn steady_camera_settles_to_no_churn() {
        let camera = FakeCamera::at_height(2e5);
        let mut sink = RecordingSink::default();
        let (mut layer, now) = enabled_layer(Config::default(), &camera, &mut sink);
        layer.tick(now, &camera, &mut sink);
        sink.take_ops();

        let stats = layer.tick(now, &camera, &mut sink).unwrap();
        let ops = sink.take_ops();
        assert_eq!(stats.created + stats.removed, 0);
        assert_eq!(ops.added + ops.removed, 0);
    }

    #[test]
    fn drag_does_not_select() {
        let camera = FakeCamera::at_height(1e6);
        let mut sink = RecordingSink::default();
        let (mut layer, now) = enabled_layer(Config::default(), &camera, &mut sink);
        let start = FakeCamera::point_for(0.0, 0.0);

        layer.pointer_down(start);
        layer.pointer_move(ScreenPoint::new(start.x + 20.0, start.y + 20.0), now);
        layer.pointer_up();
        let outcome = layer.click(ScreenPoint::new(start.x + 20.0, start.y + 20.0), &camera, now);
        assert_eq!(outcome, Some(ClickOutcome::Suppressed));
        assert_eq!(layer.selected_cell(), None);
    }

    #[test]
    fn click_selects_at_primary_resolution_then_deselects() {
        let camera = FakeCamera::at_height(1e6);
        let mut sink = RecordingSink::default();
        let (mut layer, now) = enabled_layer(Config::default(), &camera, &mut sink);
        let at = FakeCamera::point_for(25.0, -40.0);
        let primary = primary_resolution(&layer.plan_for(&camera)).unwrap();

        layer.pointer_down(at);
        layer.pointer_up();
        let Some(ClickOutcome::Selected(key)) = layer.click(at, &camera, now) else {
            panic!("expected a selection");
        };
        assert_eq!(key.resolution(), primary);
        assert_eq!(layer.selected_cell(), Some(key));

        layer.tick(now, &camera, &mut sink);
        assert!(sink.fill.is_some());

        layer.pointer_down(at);
        layer.pointer_up();
        assert_eq!(layer.click(at, &camera, now), Some(ClickOutcome::Deselected));
        assert_eq!(layer.selected_cell(), None);
    }

    #[test]
    fn debounced_layer_waits_for_quiet() {
        let camera = FakeCamera::at_height(1e6);
        let mut sink = RecordingSink::default();
        let config = Config {
            schedule: SchedulePolicy::Debounced { delay_ms: 50 },
            ..Config::default()
        };
        let (mut layer, now) = enabled_layer(config, &camera, &mut sink);

        // the enable request runs straight away
        assert!(layer.tick(now, &camera, &mut sink).is_some());
        assert!(layer.tick(now, &camera, &mut sink).is_none());

        layer.pointer_move(FakeCamera::point_for(5.0, 5.0), now);
        assert!(layer.tick(now + Duration::from_millis(10), &camera, &mut sink).is_none());
        assert!(layer.tick(now + Duration::from_millis(60), &camera, &mut sink).is_some());

        layer.pointer_move(FakeCamera::point_for(6.0, 6.0), now);
        layer.disable(&mut sink);
        assert!(layer.tick(now + Duration::from_secs(1), &camera, &mut sink).is_none());
    }

    #[test]
    fn debounced_fades_finish_without_further_input() {
        let camera = FakeCamera::at_height(1e6);
        let mut sink = RecordingSink::default();
        let config = Config {
            schedule: SchedulePolicy::Debounced { delay_ms: 50 },
            ..Config::default()
        };
        let (mut layer, start) = enabled_layer(config, &camera, &mut sink);
        let frame = |i: u64| start + Duration::from_millis(16 * i);
        let at = FakeCamera::point_for(25.0, -40.0);

        layer.pointer_down(at);
        layer.pointer_up();
        assert!(matches!(layer.click(at, &camera, frame(0)), Some(ClickOutcome::Selected(_))));
        for i in 0..200 {
            layer.tick(frame(i), &camera, &mut sink);
        }
        let (_, color) = sink.fill.clone().expect("selection fill");
        assert_abs_diff_eq!(color.alpha(), 0.65, epsilon = 1e-2);
        // settled, so the idle layer stops recomputing
        assert!(layer.tick(frame(200), &camera, &mut sink).is_none());

        layer.pointer_down(at);
        layer.pointer_up();
        assert_eq!(layer.click(at, &camera, frame(201)), Some(ClickOutcome::Deselected));
        layer.pointer_leave(frame(201));
        for i in 201..400 {
            layer.tick(frame(i), &camera, &mut sink);
        }
        assert!(sink.fill.is_none());
        assert!(!layer.registry().unwrap().has_highlight());
    }

    /// Counts how often the layer asks for the camera height, i.e. plans.
    struct CountingCamera {
        inner: FakeCamera,
        height_reads: std::cell::Cell<usize>,
    }

    impl GroundPicker for CountingCamera {
        fn pick_ground(&self, point: ScreenPoint) -> Option<h3o::LatLng> {
            self.inner.pick_ground(point)
        }
    }

    impl CameraView for CountingCamera {
        fn height_m(&self) -> f64 {
            self.height_reads.set(self.height_reads.get() + 1);
            self.inner.height_m()
        }

        fn fov_y_radians(&self) -> f64 {
            self.inner.fov_y_radians()
        }

        fn aspect(&self) -> f64 {
            self.inner.aspect()
        }

        fn viewport_center(&self) -> ScreenPoint {
            self.inner.viewport_center()
        }
    }

    #[test]
    fn idle_or_disabled_ticks_skip_planning() {
        let camera = CountingCamera {
            inner: FakeCamera::at_height(1e6),
            height_reads: std::cell::Cell::new(0),
        };
        let mut sink = RecordingSink::default();
        let now = Instant::now();

        let mut layer = H3Layer::new(Config::default());
        assert!(layer.tick(now, &camera, &mut sink).is_none());
        assert_eq!(camera.height_reads.get(), 0);

        let config = Config {
            schedule: SchedulePolicy::Debounced { delay_ms: 50 },
            ..Config::default()
        };
        let mut layer = H3Layer::new(config);
        layer.enable(now, &camera, &mut sink);
        assert!(layer.tick(now, &camera, &mut sink).is_some());
        let reads = camera.height_reads.get();
        for i in 1..10 {
            assert!(layer.tick(now + Duration::from_millis(i), &camera, &mut sink).is_none());
        }
        assert_eq!(camera.height_reads.get(), reads);
    }
}
