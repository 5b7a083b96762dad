//! Frame scheduler: one cooperative step per host tick.
//!
//! Scene edits are queued and applied at the start of the next tick, then the
//! layout engine gets one step if it is running. The scheduler has no timer
//! of its own; the host decides the cadence and reads [`TickReport::dirty`]
//! to know whether to redraw.

use crate::canvas::Canvas;
use crate::config::{CanvasConfig, ConfigError, SchedulerConfig};
use crate::error::{SceneError, SceneResult};
use crate::layout::StepReport;
use crate::scene::{EdgeId, NodeId, NodeSpec};
use crate::shapes::{CurveKind, NodeShape, NodeStyle};
use crate::snapshot::RenderSnapshot;
use kurbo::{Point, Size, Vec2};
use std::collections::VecDeque;
use std::time::Duration;

// Use web_time for WASM compatibility
#[cfg(target_arch = "wasm32")]
use web_time::Instant;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;

/// A queued scene edit.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    InsertNode(NodeSpec),
    InsertNodeWithId(NodeId, NodeSpec),
    InsertEdge {
        source: NodeId,
        target: NodeId,
        curve: CurveKind,
    },
    DeleteNode(NodeId),
    DeleteEdge(EdgeId),
    SetNodePosition(NodeId, Point),
    SetNodePinned(NodeId, bool),
    SetNodeShape(NodeId, NodeShape),
    SetNodeStyle(NodeId, NodeStyle),
    SetEdgeCurve(EdgeId, CurveKind),
}

/// What a successfully applied [`Mutation`] produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    NodeInserted(NodeId),
    EdgeInserted(EdgeId),
    Updated,
}

/// Result of one [`FrameScheduler::tick`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// The renderer must redraw.
    pub dirty: bool,
    /// One entry per mutation drained this tick, in queue order.
    pub results: Vec<SceneResult<Applied>>,
    /// The layout step taken, if the engine was running.
    pub layout: Option<StepReport>,
    /// Wall time spent inside the tick.
    pub elapsed: Duration,
}

impl TickReport {
    /// Number of mutations that took effect.
    pub fn applied(&self) -> usize {
        self.results.iter().filter(|r| r.is_ok()).count()
    }

    /// Mutations that were rejected.
    pub fn errors(&self) -> impl Iterator<Item = &SceneError> {
        self.results.iter().filter_map(|r| r.as_ref().err())
    }
}

/// Rolling frame-time statistics.
#[derive(Debug, Clone)]
pub struct FrameStats {
    window: VecDeque<Duration>,
    capacity: usize,
    budget: Duration,
    frames: u64,
    over_budget: u64,
}

impl FrameStats {
    pub fn new(capacity: usize, budget: Duration) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            budget,
            frames: 0,
            over_budget: 0,
        }
    }

    /// Record one frame.
    pub fn record(&mut self, frame: Duration) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(frame);
        self.frames += 1;
        if frame > self.budget {
            self.over_budget += 1;
        }
    }

    /// Mean over the window.
    pub fn average(&self) -> Duration {
        if self.window.is_empty() {
            return Duration::ZERO;
        }
        self.window.iter().sum::<Duration>() / self.window.len() as u32
    }

    /// Slowest frame in the window.
    pub fn worst(&self) -> Duration {
        self.window.iter().copied().max().unwrap_or_default()
    }

    pub fn last(&self) -> Option<Duration> {
        self.window.back().copied()
    }

    /// Frames recorded since creation.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Frames that took longer than the budget, since creation.
    pub fn over_budget(&self) -> u64 {
        self.over_budget
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }
}

/// Drives a [`Canvas`] one tick at a time.
#[derive(Debug, Clone)]
pub struct FrameScheduler {
    canvas: Canvas,
    queue: VecDeque<Mutation>,
    config: SchedulerConfig,
    /// Camera, selection or drag changed since the last tick.
    view_changed: bool,
    dirty: bool,
    stats: FrameStats,
}

impl FrameScheduler {
    pub fn new(canvas: Canvas) -> Self {
        let config = canvas.config().scheduler.clone();
        // Budgets too large for a Duration never trip.
        let budget = Duration::try_from_secs_f64(config.frame_budget_ms / 1000.0).unwrap_or(Duration::MAX);
        Self {
            stats: FrameStats::new(config.stats_window, budget),
            canvas,
            queue: VecDeque::new(),
            config,
            // The first frame always needs drawing.
            view_changed: true,
            dirty: false,
        }
    }

    /// A scheduler around an empty canvas.
    pub fn with_config(config: CanvasConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(Canvas::with_config(config)?))
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    /// Give the canvas back, discarding anything still queued.
    pub fn into_canvas(self) -> Canvas {
        self.canvas
    }

    /// Whether the last tick left the scene needing a redraw.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Mutations waiting for the next tick.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Queue a scene edit for the next tick.
    pub fn enqueue(&mut self, mutation: Mutation) {
        self.queue.push_back(mutation);
    }

    fn apply(&mut self, mutation: Mutation) -> SceneResult<Applied> {
        let canvas = &mut self.canvas;
        match mutation {
            Mutation::InsertNode(spec) => canvas.insert_node(spec).map(Applied::NodeInserted),
            Mutation::InsertNodeWithId(id, spec) => canvas
                .insert_node_with_id(id, spec)
                .map(|()| Applied::NodeInserted(id)),
            Mutation::InsertEdge {
                source,
                target,
                curve,
            } => canvas
                .insert_edge(source, target, curve)
                .map(Applied::EdgeInserted),
            Mutation::DeleteNode(id) => canvas.delete_node(id).map(|_| Applied::Updated),
            Mutation::DeleteEdge(id) => canvas.delete_edge(id).map(|_| Applied::Updated),
            Mutation::SetNodePosition(id, position) => canvas
                .set_node_position(id, position)
                .map(|_| Applied::Updated),
            Mutation::SetNodePinned(id, pinned) => canvas
                .set_node_pinned(id, pinned)
                .map(|_| Applied::Updated),
            Mutation::SetNodeShape(id, shape) => {
                canvas.set_node_shape(id, shape).map(|_| Applied::Updated)
            }
            Mutation::SetNodeStyle(id, style) => {
                canvas.set_node_style(id, style).map(|_| Applied::Updated)
            }
            Mutation::SetEdgeCurve(id, curve) => {
                canvas.set_edge_curve(id, curve).map(|_| Applied::Updated)
            }
        }
    }

    /// Run one frame: drain the queue, step the layout, compute the dirty flag.
    pub fn tick(&mut self) -> TickReport {
        let started = Instant::now();
        let mut report = TickReport::default();

        while let Some(mutation) = self.queue.pop_front() {
            let result = self.apply(mutation);
            if let Err(err) = &result {
                log::warn!("Rejected mutation: {err}");
            }
            report.results.push(result);
        }

        let mut layout_moved = false;
        if self.canvas.layout().is_running() {
            let step = self.canvas.layout_step(self.config.time_step);
            layout_moved = step.max_displacement > self.config.redraw_epsilon;
            report.layout = Some(step);
        }

        report.dirty = report.applied() > 0 || self.view_changed || layout_moved;
        self.dirty = report.dirty;
        self.view_changed = false;

        report.elapsed = started.elapsed();
        self.stats.record(report.elapsed);
        if report.elapsed > self.stats.budget() {
            log::debug!(
                "Frame {} over budget: {:.2}ms",
                self.stats.frames(),
                report.elapsed.as_secs_f64() * 1000.0
            );
        }
        report
    }

    /// Capture what the renderer should draw.
    pub fn snapshot(&self) -> RenderSnapshot {
        self.canvas.snapshot()
    }

    /// Hit-test a screen point against the current scene.
    pub fn pick(&self, screen_point: Point) -> Option<NodeId> {
        self.canvas.pick(screen_point)
    }

    fn note(&mut self, changed: bool) -> bool {
        self.view_changed |= changed;
        changed
    }

    // View changes apply immediately and mark the next tick dirty.

    pub fn pan_by(&mut self, delta: Vec2) -> bool {
        let changed = self.canvas.pan_by(delta);
        self.note(changed)
    }

    pub fn zoom_at(&mut self, screen_point: Point, factor: f64) -> bool {
        let changed = self.canvas.zoom_at(screen_point, factor);
        self.note(changed)
    }

    pub fn set_viewport(&mut self, viewport: Size) -> bool {
        let changed = self.canvas.set_viewport(viewport);
        self.note(changed)
    }

    pub fn fit_to_content(&mut self) -> bool {
        let changed = self.canvas.fit_to_content();
        self.note(changed)
    }

    pub fn select(&mut self, ids: &[NodeId]) -> SceneResult<bool> {
        let changed = self.canvas.select(ids)?;
        Ok(self.note(changed))
    }

    pub fn clear_selection(&mut self) -> bool {
        let changed = self.canvas.clear_selection();
        self.note(changed)
    }

    pub fn drag_start(&mut self, id: NodeId) -> SceneResult<()> {
        self.canvas.drag_start(id)
    }

    pub fn drag_move(&mut self, screen_point: Point) -> SceneResult<Option<NodeId>> {
        let moved = self.canvas.drag_move(screen_point)?;
        self.note(moved.is_some());
        Ok(moved)
    }

    pub fn drag_end(&mut self) -> Option<NodeId> {
        self.canvas.drag_end()
    }

    pub fn layout_start(&mut self) {
        self.canvas.layout_start();
    }

    pub fn layout_stop(&mut self) {
        self.canvas.layout_stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutState;

    fn scheduler() -> FrameScheduler {
        let mut scheduler = FrameScheduler::new(Canvas::new());
        scheduler.tick();
        scheduler
    }

    #[test]
    fn test_first_tick_is_dirty() {
        let mut scheduler = FrameScheduler::new(Canvas::new());
        assert!(scheduler.tick().dirty);
        assert!(!scheduler.tick().dirty);
    }

    #[test]
    fn test_mutations_apply_on_tick() {
        let mut scheduler = scheduler();
        scheduler.enqueue(Mutation::InsertNode(NodeSpec::circle(Point::ZERO, 5.0)));
        scheduler.enqueue(Mutation::InsertNode(NodeSpec::circle(Point::new(50.0, 0.0), 5.0)));
        assert_eq!(scheduler.canvas().scene().node_count(), 0);
        assert_eq!(scheduler.pending(), 2);

        let report = scheduler.tick();
        assert!(report.dirty);
        assert_eq!(
            report.results,
            vec![
                Ok(Applied::NodeInserted(NodeId(0))),
                Ok(Applied::NodeInserted(NodeId(1)))
            ]
        );
        assert_eq!(scheduler.canvas().scene().node_count(), 2);
        assert!(!scheduler.tick().dirty);
    }

    #[test]
    fn test_rejected_mutation_is_reported_not_dirty() {
        let mut scheduler = scheduler();
        scheduler.enqueue(Mutation::DeleteNode(NodeId(7)));
        let report = scheduler.tick();
        assert!(!report.dirty);
        assert_eq!(report.applied(), 0);
        assert_eq!(
            report.errors().collect::<Vec<_>>(),
            vec![&SceneError::NodeNotFound(NodeId(7))]
        );
    }

    #[test]
    fn test_camera_change_marks_dirty() {
        let mut scheduler = scheduler();
        assert!(!scheduler.pan_by(Vec2::ZERO));
        assert!(!scheduler.tick().dirty);
        assert!(scheduler.zoom_at(Point::new(10.0, 10.0), 1.1));
        assert!(scheduler.tick().dirty);
        assert!(!scheduler.tick().dirty);
    }

    #[test]
    fn test_layout_runs_until_converged() {
        let mut scheduler = scheduler();
        scheduler.enqueue(Mutation::InsertNode(NodeSpec::circle(Point::ZERO, 5.0)));
        scheduler.enqueue(Mutation::InsertNode(NodeSpec::circle(Point::new(4.0, 0.0), 5.0)));
        scheduler.enqueue(Mutation::InsertEdge {
            source: NodeId(0),
            target: NodeId(1),
            curve: CurveKind::Line,
        });
        scheduler.tick();
        scheduler.layout_start();

        let mut ticks = 0;
        while scheduler.canvas().layout_state() == LayoutState::Running {
            let report = scheduler.tick();
            assert!(report.layout.is_some());
            ticks += 1;
            assert!(ticks < 2000, "layout did not converge");
        }
        // Once converged the layout stops consuming ticks and frames go clean.
        let report = scheduler.tick();
        assert!(report.layout.is_none());
        assert!(!report.dirty);
        assert_eq!(scheduler.stats().frames(), ticks + 3);
    }

    #[test]
    fn test_drag_marks_dirty() {
        let mut scheduler = scheduler();
        scheduler.enqueue(Mutation::InsertNode(NodeSpec::circle(Point::ZERO, 5.0)));
        scheduler.tick();
        assert_eq!(scheduler.drag_move(Point::ZERO).unwrap(), None);
        assert!(!scheduler.tick().dirty);
        scheduler.drag_start(NodeId(0)).unwrap();
        scheduler.drag_move(Point::new(1.0, 1.0)).unwrap();
        assert!(scheduler.tick().dirty);
        assert_eq!(scheduler.drag_end(), Some(NodeId(0)));
    }

    #[test]
    fn test_frame_stats_window() {
        let mut stats = FrameStats::new(3, Duration::from_millis(10));
        for ms in [5, 20, 5, 8] {
            stats.record(Duration::from_millis(ms));
        }
        assert_eq!(stats.frames(), 4);
        assert_eq!(stats.over_budget(), 1);
        assert_eq!(stats.worst(), Duration::from_millis(20));
        assert_eq!(stats.average(), Duration::from_millis(11));
        assert_eq!(stats.last(), Some(Duration::from_millis(8)));
    }

    #[test]
    fn test_huge_frame_budget_is_unbounded() {
        let mut config = CanvasConfig::default();
        config.scheduler.frame_budget_ms = 1e300;
        let mut scheduler = FrameScheduler::with_config(config).unwrap();
        assert_eq!(scheduler.stats().budget(), Duration::MAX);
        scheduler.tick();
        assert_eq!(scheduler.stats().over_budget(), 0);

        let mut config = CanvasConfig::default();
        config.scheduler.frame_budget_ms = -1.0;
        assert!(FrameScheduler::with_config(config).is_err());
    }
}
