//! Canvas state: the scene plus everything derived from or layered on it.
//!
//! Every mutation goes through [`Canvas`] so the spatial grid, selection and
//! layout state stay consistent with the scene. Operations validate before
//! writing; a failed call changes nothing.

use crate::camera::Camera;
use crate::config::{CanvasConfig, ConfigError};
use crate::error::{SceneError, SceneResult};
use crate::hit;
use crate::layout::{ForceLayout, LayoutState, StepReport};
use crate::scene::{Edge, EdgeId, Node, NodeId, NodeSpec, Scene};
use crate::selection::Selection;
use crate::shapes::{CurveKind, NodeShape, NodeStyle};
use crate::snapshot::RenderSnapshot;
use crate::spatial::{SpatialGrid, suggested_cell_size};
use crate::storage::SceneDocument;
use kurbo::{Point, Rect, Size, Vec2};

/// Padding in screen pixels used by [`Canvas::fit_to_content`].
pub const FIT_PADDING: f64 = 50.0;

/// An in-progress drag of a single node.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Drag {
    node: NodeId,
    /// Node center minus the pointer position at the last move, in world units.
    grab: Vec2,
    started: bool,
}

/// Runtime canvas state.
#[derive(Debug, Clone)]
pub struct Canvas {
    scene: Scene,
    grid: SpatialGrid,
    camera: Camera,
    layout: ForceLayout,
    selection: Selection,
    drag: Option<Drag>,
    config: CanvasConfig,
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new()
    }
}

impl Canvas {
    /// Create an empty canvas with default settings.
    pub fn new() -> Self {
        Self::assemble(Scene::new(), CanvasConfig::default())
    }

    /// Create an empty canvas.
    pub fn with_config(config: CanvasConfig) -> Result<Self, ConfigError> {
        Self::with_scene(Scene::new(), config)
    }

    /// Wrap an existing scene, indexing every node.
    pub fn with_scene(scene: Scene, config: CanvasConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::assemble(scene, config))
    }

    /// `config` must already be valid.
    fn assemble(scene: Scene, config: CanvasConfig) -> Self {
        let mut canvas = Self {
            grid: SpatialGrid::new(cell_size_for(&scene, &config)).unwrap_or_default(),
            scene,
            camera: Camera::from_config(&config.camera).unwrap_or_default(),
            layout: ForceLayout::new(config.layout.clone()),
            selection: Selection::new(),
            drag: None,
            config,
        };
        canvas.reindex();
        canvas
    }

    /// Capture the scene as a persistence document.
    pub fn to_document(&self) -> SceneDocument {
        self.scene.to_document()
    }

    /// Replace the whole scene, e.g. after loading. Selected nodes that
    /// exist in the new scene stay selected; drag and layout state are reset.
    pub fn replace_scene(&mut self, scene: Scene) {
        self.selection.retain(|id| scene.contains_node(id));
        self.scene = scene;
        self.drag = None;
        self.layout.release();
        self.layout.stop();
        self.grid = SpatialGrid::new(cell_size_for(&self.scene, &self.config)).unwrap_or_default();
        self.reindex();
    }

    /// Rebuild the spatial grid from scratch.
    pub fn reindex(&mut self) {
        self.grid.clear();
        for node in self.scene.nodes() {
            self.grid.insert(node.id(), node.bounds());
        }
        log::debug!(
            "Indexed {} nodes into {} cells (cell size {})",
            self.grid.len(),
            self.grid.cell_count(),
            self.grid.cell_size()
        );
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn layout(&self) -> &ForceLayout {
        &self.layout
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    fn refresh(&mut self, id: NodeId) {
        if let Some(bounds) = self.scene.node_bounds(id) {
            self.grid.update(id, bounds);
        }
    }

    // --- Scene mutations ---

    /// Insert a node under a fresh id.
    pub fn insert_node(&mut self, spec: NodeSpec) -> SceneResult<NodeId> {
        let id = self.scene.insert_node(spec)?;
        self.refresh(id);
        self.layout.perturb();
        Ok(id)
    }

    /// Insert a node under a caller-chosen id.
    pub fn insert_node_with_id(&mut self, id: NodeId, spec: NodeSpec) -> SceneResult<()> {
        self.scene.insert_node_with_id(id, spec)?;
        self.refresh(id);
        self.layout.perturb();
        Ok(())
    }

    /// Connect two existing, distinct nodes.
    pub fn insert_edge(&mut self, source: NodeId, target: NodeId, curve: CurveKind) -> SceneResult<EdgeId> {
        let id = self.scene.insert_edge(source, target, curve)?;
        self.layout.perturb();
        Ok(id)
    }

    /// Delete a node and every edge touching it.
    pub fn delete_node(&mut self, id: NodeId) -> SceneResult<(Node, Vec<Edge>)> {
        let (node, edges) = self.scene.remove_node(id)?;
        self.grid.remove(id);
        self.selection.remove(id);
        if self.drag.is_some_and(|drag| drag.node == id) {
            self.drag = None;
        }
        if self.layout.held() == Some(id) {
            self.layout.release();
        }
        self.layout.perturb();
        log::debug!("Deleted node {id} and {} edges", edges.len());
        Ok((node, edges))
    }

    /// Delete a single edge.
    pub fn delete_edge(&mut self, id: EdgeId) -> SceneResult<Edge> {
        let edge = self.scene.remove_edge(id)?;
        self.layout.perturb();
        Ok(edge)
    }

    /// Delete every selected node. Returns how many were removed.
    pub fn delete_selected(&mut self) -> usize {
        let ids: Vec<NodeId> = self.selection.iter().collect();
        ids.into_iter()
            .filter(|&id| self.delete_node(id).is_ok())
            .count()
    }

    /// Move a node. Returns the previous position.
    pub fn set_node_position(&mut self, id: NodeId, position: Point) -> SceneResult<Point> {
        let previous = self.scene.set_node_position(id, position)?;
        if let Some(node) = self.scene.node_mut(id) {
            node.velocity = Vec2::ZERO;
        }
        self.refresh(id);
        self.layout.perturb();
        Ok(previous)
    }

    /// Pin or unpin a node. Returns the previous flag.
    pub fn set_node_pinned(&mut self, id: NodeId, pinned: bool) -> SceneResult<bool> {
        let previous = self.scene.set_node_pinned(id, pinned)?;
        if previous != pinned {
            self.layout.perturb();
        }
        Ok(previous)
    }

    /// Replace a node's shape. Returns the previous shape.
    pub fn set_node_shape(&mut self, id: NodeId, shape: NodeShape) -> SceneResult<NodeShape> {
        let previous = self.scene.set_node_shape(id, shape)?;
        self.refresh(id);
        self.layout.perturb();
        Ok(previous)
    }

    /// Replace a node's visual attributes.
    pub fn set_node_style(&mut self, id: NodeId, style: NodeStyle) -> SceneResult<NodeStyle> {
        self.scene.set_node_style(id, style)
    }

    /// Replace an edge's curve.
    pub fn set_edge_curve(&mut self, id: EdgeId, curve: CurveKind) -> SceneResult<CurveKind> {
        self.scene.set_edge_curve(id, curve)
    }

    // --- Queries ---

    /// Topmost node under a screen point.
    pub fn pick(&self, screen_point: Point) -> Option<NodeId> {
        hit::pick(&self.scene, &self.grid, &self.camera, screen_point)
    }

    /// Nodes intersecting a screen-space box.
    pub fn pick_region(&self, screen_box: Rect) -> Vec<NodeId> {
        hit::pick_region(&self.scene, &self.grid, &self.camera, screen_box)
    }

    /// Screen-space view of everything visible.
    pub fn snapshot(&self) -> RenderSnapshot {
        RenderSnapshot::capture(&self.scene, &self.grid, &self.camera, &self.selection)
    }

    // --- Camera ---

    /// Pan by a screen-space delta. Returns true if the view moved.
    pub fn pan_by(&mut self, delta: Vec2) -> bool {
        if !delta.is_finite() || delta == Vec2::ZERO {
            return false;
        }
        self.camera.pan_by(delta);
        true
    }

    /// Zoom around a screen point. Returns true if the view changed.
    pub fn zoom_at(&mut self, screen_point: Point, factor: f64) -> bool {
        self.camera.zoom_at(screen_point, factor)
    }

    /// Resize the output surface.
    pub fn set_viewport(&mut self, viewport: Size) -> bool {
        if self.camera.viewport == viewport {
            return false;
        }
        self.camera.set_viewport(viewport);
        true
    }

    /// Fit the view to show all nodes. Returns false for an empty scene.
    pub fn fit_to_content(&mut self) -> bool {
        match self.scene.bounds() {
            Some(bounds) => {
                self.camera.fit_to_bounds(bounds, FIT_PADDING);
                true
            }
            None => false,
        }
    }

    /// Reset camera to identity pan and zoom.
    pub fn reset_view(&mut self) {
        self.camera.reset();
    }

    // --- Selection ---

    /// Replace the selection. Unknown ids are rejected and nothing changes.
    pub fn select(&mut self, ids: &[NodeId]) -> SceneResult<bool> {
        if let Some(&missing) = ids.iter().find(|&&id| !self.scene.contains_node(id)) {
            return Err(SceneError::NodeNotFound(missing));
        }
        Ok(self.selection.select(ids.iter().copied()))
    }

    /// Flip whether a node is selected.
    pub fn toggle_selection(&mut self, id: NodeId) -> SceneResult<bool> {
        if !self.scene.contains_node(id) {
            return Err(SceneError::NodeNotFound(id));
        }
        Ok(self.selection.toggle(id))
    }

    /// Clear selection.
    pub fn clear_selection(&mut self) -> bool {
        self.selection.clear()
    }

    /// Select every node.
    pub fn select_all(&mut self) -> bool {
        self.selection.select(self.scene.node_ids())
    }

    // --- Drag ---

    /// Begin dragging a node. The node is held still by the layout engine
    /// until [`drag_end`](Self::drag_end).
    pub fn drag_start(&mut self, id: NodeId) -> SceneResult<()> {
        if !self.scene.contains_node(id) {
            return Err(SceneError::NodeNotFound(id));
        }
        self.drag_end();
        if let Some(node) = self.scene.node_mut(id) {
            node.velocity = Vec2::ZERO;
        }
        self.drag = Some(Drag {
            node: id,
            grab: Vec2::ZERO,
            started: false,
        });
        self.layout.hold(id);
        Ok(())
    }

    /// Move the dragged node under a screen point.
    ///
    /// The first move records where the pointer grabbed the node, so the node
    /// does not jump to the cursor. Returns the dragged node, or `None` if no
    /// drag is active.
    pub fn drag_move(&mut self, screen_point: Point) -> SceneResult<Option<NodeId>> {
        let Some(mut drag) = self.drag else {
            return Ok(None);
        };
        let pointer = self.camera.screen_to_world(screen_point);
        let center = self
            .scene
            .node(drag.node)
            .map(|node| node.position)
            .ok_or(SceneError::NodeNotFound(drag.node))?;
        if !drag.started {
            drag.grab = center - pointer;
            drag.started = true;
        }
        self.scene.set_node_position(drag.node, pointer + drag.grab)?;
        self.drag = Some(drag);
        self.refresh(drag.node);
        self.layout.perturb();
        Ok(Some(drag.node))
    }

    /// Finish the current drag. Returns the node that was being dragged.
    pub fn drag_end(&mut self) -> Option<NodeId> {
        let drag = self.drag.take()?;
        self.layout.release();
        Some(drag.node)
    }

    /// Node currently being dragged.
    pub fn dragging(&self) -> Option<NodeId> {
        self.drag.map(|drag| drag.node)
    }

    // --- Layout ---

    /// Start (or restart) the force-directed layout.
    pub fn layout_start(&mut self) {
        self.layout.start(&mut self.scene);
    }

    /// Stop the layout.
    pub fn layout_stop(&mut self) {
        self.layout.stop();
    }

    /// Advance the layout by `dt`. A no-op unless it is running.
    pub fn layout_step(&mut self, dt: f64) -> StepReport {
        self.layout.step(dt, &mut self.scene, &mut self.grid)
    }

    pub fn layout_state(&self) -> LayoutState {
        self.layout.state()
    }
}

fn cell_size_for(scene: &Scene, config: &CanvasConfig) -> f64 {
    config.spatial.cell_size.unwrap_or_else(|| {
        suggested_cell_size(scene.nodes().map(|node| node.shape.bounding_radius()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn three_nodes() -> (Canvas, [NodeId; 3]) {
        let mut canvas = Canvas::new();
        let a = canvas.insert_node(NodeSpec::circle(Point::new(0.0, 0.0), 4.0)).unwrap();
        let b = canvas.insert_node(NodeSpec::circle(Point::new(10.0, 0.0), 4.0)).unwrap();
        let c = canvas.insert_node(NodeSpec::circle(Point::new(5.0, 10.0), 4.0)).unwrap();
        (canvas, [a, b, c])
    }

    #[test]
    fn test_insert_indexes_node() {
        let (canvas, [a, b, c]) = three_nodes();
        assert_eq!(canvas.grid().len(), 3);
        assert_eq!(canvas.pick(Point::new(10.0, 0.0)), Some(b));
        assert_eq!(canvas.pick(Point::new(0.0, 0.0)), Some(a));
        assert_eq!(canvas.pick(Point::new(5.0, 11.0)), Some(c));
    }

    #[test]
    fn test_failed_mutation_changes_nothing() {
        let (mut canvas, [a, ..]) = three_nodes();
        let err = canvas
            .set_node_position(a, Point::new(f64::NAN, 0.0))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidGeometry);
        assert_eq!(canvas.scene().node(a).unwrap().position, Point::ZERO);
        assert_eq!(
            canvas.delete_node(NodeId(99)).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(canvas.scene().node_count(), 3);
    }

    #[test]
    fn test_move_updates_grid() {
        let (mut canvas, [a, ..]) = three_nodes();
        canvas.set_node_position(a, Point::new(1000.0, 1000.0)).unwrap();
        assert_eq!(canvas.pick(Point::new(1000.0, 1000.0)), Some(a));
        assert_ne!(canvas.pick(Point::new(0.0, 0.0)), Some(a));
    }

    #[test]
    fn test_shape_change_updates_grid() {
        let (mut canvas, [a, ..]) = three_nodes();
        canvas.set_node_shape(a, NodeShape::circle(300.0)).unwrap();
        assert_eq!(canvas.pick(Point::new(-250.0, 0.0)), Some(a));
    }

    #[test]
    fn test_delete_cleans_up_selection_and_drag() {
        let (mut canvas, [a, b, _]) = three_nodes();
        canvas.insert_edge(a, b, CurveKind::Line).unwrap();
        canvas.select(&[a, b]).unwrap();
        canvas.drag_start(a).unwrap();
        let (_, edges) = canvas.delete_node(a).unwrap();
        assert_eq!(edges.len(), 1);
        assert!(!canvas.selection().is_selected(a));
        assert_eq!(canvas.dragging(), None);
        assert_eq!(canvas.layout().held(), None);
        assert!(!canvas.grid().contains(a));
    }

    #[test]
    fn test_select_rejects_unknown() {
        let (mut canvas, [a, ..]) = three_nodes();
        canvas.select(&[a]).unwrap();
        assert_eq!(
            canvas.select(&[a, NodeId(42)]),
            Err(SceneError::NodeNotFound(NodeId(42)))
        );
        assert_eq!(canvas.selection().iter().collect::<Vec<_>>(), vec![a]);
    }

    #[test]
    fn test_delete_selected() {
        let (mut canvas, [a, _, c]) = three_nodes();
        canvas.select(&[a, c]).unwrap();
        assert_eq!(canvas.delete_selected(), 2);
        assert_eq!(canvas.scene().node_count(), 1);
        assert!(canvas.selection().is_empty());
    }

    #[test]
    fn test_drag_keeps_grab_offset() {
        let (mut canvas, [a, ..]) = three_nodes();
        canvas.drag_start(a).unwrap();
        assert_eq!(canvas.drag_move(Point::new(2.0, 1.0)).unwrap(), Some(a));
        assert_eq!(canvas.scene().node(a).unwrap().position, Point::ZERO);
        canvas.drag_move(Point::new(52.0, 21.0)).unwrap();
        assert_eq!(canvas.scene().node(a).unwrap().position, Point::new(50.0, 20.0));
        assert_eq!(canvas.pick(Point::new(50.0, 20.0)), Some(a));
        assert_eq!(canvas.drag_end(), Some(a));
        assert_eq!(canvas.drag_move(Point::ZERO).unwrap(), None);
    }

    #[test]
    fn test_dragged_node_ignored_by_layout() {
        let (mut canvas, [a, ..]) = three_nodes();
        canvas.layout_start();
        canvas.drag_start(a).unwrap();
        for _ in 0..10 {
            let report = canvas.layout_step(1.0);
            assert!(!report.moved.contains(&a));
        }
        assert_eq!(canvas.scene().node(a).unwrap().position, Point::ZERO);
        assert!(!canvas.scene().node(a).unwrap().pinned);
    }

    #[test]
    fn test_mutation_wakes_converged_layout() {
        let mut canvas = Canvas::new();
        canvas.insert_node(NodeSpec::circle(Point::ZERO, 4.0)).unwrap();
        canvas.layout_start();
        while canvas.layout_state() == LayoutState::Running {
            canvas.layout_step(1.0);
        }
        assert_eq!(canvas.layout_state(), LayoutState::Converged);
        canvas.insert_node(NodeSpec::circle(Point::new(1.0, 0.0), 4.0)).unwrap();
        assert_eq!(canvas.layout_state(), LayoutState::Running);
    }

    #[test]
    fn test_camera_operations_report_change() {
        let (mut canvas, _) = three_nodes();
        assert!(!canvas.pan_by(Vec2::ZERO));
        assert!(canvas.pan_by(Vec2::new(5.0, 0.0)));
        assert!(canvas.zoom_at(Point::new(100.0, 100.0), 1.1));
        assert!(!canvas.set_viewport(canvas.camera().viewport));
        assert!(canvas.fit_to_content());
        assert!(!Canvas::new().fit_to_content());
    }

    #[test]
    fn test_document_roundtrip() {
        let (mut canvas, [a, b, _]) = three_nodes();
        canvas.insert_edge(a, b, CurveKind::Line).unwrap();
        let scene = Scene::from_document(&canvas.to_document()).unwrap();
        let restored = Canvas::with_scene(scene, CanvasConfig::default()).unwrap();
        assert_eq!(restored.scene().node_count(), 3);
        assert_eq!(restored.scene().edge_count(), 1);
        assert_eq!(restored.grid().len(), 3);
        assert_eq!(restored.pick(Point::new(10.0, 0.0)), Some(b));
    }

    #[test]
    fn test_replace_scene_keeps_surviving_selection() {
        let (mut canvas, [a, b, c]) = three_nodes();
        canvas.select(&[a, c]).unwrap();
        let mut scene = Scene::new();
        scene
            .insert_node_with_id(c, NodeSpec::circle(Point::new(200.0, 0.0), 4.0))
            .unwrap();
        scene.insert_node_with_id(b, NodeSpec::circle(Point::ZERO, 4.0)).unwrap();
        canvas.replace_scene(scene);
        assert_eq!(canvas.selection().iter().collect::<Vec<_>>(), vec![c]);
        assert_eq!(canvas.pick(Point::new(200.0, 0.0)), Some(c));
        assert_eq!(canvas.layout_state(), LayoutState::Idle);
    }

    #[test]
    fn test_with_config_rejects_invalid_settings() {
        let mut inverted = CanvasConfig::default();
        inverted.camera.min_zoom = 4.0;
        inverted.camera.max_zoom = 2.0;
        assert!(matches!(
            Canvas::with_config(inverted),
            Err(ConfigError::Invalid { field: "camera.min_zoom", .. })
        ));

        let mut zero_cells = CanvasConfig::default();
        zero_cells.spatial.cell_size = Some(0.0);
        assert!(matches!(
            Canvas::with_config(zero_cells),
            Err(ConfigError::Invalid { field: "spatial.cell_size", .. })
        ));

        let mut budget = CanvasConfig::default();
        budget.scheduler.frame_budget_ms = f64::INFINITY;
        assert!(Canvas::with_scene(Scene::new(), budget).is_err());
    }
}
