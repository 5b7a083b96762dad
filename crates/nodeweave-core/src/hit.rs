//! Point and region picking.
//!
//! Both queries take candidates from the spatial grid and confirm them with
//! exact shape tests. Screen inputs are converted to world space first.

use crate::camera::Camera;
use crate::scene::{Node, NodeId, Scene};
use crate::spatial::SpatialGrid;
use kurbo::{Point, Rect};
use std::cmp::Ordering;

/// Order in which overlapping hits win: smaller area first, then the node
/// inserted last.
fn precedence(a: &Node, b: &Node) -> Ordering {
    a.shape
        .area()
        .total_cmp(&b.shape.area())
        .then_with(|| b.insertion_seq().cmp(&a.insertion_seq()))
}

/// Topmost node containing a world-space point.
pub fn pick_world(scene: &Scene, grid: &SpatialGrid, point: Point) -> Option<NodeId> {
    if !point.is_finite() {
        return None;
    }
    grid.query_point(point)
        .into_iter()
        .filter_map(|id| scene.node(id))
        .filter(|node| node.contains(point))
        .min_by(|a, b| precedence(a, b))
        .map(Node::id)
}

/// Topmost node under a screen-space point.
///
/// When several shapes contain the point the one with the smallest area
/// wins, so a small node drawn over a large one stays selectable. Exact area
/// ties go to the most recently inserted node.
pub fn pick(scene: &Scene, grid: &SpatialGrid, camera: &Camera, screen_point: Point) -> Option<NodeId> {
    pick_world(scene, grid, camera.screen_to_world(screen_point))
}

/// Every node whose shape intersects a world-space rectangle, sorted by id.
pub fn pick_region_world(scene: &Scene, grid: &SpatialGrid, rect: Rect) -> Vec<NodeId> {
    if !(rect.origin().is_finite() && rect.size().is_finite()) {
        return Vec::new();
    }
    let rect = rect.abs();
    grid.query_region(rect)
        .into_iter()
        .filter(|&id| {
            scene
                .node(id)
                .is_some_and(|node| node.shape.intersects_rect(node.position, rect))
        })
        .collect()
}

/// Every node whose shape intersects a screen-space box. Partial overlap
/// counts.
pub fn pick_region(scene: &Scene, grid: &SpatialGrid, camera: &Camera, screen_box: Rect) -> Vec<NodeId> {
    pick_region_world(scene, grid, camera.screen_rect_to_world(screen_box))
}
