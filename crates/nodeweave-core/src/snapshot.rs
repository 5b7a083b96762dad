//! Read-only, screen-space view of the scene handed to a renderer.

use crate::camera::Camera;
use crate::scene::{EdgeId, Node, NodeId, Scene};
use crate::selection::Selection;
use crate::shapes::{NodeShape, NodeStyle};
use crate::spatial::SpatialGrid;
use kurbo::{Point, Rect};

/// A node ready to draw.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSprite {
    pub id: NodeId,
    /// Shape center in screen pixels.
    pub center: Point,
    /// Shape with its dimensions already scaled to screen pixels.
    pub shape: NodeShape,
    pub style: NodeStyle,
    pub selected: bool,
    pub pinned: bool,
}

/// An edge ready to draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeSprite {
    pub id: EdgeId,
    pub source: Point,
    pub target: Point,
    /// Bezier control points in screen pixels; `None` for straight lines.
    pub controls: Option<(Point, Point)>,
}

/// Everything visible in the viewport, in draw order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderSnapshot {
    /// Edges are drawn first so nodes cover their endpoints.
    pub edges: Vec<EdgeSprite>,
    /// Nodes in insertion order; later nodes draw on top.
    pub nodes: Vec<NodeSprite>,
    /// World-to-screen scale the sprites were produced with.
    pub scale: f64,
    /// World rectangle the snapshot covers.
    pub visible: Rect,
}

fn overlaps(a: Rect, b: Rect) -> bool {
    a.x0 <= b.x1 && b.x0 <= a.x1 && a.y0 <= b.y1 && b.y0 <= a.y1
}

fn scale_shape(shape: NodeShape, scale: f64) -> NodeShape {
    match shape {
        NodeShape::Circle { radius } => NodeShape::Circle {
            radius: radius * scale,
        },
        NodeShape::Rectangle {
            width,
            height,
            rotation,
        } => NodeShape::Rectangle {
            width: width * scale,
            height: height * scale,
            rotation,
        },
    }
}

impl RenderSnapshot {
    /// Capture the part of `scene` visible through `camera`.
    ///
    /// Nodes are culled through the spatial grid; edges are kept when the
    /// bounds of their curve touch the viewport, even if both endpoints are
    /// off screen.
    pub fn capture(scene: &Scene, grid: &SpatialGrid, camera: &Camera, selection: &Selection) -> Self {
        let visible = camera.visible_world_rect();
        let scale = camera.scale();

        let mut visible_nodes: Vec<&Node> = grid
            .query_region(visible)
            .into_iter()
            .filter_map(|id| scene.node(id))
            .filter(|node| overlaps(node.bounds(), visible))
            .collect();
        visible_nodes.sort_by_key(|node| node.insertion_seq());

        let nodes = visible_nodes
            .into_iter()
            .map(|node| NodeSprite {
                id: node.id(),
                center: camera.world_to_screen(node.position),
                shape: scale_shape(node.shape, scale),
                style: node.style.clone(),
                selected: selection.is_selected(node.id()),
                pinned: node.pinned,
            })
            .collect();

        let edges = scene
            .edges()
            .filter_map(|edge| {
                let source = scene.node(edge.source)?.position;
                let target = scene.node(edge.target)?.position;
                if !overlaps(edge.curve.bounds(source, target), visible) {
                    return None;
                }
                Some(EdgeSprite {
                    id: edge.id(),
                    source: camera.world_to_screen(source),
                    target: camera.world_to_screen(target),
                    controls: edge
                        .curve
                        .control_points(source, target)
                        .map(|(c1, c2)| (camera.world_to_screen(c1), camera.world_to_screen(c2))),
                })
            })
            .collect();

        Self {
            edges,
            nodes,
            scale,
            visible,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}
