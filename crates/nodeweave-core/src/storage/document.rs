//! Persistence document: the JSON-facing form of a [`Scene`].

use crate::error::{SceneError, SceneResult, ValidationIssue};
use crate::scene::{EdgeId, NodeId, NodeSpec, Scene};
use crate::shapes::{CurveKind, NodeShape, NodeStyle};
use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Current document format version.
pub const DOCUMENT_VERSION: u32 = 1;

fn default_version() -> u32 {
    DOCUMENT_VERSION
}

/// A node as stored in a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub id: NodeId,
    pub x: f64,
    pub y: f64,
    /// Serialized as `shapeKind` + `shapeParams`.
    #[serde(flatten)]
    pub shape: NodeShape,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub style: NodeStyle,
}

/// An edge as stored in a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeRecord {
    pub id: EdgeId,
    pub source_id: NodeId,
    pub target_id: NodeId,
    /// Serialized as `curveKind` + `curveParams`.
    #[serde(flatten)]
    pub curve: CurveKind,
}

/// Ordered node and edge records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDocument {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub edges: Vec<EdgeRecord>,
}

impl Default for SceneDocument {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }
}

impl SceneDocument {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture every live node and edge in insertion order.
    pub fn from_scene(scene: &Scene) -> Self {
        let nodes = scene
            .nodes()
            .map(|node| NodeRecord {
                id: node.id(),
                x: node.position.x,
                y: node.position.y,
                shape: node.shape,
                pinned: node.pinned,
                style: node.style.clone(),
            })
            .collect();
        let edges = scene
            .edges()
            .map(|edge| EdgeRecord {
                id: edge.id(),
                source_id: edge.source,
                target_id: edge.target,
                curve: edge.curve,
            })
            .collect();
        Self {
            version: DOCUMENT_VERSION,
            nodes,
            edges,
        }
    }

    /// Build a scene from the records, rejecting the whole document on the
    /// first integrity problem. Every failure is a `Validation` error.
    pub fn to_scene(&self) -> SceneResult<Scene> {
        let mut scene = Scene::new();
        for record in &self.nodes {
            let spec = NodeSpec::new(Point::new(record.x, record.y), record.shape)
                .with_style(record.style.clone())
                .pinned(record.pinned);
            scene
                .insert_node_with_id(record.id, spec)
                .map_err(|err| match err {
                    SceneError::DuplicateNodeId(id) => ValidationIssue::DuplicateNodeId(id),
                    SceneError::NodeIdOutOfRange(id) => ValidationIssue::NodeIdOutOfRange(id),
                    other => ValidationIssue::Geometry {
                        node: record.id,
                        reason: reason_of(other),
                    },
                })?;
        }
        for record in &self.edges {
            scene
                .insert_edge_with_id(record.id, record.source_id, record.target_id, record.curve)
                .map_err(|err| match err {
                    SceneError::DuplicateEdgeId(id) => ValidationIssue::DuplicateEdgeId(id),
                    SceneError::EdgeIdOutOfRange(id) => ValidationIssue::EdgeIdOutOfRange(id),
                    SceneError::NodeNotFound(node) => ValidationIssue::UnknownEndpoint {
                        edge: record.id,
                        node,
                    },
                    SceneError::SelfLoop(node) => ValidationIssue::SelfLoop {
                        edge: record.id,
                        node,
                    },
                    _ => ValidationIssue::Curve(record.id),
                })?;
        }
        log::debug!(
            "Loaded document with {} nodes and {} edges",
            scene.node_count(),
            scene.edge_count()
        );
        Ok(scene)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse from JSON. Integrity is checked later by [`to_scene`](Self::to_scene).
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

fn reason_of(err: SceneError) -> String {
    match err {
        SceneError::InvalidGeometry { reason, .. } => reason,
        other => other.to_string(),
    }
}

impl Scene {
    /// Build a scene from a persistence document.
    pub fn from_document(document: &SceneDocument) -> SceneResult<Self> {
        document.to_scene()
    }

    /// Snapshot this scene as a persistence document.
    pub fn to_document(&self) -> SceneDocument {
        SceneDocument::from_scene(self)
    }
}
