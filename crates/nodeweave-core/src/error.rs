//! Error types for scene operations.

use crate::scene::{EdgeId, MAX_ID, NodeId};
use thiserror::Error;

/// Coarse classification of a [`SceneError`].
///
/// Every failure the core reports falls into one of these buckets, so a host
/// can decide between retrying, discarding, or surfacing the problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The operation referenced an id absent from the scene.
    NotFound,
    /// Non-finite position or non-positive size.
    InvalidGeometry,
    /// A persistence document violated referential integrity.
    Validation,
    /// An insert used an id that is already live.
    DuplicateId,
    /// An explicit id exceeds [`MAX_ID`](crate::scene::MAX_ID).
    OutOfRange,
}

/// Problems found while validating a persistence document.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationIssue {
    #[error("node id {0} appears more than once")]
    DuplicateNodeId(NodeId),
    #[error("edge id {0} appears more than once")]
    DuplicateEdgeId(EdgeId),
    #[error("edge {edge} references unknown node {node}")]
    UnknownEndpoint { edge: EdgeId, node: NodeId },
    #[error("edge {edge} connects node {node} to itself")]
    SelfLoop { edge: EdgeId, node: NodeId },
    #[error("node {node} has invalid geometry: {reason}")]
    Geometry { node: NodeId, reason: String },
    #[error("edge {0} has non-finite curve control offsets")]
    Curve(EdgeId),
    #[error("node id {0} exceeds the largest allowed id {max}", max = MAX_ID)]
    NodeIdOutOfRange(NodeId),
    #[error("edge id {0} exceeds the largest allowed id {max}", max = MAX_ID)]
    EdgeIdOutOfRange(EdgeId),
}

/// Errors returned by scene mutations and queries.
///
/// All of them are recoverable: operations validate their input before
/// touching the scene, so a failed call leaves everything as it was.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SceneError {
    #[error("node {0} not found")]
    NodeNotFound(NodeId),
    #[error("edge {0} not found")]
    EdgeNotFound(EdgeId),
    #[error("invalid geometry{}: {reason}", node.map(|n| format!(" for node {n}")).unwrap_or_default())]
    InvalidGeometry {
        node: Option<NodeId>,
        reason: String,
    },
    #[error("edge would connect node {0} to itself")]
    SelfLoop(NodeId),
    #[error("node id {0} is already in use")]
    DuplicateNodeId(NodeId),
    #[error("edge id {0} is already in use")]
    DuplicateEdgeId(EdgeId),
    #[error("node id {0} exceeds the largest allowed id {max}", max = MAX_ID)]
    NodeIdOutOfRange(NodeId),
    #[error("edge id {0} exceeds the largest allowed id {max}", max = MAX_ID)]
    EdgeIdOutOfRange(EdgeId),
    #[error("document rejected: {0}")]
    Validation(#[from] ValidationIssue),
}

impl SceneError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SceneError::NodeNotFound(_) | SceneError::EdgeNotFound(_) => ErrorKind::NotFound,
            SceneError::InvalidGeometry { .. } | SceneError::SelfLoop(_) => {
                ErrorKind::InvalidGeometry
            }
            SceneError::DuplicateNodeId(_) | SceneError::DuplicateEdgeId(_) => {
                ErrorKind::DuplicateId
            }
            SceneError::NodeIdOutOfRange(_) | SceneError::EdgeIdOutOfRange(_) => {
                ErrorKind::OutOfRange
            }
            SceneError::Validation(_) => ErrorKind::Validation,
        }
    }

    pub(crate) fn geometry(node: Option<NodeId>, reason: impl Into<String>) -> Self {
        SceneError::InvalidGeometry {
            node,
            reason: reason.into(),
        }
    }
}

/// Result type for scene operations.
pub type SceneResult<T> = Result<T, SceneError>;
