//! Scene graph: the authoritative store of nodes, edges and adjacency.
//!
//! Nodes and edges live in arenas addressed by their ids. Fresh ids are taken
//! from the lowest vacant id, so an id only comes back after the element
//! holding it was deleted. Each node carries its incident edge list, which
//! edge insert/remove keep up to date.

use crate::error::{SceneError, SceneResult};
use crate::shapes::{CurveKind, NodeShape, NodeStyle, check_position};
use kurbo::{Point, Rect, Vec2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Largest raw id accepted for nodes and edges.
///
/// Ids index a lookup table sized by the largest live id, so the bound also
/// caps what a single sparse id can cost.
pub const MAX_ID: u32 = (1 << 22) - 1;

/// Identifier of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

/// Identifier of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A positioned object in world space.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub(crate) id: NodeId,
    /// Center of the shape in world coordinates.
    pub position: Point,
    pub shape: NodeShape,
    pub style: NodeStyle,
    /// Pinned nodes are never displaced by the layout engine.
    pub pinned: bool,
    /// Only meaningful while the layout engine runs.
    pub velocity: Vec2,
    pub(crate) seq: u64,
    pub(crate) incident: Vec<EdgeId>,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Axis-aligned bounding box in world coordinates.
    pub fn bounds(&self) -> Rect {
        self.shape.bounds_at(self.position)
    }

    /// Exact containment test against the node's shape.
    pub fn contains(&self, point: Point) -> bool {
        self.shape.contains(self.position, point)
    }

    /// Monotonic insertion stamp; larger means inserted later.
    pub fn insertion_seq(&self) -> u64 {
        self.seq
    }
}

/// A connection between two distinct nodes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub(crate) id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub curve: CurveKind,
}

impl Edge {
    pub fn id(&self) -> EdgeId {
        self.id
    }

    /// The endpoint opposite `node`, if `node` is an endpoint.
    pub fn other(&self, node: NodeId) -> Option<NodeId> {
        if self.source == node {
            Some(self.target)
        } else if self.target == node {
            Some(self.source)
        } else {
            None
        }
    }
}

/// Everything needed to create a node except its id.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    pub position: Point,
    pub shape: NodeShape,
    pub style: NodeStyle,
    pub pinned: bool,
}

impl NodeSpec {
    pub fn new(position: Point, shape: NodeShape) -> Self {
        Self {
            position,
            shape,
            style: NodeStyle::default(),
            pinned: false,
        }
    }

    /// A circle node.
    pub fn circle(position: Point, radius: f64) -> Self {
        Self::new(position, NodeShape::circle(radius))
    }

    /// An axis-aligned rectangle node.
    pub fn rect(position: Point, width: f64, height: f64) -> Self {
        Self::new(position, NodeShape::rect(width, height))
    }

    pub fn with_style(mut self, style: NodeStyle) -> Self {
        self.style = style;
        self
    }

    pub fn pinned(mut self, pinned: bool) -> Self {
        self.pinned = pinned;
        self
    }

    pub(crate) fn validate(&self, id: Option<NodeId>) -> SceneResult<()> {
        check_position(self.position).map_err(|reason| SceneError::geometry(id, reason))?;
        self.shape
            .validate()
            .map_err(|reason| SceneError::geometry(id, reason))
    }
}

/// Values an [`Arena`] can map back to their id.
trait Keyed {
    fn raw_id(&self) -> u32;
}

impl Keyed for Node {
    fn raw_id(&self) -> u32 {
        self.id.0
    }
}

impl Keyed for Edge {
    fn raw_id(&self) -> u32 {
        self.id.0
    }
}

/// Unused entry in `Arena::lookup`.
const NIL: u32 = u32::MAX;

/// Holes are only squeezed out of arenas at least this long.
const COMPACT_MIN: usize = 64;

/// Id-addressed storage with lowest-first id reuse.
///
/// `lookup` maps a raw id to its position in `entries`, which keeps values in
/// insertion order. Removal leaves a hole that is squeezed out once holes
/// outnumber live values. Vacant ids below `lookup.len()` are kept as
/// half-open ranges, so a large explicit id costs one range, not one entry
/// per skipped id.
#[derive(Debug, Clone)]
struct Arena<T> {
    lookup: Vec<u32>,
    entries: Vec<Option<T>>,
    vacant: BTreeMap<u32, u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            lookup: Vec::new(),
            entries: Vec::new(),
            vacant: BTreeMap::new(),
            len: 0,
        }
    }
}

impl<T: Keyed> Arena<T> {
    fn next_id(&self) -> u32 {
        self.vacant
            .keys()
            .next()
            .copied()
            .unwrap_or(self.lookup.len() as u32)
    }

    fn position(&self, raw: u32) -> Option<usize> {
        match self.lookup.get(raw as usize) {
            Some(&pos) if pos != NIL => Some(pos as usize),
            _ => None,
        }
    }

    fn get(&self, raw: u32) -> Option<&T> {
        self.entries.get(self.position(raw)?)?.as_ref()
    }

    fn get_mut(&mut self, raw: u32) -> Option<&mut T> {
        let pos = self.position(raw)?;
        self.entries.get_mut(pos)?.as_mut()
    }

    fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().filter_map(Option::as_ref)
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.iter_mut().filter_map(Option::as_mut)
    }

    /// Store `value` under `raw`, which must be vacant and at most [`MAX_ID`].
    fn put(&mut self, raw: u32, value: T) {
        let end = self.lookup.len() as u32;
        if raw >= end {
            if raw > end {
                self.vacant.insert(end, raw);
            }
            self.lookup.resize(raw as usize + 1, NIL);
        } else {
            self.claim(raw);
        }
        debug_assert_eq!(self.lookup[raw as usize], NIL, "id {raw} is occupied");
        self.lookup[raw as usize] = self.entries.len() as u32;
        self.entries.push(Some(value));
        self.len += 1;
    }

    /// Drop `raw` from the vacant ranges.
    fn claim(&mut self, raw: u32) {
        let Some((&start, &end)) = self.vacant.range(..=raw).next_back() else {
            return;
        };
        if raw >= end {
            return;
        }
        self.vacant.remove(&start);
        if start < raw {
            self.vacant.insert(start, raw);
        }
        if raw + 1 < end {
            self.vacant.insert(raw + 1, end);
        }
    }

    /// Return `raw` to the vacant ranges. A vacancy reaching the end of the
    /// lookup table shrinks the table instead.
    fn release(&mut self, raw: u32) {
        let mut start = raw;
        let mut end = raw + 1;
        if let Some((&s, &e)) = self.vacant.range(..raw).next_back() {
            if e == raw {
                start = s;
                self.vacant.remove(&s);
            }
        }
        if let Some(e) = self.vacant.remove(&end) {
            end = e;
        }
        if end as usize == self.lookup.len() {
            self.lookup.truncate(start as usize);
        } else {
            self.vacant.insert(start, end);
        }
    }

    fn take(&mut self, raw: u32) -> Option<T> {
        let pos = self.position(raw)?;
        let value = self.entries[pos].take()?;
        self.lookup[raw as usize] = NIL;
        self.release(raw);
        self.len -= 1;
        if self.entries.len() >= COMPACT_MIN && self.entries.len() > 2 * self.len {
            self.compact();
        }
        Some(value)
    }

    fn compact(&mut self) {
        self.entries.retain(Option::is_some);
        for (pos, value) in self.entries.iter().enumerate() {
            if let Some(value) = value {
                self.lookup[value.raw_id() as usize] = pos as u32;
            }
        }
    }

    fn clear(&mut self) {
        self.lookup.clear();
        self.entries.clear();
        self.vacant.clear();
        self.len = 0;
    }
}

/// The set of all nodes and edges.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    nodes: Arena<Node>,
    edges: Arena<Edge>,
    next_seq: u64,
}

impl Scene {
    /// Create an empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len == 0
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.0)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn contains_edge(&self, id: EdgeId) -> bool {
        self.edge(id).is_some()
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.iter_mut()
    }

    /// Dense slot of a live node. Slots stay put until the next node removal.
    pub(crate) fn node_slot(&self, id: NodeId) -> Option<usize> {
        self.nodes.position(id.0)
    }

    /// Upper bound (exclusive) on [`node_slot`](Self::node_slot) values.
    pub(crate) fn node_slots(&self) -> usize {
        self.nodes.entries.len()
    }

    /// Live nodes with their dense slots, in insertion order.
    pub(crate) fn slotted_nodes(&self) -> impl Iterator<Item = (usize, &Node)> {
        self.nodes
            .entries
            .iter()
            .enumerate()
            .filter_map(|(slot, node)| node.as_ref().map(|node| (slot, node)))
    }

    pub(crate) fn slotted_nodes_mut(&mut self) -> impl Iterator<Item = (usize, &mut Node)> {
        self.nodes
            .entries
            .iter_mut()
            .enumerate()
            .filter_map(|(slot, node)| node.as_mut().map(|node| (slot, node)))
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Edges in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    /// Node ids in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes().map(Node::id)
    }

    /// Edges touching `id`. Empty for unknown nodes.
    pub fn incident_edges(&self, id: NodeId) -> &[EdgeId] {
        self.node(id)
            .map(|node| node.incident.as_slice())
            .unwrap_or_default()
    }

    /// Nodes sharing an edge with `id`.
    pub fn neighbors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.incident_edges(id)
            .iter()
            .filter_map(move |&e| self.edge(e).and_then(|edge| edge.other(id)))
    }

    /// Bounding box of a node, if it exists.
    pub fn node_bounds(&self, id: NodeId) -> Option<Rect> {
        self.node(id).map(Node::bounds)
    }

    /// Union of all node bounds.
    pub fn bounds(&self) -> Option<Rect> {
        self.nodes()
            .map(Node::bounds)
            .reduce(|acc, bounds| acc.union(bounds))
    }

    /// The id the next [`insert_node`](Self::insert_node) will use.
    pub fn next_node_id(&self) -> NodeId {
        NodeId(self.nodes.next_id())
    }

    /// Insert a node under a freshly allocated id.
    pub fn insert_node(&mut self, spec: NodeSpec) -> SceneResult<NodeId> {
        let id = self.next_node_id();
        self.insert_node_with_id(id, spec)?;
        Ok(id)
    }

    /// Insert a node under a caller-chosen id no larger than [`MAX_ID`].
    pub fn insert_node_with_id(&mut self, id: NodeId, spec: NodeSpec) -> SceneResult<()> {
        if id.0 > MAX_ID {
            return Err(SceneError::NodeIdOutOfRange(id));
        }
        if self.contains_node(id) {
            return Err(SceneError::DuplicateNodeId(id));
        }
        spec.validate(Some(id))?;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.nodes.put(
            id.0,
            Node {
                id,
                position: spec.position,
                shape: spec.shape,
                style: spec.style,
                pinned: spec.pinned,
                velocity: Vec2::ZERO,
                seq,
                incident: Vec::new(),
            },
        );
        Ok(())
    }

    fn check_endpoints(&self, source: NodeId, target: NodeId) -> SceneResult<()> {
        if !self.contains_node(source) {
            return Err(SceneError::NodeNotFound(source));
        }
        if !self.contains_node(target) {
            return Err(SceneError::NodeNotFound(target));
        }
        if source == target {
            return Err(SceneError::SelfLoop(source));
        }
        Ok(())
    }

    /// Connect two existing, distinct nodes.
    pub fn insert_edge(
        &mut self,
        source: NodeId,
        target: NodeId,
        curve: CurveKind,
    ) -> SceneResult<EdgeId> {
        let id = EdgeId(self.edges.next_id());
        self.insert_edge_with_id(id, source, target, curve)?;
        Ok(id)
    }

    /// Connect two nodes under a caller-chosen edge id no larger than
    /// [`MAX_ID`].
    pub fn insert_edge_with_id(
        &mut self,
        id: EdgeId,
        source: NodeId,
        target: NodeId,
        curve: CurveKind,
    ) -> SceneResult<()> {
        if id.0 > MAX_ID {
            return Err(SceneError::EdgeIdOutOfRange(id));
        }
        if self.contains_edge(id) {
            return Err(SceneError::DuplicateEdgeId(id));
        }
        self.check_endpoints(source, target)?;
        if !curve.is_finite() {
            return Err(SceneError::geometry(None, "curve control offsets are not finite"));
        }
        self.edges.put(
            id.0,
            Edge {
                id,
                source,
                target,
                curve,
            },
        );
        for endpoint in [source, target] {
            if let Some(node) = self.node_mut(endpoint) {
                node.incident.push(id);
            }
        }
        Ok(())
    }

    /// Remove an edge and unlink it from both endpoints.
    pub fn remove_edge(&mut self, id: EdgeId) -> SceneResult<Edge> {
        let edge = self.edges.take(id.0).ok_or(SceneError::EdgeNotFound(id))?;
        for endpoint in [edge.source, edge.target] {
            if let Some(node) = self.node_mut(endpoint) {
                node.incident.retain(|&e| e != id);
            }
        }
        Ok(edge)
    }

    /// Remove a node together with every edge that references it.
    ///
    /// Returns the node and the cascaded edges.
    pub fn remove_node(&mut self, id: NodeId) -> SceneResult<(Node, Vec<Edge>)> {
        let incident = match self.node_mut(id) {
            Some(node) => std::mem::take(&mut node.incident),
            None => return Err(SceneError::NodeNotFound(id)),
        };
        let mut removed = Vec::with_capacity(incident.len());
        for edge_id in incident {
            if let Ok(edge) = self.remove_edge(edge_id) {
                removed.push(edge);
            }
        }
        let node = self.nodes.take(id.0).ok_or(SceneError::NodeNotFound(id))?;
        Ok((node, removed))
    }

    /// Move a node. Returns the previous position.
    pub fn set_node_position(&mut self, id: NodeId, position: Point) -> SceneResult<Point> {
        check_position(position).map_err(|reason| SceneError::geometry(Some(id), reason))?;
        let node = self.node_mut(id).ok_or(SceneError::NodeNotFound(id))?;
        Ok(std::mem::replace(&mut node.position, position))
    }

    /// Pin or unpin a node. Returns the previous flag.
    pub fn set_node_pinned(&mut self, id: NodeId, pinned: bool) -> SceneResult<bool> {
        let node = self.node_mut(id).ok_or(SceneError::NodeNotFound(id))?;
        if pinned {
            node.velocity = Vec2::ZERO;
        }
        Ok(std::mem::replace(&mut node.pinned, pinned))
    }

    /// Replace a node's shape. Returns the previous shape.
    pub fn set_node_shape(&mut self, id: NodeId, shape: NodeShape) -> SceneResult<NodeShape> {
        if !self.contains_node(id) {
            return Err(SceneError::NodeNotFound(id));
        }
        shape
            .validate()
            .map_err(|reason| SceneError::geometry(Some(id), reason))?;
        let node = self.node_mut(id).ok_or(SceneError::NodeNotFound(id))?;
        Ok(std::mem::replace(&mut node.shape, shape))
    }

    /// Replace a node's visual attributes.
    pub fn set_node_style(&mut self, id: NodeId, style: NodeStyle) -> SceneResult<NodeStyle> {
        let node = self.node_mut(id).ok_or(SceneError::NodeNotFound(id))?;
        Ok(std::mem::replace(&mut node.style, style))
    }

    /// Replace an edge's curve.
    pub fn set_edge_curve(&mut self, id: EdgeId, curve: CurveKind) -> SceneResult<CurveKind> {
        if !curve.is_finite() {
            return Err(SceneError::geometry(None, "curve control offsets are not finite"));
        }
        let edge = self.edges.get_mut(id.0).ok_or(SceneError::EdgeNotFound(id))?;
        Ok(std::mem::replace(&mut edge.curve, curve))
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
    }
}
