//! Uniform grid spatial hash.
//!
//! World space is divided into square cells of a fixed size. Each node id is
//! registered in every cell its bounding box overlaps, and the grid remembers
//! the span of cells per id so removal only touches those cells. Queries
//! return candidate ids; callers confirm them with exact shape tests.
//!
//! [`NeighborBins`] is the throwaway counterpart used by the layout: points
//! only, rebuilt for every pass, with cells as large as the query radius.

use crate::config::ConfigError;
use crate::scene::NodeId;
use kurbo::{Point, Rect};
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;

/// Cell size used when nothing better is known.
pub const DEFAULT_CELL_SIZE: f64 = 64.0;

/// Multiplier applied to the median node radius when deriving a cell size.
pub const CELL_SIZE_FACTOR: f64 = 4.0;

/// Spans larger than this many cells are kept on a side list instead of
/// being registered cell by cell.
const OVERSIZED_CELLS: u64 = 4096;

/// Integer coordinate of a grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub i: i64,
    pub j: i64,
}

/// Inclusive rectangular range of cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CellSpan {
    min: CellKey,
    max: CellKey,
}

impl CellSpan {
    fn cell_count(&self) -> u64 {
        let w = self.max.i.abs_diff(self.min.i).saturating_add(1);
        let h = self.max.j.abs_diff(self.min.j).saturating_add(1);
        w.saturating_mul(h)
    }

    fn contains(&self, key: CellKey) -> bool {
        (self.min.i..=self.max.i).contains(&key.i) && (self.min.j..=self.max.j).contains(&key.j)
    }

    fn keys(self) -> impl Iterator<Item = CellKey> {
        (self.min.j..=self.max.j)
            .flat_map(move |j| (self.min.i..=self.max.i).map(move |i| CellKey { i, j }))
    }
}

/// Where an id is currently registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Cells(CellSpan),
    Oversized,
}

/// Derive a cell size from node radii: [`CELL_SIZE_FACTOR`] times the median.
///
/// Smaller cells make queries more precise but cost more bookkeeping per
/// move. Returns [`DEFAULT_CELL_SIZE`] when there are no usable radii.
pub fn suggested_cell_size(radii: impl IntoIterator<Item = f64>) -> f64 {
    let mut radii: Vec<f64> = radii
        .into_iter()
        .filter(|r| r.is_finite() && *r > 0.0)
        .collect();
    if radii.is_empty() {
        return DEFAULT_CELL_SIZE;
    }
    radii.sort_by(f64::total_cmp);
    let mid = radii.len() / 2;
    let median = if radii.len() % 2 == 0 {
        0.5 * (radii[mid - 1] + radii[mid])
    } else {
        radii[mid]
    };
    let size = median * CELL_SIZE_FACTOR;
    if size.is_finite() { size } else { DEFAULT_CELL_SIZE }
}

#[inline]
fn cell_key(point: Point, inv_cell_size: f64) -> CellKey {
    // `as` saturates, which is what we want for far-away coordinates.
    CellKey {
        i: (point.x * inv_cell_size).floor() as i64,
        j: (point.y * inv_cell_size).floor() as i64,
    }
}

/// Uniform grid mapping cells to the node ids overlapping them.
#[derive(Clone)]
pub struct SpatialGrid {
    cell_size: f64,
    inv_cell_size: f64,
    /// Occupied cells only; a cell is dropped as soon as it empties.
    cells: HashMap<CellKey, Vec<NodeId>>,
    placements: HashMap<NodeId, Placement>,
    /// Ids whose bounds cover too many cells to register individually.
    oversized: Vec<NodeId>,
    len: usize,
}

impl Default for SpatialGrid {
    /// An empty grid with [`DEFAULT_CELL_SIZE`] cells.
    fn default() -> Self {
        Self::with_valid_size(DEFAULT_CELL_SIZE)
    }
}

impl SpatialGrid {
    /// Create an empty grid. `cell_size` must be a positive finite number.
    pub fn new(cell_size: f64) -> Result<Self, ConfigError> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(ConfigError::Invalid {
                field: "spatial.cell_size",
                reason: format!("must be a positive number, got {cell_size}"),
            });
        }
        Ok(Self::with_valid_size(cell_size))
    }

    fn with_valid_size(cell_size: f64) -> Self {
        Self {
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            cells: HashMap::new(),
            placements: HashMap::new(),
            oversized: Vec::new(),
            len: 0,
        }
    }

    /// Edge length of a cell in world units.
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Number of ids currently indexed.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of occupied cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Whether `id` is indexed.
    pub fn contains(&self, id: NodeId) -> bool {
        self.placement(id).is_some()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.cells.clear();
        self.placements.clear();
        self.oversized.clear();
        self.len = 0;
    }

    /// Cell containing a world point.
    pub fn cell_of(&self, point: Point) -> CellKey {
        cell_key(point, self.inv_cell_size)
    }

    fn span_for(&self, rect: Rect) -> CellSpan {
        let rect = rect.abs();
        CellSpan {
            min: self.cell_of(Point::new(rect.x0, rect.y0)),
            max: self.cell_of(Point::new(rect.x1, rect.y1)),
        }
    }

    fn placement_for(&self, rect: Rect) -> Placement {
        let span = self.span_for(rect);
        if span.cell_count() > OVERSIZED_CELLS {
            Placement::Oversized
        } else {
            Placement::Cells(span)
        }
    }

    fn placement(&self, id: NodeId) -> Option<Placement> {
        self.placements.get(&id).copied()
    }

    fn register(&mut self, id: NodeId, placement: Placement) {
        match placement {
            Placement::Cells(span) => {
                for key in span.keys() {
                    self.cells.entry(key).or_default().push(id);
                }
            }
            Placement::Oversized => self.oversized.push(id),
        }
        self.placements.insert(id, placement);
    }

    fn unregister(&mut self, id: NodeId, placement: Placement) {
        match placement {
            Placement::Cells(span) => {
                for key in span.keys() {
                    if let Some(ids) = self.cells.get_mut(&key) {
                        if let Some(pos) = ids.iter().position(|&other| other == id) {
                            ids.swap_remove(pos);
                        }
                        if ids.is_empty() {
                            self.cells.remove(&key);
                        }
                    }
                }
            }
            Placement::Oversized => self.oversized.retain(|&other| other != id),
        }
        self.placements.remove(&id);
    }

    /// Add `id` to every cell `bounds` overlaps. Re-inserting a known id
    /// behaves like [`update`](Self::update).
    pub fn insert(&mut self, id: NodeId, bounds: Rect) {
        if self.contains(id) {
            self.update(id, bounds);
            return;
        }
        let placement = self.placement_for(bounds);
        self.register(id, placement);
        self.len += 1;
    }

    /// Remove `id` from all cells it occupies. Returns false if it was not
    /// indexed.
    pub fn remove(&mut self, id: NodeId) -> bool {
        match self.placement(id) {
            Some(placement) => {
                self.unregister(id, placement);
                self.len -= 1;
                true
            }
            None => false,
        }
    }

    /// Move `id` to the cells covered by `bounds`.
    ///
    /// Returns true if the cell membership changed. When the new bounds cover
    /// exactly the same cells nothing is touched. Unknown ids are inserted.
    pub fn update(&mut self, id: NodeId, bounds: Rect) -> bool {
        let next = self.placement_for(bounds);
        match self.placement(id) {
            Some(current) if current == next => false,
            Some(current) => {
                self.unregister(id, current);
                self.register(id, next);
                true
            }
            None => {
                self.register(id, next);
                self.len += 1;
                true
            }
        }
    }

    /// Candidates registered in the cell containing `point`.
    pub fn query_point(&self, point: Point) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self
            .cells
            .get(&self.cell_of(point))
            .map(|ids| ids.to_vec())
            .unwrap_or_default();
        out.extend_from_slice(&self.oversized);
        finish(out)
    }

    /// Deduplicated candidates from every cell `rect` overlaps.
    pub fn query_region(&self, rect: Rect) -> Vec<NodeId> {
        let span = self.span_for(rect);
        let mut out: Vec<NodeId> = self.oversized.clone();
        if span.cell_count() <= self.cells.len() as u64 {
            for key in span.keys() {
                if let Some(ids) = self.cells.get(&key) {
                    out.extend_from_slice(ids);
                }
            }
        } else {
            // Fewer occupied cells than cells in the query: walk the occupied set.
            for (key, ids) in &self.cells {
                if span.contains(*key) {
                    out.extend_from_slice(ids);
                }
            }
        }
        finish(out)
    }

    /// Candidates within the square of side `2 * radius` centered on `point`.
    pub fn query_near(&self, point: Point, radius: f64) -> Vec<NodeId> {
        let r = radius.abs();
        self.query_region(Rect::new(point.x - r, point.y - r, point.x + r, point.y + r))
    }
}

/// Sort and deduplicate so callers see a stable order regardless of hashing.
fn finish(mut ids: Vec<NodeId>) -> Vec<NodeId> {
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// A point dropped into [`NeighborBins`], with its payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Binned<T> {
    key: CellKey,
    pub point: Point,
    pub item: T,
}

/// Point buckets rebuilt from scratch for one pass of radius queries.
///
/// Every point lands in exactly one cell. Cells are as large as the query
/// radius, so everything within that radius of a point lies in the 3x3 block
/// of cells around it. Entries are grouped by cell, and within a cell they
/// keep the order they were supplied in, so visits are reproducible.
#[derive(Debug, Clone)]
pub struct NeighborBins<T> {
    radius: f64,
    inv_cell_size: f64,
    entries: Vec<Binned<T>>,
    /// Occupied cells in ascending key order with their entry ranges.
    cells: Vec<(CellKey, Range<usize>)>,
    index: HashMap<CellKey, usize>,
}

impl<T> Default for NeighborBins<T> {
    fn default() -> Self {
        Self {
            radius: 0.0,
            inv_cell_size: 0.0,
            entries: Vec::new(),
            cells: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T> NeighborBins<T> {
    /// Refill the bins for queries of the given `radius`, reusing storage.
    ///
    /// A non-positive or non-finite radius leaves the bins empty.
    pub fn rebuild(&mut self, radius: f64, points: impl IntoIterator<Item = (Point, T)>) {
        self.entries.clear();
        self.cells.clear();
        self.index.clear();
        self.radius = radius;
        if !(radius.is_finite() && radius > 0.0) {
            return;
        }
        self.inv_cell_size = 1.0 / radius;
        let inv = self.inv_cell_size;
        self.entries.extend(points.into_iter().map(|(point, item)| Binned {
            key: cell_key(point, inv),
            point,
            item,
        }));
        self.entries.sort_by_key(|entry| entry.key);

        let mut start = 0;
        while start < self.entries.len() {
            let key = self.entries[start].key;
            let end = start
                + self.entries[start..]
                    .iter()
                    .take_while(|entry| entry.key == key)
                    .count();
            self.index.insert(key, self.cells.len());
            self.cells.push((key, start..end));
            start = end;
        }
    }

    /// Query radius the bins were built for.
    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of occupied cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Entries of the `n`th occupied cell. Cells partition the entries, so
    /// workers can own disjoint cells.
    pub fn cell(&self, n: usize) -> &[Binned<T>] {
        self.cells
            .get(n)
            .map(|(_, range)| &self.entries[range.clone()])
            .unwrap_or_default()
    }

    /// Visit every entry in the 3x3 block of cells around `point`: a superset
    /// of the entries within [`radius`](Self::radius) of it.
    pub fn query_near(&self, point: Point, mut visit: impl FnMut(&Binned<T>)) {
        if self.entries.is_empty() {
            return;
        }
        let center = cell_key(point, self.inv_cell_size);
        for j in center.j.saturating_sub(1)..=center.j.saturating_add(1) {
            for i in center.i.saturating_sub(1)..=center.i.saturating_add(1) {
                if let Some(&n) = self.index.get(&CellKey { i, j }) {
                    self.cell(n).iter().for_each(&mut visit);
                }
            }
        }
    }
}

impl fmt::Debug for SpatialGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpatialGrid")
            .field("cell_size", &self.cell_size)
            .field("len", &self.len)
            .field("cells", &self.cells.len())
            .field("oversized", &self.oversized.len())
            .finish_non_exhaustive()
    }
}
