//! Selected node set.

use crate::scene::NodeId;
use std::collections::BTreeSet;

/// The set of currently selected nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    ids: BTreeSet<NodeId>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the selection. Returns true if it changed.
    pub fn select(&mut self, ids: impl IntoIterator<Item = NodeId>) -> bool {
        let next: BTreeSet<NodeId> = ids.into_iter().collect();
        if next == self.ids {
            return false;
        }
        self.ids = next;
        true
    }

    /// Add to selection.
    pub fn add(&mut self, id: NodeId) -> bool {
        self.ids.insert(id)
    }

    /// Flip membership of `id`. Returns whether it is selected afterwards.
    pub fn toggle(&mut self, id: NodeId) -> bool {
        if self.ids.remove(&id) {
            false
        } else {
            self.ids.insert(id);
            true
        }
    }

    /// Drop `id`, e.g. after the node was deleted.
    pub fn remove(&mut self, id: NodeId) -> bool {
        self.ids.remove(&id)
    }

    /// Clear selection. Returns true if anything was selected.
    pub fn clear(&mut self) -> bool {
        let had_any = !self.ids.is_empty();
        self.ids.clear();
        had_any
    }

    pub fn is_selected(&self, id: NodeId) -> bool {
        self.ids.contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Selected ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.ids.iter().copied()
    }

    /// Keep only ids accepted by `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(NodeId) -> bool) {
        self.ids.retain(|&id| keep(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_replaces() {
        let mut selection = Selection::new();
        assert!(selection.select([NodeId(1), NodeId(2)]));
        assert!(!selection.select([NodeId(2), NodeId(1)]));
        assert!(selection.select([NodeId(3)]));
        assert_eq!(selection.iter().collect::<Vec<_>>(), vec![NodeId(3)]);
    }

    #[test]
    fn test_toggle_and_remove() {
        let mut selection = Selection::new();
        assert!(selection.toggle(NodeId(4)));
        assert!(selection.is_selected(NodeId(4)));
        assert!(!selection.toggle(NodeId(4)));
        assert!(selection.is_empty());

        selection.add(NodeId(1));
        selection.add(NodeId(2));
        assert!(selection.remove(NodeId(1)));
        assert!(!selection.remove(NodeId(1)));
        assert_eq!(selection.len(), 1);
        assert!(selection.clear());
        assert!(!selection.clear());
    }
}
