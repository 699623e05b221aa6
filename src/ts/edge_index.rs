use std::cmp::Ordering;

use indexset::BTreeSet;

use crate::sites::SiteIndex;
use crate::ts::edges::{Edge, EdgeRecord, EdgeRef};
use crate::ts::Node;

/// Key of the left-to-right sweep index: edges ordered by left coordinate,
/// then child time (youngest child first), then child id. Edges enter a
/// marginal tree in this order when sweeping from the left.
#[derive(Clone, Copy, Debug)]
struct LeftKey {
    edge: Edge,
    time: f64,
}

impl PartialEq for LeftKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for LeftKey {}

impl PartialOrd<Self> for LeftKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LeftKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.edge
            .left
            .cmp(&other.edge.left)
            .then(self.time.total_cmp(&other.time))
            .then(self.edge.child.cmp(&other.edge.child))
    }
}

/// Key of the right-to-left sweep index: edges ordered by right coordinate,
/// then child time (oldest child first), then child id. Edges leave a
/// marginal tree in this order.
#[derive(Clone, Copy, Debug)]
struct RightKey {
    edge: Edge,
    time: f64,
}

impl PartialEq for RightKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RightKey {}

impl PartialOrd<Self> for RightKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RightKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.edge
            .right
            .cmp(&other.edge.right)
            .then(other.time.total_cmp(&self.time))
            .then(self.edge.child.cmp(&other.edge.child))
    }
}

/// Key of the full-path index: edges ordered by their complete
/// `(left, right, parent, child)` tuple. This is the index path compression
/// queries for interval-and-parent matches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct PathKey {
    left: SiteIndex,
    right: SiteIndex,
    parent: Node,
    child: Node,
    edge: EdgeRef,
}

impl PathKey {
    fn new(edge: &Edge, id: EdgeRef) -> Self {
        Self {
            left: edge.left,
            right: edge.right,
            parent: edge.parent,
            child: edge.child,
            edge: id,
        }
    }
}

/// The three ordered collections every live edge participates in. All three
/// always hold exactly the same edge set; an edge is only ever absent while
/// its record is marked detached.
pub(crate) struct EdgeIndexes {
    left: BTreeSet<LeftKey>,
    right: BTreeSet<RightKey>,
    path: BTreeSet<PathKey>,
}

impl EdgeIndexes {
    pub(crate) fn new() -> Self {
        Self {
            left: BTreeSet::new(),
            right: BTreeSet::new(),
            path: BTreeSet::new(),
        }
    }

    /// Number of edges in the indexes.
    pub(crate) fn len(&self) -> usize {
        self.left.len()
    }

    /// Insert an edge into all three indexes.
    pub(crate) fn insert(&mut self, id: EdgeRef, record: &EdgeRecord) {
        let inserted = self.left.insert(LeftKey {
            edge: record.edge,
            time: record.time,
        });
        debug_assert!(inserted);
        let inserted = self.right.insert(RightKey {
            edge: record.edge,
            time: record.time,
        });
        debug_assert!(inserted);
        let inserted = self.path.insert(PathKey::new(&record.edge, id));
        debug_assert!(inserted);
    }

    /// Remove an edge from all three indexes. The record must be unchanged
    /// since it was inserted.
    pub(crate) fn remove(&mut self, id: EdgeRef, record: &EdgeRecord) {
        let removed = self.left.remove(&LeftKey {
            edge: record.edge,
            time: record.time,
        });
        debug_assert!(removed);
        let removed = self.right.remove(&RightKey {
            edge: record.edge,
            time: record.time,
        });
        debug_assert!(removed);
        let removed = self.path.remove(&PathKey::new(&record.edge, id));
        debug_assert!(removed);
    }

    /// Whether an edge is present in all three indexes.
    pub(crate) fn contains(&self, id: EdgeRef, record: &EdgeRecord) -> bool {
        self.left.contains(&LeftKey {
            edge: record.edge,
            time: record.time,
        }) && self.right.contains(&RightKey {
            edge: record.edge,
            time: record.time,
        }) && self.path.contains(&PathKey::new(&record.edge, id))
    }

    /// Look up an indexed edge with the same `(left, right, parent)` triple
    /// as `edge`, belonging to any child. Returns the match with the smallest
    /// child id if several exist.
    ///
    /// The query positions a cursor at the smallest key at or after
    /// `(left, right, parent, child 0)`; the neighbor there is the only
    /// candidate, since any matching edge sorts at or after that point.
    pub(crate) fn find_path_match(&self, edge: &Edge) -> Option<EdgeRef> {
        let lower = PathKey {
            left: edge.left,
            right: edge.right,
            parent: edge.parent,
            child: Node(0),
            edge: EdgeRef(0),
        };
        self.path
            .range(lower..)
            .next()
            .filter(|found| {
                found.left == edge.left && found.right == edge.right && found.parent == edge.parent
            })
            .map(|found| found.edge)
    }

    /// The edges in left-index order.
    pub(crate) fn left_edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.left.iter().map(|key| key.edge)
    }

    /// The edges in right-index order.
    pub(crate) fn right_edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.right.iter().map(|key| key.edge)
    }

    /// The edges in path-index order.
    pub(crate) fn path_edges(&self) -> impl Iterator<Item = (Edge, EdgeRef)> + '_ {
        self.path.iter().map(|key| {
            (
                Edge {
                    left: key.left,
                    right: key.right,
                    parent: key.parent,
                    child: key.child,
                },
                key.edge,
            )
        })
    }

    /// Check that all three indexes agree on the edge count.
    pub(crate) fn assert_balanced(&self) {
        assert_eq!(self.left.len(), self.right.len());
        assert_eq!(self.left.len(), self.path.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sites::SiteIndex;

    fn record(left: u32, right: u32, parent: u32, child: u32, time: f64) -> EdgeRecord {
        EdgeRecord {
            edge: Edge {
                left: SiteIndex(left),
                right: SiteIndex(right),
                parent: Node(parent),
                child: Node(child),
            },
            time,
            next: None,
            detached: false,
        }
    }

    #[test]
    fn left_index_breaks_ties_by_time_then_child() {
        let mut indexes = EdgeIndexes::new();
        indexes.insert(EdgeRef(0), &record(0, 3, 0, 2, 2.0));
        indexes.insert(EdgeRef(1), &record(0, 3, 0, 3, 1.0));
        indexes.insert(EdgeRef(2), &record(0, 3, 0, 4, 2.0));

        let children: Vec<_> = indexes.left_edges().map(|e| e.child.0).collect();
        assert_eq!(children, vec![3, 2, 4]);
    }

    #[test]
    fn right_index_orders_older_children_first() {
        let mut indexes = EdgeIndexes::new();
        indexes.insert(EdgeRef(0), &record(0, 3, 0, 2, 2.0));
        indexes.insert(EdgeRef(1), &record(0, 3, 0, 3, 1.0));
        indexes.insert(EdgeRef(2), &record(0, 2, 0, 4, 5.0));

        let children: Vec<_> = indexes.right_edges().map(|e| e.child.0).collect();
        assert_eq!(children, vec![4, 2, 3]);
    }

    #[test]
    fn path_match_finds_exact_triple() {
        let mut indexes = EdgeIndexes::new();
        let target = record(2, 5, 1, 3, 1.0);
        indexes.insert(EdgeRef(0), &record(0, 2, 0, 3, 1.0));
        indexes.insert(EdgeRef(1), &target);
        indexes.insert(EdgeRef(2), &record(2, 5, 2, 4, 1.0));

        let query = Edge {
            left: SiteIndex(2),
            right: SiteIndex(5),
            parent: Node(1),
            child: Node(7),
        };
        assert_eq!(indexes.find_path_match(&query), Some(EdgeRef(1)));

        let miss = Edge {
            left: SiteIndex(2),
            right: SiteIndex(4),
            parent: Node(1),
            child: Node(7),
        };
        assert_eq!(indexes.find_path_match(&miss), None);
    }

    #[test]
    fn path_match_prefers_smallest_child() {
        let mut indexes = EdgeIndexes::new();
        indexes.insert(EdgeRef(0), &record(0, 4, 1, 5, 1.0));
        indexes.insert(EdgeRef(1), &record(0, 4, 1, 2, 1.0));

        let query = Edge {
            left: SiteIndex(0),
            right: SiteIndex(4),
            parent: Node(1),
            child: Node(9),
        };
        assert_eq!(indexes.find_path_match(&query), Some(EdgeRef(1)));
    }

    #[test]
    fn remove_keeps_indexes_in_lockstep() {
        let mut indexes = EdgeIndexes::new();
        let a = record(0, 2, 0, 1, 1.0);
        let b = record(2, 4, 0, 1, 1.0);
        indexes.insert(EdgeRef(0), &a);
        indexes.insert(EdgeRef(1), &b);
        assert_eq!(indexes.len(), 2);

        indexes.remove(EdgeRef(0), &a);
        indexes.assert_balanced();
        assert_eq!(indexes.len(), 1);
        assert!(!indexes.contains(EdgeRef(0), &a));
        assert!(indexes.contains(EdgeRef(1), &b));
    }
}
