//! Path compression: replacing duplicated parentage by synthesized
//! intermediate ancestors.
//!
//! When a freshly inserted copying path reuses `(left, right, parent)`
//! triples that are already present in the path index under some other
//! child, both children are rewired below a new ancestor that carries the
//! shared segments once. The rewiring mutates indexed edges in place, so
//! affected edges are pulled out of the indexes for the duration and
//! restored by the indexed squash pass.

use tracing::debug;

use crate::sites::SiteIndex;
use crate::ts::edges::{Edge, EdgeRef};
use crate::ts::{Node, TreeSequenceBuilder, TreeSequenceError, NODE_IS_SYNTHESIZED_ANCESTOR};

/// Time gap between a synthesized ancestor and the youngest parent it
/// absorbs. A power of two, so stacked synthesized ancestors keep exact
/// times over many generations of double arithmetic.
pub const SYNTHESIZED_ANCESTOR_TIME_STEP: f64 = 1.0 / 65536.0;

/// A new-path edge together with the already-indexed edge carrying the same
/// `(left, right, parent)` triple.
#[derive(Clone, Copy, Debug)]
struct SegmentMatch {
    source: EdgeRef,
    dest: EdgeRef,
}

impl TreeSequenceBuilder {
    /// Deduplicate the (not yet indexed) path of `child` against the path
    /// index. Runs of at least two matches that are contiguous in the new
    /// path and share a single existing child are replaced by edges to a
    /// synthesized ancestor; an existing synthesized ancestor is reused
    /// directly. Ends with a squash of the new path.
    pub(super) fn compress_path(&mut self, child: Node) -> Result<(), TreeSequenceError> {
        if self.path_head(child).is_none() {
            return Ok(());
        }

        let mut matches: Vec<SegmentMatch> = Vec::new();
        let mut run_offsets: Vec<usize> = Vec::new();
        // right end and matched child of the previous match; a run breaks
        // when either stops lining up
        let mut last_match: Option<(SiteIndex, Node)> = None;

        let mut cursor = self.path_head(child);
        while let Some(id) = cursor {
            let record = self.arena[id];
            if let Some(dest) = self.indexes.find_path_match(&record.edge) {
                let dest_child = self.arena[dest].edge.child;
                if last_match != Some((record.edge.left, dest_child)) {
                    run_offsets.push(matches.len());
                }
                matches.push(SegmentMatch { source: id, dest });
                last_match = Some((record.edge.right, dest_child));
            }
            cursor = record.next;
        }
        run_offsets.push(matches.len());

        for window in run_offsets.windows(2) {
            let run = &matches[window[0]..window[1]];
            if run.len() < 2 {
                continue;
            }
            let matched_child = self.arena[run[0].dest].edge.child;
            if self.node_flags_of(matched_child) & NODE_IS_SYNTHESIZED_ANCESTOR != 0 {
                // the shared segments already live under a synthesized
                // ancestor; point the new path at it and leave the existing
                // edges alone
                for matched in run {
                    self.arena[matched.source].edge.parent = matched_child;
                }
            } else {
                self.synthesize_ancestor(run)?;
            }
        }

        self.squash_path(child);
        Ok(())
    }

    /// Create a synthesized ancestor for one run of matched segments and
    /// rewire both the new path and the matched existing child below it.
    fn synthesize_ancestor(&mut self, run: &[SegmentMatch]) -> Result<(), TreeSequenceError> {
        let matched_child = self.arena[run[0].dest].edge.child;
        let matched_child_time = self.node_time_of(matched_child);

        let mut min_parent_time = f64::INFINITY;
        for matched in run {
            debug_assert_eq!(self.arena[matched.dest].edge.child, matched_child);
            let parent = self.arena[matched.source].edge.parent;
            min_parent_time = min_parent_time.min(self.node_time_of(parent));
        }
        let time = min_parent_time - SYNTHESIZED_ANCESTOR_TIME_STEP;
        if time <= matched_child_time {
            return Err(TreeSequenceError::SynthesizedTimeCollision {
                time,
                child: matched_child,
            });
        }

        let ancestor = self.add_node(time, NODE_IS_SYNTHESIZED_ANCESTOR);
        debug!(
            %ancestor,
            %matched_child,
            segments = run.len(),
            "synthesizing shared ancestor"
        );

        let mut head: Option<EdgeRef> = None;
        let mut prev: Option<EdgeRef> = None;
        for matched in run {
            let source_edge = self.arena[matched.source].edge;
            let copy = self.alloc_edge(Edge {
                left: source_edge.left,
                right: source_edge.right,
                parent: source_edge.parent,
                child: ancestor,
            });
            match prev {
                None => head = Some(copy),
                Some(prev_id) => self.arena[prev_id].next = Some(copy),
            }
            prev = Some(copy);

            // the new path is not indexed yet, so its edges can be rewired
            // freely
            self.arena[matched.source].edge.parent = ancestor;

            // the matched edge is indexed and about to change; detach it
            // until the indexed squash puts it back
            let dest_record = self.arena[matched.dest];
            self.indexes.remove(matched.dest, &dest_record);
            let dest = &mut self.arena[matched.dest];
            dest.edge.parent = ancestor;
            dest.detached = true;
        }
        self.set_path_head(ancestor, head);
        self.squash_path(ancestor);
        self.squash_indexed_path(matched_child);
        self.index_path(ancestor);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sites::SiteIndex;
    use crate::ts::{PathOptions, PathSegment};

    fn segment(left: u32, right: u32, parent: Node) -> PathSegment {
        PathSegment::new(SiteIndex(left), SiteIndex(right), parent)
    }

    /// Two children copying the same two-parent path end up below one
    /// synthesized ancestor carrying the shared segments.
    #[test]
    fn shared_path_is_deduplicated() {
        let mut builder = TreeSequenceBuilder::new(3);
        let root_a = builder.add_node(3.0, 0);
        let root_b = builder.add_node(3.0, 0);
        let first = builder.add_node(1.0, 0);
        let second = builder.add_node(1.0, 0);

        let path = [segment(2, 3, root_b), segment(0, 2, root_a)];
        builder
            .add_path(first, &path, PathOptions::default())
            .unwrap();
        builder
            .add_path(second, &path, PathOptions::compressed())
            .unwrap();

        assert_eq!(builder.num_nodes(), 5);
        let ancestor = Node::from_usize(4);
        assert_ne!(
            builder.node_flags(ancestor) & NODE_IS_SYNTHESIZED_ANCESTOR,
            0
        );
        assert_eq!(
            builder.node_time(ancestor),
            3.0 - SYNTHESIZED_ANCESTOR_TIME_STEP
        );

        // the ancestor carries the original segments
        let ancestor_path = builder.path_edges(ancestor);
        assert_eq!(ancestor_path.len(), 2);
        assert_eq!(ancestor_path[0].parent, root_a);
        assert_eq!(ancestor_path[1].parent, root_b);

        // both children collapse to a single edge below the ancestor
        for child in [first, second] {
            let edges = builder.path_edges(child);
            assert_eq!(edges.len(), 1);
            assert_eq!(edges[0].left, SiteIndex(0));
            assert_eq!(edges[0].right, SiteIndex(3));
            assert_eq!(edges[0].parent, ancestor);
        }
        builder.check_state();
    }

    /// A third child matching the same segments reuses the synthesized
    /// ancestor instead of creating another one.
    #[test]
    fn existing_synthesized_ancestor_is_reused() {
        let mut builder = TreeSequenceBuilder::new(3);
        let root_a = builder.add_node(3.0, 0);
        let root_b = builder.add_node(3.0, 0);
        let first = builder.add_node(1.0, 0);
        let second = builder.add_node(1.0, 0);

        let path = [segment(2, 3, root_b), segment(0, 2, root_a)];
        builder
            .add_path(first, &path, PathOptions::default())
            .unwrap();
        builder
            .add_path(second, &path, PathOptions::compressed())
            .unwrap();
        let num_nodes = builder.num_nodes();
        let ancestor = Node::from_usize(4);

        let third = builder.add_node(1.0, 0);
        builder
            .add_path(third, &path, PathOptions::compressed())
            .unwrap();

        assert_eq!(builder.num_nodes(), num_nodes + 1);
        let edges = builder.path_edges(third);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].left, SiteIndex(0));
        assert_eq!(edges[0].right, SiteIndex(3));
        assert_eq!(edges[0].parent, ancestor);
        builder.check_state();
    }

    /// Matches separated by a non-matching segment form separate runs; a
    /// run of length one is left untouched.
    #[test]
    fn isolated_matches_are_not_compressed() {
        let mut builder = TreeSequenceBuilder::new(6);
        let root_a = builder.add_node(3.0, 0);
        let root_b = builder.add_node(3.0, 0);
        let root_c = builder.add_node(3.0, 0);
        let first = builder.add_node(1.0, 0);
        let second = builder.add_node(1.0, 0);

        builder
            .add_path(
                first,
                &[segment(4, 6, root_c), segment(2, 4, root_b), segment(0, 2, root_a)],
                PathOptions::default(),
            )
            .unwrap();

        // only the middle segment differs
        builder
            .add_path(
                second,
                &[segment(4, 6, root_c), segment(2, 4, root_a), segment(0, 2, root_a)],
                PathOptions::compressed(),
            )
            .unwrap();

        // no synthesized ancestor: the two matches are not contiguous runs
        assert_eq!(builder.num_nodes(), 5);
        assert_eq!(builder.path_edges(second).len(), 2);
        builder.check_state();
    }

    /// The matched existing child's edges are squashed after rewiring, so a
    /// fragmented path collapses below the synthesized ancestor.
    #[test]
    fn matched_child_path_is_squashed_after_rewiring() {
        let mut builder = TreeSequenceBuilder::new(4);
        let root_a = builder.add_node(4.0, 0);
        let root_b = builder.add_node(4.0, 0);
        let root_c = builder.add_node(4.0, 0);
        let first = builder.add_node(1.0, 0);
        let second = builder.add_node(1.0, 0);

        let path = [
            segment(3, 4, root_c),
            segment(2, 3, root_b),
            segment(0, 2, root_a),
        ];
        builder
            .add_path(first, &path, PathOptions::default())
            .unwrap();
        assert_eq!(builder.path_edges(first).len(), 3);

        builder
            .add_path(second, &path, PathOptions::compressed())
            .unwrap();

        // all three segments moved below one synthesized ancestor and both
        // children collapsed to single edges
        let ancestor = Node::from_usize(5);
        assert_eq!(builder.path_edges(ancestor).len(), 3);
        assert_eq!(builder.path_edges(first).len(), 1);
        assert_eq!(builder.path_edges(second).len(), 1);
        assert_eq!(builder.num_edges(), 5);
        builder.check_state();
    }

    /// Synthesis fails loudly when the time slot below the youngest parent
    /// is already taken by the matched child.
    #[test]
    fn time_collision_is_reported() {
        let mut builder = TreeSequenceBuilder::new(2);
        let root_a = builder.add_node(1.0, 0);
        let root_b = builder.add_node(1.0, 0);
        let tight = 1.0 - SYNTHESIZED_ANCESTOR_TIME_STEP;
        let first = builder.add_node(tight, 0);
        let second = builder.add_node(tight - SYNTHESIZED_ANCESTOR_TIME_STEP, 0);

        let path = [segment(1, 2, root_b), segment(0, 1, root_a)];
        builder
            .add_path(first, &path, PathOptions::default())
            .unwrap();

        let result = builder.add_path(second, &path, PathOptions::compressed());
        assert_eq!(
            result,
            Err(TreeSequenceError::SynthesizedTimeCollision {
                time: tight,
                child: first,
            })
        );
    }
}
