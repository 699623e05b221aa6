use std::io::{self, Write};

use tracing::debug;

use crate::sites::{SiteIndex, ANCESTRAL_STATE, DERIVED_STATE};
use crate::tables::{MutationRow, NodeRow, TableCollection};
use crate::ts::edge_index::EdgeIndexes;
use crate::ts::edges::{Edge, EdgeArena, EdgeRef};
use crate::ts::{Node, PathOptions, PathSegment, TreeSequenceError};

/// Chunk sizes for the growable pools of the builder. Both pools grow by
/// whole chunks so that bulk insertion does not reallocate per element.
#[derive(Clone, Copy, Debug)]
pub struct BuilderConfig {
    pub nodes_chunk_size: usize,
    pub edges_chunk_size: usize,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            nodes_chunk_size: 1024,
            edges_chunk_size: 1024,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct NodeRecord {
    time: f64,
    flags: u32,
}

#[derive(Clone, Copy, Debug)]
struct Mutation {
    node: Node,
    derived_state: u8,
}

/// Incremental builder for a genealogy over a fixed number of sites.
///
/// Haplotype copying paths are inserted one child at a time with
/// [`add_path`]; the builder keeps every edge in three ordered indexes (by
/// left coordinate, by right coordinate, and by full path key) and optionally
/// deduplicates shared path segments into synthesized ancestors. Once all
/// paths of a generation are inserted, [`freeze_indexes`] materializes the
/// flat edge arrays that matching algorithms traverse, and [`dump`] emits the
/// final table collection.
///
/// [`add_path`]: TreeSequenceBuilder::add_path
/// [`freeze_indexes`]: TreeSequenceBuilder::freeze_indexes
/// [`dump`]: TreeSequenceBuilder::dump
pub struct TreeSequenceBuilder {
    config: BuilderConfig,
    num_sites: usize,
    nodes: Vec<NodeRecord>,
    /// Head of the left-to-right edge chain of each child node.
    path: Vec<Option<EdgeRef>>,
    pub(super) arena: EdgeArena,
    pub(super) indexes: EdgeIndexes,
    /// Mutations per site, in insertion order. The first mutation of a site
    /// is always a departure from the ancestral state.
    mutations: Vec<Vec<Mutation>>,
    num_mutations: usize,
    frozen_left: Vec<Edge>,
    frozen_right: Vec<Edge>,
}

impl TreeSequenceBuilder {
    /// Create a builder for a genome with `num_sites` inference sites.
    pub fn new(num_sites: usize) -> Self {
        Self::with_config(num_sites, BuilderConfig::default())
    }

    pub fn with_config(num_sites: usize, config: BuilderConfig) -> Self {
        Self {
            config,
            num_sites,
            nodes: Vec::with_capacity(config.nodes_chunk_size),
            path: Vec::with_capacity(config.nodes_chunk_size),
            arena: EdgeArena::new(config.edges_chunk_size),
            indexes: EdgeIndexes::new(),
            mutations: vec![Vec::new(); num_sites],
            num_mutations: 0,
            frozen_left: Vec::new(),
            frozen_right: Vec::new(),
        }
    }

    /// Create a builder for the inference sites of a site table. Sites that
    /// carry their own allele definition are resolved outside the builder
    /// and do not count towards its coordinate space.
    pub fn from_site_alleles<T>(alleles: &[Option<T>], config: BuilderConfig) -> Self {
        let num_sites = alleles.iter().filter(|allele| allele.is_none()).count();
        Self::with_config(num_sites, config)
    }

    /// Append a node with the given time and flags and return its id.
    /// Existing edges are unaffected.
    pub fn add_node(&mut self, time: f64, flags: u32) -> Node {
        debug_assert!(!time.is_nan());
        if self.nodes.len() == self.nodes.capacity() {
            self.nodes.reserve(self.config.nodes_chunk_size);
            self.path.reserve(self.config.nodes_chunk_size);
        }
        self.nodes.push(NodeRecord { time, flags });
        self.path.push(None);
        Node(self.nodes.len() as u32 - 1)
    }

    /// Insert the copying path of `child`. The segments must be given
    /// rightmost first (the order a matcher produces them in during
    /// traceback) and must tile a contiguous interval.
    ///
    /// With [`PathOptions::compress`] set, runs of segments that duplicate
    /// already-indexed parentage are replaced by edges to a synthesized
    /// intermediate ancestor before the path is indexed.
    ///
    /// An error detected after the builder has started mutating its state is
    /// not rolled back; the builder must be discarded in that case.
    pub fn add_path(
        &mut self,
        child: Node,
        segments: &[PathSegment],
        options: PathOptions,
    ) -> Result<(), TreeSequenceError> {
        if child.index() >= self.nodes.len() {
            return Err(TreeSequenceError::UnknownChild(child));
        }
        let child_time = self.nodes[child.index()].time;
        debug_assert!(
            self.path[child.index()].is_none(),
            "child {child} already has a path"
        );

        // segments arrive rightmost first, so reverse iteration builds the
        // chain left to right
        let mut head: Option<EdgeRef> = None;
        let mut prev: Option<EdgeRef> = None;
        for segment in segments.iter().rev() {
            if segment.parent.index() >= self.nodes.len() {
                return Err(TreeSequenceError::UnknownParent(segment.parent));
            }
            if self.nodes[segment.parent.index()].time <= child_time {
                return Err(TreeSequenceError::ParentNotOlderThanChild {
                    parent: segment.parent,
                    child,
                });
            }
            let edge = self.alloc_edge(Edge {
                left: segment.left,
                right: segment.right,
                parent: segment.parent,
                child,
            });
            match prev {
                None => head = Some(edge),
                Some(prev_id) => {
                    self.arena[prev_id].next = Some(edge);
                    let expected = self.arena[prev_id].edge.right;
                    if expected != segment.left {
                        return Err(TreeSequenceError::DiscontiguousPath {
                            expected,
                            found: segment.left,
                        });
                    }
                }
            }
            prev = Some(edge);
        }
        self.path[child.index()] = head;

        if options.compress {
            self.compress_path(child)?;
        }
        self.index_path(child);
        if options.extended_checks {
            self.check_state();
        }
        Ok(())
    }

    /// Record mutations carried by `node`, given as (site, derived state)
    /// pairs.
    pub fn add_mutations(&mut self, node: Node, mutations: &[(SiteIndex, u8)]) {
        for &(site, derived_state) in mutations {
            self.add_mutation(site, node, derived_state);
        }
    }

    fn add_mutation(&mut self, site: SiteIndex, node: Node, derived_state: u8) {
        assert!(node.index() < self.nodes.len());
        assert!((site.0 as usize) < self.num_sites);
        assert!(derived_state == ANCESTRAL_STATE || derived_state == DERIVED_STATE);
        let list = &mut self.mutations[site.0 as usize];
        debug_assert!(
            !list.is_empty() || derived_state == DERIVED_STATE,
            "the first mutation of a site must introduce the derived state"
        );
        list.push(Mutation {
            node,
            derived_state,
        });
        self.num_mutations += 1;
    }

    /// Allocate an edge record, caching the child's time for the indexes.
    pub(super) fn alloc_edge(&mut self, edge: Edge) -> EdgeRef {
        debug_assert!(edge.parent.index() < self.nodes.len());
        debug_assert!(edge.child.index() < self.nodes.len());
        debug_assert!(
            self.nodes[edge.parent.index()].time > self.nodes[edge.child.index()].time
        );
        let time = self.nodes[edge.child.index()].time;
        self.arena.alloc(edge, time)
    }

    pub(super) fn path_head(&self, node: Node) -> Option<EdgeRef> {
        self.path[node.index()]
    }

    pub(super) fn set_path_head(&mut self, node: Node, head: Option<EdgeRef>) {
        self.path[node.index()] = head;
    }

    pub(super) fn node_time_of(&self, node: Node) -> f64 {
        self.nodes[node.index()].time
    }

    pub(super) fn node_flags_of(&self, node: Node) -> u32 {
        self.nodes[node.index()].flags
    }

    /// Insert every edge of the node's path into the three indexes.
    pub(super) fn index_path(&mut self, node: Node) {
        let mut cursor = self.path[node.index()];
        while let Some(id) = cursor {
            let record = self.arena[id];
            debug_assert!(!record.detached);
            self.indexes.insert(id, &record);
            cursor = record.next;
        }
    }

    /// Merge contiguous same-parent edges on a path that is not in the
    /// indexes yet. Single pass; absorbed edges return to the pool.
    pub(super) fn squash_path(&mut self, node: Node) {
        let Some(head) = self.path[node.index()] else {
            return;
        };
        let mut prev = head;
        let mut cursor = self.arena[prev].next;
        while let Some(current) = cursor {
            let next = self.arena[current].next;
            let prev_edge = self.arena[prev].edge;
            let current_edge = self.arena[current].edge;
            if prev_edge.right == current_edge.left && prev_edge.parent == current_edge.parent {
                self.arena[prev].edge.right = current_edge.right;
                self.arena[prev].next = next;
                self.arena.release(current);
            } else {
                prev = current;
            }
            cursor = next;
        }
    }

    /// Merge contiguous same-parent edges on an indexed path. Every edge the
    /// merge modifies is pulled out of the indexes first; a second pass
    /// re-inserts whatever was detached, including edges already detached by
    /// the caller.
    pub(super) fn squash_indexed_path(&mut self, node: Node) {
        let Some(head) = self.path[node.index()] else {
            return;
        };
        let mut prev = head;
        let mut cursor = self.arena[prev].next;
        while let Some(current) = cursor {
            let next = self.arena[current].next;
            let prev_record = self.arena[prev];
            let current_record = self.arena[current];
            if prev_record.edge.right == current_record.edge.left
                && prev_record.edge.parent == current_record.edge.parent
            {
                if !prev_record.detached {
                    self.indexes.remove(prev, &prev_record);
                    self.arena[prev].detached = true;
                }
                if !current_record.detached {
                    self.indexes.remove(current, &current_record);
                }
                self.arena[prev].edge.right = current_record.edge.right;
                self.arena[prev].next = next;
                self.arena.release(current);
            } else {
                prev = current;
            }
            cursor = next;
        }

        let mut cursor = self.path[node.index()];
        while let Some(id) = cursor {
            let record = self.arena[id];
            if record.detached {
                self.arena[id].detached = false;
                let restored = self.arena[id];
                self.indexes.insert(id, &restored);
            }
            cursor = record.next;
        }
    }

    /// Snapshot the ordered indexes into flat edge arrays for sequential
    /// traversal. The snapshot is a plain copy: paths or mutations added
    /// afterwards have no effect on it until it is rebuilt.
    pub fn freeze_indexes(&mut self) {
        self.frozen_left = self.indexes.left_edges().collect();
        self.frozen_right = self.indexes.right_edges().collect();
        debug!(
            num_edges = self.frozen_left.len(),
            "froze edge index snapshot"
        );
    }

    /// The left-index edge array of the last [`freeze_indexes`] call.
    ///
    /// [`freeze_indexes`]: TreeSequenceBuilder::freeze_indexes
    pub fn left_index_edges(&self) -> &[Edge] {
        &self.frozen_left
    }

    /// The right-index edge array of the last [`freeze_indexes`] call.
    ///
    /// [`freeze_indexes`]: TreeSequenceBuilder::freeze_indexes
    pub fn right_index_edges(&self) -> &[Edge] {
        &self.frozen_right
    }

    pub fn num_frozen_edges(&self) -> usize {
        self.frozen_left.len()
    }

    /// Reload nodes from table rows.
    pub fn restore_nodes(&mut self, rows: &[NodeRow]) {
        for row in rows {
            self.add_node(row.time, row.flags);
        }
    }

    /// Reload edges from table rows. Rows must be sorted by child id and,
    /// within a child, by left coordinate. Ends by freezing the indexes.
    pub fn restore_edges(&mut self, rows: &[Edge]) -> Result<(), TreeSequenceError> {
        let mut prev: Option<EdgeRef> = None;
        for (position, row) in rows.iter().enumerate() {
            if position > 0 && rows[position - 1].child > row.child {
                return Err(TreeSequenceError::UnsortedEdges);
            }
            if row.child.index() >= self.nodes.len() {
                return Err(TreeSequenceError::UnknownChild(row.child));
            }
            if row.parent.index() >= self.nodes.len() {
                return Err(TreeSequenceError::UnknownParent(row.parent));
            }
            if self.nodes[row.parent.index()].time <= self.nodes[row.child.index()].time {
                return Err(TreeSequenceError::ParentNotOlderThanChild {
                    parent: row.parent,
                    child: row.child,
                });
            }
            let edge = self.alloc_edge(*row);
            match self.path[row.child.index()] {
                None => self.path[row.child.index()] = Some(edge),
                Some(_) => {
                    let prev_id = prev.expect("a non-empty path implies a previous edge");
                    if self.arena[prev_id].edge.right > row.left {
                        return Err(TreeSequenceError::UnsortedEdges);
                    }
                    self.arena[prev_id].next = Some(edge);
                }
            }
            let record = self.arena[edge];
            self.indexes.insert(edge, &record);
            prev = Some(edge);
        }
        debug!(num_edges = rows.len(), "restored edge table");
        self.freeze_indexes();
        Ok(())
    }

    /// Reload mutations from table rows. Parent links are recomputed from
    /// per-site order, so they are ignored on input.
    pub fn restore_mutations(&mut self, rows: &[MutationRow]) {
        for row in rows {
            self.add_mutation(row.site, row.node, row.derived_state);
        }
    }

    /// Emit the genealogy as a fresh table collection.
    pub fn dump(&self) -> TableCollection {
        let mut tables = TableCollection::new();
        self.dump_into(&mut tables);
        tables
    }

    /// Emit the genealogy into an existing table collection, clearing it
    /// first. Nodes are emitted by id, edges by child and path order, sites
    /// in coordinate order, and mutations per site with the parent link set
    /// to the preceding mutation of the same site.
    pub fn dump_into(&self, tables: &mut TableCollection) {
        tables.clear();
        tables.sequence_length = self.num_sites as f64;

        for (index, record) in self.nodes.iter().enumerate() {
            tables.add_node(record.flags, record.time);
            let mut cursor = self.path[index];
            while let Some(id) = cursor {
                let edge = self.arena[id];
                tables.add_edge(edge.edge);
                cursor = edge.next;
            }
        }

        for site in 0..self.num_sites {
            tables.add_site(SiteIndex::from_usize(site), ANCESTRAL_STATE);
            let mut parent = None;
            for mutation in &self.mutations[site] {
                parent = Some(tables.add_mutation(
                    SiteIndex::from_usize(site),
                    mutation.node,
                    parent,
                    mutation.derived_state,
                ));
            }
        }
    }

    pub fn num_sites(&self) -> usize {
        self.num_sites
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of live edges, counted through the dynamic indexes.
    pub fn num_edges(&self) -> usize {
        self.indexes.len()
    }

    pub fn num_mutations(&self) -> usize {
        self.num_mutations
    }

    pub fn node_time(&self, node: Node) -> f64 {
        self.nodes[node.index()].time
    }

    pub fn node_flags(&self, node: Node) -> u32 {
        self.nodes[node.index()].flags
    }

    /// The edges of the node's path, left to right.
    pub fn path_edges(&self, node: Node) -> Vec<Edge> {
        self.arena
            .chain(self.path[node.index()])
            .map(|id| self.arena[id].edge)
            .collect()
    }

    /// Write a diagnostic rendering of the full builder state and validate
    /// the structural invariants.
    pub fn print_state(&self, out: &mut dyn Write) -> io::Result<()> {
        out.write_fmt(format_args!("Tree sequence builder state\n"))?;
        out.write_fmt(format_args!("num_sites = {}\n", self.num_sites))?;
        out.write_fmt(format_args!("num_nodes = {}\n", self.nodes.len()))?;
        out.write_fmt(format_args!("num_edges = {}\n", self.num_edges()))?;
        out.write_fmt(format_args!(
            "num_frozen_edges = {}\n",
            self.frozen_left.len()
        ))?;
        out.write_fmt(format_args!("num_mutations = {}\n", self.num_mutations))?;
        out.write_fmt(format_args!(
            "nodes_chunk_size = {}\n",
            self.config.nodes_chunk_size
        ))?;
        out.write_fmt(format_args!(
            "edges_chunk_size = {}\n",
            self.config.edges_chunk_size
        ))?;
        out.write_fmt(format_args!(
            "edge_pool_capacity = {}\n",
            self.arena.capacity()
        ))?;

        out.write_fmt(format_args!("nodes =\n"))?;
        out.write_fmt(format_args!("id\tflags\ttime\tpath\n"))?;
        for (index, record) in self.nodes.iter().enumerate() {
            out.write_fmt(format_args!(
                "{id}\t{flags}\t{time} ",
                id = index,
                flags = record.flags,
                time = record.time,
            ))?;
            let mut cursor = self.path[index];
            while let Some(id) = cursor {
                let edge = self.arena[id].edge;
                out.write_fmt(format_args!(
                    "({left}, {right}, {parent}, {child})",
                    left = edge.left,
                    right = edge.right,
                    parent = edge.parent,
                    child = edge.child,
                ))?;
                cursor = self.arena[id].next;
                if cursor.is_some() {
                    out.write_fmt(format_args!("->"))?;
                }
            }
            out.write_fmt(format_args!("\n"))?;
        }

        out.write_fmt(format_args!("mutations =\n"))?;
        out.write_fmt(format_args!("site\t(node, derived_state),...\n"))?;
        for (site, mutations) in self.mutations.iter().enumerate() {
            if mutations.is_empty() {
                continue;
            }
            out.write_fmt(format_args!("{}\t", site))?;
            for mutation in mutations {
                out.write_fmt(format_args!(
                    "({}, {}) ",
                    mutation.node, mutation.derived_state
                ))?;
            }
            out.write_fmt(format_args!("\n"))?;
        }

        out.write_fmt(format_args!("path index =\n"))?;
        for (edge, _) in self.indexes.path_edges() {
            out.write_fmt(format_args!(
                "{}\t{}\t{}\t{}\n",
                edge.left, edge.right, edge.parent, edge.child
            ))?;
        }

        self.check_state();
        Ok(())
    }

    /// Assert the structural invariants: every path is left-contiguous and
    /// owned by its child, every live edge sits in all three indexes, no
    /// edge is detached, and the edge pool agrees with the index counts.
    pub(crate) fn check_state(&self) {
        let mut total_edges = 0;
        for (index, head) in self.path.iter().enumerate() {
            let node = Node(index as u32);
            let mut cursor = *head;
            while let Some(id) = cursor {
                let record = self.arena[id];
                total_edges += 1;
                assert_eq!(record.edge.child, node);
                assert!(!record.detached);
                assert!(self.indexes.contains(id, &record));
                if let Some(next) = record.next {
                    assert_eq!(self.arena[next].edge.left, record.edge.right);
                }
                cursor = record.next;
            }
        }
        self.indexes.assert_balanced();
        assert_eq!(self.indexes.len(), total_edges);
        assert_eq!(self.arena.num_allocated(), total_edges);
    }
}
