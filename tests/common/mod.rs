use libarg::sites::SiteIndex;
use libarg::ts::{Node, PathOptions, PathSegment, TreeSequenceBuilder};

/// Build a path segment from raw coordinates.
pub fn segment(left: usize, right: usize, parent: Node) -> PathSegment {
    PathSegment::new(
        SiteIndex::from_usize(left),
        SiteIndex::from_usize(right),
        parent,
    )
}

/// A builder with `num_sites` sites and one node per entry of `times`,
/// inserted in order.
pub fn builder_with_nodes(num_sites: usize, times: &[f64]) -> (TreeSequenceBuilder, Vec<Node>) {
    let mut builder = TreeSequenceBuilder::new(num_sites);
    let nodes = times.iter().map(|&time| builder.add_node(time, 0)).collect();
    (builder, nodes)
}

/// Compression enabled, with the full state validation after every path.
pub fn checked_compression() -> PathOptions {
    PathOptions {
        compress: true,
        extended_checks: true,
    }
}

/// Compression disabled, with the full state validation after every path.
pub fn checked_plain() -> PathOptions {
    PathOptions {
        compress: false,
        extended_checks: true,
    }
}
