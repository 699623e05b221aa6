use std::fmt::{Display, Formatter};

use thiserror::Error;

use crate::sites::SiteIndex;

mod builder;
mod compress;
mod edge_index;
mod edges;

pub use builder::{BuilderConfig, TreeSequenceBuilder};
pub use compress::SYNTHESIZED_ANCESTOR_TIME_STEP;
pub use edges::Edge;

/// Node flag marking an ancestor that was synthesized during path compression
/// rather than inferred from genotype data.
pub const NODE_IS_SYNTHESIZED_ANCESTOR: u32 = 1 << 16;

/// A node of the genealogy, identifying one haplotype (sample, inferred
/// ancestor, or synthesized ancestor). Ids are assigned in insertion order.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Node(pub(crate) u32);

impl Node {
    /// Create a node id from a raw index. Mostly useful for drivers that
    /// track node ids outside the builder.
    pub fn from_usize(index: usize) -> Self {
        Self(index as u32)
    }

    /// Get the underlying value of the node id.
    pub fn unwrap(&self) -> u32 {
        self.0
    }

    pub(crate) fn index(&self) -> usize {
        self.0 as usize
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// One parent interval of a copying path: the child inherits from `parent`
/// over `[left, right)`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PathSegment {
    pub left: SiteIndex,
    pub right: SiteIndex,
    pub parent: Node,
}

impl PathSegment {
    pub fn new(left: SiteIndex, right: SiteIndex, parent: Node) -> Self {
        Self {
            left,
            right,
            parent,
        }
    }
}

/// Per-call options for [`TreeSequenceBuilder::add_path`].
#[derive(Clone, Copy, Debug, Default)]
pub struct PathOptions {
    /// Match the new path against the existing edges and replace shared runs
    /// by synthesized ancestors.
    pub compress: bool,
    /// Validate the full builder state after the path has been indexed.
    /// Expensive; intended for tests and debugging.
    pub extended_checks: bool,
}

impl PathOptions {
    /// Options with path compression enabled.
    pub fn compressed() -> Self {
        Self {
            compress: true,
            extended_checks: false,
        }
    }
}

/// Errors reported by the tree sequence builder.
///
/// Validation errors are detected before the builder mutates any state and
/// leave it usable. Every other error surfaces mid-operation; the builder
/// must be discarded afterwards.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum TreeSequenceError {
    #[error("path child {0} is not in the node table")]
    UnknownChild(Node),

    #[error("path parent {0} is not in the node table")]
    UnknownParent(Node),

    #[error("path parent {parent} is not strictly older than child {child}")]
    ParentNotOlderThanChild { parent: Node, child: Node },

    #[error("path segment starts at {found} but the previous segment ends at {expected}")]
    DiscontiguousPath { expected: SiteIndex, found: SiteIndex },

    #[error("restored edges are not sorted by child id and left coordinate")]
    UnsortedEdges,

    #[error("synthesized ancestor time {time} would not be older than its child {child}")]
    SynthesizedTimeCollision { time: f64, child: Node },
}
