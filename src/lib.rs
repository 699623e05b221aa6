//! Incremental construction of genealogies for ancestral-recombination-graph
//! inference.
//!
//! The crate revolves around the [`TreeSequenceBuilder`]: it accepts a stream
//! of copying paths (one per haplotype, each a contiguous tiling of parent
//! intervals along the genome) and maintains a compact, indexed genealogy.
//! Shared path segments are deduplicated on the fly by attaching them to
//! synthesized intermediate ancestors, and contiguous same-parent edges are
//! coalesced. The finished genealogy is emitted as a [`TableCollection`].
//!
//! The [`ancestors`] module provides the static ancestor store that upstream
//! matching algorithms read their candidate haplotypes from. The builder does
//! not depend on it; it is the input contract of the surrounding pipeline.
//!
//! [`TreeSequenceBuilder`]: ts::TreeSequenceBuilder
//! [`TableCollection`]: tables::TableCollection

pub mod ancestors;
pub mod sites;
pub mod tables;
pub mod ts;

pub use sites::SiteIndex;
pub use ts::{Node, PathSegment, TreeSequenceBuilder};
