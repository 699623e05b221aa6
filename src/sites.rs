use std::fmt::{Display, Formatter};

/// State of a site that carries the ancestral allele.
pub const ANCESTRAL_STATE: u8 = 0;
/// State of a site that carries the derived allele.
pub const DERIVED_STATE: u8 = 1;

/// An index into the inference sites of the genome. The newtype ensures site
/// indices aren't mixed up with node ids or raw sequence positions.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct SiteIndex(pub(crate) u32);

impl SiteIndex {
    /// Create a new site index from a usize.
    pub fn from_usize(index: usize) -> Self {
        Self(index as u32)
    }

    /// Get the underlying value of the site index.
    pub fn unwrap(&self) -> u32 {
        self.0
    }
}

impl Display for SiteIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}
