//! The static ancestor store: a per-site segment encoding of the ancestral
//! haplotypes that matching algorithms copy from.
//!
//! The store is read-only after construction. Ancestors are ordered oldest
//! first (id 0 is the root ancestor spanning the whole sequence) and grouped
//! into epochs of equal age; per site, the ancestors carrying the derived
//! state are stored as id ranges rather than as dense haplotypes.

use std::fmt::{Display, Formatter};
use std::io::{self, Write};

use crate::sites::{SiteIndex, ANCESTRAL_STATE, DERIVED_STATE};

/// An index into the ancestor store which uniquely identifies an ancestral
/// haplotype.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Ancestor(pub(crate) u32);

impl Ancestor {
    pub fn from_usize(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn unwrap(&self) -> u32 {
        self.0
    }

    pub(crate) fn index(&self) -> usize {
        self.0 as usize
    }
}

impl Display for Ancestor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// The ancestors `[start, end)` carry the derived state at one site.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AncestorRange {
    pub start: Ancestor,
    pub end: Ancestor,
}

impl AncestorRange {
    pub fn new(start: Ancestor, end: Ancestor) -> Self {
        Self { start, end }
    }

    fn contains(&self, ancestor: Ancestor) -> bool {
        self.start <= ancestor && ancestor < self.end
    }
}

/// Descriptive data of one ancestral haplotype: its inferred age, the
/// half-open site interval over which it is defined, and the focal sites its
/// inference started from. The root ancestor has no focal sites.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AncestorMetadata {
    pub age: u32,
    pub start: SiteIndex,
    pub end: SiteIndex,
    pub focal_sites: Vec<SiteIndex>,
}

/// A maximal run of consecutive ancestors sharing one age value. Epoch 0 is
/// the root's epoch; ages strictly decrease with the epoch index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Epoch {
    pub first_ancestor: Ancestor,
    pub num_ancestors: usize,
}

/// Read-only store of ancestral haplotypes in per-site segment encoding.
pub struct AncestorStore {
    num_sites: usize,
    /// Per site, the ancestor-id ranges carrying the derived state.
    segments: Vec<Vec<AncestorRange>>,
    metadata: Vec<AncestorMetadata>,
    /// Per ancestor, the number of strictly older ancestors (members of
    /// earlier epochs).
    num_older_ancestors: Vec<u32>,
    epochs: Vec<Epoch>,
}

impl AncestorStore {
    /// Build a store from per-ancestor metadata and per-site derived-state
    /// segments. Ancestors must be ordered oldest first; the epoch table and
    /// the older-ancestor counts are derived from the age sequence.
    ///
    /// The store spans one segment list per site.
    ///
    /// # Panics
    /// Panics if the ages are not non-increasing or if a segment references
    /// an ancestor outside the store.
    pub fn new(metadata: Vec<AncestorMetadata>, segments: Vec<Vec<AncestorRange>>) -> Self {
        let num_sites = segments.len();
        let num_ancestors = metadata.len();
        assert!(num_ancestors > 0, "the store needs at least a root ancestor");
        assert!(
            metadata.windows(2).all(|pair| pair[0].age >= pair[1].age),
            "ancestors must be ordered oldest first"
        );
        assert!(segments
            .iter()
            .flatten()
            .all(|range| range.start < range.end && range.end.index() <= num_ancestors));

        let mut epochs = Vec::new();
        let mut num_older_ancestors = vec![0u32; num_ancestors];
        let mut epoch_start = 0usize;
        for index in 1..=num_ancestors {
            if index == num_ancestors || metadata[index].age != metadata[epoch_start].age {
                epochs.push(Epoch {
                    first_ancestor: Ancestor(epoch_start as u32),
                    num_ancestors: index - epoch_start,
                });
                epoch_start = index;
            }
            if index < num_ancestors {
                num_older_ancestors[index] = if metadata[index].age == metadata[index - 1].age {
                    num_older_ancestors[index - 1]
                } else {
                    index as u32
                };
            }
        }

        Self {
            num_sites,
            segments,
            metadata,
            num_older_ancestors,
            epochs,
        }
    }

    pub fn num_sites(&self) -> usize {
        self.num_sites
    }

    pub fn num_ancestors(&self) -> usize {
        self.metadata.len()
    }

    pub fn num_epochs(&self) -> usize {
        self.epochs.len()
    }

    pub fn metadata(&self, ancestor: Ancestor) -> &AncestorMetadata {
        &self.metadata[ancestor.index()]
    }

    /// Number of ancestors strictly older than the given one.
    pub fn num_older_ancestors(&self, ancestor: Ancestor) -> u32 {
        self.num_older_ancestors[ancestor.index()]
    }

    /// The state of one ancestor at one site.
    pub fn state(&self, site: SiteIndex, ancestor: Ancestor) -> u8 {
        debug_assert!((site.0 as usize) < self.num_sites);
        debug_assert!(ancestor.index() < self.metadata.len());
        if self.segments[site.0 as usize]
            .iter()
            .any(|range| range.contains(ancestor))
        {
            DERIVED_STATE
        } else {
            ANCESTRAL_STATE
        }
    }

    /// Reconstruct the haplotype of an ancestor over its defined interval.
    pub fn haplotype(&self, ancestor: Ancestor) -> Vec<u8> {
        let metadata = &self.metadata[ancestor.index()];
        (metadata.start.0..metadata.end.0)
            .map(|site| self.state(SiteIndex(site), ancestor))
            .collect()
    }

    /// The members of one epoch, oldest epoch first.
    pub fn epoch_ancestors(&self, epoch: usize) -> impl Iterator<Item = Ancestor> {
        let Epoch {
            first_ancestor,
            num_ancestors,
        } = self.epochs[epoch];
        (first_ancestor.0..first_ancestor.0 + num_ancestors as u32).map(Ancestor)
    }

    pub fn epochs(&self) -> &[Epoch] {
        &self.epochs
    }

    /// Write a diagnostic rendering of the store and validate its
    /// consistency.
    pub fn print_state(&self, out: &mut dyn Write) -> io::Result<()> {
        out.write_fmt(format_args!("Ancestor store\n"))?;
        out.write_fmt(format_args!("num_sites = {}\n", self.num_sites))?;
        out.write_fmt(format_args!("num_ancestors = {}\n", self.num_ancestors()))?;
        out.write_fmt(format_args!("num_epochs = {}\n", self.num_epochs()))?;

        out.write_fmt(format_args!("sites =\n"))?;
        for (site, segments) in self.segments.iter().enumerate() {
            out.write_fmt(format_args!("{}\t[{}]:: ", site, segments.len()))?;
            for range in segments {
                out.write_fmt(format_args!("({}, {})", range.start, range.end))?;
            }
            out.write_fmt(format_args!("\n"))?;
        }

        out.write_fmt(format_args!("ancestors =\n"))?;
        out.write_fmt(format_args!(
            "id\tage\tstart\tend\tnum_older_ancestors\tfocal_sites\n"
        ))?;
        for (id, metadata) in self.metadata.iter().enumerate() {
            out.write_fmt(format_args!(
                "{id}\t{age}\t{start}\t{end}\t{older}\t{focal:?}\n",
                id = id,
                age = metadata.age,
                start = metadata.start,
                end = metadata.end,
                older = self.num_older_ancestors[id],
                focal = metadata
                    .focal_sites
                    .iter()
                    .map(|site| site.0)
                    .collect::<Vec<_>>(),
            ))?;
        }

        out.write_fmt(format_args!("epochs =\n"))?;
        out.write_fmt(format_args!("id\tfirst_ancestor\tnum_ancestors\n"))?;
        for (id, epoch) in self.epochs.iter().enumerate() {
            out.write_fmt(format_args!(
                "{}\t{}\t{}\n",
                id, epoch.first_ancestor, epoch.num_ancestors
            ))?;
        }

        self.check_state();
        Ok(())
    }

    /// Assert the store invariants: intervals are well-formed, focal sites
    /// carry the derived state inside their ancestor's interval, epochs
    /// partition the ancestors, and ages agree within an epoch.
    pub(crate) fn check_state(&self) {
        for (id, metadata) in self.metadata.iter().enumerate() {
            let ancestor = Ancestor(id as u32);
            assert!(metadata.start < metadata.end);
            assert!((metadata.end.0 as usize) <= self.num_sites);
            for &focal in &metadata.focal_sites {
                assert!(metadata.start <= focal && focal < metadata.end);
                assert_eq!(self.state(focal, ancestor), DERIVED_STATE);
            }
        }

        let mut covered = 0usize;
        for (index, epoch) in self.epochs.iter().enumerate() {
            assert_eq!(epoch.first_ancestor.index(), covered);
            assert!(epoch.num_ancestors > 0);
            let age = self.metadata[epoch.first_ancestor.index()].age;
            for member in self.epoch_ancestors(index) {
                assert_eq!(self.metadata[member.index()].age, age);
            }
            covered += epoch.num_ancestors;
        }
        assert_eq!(covered, self.num_ancestors());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Three epochs: the root, two ancestors of age 2, one of age 1.
    fn example_store() -> AncestorStore {
        let metadata = vec![
            AncestorMetadata {
                age: u32::MAX,
                start: SiteIndex(0),
                end: SiteIndex(4),
                focal_sites: vec![],
            },
            AncestorMetadata {
                age: 2,
                start: SiteIndex(0),
                end: SiteIndex(4),
                focal_sites: vec![SiteIndex(1)],
            },
            AncestorMetadata {
                age: 2,
                start: SiteIndex(1),
                end: SiteIndex(4),
                focal_sites: vec![SiteIndex(3)],
            },
            AncestorMetadata {
                age: 1,
                start: SiteIndex(0),
                end: SiteIndex(3),
                focal_sites: vec![SiteIndex(0)],
            },
        ];
        let segments = vec![
            vec![AncestorRange::new(Ancestor(3), Ancestor(4))],
            vec![AncestorRange::new(Ancestor(1), Ancestor(2))],
            vec![],
            vec![AncestorRange::new(Ancestor(2), Ancestor(3))],
        ];
        AncestorStore::new(metadata, segments)
    }

    #[test]
    fn states_follow_segments() {
        let store = example_store();
        assert_eq!(store.state(SiteIndex(1), Ancestor(1)), DERIVED_STATE);
        assert_eq!(store.state(SiteIndex(1), Ancestor(2)), ANCESTRAL_STATE);
        assert_eq!(store.state(SiteIndex(3), Ancestor(2)), DERIVED_STATE);
        assert_eq!(store.state(SiteIndex(2), Ancestor(0)), ANCESTRAL_STATE);
    }

    #[test]
    fn haplotypes_cover_the_defined_interval() {
        let store = example_store();
        assert_eq!(store.haplotype(Ancestor(1)), vec![0, 1, 0, 0]);
        assert_eq!(store.haplotype(Ancestor(2)), vec![0, 0, 1]);
        assert_eq!(store.haplotype(Ancestor(3)), vec![1, 0, 0]);
    }

    #[test]
    fn epochs_group_equal_ages() {
        let store = example_store();
        assert_eq!(store.num_epochs(), 3);
        let second: Vec<_> = store.epoch_ancestors(1).collect();
        assert_eq!(second, vec![Ancestor(1), Ancestor(2)]);

        assert_eq!(store.num_older_ancestors(Ancestor(1)), 1);
        assert_eq!(store.num_older_ancestors(Ancestor(2)), 1);
        assert_eq!(store.num_older_ancestors(Ancestor(3)), 3);
    }

    #[test]
    fn print_state_renders_and_validates() {
        let store = example_store();
        let mut out = Vec::new();
        store.print_state(&mut out).unwrap();
        let rendered = String::from_utf8(out).unwrap();
        assert!(rendered.contains("num_ancestors = 4"));
        assert!(rendered.contains("num_epochs = 3"));
    }
}
