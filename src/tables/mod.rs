use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::sites::SiteIndex;
use crate::ts::{Edge, Node};

/// A row of the node table. Population and individual references are not
/// inferred by this crate and stay empty.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NodeRow {
    pub flags: u32,
    pub time: f64,
    pub population: Option<u32>,
    pub individual: Option<u32>,
}

/// A row of the site table. Sites sit at their index position and are
/// ancestral-state 0 by construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SiteRow {
    pub position: SiteIndex,
    pub ancestral_state: u8,
}

/// A row of the mutation table. `parent` is the id of the previous mutation
/// at the same site, if any.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MutationRow {
    pub site: SiteIndex,
    pub node: Node,
    pub parent: Option<u32>,
    pub derived_state: u8,
}

/// The flat output tables of a finished genealogy: nodes, edges, sites and
/// mutations, plus the sequence length. This is the interchange format the
/// rest of the pipeline (and `tskit.load_text`) consumes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TableCollection {
    pub sequence_length: f64,
    nodes: Vec<NodeRow>,
    edges: Vec<Edge>,
    sites: Vec<SiteRow>,
    mutations: Vec<MutationRow>,
}

impl TableCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all rows, keeping the allocations for reuse.
    pub fn clear(&mut self) {
        self.sequence_length = 0.0;
        self.nodes.clear();
        self.edges.clear();
        self.sites.clear();
        self.mutations.clear();
    }

    pub fn add_node(&mut self, flags: u32, time: f64) -> u32 {
        self.nodes.push(NodeRow {
            flags,
            time,
            population: None,
            individual: None,
        });
        self.nodes.len() as u32 - 1
    }

    pub fn add_edge(&mut self, edge: Edge) -> u32 {
        self.edges.push(edge);
        self.edges.len() as u32 - 1
    }

    pub fn add_site(&mut self, position: SiteIndex, ancestral_state: u8) -> u32 {
        self.sites.push(SiteRow {
            position,
            ancestral_state,
        });
        self.sites.len() as u32 - 1
    }

    pub fn add_mutation(
        &mut self,
        site: SiteIndex,
        node: Node,
        parent: Option<u32>,
        derived_state: u8,
    ) -> u32 {
        self.mutations.push(MutationRow {
            site,
            node,
            parent,
            derived_state,
        });
        self.mutations.len() as u32 - 1
    }

    pub fn nodes(&self) -> &[NodeRow] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn sites(&self) -> &[SiteRow] {
        &self.sites
    }

    pub fn mutations(&self) -> &[MutationRow] {
        &self.mutations
    }

    /// Export the tables as tab-separated text files readable by
    /// `tskit.load_text`: `nodes.tsv`, `edges.tsv`, `sites.tsv` and
    /// `mutations.tsv` in the given directory.
    pub fn export_text(&self, path: &Path) -> io::Result<()> {
        let mut node_file = path.to_path_buf();
        node_file.push("nodes.tsv");
        let mut writer = File::create(node_file)?;

        writer.write_fmt(format_args!("id\tis_sample\ttime\n"))?;
        for (id, node) in self.nodes.iter().enumerate() {
            writer.write_fmt(format_args!(
                "{id}\t{is_sample}\t{time}\n",
                id = id,
                is_sample = node.flags & 1,
                time = node.time,
            ))?;
        }

        let mut edge_file = path.to_path_buf();
        edge_file.push("edges.tsv");
        let mut writer = File::create(edge_file)?;

        writer.write_fmt(format_args!("left\tright\tparent\tchild\n"))?;
        for edge in &self.edges {
            writer.write_fmt(format_args!(
                "{left}\t{right}\t{parent}\t{child}\n",
                left = edge.left,
                right = edge.right,
                parent = edge.parent,
                child = edge.child,
            ))?;
        }

        let mut site_file = path.to_path_buf();
        site_file.push("sites.tsv");
        let mut writer = File::create(site_file)?;

        writer.write_fmt(format_args!("position\tancestral_state\n"))?;
        for site in &self.sites {
            writer.write_fmt(format_args!(
                "{position}\t{state}\n",
                position = site.position,
                state = site.ancestral_state,
            ))?;
        }

        let mut mutation_file = path.to_path_buf();
        mutation_file.push("mutations.tsv");
        let mut writer = File::create(mutation_file)?;

        writer.write_fmt(format_args!("site\tnode\tderived_state\n"))?;
        for mutation in &self.mutations {
            writer.write_fmt(format_args!(
                "{site}\t{node}\t{state}\n",
                site = mutation.site,
                node = mutation.node,
                state = mutation.derived_state,
            ))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sites::{DERIVED_STATE, ANCESTRAL_STATE};

    #[test]
    fn row_ids_are_sequential() {
        let mut tables = TableCollection::new();
        assert_eq!(tables.add_node(0, 2.0), 0);
        assert_eq!(tables.add_node(0, 1.0), 1);
        assert_eq!(tables.add_site(SiteIndex(0), ANCESTRAL_STATE), 0);
        assert_eq!(
            tables.add_mutation(SiteIndex(0), Node(1), None, DERIVED_STATE),
            0
        );
        assert_eq!(
            tables.add_mutation(SiteIndex(0), Node(0), Some(0), ANCESTRAL_STATE),
            1
        );
        assert_eq!(tables.nodes().len(), 2);
        assert_eq!(tables.mutations()[1].parent, Some(0));
    }

    #[test]
    fn clear_resets_all_tables() {
        let mut tables = TableCollection::new();
        tables.sequence_length = 3.0;
        tables.add_node(0, 1.0);
        tables.add_site(SiteIndex(0), ANCESTRAL_STATE);
        tables.clear();
        assert_eq!(tables, TableCollection::new());
    }
}
