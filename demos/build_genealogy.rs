//! This example builds a small genealogy with path compression enabled,
//! prints the builder diagnostics to stdout and exports the final tables to
//! a directory in the tskit `load_text` format.

use std::env;
use std::path::PathBuf;

use libarg::sites::{SiteIndex, DERIVED_STATE};
use libarg::ts::{PathOptions, PathSegment, TreeSequenceBuilder};

fn main() {
    if env::args().len() < 2 {
        println!("usage: {} <output dir>", env::args().next().unwrap());
        return;
    }
    let target_dir = PathBuf::from(env::args().nth(1).unwrap());
    std::fs::create_dir_all(&target_dir).expect("failed to create output directory");

    let num_sites = 6;
    let mut builder = TreeSequenceBuilder::new(num_sites);

    // two founding lineages and three derived haplotypes
    let root_a = builder.add_node(4.0, 0);
    let root_b = builder.add_node(4.0, 0);
    let children: Vec<_> = (0..3).map(|_| builder.add_node(1.0, 1)).collect();

    // all three children copy the same recombinant path, so the second and
    // third insertion get rewired below a synthesized ancestor
    let path = [
        PathSegment::new(SiteIndex::from_usize(3), SiteIndex::from_usize(6), root_b),
        PathSegment::new(SiteIndex::from_usize(0), SiteIndex::from_usize(3), root_a),
    ];
    for &child in &children {
        builder
            .add_path(child, &path, PathOptions::compressed())
            .expect("failed to insert path");
    }

    builder.add_mutations(children[0], &[(SiteIndex::from_usize(1), DERIVED_STATE)]);
    builder.add_mutations(children[2], &[(SiteIndex::from_usize(4), DERIVED_STATE)]);
    builder.freeze_indexes();

    let mut stdout = std::io::stdout();
    builder
        .print_state(&mut stdout)
        .expect("failed to print builder state");

    let tables = builder.dump();
    tables
        .export_text(&target_dir)
        .expect("failed to export tables");
    println!(
        "wrote {} nodes, {} edges, {} mutations to {}",
        tables.nodes().len(),
        tables.edges().len(),
        tables.mutations().len(),
        target_dir.display()
    );
}
