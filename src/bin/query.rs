//! One-shot query CLI: run a single query against a local GEDCOM file
//! without a server or configuration file.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gedmcp::decode::{Decoder, GedcomDecoder};
use gedmcp::dedup::{self, DuplicateWeights};
use gedmcp::graph::{
    ancestor_tree, ancestors, describe_path, descendant_tree, shortest_path, PathOutcome,
    RelationGraph, TreeNode,
};
use gedmcp::store::EntityStore;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "query")]
#[command(about = "Run one relationship query against a local GEDCOM file")]
struct Args {
    /// Path to the GEDCOM file
    #[arg(short, long)]
    file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Shortest relationship path between two people
    Path { person_a: String, person_b: String },
    /// Common ancestors of two people
    Ancestors {
        person_a: String,
        person_b: String,
        #[arg(short, long, default_value_t = 20)]
        generations: u32,
    },
    /// Ancestor or descendant tree of one person
    Tree {
        person_id: String,
        #[arg(short, long, default_value_t = 4)]
        generations: u32,
        /// Enumerate descendants instead of ancestors
        #[arg(short, long)]
        descendants: bool,
    },
    /// Probable duplicate person records
    Duplicates {
        #[arg(short, long, default_value_t = 75.0)]
        threshold: f64,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let bytes = std::fs::read(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let doc = GedcomDecoder
        .parse(&bytes)
        .with_context(|| format!("Failed to decode {}", args.file.display()))?;
    let store = EntityStore::new(doc);
    let graph = RelationGraph::build(&store);

    println!(
        "Loaded {}: {} individuals, {} families\n",
        args.file.display(),
        store.individual_count(),
        store.family_count()
    );

    let start = Instant::now();
    match &args.command {
        Command::Path { person_a, person_b } => {
            require(&graph, person_a)?;
            require(&graph, person_b)?;
            match shortest_path(&graph, person_a, person_b) {
                PathOutcome::Path { steps } => {
                    println!("Path of {} step(s):", steps.len().saturating_sub(1));
                    for step in describe_path(&steps, &store) {
                        match step.relation_to_next {
                            Some(relation) => {
                                println!("  {} ({}) -- {} -->", step.name, step.person, relation)
                            }
                            None => println!("  {} ({})", step.name, step.person),
                        }
                    }
                }
                PathOutcome::NoPath => {
                    println!("No relationship path exists between {} and {}", person_a, person_b)
                }
            }
        }
        Command::Ancestors {
            person_a,
            person_b,
            generations,
        } => {
            require(&graph, person_a)?;
            require(&graph, person_b)?;
            let shared = ancestors::common_ancestors(&graph, person_a, person_b, *generations);
            if shared.is_empty() {
                println!(
                    "No common ancestors within {} generation(s)",
                    generations
                );
            } else {
                for entry in shared {
                    println!(
                        "{} - {} generation(s) from {}, {} from {}",
                        entry.id, entry.distance_a, person_a, entry.distance_b, person_b
                    );
                }
            }
        }
        Command::Tree {
            person_id,
            generations,
            descendants,
        } => {
            require(&graph, person_id)?;
            let tree = if *descendants {
                descendant_tree(&graph, person_id, *generations)
            } else {
                ancestor_tree(&graph, person_id, *generations)
            };
            print_node(&tree.root, &store);
            if tree.malformed_data {
                println!("\nWarning: relationship cycle detected; affected branches were cut");
            }
        }
        Command::Duplicates { threshold } => {
            let duplicates =
                dedup::find_potential_duplicates(&store, &DuplicateWeights::default(), *threshold);
            if duplicates.is_empty() {
                println!("No potential duplicates at threshold {:.1}", threshold);
            } else {
                for dup in duplicates {
                    println!("{} / {} (score: {:.1})", dup.person_a, dup.person_b, dup.score);
                }
            }
        }
    }

    println!("\nLatency: {:?}", start.elapsed());
    Ok(())
}

fn require(graph: &RelationGraph, id: &str) -> Result<()> {
    if !graph.contains(id) {
        anyhow::bail!("Person not found: {}", id);
    }
    Ok(())
}

fn print_node(node: &TreeNode, store: &EntityStore) {
    let indent = "  ".repeat(node.depth as usize);
    let name = store
        .individual(&node.id)
        .map(|i| i.display_name())
        .unwrap_or_else(|| "Unknown".to_string());
    let marker = if node.cycle { " [cycle]" } else { "" };
    println!("{}{} ({}){}", indent, name, node.id, marker);
    for branch in &node.branches {
        print_node(branch, store);
    }
}
