//! Basic placement example
//!
//! Run with: cargo run --example basic_placement

use placement_core::{NodeId, PlacementId};
use placement_filter::country::CountryCode;
use placement_filter::registry::PlacementRegistry;
use placement_filter::rules::{Annotation, NodeAttributes};

fn main() {
    println!("=== Placement Example ===\n");

    let definitions = r#"
        10:annotated(country("us"), annotation("name", "us-only"));
        11:annotated(placement(1) && exclude(country("de")), annotation("name", "eu-without-germany"));
        12:country("!us")
    "#;

    let registry: PlacementRegistry = match definitions.parse() {
        Ok(registry) => registry,
        Err(err) => {
            eprintln!("invalid definitions: {err}");
            return;
        }
    };

    println!("1. Registered placements:");
    for (id, filter) in registry.user_defined() {
        let name = filter.annotation(Annotation::NAME).unwrap_or("-");
        println!("  {id:>3} {name:<20} {filter}");
    }

    println!("\n2. Matching nodes:");
    let countries = [
        CountryCode::US,
        CountryCode::DE,
        CountryCode::FR,
        CountryCode::None,
    ];
    for id in [10, 11, 12, 999].map(PlacementId::new) {
        let verdicts: Vec<String> = countries
            .iter()
            .map(|&country| {
                let node = NodeAttributes::new(NodeId::default(), country);
                let verdict = if registry.matches(id, &node) { "accept" } else { "reject" };
                format!("{country}={verdict}")
            })
            .collect();
        println!("  {id:>3}: {}", verdicts.join(" "));
    }

    println!("\n3. Description:");
    println!("  {}", registry.describe());
}
