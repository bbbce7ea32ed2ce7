//! Placement rules for storage node selection
//!
//! A placement is a data-residency policy identified by a small integer.
//! This crate decides which storage nodes are eligible for a placement:
//!
//! - Country sets with region aliases (`eu`, `eea`), negation and the `none`
//!   sentinel for nodes without a known location
//! - A closed algebra of node filters (country, signed tag, conjunction,
//!   complement, annotations)
//! - A small sandboxed rule language evaluated at configuration time
//! - The placement registry, where unknown placements deny every node
//! - Hot reload by atomically swapping in a freshly built registry
//! - YAML placement files
//!
//! Matching is pure and allocation-free, so it can run inline in any number
//! of concurrent node-selection loops.
//!
//! # Examples
//!
//! ## Loading definitions
//!
//! ```rust
//! use placement_filter::country::CountryCode;
//! use placement_filter::registry::PlacementRegistry;
//! use placement_filter::rules::NodeAttributes;
//! use placement_core::{NodeId, PlacementId};
//!
//! let registry: PlacementRegistry =
//!     r#"12:country("eu") && exclude(country("de"))"#.parse().unwrap();
//!
//! let node = |country| NodeAttributes::new(NodeId::default(), country);
//! let id = PlacementId::new(12);
//! assert!(registry.matches(id, &node(CountryCode::FR)));
//! assert!(!registry.matches(id, &node(CountryCode::DE)));
//! assert!(!registry.matches(PlacementId::new(999), &node(CountryCode::FR)));
//! ```
//!
//! ## Tag rules
//!
//! ```rust
//! use placement_filter::country::CountryCode;
//! use placement_filter::registry::PlacementRegistry;
//! use placement_filter::rules::NodeAttributes;
//! use placement_core::{NodeId, PlacementId};
//!
//! let signer = NodeId::from_bytes([0xab; 32]);
//! let registry: PlacementRegistry =
//!     format!(r#"20:tag("{signer}", "tier", "gold")"#).parse().unwrap();
//!
//! let gold = NodeAttributes::new(NodeId::default(), CountryCode::US)
//!     .with_tag(signer, "tier", "gold");
//! assert!(registry.matches(PlacementId::new(20), &gold));
//! ```

pub mod config;
pub mod country;
pub mod definitions;
pub mod expr;
pub mod handle;
pub mod metrics;
pub mod registry;
pub mod rules;

// Re-export commonly used types
pub use config::{PlacementConfig, PlacementEntryConfig};
pub use country::{CountryCode, CountrySet};
pub use handle::{PlacementHandle, PlacementSnapshot};
pub use registry::PlacementRegistry;
pub use rules::{
    Annotation, CountryFilter, FilterResult, FilterRule, NodeAttributes, NodeFilter, NodeTags,
    TagFilter, TagMatch,
};
