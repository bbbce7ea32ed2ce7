//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use placement_core::NodeId;
use placement_filter::country::CountryCode;
use placement_filter::registry::PlacementRegistry;
use placement_filter::rules::NodeAttributes;
use std::path::PathBuf;

/// Get the path to test fixtures
pub fn fixtures_dir() -> PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest_dir).join("tests").join("fixtures")
}

/// Signer used for tag fixtures
pub fn signer() -> NodeId {
    NodeId::from_bytes([0xab; 32])
}

/// Untagged node located in `country`
pub fn node(country: CountryCode) -> NodeAttributes {
    NodeAttributes::new(NodeId::from_bytes([1; 32]), country)
}

/// Node carrying one tag signed by [`signer`]
pub fn tagged_node(country: CountryCode, key: &str, value: &[u8]) -> NodeAttributes {
    node(country).with_tag(signer(), key, value)
}

/// One node per real country plus one without a country
pub fn every_country_node() -> Vec<NodeAttributes> {
    std::iter::once(CountryCode::None)
        .chain(CountryCode::ALL.iter().copied())
        .map(node)
        .collect()
}

/// Registry with the default and legacy rules only
pub fn builtins() -> PlacementRegistry {
    let mut registry = PlacementRegistry::new();
    registry.register_default();
    registry.register_legacy_defaults();
    registry
}
