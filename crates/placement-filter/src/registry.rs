//! Placement registry
//!
//! Maps placement identifiers to node filters. A registry is built once,
//! single-threaded, and then only read: lookups take `&self` and never fail.
//! An identifier that was never registered resolves to a deny-all filter, so
//! a missing or misconfigured placement admits no node at all.
//!
//! Runtime reloads build a fresh registry and swap it in through
//! [`PlacementHandle`](crate::handle::PlacementHandle); nothing mutates a
//! registry that readers can reach.

use crate::country::{CountryCode, CountrySet, EEA_COUNTRIES_WITHOUT_EU, EU_COUNTRIES};
use crate::definitions::{parse_entry, split_entries};
use crate::expr::{self, PlacementLookup};
use crate::metrics;
use crate::rules::{NodeAttributes, NodeFilter};
use placement_core::error::ParseError;
use placement_core::{ExpressionError, PlacementId};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, info, trace, warn};

static DENY_ALL: NodeFilter = NodeFilter::DenyAll;

/// Placement identifier to filter mapping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlacementRegistry {
    placements: BTreeMap<PlacementId, NodeFilter>,
}

impl PlacementRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register [`PlacementId::EVERY_COUNTRY`] as accept-all.
    pub fn register_default(&mut self) {
        self.register(PlacementId::EVERY_COUNTRY, NodeFilter::AcceptAll);
    }

    /// Register the fixed country rules for the well-known identifiers.
    ///
    /// Calling this again overwrites them with identical filters.
    pub fn register_legacy_defaults(&mut self) {
        let eu = CountrySet::new(EU_COUNTRIES);
        let eea = eu.with(EEA_COUNTRIES_WITHOUT_EU);
        let no_russia = CountrySet::full().without(&[
            CountryCode::RU,
            CountryCode::BY,
            CountryCode::None,
        ]);

        self.register(PlacementId::EEA, NodeFilter::country(eea));
        self.register(PlacementId::EU, NodeFilter::country(eu));
        self.register(
            PlacementId::US,
            NodeFilter::country(CountrySet::new(&[CountryCode::US])),
        );
        self.register(
            PlacementId::DE,
            NodeFilter::country(CountrySet::new(&[CountryCode::DE])),
        );
        self.register(PlacementId::NR, NodeFilter::country(no_russia));
    }

    /// Load `id:expression;id:expression;...` definitions.
    ///
    /// Entries are evaluated and registered one at a time, in order. An
    /// entry may use `placement(id)` to build on anything registered before
    /// it; a reference to an identifier that is only defined later resolves
    /// to deny-all. The first failing entry stops the load: entries before
    /// it stay registered, entries after it are not evaluated.
    ///
    /// Returns the number of entries registered.
    pub fn load_definitions(&mut self, text: &str) -> Result<usize, ParseError> {
        let mut loaded = 0;
        for raw in split_entries(text) {
            if let Err(err) = self.load_entry(raw) {
                metrics::record_definition_error();
                warn!(entry = raw, error = %err, loaded, "Placement definition rejected");
                metrics::record_rules_registered(self.len());
                return Err(err);
            }
            loaded += 1;
        }

        metrics::record_rules_registered(self.len());
        info!(loaded, total = self.len(), "Placement definitions loaded");
        Ok(loaded)
    }

    fn load_entry(&mut self, raw: &str) -> Result<(), ParseError> {
        let entry = parse_entry(raw)?;
        let filter = expr::evaluate(entry.expression, &*self)
            .map_err(|source| ParseError::definition(entry.text, source))?;

        debug!(placement = %entry.id, filter = %filter, "Placement registered");
        metrics::record_definition_loaded();
        self.register(entry.id, filter);
        Ok(())
    }

    /// Evaluate a single expression and register the result under `id`.
    pub fn register_expression(&mut self, id: PlacementId, src: &str) -> Result<(), ExpressionError> {
        let filter = expr::evaluate(src, &*self)?;
        debug!(placement = %id, filter = %filter, "Placement registered");
        self.register(id, filter);
        Ok(())
    }

    /// Register `filter` under `id`, replacing any previous filter.
    ///
    /// The filter is stored as given; use [`expr::check_depth`] first if it
    /// must survive a [`describe`](Self::describe) round trip.
    pub fn register(&mut self, id: PlacementId, filter: NodeFilter) {
        self.placements.insert(id, filter);
    }

    /// Filter for `id`, or deny-all if it is not registered.
    pub fn lookup(&self, id: PlacementId) -> &NodeFilter {
        match self.placements.get(&id) {
            Some(filter) => filter,
            None => {
                trace!(placement = %id, "Unknown placement, denying all nodes");
                metrics::record_lookup_fallback();
                &DENY_ALL
            }
        }
    }

    /// Check a node against the filter for `id`.
    #[inline]
    pub fn matches(&self, id: PlacementId, node: &NodeAttributes) -> bool {
        self.lookup(id).matches(node)
    }

    /// Render the user-defined placements as definition text.
    ///
    /// Reserved identifiers are omitted. Filters registered from expressions
    /// never nest deeper than [`MAX_DEPTH`](crate::expr::MAX_DEPTH), so the
    /// output loads back into a registry with the same matching behaviour.
    pub fn describe(&self) -> String {
        self.user_defined()
            .map(|(id, filter)| format!("{id}:{filter}"))
            .collect::<Vec<_>>()
            .join(";")
    }

    /// User-defined placements in identifier order
    pub fn user_defined(&self) -> impl Iterator<Item = (PlacementId, &NodeFilter)> + '_ {
        self.iter().filter(|(id, _)| !id.is_reserved())
    }

    /// All placements in identifier order
    pub fn iter(&self) -> impl Iterator<Item = (PlacementId, &NodeFilter)> + '_ {
        self.placements.iter().map(|(id, filter)| (*id, filter))
    }

    /// Returns true if `id` is registered
    pub fn contains(&self, id: PlacementId) -> bool {
        self.placements.contains_key(&id)
    }

    /// Registered identifiers in order
    pub fn ids(&self) -> Vec<PlacementId> {
        self.placements.keys().copied().collect()
    }

    /// Number of registered placements
    pub fn len(&self) -> usize {
        self.placements.len()
    }

    /// Returns true if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }
}

impl PlacementLookup for PlacementRegistry {
    fn registered(&self, id: PlacementId) -> Option<&NodeFilter> {
        self.placements.get(&id)
    }
}

/// Parses definition text on top of the default and legacy rules.
impl FromStr for PlacementRegistry {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut registry = Self::new();
        registry.register_default();
        registry.register_legacy_defaults();
        registry.load_definitions(s)?;
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use placement_core::NodeId;

    fn node(country: CountryCode) -> NodeAttributes {
        NodeAttributes::new(NodeId::from_bytes([1; 32]), country)
    }

    fn builtins() -> PlacementRegistry {
        let mut registry = PlacementRegistry::new();
        registry.register_default();
        registry.register_legacy_defaults();
        registry
    }

    #[test]
    fn test_unknown_placement_denies_all() {
        let registry = builtins();
        let id = PlacementId::new(999);
        for country in [CountryCode::US, CountryCode::DE, CountryCode::None] {
            assert!(!registry.matches(id, &node(country)));
        }
        assert_eq!(registry.lookup(id), &NodeFilter::DenyAll);
    }

    #[test]
    fn test_default_accepts_everything() {
        let registry = builtins();
        assert!(registry.matches(PlacementId::EVERY_COUNTRY, &node(CountryCode::None)));
        assert!(registry.matches(PlacementId::EVERY_COUNTRY, &node(CountryCode::RU)));
    }

    #[test]
    fn test_legacy_defaults() {
        let registry = builtins();

        assert!(registry.matches(PlacementId::EU, &node(CountryCode::FR)));
        assert!(!registry.matches(PlacementId::EU, &node(CountryCode::NO)));
        assert!(registry.matches(PlacementId::EEA, &node(CountryCode::NO)));
        assert!(registry.matches(PlacementId::EEA, &node(CountryCode::FR)));
        assert!(!registry.matches(PlacementId::EEA, &node(CountryCode::CH)));
        assert!(registry.matches(PlacementId::US, &node(CountryCode::US)));
        assert!(!registry.matches(PlacementId::US, &node(CountryCode::CA)));
        assert!(registry.matches(PlacementId::DE, &node(CountryCode::DE)));
        assert!(registry.matches(PlacementId::NR, &node(CountryCode::US)));
        assert!(!registry.matches(PlacementId::NR, &node(CountryCode::RU)));
        assert!(!registry.matches(PlacementId::NR, &node(CountryCode::BY)));
        assert!(!registry.matches(PlacementId::NR, &node(CountryCode::None)));
    }

    #[test]
    fn test_legacy_defaults_idempotent() {
        let mut registry = builtins();
        let before = registry.clone();
        registry.register_legacy_defaults();
        assert_eq!(registry, before);
    }

    #[test]
    fn test_load_definitions() {
        let mut registry = builtins();
        let loaded = registry
            .load_definitions(r#"10:country("us");11:country("!us")"#)
            .unwrap();
        assert_eq!(loaded, 2);

        let us = PlacementId::new(10);
        assert!(registry.matches(us, &node(CountryCode::US)));
        assert!(!registry.matches(us, &node(CountryCode::DE)));

        let not_us = PlacementId::new(11);
        assert!(!registry.matches(not_us, &node(CountryCode::US)));
        assert!(registry.matches(not_us, &node(CountryCode::DE)));
        assert!(!registry.matches(not_us, &node(CountryCode::None)));
    }

    #[test]
    fn test_placement_references_builtins() {
        let mut registry = builtins();
        registry
            .load_definitions(r#"10:placement(1) && exclude(country("de"))"#)
            .unwrap();
        let id = PlacementId::new(10);
        assert!(registry.matches(id, &node(CountryCode::FR)));
        assert!(!registry.matches(id, &node(CountryCode::DE)));
    }

    #[test]
    fn test_forward_reference_resolves_to_deny_all() {
        let mut registry = builtins();
        registry
            .load_definitions(r#"10:placement(11);11:country("us")"#)
            .unwrap();
        assert!(!registry.matches(PlacementId::new(10), &node(CountryCode::US)));
        assert!(registry.matches(PlacementId::new(11), &node(CountryCode::US)));

        // Defined in the other order, the reference resolves.
        let mut registry = builtins();
        registry
            .load_definitions(r#"11:country("us");10:placement(11)"#)
            .unwrap();
        assert!(registry.matches(PlacementId::new(10), &node(CountryCode::US)));
    }

    #[test]
    fn test_failed_load_keeps_earlier_entries() {
        let mut registry = builtins();
        registry.load_definitions(r#"10:country("us")"#).unwrap();

        let err = registry
            .load_definitions(r#"20:country("de");abc:country("us");21:country("fr")"#)
            .unwrap_err();
        assert_eq!(err.entry(), r#"abc:country("us")"#);

        assert!(registry.contains(PlacementId::new(10)));
        assert!(registry.contains(PlacementId::new(20)));
        assert!(!registry.contains(PlacementId::new(21)));
    }

    #[test]
    fn test_evaluation_error_wraps_entry() {
        let mut registry = builtins();
        let err = registry
            .load_definitions(r#"10:country("xx")"#)
            .unwrap_err();
        match err {
            ParseError::Definition { entry, source } => {
                assert_eq!(entry, r#"10:country("xx")"#);
                assert_eq!(
                    source,
                    ExpressionError::InvalidCountryCode {
                        code: "xx".to_string()
                    }
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_describe_hides_reserved() {
        let mut registry = builtins();
        assert_eq!(registry.describe(), "");

        registry.load_definitions(r#"10:country("us")"#).unwrap();
        assert_eq!(registry.describe(), r#"10:country("US")"#);
    }

    #[test]
    fn test_describe_is_ordered() {
        let mut registry = PlacementRegistry::new();
        registry.register(PlacementId::new(30), NodeFilter::AcceptAll);
        registry.register(PlacementId::new(12), NodeFilter::DenyAll);
        assert_eq!(registry.describe(), "12:exclude(all());30:all()");
    }

    #[test]
    fn test_register_expression() {
        let mut registry = builtins();
        registry
            .register_expression(PlacementId::new(40), r#"country("eea") && placement(5)"#)
            .unwrap();
        assert!(registry.matches(PlacementId::new(40), &node(CountryCode::NO)));

        assert!(registry
            .register_expression(PlacementId::new(41), "nothing()")
            .is_err());
        assert!(!registry.contains(PlacementId::new(41)));
    }

    #[test]
    fn test_chained_placements_stop_at_depth_limit() {
        let mut registry = builtins();
        registry.load_definitions("10:exclude(all())").unwrap();
        // each link adds one exclude() around the previous placement
        for id in 11..=72 {
            registry
                .load_definitions(&format!("{id}:exclude(placement({}))", id - 1))
                .unwrap();
        }
        assert_eq!(registry.lookup(PlacementId::new(72)).depth(), expr::MAX_DEPTH);

        let err = registry
            .register_expression(PlacementId::new(73), "exclude(placement(72))")
            .unwrap_err();
        assert_eq!(
            err,
            ExpressionError::TooDeep {
                depth: expr::MAX_DEPTH + 1,
                limit: expr::MAX_DEPTH
            }
        );
        assert!(!registry.contains(PlacementId::new(73)));
    }

    #[test]
    fn test_from_str() {
        let registry: PlacementRegistry = r#"10:country("us")"#.parse().unwrap();
        assert!(registry.contains(PlacementId::EVERY_COUNTRY));
        assert!(registry.contains(PlacementId::NR));
        assert!(registry.contains(PlacementId::new(10)));
        assert_eq!(
            registry.ids().len(),
            7,
            "default, five legacy rules and the definition"
        );
    }
}
