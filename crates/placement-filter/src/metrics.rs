//! Metrics for placement loading and lookup
//!
//! Recorded through the `metrics` facade; the embedding process decides
//! whether and where they are exported.

use metrics::{counter, describe_counter, describe_gauge, gauge};
use std::sync::Once;

/// Entries registered from definition text or placement files
pub const DEFINITIONS_LOADED: &str = "placement_definitions_loaded_total";
/// Entries that failed to evaluate
pub const DEFINITION_ERRORS: &str = "placement_definition_errors_total";
/// Lookups that fell back to deny-all
pub const LOOKUP_FALLBACK: &str = "placement_lookup_fallback_total";
/// Size of the registry after the last load
pub const RULES_REGISTERED: &str = "placement_rules_registered";

static DESCRIBE: Once = Once::new();

/// Register metric descriptions with the installed recorder.
pub fn describe() {
    DESCRIBE.call_once(|| {
        describe_counter!(DEFINITIONS_LOADED, "Placement definitions registered from text or placement files");
        describe_counter!(DEFINITION_ERRORS, "Placement definition entries that failed to load");
        describe_counter!(
            LOOKUP_FALLBACK,
            "Lookups of unregistered placements resolved to deny-all"
        );
        describe_gauge!(RULES_REGISTERED, "Rules held by the most recently built registry");
    });
}

pub(crate) fn record_definition_loaded() {
    counter!(DEFINITIONS_LOADED).increment(1);
}

pub(crate) fn record_definition_error() {
    counter!(DEFINITION_ERRORS).increment(1);
}

pub(crate) fn record_lookup_fallback() {
    counter!(LOOKUP_FALLBACK).increment(1);
}

pub(crate) fn record_rules_registered(count: usize) {
    gauge!(RULES_REGISTERED).set(count as f64);
}
