//! Placement file format
//!
//! Placements can be kept in a YAML file instead of (or in addition to) a
//! definition string:
//!
//! ```yaml
//! legacy_defaults: true
//! placements:
//!   - id: 10
//!     name: us-only
//!     rule: country("us")
//!   - id: 11
//!     rule: placement(1) && exclude(country("de"))
//!     enabled: false
//! ```
//!
//! Entries are applied in file order, so `placement(id)` in a rule sees the
//! entries above it.

use crate::expr;
use crate::metrics;
use crate::registry::PlacementRegistry;
use crate::rules::{Annotation, NodeFilter};
use placement_core::error::{ConfigError, ParseError, Result};
use placement_core::{ExpressionError, PlacementId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// One placement in the file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementEntryConfig {
    /// Placement identifier
    pub id: PlacementId,
    /// Human-readable name, attached as the `name` annotation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Rule expression
    pub rule: String,
    /// Whether this placement is registered
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_legacy_defaults() -> bool {
    true
}

impl PlacementEntryConfig {
    /// Create an enabled entry
    pub fn new(id: u16, rule: impl Into<String>) -> Self {
        Self {
            id: PlacementId::new(id),
            name: None,
            rule: rule.into(),
            enabled: true,
        }
    }

    /// Set the entry name
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Validate the entry
    pub fn validate(&self) -> Result<()> {
        if self.rule.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                format!("placements[{}].rule", self.id),
                "rule cannot be empty",
            )
            .into());
        }
        if matches!(&self.name, Some(name) if name.trim().is_empty()) {
            return Err(ConfigError::invalid_value(
                format!("placements[{}].name", self.id),
                "name cannot be blank",
            )
            .into());
        }
        Ok(())
    }

    /// Evaluate the rule against `registry` and register it there.
    pub fn register_into(&self, registry: &mut PlacementRegistry) -> std::result::Result<(), ParseError> {
        let filter = self.build(registry).map_err(|source| {
            metrics::record_definition_error();
            ParseError::definition(format!("{}:{}", self.id, self.rule), source)
        })?;
        debug!(placement = %self.id, filter = %filter, "Placement registered from file");
        metrics::record_definition_loaded();
        registry.register(self.id, filter);
        Ok(())
    }

    fn build(&self, registry: &PlacementRegistry) -> std::result::Result<NodeFilter, ExpressionError> {
        let filter = expr::evaluate(&self.rule, registry)?;
        match &self.name {
            Some(name) => {
                let filter = filter.annotated(vec![Annotation::new(Annotation::NAME, name.as_str())]);
                expr::check_depth(&filter)?;
                Ok(filter)
            }
            None => Ok(filter),
        }
    }
}

/// Complete placement file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementConfig {
    /// Register the built-in legacy rules before the file's placements
    #[serde(default = "default_legacy_defaults")]
    pub legacy_defaults: bool,
    /// Placements in application order
    #[serde(default)]
    pub placements: Vec<PlacementEntryConfig>,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            legacy_defaults: true,
            placements: Vec::new(),
        }
    }
}

impl PlacementConfig {
    /// Load and validate a placement file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path.display().to_string()).into());
        }
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let config = Self::from_yaml(&contents)?;

        info!(
            path = %path.display(),
            placement_count = config.placements.len(),
            legacy_defaults = config.legacy_defaults,
            "Loaded placement configuration"
        );

        Ok(config)
    }

    /// Parse and validate a placement document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PlacementConfig =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::InvalidFormat {
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let mut seen_ids = HashSet::new();
        for entry in &self.placements {
            if !seen_ids.insert(entry.id) {
                return Err(ConfigError::DuplicatePlacement { id: entry.id.get() }.into());
            }
            entry.validate()?;
        }
        Ok(())
    }

    /// Register the enabled placements into `registry`, in file order.
    ///
    /// Stops at the first failing entry; earlier entries stay registered.
    /// Returns the number of placements registered.
    pub fn apply(&self, registry: &mut PlacementRegistry) -> std::result::Result<usize, ParseError> {
        let mut applied = 0;
        for entry in &self.placements {
            if !entry.enabled {
                info!(placement = %entry.id, "Skipping disabled placement");
                continue;
            }
            if let Err(err) = entry.register_into(registry) {
                metrics::record_rules_registered(registry.len());
                return Err(err);
            }
            applied += 1;
        }
        metrics::record_rules_registered(registry.len());
        Ok(applied)
    }

    /// Build a registry holding the default rule, the legacy rules when
    /// enabled, and the file's placements.
    pub fn into_registry(self) -> Result<PlacementRegistry> {
        let mut registry = PlacementRegistry::new();
        registry.register_default();
        if self.legacy_defaults {
            registry.register_legacy_defaults();
        }
        self.apply(&mut registry)?;
        Ok(registry)
    }

    /// Save the configuration to a YAML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self).map_err(|e| ConfigError::InvalidFormat {
            reason: e.to_string(),
        })?;
        fs::write(path, yaml)?;

        info!(path = %path.display(), "Saved placement configuration");
        Ok(())
    }

    /// Example configuration
    pub fn example() -> Self {
        Self {
            legacy_defaults: true,
            placements: vec![
                PlacementEntryConfig::new(10, r#"country("us")"#).named("us-only"),
                PlacementEntryConfig::new(11, r#"placement(1) && exclude(country("de"))"#)
                    .named("eu-without-germany"),
                PlacementEntryConfig::new(12, r#"country("all", "!ru", "!by", "none")"#)
                    .named("no-sanctioned"),
            ],
        }
    }
}
