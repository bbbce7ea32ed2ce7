//! Core types for the placement policy engine.
//!
//! This module defines the identifiers shared by every part of the system:
//! placement identifiers, which name a data-residency policy, and node
//! identifiers, which name a storage node (or the signer of a node tag).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Identifier of a placement policy.
///
/// Identifiers up to [`PlacementId::RESERVED_MAX`] are reserved for the
/// built-in and legacy rules and are hidden from external listings.
/// Everything above is user-defined.
///
/// # Examples
///
/// ```
/// use placement_core::types::PlacementId;
///
/// let id: PlacementId = "12".parse().unwrap();
/// assert!(!id.is_reserved());
/// assert!(PlacementId::EU.is_reserved());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlacementId(u16);

impl PlacementId {
    /// Nodes from every country are accepted.
    pub const EVERY_COUNTRY: PlacementId = PlacementId(0);
    /// Member states of the European Union.
    pub const EU: PlacementId = PlacementId(1);
    /// European Economic Area (EU plus Iceland, Liechtenstein and Norway).
    pub const EEA: PlacementId = PlacementId(2);
    /// United States only.
    pub const US: PlacementId = PlacementId(3);
    /// Germany only.
    pub const DE: PlacementId = PlacementId(4);
    /// Every known country except Russia and Belarus.
    pub const NR: PlacementId = PlacementId(5);

    /// Highest identifier reserved for built-in rules.
    pub const RESERVED_MAX: u16 = 9;

    /// Creates a placement identifier.
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    /// Returns the numeric value.
    pub const fn get(self) -> u16 {
        self.0
    }

    /// Returns true for identifiers reserved for built-in rules.
    pub const fn is_reserved(self) -> bool {
        self.0 <= Self::RESERVED_MAX
    }
}

impl fmt::Display for PlacementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<u16> for PlacementId {
    fn from(id: u16) -> Self {
        Self(id)
    }
}

impl From<PlacementId> for u16 {
    fn from(id: PlacementId) -> Self {
        id.0
    }
}

impl FromStr for PlacementId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u16>().map(Self)
    }
}

/// Length of a node identifier in bytes.
pub const NODE_ID_LEN: usize = 32;

/// Identifier of a storage node.
///
/// The textual form is 64 hexadecimal characters. Tags attached to a node
/// are attested by a signer, which is also identified by a `NodeId`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NodeId([u8; NODE_ID_LEN]);

impl NodeId {
    /// Creates a node identifier from raw bytes.
    pub const fn from_bytes(bytes: [u8; NODE_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; NODE_ID_LEN] {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self)
    }
}

/// Error returned when a node identifier cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid node id {value:?}: {reason}")]
pub struct NodeIdParseError {
    pub value: String,
    pub reason: String,
}

impl FromStr for NodeId {
    type Err = NodeIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; NODE_ID_LEN];
        hex::decode_to_slice(s.trim(), &mut bytes).map_err(|e| NodeIdParseError {
            value: s.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self(bytes))
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
