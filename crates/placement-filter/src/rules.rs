//! Node filter rules
//!
//! Provides the closed set of filters placements are built from. Filters
//! are immutable values; composing them always produces a new filter.
//!
//! Every filter renders back to the rule expression syntax through
//! `Display`, so a described registry can be loaded again.

use crate::country::{CountryCode, CountrySet};
use placement_core::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

/// Result of a filter evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterResult {
    /// Node is eligible
    Pass,
    /// Node is rejected
    Block,
}

impl FilterResult {
    /// Check if the result is Pass
    #[inline]
    pub fn is_pass(&self) -> bool {
        matches!(self, FilterResult::Pass)
    }

    /// Check if the result is Block
    #[inline]
    pub fn is_block(&self) -> bool {
        matches!(self, FilterResult::Block)
    }
}

impl From<bool> for FilterResult {
    #[inline]
    fn from(pass: bool) -> Self {
        if pass {
            FilterResult::Pass
        } else {
            FilterResult::Block
        }
    }
}

/// Trait for filter rules
pub trait FilterRule: Send + Sync {
    /// Evaluate the filter against a candidate node
    fn evaluate(&self, node: &NodeAttributes) -> FilterResult;

    /// Get a human-readable description of this filter
    fn describe(&self) -> String;
}

/// Tags attested for a node, keyed by `(signer, key)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeTags {
    tags: BTreeMap<NodeId, BTreeMap<String, Vec<u8>>>,
}

impl NodeTags {
    /// Create an empty tag set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a tag
    pub fn insert(&mut self, signer: NodeId, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.tags
            .entry(signer)
            .or_default()
            .insert(key.into(), value.into());
    }

    /// Raw value of the tag `key` signed by `signer`
    pub fn get(&self, signer: &NodeId, key: &str) -> Option<&[u8]> {
        self.tags
            .get(signer)
            .and_then(|by_key| by_key.get(key))
            .map(Vec::as_slice)
    }

    /// Number of tags
    pub fn len(&self) -> usize {
        self.tags.values().map(BTreeMap::len).sum()
    }

    /// Returns true if no tags are present
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// The view of a candidate node needed for matching.
///
/// Supplied by the caller for every match; filters never fetch or cache it.
#[derive(Debug, Clone, Default)]
pub struct NodeAttributes {
    /// Node identifier
    pub id: NodeId,
    /// Country the node is located in
    pub country: CountryCode,
    /// Signed tags
    pub tags: NodeTags,
}

impl NodeAttributes {
    /// Create attributes for a node without tags
    pub fn new(id: NodeId, country: CountryCode) -> Self {
        Self {
            id,
            country,
            tags: NodeTags::new(),
        }
    }

    /// Attach a tag signed by `signer`
    #[must_use]
    pub fn with_tag(
        mut self,
        signer: NodeId,
        key: impl Into<String>,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        self.tags.insert(signer, key, value);
        self
    }
}

/// Filter by country membership
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryFilter {
    /// Accepted countries
    pub countries: CountrySet,
}

impl CountryFilter {
    /// Create a new country filter
    pub fn new(countries: CountrySet) -> Self {
        Self { countries }
    }
}

impl FilterRule for CountryFilter {
    #[inline]
    fn evaluate(&self, node: &NodeAttributes) -> FilterResult {
        self.countries.contains(node.country).into()
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CountryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tokens = self.countries.to_tokens();
        if tokens.is_empty() {
            // country() needs at least one token; an empty set matches nothing.
            return f.write_str("exclude(all())");
        }
        f.write_str("country(")?;
        for (i, token) in tokens.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write_quoted(f, token)?;
        }
        f.write_str(")")
    }
}

/// How a tag value is compared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagMatch {
    /// Tag value equals the expected value
    Equal,
    /// Tag value differs from the expected value
    NotEqual,
}

/// Filter by a tag attested for the node
///
/// A node that lacks the tag never matches, whatever the comparison mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFilter {
    signer: NodeId,
    key: String,
    value: Vec<u8>,
    mode: TagMatch,
}

impl TagFilter {
    /// Tag must be present with exactly `value`
    pub fn equal(signer: NodeId, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            signer,
            key: key.into(),
            value: value.into(),
            mode: TagMatch::Equal,
        }
    }

    /// Tag must be present with a non-empty value
    pub fn not_empty(signer: NodeId, key: impl Into<String>) -> Self {
        Self {
            signer,
            key: key.into(),
            value: Vec::new(),
            mode: TagMatch::NotEqual,
        }
    }

    /// Identity that signed the tag
    pub fn signer(&self) -> &NodeId {
        &self.signer
    }

    /// Tag key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Expected raw value
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Comparison mode
    pub fn mode(&self) -> TagMatch {
        self.mode
    }

    /// Check the tag of a node
    #[inline]
    pub fn matches(&self, node: &NodeAttributes) -> bool {
        match node.tags.get(&self.signer, &self.key) {
            Some(actual) => match self.mode {
                TagMatch::Equal => actual == self.value.as_slice(),
                TagMatch::NotEqual => actual != self.value.as_slice(),
            },
            None => false,
        }
    }
}

impl FilterRule for TagFilter {
    #[inline]
    fn evaluate(&self, node: &NodeAttributes) -> FilterResult {
        self.matches(node).into()
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TagFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("tag(")?;
        write_quoted(f, &self.signer.to_string())?;
        f.write_str(",")?;
        write_quoted(f, &self.key)?;
        f.write_str(",")?;
        match (self.mode, std::str::from_utf8(&self.value)) {
            (TagMatch::NotEqual, _) => f.write_str("notEmpty()")?,
            (TagMatch::Equal, Ok(text)) => write_quoted(f, text)?,
            (TagMatch::Equal, Err(_)) => write_byte_string(f, &self.value)?,
        }
        f.write_str(")")
    }
}

/// Descriptive metadata attached to a filter
///
/// Annotations are carried for reporting only and never influence matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Annotation {
    pub key: String,
    pub value: String,
}

impl Annotation {
    /// Key holding the human-readable name of a rule
    pub const NAME: &'static str = "name";

    /// Create a new annotation
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("annotation(")?;
        write_quoted(f, &self.key)?;
        f.write_str(",")?;
        write_quoted(f, &self.value)?;
        f.write_str(")")
    }
}

/// A node selection filter
///
/// ```
/// use placement_filter::country::{CountryCode, CountrySet};
/// use placement_filter::rules::{NodeAttributes, NodeFilter};
///
/// let eu_but_germany = NodeFilter::country(CountrySet::from_tokens(&["eu"]).unwrap())
///     .and(NodeFilter::country(CountrySet::new(&[CountryCode::DE])).exclude());
///
/// let node = NodeAttributes { country: CountryCode::FR, ..Default::default() };
/// assert!(eu_but_germany.matches(&node));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeFilter {
    /// Every node matches
    AcceptAll,
    /// No node matches
    DenyAll,
    /// Node country is in the set
    Country(CountryFilter),
    /// Node carries a matching tag
    Tag(TagFilter),
    /// Every member matches; an empty list matches every node
    All(Vec<NodeFilter>),
    /// The wrapped filter does not match
    Exclude(Box<NodeFilter>),
    /// The wrapped filter, with descriptive metadata
    Annotated {
        filter: Box<NodeFilter>,
        annotations: Vec<Annotation>,
    },
}

impl NodeFilter {
    /// Country membership filter
    pub fn country(countries: CountrySet) -> Self {
        NodeFilter::Country(CountryFilter::new(countries))
    }

    /// Conjunction of all given filters, flattening nested conjunctions
    pub fn all<I: IntoIterator<Item = NodeFilter>>(filters: I) -> Self {
        let mut members = Vec::new();
        for filter in filters {
            match filter {
                NodeFilter::All(inner) => members.extend(inner),
                other => members.push(other),
            }
        }
        NodeFilter::All(members)
    }

    /// Conjunction of `self` and `other`, flattened
    #[must_use]
    pub fn and(self, other: NodeFilter) -> Self {
        Self::all([self, other])
    }

    /// Complement of `self`
    #[must_use]
    pub fn exclude(self) -> Self {
        NodeFilter::Exclude(Box::new(self))
    }

    /// Attach annotations to `self`
    #[must_use]
    pub fn annotated(self, annotations: Vec<Annotation>) -> Self {
        NodeFilter::Annotated {
            filter: Box::new(self),
            annotations,
        }
    }

    /// Annotations attached at the top level
    pub fn annotations(&self) -> &[Annotation] {
        match self {
            NodeFilter::Annotated { annotations, .. } => annotations,
            _ => &[],
        }
    }

    /// Value of the first top-level annotation with `key`
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations()
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }

    /// Nesting depth of the rendered expression, counted in calls
    pub fn depth(&self) -> usize {
        match self {
            NodeFilter::AcceptAll => 1,
            // exclude(all())
            NodeFilter::DenyAll => 2,
            NodeFilter::Country(filter) if filter.countries.is_empty() => 2,
            NodeFilter::Country(_) => 1,
            NodeFilter::Tag(filter) => match filter.mode {
                TagMatch::Equal => 1,
                TagMatch::NotEqual => 2,
            },
            NodeFilter::All(filters) => 1 + filters.iter().map(NodeFilter::depth).max().unwrap_or(0),
            NodeFilter::Exclude(filter) => 1 + filter.depth(),
            NodeFilter::Annotated {
                filter,
                annotations,
            } => 1 + filter.depth().max(usize::from(!annotations.is_empty())),
        }
    }

    /// Check whether a node is eligible
    pub fn matches(&self, node: &NodeAttributes) -> bool {
        match self {
            NodeFilter::AcceptAll => true,
            NodeFilter::DenyAll => false,
            NodeFilter::Country(filter) => filter.countries.contains(node.country),
            NodeFilter::Tag(filter) => filter.matches(node),
            NodeFilter::All(filters) => filters.iter().all(|f| f.matches(node)),
            NodeFilter::Exclude(filter) => !filter.matches(node),
            NodeFilter::Annotated { filter, .. } => filter.matches(node),
        }
    }
}

impl FilterRule for NodeFilter {
    #[inline]
    fn evaluate(&self, node: &NodeAttributes) -> FilterResult {
        self.matches(node).into()
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for NodeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeFilter::AcceptAll => f.write_str("all()"),
            NodeFilter::DenyAll => f.write_str("exclude(all())"),
            NodeFilter::Country(filter) => fmt::Display::fmt(filter, f),
            NodeFilter::Tag(filter) => fmt::Display::fmt(filter, f),
            NodeFilter::All(filters) => {
                f.write_str("all(")?;
                for (i, filter) in filters.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    fmt::Display::fmt(filter, f)?;
                }
                f.write_str(")")
            }
            NodeFilter::Exclude(filter) => write!(f, "exclude({})", filter),
            NodeFilter::Annotated {
                filter,
                annotations,
            } => {
                write!(f, "annotated({}", filter)?;
                for annotation in annotations {
                    write!(f, ", {}", annotation)?;
                }
                f.write_str(")")
            }
        }
    }
}

impl From<CountryFilter> for NodeFilter {
    fn from(filter: CountryFilter) -> Self {
        NodeFilter::Country(filter)
    }
}

impl From<TagFilter> for NodeFilter {
    fn from(filter: TagFilter) -> Self {
        NodeFilter::Tag(filter)
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_char('"')?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c if c.is_ascii_control() => write!(f, "\\x{:02x}", c as u32)?,
            c => f.write_char(c)?,
        }
    }
    f.write_char('"')
}

fn write_byte_string(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    f.write_str("b\"")?;
    for &b in bytes {
        match b {
            b'"' => f.write_str("\\\"")?,
            b'\\' => f.write_str("\\\\")?,
            0x20..=0x7e => f.write_char(b as char)?,
            _ => write!(f, "\\x{:02x}", b)?,
        }
    }
    f.write_char('"')
}
