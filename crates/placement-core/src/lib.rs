//! # Placement Core
//!
//! Core types, error handling, and configuration for the placement policy
//! engine.
//!
//! - **Types**: `PlacementId` (with the reserved built-in identifiers) and
//!   `NodeId`.
//! - **Errors**: `thiserror` enums covering definition parsing, expression
//!   evaluation, configuration and I/O failures.
//! - **Configuration**: YAML application configuration with environment
//!   variable overrides and validation.
//!
//! ## Example
//!
//! ```
//! use placement_core::types::PlacementId;
//!
//! let id = PlacementId::new(10);
//! assert!(!id.is_reserved());
//! assert_eq!(id.to_string(), "10");
//! ```

pub mod config;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use error::{ExpressionError, ParseError, PlacementError, Result};
pub use types::{NodeId, PlacementId};
