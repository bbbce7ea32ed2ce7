//! Rule expression language
//!
//! A placement rule is a small expression such as
//! `country("eu") && exclude(country("de"))`. Expressions are tokenized,
//! parsed into an [`Expr`] tree and evaluated against a fixed table of
//! builtin functions. There are no variables, no user-defined functions and
//! no access to anything outside the placements registered so far.

pub mod eval;
pub mod lexer;
pub mod parser;

pub use eval::{Builtin, Evaluator, PlacementLookup, Value};
pub use parser::{parse, Expr, MAX_DEPTH};

use crate::rules::NodeFilter;
use placement_core::ExpressionError;

/// Parse and evaluate `src`, which must produce a filter.
///
/// ```
/// use placement_filter::expr::{self, PlacementLookup};
/// use placement_filter::rules::NodeFilter;
/// use placement_core::PlacementId;
///
/// struct Nothing;
/// impl PlacementLookup for Nothing {
///     fn registered(&self, _: PlacementId) -> Option<&NodeFilter> {
///         None
///     }
/// }
///
/// let filter = expr::evaluate(r#"country("us") && exclude(placement(12))"#, &Nothing).unwrap();
/// assert!(matches!(filter, NodeFilter::All(_)));
/// ```
pub fn evaluate<L>(src: &str, placements: &L) -> Result<NodeFilter, ExpressionError>
where
    L: PlacementLookup + ?Sized,
{
    let expr = parse(src)?;
    let filter = Evaluator::new(placements).filter(&expr)?;
    check_depth(&filter)?;
    Ok(filter)
}

/// Reject a filter whose rendering would nest deeper than [`MAX_DEPTH`].
///
/// `placement(id)` copies the referenced filter in, so a filter can end up
/// deeper than the expression that built it.
pub fn check_depth(filter: &NodeFilter) -> Result<(), ExpressionError> {
    let depth = filter.depth();
    if depth > MAX_DEPTH {
        return Err(ExpressionError::TooDeep {
            depth,
            limit: MAX_DEPTH,
        });
    }
    Ok(())
}
