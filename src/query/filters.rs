//! Constructors for the filter algebra.
//!
//! ```
//! use objrepo::query::Filter;
//! use objrepo::query::filters::{and, elem_match, eq, gte};
//! let f = elem_match("productScores", and([eq("product", "xyz"), gte("score", 8)]));
//! assert!(matches!(f, Filter::ElemMatch { .. }));
//! ```

use super::types::{CmpOp, Filter};
use bson::Bson;

/// Accepts every record.
pub const ALL: Filter = Filter::All;

fn cmp(path: impl Into<String>, op: CmpOp, value: impl Into<Bson>) -> Filter {
    Filter::Cmp { path: path.into(), op, value: value.into() }
}

pub fn eq(path: impl Into<String>, value: impl Into<Bson>) -> Filter {
    cmp(path, CmpOp::Eq, value)
}

pub fn gt(path: impl Into<String>, value: impl Into<Bson>) -> Filter {
    cmp(path, CmpOp::Gt, value)
}

pub fn gte(path: impl Into<String>, value: impl Into<Bson>) -> Filter {
    cmp(path, CmpOp::Gte, value)
}

pub fn lt(path: impl Into<String>, value: impl Into<Bson>) -> Filter {
    cmp(path, CmpOp::Lt, value)
}

pub fn lte(path: impl Into<String>, value: impl Into<Bson>) -> Filter {
    cmp(path, CmpOp::Lte, value)
}

/// Set membership. Named `in_` because `in` is reserved.
pub fn in_<I, V>(path: impl Into<String>, values: I) -> Filter
where
    I: IntoIterator<Item = V>,
    V: Into<Bson>,
{
    Filter::In { path: path.into(), values: values.into_iter().map(Into::into).collect() }
}

/// Unanchored, case-sensitive match using the `regex` crate's syntax.
pub fn regex(path: impl Into<String>, pattern: impl Into<String>) -> Filter {
    Filter::Regex { path: path.into(), pattern: pattern.into() }
}

/// Case-insensitive substring match.
pub fn text(path: impl Into<String>, query: impl Into<String>) -> Filter {
    Filter::Text { path: path.into(), query: query.into() }
}

pub fn elem_match(path: impl Into<String>, filter: Filter) -> Filter {
    Filter::ElemMatch { path: path.into(), filter: Box::new(filter) }
}

pub fn and<I: IntoIterator<Item = Filter>>(filters: I) -> Filter {
    Filter::And(filters.into_iter().collect())
}

pub fn or<I: IntoIterator<Item = Filter>>(filters: I) -> Filter {
    Filter::Or(filters.into_iter().collect())
}

pub fn not(filter: Filter) -> Filter {
    Filter::Not(Box::new(filter))
}
