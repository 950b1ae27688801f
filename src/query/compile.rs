//! Validation pass that turns a caller-built [`Filter`] into a tree ready for evaluation.
//!
//! Every caller-input problem (bad paths, bad regexes, operands that cannot be ordered, `$`
//! outside element-match) surfaces here, so evaluation itself can stay infallible.

use crate::errors::DbError;
use bson::Bson;
use regex::Regex;
use std::fmt;

use super::path::FieldPath;
use super::types::{CmpOp, Filter, MAX_FILTER_DEPTH, MAX_IN_SET};

#[derive(Debug, Clone)]
pub enum CompiledFilter {
    All,
    And(Vec<CompiledFilter>),
    Or(Vec<CompiledFilter>),
    Not(Box<CompiledFilter>),
    Cmp { path: FieldPath, op: CmpOp, value: Bson },
    In { path: FieldPath, values: Vec<Bson> },
    Regex { path: FieldPath, regex: Regex },
    /// `needle` is already lower-cased.
    Text { path: FieldPath, needle: String },
    ElemMatch { path: FieldPath, filter: Box<CompiledFilter> },
}

/// Compiles `filter` for evaluation against top-level records.
///
/// # Errors
/// `InvalidFieldPath`, `InvalidRegex` or `InvalidQuery` describing the first problem found.
pub fn compile(filter: &Filter) -> Result<CompiledFilter, DbError> {
    compile_at(filter, false, 0)
}

fn compile_at(filter: &Filter, in_element: bool, depth: usize) -> Result<CompiledFilter, DbError> {
    if depth > MAX_FILTER_DEPTH {
        return Err(DbError::InvalidQuery(format!("filter nested deeper than {MAX_FILTER_DEPTH}")));
    }
    let children = |fs: &[Filter]| {
        fs.iter().map(|f| compile_at(f, in_element, depth + 1)).collect::<Result<Vec<_>, _>>()
    };
    Ok(match filter {
        Filter::All => CompiledFilter::All,
        Filter::And(fs) => CompiledFilter::And(children(fs)?),
        Filter::Or(fs) => CompiledFilter::Or(children(fs)?),
        Filter::Not(inner) => CompiledFilter::Not(Box::new(compile_at(inner, in_element, depth + 1)?)),
        Filter::Cmp { path, op, value } => {
            if *op != CmpOp::Eq && !is_orderable(value) {
                return Err(DbError::InvalidQuery(format!(
                    "`{path} {} {value}`: operand cannot be ordered",
                    op.symbol()
                )));
            }
            CompiledFilter::Cmp { path: scoped_path(path, in_element)?, op: *op, value: value.clone() }
        }
        Filter::In { path, values } => {
            if values.len() > MAX_IN_SET {
                return Err(DbError::InvalidQuery(format!(
                    "`{path} in [...]` has {} values, at most {MAX_IN_SET} allowed",
                    values.len()
                )));
            }
            CompiledFilter::In { path: scoped_path(path, in_element)?, values: values.clone() }
        }
        Filter::Regex { path, pattern } => {
            let regex = Regex::new(pattern)
                .map_err(|source| DbError::InvalidRegex { pattern: pattern.clone(), source })?;
            CompiledFilter::Regex { path: scoped_path(path, in_element)?, regex }
        }
        Filter::Text { path, query } => {
            CompiledFilter::Text { path: scoped_path(path, in_element)?, needle: query.to_lowercase() }
        }
        Filter::ElemMatch { path, filter } => CompiledFilter::ElemMatch {
            path: scoped_path(path, in_element)?,
            filter: Box::new(compile_at(filter, true, depth + 1)?),
        },
    })
}

fn scoped_path(raw: &str, in_element: bool) -> Result<FieldPath, DbError> {
    let path = FieldPath::parse(raw)?;
    if path.is_element() && !in_element {
        return Err(DbError::invalid_path(raw, "`$` is only valid inside elemMatch"));
    }
    Ok(path)
}

const fn is_orderable(v: &Bson) -> bool {
    matches!(
        v,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::String(_) | Bson::DateTime(_) | Bson::Boolean(_)
    )
}

impl fmt::Display for CompiledFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = |f: &mut fmt::Formatter<'_>, name: &str, fs: &[Self]| -> fmt::Result {
            write!(f, "{name}(")?;
            for (i, inner) in fs.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{inner}")?;
            }
            f.write_str(")")
        };
        match self {
            Self::All => f.write_str("ALL"),
            Self::And(fs) => list(f, "and", fs),
            Self::Or(fs) => list(f, "or", fs),
            Self::Not(inner) => write!(f, "not({inner})"),
            Self::Cmp { path, op, value } => write!(f, "{path} {} {value}", op.symbol()),
            Self::In { path, values } => {
                write!(f, "{path} in [")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
            Self::Regex { path, regex } => write!(f, "{path} =~ /{}/", regex.as_str()),
            Self::Text { path, needle } => write!(f, "{path} contains {needle:?}"),
            Self::ElemMatch { path, filter } => write!(f, "{path} elemMatch({filter})"),
        }
    }
}
