use crate::document::{BsonFieldResolver, FieldResolver};
use bson::{Bson, Document as BsonDocument};
use std::cmp::Ordering;

use super::compile::CompiledFilter;
use super::path::{FieldPath, Resolved};
use super::types::CmpOp;

/// What paths resolve against: a whole record, or one array element inside element-match.
#[derive(Clone, Copy)]
enum Target<'a> {
    Record(&'a BsonDocument),
    Element(&'a Bson),
}

impl<'a> Target<'a> {
    fn resolve(self, resolver: &dyn FieldResolver, path: &FieldPath) -> Resolved<'a> {
        match self {
            Self::Record(doc) => resolver.resolve(doc, path),
            Self::Element(value) => resolver.resolve_value(value, path),
        }
    }
}

/// Evaluates `filter` against `doc` with the default BSON resolver.
#[must_use]
pub fn eval_filter(doc: &BsonDocument, filter: &CompiledFilter) -> bool {
    matches(&BsonFieldResolver, doc, filter)
}

/// Evaluates `filter` against `doc`. Pure: shape mismatches are "no match", never errors.
pub fn matches(resolver: &dyn FieldResolver, doc: &BsonDocument, filter: &CompiledFilter) -> bool {
    eval(resolver, Target::Record(doc), filter)
}

fn eval(resolver: &dyn FieldResolver, target: Target<'_>, filter: &CompiledFilter) -> bool {
    match filter {
        CompiledFilter::All => true,
        CompiledFilter::And(fs) => fs.iter().all(|f| eval(resolver, target, f)),
        CompiledFilter::Or(fs) => fs.iter().any(|f| eval(resolver, target, f)),
        CompiledFilter::Not(f) => !eval(resolver, target, f),
        CompiledFilter::Cmp { path, op, value } => {
            target.resolve(resolver, path).leaves().into_iter().any(|leaf| cmp_matches(leaf, *op, value))
        }
        CompiledFilter::In { path, values } => target
            .resolve(resolver, path)
            .leaves()
            .into_iter()
            .any(|leaf| values.iter().any(|v| values_equal(leaf, v))),
        CompiledFilter::Regex { path, regex } => target
            .resolve(resolver, path)
            .leaves()
            .into_iter()
            .any(|leaf| matches!(leaf, Bson::String(s) if regex.is_match(s))),
        CompiledFilter::Text { path, needle } => target
            .resolve(resolver, path)
            .leaves()
            .into_iter()
            .any(|leaf| matches!(leaf, Bson::String(s) if s.to_lowercase().contains(needle.as_str()))),
        CompiledFilter::ElemMatch { path, filter } => target
            .resolve(resolver, path)
            .arrays()
            .into_iter()
            .flatten()
            .any(|elem| eval(resolver, Target::Element(elem), filter)),
    }
}

fn cmp_matches(leaf: &Bson, op: CmpOp, value: &Bson) -> bool {
    if op == CmpOp::Eq {
        return values_equal(leaf, value);
    }
    let Some(ord) = compare_values(leaf, value) else {
        return false;
    };
    match op {
        CmpOp::Gt => ord == Ordering::Greater,
        CmpOp::Gte => ord != Ordering::Less,
        CmpOp::Lt => ord == Ordering::Less,
        CmpOp::Lte => ord != Ordering::Greater,
        CmpOp::Eq => ord == Ordering::Equal,
    }
}

#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Real(f64),
}

fn as_num(v: &Bson) -> Option<Num> {
    match v {
        Bson::Int32(i) => Some(Num::Int(i64::from(*i))),
        Bson::Int64(i) => Some(Num::Int(*i)),
        Bson::Double(f) => Some(Num::Real(*f)),
        _ => None,
    }
}

/// Exact comparison of an integer against a real; `None` when the real is NaN.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn cmp_int_real(i: i64, r: f64) -> Option<Ordering> {
    // 2^63 is exactly representable; anything at or past it is out of i64 range
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if r.is_nan() {
        return None;
    }
    if r >= LIMIT {
        return Some(Ordering::Less);
    }
    if r < -LIMIT {
        return Some(Ordering::Greater);
    }
    let whole = r.trunc();
    // in range and integral, so the cast is exact
    match i.cmp(&(whole as i64)) {
        Ordering::Equal if r > whole => Some(Ordering::Less),
        Ordering::Equal if r < whole => Some(Ordering::Greater),
        ord => Some(ord),
    }
}

fn cmp_num(a: Num, b: Num) -> Option<Ordering> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => Some(x.cmp(&y)),
        (Num::Real(x), Num::Real(y)) => x.partial_cmp(&y),
        (Num::Int(x), Num::Real(y)) => cmp_int_real(x, y),
        (Num::Real(x), Num::Int(y)) => cmp_int_real(y, x).map(Ordering::reverse),
    }
}

/// Equality used by `eq` and `in`: numbers compare by value across integer and real kinds,
/// everything else by BSON equality.
#[must_use]
pub fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (as_num(a), as_num(b)) {
        (Some(x), Some(y)) => cmp_num(x, y) == Some(Ordering::Equal),
        (None, None) => a == b,
        _ => false,
    }
}

/// Order used by `gt`/`gte`/`lt`/`lte`. `None` for kinds that are not mutually ordered.
#[must_use]
pub fn compare_values(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_num(a), as_num(b)) {
        return cmp_num(x, y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

const fn sort_rank(v: Option<&Bson>) -> u8 {
    match v {
        Some(Bson::Boolean(_)) => 0,
        Some(Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)) => 1,
        Some(Bson::String(_)) => 2,
        Some(Bson::DateTime(_)) => 3,
        Some(Bson::Array(_)) => 4,
        Some(Bson::Document(_)) => 5,
        Some(Bson::Null) => 7,
        None => 8,
        Some(_) => 6,
    }
}

/// Total ascending order for sort keys: booleans, numbers (NaN last), strings, timestamps,
/// arrays, records, other kinds, null, then absent.
#[must_use]
pub fn compare_for_sort(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    let by_rank = sort_rank(a).cmp(&sort_rank(b));
    if by_rank != Ordering::Equal {
        return by_rank;
    }
    let (Some(a), Some(b)) = (a, b) else {
        return Ordering::Equal;
    };
    match (a, b) {
        (Bson::Array(x), Bson::Array(y)) => x
            .iter()
            .zip(y)
            .map(|(p, q)| compare_for_sort(Some(p), Some(q)))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Bson::Document(x), Bson::Document(y)) => x
            .iter()
            .zip(y)
            .map(|((ka, va), (kb, vb))| ka.cmp(kb).then_with(|| compare_for_sort(Some(va), Some(vb))))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => match (as_num(a), as_num(b)) {
            (Some(x), Some(y)) => cmp_num(x, y).unwrap_or_else(|| nan_last(x).cmp(&nan_last(y))),
            _ => compare_values(a, b).unwrap_or(Ordering::Equal),
        },
    }
}

fn nan_last(n: Num) -> bool {
    matches!(n, Num::Real(f) if f.is_nan())
}
