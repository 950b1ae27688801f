use bson::Bson;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

// Safety limits to prevent resource abuse
pub(crate) const MAX_IN_SET: usize = 1000;
pub(crate) const MAX_SORT_FIELDS: usize = 8;
pub(crate) const MAX_PROJECTION_FIELDS: usize = 64;
pub(crate) const MAX_FILTER_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub order: Order,
}

/// Cooperative cancellation flag shared between a caller and the cursors it started.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Options for `find_docs`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FindOptions {
    pub projection: Option<Vec<String>>,
    pub sort: Option<Vec<SortSpec>>,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(skip)]
    pub cancel: Option<CancellationToken>,
}

impl FindOptions {
    /// Options that order results by a single key.
    #[must_use]
    pub fn sort(field: impl Into<String>, order: Order) -> Self {
        Self::default().then_sort(field, order)
    }

    /// Options that skip `offset` matches and return at most `count` of the rest.
    #[must_use]
    pub fn limit(offset: usize, count: usize) -> Self {
        Self::default().with_limit(offset, count)
    }

    /// Appends a sort key; earlier keys take precedence.
    #[must_use]
    pub fn then_sort(mut self, field: impl Into<String>, order: Order) -> Self {
        self.sort.get_or_insert_with(Vec::new).push(SortSpec { field: field.into(), order });
        self
    }

    #[must_use]
    pub fn with_limit(mut self, offset: usize, count: usize) -> Self {
        self.skip = Some(offset);
        self.limit = Some(count);
        self
    }

    #[must_use]
    pub fn with_projection<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }
}

/// A predicate over records. Build these with the helpers in [`crate::query::filters`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Filter {
    #[default]
    All,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Cmp { path: String, op: CmpOp, value: Bson },
    In { path: String, values: Vec<Bson> },
    Regex { path: String, pattern: String },
    Text { path: String, query: String },
    ElemMatch { path: String, filter: Box<Filter> },
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("ALL"),
            Self::And(fs) => write_list(f, "and", fs),
            Self::Or(fs) => write_list(f, "or", fs),
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
            Self::Regex { path, pattern } => write!(f, "{path} =~ /{pattern}/"),
            Self::Text { path, query } => write!(f, "{path} contains {query:?}"),
            Self::ElemMatch { path, filter } => write!(f, "{path} elemMatch({filter})"),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, name: &str, filters: &[Filter]) -> fmt::Result {
    write!(f, "{name}(")?;
    for (i, inner) in filters.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{inner}")?;
    }
    f.write_str(")")
}

#[derive(Debug, Default, Clone)]
pub struct UpdateDoc {
    pub set: Vec<(String, Bson)>,
    pub inc: Vec<(String, f64)>,
    pub unset: Vec<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub matched: u64,
    pub modified: u64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: u64,
}
