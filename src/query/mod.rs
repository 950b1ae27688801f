// Telemetry is a submodule of query
pub mod telemetry;

pub mod compile;
mod cursor;
mod eval;
mod exec;
pub mod filters;
pub mod path;
mod types;
pub(crate) mod update;

pub use compile::{CompiledFilter, compile};
pub use cursor::{Cursor, ObjectCursor};
pub use eval::{compare_for_sort, compare_values, eval_filter, matches, values_equal};
pub use exec::{count_docs, delete_many, delete_one, find_docs, replace_many, update_many, update_one};
pub use path::{FieldPath, Resolved};
pub use types::{
    CancellationToken, CmpOp, DeleteReport, Filter, FindOptions, Order, SortSpec, UpdateDoc, UpdateReport,
};
pub use update::apply_update;
