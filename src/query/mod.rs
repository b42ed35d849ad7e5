//! Filters, find options, updates and their execution against a collection.

mod cursor;
mod eval;
mod exec;
mod explain;
mod parse;
mod types;

pub use cursor::Cursor;
pub use eval::{bson_equal, compare_bson, compare_docs, eval_filter, get_path, project_fields};
pub use exec::{
    AccessPath, ExecStats, apply_update, count_docs, delete_many, delete_one, execute_find,
    find_docs, update_many, update_one,
};
pub use explain::{ExecutionStats, ExplainReport, InputStage, QueryPlanner, WinningPlan, explain};
pub use parse::{
    document_from_json, filter_from_document, filter_to_document, parse_filter_json, parse_update_json,
    projection_from_document, sort_from_document, update_from_document,
};
pub use types::{
    CmpOp, DeleteReport, Filter, FindOptions, Order, Projection, SortSpec, UpdateDoc, UpdateReport,
};

pub(crate) use eval::{as_f64, insert_path};
pub(crate) use exec::log_event;
pub(crate) use types::MAX_LIMIT;
