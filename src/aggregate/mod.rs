//! Aggregation pipelines: a closed set of validated stages run in order over a collection.

mod exec;
mod expr;
mod stage;

pub use exec::aggregate;
pub use expr::{Expr, parse_expr};
pub use stage::{Accumulator, GroupStage, Pipeline, ProjectField, ProjectStage, Stage};
