//! Grouped verb evaluation over [`tidyframe_columnar`] tables.
//!
//! A [`Frame`] is a table plus its grouping. The verbs ([`filter`], [`arrange`], [`mutate`],
//! [`summarise`]) evaluate an [`Expr`] once per group and reassemble the results; [`join`]
//! combines two tables on equality keys.
//!
//! Expressions are either named operations (`sum`, `mean`, `min`, `max`, `count`, the rank
//! family, `cumsum`, comparisons) or arbitrary callables. Named operations go through the
//! [`HybridDispatcher`], which runs a native kernel when one is registered for the operation and
//! input type; everything else runs through [`GenericApply`]. Both paths produce identical
//! results.
//!
//! ```
//! use tidyframe_columnar::{Column, Table, Value};
//! use tidyframe_engine::{summarise, Expr, Frame};
//!
//! let table = Table::new(vec![
//!     Column::int("id", [Some(1), Some(2), Some(3)]),
//!     Column::string("g", [Some("a"), Some("a"), Some("b")]),
//! ])
//! .unwrap();
//! let grouped = Frame::grouped(table, &["g"]).unwrap();
//! let out = summarise(&grouped, "n", &Expr::n()).unwrap();
//! assert_eq!(out.table().value(0, "n"), Some(Value::Int(2)));
//! ```

#![forbid(unsafe_code)]

mod apply;
mod dispatch;
mod error;
mod expr;
mod frame;
mod group_index;
mod join;
mod kernels;
mod key;
mod ops;
mod options;
pub mod parallel;
mod verbs;

pub use crate::apply::{Evaluated, GenericApply};
pub use crate::dispatch::{Dispatch, HybridDispatcher, KernelError, KernelFn, KernelSpec};
pub use crate::error::{BoxError, EngineError, EngineResult, EvalFailure, GroupKey};
pub use crate::expr::{
    Args, Callable, CmpOp, Expr, ExprBody, NullPolicy, Op, OpKind, Output, SortOrder, TieBreak,
};
pub use crate::frame::{Frame, Grouping};
pub use crate::group_index::GroupIndex;
pub use crate::join::{JoinEngine, JoinKind, JoinPlan};
pub use crate::options::EngineOptions;
pub use crate::verbs::{SortKey, VerbEngine};

use tidyframe_columnar::Table;

/// Partition `table` by `keys`.
pub fn group_index<S: AsRef<str>>(table: &Table, keys: &[S]) -> EngineResult<GroupIndex> {
    Ok(GroupIndex::build(table, keys)?)
}

pub fn filter(frame: &Frame, predicate: &Expr) -> EngineResult<Frame> {
    VerbEngine::default().filter(frame, predicate)
}

pub fn arrange(frame: &Frame, keys: &[SortKey]) -> EngineResult<Frame> {
    VerbEngine::default().arrange(frame, keys)
}

pub fn mutate(frame: &Frame, name: &str, expr: &Expr) -> EngineResult<Frame> {
    VerbEngine::default().mutate(frame, name, expr)
}

pub fn summarise(frame: &Frame, name: &str, expr: &Expr) -> EngineResult<Frame> {
    VerbEngine::default().summarise(frame, name, expr)
}

pub fn join(left: &Table, right: &Table, plan: &JoinPlan) -> EngineResult<Table> {
    Ok(JoinEngine::new(plan).join(left, right)?)
}
