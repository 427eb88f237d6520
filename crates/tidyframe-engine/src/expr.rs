//! Already-resolved expressions: referenced column names plus either a named operation (which
//! the dispatcher may fast-path) or an arbitrary callable.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use tidyframe_columnar::{ColumnView, DataType, Value};

use crate::error::BoxError;
use crate::ops;

/// Result of evaluating an expression over one partition.
#[derive(Clone, Debug, PartialEq)]
pub enum Output {
    Scalar(Value),
    Series(Vec<Value>),
}

impl Output {
    pub fn len(&self) -> usize {
        match self {
            Output::Scalar(_) => 1,
            Output::Series(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Column slices handed to an expression for one partition.
#[derive(Clone, Debug)]
pub struct Args<'a> {
    views: Vec<ColumnView<'a>>,
    rows: usize,
}

impl<'a> Args<'a> {
    pub fn new(views: Vec<ColumnView<'a>>, rows: usize) -> Self {
        Self { views, rows }
    }

    /// Number of rows in the partition.
    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn views(&self) -> &[ColumnView<'a>] {
        &self.views
    }

    pub fn column(&self, idx: usize) -> Option<&ColumnView<'a>> {
        self.views.get(idx)
    }

    pub fn get(&self, name: &str) -> Option<&ColumnView<'a>> {
        self.views.iter().find(|v| v.name() == name)
    }
}

pub type Callable = Arc<dyn Fn(&Args<'_>) -> Result<Output, BoxError> + Send + Sync>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum NullPolicy {
    /// Ignore null inputs.
    #[default]
    Skip,
    /// Any null input makes the result null.
    Propagate,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// How tied values share ranks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TieBreak {
    /// Mean of the tied positions (`rank`).
    Average,
    /// Lowest tied position (`min_rank`).
    Min,
    /// Highest tied position.
    Max,
    /// Row order decides (`row_number`).
    First,
    /// Consecutive ranks without gaps (`dense_rank`).
    Dense,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    /// Apply to a (possibly undefined, e.g. `NaN`) ordering.
    pub fn test(self, ord: Option<Ordering>) -> bool {
        match self {
            CmpOp::Eq => ord == Some(Ordering::Equal),
            CmpOp::Ne => ord != Some(Ordering::Equal),
            CmpOp::Lt => ord == Some(Ordering::Less),
            CmpOp::Le => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
            CmpOp::Gt => ord == Some(Ordering::Greater),
            CmpOp::Ge => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
    Sum,
    Mean,
    Min,
    Max,
    Count,
    Rank,
    CumSum,
    Compare,
}

/// Named operations known to the dispatcher.
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    Sum(NullPolicy),
    Mean(NullPolicy),
    Min(NullPolicy),
    Max(NullPolicy),
    /// Row count when nullary, non-null count with one column.
    Count,
    Rank { ties: TieBreak, order: SortOrder },
    CumSum,
    Compare { op: CmpOp, rhs: Value },
}

impl Op {
    pub fn kind(&self) -> OpKind {
        match self {
            Op::Sum(_) => OpKind::Sum,
            Op::Mean(_) => OpKind::Mean,
            Op::Min(_) => OpKind::Min,
            Op::Max(_) => OpKind::Max,
            Op::Count => OpKind::Count,
            Op::Rank { .. } => OpKind::Rank,
            Op::CumSum => OpKind::CumSum,
            Op::Compare { .. } => OpKind::Compare,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Op::Sum(_) => "sum",
            Op::Mean(_) => "mean",
            Op::Min(_) => "min",
            Op::Max(_) => "max",
            Op::Count => "count",
            Op::Rank { ties, .. } => match ties {
                TieBreak::Average => "rank",
                TieBreak::Min => "min_rank",
                TieBreak::Max => "max_rank",
                TieBreak::First => "row_number",
                TieBreak::Dense => "dense_rank",
            },
            Op::CumSum => "cumsum",
            Op::Compare { .. } => "compare",
        }
    }

    /// Result type for a given input column type (`None` for nullary use).
    pub fn output_type(&self, input: Option<DataType>) -> DataType {
        match self {
            Op::Sum(_) | Op::CumSum => match input {
                Some(DataType::Float) => DataType::Float,
                _ => DataType::Int,
            },
            Op::Mean(_) => DataType::Float,
            Op::Min(_) | Op::Max(_) => match input {
                Some(t) => t,
                None => DataType::Float,
            },
            Op::Count => DataType::Int,
            Op::Rank { ties, .. } => match ties {
                TieBreak::Average => DataType::Float,
                _ => DataType::Int,
            },
            Op::Compare { .. } => DataType::Bool,
        }
    }

    fn with_nulls(self, nulls: NullPolicy) -> Op {
        match self {
            Op::Sum(_) => Op::Sum(nulls),
            Op::Mean(_) => Op::Mean(nulls),
            Op::Min(_) => Op::Min(nulls),
            Op::Max(_) => Op::Max(nulls),
            other => other,
        }
    }
}

#[derive(Clone)]
pub enum ExprBody {
    Op(Op),
    Call(Callable),
}

/// How the result column type is chosen when per-group values cannot decide it alone.
#[derive(Clone, Debug, PartialEq)]
enum Typing {
    Infer,
    Fixed(DataType),
    LikeOp(Op),
}

/// An expression over named columns.
#[derive(Clone)]
pub struct Expr {
    columns: Vec<String>,
    body: ExprBody,
    typing: Typing,
}

impl Expr {
    fn op(columns: Vec<String>, op: Op) -> Self {
        Self {
            columns,
            typing: Typing::LikeOp(op.clone()),
            body: ExprBody::Op(op),
        }
    }

    fn unary(column: impl Into<String>, op: Op) -> Self {
        Self::op(vec![column.into()], op)
    }

    pub fn sum(column: impl Into<String>) -> Self {
        Self::unary(column, Op::Sum(NullPolicy::Skip))
    }

    pub fn mean(column: impl Into<String>) -> Self {
        Self::unary(column, Op::Mean(NullPolicy::Skip))
    }

    pub fn min(column: impl Into<String>) -> Self {
        Self::unary(column, Op::Min(NullPolicy::Skip))
    }

    pub fn max(column: impl Into<String>) -> Self {
        Self::unary(column, Op::Max(NullPolicy::Skip))
    }

    /// Number of rows in the group.
    pub fn n() -> Self {
        Self::op(Vec::new(), Op::Count)
    }

    /// Number of non-null values of `column` in the group.
    pub fn count(column: impl Into<String>) -> Self {
        Self::unary(column, Op::Count)
    }

    pub fn rank(column: impl Into<String>, ties: TieBreak) -> Self {
        Self::unary(
            column,
            Op::Rank {
                ties,
                order: SortOrder::Ascending,
            },
        )
    }

    pub fn min_rank(column: impl Into<String>) -> Self {
        Self::rank(column, TieBreak::Min)
    }

    pub fn dense_rank(column: impl Into<String>) -> Self {
        Self::rank(column, TieBreak::Dense)
    }

    pub fn row_number(column: impl Into<String>) -> Self {
        Self::rank(column, TieBreak::First)
    }

    pub fn cumsum(column: impl Into<String>) -> Self {
        Self::unary(column, Op::CumSum)
    }

    pub fn compare(column: impl Into<String>, op: CmpOp, rhs: impl Into<Value>) -> Self {
        Self::unary(
            column,
            Op::Compare {
                op,
                rhs: rhs.into(),
            },
        )
    }

    /// An arbitrary per-group function over the named columns.
    pub fn call<S, F>(columns: impl IntoIterator<Item = S>, f: F) -> Self
    where
        S: Into<String>,
        F: Fn(&Args<'_>) -> Result<Output, BoxError> + Send + Sync + 'static,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            body: ExprBody::Call(Arc::new(f)),
            typing: Typing::Infer,
        }
    }

    /// Rank in descending order (no effect on other operations).
    pub fn descending(mut self) -> Self {
        if let ExprBody::Op(Op::Rank { ties, .. }) = &self.body {
            let op = Op::Rank {
                ties: *ties,
                order: SortOrder::Descending,
            };
            self.typing = Typing::LikeOp(op.clone());
            self.body = ExprBody::Op(op);
        }
        self
    }

    /// Make sum/mean/min/max return null when any input is null.
    pub fn propagate_nulls(mut self) -> Self {
        if let ExprBody::Op(op) = &self.body {
            let op = op.clone().with_nulls(NullPolicy::Propagate);
            self.typing = Typing::LikeOp(op.clone());
            self.body = ExprBody::Op(op);
        }
        self
    }

    /// Declare the result type of a callable (used when every group returns null, and to
    /// validate results).
    pub fn with_output_type(mut self, data_type: DataType) -> Self {
        self.typing = Typing::Fixed(data_type);
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn body(&self) -> &ExprBody {
        &self.body
    }

    pub fn as_op(&self) -> Option<&Op> {
        match &self.body {
            ExprBody::Op(op) => Some(op),
            ExprBody::Call(_) => None,
        }
    }

    /// Declared result type given the input column types, if any.
    pub fn result_type(&self, inputs: &[DataType]) -> Option<DataType> {
        match &self.typing {
            Typing::Infer => None,
            Typing::Fixed(t) => Some(*t),
            Typing::LikeOp(op) => Some(op.output_type(inputs.first().copied())),
        }
    }

    /// The same computation forced through the generic path: a named operation becomes a
    /// callable running its reference implementation. Callables are returned unchanged.
    pub fn to_generic(&self) -> Expr {
        match &self.body {
            ExprBody::Call(_) => self.clone(),
            ExprBody::Op(op) => {
                let op = op.clone();
                let typing = self.typing.clone();
                let call = move |args: &Args<'_>| -> Result<Output, BoxError> {
                    ops::eval_generic(&op, args).map_err(Into::into)
                };
                Self {
                    columns: self.columns.clone(),
                    body: ExprBody::Call(Arc::new(call)),
                    typing,
                }
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cols = self.columns.join(", ");
        match &self.body {
            ExprBody::Op(Op::Compare { op, rhs }) => write!(f, "{cols} {} {rhs}", op.symbol()),
            ExprBody::Op(Op::Rank {
                order: SortOrder::Descending,
                ..
            }) => write!(f, "{}(desc({cols}))", self.as_op().map_or("", Op::name)),
            ExprBody::Op(op) => write!(f, "{}({cols})", op.name()),
            ExprBody::Call(_) => write!(f, "<callable>({cols})"),
        }
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expr")
            .field("columns", &self.columns)
            .field("op", &self.as_op())
            .field("typing", &self.typing)
            .finish()
    }
}
