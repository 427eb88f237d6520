//! Native kernels over contiguous typed buffers.
//!
//! Each kernel gathers its partition into a `Vec<i64>`/`Vec<f64>`/`Vec<bool>` plus validity and
//! then works without per-cell dynamic dispatch. Results must match [`crate::ops`] exactly.

use std::cmp::Ordering;

use tidyframe_columnar::{total_cmp_f64, BitVec, ColumnView, DataType, Value};

use crate::dispatch::KernelError;
use crate::error::EvalFailure;
use crate::expr::{Args, NullPolicy, Op, Output, SortOrder, TieBreak};
use crate::ops::{assign_ranks, compare_values};

enum Buffer {
    Int(Vec<i64>, BitVec),
    Float(Vec<f64>, BitVec),
    Bool(Vec<bool>, BitVec),
}

impl Buffer {
    fn gather(op: &Op, view: &ColumnView<'_>) -> Result<Self, KernelError> {
        let gathered = match view.data_type() {
            DataType::Int => view.i64_buffer().map(|(v, m)| Buffer::Int(v, m)),
            DataType::Float => view.f64_buffer().map(|(v, m)| Buffer::Float(v, m)),
            DataType::Bool => view.bool_buffer().map(|(v, m)| Buffer::Bool(v, m)),
            _ => None,
        };
        gathered.ok_or_else(|| unsupported(op, view))
    }

    fn validity(&self) -> &BitVec {
        match self {
            Buffer::Int(_, m) | Buffer::Float(_, m) | Buffer::Bool(_, m) => m,
        }
    }

    fn has_nulls(&self) -> bool {
        self.validity().count_zeros() > 0
    }

    /// Integer view of an int or bool buffer.
    fn into_ints(self) -> Option<(Vec<i64>, BitVec)> {
        match self {
            Buffer::Int(v, m) => Some((v, m)),
            Buffer::Bool(v, m) => Some((v.into_iter().map(i64::from).collect(), m)),
            Buffer::Float(..) => None,
        }
    }
}

fn unsupported(op: &Op, view: &ColumnView<'_>) -> KernelError {
    KernelError::UnsupportedType {
        op: op.name(),
        data_type: view.data_type(),
    }
}

fn input<'b, 'a>(args: &'b Args<'a>) -> Result<&'b ColumnView<'a>, KernelError> {
    args.column(0).ok_or(KernelError::Eval(EvalFailure::Length {
        expected: 1,
        actual: 0,
    }))
}

fn null_policy(op: &Op) -> NullPolicy {
    match op {
        Op::Sum(n) | Op::Mean(n) | Op::Min(n) | Op::Max(n) => *n,
        _ => NullPolicy::Skip,
    }
}

pub(crate) fn sum(op: &Op, args: &Args<'_>) -> Result<Output, KernelError> {
    let view = input(args)?;
    let buffer = Buffer::gather(op, view)?;
    if null_policy(op) == NullPolicy::Propagate && buffer.has_nulls() {
        return Ok(Output::Scalar(Value::Null));
    }
    let value = match buffer {
        Buffer::Float(values, validity) => {
            let mut acc = 0.0;
            for idx in validity.iter_ones() {
                acc += values[idx];
            }
            Value::Float(acc)
        }
        other => {
            let Some((values, _)) = other.into_ints() else {
                return Err(unsupported(op, view));
            };
            // Null slots hold zero.
            let acc = values
                .iter()
                .try_fold(0i64, |acc, &v| acc.checked_add(v))
                .ok_or(EvalFailure::Overflow { op: "sum" })?;
            Value::Int(acc)
        }
    };
    Ok(Output::Scalar(value))
}

pub(crate) fn mean(op: &Op, args: &Args<'_>) -> Result<Output, KernelError> {
    let view = input(args)?;
    let buffer = Buffer::gather(op, view)?;
    if null_policy(op) == NullPolicy::Propagate && buffer.has_nulls() {
        return Ok(Output::Scalar(Value::Null));
    }
    let (acc, count) = match &buffer {
        Buffer::Int(values, validity) => fold_mean(validity, |idx| values[idx] as f64),
        Buffer::Float(values, validity) => fold_mean(validity, |idx| values[idx]),
        Buffer::Bool(values, validity) => {
            fold_mean(validity, |idx| if values[idx] { 1.0 } else { 0.0 })
        }
    };
    Ok(Output::Scalar(if count == 0 {
        Value::Null
    } else {
        Value::Float(acc / count as f64)
    }))
}

fn fold_mean(validity: &BitVec, read: impl Fn(usize) -> f64) -> (f64, usize) {
    let mut acc = 0.0;
    let mut count = 0;
    for idx in validity.iter_ones() {
        acc += read(idx);
        count += 1;
    }
    (acc, count)
}

pub(crate) fn min(op: &Op, args: &Args<'_>) -> Result<Output, KernelError> {
    extreme(op, args, Ordering::Less)
}

pub(crate) fn max(op: &Op, args: &Args<'_>) -> Result<Output, KernelError> {
    extreme(op, args, Ordering::Greater)
}

fn extreme(op: &Op, args: &Args<'_>, keep: Ordering) -> Result<Output, KernelError> {
    let view = input(args)?;
    let buffer = Buffer::gather(op, view)?;
    if null_policy(op) == NullPolicy::Propagate && buffer.has_nulls() {
        return Ok(Output::Scalar(Value::Null));
    }
    let value = match &buffer {
        Buffer::Int(values, validity) => {
            pick(validity, |a, b| values[a].cmp(&values[b]), keep).map(|i| Value::Int(values[i]))
        }
        Buffer::Bool(values, validity) => pick(validity, |a, b| values[a].cmp(&values[b]), keep)
            .map(|i| Value::Bool(values[i])),
        Buffer::Float(values, validity) => {
            if validity.iter_ones().any(|idx| values[idx].is_nan()) {
                Some(Value::Float(f64::NAN))
            } else {
                pick(validity, |a, b| total_cmp_f64(values[a], values[b]), keep)
                    .map(|i| Value::Float(values[i]))
            }
        }
    };
    Ok(Output::Scalar(value.unwrap_or(Value::Null)))
}

/// Position of the first valid extreme.
fn pick(
    validity: &BitVec,
    cmp: impl Fn(usize, usize) -> Ordering,
    keep: Ordering,
) -> Option<usize> {
    let mut best: Option<usize> = None;
    for idx in validity.iter_ones() {
        match best {
            Some(current) if cmp(idx, current) != keep => {}
            _ => best = Some(idx),
        }
    }
    best
}

/// Row count when nullary, non-null count otherwise. Valid for every column type.
pub(crate) fn count(_op: &Op, args: &Args<'_>) -> Result<Output, KernelError> {
    let n = match args.column(0) {
        None => args.len(),
        Some(view) => view.len() - view.null_count(),
    };
    Ok(Output::Scalar(Value::Int(n as i64)))
}

pub(crate) fn rank(op: &Op, args: &Args<'_>) -> Result<Output, KernelError> {
    let view = input(args)?;
    let Op::Rank { ties, order } = op else {
        return Err(unsupported(op, view));
    };
    let buffer = Buffer::gather(op, view)?;
    let ranks = match &buffer {
        Buffer::Int(values, validity) => {
            rank_by(validity, *ties, *order, |a, b| values[a].cmp(&values[b]))
        }
        Buffer::Float(values, validity) => rank_by(validity, *ties, *order, |a, b| {
            total_cmp_f64(values[a], values[b])
        }),
        Buffer::Bool(values, validity) => {
            rank_by(validity, *ties, *order, |a, b| values[a].cmp(&values[b]))
        }
    };
    Ok(Output::Series(ranks))
}

fn rank_by(
    validity: &BitVec,
    ties: TieBreak,
    order: SortOrder,
    cmp: impl Fn(usize, usize) -> Ordering,
) -> Vec<Value> {
    let ordering = |a: usize, b: usize| match order {
        SortOrder::Ascending => cmp(a, b),
        SortOrder::Descending => cmp(a, b).reverse(),
    };
    let mut sorted: Vec<usize> = validity.iter_ones().collect();
    sorted.sort_by(|&a, &b| ordering(a, b));
    assign_ranks(&sorted, validity.len(), ties, |a, b| {
        ordering(a, b) == Ordering::Equal
    })
}

pub(crate) fn cumsum(op: &Op, args: &Args<'_>) -> Result<Output, KernelError> {
    let view = input(args)?;
    let buffer = Buffer::gather(op, view)?;
    let len = buffer.validity().len();
    let mut out = Vec::with_capacity(len);
    match buffer {
        Buffer::Float(values, validity) => {
            let mut acc = 0.0;
            for idx in 0..len {
                if !validity.get(idx) {
                    break;
                }
                acc += values[idx];
                out.push(Value::Float(acc));
            }
        }
        other => {
            let Some((values, validity)) = other.into_ints() else {
                return Err(unsupported(op, view));
            };
            let mut acc = 0i64;
            for idx in 0..len {
                if !validity.get(idx) {
                    break;
                }
                acc = acc
                    .checked_add(values[idx])
                    .ok_or(EvalFailure::Overflow { op: "cumsum" })?;
                out.push(Value::Int(acc));
            }
        }
    }
    out.resize(len, Value::Null);
    Ok(Output::Series(out))
}

/// Whether the compare kernel covers this column type and right-hand side.
pub(crate) fn compare_accepts(op: &Op, input: Option<DataType>) -> bool {
    let Op::Compare { rhs, .. } = op else {
        return false;
    };
    matches!(
        (input, rhs),
        (
            Some(DataType::Int | DataType::Float | DataType::Bool),
            Value::Null
        ) | (
            Some(DataType::Int | DataType::Float),
            Value::Int(_) | Value::Float(_)
        ) | (Some(DataType::Bool), Value::Bool(_))
    )
}

pub(crate) fn compare(op: &Op, args: &Args<'_>) -> Result<Output, KernelError> {
    let view = input(args)?;
    let Op::Compare { op: cmp, rhs } = op else {
        return Err(unsupported(op, view));
    };
    let buffer = Buffer::gather(op, view)?;
    let len = buffer.validity().len();
    if rhs.is_null() {
        return Ok(Output::Series(vec![Value::Null; len]));
    }
    let mut out = Vec::with_capacity(len);
    for idx in 0..len {
        if !buffer.validity().get(idx) {
            out.push(Value::Null);
            continue;
        }
        let ord = match (&buffer, rhs) {
            (Buffer::Int(values, _), Value::Int(r)) => Some(values[idx].cmp(r)),
            (Buffer::Int(values, _), Value::Float(r)) => (values[idx] as f64).partial_cmp(r),
            (Buffer::Float(values, _), Value::Float(r)) => values[idx].partial_cmp(r),
            (Buffer::Float(values, _), Value::Int(r)) => values[idx].partial_cmp(&(*r as f64)),
            (Buffer::Bool(values, _), Value::Bool(r)) => Some(values[idx].cmp(r)),
            (Buffer::Int(values, _), _) => {
                incomparable(&Value::Int(values[idx]), view, rhs)?
            }
            (Buffer::Float(values, _), _) => {
                incomparable(&Value::Float(values[idx]), view, rhs)?
            }
            (Buffer::Bool(values, _), _) => {
                incomparable(&Value::Bool(values[idx]), view, rhs)?
            }
        };
        out.push(Value::Bool(cmp.test(ord)));
    }
    Ok(Output::Series(out))
}

/// Fallback for pairs the registry guard should have routed elsewhere.
fn incomparable(
    left: &Value,
    view: &ColumnView<'_>,
    rhs: &Value,
) -> Result<Option<Ordering>, KernelError> {
    compare_values(left, rhs).ok_or_else(|| {
        KernelError::Eval(EvalFailure::Incomparable {
            left: view.data_type(),
            right: rhs.data_type().unwrap_or(DataType::Bool),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::CmpOp;
    use pretty_assertions::assert_eq;
    use tidyframe_columnar::Column;

    fn run(
        kernel: fn(&Op, &Args<'_>) -> Result<Output, KernelError>,
        op: Op,
        column: &Column,
        rows: &[usize],
    ) -> Result<Output, KernelError> {
        let view = ColumnView::with_rows(column, rows);
        kernel(&op, &Args::new(vec![view], rows.len()))
    }

    #[test]
    fn sum_over_partition_rows() {
        let col = Column::int("x", [Some(1), Some(10), None, Some(100)]);
        let out = run(sum, Op::Sum(NullPolicy::Skip), &col, &[3, 2, 0]).unwrap();
        assert_eq!(out, Output::Scalar(Value::Int(101)));
    }

    #[test]
    fn sum_of_bools_counts_true() {
        let col = Column::boolean("b", [Some(true), Some(false), Some(true), None]);
        let out = run(sum, Op::Sum(NullPolicy::Skip), &col, &[0, 1, 2, 3]).unwrap();
        assert_eq!(out, Output::Scalar(Value::Int(2)));
    }

    #[test]
    fn sum_rejects_strings() {
        let col = Column::string("s", [Some("a")]);
        let err = run(sum, Op::Sum(NullPolicy::Skip), &col, &[0]).unwrap_err();
        assert_eq!(
            err,
            KernelError::UnsupportedType {
                op: "sum",
                data_type: DataType::Str
            }
        );
    }

    #[test]
    fn max_with_nan_is_nan() {
        let col = Column::float("x", [Some(1.0), Some(f64::NAN), Some(3.0)]);
        let out = run(max, Op::Max(NullPolicy::Skip), &col, &[0, 1, 2]).unwrap();
        match out {
            Output::Scalar(Value::Float(v)) => assert!(v.is_nan()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn min_of_empty_partition_is_null() {
        let col = Column::int("x", [Some(1)]);
        let out = run(min, Op::Min(NullPolicy::Skip), &col, &[]).unwrap();
        assert_eq!(out, Output::Scalar(Value::Null));
    }

    #[test]
    fn descending_dense_rank() {
        let col = Column::float("x", [Some(1.0), Some(3.0), Some(3.0), None]);
        let op = Op::Rank {
            ties: TieBreak::Dense,
            order: SortOrder::Descending,
        };
        let out = run(rank, op, &col, &[0, 1, 2, 3]).unwrap();
        assert_eq!(
            out,
            Output::Series(vec![
                Value::Int(2),
                Value::Int(1),
                Value::Int(1),
                Value::Null
            ])
        );
    }

    #[test]
    fn cumsum_overflow_is_reported() {
        let col = Column::int("x", [Some(i64::MAX), Some(1)]);
        let err = run(cumsum, Op::CumSum, &col, &[0, 1]).unwrap_err();
        assert_eq!(
            err,
            KernelError::Eval(EvalFailure::Overflow { op: "cumsum" })
        );
    }

    #[test]
    fn compare_guard_rejects_string_rhs() {
        let op = Op::Compare {
            op: CmpOp::Eq,
            rhs: Value::from("a"),
        };
        assert!(!compare_accepts(&op, Some(DataType::Int)));
        let op = Op::Compare {
            op: CmpOp::Le,
            rhs: Value::Int(2),
        };
        assert!(compare_accepts(&op, Some(DataType::Float)));
        assert!(!compare_accepts(&op, Some(DataType::Str)));
    }
}
