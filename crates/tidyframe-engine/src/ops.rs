//! Reference implementations of the named operations over dynamically typed values.
//!
//! These run for every input type and define the results the typed kernels in
//! [`crate::kernels`] must reproduce exactly, including summation order, null handling and the
//! errors raised.

use std::cmp::Ordering;
use std::sync::Arc;

use tidyframe_columnar::{BitVec, ColumnView, DataType, Value};

use crate::error::EvalFailure;
use crate::expr::{Args, CmpOp, NullPolicy, Op, Output, SortOrder, TieBreak};

pub(crate) fn eval_generic(op: &Op, args: &Args<'_>) -> Result<Output, EvalFailure> {
    let Some(view) = args.column(0) else {
        // Only `count` is meaningful without a column.
        return Ok(Output::Scalar(Value::Int(args.len() as i64)));
    };
    match op {
        Op::Sum(nulls) => sum(view, *nulls).map(Output::Scalar),
        Op::Mean(nulls) => mean(view, *nulls).map(Output::Scalar),
        Op::Min(nulls) => extreme(view, *nulls, Ordering::Less).map(Output::Scalar),
        Op::Max(nulls) => extreme(view, *nulls, Ordering::Greater).map(Output::Scalar),
        Op::Count => Ok(Output::Scalar(Value::Int(
            (view.len() - view.null_count()) as i64,
        ))),
        Op::Rank { ties, order } => Ok(Output::Series(rank(view, *ties, *order))),
        Op::CumSum => cumsum(view).map(Output::Series),
        Op::Compare { op, rhs } => compare(view, *op, rhs).map(Output::Series),
    }
}

fn sum(view: &ColumnView<'_>, nulls: NullPolicy) -> Result<Value, EvalFailure> {
    if nulls == NullPolicy::Propagate && view.null_count() > 0 {
        return Ok(Value::Null);
    }
    match view.data_type() {
        DataType::Int | DataType::Bool => {
            let mut acc: i64 = 0;
            for value in view.iter() {
                let v = match value {
                    Value::Int(v) => v,
                    Value::Bool(b) => i64::from(b),
                    _ => continue,
                };
                acc = acc
                    .checked_add(v)
                    .ok_or(EvalFailure::Overflow { op: "sum" })?;
            }
            Ok(Value::Int(acc))
        }
        DataType::Float => {
            let mut acc = 0.0;
            for value in view.iter() {
                if let Value::Float(v) = value {
                    acc += v;
                }
            }
            Ok(Value::Float(acc))
        }
        data_type => Err(EvalFailure::NonNumeric {
            op: "sum",
            data_type,
        }),
    }
}

fn mean(view: &ColumnView<'_>, nulls: NullPolicy) -> Result<Value, EvalFailure> {
    let data_type = view.data_type();
    if !matches!(data_type, DataType::Int | DataType::Float | DataType::Bool) {
        return Err(EvalFailure::NonNumeric {
            op: "mean",
            data_type,
        });
    }
    if nulls == NullPolicy::Propagate && view.null_count() > 0 {
        return Ok(Value::Null);
    }
    let mut acc = 0.0;
    let mut count = 0usize;
    for value in view.iter() {
        if let Some(v) = value.as_f64() {
            acc += v;
            count += 1;
        }
    }
    Ok(if count == 0 {
        Value::Null
    } else {
        Value::Float(acc / count as f64)
    })
}

/// `min` when `keep` is `Less`, `max` when `Greater`. The first of several equal extremes wins
/// and any `NaN` makes the result `NaN`.
fn extreme(
    view: &ColumnView<'_>,
    nulls: NullPolicy,
    keep: Ordering,
) -> Result<Value, EvalFailure> {
    if nulls == NullPolicy::Propagate && view.null_count() > 0 {
        return Ok(Value::Null);
    }
    if let Some((codes, validity, levels)) = view.code_buffer() {
        let mut best: Option<u32> = None;
        for idx in validity.iter_ones() {
            let code = codes[idx];
            match best {
                Some(current) if code.cmp(&current) != keep => {}
                _ => best = Some(code),
            }
        }
        return Ok(best.map_or(Value::Null, |code| Value::Str(levels[code as usize].clone())));
    }
    let mut best: Option<Value> = None;
    for value in view.iter() {
        match &value {
            Value::Null => continue,
            Value::Float(v) if v.is_nan() => return Ok(value),
            _ => {}
        }
        let replace = match &best {
            None => true,
            Some(current) => value.cmp_same_kind(current) == Some(keep),
        };
        if replace {
            best = Some(value);
        }
    }
    Ok(best.unwrap_or(Value::Null))
}

fn rank(view: &ColumnView<'_>, ties: TieBreak, order: SortOrder) -> Vec<Value> {
    // Categorical cells rank by level position.
    let values: Vec<Value> = match view.code_buffer() {
        Some((codes, validity, _)) => codes
            .iter()
            .enumerate()
            .map(|(idx, &code)| {
                if validity.get(idx) {
                    Value::Int(i64::from(code))
                } else {
                    Value::Null
                }
            })
            .collect(),
        None => view.iter().collect(),
    };
    let ordering = |a: usize, b: usize| {
        let ord = values[a]
            .cmp_same_kind(&values[b])
            .unwrap_or(Ordering::Equal);
        match order {
            SortOrder::Ascending => ord,
            SortOrder::Descending => ord.reverse(),
        }
    };
    let mut sorted: Vec<usize> = (0..values.len())
        .filter(|&idx| !values[idx].is_null())
        .collect();
    sorted.sort_by(|&a, &b| ordering(a, b));
    assign_ranks(&sorted, values.len(), ties, |a, b| {
        ordering(a, b) == Ordering::Equal
    })
}

/// Turn positions already sorted by value into per-position ranks. Positions missing from
/// `sorted` (nulls) rank as null.
pub(crate) fn assign_ranks(
    sorted: &[usize],
    len: usize,
    ties: TieBreak,
    tied: impl Fn(usize, usize) -> bool,
) -> Vec<Value> {
    let mut out = vec![Value::Null; len];
    let mut start = 0;
    let mut dense = 0i64;
    while start < sorted.len() {
        let mut end = start + 1;
        while end < sorted.len() && tied(sorted[start], sorted[end]) {
            end += 1;
        }
        dense += 1;
        // 1-based positions `start + 1 ..= end` share this run.
        for (offset, &pos) in sorted[start..end].iter().enumerate() {
            out[pos] = match ties {
                TieBreak::Average => Value::Float((start + 1 + end) as f64 / 2.0),
                TieBreak::Min => Value::Int(start as i64 + 1),
                TieBreak::Max => Value::Int(end as i64),
                TieBreak::First => Value::Int((start + offset) as i64 + 1),
                TieBreak::Dense => Value::Int(dense),
            };
        }
        start = end;
    }
    out
}

fn cumsum(view: &ColumnView<'_>) -> Result<Vec<Value>, EvalFailure> {
    let mut out = Vec::with_capacity(view.len());
    match view.data_type() {
        DataType::Int | DataType::Bool => {
            let mut acc: Option<i64> = Some(0);
            for value in view.iter() {
                acc = match (acc, value) {
                    (Some(a), Value::Int(v)) => Some(
                        a.checked_add(v)
                            .ok_or(EvalFailure::Overflow { op: "cumsum" })?,
                    ),
                    (Some(a), Value::Bool(b)) => Some(a + i64::from(b)),
                    _ => None,
                };
                out.push(acc.map_or(Value::Null, Value::Int));
            }
        }
        DataType::Float => {
            let mut acc: Option<f64> = Some(0.0);
            for value in view.iter() {
                acc = match (acc, value) {
                    (Some(a), Value::Float(v)) => Some(a + v),
                    _ => None,
                };
                out.push(acc.map_or(Value::Null, Value::Float));
            }
        }
        data_type => {
            return Err(EvalFailure::NonNumeric {
                op: "cumsum",
                data_type,
            })
        }
    }
    Ok(out)
}

fn compare(view: &ColumnView<'_>, op: CmpOp, rhs: &Value) -> Result<Vec<Value>, EvalFailure> {
    if let Value::Str(label) = rhs {
        if let Some((codes, validity, levels)) = view.code_buffer() {
            return compare_levels(&codes, &validity, &levels, op, label);
        }
    }
    let mut out = Vec::with_capacity(view.len());
    for value in view.iter() {
        if value.is_null() || rhs.is_null() {
            out.push(Value::Null);
            continue;
        }
        let ord = compare_values(&value, rhs).ok_or_else(|| EvalFailure::Incomparable {
            left: view.data_type(),
            right: rhs.data_type().unwrap_or(DataType::Bool),
        })?;
        out.push(Value::Bool(op.test(ord)));
    }
    Ok(out)
}

/// Categorical cells against a label, ordered by level position. A label outside the level set
/// equals nothing and has no position to order against.
fn compare_levels(
    codes: &[u32],
    validity: &BitVec,
    levels: &[Arc<str>],
    op: CmpOp,
    label: &str,
) -> Result<Vec<Value>, EvalFailure> {
    let position = levels.iter().position(|level| level.as_ref() == label);
    if position.is_none() && !matches!(op, CmpOp::Eq | CmpOp::Ne) {
        return Err(EvalFailure::NotALevel {
            label: label.to_owned(),
        });
    }
    Ok(codes
        .iter()
        .enumerate()
        .map(|(idx, &code)| {
            if !validity.get(idx) {
                return Value::Null;
            }
            Value::Bool(op.test(position.map(|pos| (code as usize).cmp(&pos))))
        })
        .collect())
}

/// Ordering between two non-null values for comparisons. The outer `None` means the kinds
/// cannot be compared; the inner `None` is an unordered float pair (`NaN`).
pub(crate) fn compare_values(left: &Value, right: &Value) -> Option<Option<Ordering>> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(Some(a.cmp(b))),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            Some(left.as_f64()?.partial_cmp(&right.as_f64()?))
        }
        (Value::Bool(a), Value::Bool(b)) => Some(Some(a.cmp(b))),
        (Value::Str(a), Value::Str(b)) => Some(Some(a.as_bytes().cmp(b.as_bytes()))),
        _ => None,
    }
}
