//! The grouped verbs: filter, arrange, mutate, summarise.
//!
//! Every verb evaluates eagerly and returns a new [`Frame`]; inputs are never modified, so a
//! failing verb leaves nothing half-applied.

use std::cmp::Ordering;

use tidyframe_columnar::{BitVec, Column, ColumnData, DataType, SchemaError, Table, Value};

use crate::apply::{self, Evaluated};
use crate::error::{EngineError, EngineResult, EvalFailure};
use crate::expr::{Expr, Output, SortOrder};
use crate::frame::Frame;
use crate::join::{JoinEngine, JoinPlan};
use crate::options::EngineOptions;

/// One arrange key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub order: SortOrder,
}

impl SortKey {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            order: SortOrder::Ascending,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            order: SortOrder::Descending,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct VerbEngine {
    options: EngineOptions,
}

impl VerbEngine {
    pub fn new(options: EngineOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn group_by<S: AsRef<str>>(&self, frame: &Frame, keys: &[S]) -> EngineResult<Frame> {
        Ok(Frame::grouped(frame.table().clone(), keys)?)
    }

    /// Per-group results of `expr`, one [`Output`] per partition in group order.
    pub fn evaluate(&self, frame: &Frame, expr: &Expr) -> EngineResult<Evaluated> {
        apply::evaluate(&self.options, frame.table(), frame.index(), expr, "evaluate")
    }

    /// Keep the rows where `predicate` is true; false and null drop the row.
    pub fn filter(&self, frame: &Frame, predicate: &Expr) -> EngineResult<Frame> {
        self.filter_all(frame, std::slice::from_ref(predicate))
    }

    /// Keep the rows where every predicate is true.
    pub fn filter_all(&self, frame: &Frame, predicates: &[Expr]) -> EngineResult<Frame> {
        let table = frame.table();
        let index = frame.index();
        let mut keep = BitVec::with_len_all_true(table.row_count());

        for predicate in predicates {
            let evaluated =
                apply::evaluate(&self.options, table, index, predicate, "filter")?;
            let mut pass = BitVec::with_len_all_false(table.row_count());
            for (group, output) in evaluated.outputs.iter().enumerate() {
                let rows = index.partition(group);
                let fail = |failure: EvalFailure| {
                    EngineError::evaluation(index.group_key(group), failure)
                };
                match output {
                    Output::Scalar(value) => {
                        if truthy(value).map_err(fail)? {
                            rows.iter().for_each(|&row| pass.set(row, true));
                        }
                    }
                    Output::Series(values) if values.len() == rows.len() => {
                        for (&row, value) in rows.iter().zip(values) {
                            if truthy(value).map_err(fail)? {
                                pass.set(row, true);
                            }
                        }
                    }
                    Output::Series(values) if values.len() == 1 => {
                        if truthy(&values[0]).map_err(fail)? {
                            rows.iter().for_each(|&row| pass.set(row, true));
                        }
                    }
                    Output::Series(values) => {
                        return Err(fail(EvalFailure::Length {
                            expected: rows.len(),
                            actual: values.len(),
                        }))
                    }
                }
            }
            keep.and_inplace(&pass);
        }

        let kept: Vec<usize> = keep.iter_ones().collect();
        log::debug!("filter: kept {} of {} rows", kept.len(), table.row_count());
        Ok(Frame::with_grouping(
            table.take(&kept),
            frame.grouping().clone(),
        )?)
    }

    /// Stable sort of the whole table. Nulls (and float `NaN`s) sort last in either direction.
    pub fn arrange(&self, frame: &Frame, keys: &[SortKey]) -> EngineResult<Frame> {
        if keys.is_empty() {
            return Ok(frame.clone());
        }
        let table = frame.table();
        let columns = keys
            .iter()
            .map(|key| Ok((table.column(&key.column)?, key.order)))
            .collect::<Result<Vec<_>, SchemaError>>()?;

        let mut order: Vec<usize> = (0..table.row_count()).collect();
        order.sort_by(|&a, &b| {
            columns
                .iter()
                .map(|&(column, dir)| compare_cells(column, a, b, dir))
                .find(|ord| ord.is_ne())
                .unwrap_or(Ordering::Equal)
        });
        log::debug!("arrange: {} rows by {} keys", order.len(), keys.len());
        Ok(Frame::with_grouping(
            table.take(&order),
            frame.grouping().clone(),
        )?)
    }

    /// Add or replace column `name` with the per-row result of `expr`.
    pub fn mutate(&self, frame: &Frame, name: &str, expr: &Expr) -> EngineResult<Frame> {
        let table = frame.table();
        let index = frame.index();
        let mut evaluated = apply::evaluate(&self.options, table, index, expr, "mutate")?;

        let mut values = vec![Value::Null; table.row_count()];
        for (group, output) in std::mem::take(&mut evaluated.outputs).into_iter().enumerate() {
            let rows = index.partition(group);
            match output {
                Output::Scalar(value) => broadcast(&mut values, rows, &value),
                Output::Series(series) if series.len() == rows.len() => {
                    for (&row, value) in rows.iter().zip(series) {
                        values[row] = value;
                    }
                }
                Output::Series(series) if series.len() == 1 => {
                    broadcast(&mut values, rows, &series[0])
                }
                Output::Series(series) => {
                    return Err(EngineError::evaluation(
                        index.group_key(group),
                        EvalFailure::Length {
                            expected: rows.len(),
                            actual: series.len(),
                        },
                    ))
                }
            }
        }

        let column = assemble(name, &values, &evaluated)?;
        let table = table.with_column(column)?;
        if frame.group_keys().iter().any(|key| key == name) {
            Ok(Frame::with_grouping(table, frame.grouping().clone())?)
        } else {
            Ok(frame.with_table(table))
        }
    }

    /// Apply named expressions in order; each sees the columns added before it.
    pub fn mutate_many<S: AsRef<str>>(
        &self,
        frame: &Frame,
        exprs: &[(S, Expr)],
    ) -> EngineResult<Frame> {
        let mut current = frame.clone();
        for (name, expr) in exprs {
            current = self.mutate(&current, name.as_ref(), expr)?;
        }
        Ok(current)
    }

    /// One row per group: the key columns followed by `name`.
    pub fn summarise(&self, frame: &Frame, name: &str, expr: &Expr) -> EngineResult<Frame> {
        self.summarise_many(frame, &[(name, expr.clone())])
    }

    pub fn summarise_many<S: AsRef<str>>(
        &self,
        frame: &Frame,
        exprs: &[(S, Expr)],
    ) -> EngineResult<Frame> {
        let index = frame.index();
        let mut names: Vec<&str> = index.key_names().iter().map(String::as_str).collect();
        for (name, _) in exprs {
            let name = name.as_ref();
            if names.contains(&name) {
                return Err(SchemaError::DuplicateColumn {
                    column: name.to_owned(),
                }
                .into());
            }
            names.push(name);
        }

        let mut columns = index.keys().clone().into_columns();
        for (name, expr) in exprs {
            let mut evaluated =
                apply::evaluate(&self.options, frame.table(), index, expr, "summarise")?;
            let outputs = std::mem::take(&mut evaluated.outputs);
            let mut values = Vec::with_capacity(outputs.len());
            for (group, output) in outputs.into_iter().enumerate() {
                let value = match output {
                    Output::Scalar(value) => value,
                    Output::Series(mut series) if series.len() == 1 => series.remove(0),
                    Output::Series(series) => {
                        return Err(EngineError::evaluation(
                            index.group_key(group),
                            EvalFailure::Length {
                                expected: 1,
                                actual: series.len(),
                            },
                        ))
                    }
                };
                values.push(value);
            }
            columns.push(assemble(name.as_ref(), &values, &evaluated)?);
        }

        let table = Table::with_row_count(columns, index.group_count())?;
        Ok(Frame::new(table))
    }

    pub fn join(&self, left: &Frame, right: &Frame, plan: &JoinPlan) -> EngineResult<Frame> {
        let table = JoinEngine::new(plan).join(left.table(), right.table())?;
        Ok(Frame::new(table))
    }
}

fn truthy(value: &Value) -> Result<bool, EvalFailure> {
    if value.is_null() {
        return Ok(false);
    }
    value.as_bool().ok_or_else(|| EvalFailure::NotBoolean {
        value: value.clone(),
    })
}

fn broadcast(values: &mut [Value], rows: &[usize], value: &Value) {
    for &row in rows {
        values[row] = value.clone();
    }
}

/// Build a result column, using the declared type (and level set) when there is one.
fn assemble(name: &str, values: &[Value], evaluated: &Evaluated) -> Result<Column, SchemaError> {
    match (evaluated.result_type, &evaluated.levels) {
        (Some(DataType::Categorical), Some(levels)) => {
            Column::with_levels(name, levels.clone(), values)
        }
        (Some(data_type), _) => Column::from_values(name, data_type, values),
        (None, _) => Column::infer(name, values, DataType::Bool),
    }
}

fn compare_cells(column: &Column, a: usize, b: usize, order: SortOrder) -> Ordering {
    let missing = |row: usize| {
        !column.is_valid(row)
            || matches!(column.data(), ColumnData::Float { values, .. } if values[row].is_nan())
    };
    match (missing(a), missing(b)) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }
    let ord = match column.data() {
        ColumnData::Int { values, .. } => values[a].cmp(&values[b]),
        ColumnData::Float { values, .. } => values[a]
            .partial_cmp(&values[b])
            .unwrap_or(Ordering::Equal),
        ColumnData::Bool { values, .. } => values.get(a).cmp(&values.get(b)),
        ColumnData::Str { values, .. } => values[a].as_bytes().cmp(values[b].as_bytes()),
        ColumnData::Categorical { codes, .. } => codes[a].cmp(&codes[b]),
    };
    match order {
        SortOrder::Ascending => ord,
        SortOrder::Descending => ord.reverse(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nulls_and_nan_sort_last_both_ways() {
        let col = Column::float("x", [None, Some(f64::NAN), Some(1.0), Some(2.0)]);
        assert_eq!(compare_cells(&col, 0, 2, SortOrder::Ascending), Ordering::Greater);
        assert_eq!(compare_cells(&col, 0, 2, SortOrder::Descending), Ordering::Greater);
        assert_eq!(compare_cells(&col, 1, 3, SortOrder::Descending), Ordering::Greater);
        assert_eq!(compare_cells(&col, 0, 1, SortOrder::Ascending), Ordering::Equal);
        assert_eq!(compare_cells(&col, 2, 3, SortOrder::Descending), Ordering::Greater);
    }

    #[test]
    fn categorical_sorts_by_level_position() {
        let col = Column::categorical("c", ["lo", "hi"], [Some("hi"), Some("lo")]).unwrap();
        assert_eq!(compare_cells(&col, 1, 0, SortOrder::Ascending), Ordering::Less);
    }

    #[test]
    fn truthiness_rejects_non_booleans() {
        assert_eq!(truthy(&Value::Null), Ok(false));
        assert_eq!(
            truthy(&Value::Int(1)),
            Err(EvalFailure::NotBoolean {
                value: Value::Int(1)
            })
        );
    }
}
