//! Per-partition evaluation of one expression.
//!
//! Column references are resolved once, before any partition runs, so a missing column is a
//! schema error rather than a per-group failure. The fast/generic route is also decided once:
//! it only depends on the operation and the input column type.

use std::fmt;
use std::sync::Arc;

use tidyframe_columnar::{Column, ColumnView, DataType, Table};

use crate::dispatch::{HybridDispatcher, KernelSpec};
use crate::error::{BoxError, EngineError, EngineResult};
use crate::expr::{Args, Callable, Expr, ExprBody, Op, Output};
use crate::group_index::GroupIndex;
use crate::ops;
use crate::options::EngineOptions;
use crate::parallel;

enum Route<'e> {
    Kernel(&'static KernelSpec, &'e Op),
    Generic(&'e Op),
    Call(&'e Callable),
}

impl fmt::Display for Route<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Kernel(spec, _) => write!(f, "native kernel `{}`", spec.name),
            Route::Generic(op) => write!(f, "generic `{}`", op.name()),
            Route::Call(_) => f.write_str("generic callable"),
        }
    }
}

/// Per-group results of one expression.
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluated {
    pub outputs: Vec<Output>,
    /// Declared result type, used when the values alone cannot decide the column type.
    pub result_type: Option<DataType>,
    /// Level set for a categorical result, taken from the categorical input.
    pub levels: Option<Arc<[Arc<str>]>>,
}

struct Prepared<'t, 'e> {
    columns: Vec<&'t Column>,
    route: Route<'e>,
    result_type: Option<DataType>,
    levels: Option<Arc<[Arc<str>]>>,
}

impl<'t, 'e> Prepared<'t, 'e> {
    fn new(table: &'t Table, expr: &'e Expr, allow_kernels: bool) -> EngineResult<Self> {
        let columns = expr
            .columns()
            .iter()
            .map(|name| table.column(name))
            .collect::<Result<Vec<_>, _>>()?;
        let input_types: Vec<DataType> = columns.iter().map(|c| c.data_type()).collect();
        let route = match expr.body() {
            ExprBody::Call(callable) => Route::Call(callable),
            ExprBody::Op(op) => {
                let kernel = allow_kernels
                    .then(|| HybridDispatcher::lookup(op, input_types.first().copied()))
                    .flatten();
                match kernel {
                    Some(spec) => Route::Kernel(spec, op),
                    None => Route::Generic(op),
                }
            }
        };
        let result_type = expr.result_type(&input_types);
        let levels = match result_type {
            Some(DataType::Categorical) => columns.first().and_then(|c| c.levels()).cloned(),
            _ => None,
        };
        Ok(Self {
            columns,
            route,
            result_type,
            levels,
        })
    }

    fn eval_group(&self, index: &GroupIndex, group: usize) -> EngineResult<Output> {
        let rows = index.partition(group);
        let views = self
            .columns
            .iter()
            .map(|column| ColumnView::with_rows(column, rows))
            .collect();
        let args = Args::new(views, rows.len());
        match &self.route {
            Route::Kernel(spec, op) => {
                (spec.kernel)(op, &args).map_err(|e| e.into_engine_error(index.group_key(group)))
            }
            Route::Generic(op) => ops::eval_generic(op, &args)
                .map_err(|e| EngineError::evaluation(index.group_key(group), e)),
            Route::Call(callable) => GenericApply::call(callable, &args)
                .map_err(|e| EngineError::evaluation(index.group_key(group), e)),
        }
    }
}

fn run(
    options: &EngineOptions,
    table: &Table,
    index: &GroupIndex,
    expr: &Expr,
    allow_kernels: bool,
    verb: &str,
) -> EngineResult<Evaluated> {
    let prepared = Prepared::new(table, expr, allow_kernels)?;
    let groups = index.group_count();
    log::debug!(
        "{verb}: `{expr}` over {groups} groups via {}",
        prepared.route
    );
    let results = parallel::map_indexed(groups, options.parallel_for(groups), |g| {
        prepared.eval_group(index, g)
    });
    // First failure in partition order, independent of scheduling.
    let outputs = results.into_iter().collect::<EngineResult<Vec<_>>>()?;
    Ok(Evaluated {
        outputs,
        result_type: prepared.result_type,
        levels: prepared.levels,
    })
}

/// Evaluate `expr` over every partition, using native kernels where registered.
pub(crate) fn evaluate(
    options: &EngineOptions,
    table: &Table,
    index: &GroupIndex,
    expr: &Expr,
    verb: &str,
) -> EngineResult<Evaluated> {
    run(options, table, index, expr, true, verb)
}

/// The generic evaluation path: any callable over any column types, one partition at a time.
#[derive(Clone, Copy, Debug, Default)]
pub struct GenericApply;

impl GenericApply {
    pub fn call(callable: &Callable, args: &Args<'_>) -> Result<Output, BoxError> {
        callable(args)
    }

    /// Evaluate `expr` over every partition without consulting the kernel registry.
    pub fn apply(
        options: &EngineOptions,
        table: &Table,
        index: &GroupIndex,
        expr: &Expr,
    ) -> EngineResult<Evaluated> {
        run(options, table, index, expr, false, "generic apply")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvalFailure;
    use tidyframe_columnar::Value;

    fn table() -> Table {
        Table::new(vec![
            Column::string("g", [Some("a"), Some("b"), Some("a")]),
            Column::int("x", [Some(1), Some(2), Some(3)]),
        ])
        .unwrap()
    }

    #[test]
    fn missing_column_is_a_schema_error() {
        let table = table();
        let index = GroupIndex::build(&table, &["g"]).unwrap();
        let err = evaluate(
            &EngineOptions::default(),
            &table,
            &index,
            &Expr::sum("nope"),
            "test",
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Schema(_)));
    }

    #[test]
    fn callable_errors_carry_the_group_key() {
        let table = table();
        let index = GroupIndex::build(&table, &["g"]).unwrap();
        let expr = Expr::call(["x"], |args: &Args<'_>| {
            if args.len() == 1 {
                Err("singleton".into())
            } else {
                Ok(Output::Scalar(Value::Int(0)))
            }
        });
        let err = GenericApply::apply(&EngineOptions::sequential(), &table, &index, &expr)
            .unwrap_err();
        match err {
            EngineError::Evaluation { group, source } => {
                assert_eq!(group.to_string(), "(g = \"b\")");
                assert_eq!(source.to_string(), "singleton");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn first_failing_group_is_reported() {
        let table = Table::new(vec![
            Column::int("g", (0..200).map(Some)),
            Column::string("s", (0..200).map(|_| Some("x"))),
        ])
        .unwrap();
        let index = GroupIndex::build(&table, &["g"]).unwrap();
        let options = EngineOptions {
            parallel: true,
            parallel_min_groups: 1,
        };
        let err = evaluate(&options, &table, &index, &Expr::sum("s"), "test").unwrap_err();
        match err {
            EngineError::Evaluation { group, source } => {
                assert_eq!(group.to_string(), "(g = 0)");
                let failure = source.downcast_ref::<EvalFailure>().unwrap();
                assert_eq!(
                    failure,
                    &EvalFailure::NonNumeric {
                        op: "sum",
                        data_type: DataType::Str
                    }
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
