#![cfg(not(target_arch = "wasm32"))]

use proptest::prelude::*;
use tidyframe_columnar::{Column, Table, Value};
use tidyframe_engine::{
    CmpOp, EngineError, EngineOptions, Evaluated, Expr, Frame, GenericApply, Output, TieBreak,
    VerbEngine,
};

fn arb_float() -> impl Strategy<Value = Option<f64>> {
    prop_oneof![
        6 => (-50i32..=50).prop_map(|v| Some(v as f64 / 4.0)),
        1 => Just(None),
        1 => Just(Some(f64::NAN)),
        1 => Just(Some(-0.0)),
        1 => Just(Some(f64::INFINITY)),
    ]
}

fn arb_int() -> impl Strategy<Value = Option<i64>> {
    prop_oneof![
        6 => (-1000i64..=1000).prop_map(Some),
        1 => Just(None),
        1 => Just(Some(i64::MAX)),
    ]
}

fn arb_bool() -> impl Strategy<Value = Option<bool>> {
    prop_oneof![Just(None), any::<bool>().prop_map(Some)]
}

fn arb_table() -> impl Strategy<Value = Table> {
    (0usize..40).prop_flat_map(|rows| {
        (
            prop::collection::vec(prop_oneof![Just(None), (0i64..4).prop_map(Some)], rows),
            prop::collection::vec(arb_int(), rows),
            prop::collection::vec(arb_float(), rows),
            prop::collection::vec(arb_bool(), rows),
        )
            .prop_map(|(g, i, f, b)| {
                Table::new(vec![
                    Column::int("g", g),
                    Column::int("i", i),
                    Column::float("f", f),
                    Column::boolean("b", b),
                ])
                .unwrap()
            })
    })
}

fn exprs_for(column: &str) -> Vec<Expr> {
    let mut out = vec![
        Expr::sum(column),
        Expr::sum(column).propagate_nulls(),
        Expr::mean(column),
        Expr::mean(column).propagate_nulls(),
        Expr::min(column),
        Expr::max(column),
        Expr::max(column).propagate_nulls(),
        Expr::count(column),
        Expr::cumsum(column),
        Expr::compare(column, CmpOp::Ge, 0),
        Expr::compare(column, CmpOp::Lt, 1.5),
        Expr::compare(column, CmpOp::Ne, Value::Null),
    ];
    for ties in [
        TieBreak::Average,
        TieBreak::Min,
        TieBreak::Max,
        TieBreak::First,
        TieBreak::Dense,
    ] {
        out.push(Expr::rank(column, ties));
        out.push(Expr::rank(column, ties).descending());
    }
    if column == "b" {
        out.push(Expr::compare(column, CmpOp::Eq, true));
    }
    out
}

/// `NaN` compares equal to `NaN` here; everything else uses `Value` equality.
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Float(x), Value::Float(y)) if x.is_nan() && y.is_nan() => true,
        _ => a == b,
    }
}

fn same_output(a: &Output, b: &Output) -> bool {
    match (a, b) {
        (Output::Scalar(x), Output::Scalar(y)) => same_value(x, y),
        (Output::Series(xs), Output::Series(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| same_value(x, y))
        }
        _ => false,
    }
}

fn same_result(fast: &Result<Evaluated, EngineError>, generic: &Result<Evaluated, EngineError>) -> bool {
    match (fast, generic) {
        (Ok(a), Ok(b)) => {
            a.result_type == b.result_type
                && a.outputs.len() == b.outputs.len()
                && a.outputs.iter().zip(&b.outputs).all(|(x, y)| same_output(x, y))
        }
        (
            Err(EngineError::Evaluation { group: ga, source: sa }),
            Err(EngineError::Evaluation { group: gb, source: sb }),
        ) => ga == gb && sa.to_string() == sb.to_string(),
        _ => false,
    }
}

proptest! {
    #[test]
    fn prop_kernels_match_generic(table in arb_table(), grouped in any::<bool>()) {
        let frame = if grouped {
            Frame::grouped(table, &["g"]).unwrap()
        } else {
            Frame::new(table)
        };
        let engine = VerbEngine::new(EngineOptions::sequential());

        for column in ["i", "f", "b"] {
            for expr in exprs_for(column) {
                let fast = engine.evaluate(&frame, &expr);
                let generic = GenericApply::apply(
                    engine.options(),
                    frame.table(),
                    frame.index(),
                    &expr.to_generic(),
                );
                prop_assert!(
                    same_result(&fast, &generic),
                    "{expr} diverged: fast {fast:?} vs generic {generic:?}"
                );
            }
        }

        let fast = engine.evaluate(&frame, &Expr::n());
        let generic = GenericApply::apply(
            engine.options(),
            frame.table(),
            frame.index(),
            &Expr::n().to_generic(),
        );
        prop_assert!(same_result(&fast, &generic));
    }

    #[test]
    fn prop_parallel_matches_sequential(table in arb_table()) {
        let frame = Frame::grouped(table, &["g"]).unwrap();
        let sequential = VerbEngine::new(EngineOptions::sequential());
        let parallel = VerbEngine::new(EngineOptions { parallel: true, parallel_min_groups: 1 });

        for expr in [Expr::sum("i"), Expr::mean("f"), Expr::min_rank("f")] {
            let a = sequential.evaluate(&frame, &expr);
            let b = parallel.evaluate(&frame, &expr);
            prop_assert!(same_result(&a, &b), "{expr} diverged");
        }
    }
}
