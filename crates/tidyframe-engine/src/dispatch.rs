//! Kernel registry and the hybrid fast/generic dispatcher.
//!
//! Kernels are registered statically in [`KERNELS`], keyed by operation kind and input column
//! type. Anything without a registered kernel (callables, unsupported input types, guarded-out
//! operands) runs through [`crate::GenericApply`] instead.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use tidyframe_columnar::DataType;

use crate::error::{EngineError, EvalFailure, GroupKey};
use crate::expr::{Args, Op, OpKind, Output};
use crate::kernels;

pub type KernelFn = fn(&Op, &Args<'_>) -> Result<Output, KernelError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KernelError {
    /// A kernel was handed a column type it does not handle. The registry prevents this for
    /// looked-up kernels.
    #[error("kernel {op} does not support {data_type} input")]
    UnsupportedType { op: &'static str, data_type: DataType },
    #[error(transparent)]
    Eval(#[from] EvalFailure),
}

impl KernelError {
    pub(crate) fn into_engine_error(self, group: GroupKey) -> EngineError {
        match self {
            KernelError::UnsupportedType { op, data_type } => EngineError::Type { op, data_type },
            KernelError::Eval(failure) => EngineError::evaluation(group, failure),
        }
    }
}

#[derive(Clone, Copy)]
pub struct KernelSpec {
    pub name: &'static str,
    pub kind: OpKind,
    /// Input column types covered; `None` stands for the nullary form.
    pub inputs: &'static [Option<DataType>],
    /// Extra operand check (e.g. the literal of a comparison).
    pub accepts: fn(&Op, Option<DataType>) -> bool,
    pub kernel: KernelFn,
}

impl fmt::Debug for KernelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelSpec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("inputs", &self.inputs)
            .finish()
    }
}

const NUMERIC: &[Option<DataType>] = &[
    Some(DataType::Int),
    Some(DataType::Float),
    Some(DataType::Bool),
];

const ANY: &[Option<DataType>] = &[
    None,
    Some(DataType::Int),
    Some(DataType::Float),
    Some(DataType::Bool),
    Some(DataType::Str),
    Some(DataType::Categorical),
];

fn always(_: &Op, _: Option<DataType>) -> bool {
    true
}

static KERNELS: &[KernelSpec] = &[
    KernelSpec {
        name: "sum",
        kind: OpKind::Sum,
        inputs: NUMERIC,
        accepts: always,
        kernel: kernels::sum,
    },
    KernelSpec {
        name: "mean",
        kind: OpKind::Mean,
        inputs: NUMERIC,
        accepts: always,
        kernel: kernels::mean,
    },
    KernelSpec {
        name: "min",
        kind: OpKind::Min,
        inputs: NUMERIC,
        accepts: always,
        kernel: kernels::min,
    },
    KernelSpec {
        name: "max",
        kind: OpKind::Max,
        inputs: NUMERIC,
        accepts: always,
        kernel: kernels::max,
    },
    KernelSpec {
        name: "count",
        kind: OpKind::Count,
        inputs: ANY,
        accepts: always,
        kernel: kernels::count,
    },
    KernelSpec {
        name: "rank",
        kind: OpKind::Rank,
        inputs: NUMERIC,
        accepts: always,
        kernel: kernels::rank,
    },
    KernelSpec {
        name: "cumsum",
        kind: OpKind::CumSum,
        inputs: NUMERIC,
        accepts: always,
        kernel: kernels::cumsum,
    },
    KernelSpec {
        name: "compare",
        kind: OpKind::Compare,
        inputs: NUMERIC,
        accepts: kernels::compare_accepts,
        kernel: kernels::compare,
    },
];

type RegistryKey = (OpKind, Option<DataType>);

fn registry() -> &'static HashMap<RegistryKey, &'static KernelSpec> {
    static REGISTRY: OnceLock<HashMap<RegistryKey, &'static KernelSpec>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map = HashMap::new();
        for spec in KERNELS {
            for &input in spec.inputs {
                map.insert((spec.kind, input), spec);
            }
        }
        map
    })
}

/// Outcome of offering a partition to the fast path.
#[derive(Clone, Debug, PartialEq)]
pub enum Dispatch {
    Fast(Output),
    /// No kernel covers this operation and input type; use the generic path.
    NoFastPath,
}

/// Routes named operations to native kernels when one is registered.
#[derive(Clone, Copy, Debug, Default)]
pub struct HybridDispatcher;

impl HybridDispatcher {
    /// The kernel that would evaluate `op` over a column of type `input`.
    pub fn lookup(op: &Op, input: Option<DataType>) -> Option<&'static KernelSpec> {
        let spec = registry().get(&(op.kind(), input)).copied()?;
        (spec.accepts)(op, input).then_some(spec)
    }

    pub fn has_fast_path(op: &Op, input: Option<DataType>) -> bool {
        Self::lookup(op, input).is_some()
    }

    /// Evaluate one partition with a native kernel if one applies.
    pub fn try_eval(op: &Op, args: &Args<'_>) -> Result<Dispatch, KernelError> {
        let input = args.column(0).map(|view| view.data_type());
        match Self::lookup(op, input) {
            Some(spec) => (spec.kernel)(op, args).map(Dispatch::Fast),
            None => Ok(Dispatch::NoFastPath),
        }
    }

    pub fn kernels() -> impl Iterator<Item = &'static KernelSpec> {
        KERNELS.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{CmpOp, NullPolicy};
    use tidyframe_columnar::{Column, ColumnView, Value};

    #[test]
    fn registry_covers_numeric_inputs_only() {
        let sum = Op::Sum(NullPolicy::Skip);
        assert!(HybridDispatcher::has_fast_path(&sum, Some(DataType::Int)));
        assert!(HybridDispatcher::has_fast_path(&sum, Some(DataType::Bool)));
        assert!(!HybridDispatcher::has_fast_path(&sum, Some(DataType::Str)));
        assert!(HybridDispatcher::has_fast_path(&Op::Count, None));
        assert!(HybridDispatcher::has_fast_path(
            &Op::Count,
            Some(DataType::Categorical)
        ));
    }

    #[test]
    fn compare_with_string_literal_has_no_fast_path() {
        let col = Column::int("x", [Some(1)]);
        let args = Args::new(vec![ColumnView::full(&col)], 1);
        let op = Op::Compare {
            op: CmpOp::Eq,
            rhs: Value::from("1"),
        };
        assert_eq!(
            HybridDispatcher::try_eval(&op, &args).unwrap(),
            Dispatch::NoFastPath
        );
    }

    #[test]
    fn every_kernel_has_a_unique_name() {
        let mut names: Vec<_> = HybridDispatcher::kernels().map(|k| k.name).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }
}
