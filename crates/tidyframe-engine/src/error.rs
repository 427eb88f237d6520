use std::fmt;

use tidyframe_columnar::{DataType, SchemaError, Value};

pub type EngineResult<T> = Result<T, EngineError>;

/// Boxed error returned by user callables.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("evaluation failed for group {group}: {source}")]
    Evaluation {
        group: GroupKey,
        #[source]
        source: BoxError,
    },

    #[error("kernel {op} invoked on unsupported {data_type} input")]
    Type { op: &'static str, data_type: DataType },
}

impl EngineError {
    pub(crate) fn evaluation(group: GroupKey, source: impl Into<BoxError>) -> Self {
        EngineError::Evaluation {
            group,
            source: source.into(),
        }
    }
}

/// Failures raised by the built-in operations and by result-shape checks.
///
/// Both the native kernels and the generic implementations report these, so the two paths fail
/// identically.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalFailure {
    #[error("{op} requires numeric input, got {data_type}")]
    NonNumeric { op: &'static str, data_type: DataType },

    #[error("integer overflow in {op}")]
    Overflow { op: &'static str },

    #[error("cannot compare {left} with {right}")]
    Incomparable { left: DataType, right: DataType },

    #[error("expected {expected} values, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("{label:?} is not a level of the categorical input")]
    NotALevel { label: String },

    #[error("predicate produced non-boolean value {value}")]
    NotBoolean { value: Value },
}

/// The key-tuple of one partition, attached to evaluation errors.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupKey {
    pub columns: Vec<(String, Value)>,
}

impl GroupKey {
    pub fn new(columns: Vec<(String, Value)>) -> Self {
        Self { columns }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.columns.is_empty() {
            return f.write_str("<all rows>");
        }
        f.write_str("(")?;
        for (idx, (name, value)) in self.columns.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name} = {value}")?;
        }
        f.write_str(")")
    }
}
