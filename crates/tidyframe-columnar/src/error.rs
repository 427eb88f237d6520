use crate::types::DataType;

/// Structural problems with tables, columns, and join plans.
///
/// These are never recovered inside the engine; they are reported to the caller as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("unknown column: {column}")]
    UnknownColumn { column: String },

    #[error("duplicate column: {column}")]
    DuplicateColumn { column: String },

    #[error("column {column} has {actual} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("row has {actual} values, table has {expected} columns")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("value of type {actual} does not fit column {column} ({expected})")]
    TypeMismatch {
        column: String,
        expected: DataType,
        actual: DataType,
    },

    #[error("label {label:?} is not a level of categorical column {column}")]
    UnknownLevel { column: String, label: String },

    #[error("categorical column {column} has code {code} but only {levels} levels")]
    CodeOutOfRange {
        column: String,
        code: u32,
        levels: usize,
    },

    #[error("column {column} mixes {first} and {second} values")]
    InconsistentTypes {
        column: String,
        first: DataType,
        second: DataType,
    },

    #[error(
        "join keys have incompatible types: left {left} ({left_type}) vs right {right} ({right_type})"
    )]
    IncompatibleJoinKeys {
        left: String,
        left_type: DataType,
        right: String,
        right_type: DataType,
    },

    #[error("join needs the same non-zero number of keys per side, got {left} and {right}")]
    JoinArity { left: usize, right: usize },
}
