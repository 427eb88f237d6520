//! Hashable row keys shared by grouping and joins.
//!
//! Nulls are encoded as an ordinary key cell, so grouping treats null as a value equal to
//! itself. Joins check [`KeyColumns::has_null`] before probing, which is what makes a null key
//! match nothing there.

use std::sync::Arc;

use ordered_float::OrderedFloat;
use smallvec::SmallVec;
use tidyframe_columnar::{Column, ColumnData, DataType};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum KeyCell {
    Null,
    Int(i64),
    Float(OrderedFloat<f64>),
    Bool(bool),
    Str(Arc<str>),
    Code(u32),
}

pub(crate) type RowKey = SmallVec<[KeyCell; 4]>;

/// How a key column is read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum KeyMode {
    /// Native representation; categorical columns hash their codes.
    Exact,
    /// Integers widen to floats so they compare with float keys. Above 2^53 distinct integers
    /// can round to the same float and then match the same key.
    AsFloat,
    /// Categorical columns read their labels so they compare with strings or other level sets.
    AsLabel,
}

impl KeyMode {
    /// The shared key representation for a pair of join key types, if they are compatible.
    pub(crate) fn for_join(left: DataType, right: DataType) -> Option<KeyMode> {
        use DataType::*;
        match (left, right) {
            (Categorical, Categorical) | (Str, Categorical) | (Categorical, Str) => {
                Some(KeyMode::AsLabel)
            }
            (Int, Float) | (Float, Int) => Some(KeyMode::AsFloat),
            (l, r) if l == r => Some(KeyMode::Exact),
            _ => None,
        }
    }
}

pub(crate) struct KeyColumns<'a> {
    columns: Vec<(&'a Column, KeyMode)>,
}

impl<'a> KeyColumns<'a> {
    pub(crate) fn exact(columns: Vec<&'a Column>) -> Self {
        Self {
            columns: columns.into_iter().map(|c| (c, KeyMode::Exact)).collect(),
        }
    }

    pub(crate) fn with_modes(columns: Vec<(&'a Column, KeyMode)>) -> Self {
        Self { columns }
    }

    pub(crate) fn row_key(&self, row: usize) -> RowKey {
        self.columns
            .iter()
            .map(|&(column, mode)| key_cell(column, mode, row))
            .collect()
    }

    pub(crate) fn has_null(&self, row: usize) -> bool {
        self.columns.iter().any(|(column, _)| !column.is_valid(row))
    }
}

fn canonical_f64(v: f64) -> OrderedFloat<f64> {
    // `-0.0 == 0.0` must also hash the same.
    OrderedFloat(if v == 0.0 { 0.0 } else { v })
}

fn key_cell(column: &Column, mode: KeyMode, row: usize) -> KeyCell {
    if !column.is_valid(row) {
        return KeyCell::Null;
    }
    match (column.data(), mode) {
        (ColumnData::Int { values, .. }, KeyMode::AsFloat) => {
            KeyCell::Float(canonical_f64(values[row] as f64))
        }
        (ColumnData::Int { values, .. }, _) => KeyCell::Int(values[row]),
        (ColumnData::Float { values, .. }, _) => KeyCell::Float(canonical_f64(values[row])),
        (ColumnData::Bool { values, .. }, _) => KeyCell::Bool(values.get(row)),
        (ColumnData::Str { values, .. }, _) => KeyCell::Str(values[row].clone()),
        (ColumnData::Categorical { codes, levels, .. }, KeyMode::AsLabel) => {
            KeyCell::Str(levels[codes[row] as usize].clone())
        }
        (ColumnData::Categorical { codes, .. }, _) => KeyCell::Code(codes[row]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_zero_and_nan_are_single_keys() {
        let col = Column::float("x", [Some(0.0), Some(-0.0), Some(f64::NAN), Some(f64::NAN)]);
        let keys = KeyColumns::exact(vec![&col]);
        assert_eq!(keys.row_key(0), keys.row_key(1));
        assert_eq!(keys.row_key(2), keys.row_key(3));
        assert_ne!(keys.row_key(0), keys.row_key(2));
    }

    #[test]
    fn label_mode_matches_strings_across_level_sets() {
        let cat = Column::categorical("c", ["b", "a"], [Some("a")]).unwrap();
        let s = Column::string("s", [Some("a")]);
        let mode = KeyMode::for_join(DataType::Categorical, DataType::Str).unwrap();
        let left = KeyColumns::with_modes(vec![(&cat, mode)]);
        let right = KeyColumns::with_modes(vec![(&s, mode)]);
        assert_eq!(left.row_key(0), right.row_key(0));
    }

    #[test]
    fn incompatible_join_types_have_no_mode() {
        assert_eq!(KeyMode::for_join(DataType::Int, DataType::Str), None);
        assert_eq!(KeyMode::for_join(DataType::Bool, DataType::Float), None);
        assert_eq!(
            KeyMode::for_join(DataType::Int, DataType::Int),
            Some(KeyMode::Exact)
        );
    }

    #[test]
    fn widened_int_keys_lose_precision_above_2_pow_53() {
        let big = 1i64 << 53;
        let ints = Column::int("i", [Some(big), Some(big + 1)]);
        let floats = Column::float("f", [Some(big as f64)]);
        let mode = KeyMode::for_join(DataType::Int, DataType::Float).unwrap();
        let left = KeyColumns::with_modes(vec![(&ints, mode)]);
        let right = KeyColumns::with_modes(vec![(&floats, mode)]);
        assert_eq!(left.row_key(0), right.row_key(0));
        assert_eq!(left.row_key(1), right.row_key(0));
    }

    #[test]
    fn null_cells_group_together() {
        let col = Column::int("k", [None, Some(1), None]);
        let keys = KeyColumns::exact(vec![&col]);
        assert_eq!(keys.row_key(0), keys.row_key(2));
        assert!(keys.has_null(0));
        assert!(!keys.has_null(1));
    }
}
