#![forbid(unsafe_code)]

use crate::bitmap::BitVec;
use crate::error::SchemaError;
use crate::types::{DataType, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Typed storage for one column.
///
/// Every variant carries a validity bitmap (`1` = present). Payload slots behind a null hold a
/// default value and must not be interpreted.
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnData {
    Int {
        values: Vec<i64>,
        validity: BitVec,
    },
    Float {
        values: Vec<f64>,
        validity: BitVec,
    },
    Bool {
        values: BitVec,
        validity: BitVec,
    },
    Str {
        values: Vec<Arc<str>>,
        validity: BitVec,
    },
    Categorical {
        codes: Vec<u32>,
        levels: Arc<[Arc<str>]>,
        validity: BitVec,
    },
}

impl ColumnData {
    pub fn data_type(&self) -> DataType {
        match self {
            ColumnData::Int { .. } => DataType::Int,
            ColumnData::Float { .. } => DataType::Float,
            ColumnData::Bool { .. } => DataType::Bool,
            ColumnData::Str { .. } => DataType::Str,
            ColumnData::Categorical { .. } => DataType::Categorical,
        }
    }

    pub fn validity(&self) -> &BitVec {
        match self {
            ColumnData::Int { validity, .. }
            | ColumnData::Float { validity, .. }
            | ColumnData::Bool { validity, .. }
            | ColumnData::Str { validity, .. }
            | ColumnData::Categorical { validity, .. } => validity,
        }
    }

    pub fn len(&self) -> usize {
        self.validity().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn empty_str() -> Arc<str> {
    Arc::from("")
}

/// A named, typed column of nullable values.
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    name: String,
    data: ColumnData,
}

impl Column {
    /// Wrap raw column data, checking that the payload matches the validity length and that
    /// categorical codes point into the level set.
    pub fn new(name: impl Into<String>, data: ColumnData) -> Result<Self, SchemaError> {
        let name = name.into();
        let expected = data.len();
        let actual = match &data {
            ColumnData::Int { values, .. } => values.len(),
            ColumnData::Float { values, .. } => values.len(),
            ColumnData::Bool { values, .. } => values.len(),
            ColumnData::Str { values, .. } => values.len(),
            ColumnData::Categorical { codes, .. } => codes.len(),
        };
        if actual != expected {
            return Err(SchemaError::LengthMismatch {
                column: name,
                expected,
                actual,
            });
        }
        if let ColumnData::Categorical {
            codes,
            levels,
            validity,
        } = &data
        {
            let out_of_range = validity
                .iter_ones()
                .find(|&row| codes[row] as usize >= levels.len());
            if let Some(row) = out_of_range {
                return Err(SchemaError::CodeOutOfRange {
                    column: name,
                    code: codes[row],
                    levels: levels.len(),
                });
            }
        }
        Ok(Self::from_parts(name, data))
    }

    fn from_parts(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn int(name: impl Into<String>, values: impl IntoIterator<Item = Option<i64>>) -> Self {
        let (values, validity) = split_options(values, 0);
        Self::from_parts(name, ColumnData::Int { values, validity })
    }

    pub fn float(name: impl Into<String>, values: impl IntoIterator<Item = Option<f64>>) -> Self {
        let (values, validity) = split_options(values, 0.0);
        Self::from_parts(name, ColumnData::Float { values, validity })
    }

    pub fn boolean(name: impl Into<String>, values: impl IntoIterator<Item = Option<bool>>) -> Self {
        let (values, validity) = split_options(values, false);
        Self::from_parts(
            name,
            ColumnData::Bool {
                values: values.into_iter().collect(),
                validity,
            },
        )
    }

    pub fn string<S: AsRef<str>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = Option<S>>,
    ) -> Self {
        let blank = empty_str();
        let mut out = Vec::new();
        let mut validity = BitVec::new();
        for v in values {
            match v {
                Some(s) => {
                    out.push(Arc::from(s.as_ref()));
                    validity.push(true);
                }
                None => {
                    out.push(blank.clone());
                    validity.push(false);
                }
            }
        }
        Self::from_parts(
            name,
            ColumnData::Str {
                values: out,
                validity,
            },
        )
    }

    /// Build a categorical column over an explicit, ordered level set.
    pub fn categorical<S: AsRef<str>>(
        name: impl Into<String>,
        levels: impl IntoIterator<Item = S>,
        labels: impl IntoIterator<Item = Option<S>>,
    ) -> Result<Self, SchemaError> {
        let name = name.into();
        let levels: Arc<[Arc<str>]> = levels.into_iter().map(|l| Arc::from(l.as_ref())).collect();
        let lookup: HashMap<&str, u32> = levels
            .iter()
            .enumerate()
            .map(|(idx, l)| (l.as_ref(), idx as u32))
            .collect();

        let mut codes = Vec::new();
        let mut validity = BitVec::new();
        for label in labels {
            match label {
                Some(label) => {
                    let label = label.as_ref();
                    let Some(&code) = lookup.get(label) else {
                        return Err(SchemaError::UnknownLevel {
                            column: name,
                            label: label.to_owned(),
                        });
                    };
                    codes.push(code);
                    validity.push(true);
                }
                None => {
                    codes.push(0);
                    validity.push(false);
                }
            }
        }
        Ok(Self::from_parts(
            name,
            ColumnData::Categorical {
                codes,
                levels,
                validity,
            },
        ))
    }

    /// Build a categorical column whose levels are the sorted distinct labels.
    pub fn factor<S: AsRef<str>>(
        name: impl Into<String>,
        labels: impl IntoIterator<Item = Option<S>>,
    ) -> Self {
        let labels: Vec<Option<S>> = labels.into_iter().collect();
        let distinct: BTreeSet<&str> = labels
            .iter()
            .filter_map(|l| l.as_ref().map(|s| s.as_ref()))
            .collect();
        let lookup: HashMap<&str, u32> = distinct
            .iter()
            .enumerate()
            .map(|(idx, l)| (*l, idx as u32))
            .collect();

        let mut codes = Vec::with_capacity(labels.len());
        let mut validity = BitVec::with_capacity_bits(labels.len());
        for label in &labels {
            let code = label.as_ref().and_then(|l| lookup.get(l.as_ref()).copied());
            validity.push(code.is_some());
            codes.push(code.unwrap_or(0));
        }
        let levels: Arc<[Arc<str>]> = distinct.iter().map(|l| Arc::from(*l)).collect();

        Self::from_parts(
            name,
            ColumnData::Categorical {
                codes,
                levels,
                validity,
            },
        )
    }

    /// Build a categorical column over an existing level set from `Str` values.
    pub fn with_levels(
        name: impl Into<String>,
        levels: Arc<[Arc<str>]>,
        values: &[Value],
    ) -> Result<Self, SchemaError> {
        let name = name.into();
        let lookup: HashMap<&str, u32> = levels
            .iter()
            .enumerate()
            .map(|(idx, l)| (l.as_ref(), idx as u32))
            .collect();

        let mut codes = Vec::with_capacity(values.len());
        let mut validity = BitVec::with_capacity_bits(values.len());
        for v in values {
            match v {
                Value::Null => {
                    codes.push(0);
                    validity.push(false);
                }
                Value::Str(label) => {
                    let Some(&code) = lookup.get(label.as_ref()) else {
                        return Err(SchemaError::UnknownLevel {
                            column: name,
                            label: label.to_string(),
                        });
                    };
                    codes.push(code);
                    validity.push(true);
                }
                other => {
                    return Err(SchemaError::TypeMismatch {
                        column: name,
                        expected: DataType::Categorical,
                        actual: other.data_type().unwrap_or(DataType::Categorical),
                    })
                }
            }
        }
        Ok(Self::from_parts(
            name,
            ColumnData::Categorical {
                codes,
                levels,
                validity,
            },
        ))
    }

    /// Build a column of `data_type` from dynamic values.
    ///
    /// Integers are accepted by float columns; strings build a categorical column via
    /// [`Column::factor`].
    pub fn from_values(
        name: impl Into<String>,
        data_type: DataType,
        values: &[Value],
    ) -> Result<Self, SchemaError> {
        let name = name.into();
        let mismatch = |v: &Value| SchemaError::TypeMismatch {
            column: name.clone(),
            expected: data_type,
            actual: v.data_type().unwrap_or(data_type),
        };

        match data_type {
            DataType::Int => {
                let mut out = Vec::with_capacity(values.len());
                for v in values {
                    match v {
                        Value::Null => out.push(None),
                        Value::Int(i) => out.push(Some(*i)),
                        other => return Err(mismatch(other)),
                    }
                }
                Ok(Self::int(name, out))
            }
            DataType::Float => {
                let mut out = Vec::with_capacity(values.len());
                for v in values {
                    match v {
                        Value::Null => out.push(None),
                        Value::Float(f) => out.push(Some(*f)),
                        Value::Int(i) => out.push(Some(*i as f64)),
                        other => return Err(mismatch(other)),
                    }
                }
                Ok(Self::float(name, out))
            }
            DataType::Bool => {
                let mut out = Vec::with_capacity(values.len());
                for v in values {
                    match v {
                        Value::Null => out.push(None),
                        Value::Bool(b) => out.push(Some(*b)),
                        other => return Err(mismatch(other)),
                    }
                }
                Ok(Self::boolean(name, out))
            }
            DataType::Str | DataType::Categorical => {
                let mut out: Vec<Option<&str>> = Vec::with_capacity(values.len());
                for v in values {
                    match v {
                        Value::Null => out.push(None),
                        Value::Str(s) => out.push(Some(s.as_ref())),
                        other => return Err(mismatch(other)),
                    }
                }
                if data_type == DataType::Str {
                    Ok(Self::string(name, out))
                } else {
                    Ok(Self::factor(name, out))
                }
            }
        }
    }

    /// Build a column from values whose type is discovered from the data.
    ///
    /// `Int` and `Float` values unify to `Float`; other mixes are rejected. An all-null input
    /// produces a column of type `fallback`.
    pub fn infer(
        name: impl Into<String>,
        values: &[Value],
        fallback: DataType,
    ) -> Result<Self, SchemaError> {
        let name = name.into();
        let mut seen: Option<DataType> = None;
        for v in values {
            let Some(t) = v.data_type() else {
                continue;
            };
            seen = match seen {
                None => Some(t),
                Some(prev) if prev == t => Some(prev),
                Some(prev) if prev.is_numeric() && t.is_numeric() => Some(DataType::Float),
                Some(prev) => {
                    return Err(SchemaError::InconsistentTypes {
                        column: name,
                        first: prev,
                        second: t,
                    })
                }
            };
        }
        Self::from_values(name, seen.unwrap_or(fallback), values)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    pub fn data_type(&self) -> DataType {
        self.data.data_type()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn null_count(&self) -> usize {
        self.data.validity().count_zeros()
    }

    pub fn is_valid(&self, row: usize) -> bool {
        self.data.validity().get(row)
    }

    /// Level set of a categorical column.
    pub fn levels(&self) -> Option<&Arc<[Arc<str>]>> {
        match &self.data {
            ColumnData::Categorical { levels, .. } => Some(levels),
            _ => None,
        }
    }

    /// Read one cell. Out-of-range rows read as null.
    pub fn get(&self, row: usize) -> Value {
        if row >= self.len() || !self.is_valid(row) {
            return Value::Null;
        }
        match &self.data {
            ColumnData::Int { values, .. } => Value::Int(values[row]),
            ColumnData::Float { values, .. } => Value::Float(values[row]),
            ColumnData::Bool { values, .. } => Value::Bool(values.get(row)),
            ColumnData::Str { values, .. } => Value::Str(values[row].clone()),
            ColumnData::Categorical { codes, levels, .. } => {
                Value::Str(levels[codes[row] as usize].clone())
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Value> + '_ {
        (0..self.len()).map(move |row| self.get(row))
    }

    /// Gather the given rows into a new column. Categorical levels are shared.
    pub fn take(&self, rows: &[usize]) -> Column {
        self.gather(rows.iter().map(|&r| Some(r)), rows.len())
    }

    /// Gather rows where `None` produces a null cell (outer-join padding).
    pub fn take_opt(&self, rows: &[Option<usize>]) -> Column {
        self.gather(rows.iter().copied(), rows.len())
    }

    fn gather(&self, rows: impl Iterator<Item = Option<usize>>, len: usize) -> Column {
        let mut validity = BitVec::with_capacity_bits(len);
        let data = match &self.data {
            ColumnData::Int { values, validity: v } => {
                let mut out = Vec::with_capacity(len);
                for row in rows {
                    let ok = row.is_some_and(|r| v.get(r));
                    validity.push(ok);
                    out.push(if ok { row.map_or(0, |r| values[r]) } else { 0 });
                }
                ColumnData::Int {
                    values: out,
                    validity,
                }
            }
            ColumnData::Float { values, validity: v } => {
                let mut out = Vec::with_capacity(len);
                for row in rows {
                    let ok = row.is_some_and(|r| v.get(r));
                    validity.push(ok);
                    out.push(if ok { row.map_or(0.0, |r| values[r]) } else { 0.0 });
                }
                ColumnData::Float {
                    values: out,
                    validity,
                }
            }
            ColumnData::Bool { values, validity: v } => {
                let mut out = BitVec::with_capacity_bits(len);
                for row in rows {
                    let ok = row.is_some_and(|r| v.get(r));
                    validity.push(ok);
                    out.push(ok && row.is_some_and(|r| values.get(r)));
                }
                ColumnData::Bool {
                    values: out,
                    validity,
                }
            }
            ColumnData::Str { values, validity: v } => {
                let blank = empty_str();
                let mut out = Vec::with_capacity(len);
                for row in rows {
                    match row.filter(|&r| v.get(r)) {
                        Some(r) => {
                            validity.push(true);
                            out.push(values[r].clone());
                        }
                        None => {
                            validity.push(false);
                            out.push(blank.clone());
                        }
                    }
                }
                ColumnData::Str {
                    values: out,
                    validity,
                }
            }
            ColumnData::Categorical {
                codes,
                levels,
                validity: v,
            } => {
                let mut out = Vec::with_capacity(len);
                for row in rows {
                    let ok = row.is_some_and(|r| v.get(r));
                    validity.push(ok);
                    out.push(if ok { row.map_or(0, |r| codes[r]) } else { 0 });
                }
                ColumnData::Categorical {
                    codes: out,
                    levels: levels.clone(),
                    validity,
                }
            }
        };
        Column {
            name: self.name.clone(),
            data,
        }
    }
}

fn split_options<T: Copy>(values: impl IntoIterator<Item = Option<T>>, blank: T) -> (Vec<T>, BitVec) {
    let iter = values.into_iter();
    let (lower, _) = iter.size_hint();
    let mut out = Vec::with_capacity(lower);
    let mut validity = BitVec::with_capacity_bits(lower);
    for v in iter {
        validity.push(v.is_some());
        out.push(v.unwrap_or(blank));
    }
    (out, validity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factor_levels_are_sorted_distinct_labels() {
        let col = Column::factor("g", [Some("b"), None, Some("a"), Some("b")]);
        let levels: Vec<&str> = col.levels().unwrap().iter().map(|l| l.as_ref()).collect();
        assert_eq!(levels, vec!["a", "b"]);
        assert_eq!(col.get(0), Value::from("b"));
        assert_eq!(col.get(1), Value::Null);
        assert_eq!(col.null_count(), 1);
    }

    #[test]
    fn categorical_rejects_unknown_label() {
        let err = Column::categorical("g", ["x"], [Some("y")]).unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnknownLevel {
                column: "g".into(),
                label: "y".into()
            }
        );
    }

    #[test]
    fn take_opt_pads_with_nulls() {
        let col = Column::int("x", [Some(1), None, Some(3)]);
        let taken = col.take_opt(&[Some(2), None, Some(1), Some(0)]);
        let values: Vec<Value> = taken.iter().collect();
        assert_eq!(
            values,
            vec![Value::Int(3), Value::Null, Value::Null, Value::Int(1)]
        );
    }

    #[test]
    fn infer_unifies_numbers_and_rejects_mixes() {
        let col = Column::infer("v", &[Value::Int(1), Value::Null, Value::Float(2.5)], DataType::Bool)
            .unwrap();
        assert_eq!(col.data_type(), DataType::Float);
        assert_eq!(col.get(0), Value::Float(1.0));

        let all_null = Column::infer("v", &[Value::Null, Value::Null], DataType::Bool).unwrap();
        assert_eq!(all_null.data_type(), DataType::Bool);
        assert_eq!(all_null.null_count(), 2);

        let err = Column::infer("v", &[Value::Int(1), Value::from("a")], DataType::Bool).unwrap_err();
        assert!(matches!(err, SchemaError::InconsistentTypes { .. }));
    }

    fn two_levels() -> Arc<[Arc<str>]> {
        ["lo", "hi"].into_iter().map(Arc::from).collect()
    }

    #[test]
    fn new_rejects_payloads_that_disagree_with_validity() {
        let validity: BitVec = [true, true].into_iter().collect();
        let err = Column::new(
            "x",
            ColumnData::Int {
                values: vec![1],
                validity: validity.clone(),
            },
        )
        .unwrap_err();
        assert_eq!(
            err,
            SchemaError::LengthMismatch {
                column: "x".into(),
                expected: 2,
                actual: 1
            }
        );

        let err = Column::new(
            "c",
            ColumnData::Categorical {
                codes: vec![0, 2],
                levels: two_levels(),
                validity,
            },
        )
        .unwrap_err();
        assert_eq!(
            err,
            SchemaError::CodeOutOfRange {
                column: "c".into(),
                code: 2,
                levels: 2
            }
        );
    }

    #[test]
    fn new_ignores_codes_behind_nulls() {
        let validity: BitVec = [true, false].into_iter().collect();
        let col = Column::new(
            "c",
            ColumnData::Categorical {
                codes: vec![1, 7],
                levels: two_levels(),
                validity,
            },
        )
        .unwrap();
        assert_eq!(col.iter().collect::<Vec<_>>(), vec![Value::from("hi"), Value::Null]);
    }

    #[test]
    fn with_levels_keeps_the_given_level_order() {
        let col = Column::with_levels("c", two_levels(), &[Value::from("hi"), Value::Null]).unwrap();
        let levels: Vec<&str> = col.levels().unwrap().iter().map(|l| l.as_ref()).collect();
        assert_eq!(levels, vec!["lo", "hi"]);
        assert_eq!(col.get(0), Value::from("hi"));

        let err = Column::with_levels("c", two_levels(), &[Value::from("mid")]).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownLevel { .. }));
    }
}
