#![forbid(unsafe_code)]

use crate::bitmap::BitVec;
use crate::column::{Column, ColumnData};
use crate::types::{DataType, Value};
use std::sync::Arc;

/// Read-only view over one column, optionally restricted to (and reordered by) a list of row
/// positions.
///
/// Position `i` of the view reads row `rows[i]` of the column, or row `i` when the view covers
/// the whole column.
#[derive(Clone, Copy, Debug)]
pub struct ColumnView<'a> {
    column: &'a Column,
    rows: Option<&'a [usize]>,
}

impl<'a> ColumnView<'a> {
    pub fn full(column: &'a Column) -> Self {
        Self { column, rows: None }
    }

    pub fn with_rows(column: &'a Column, rows: &'a [usize]) -> Self {
        Self {
            column,
            rows: Some(rows),
        }
    }

    pub fn column(&self) -> &'a Column {
        self.column
    }

    pub fn name(&self) -> &'a str {
        self.column.name()
    }

    pub fn data_type(&self) -> DataType {
        self.column.data_type()
    }

    pub fn len(&self) -> usize {
        self.rows.map_or(self.column.len(), <[usize]>::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Source row backing view position `idx`.
    #[inline]
    pub fn row(&self, idx: usize) -> usize {
        match self.rows {
            Some(rows) => rows[idx],
            None => idx,
        }
    }

    #[inline]
    pub fn is_valid(&self, idx: usize) -> bool {
        self.column.is_valid(self.row(idx))
    }

    pub fn get(&self, idx: usize) -> Value {
        self.column.get(self.row(idx))
    }

    pub fn iter(&self) -> impl Iterator<Item = Value> + 'a {
        let view = *self;
        (0..view.len()).map(move |idx| view.get(idx))
    }

    pub fn null_count(&self) -> usize {
        (0..self.len()).filter(|&idx| !self.is_valid(idx)).count()
    }

    /// Gather an integer column into a contiguous buffer plus validity.
    pub fn i64_buffer(&self) -> Option<(Vec<i64>, BitVec)> {
        let ColumnData::Int { values, .. } = self.column.data() else {
            return None;
        };
        Some(self.gather(|row| values[row]))
    }

    /// Gather a float column into a contiguous buffer plus validity.
    pub fn f64_buffer(&self) -> Option<(Vec<f64>, BitVec)> {
        let ColumnData::Float { values, .. } = self.column.data() else {
            return None;
        };
        Some(self.gather(|row| values[row]))
    }

    /// Gather a boolean column into a contiguous buffer plus validity.
    pub fn bool_buffer(&self) -> Option<(Vec<bool>, BitVec)> {
        let ColumnData::Bool { values, .. } = self.column.data() else {
            return None;
        };
        Some(self.gather(|row| values.get(row)))
    }

    /// Gather categorical codes; the level set is returned alongside.
    pub fn code_buffer(&self) -> Option<(Vec<u32>, BitVec, Arc<[Arc<str>]>)> {
        let ColumnData::Categorical { codes, levels, .. } = self.column.data() else {
            return None;
        };
        let (codes, validity) = self.gather(|row| codes[row]);
        Some((codes, validity, levels.clone()))
    }

    fn gather<T: Default>(&self, read: impl Fn(usize) -> T) -> (Vec<T>, BitVec) {
        let len = self.len();
        let mut out = Vec::with_capacity(len);
        let mut validity = BitVec::with_capacity_bits(len);
        for idx in 0..len {
            let row = self.row(idx);
            let ok = self.column.is_valid(row);
            validity.push(ok);
            out.push(if ok { read(row) } else { T::default() });
        }
        (out, validity)
    }

    /// Materialize the view as an owned column.
    pub fn to_column(&self) -> Column {
        match self.rows {
            Some(rows) => self.column.take(rows),
            None => self.column.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_maps_positions_through_rows() {
        let col = Column::float("x", [Some(1.0), None, Some(3.0), Some(4.0)]);
        let rows = [3, 1, 0];
        let view = ColumnView::with_rows(&col, &rows);
        assert_eq!(view.len(), 3);
        assert_eq!(view.get(0), Value::Float(4.0));
        assert_eq!(view.null_count(), 1);

        let (values, validity) = view.f64_buffer().unwrap();
        assert_eq!(values, vec![4.0, 0.0, 1.0]);
        assert_eq!(validity.iter().collect::<Vec<_>>(), vec![true, false, true]);
        assert!(view.i64_buffer().is_none());
    }
}
