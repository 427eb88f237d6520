#![forbid(unsafe_code)]

use crate::column::Column;
use crate::error::SchemaError;
use crate::types::{DataType, Value};
use crate::view::ColumnView;
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: DataType,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// An immutable, ordered collection of equally long, uniquely named columns.
///
/// The row count is stored explicitly so tables without columns (for example the key table of
/// an ungrouped index) still know how many rows they describe.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    column_index: HashMap<String, usize>,
    rows: usize,
}

impl Default for Table {
    fn default() -> Self {
        Self::empty()
    }
}

impl Table {
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            column_index: HashMap::new(),
            rows: 0,
        }
    }

    /// Build a table from named columns. All columns must have the same length and distinct
    /// names.
    pub fn new(columns: Vec<Column>) -> Result<Self, SchemaError> {
        let rows = columns.first().map_or(0, Column::len);
        Self::with_row_count(columns, rows)
    }

    /// Like [`Table::new`], but with an explicit row count (needed when `columns` is empty).
    pub fn with_row_count(columns: Vec<Column>, rows: usize) -> Result<Self, SchemaError> {
        let mut column_index = HashMap::with_capacity(columns.len());
        for (idx, column) in columns.iter().enumerate() {
            if column.len() != rows {
                return Err(SchemaError::LengthMismatch {
                    column: column.name().to_owned(),
                    expected: rows,
                    actual: column.len(),
                });
            }
            if column_index.insert(column.name().to_owned(), idx).is_some() {
                return Err(SchemaError::DuplicateColumn {
                    column: column.name().to_owned(),
                });
            }
        }
        Ok(Self {
            columns,
            column_index,
            rows,
        })
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.iter().map(Column::name)
    }

    pub fn schema(&self) -> Vec<ColumnSchema> {
        self.columns
            .iter()
            .map(|c| ColumnSchema::new(c.name(), c.data_type()))
            .collect()
    }

    pub fn column_idx(&self, name: &str) -> Option<usize> {
        self.column_index.get(name).copied()
    }

    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.column_idx(name).map(|idx| &self.columns[idx])
    }

    /// Look up a column by name, failing with [`SchemaError::UnknownColumn`].
    pub fn column(&self, name: &str) -> Result<&Column, SchemaError> {
        self.get_column(name)
            .ok_or_else(|| SchemaError::UnknownColumn {
                column: name.to_owned(),
            })
    }

    /// A view over `name` restricted to `rows`.
    pub fn view<'a>(&'a self, name: &str, rows: &'a [usize]) -> Result<ColumnView<'a>, SchemaError> {
        Ok(ColumnView::with_rows(self.column(name)?, rows))
    }

    pub fn value(&self, row: usize, name: &str) -> Option<Value> {
        let column = self.get_column(name)?;
        (row < self.rows).then(|| column.get(row))
    }

    pub fn row(&self, row: usize) -> Vec<Value> {
        self.columns.iter().map(|c| c.get(row)).collect()
    }

    /// Gather rows (in the given order, repeats allowed) into a new table.
    pub fn take(&self, rows: &[usize]) -> Table {
        Table {
            columns: self.columns.iter().map(|c| c.take(rows)).collect(),
            column_index: self.column_index.clone(),
            rows: rows.len(),
        }
    }

    /// Keep only the named columns, in the given order.
    pub fn select(&self, names: &[&str]) -> Result<Table, SchemaError> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            columns.push(self.column(name)?.clone());
        }
        Table::with_row_count(columns, self.rows)
    }

    /// Replace the column with the same name in place, or append it.
    pub fn with_column(&self, column: Column) -> Result<Table, SchemaError> {
        if column.len() != self.rows {
            return Err(SchemaError::LengthMismatch {
                column: column.name().to_owned(),
                expected: self.rows,
                actual: column.len(),
            });
        }
        let mut out = self.clone();
        match out.column_idx(column.name()) {
            Some(idx) => out.columns[idx] = column,
            None => {
                out.column_index
                    .insert(column.name().to_owned(), out.columns.len());
                out.columns.push(column);
            }
        }
        Ok(out)
    }
}

/// Row-at-a-time table construction.
///
/// Values are validated against the schema on append; integers are accepted by float columns.
#[derive(Debug)]
pub struct TableBuilder {
    schema: Vec<ColumnSchema>,
    values: Vec<Vec<Value>>,
    rows: usize,
}

impl TableBuilder {
    pub fn new(schema: Vec<ColumnSchema>) -> Self {
        let values = schema.iter().map(|_| Vec::new()).collect();
        Self {
            schema,
            values,
            rows: 0,
        }
    }

    pub fn append_row(&mut self, row: &[Value]) -> Result<(), SchemaError> {
        if row.len() != self.schema.len() {
            return Err(SchemaError::ArityMismatch {
                expected: self.schema.len(),
                actual: row.len(),
            });
        }
        for (schema, value) in self.schema.iter().zip(row) {
            let Some(actual) = value.data_type() else {
                continue;
            };
            let fits = match schema.data_type {
                DataType::Float => actual.is_numeric(),
                DataType::Categorical => actual == DataType::Str,
                expected => actual == expected,
            };
            if !fits {
                return Err(SchemaError::TypeMismatch {
                    column: schema.name.clone(),
                    expected: schema.data_type,
                    actual,
                });
            }
        }
        for (column, value) in self.values.iter_mut().zip(row) {
            column.push(value.clone());
        }
        self.rows += 1;
        Ok(())
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn finalize(self) -> Result<Table, SchemaError> {
        let mut columns = Vec::with_capacity(self.schema.len());
        for (schema, values) in self.schema.into_iter().zip(self.values) {
            columns.push(Column::from_values(schema.name, schema.data_type, &values)?);
        }
        Table::with_row_count(columns, self.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_column_replaces_in_place_and_appends() {
        let table = Table::new(vec![
            Column::int("a", [Some(1), Some(2)]),
            Column::int("b", [Some(3), Some(4)]),
        ])
        .unwrap();

        let replaced = table
            .with_column(Column::string("a", [Some("x"), None]))
            .unwrap();
        assert_eq!(replaced.column_names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(replaced.value(0, "a"), Some(Value::from("x")));

        let appended = table.with_column(Column::boolean("c", [Some(true), None])).unwrap();
        assert_eq!(appended.column_names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn zero_column_tables_keep_their_row_count() {
        let table = Table::with_row_count(Vec::new(), 3).unwrap();
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.take(&[0, 0]).row_count(), 2);
    }
}
