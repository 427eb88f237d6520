//! Partitioning of a table's rows by key columns.
//!
//! Groups are numbered in **first-appearance order**: group `0` holds the key-tuple of row `0`,
//! the next new key-tuple encountered becomes group `1`, and so on. Summarise output order and
//! mutate/filter group iteration order both follow this numbering, so it must never be replaced
//! by a sorted order.

use ahash::AHashMap;
use tidyframe_columnar::{SchemaError, Table, Value};

use crate::error::GroupKey;
use crate::key::{KeyColumns, RowKey};

/// Row partition of one table by zero or more key columns.
///
/// Partitions are stored compressed-sparse-row style: the rows of group `g` are
/// `rows[offsets[g]..offsets[g + 1]]`, in original table order.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupIndex {
    key_names: Vec<String>,
    keys: Table,
    row_groups: Vec<u32>,
    offsets: Vec<usize>,
    rows: Vec<usize>,
}

impl GroupIndex {
    /// A single partition holding every row (also when the table is empty).
    pub fn ungrouped(row_count: usize) -> Self {
        Self {
            key_names: Vec::new(),
            keys: Table::with_row_count(Vec::new(), 1).unwrap_or_default(),
            row_groups: vec![0; row_count],
            offsets: vec![0, row_count],
            rows: (0..row_count).collect(),
        }
    }

    /// Partition `table` by `key_names`.
    pub fn build<S: AsRef<str>>(table: &Table, key_names: &[S]) -> Result<Self, SchemaError> {
        let names: Vec<&str> = key_names.iter().map(AsRef::as_ref).collect();
        for (idx, name) in names.iter().enumerate() {
            if names[..idx].contains(name) {
                return Err(SchemaError::DuplicateColumn {
                    column: (*name).to_owned(),
                });
            }
        }
        let mut columns = Vec::with_capacity(names.len());
        for name in &names {
            columns.push(table.column(name)?);
        }
        if columns.is_empty() {
            return Ok(Self::ungrouped(table.row_count()));
        }

        let n = table.row_count();
        let keys = KeyColumns::exact(columns);
        let mut ids: AHashMap<RowKey, u32> = AHashMap::new();
        let mut row_groups = Vec::with_capacity(n);
        let mut first_rows: Vec<usize> = Vec::new();
        let mut counts: Vec<usize> = Vec::new();

        for row in 0..n {
            let next = first_rows.len() as u32;
            let id = *ids.entry(keys.row_key(row)).or_insert_with(|| {
                first_rows.push(row);
                counts.push(0);
                next
            });
            counts[id as usize] += 1;
            row_groups.push(id);
        }

        let mut offsets = Vec::with_capacity(counts.len() + 1);
        offsets.push(0);
        for count in &counts {
            let last = offsets[offsets.len() - 1];
            offsets.push(last + count);
        }
        let mut cursor: Vec<usize> = offsets[..counts.len()].to_vec();
        let mut rows = vec![0usize; n];
        for (row, &group) in row_groups.iter().enumerate() {
            let slot = &mut cursor[group as usize];
            rows[*slot] = row;
            *slot += 1;
        }

        let key_table = table.select(&names)?.take(&first_rows);
        log::debug!(
            "group index: {n} rows into {} groups by {names:?}",
            first_rows.len()
        );

        Ok(Self {
            key_names: names.iter().map(|s| (*s).to_owned()).collect(),
            keys: key_table,
            row_groups,
            offsets,
            rows,
        })
    }

    pub fn is_grouped(&self) -> bool {
        !self.key_names.is_empty()
    }

    pub fn key_names(&self) -> &[String] {
        &self.key_names
    }

    /// One row per group, in group order, holding each group's key values.
    pub fn keys(&self) -> &Table {
        &self.keys
    }

    pub fn group_count(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn row_count(&self) -> usize {
        self.row_groups.len()
    }

    /// Row positions of group `group`, in original table order.
    pub fn partition(&self, group: usize) -> &[usize] {
        &self.rows[self.offsets[group]..self.offsets[group + 1]]
    }

    pub fn partitions(&self) -> impl Iterator<Item = &[usize]> + '_ {
        (0..self.group_count()).map(move |g| self.partition(g))
    }

    pub fn group_of(&self, row: usize) -> usize {
        self.row_groups[row] as usize
    }

    pub fn key_tuple(&self, group: usize) -> Vec<Value> {
        self.keys.row(group)
    }

    pub fn group_key(&self, group: usize) -> GroupKey {
        GroupKey::new(
            self.key_names
                .iter()
                .cloned()
                .zip(self.key_tuple(group))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidyframe_columnar::Column;

    #[test]
    fn groups_follow_first_appearance() {
        let table = Table::new(vec![
            Column::string("g", [Some("b"), Some("a"), Some("b"), None, Some("a"), None]),
            Column::int("x", [Some(1), Some(2), Some(3), Some(4), Some(5), Some(6)]),
        ])
        .unwrap();

        let index = GroupIndex::build(&table, &["g"]).unwrap();
        assert_eq!(index.group_count(), 3);
        assert_eq!(index.partition(0), &[0, 2]);
        assert_eq!(index.partition(1), &[1, 4]);
        assert_eq!(index.partition(2), &[3, 5]);
        assert_eq!(index.key_tuple(2), vec![Value::Null]);
        assert_eq!(index.group_of(4), 1);
    }

    #[test]
    fn ungrouped_empty_table_has_one_empty_partition() {
        let index = GroupIndex::ungrouped(0);
        assert_eq!(index.group_count(), 1);
        assert!(index.partition(0).is_empty());
        assert_eq!(index.keys().row_count(), 1);
        assert_eq!(index.group_key(0).to_string(), "<all rows>");
    }

    #[test]
    fn rejects_repeated_key_names() {
        let table = Table::new(vec![Column::int("k", [Some(1)])]).unwrap();
        let err = GroupIndex::build(&table, &["k", "k"]).unwrap_err();
        assert_eq!(
            err,
            SchemaError::DuplicateColumn {
                column: "k".into()
            }
        );
    }
}
