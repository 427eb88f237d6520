use std::sync::Arc;

use tidyframe_columnar::{Column, SchemaError, Table};

use crate::group_index::GroupIndex;

/// Grouping state carried between chained verbs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Grouping {
    #[default]
    Ungrouped,
    GroupedBy(Vec<String>),
}

impl Grouping {
    pub fn keys(&self) -> &[String] {
        match self {
            Grouping::Ungrouped => &[],
            Grouping::GroupedBy(keys) => keys,
        }
    }
}

/// A table together with its grouping and the matching partition index.
///
/// The index always describes the current table: every verb that changes rows or key values
/// returns a frame with a freshly built index.
#[derive(Clone, Debug)]
pub struct Frame {
    table: Arc<Table>,
    grouping: Grouping,
    index: Arc<GroupIndex>,
}

impl Frame {
    pub fn new(table: Table) -> Self {
        let index = GroupIndex::ungrouped(table.row_count());
        Self {
            table: Arc::new(table),
            grouping: Grouping::Ungrouped,
            index: Arc::new(index),
        }
    }

    /// Group `table` by `keys`. No keys gives an ungrouped frame.
    pub fn grouped<S: AsRef<str>>(table: Table, keys: &[S]) -> Result<Self, SchemaError> {
        let keys = keys.iter().map(|k| k.as_ref().to_owned()).collect();
        Self::with_grouping(table, Grouping::GroupedBy(keys))
    }

    pub(crate) fn with_grouping(table: Table, grouping: Grouping) -> Result<Self, SchemaError> {
        if grouping.keys().is_empty() {
            return Ok(Self::new(table));
        }
        let index = GroupIndex::build(&table, grouping.keys())?;
        Ok(Self {
            table: Arc::new(table),
            grouping,
            index: Arc::new(index),
        })
    }

    /// Same rows and key values, new non-key content: the index carries over.
    pub(crate) fn with_table(&self, table: Table) -> Self {
        Self {
            table: Arc::new(table),
            grouping: self.grouping.clone(),
            index: self.index.clone(),
        }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn into_table(self) -> Table {
        Arc::try_unwrap(self.table).unwrap_or_else(|shared| (*shared).clone())
    }

    pub fn grouping(&self) -> &Grouping {
        &self.grouping
    }

    pub fn group_keys(&self) -> &[String] {
        self.grouping.keys()
    }

    pub fn is_grouped(&self) -> bool {
        !self.group_keys().is_empty()
    }

    pub fn index(&self) -> &GroupIndex {
        &self.index
    }

    pub fn group_count(&self) -> usize {
        self.index.group_count()
    }

    pub fn row_count(&self) -> usize {
        self.table.row_count()
    }

    pub fn column(&self, name: &str) -> Result<&Column, SchemaError> {
        self.table.column(name)
    }

    pub fn ungroup(self) -> Frame {
        if self.is_grouped() {
            Frame::new(self.into_table())
        } else {
            self
        }
    }
}

impl From<Table> for Frame {
    fn from(table: Table) -> Self {
        Frame::new(table)
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.grouping == other.grouping && self.table == other.table
    }
}
