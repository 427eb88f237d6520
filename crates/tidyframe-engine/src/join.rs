//! Equality hash joins.
//!
//! The right table is the build side: its key tuples are hashed once, then every left row
//! probes the map. Output follows left row order, and the matches of one left row follow
//! right row order.

use ahash::AHashMap;
use tidyframe_columnar::{Column, SchemaError, Table};

use crate::key::{KeyColumns, KeyMode, RowKey};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JoinKind {
    Inner,
    Left,
    Semi,
    Anti,
}

/// Key columns (positionally paired) plus the join kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinPlan {
    pub left_on: Vec<String>,
    pub right_on: Vec<String>,
    pub kind: JoinKind,
    /// Appended to non-key column names present on both sides: `.0` on the left, `.1` on the
    /// right.
    pub suffixes: (String, String),
}

impl JoinPlan {
    pub fn new<L, R>(
        left_on: impl IntoIterator<Item = L>,
        right_on: impl IntoIterator<Item = R>,
        kind: JoinKind,
    ) -> Self
    where
        L: Into<String>,
        R: Into<String>,
    {
        Self {
            left_on: left_on.into_iter().map(Into::into).collect(),
            right_on: right_on.into_iter().map(Into::into).collect(),
            kind,
            suffixes: (".x".to_owned(), ".y".to_owned()),
        }
    }

    /// Join on identically named key columns.
    pub fn on<S: AsRef<str>>(keys: &[S], kind: JoinKind) -> Self {
        let keys: Vec<String> = keys.iter().map(|k| k.as_ref().to_owned()).collect();
        Self::new(keys.clone(), keys, kind)
    }

    pub fn with_suffixes(mut self, left: impl Into<String>, right: impl Into<String>) -> Self {
        self.suffixes = (left.into(), right.into());
        self
    }
}

pub struct JoinEngine<'p> {
    plan: &'p JoinPlan,
}

impl<'p> JoinEngine<'p> {
    pub fn new(plan: &'p JoinPlan) -> Self {
        Self { plan }
    }

    pub fn join(&self, left: &Table, right: &Table) -> Result<Table, SchemaError> {
        let plan = self.plan;
        if plan.left_on.is_empty() || plan.left_on.len() != plan.right_on.len() {
            return Err(SchemaError::JoinArity {
                left: plan.left_on.len(),
                right: plan.right_on.len(),
            });
        }

        let mut left_keys = Vec::with_capacity(plan.left_on.len());
        let mut right_keys = Vec::with_capacity(plan.right_on.len());
        for (l, r) in plan.left_on.iter().zip(&plan.right_on) {
            let lc = left.column(l)?;
            let rc = right.column(r)?;
            let mode = KeyMode::for_join(lc.data_type(), rc.data_type()).ok_or_else(|| {
                SchemaError::IncompatibleJoinKeys {
                    left: l.clone(),
                    left_type: lc.data_type(),
                    right: r.clone(),
                    right_type: rc.data_type(),
                }
            })?;
            left_keys.push((lc, mode));
            right_keys.push((rc, mode));
        }
        let left_keys = KeyColumns::with_modes(left_keys);
        let right_keys = KeyColumns::with_modes(right_keys);

        let built = build(&right_keys, right.row_count());
        log::debug!(
            "join build: {} right rows into {} keys",
            right.row_count(),
            built.len()
        );

        let mut left_rows: Vec<usize> = Vec::with_capacity(left.row_count());
        let mut right_rows: Vec<Option<usize>> = Vec::new();
        for row in 0..left.row_count() {
            let matches: &[usize] = if left_keys.has_null(row) {
                &[]
            } else {
                built
                    .get(&left_keys.row_key(row))
                    .map_or(&[] as &[usize], Vec::as_slice)
            };
            match plan.kind {
                JoinKind::Inner => {
                    for &m in matches {
                        left_rows.push(row);
                        right_rows.push(Some(m));
                    }
                }
                JoinKind::Left => {
                    if matches.is_empty() {
                        left_rows.push(row);
                        right_rows.push(None);
                    }
                    for &m in matches {
                        left_rows.push(row);
                        right_rows.push(Some(m));
                    }
                }
                JoinKind::Semi if !matches.is_empty() => left_rows.push(row),
                JoinKind::Anti if matches.is_empty() => left_rows.push(row),
                JoinKind::Semi | JoinKind::Anti => {}
            }
        }
        log::debug!(
            "join probe ({:?}): {} left rows -> {} output rows",
            plan.kind,
            left.row_count(),
            left_rows.len()
        );

        match plan.kind {
            JoinKind::Semi | JoinKind::Anti => Ok(left.take(&left_rows)),
            JoinKind::Inner | JoinKind::Left => {
                self.assemble(left, right, &left_rows, &right_rows)
            }
        }
    }

    fn assemble(
        &self,
        left: &Table,
        right: &Table,
        left_rows: &[usize],
        right_rows: &[Option<usize>],
    ) -> Result<Table, SchemaError> {
        let plan = self.plan;
        let right_extra: Vec<&Column> = right
            .columns()
            .iter()
            .filter(|c| !plan.right_on.iter().any(|k| k == c.name()))
            .collect();
        // Left key columns keep their names; only non-key collisions are suffixed.
        let clashes = |name: &str| {
            !plan.left_on.iter().any(|k| k == name)
                && right_extra.iter().any(|c| c.name() == name)
        };

        let mut columns = Vec::with_capacity(left.column_count() + right_extra.len());
        for column in left.columns() {
            let taken = column.take(left_rows);
            columns.push(if clashes(column.name()) {
                let name = format!("{}{}", column.name(), plan.suffixes.0);
                taken.renamed(name)
            } else {
                taken
            });
        }
        for column in &right_extra {
            let taken = column.take_opt(right_rows);
            columns.push(if left.get_column(column.name()).is_some() {
                let name = format!("{}{}", column.name(), plan.suffixes.1);
                taken.renamed(name)
            } else {
                taken
            });
        }
        Table::with_row_count(columns, left_rows.len())
    }
}

fn build(keys: &KeyColumns<'_>, rows: usize) -> AHashMap<RowKey, Vec<usize>> {
    let mut map: AHashMap<RowKey, Vec<usize>> = AHashMap::with_capacity(rows);
    for row in 0..rows {
        if keys.has_null(row) {
            continue;
        }
        map.entry(keys.row_key(row)).or_default().push(row);
    }
    map
}
