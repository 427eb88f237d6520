//! In-memory columnar tables for tidyframe.
//!
//! This crate is the storage side of the verb engine:
//! - typed columns (`int`, `float`, `bool`, `str`, categorical) with validity bitmaps,
//! - immutable [`Table`]s built from named columns or row by row ([`TableBuilder`]),
//! - borrowed [`ColumnView`]s that read a column through a row-index mapping.
//!
//! Tables never change after construction; every transformation returns a new table.

#![forbid(unsafe_code)]

mod bitmap;
mod column;
mod error;
mod table;
mod types;
mod view;

pub use crate::bitmap::BitVec;
pub use crate::column::{Column, ColumnData};
pub use crate::error::SchemaError;
pub use crate::table::{ColumnSchema, Table, TableBuilder};
pub use crate::types::{total_cmp_f64, DataType, Value};
pub use crate::view::ColumnView;
