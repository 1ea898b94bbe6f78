//! Row-addressed collection of named columns.
//!
//! # Disk layout
//! ```text
//! {prefix}.meta      ← bincode TableHeader
//! {prefix}.col_{i}   ← one file per stored column (strings: .items + .data)
//! ```

use crate::arena::with_suffix;
use crate::column::Column;
use crate::error::{GraphError, Result};
use crate::property::Any;
use crate::types::{PropertyType, StorageStrategy};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

#[derive(Debug, Serialize, Deserialize)]
struct TableHeader {
    capacity: usize,
    rows: usize,
    names: Vec<String>,
    types: Vec<PropertyType>,
    strategies: Vec<StorageStrategy>,
}

#[derive(Default)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<Column>,
    col_ids: AHashMap<String, usize>,
    capacity: usize,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate every column for `max_rows` rows. Missing strategies default to `Mem`.
    pub fn init(
        &mut self,
        names: &[String],
        types: &[PropertyType],
        strategies: &[StorageStrategy],
        max_rows: usize,
    ) -> Result<()> {
        if names.len() != types.len() {
            return Err(GraphError::ColumnCountMismatch { expected: names.len(), found: types.len() });
        }
        self.names.clear();
        self.columns.clear();
        self.col_ids.clear();
        for (i, (name, ty)) in names.iter().zip(types).enumerate() {
            let strategy = strategies.get(i).copied().unwrap_or_default();
            let mut column = Column::new(*ty, strategy);
            column.resize(max_rows)?;
            self.col_ids.insert(name.clone(), i);
            self.names.push(name.clone());
            self.columns.push(column);
        }
        self.capacity = max_rows;
        Ok(())
    }

    pub fn col_num(&self) -> usize {
        self.columns.len()
    }

    /// Maximum number of rows the table was sized for.
    pub fn row_capacity(&self) -> usize {
        self.capacity
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn column_types(&self) -> Vec<PropertyType> {
        self.columns.iter().map(|c| c.property_type()).collect()
    }

    pub fn get_column_id(&self, name: &str) -> Option<usize> {
        self.col_ids.get(name).copied()
    }

    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.get_column_id(name).map(|id| &self.columns[id])
    }

    pub fn get_column_by_id(&self, id: usize) -> Option<&Column> {
        self.columns.get(id)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Replace row `row` with `values`, one per column in column order.
    pub fn insert(&mut self, row: usize, values: &[Any<'_>]) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(GraphError::ColumnCountMismatch { expected: self.columns.len(), found: values.len() });
        }
        if row >= self.capacity {
            return Err(GraphError::CapacityExceeded { what: "vertex table", capacity: self.capacity });
        }
        for (column, value) in self.columns.iter_mut().zip(values) {
            if row >= column.size() {
                column.resize(self.capacity)?;
            }
            column.set_any(row, value)?;
        }
        Ok(())
    }

    pub fn get(&self, row: usize, col: usize) -> Option<Any<'_>> {
        let column = self.columns.get(col)?;
        (row < column.size()).then(|| column.get(row))
    }

    /// All column values of `row`, in column order.
    pub fn get_row(&self, row: usize) -> Vec<Any<'_>> {
        self.columns
            .iter()
            .map(|c| if row < c.size() { c.get(row) } else { Any::Empty })
            .collect()
    }

    /// Persist the header and the first `rows` rows of every column.
    pub fn serialize(&self, prefix: &Path, rows: usize) -> Result<()> {
        let header = TableHeader {
            capacity: self.capacity,
            rows,
            names: self.names.clone(),
            types: self.column_types(),
            strategies: self.columns.iter().map(|c| c.storage_strategy()).collect(),
        };
        let writer = BufWriter::new(File::create(with_suffix(prefix, "meta"))?);
        bincode::serialize_into(writer, &header)?;
        for (i, column) in self.columns.iter().enumerate() {
            column.serialize(&with_suffix(prefix, &format!("col_{}", i)), rows)?;
        }
        Ok(())
    }

    /// Map a table written by [`Table::serialize`]. Columns stay file-backed
    /// until the first insert past the persisted rows.
    pub fn deserialize(prefix: &Path) -> Result<Self> {
        let meta = with_suffix(prefix, "meta");
        let header: TableHeader = bincode::deserialize_from(BufReader::new(File::open(&meta)?))?;
        if header.names.len() != header.types.len() || header.names.len() != header.strategies.len() {
            return Err(GraphError::corrupt(&meta, "column header lengths differ"));
        }
        let mut table = Table { capacity: header.capacity, ..Default::default() };
        for (i, name) in header.names.iter().enumerate() {
            let mut column = Column::new(header.types[i], header.strategies[i]);
            column.deserialize(&with_suffix(prefix, &format!("col_{}", i)), header.rows)?;
            table.col_ids.insert(name.clone(), i);
            table.names.push(name.clone());
            table.columns.push(column);
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn person_table(rows: usize) -> Table {
        let mut table = Table::new();
        table
            .init(
                &["id".to_string(), "name".to_string(), "nickname".to_string()],
                &[PropertyType::Int64, PropertyType::String, PropertyType::String],
                &[StorageStrategy::Mem, StorageStrategy::Mem, StorageStrategy::None],
                rows,
            )
            .unwrap();
        table
    }

    #[test]
    fn test_insert_full_row() {
        let mut table = person_table(4);
        table.insert(1, &[Any::Int64(7), Any::from("bob"), Any::from("bobby")]).unwrap();
        let row = table.get_row(1);
        assert_eq!(row[0], Any::Int64(7));
        assert_eq!(row[1].as_str().unwrap(), "bob");
        assert_eq!(row[2], Any::Empty);
        assert_eq!(table.get_column_id("name"), Some(1));
        assert!(table.get_column("missing").is_none());
    }

    #[test]
    fn test_insert_checks() {
        let mut table = person_table(2);
        assert!(matches!(
            table.insert(0, &[Any::Int64(1)]),
            Err(GraphError::ColumnCountMismatch { expected: 3, found: 1 })
        ));
        assert!(matches!(
            table.insert(2, &[Any::Int64(1), Any::from("x"), Any::Empty]),
            Err(GraphError::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn test_table_files() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("vertex_table_person");
        let mut table = person_table(10);
        for i in 0..3 {
            table.insert(i, &[Any::Int64(i as i64 * 100), Any::from(format!("p{}", i)), Any::Empty]).unwrap();
        }
        table.serialize(&prefix, 3).unwrap();

        let mut back = Table::deserialize(&prefix).unwrap();
        assert_eq!(back.col_num(), 3);
        assert_eq!(back.row_capacity(), 10);
        assert_eq!(back.get(2, 0), Some(Any::Int64(200)));
        assert_eq!(back.get(1, 1).unwrap().as_str().unwrap(), "p1");
        assert_eq!(back.get_column("nickname").unwrap().storage_strategy(), StorageStrategy::None);

        // Growing past the persisted rows remaps onto anonymous memory
        back.insert(5, &[Any::Int64(500), Any::from("p5"), Any::Empty]).unwrap();
        assert_eq!(back.get(5, 0), Some(Any::Int64(500)));
        assert_eq!(back.get(0, 1).unwrap().as_str().unwrap(), "p0");
    }
}
