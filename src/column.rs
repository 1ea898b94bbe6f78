//! Typed property columns over the mapped buffers.

use crate::arena::{ArrayView, Buffer, StringBuffer};
use crate::error::{GraphError, Result};
use crate::property::{Any, Scalar};
use crate::types::{Browser, Date, Gender, Ipv4, PropertyType, StorageStrategy};
use std::borrow::Cow;
use std::marker::PhantomData;
use std::path::Path;

/// Average bytes reserved per string row when a column is sized up front.
const STRING_ROW_WIDTH: usize = 16;

pub struct TypedColumn<T: Scalar> {
    buffer: Buffer<T::Raw>,
    _marker: PhantomData<T>,
}

impl<T: Scalar> TypedColumn<T> {
    pub fn new() -> Self {
        Self { buffer: Buffer::new(), _marker: PhantomData }
    }

    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    pub fn resize(&mut self, size: usize) -> Result<()> {
        self.buffer.resize(size)
    }

    #[inline]
    pub fn get(&self, idx: usize) -> T {
        T::from_raw(self.buffer.get(idx))
    }

    #[inline]
    pub fn set(&self, idx: usize, value: T) {
        self.buffer.set(idx, value.to_raw());
    }

    pub fn serialize(&self, path: &Path, size: usize) -> Result<()> {
        self.buffer.dump_to_file(path, size)
    }

    pub fn deserialize(&mut self, path: &Path) -> Result<()> {
        self.buffer = Buffer::open_for_read(path)?;
        Ok(())
    }
}

impl<T: Scalar> Default for TypedColumn<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
pub struct StringColumn {
    buffer: StringBuffer,
}

impl StringColumn {
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    pub fn resize(&mut self, size: usize) -> Result<()> {
        let old = self.buffer.len();
        self.buffer.resize(size)?;
        if size > old {
            self.buffer.reserve_data((size - old) * STRING_ROW_WIDTH)?;
        }
        Ok(())
    }

    pub fn get(&self, idx: usize) -> &str {
        self.buffer.get(idx)
    }

    pub fn set(&mut self, idx: usize, value: &str) -> Result<()> {
        self.buffer.set(idx, value)
    }

    /// Concurrent-safe for distinct `idx`; fails when the arena is full.
    pub fn insert(&self, idx: usize, value: &str) -> Result<()> {
        self.buffer.insert(idx, value)
    }

    pub fn serialize(&self, path: &Path, size: usize) -> Result<()> {
        self.buffer.dump_to_file(path, size)
    }

    pub fn deserialize(&mut self, path: &Path) -> Result<()> {
        self.buffer = StringBuffer::open_for_read(path)?;
        Ok(())
    }
}

/// A declared property whose values are dropped. Occupies no storage.
pub struct SinkColumn {
    ty: PropertyType,
    size: usize,
}

pub enum Column {
    Int32(TypedColumn<i32>),
    Int64(TypedColumn<i64>),
    Date(TypedColumn<Date>),
    Browser(TypedColumn<Browser>),
    IpAddr(TypedColumn<Ipv4>),
    Gender(TypedColumn<Gender>),
    String(StringColumn),
    Sink(SinkColumn),
}

macro_rules! typed_dispatch {
    ($self:expr, $col:ident => $typed:expr, $s:ident => $string:expr, $k:ident => $sink:expr) => {
        match $self {
            Column::Int32($col) => $typed,
            Column::Int64($col) => $typed,
            Column::Date($col) => $typed,
            Column::Browser($col) => $typed,
            Column::IpAddr($col) => $typed,
            Column::Gender($col) => $typed,
            Column::String($s) => $string,
            Column::Sink($k) => $sink,
        }
    };
}

impl Column {
    /// Pick the concrete column for a declared type and storage strategy.
    pub fn new(ty: PropertyType, strategy: StorageStrategy) -> Self {
        if strategy == StorageStrategy::None {
            return Column::Sink(SinkColumn { ty, size: 0 });
        }
        match ty {
            PropertyType::Int32 => Column::Int32(TypedColumn::new()),
            PropertyType::Int64 => Column::Int64(TypedColumn::new()),
            PropertyType::Date => Column::Date(TypedColumn::new()),
            PropertyType::Browser => Column::Browser(TypedColumn::new()),
            PropertyType::IpAddr => Column::IpAddr(TypedColumn::new()),
            PropertyType::Gender => Column::Gender(TypedColumn::new()),
            PropertyType::String => Column::String(StringColumn::default()),
            PropertyType::Empty => Column::Sink(SinkColumn { ty, size: 0 }),
        }
    }

    pub fn property_type(&self) -> PropertyType {
        match self {
            Column::Int32(_) => PropertyType::Int32,
            Column::Int64(_) => PropertyType::Int64,
            Column::Date(_) => PropertyType::Date,
            Column::Browser(_) => PropertyType::Browser,
            Column::IpAddr(_) => PropertyType::IpAddr,
            Column::Gender(_) => PropertyType::Gender,
            Column::String(_) => PropertyType::String,
            Column::Sink(k) => k.ty,
        }
    }

    pub fn storage_strategy(&self) -> StorageStrategy {
        match self {
            Column::Sink(_) => StorageStrategy::None,
            _ => StorageStrategy::Mem,
        }
    }

    pub fn size(&self) -> usize {
        typed_dispatch!(self, c => c.size(), s => s.size(), k => k.size)
    }

    pub fn resize(&mut self, size: usize) -> Result<()> {
        typed_dispatch!(self, c => c.resize(size), s => s.resize(size), k => {
            k.size = size;
            Ok(())
        })
    }

    pub fn get(&self, idx: usize) -> Any<'_> {
        match self {
            Column::Int32(c) => c.get(idx).to_any(),
            Column::Int64(c) => c.get(idx).to_any(),
            Column::Date(c) => c.get(idx).to_any(),
            Column::Browser(c) => c.get(idx).to_any(),
            Column::IpAddr(c) => c.get(idx).to_any(),
            Column::Gender(c) => c.get(idx).to_any(),
            Column::String(s) => Any::String(Cow::Borrowed(s.get(idx))),
            Column::Sink(_) => Any::Empty,
        }
    }

    /// Store `value` at `idx`. The value's tag must match the column type;
    /// sink columns accept and drop anything.
    pub fn set_any(&mut self, idx: usize, value: &Any<'_>) -> Result<()> {
        match self {
            Column::Int32(c) => c.set(idx, i32::from_any(value)?),
            Column::Int64(c) => c.set(idx, i64::from_any(value)?),
            Column::Date(c) => c.set(idx, Date::from_any(value)?),
            Column::Browser(c) => c.set(idx, Browser::from_any(value)?),
            Column::IpAddr(c) => c.set(idx, Ipv4::from_any(value)?),
            Column::Gender(c) => c.set(idx, Gender::from_any(value)?),
            Column::String(s) => s.set(idx, value.as_str()?)?,
            Column::Sink(_) => {}
        }
        Ok(())
    }

    pub fn serialize(&self, path: &Path, size: usize) -> Result<()> {
        typed_dispatch!(self, c => c.serialize(path, size), s => s.serialize(path, size), _k => Ok(()))
    }

    /// Map the column file at `path`. Sink columns take `size` from the caller.
    pub fn deserialize(&mut self, path: &Path, size: usize) -> Result<()> {
        typed_dispatch!(self, c => c.deserialize(path), s => s.deserialize(path), k => {
            k.size = size;
            Ok(())
        })?;
        if self.size() < size {
            return Err(GraphError::corrupt(
                path,
                format!("column holds {} rows, header expects {}", self.size(), size),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tempfile::tempdir;

    #[test]
    fn test_factory_types() {
        assert_eq!(Column::new(PropertyType::Int64, StorageStrategy::Mem).property_type(), PropertyType::Int64);
        let sink = Column::new(PropertyType::String, StorageStrategy::None);
        assert_eq!(sink.property_type(), PropertyType::String);
        assert_eq!(sink.storage_strategy(), StorageStrategy::None);
    }

    #[test]
    fn test_set_get_and_mismatch() {
        let mut col = Column::new(PropertyType::Date, StorageStrategy::Mem);
        col.resize(4).unwrap();
        let d: Date = "2012-01-01".parse().unwrap();
        col.set_any(2, &Any::Date(d)).unwrap();
        assert_eq!(col.get(2), Any::Date(d));
        assert!(matches!(
            col.set_any(1, &Any::Int32(5)),
            Err(GraphError::TypeMismatch { expected: PropertyType::Date, .. })
        ));
    }

    #[test]
    fn test_sink_drops_values() {
        let mut col = Column::new(PropertyType::Int32, StorageStrategy::None);
        col.resize(10).unwrap();
        col.set_any(3, &Any::Int32(9)).unwrap();
        assert_eq!(col.get(3), Any::Empty);
        assert_eq!(col.size(), 10);
    }

    #[test]
    fn test_column_files() {
        let dir = tempdir().unwrap();
        let mut ips = Column::new(PropertyType::IpAddr, StorageStrategy::Mem);
        let mut names = Column::new(PropertyType::String, StorageStrategy::Mem);
        ips.resize(3).unwrap();
        names.resize(3).unwrap();
        for i in 0..3u8 {
            ips.set_any(i as usize, &Any::IpAddr(Ipv4Addr::new(10, 0, 0, i))).unwrap();
            names.set_any(i as usize, &Any::from(format!("n{}", i))).unwrap();
        }
        ips.serialize(&dir.path().join("ip"), 3).unwrap();
        names.serialize(&dir.path().join("name"), 3).unwrap();

        let mut ips2 = Column::new(PropertyType::IpAddr, StorageStrategy::Mem);
        let mut names2 = Column::new(PropertyType::String, StorageStrategy::Mem);
        ips2.deserialize(&dir.path().join("ip"), 3).unwrap();
        names2.deserialize(&dir.path().join("name"), 3).unwrap();
        assert_eq!(ips2.get(2), Any::IpAddr(Ipv4Addr::new(10, 0, 0, 2)));
        assert_eq!(names2.get(1).as_str().unwrap(), "n1");

        // Reloaded columns still accept writes
        names2.set_any(0, &Any::from("renamed")).unwrap();
        assert_eq!(names2.get(0).as_str().unwrap(), "renamed");
    }
}
