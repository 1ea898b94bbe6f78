use super::{Csr, EdgeData, Nbr, NbrSlice};
use crate::error::{GraphError, Result};
use crate::property::Any;
use crate::types::{Browser, Date, EdgeStrategy, Gender, Ipv4, PropertyType, Timestamp, Vid};
use std::path::Path;

macro_rules! dispatch {
    ($enum:ident, $value:expr, $inner:ident => $body:expr) => {
        match $value {
            $enum::Empty($inner) => $body,
            $enum::Int32($inner) => $body,
            $enum::Int64($inner) => $body,
            $enum::Date($inner) => $body,
            $enum::Browser($inner) => $body,
            $enum::IpAddr($inner) => $body,
            $enum::Gender($inner) => $body,
            $enum::String($inner) => $body,
        }
    };
}

macro_rules! rewrap {
    ($from:ident => $to:ident, $value:expr, $inner:ident => $body:expr) => {
        match $value {
            $from::Empty($inner) => $to::Empty($body),
            $from::Int32($inner) => $to::Int32($body),
            $from::Int64($inner) => $to::Int64($body),
            $from::Date($inner) => $to::Date($body),
            $from::Browser($inner) => $to::Browser($body),
            $from::IpAddr($inner) => $to::IpAddr($body),
            $from::Gender($inner) => $to::Gender($body),
            $from::String($inner) => $to::String($body),
        }
    };
}

/// A [`Csr`] whose payload type is chosen at runtime from the edge schema.
pub enum TypedCsr {
    Empty(Csr<()>),
    Int32(Csr<i32>),
    Int64(Csr<i64>),
    Date(Csr<Date>),
    Browser(Csr<Browser>),
    IpAddr(Csr<Ipv4>),
    Gender(Csr<Gender>),
    String(Csr<String>),
}

impl TypedCsr {
    pub fn new(data_type: PropertyType, strategy: EdgeStrategy) -> Self {
        match data_type {
            PropertyType::Empty => TypedCsr::Empty(Csr::new(strategy)),
            PropertyType::Int32 => TypedCsr::Int32(Csr::new(strategy)),
            PropertyType::Int64 => TypedCsr::Int64(Csr::new(strategy)),
            PropertyType::Date => TypedCsr::Date(Csr::new(strategy)),
            PropertyType::Browser => TypedCsr::Browser(Csr::new(strategy)),
            PropertyType::IpAddr => TypedCsr::IpAddr(Csr::new(strategy)),
            PropertyType::Gender => TypedCsr::Gender(Csr::new(strategy)),
            PropertyType::String => TypedCsr::String(Csr::new(strategy)),
        }
    }

    pub fn data_type(&self) -> PropertyType {
        match self {
            TypedCsr::Empty(_) => PropertyType::Empty,
            TypedCsr::Int32(_) => PropertyType::Int32,
            TypedCsr::Int64(_) => PropertyType::Int64,
            TypedCsr::Date(_) => PropertyType::Date,
            TypedCsr::Browser(_) => PropertyType::Browser,
            TypedCsr::IpAddr(_) => PropertyType::IpAddr,
            TypedCsr::Gender(_) => PropertyType::Gender,
            TypedCsr::String(_) => PropertyType::String,
        }
    }

    pub fn strategy(&self) -> EdgeStrategy {
        dispatch!(TypedCsr, self, c => c.strategy())
    }

    pub fn batch_init(&mut self, vnum: usize, degree: &[i32]) {
        dispatch!(TypedCsr, self, c => c.batch_init(vnum, degree))
    }

    pub fn batch_put_edge(&mut self, src: Vid, dst: Vid, data: &Any<'_>, ts: Timestamp) -> Result<()> {
        dispatch!(TypedCsr, self, c => c.batch_put_edge(src, dst, EdgeData::from_any(data)?, ts))
    }

    pub fn put_edge(&self, src: Vid, dst: Vid, data: &Any<'_>, ts: Timestamp) -> Result<()> {
        dispatch!(TypedCsr, self, c => c.put_edge(src, dst, EdgeData::from_any(data)?, ts))
    }

    pub fn reserve_edge(&self, src: Vid) -> Result<()> {
        dispatch!(TypedCsr, self, c => c.reserve_edge(src))
    }

    pub fn cancel_edge(&self, src: Vid) {
        dispatch!(TypedCsr, self, c => c.cancel_edge(src))
    }

    pub fn put_reserved_edge(&self, src: Vid, dst: Vid, data: &Any<'_>, ts: Timestamp) -> Result<()> {
        dispatch!(TypedCsr, self, c => c.put_reserved_edge(src, dst, EdgeData::from_any(data)?, ts))
    }

    /// Fail as `put_edge` would, without writing anything.
    pub fn peek_edge(&self, src: Vid, data: &Any<'_>) -> Result<()> {
        data.expect_type(self.data_type())?;
        if dispatch!(TypedCsr, self, c => c.can_put(src)) {
            Ok(())
        } else if (src as usize) >= self.vertex_capacity() {
            Err(GraphError::CapacityExceeded { what: "adjacency source", capacity: self.vertex_capacity() })
        } else {
            Err(GraphError::SingleEdgeOccupied(src))
        }
    }

    pub fn get_edges(&self, v: Vid) -> AdjSlice<'_> {
        rewrap!(TypedCsr => AdjSlice, self, c => c.get_edges(v))
    }

    pub fn get_edges_mut(&mut self, v: Vid) -> AdjSliceMut<'_> {
        rewrap!(TypedCsr => AdjSliceMut, self, c => c.get_edges_mut(v))
    }

    /// Cursor over entries of `v` with `timestamp <= read_ts`.
    pub fn edge_cursor(&self, v: Vid, read_ts: Timestamp) -> EdgeCursor<'_> {
        EdgeCursor::new(self.get_edges(v), read_ts)
    }

    pub fn edge_cursor_mut(&mut self, v: Vid) -> EdgeCursorMut<'_> {
        EdgeCursorMut { slice: self.get_edges_mut(v), pos: 0 }
    }

    pub fn vertex_capacity(&self) -> usize {
        dispatch!(TypedCsr, self, c => c.vertex_capacity())
    }

    pub fn resize(&mut self, vnum: usize) {
        dispatch!(TypedCsr, self, c => c.resize(vnum))
    }

    pub fn edge_num(&self) -> usize {
        dispatch!(TypedCsr, self, c => c.edge_num())
    }

    pub fn serialize(&self, prefix: &Path) -> Result<()> {
        dispatch!(TypedCsr, self, c => c.serialize(prefix))
    }

    pub fn deserialize(data_type: PropertyType, strategy: EdgeStrategy, prefix: &Path, vnum: usize) -> Result<Self> {
        let csr = match data_type {
            PropertyType::Empty => TypedCsr::Empty(Csr::deserialize(strategy, prefix, vnum)?),
            PropertyType::Int32 => TypedCsr::Int32(Csr::deserialize(strategy, prefix, vnum)?),
            PropertyType::Int64 => TypedCsr::Int64(Csr::deserialize(strategy, prefix, vnum)?),
            PropertyType::Date => TypedCsr::Date(Csr::deserialize(strategy, prefix, vnum)?),
            PropertyType::Browser => TypedCsr::Browser(Csr::deserialize(strategy, prefix, vnum)?),
            PropertyType::IpAddr => TypedCsr::IpAddr(Csr::deserialize(strategy, prefix, vnum)?),
            PropertyType::Gender => TypedCsr::Gender(Csr::deserialize(strategy, prefix, vnum)?),
            PropertyType::String => TypedCsr::String(Csr::deserialize(strategy, prefix, vnum)?),
        };
        Ok(csr)
    }
}

/// Read-only view of one source's entries, payload type erased.
pub enum AdjSlice<'a> {
    Empty(NbrSlice<'a, ()>),
    Int32(NbrSlice<'a, i32>),
    Int64(NbrSlice<'a, i64>),
    Date(NbrSlice<'a, Date>),
    Browser(NbrSlice<'a, Browser>),
    IpAddr(NbrSlice<'a, Ipv4>),
    Gender(NbrSlice<'a, Gender>),
    String(NbrSlice<'a, String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeRef<'a> {
    pub neighbor: Vid,
    pub timestamp: Timestamp,
    pub data: Any<'a>,
}

impl AdjSlice<'_> {
    pub fn len(&self) -> usize {
        dispatch!(AdjSlice, self, s => s.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn neighbor(&self, i: usize) -> Vid {
        dispatch!(AdjSlice, self, s => s[i].neighbor)
    }

    pub fn timestamp(&self, i: usize) -> Timestamp {
        dispatch!(AdjSlice, self, s => s[i].timestamp)
    }

    pub fn data(&self, i: usize) -> Any<'_> {
        dispatch!(AdjSlice, self, s => s[i].data.to_any())
    }

    pub fn get(&self, i: usize) -> Option<EdgeRef<'_>> {
        (i < self.len()).then(|| EdgeRef { neighbor: self.neighbor(i), timestamp: self.timestamp(i), data: self.data(i) })
    }

    pub fn iter(&self) -> impl Iterator<Item = EdgeRef<'_>> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }
}

/// Mutable view of one source's entries. Requires exclusive access to the structure.
pub enum AdjSliceMut<'a> {
    Empty(&'a mut [Nbr<()>]),
    Int32(&'a mut [Nbr<i32>]),
    Int64(&'a mut [Nbr<i64>]),
    Date(&'a mut [Nbr<Date>]),
    Browser(&'a mut [Nbr<Browser>]),
    IpAddr(&'a mut [Nbr<Ipv4>]),
    Gender(&'a mut [Nbr<Gender>]),
    String(&'a mut [Nbr<String>]),
}

impl AdjSliceMut<'_> {
    pub fn len(&self) -> usize {
        dispatch!(AdjSliceMut, self, s => s.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Forward cursor over the entries visible at `read_ts`.
pub struct EdgeCursor<'a> {
    slice: AdjSlice<'a>,
    pos: usize,
    read_ts: Timestamp,
}

impl<'a> EdgeCursor<'a> {
    pub fn new(slice: AdjSlice<'a>, read_ts: Timestamp) -> Self {
        let mut cursor = Self { slice, pos: 0, read_ts };
        cursor.skip_invisible();
        cursor
    }

    fn skip_invisible(&mut self) {
        while self.pos < self.slice.len() && self.slice.timestamp(self.pos) > self.read_ts {
            self.pos += 1;
        }
    }

    pub fn is_valid(&self) -> bool {
        self.pos < self.slice.len()
    }

    pub fn next(&mut self) {
        if self.is_valid() {
            self.pos += 1;
            self.skip_invisible();
        }
    }

    pub fn get_neighbor(&self) -> Vid {
        self.slice.neighbor(self.pos)
    }

    pub fn get_timestamp(&self) -> Timestamp {
        self.slice.timestamp(self.pos)
    }

    pub fn get_data(&self) -> Any<'_> {
        self.slice.data(self.pos)
    }

    /// Number of entries in the underlying snapshot, visible or not.
    pub fn size(&self) -> usize {
        self.slice.len()
    }

    /// Collect the remaining visible entries.
    pub fn collect_edges(mut self) -> Vec<EdgeRef<'static>> {
        let mut out = Vec::new();
        while self.is_valid() {
            out.push(EdgeRef {
                neighbor: self.get_neighbor(),
                timestamp: self.get_timestamp(),
                data: self.get_data().into_owned(),
            });
            self.next();
        }
        out
    }
}

/// Cursor that can rewrite payloads and timestamps in place.
pub struct EdgeCursorMut<'a> {
    slice: AdjSliceMut<'a>,
    pos: usize,
}

impl EdgeCursorMut<'_> {
    pub fn is_valid(&self) -> bool {
        self.pos < self.slice.len()
    }

    pub fn next(&mut self) {
        self.pos += 1;
    }

    pub fn get_neighbor(&self) -> Vid {
        dispatch!(AdjSliceMut, &self.slice, s => s[self.pos].neighbor)
    }

    pub fn get_timestamp(&self) -> Timestamp {
        dispatch!(AdjSliceMut, &self.slice, s => s[self.pos].timestamp)
    }

    pub fn get_data(&self) -> Any<'_> {
        dispatch!(AdjSliceMut, &self.slice, s => s[self.pos].data.to_any())
    }

    /// Replace the payload and restamp the entry.
    pub fn set_data(&mut self, value: &Any<'_>, ts: Timestamp) -> Result<()> {
        let pos = self.pos;
        dispatch!(AdjSliceMut, &mut self.slice, s => {
            let entry = &mut s[pos];
            entry.data = EdgeData::from_any(value)?;
            entry.timestamp = ts;
        });
        Ok(())
    }

    pub fn set_timestamp(&mut self, ts: Timestamp) {
        let pos = self.pos;
        dispatch!(AdjSliceMut, &mut self.slice, s => s[pos].timestamp = ts)
    }
}
