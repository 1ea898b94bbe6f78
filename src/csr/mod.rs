//! Timestamped adjacency lists.
//!
//! One [`Csr`] per (src, dst, edge) triplet and direction. The strategy is a
//! closed enum: `Empty` stores nothing, `Single` keeps at most one entry per
//! source, `Multiple` keeps an append-only list per source whose backing
//! segment is swapped under a per-source lock and read without one.
//! [`TypedCsr`] erases the payload type behind the [`Any`] value.

mod io;
mod multiple;
mod single;
mod typed;

pub use multiple::MultipleCsr;
pub use single::SingleCsr;
pub use typed::{AdjSlice, AdjSliceMut, EdgeCursor, EdgeCursorMut, EdgeRef, TypedCsr};

use crate::error::Result;
use crate::property::{Any, Scalar};
use crate::types::{Browser, Date, EdgeStrategy, Gender, Ipv4, PropertyType, Timestamp, Vid};
use crossbeam_epoch::Guard;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::path::Path;
use std::ptr::NonNull;

/// One adjacency entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Nbr<E> {
    pub neighbor: Vid,
    pub timestamp: Timestamp,
    pub data: E,
}

/// Payload carried by an edge. `WIDTH` is the encoded size in a
/// `.nbr_list` file, or `None` for variable-length payloads.
pub trait EdgeData:
    Clone + Default + PartialEq + fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
    const TYPE: PropertyType;
    const WIDTH: Option<usize>;

    fn to_any(&self) -> Any<'_>;
    fn from_any(value: &Any<'_>) -> Result<Self>;

    fn encode(&self, _out: &mut Vec<u8>) {}
    fn decode(_bytes: &[u8]) -> Self {
        Self::default()
    }
}

impl EdgeData for () {
    const TYPE: PropertyType = PropertyType::Empty;
    const WIDTH: Option<usize> = Some(0);

    fn to_any(&self) -> Any<'_> {
        Any::Empty
    }

    fn from_any(value: &Any<'_>) -> Result<Self> {
        value.expect_type(PropertyType::Empty)
    }
}

impl EdgeData for String {
    const TYPE: PropertyType = PropertyType::String;
    const WIDTH: Option<usize> = None;

    fn to_any(&self) -> Any<'_> {
        Any::String(Cow::Borrowed(self))
    }

    fn from_any(value: &Any<'_>) -> Result<Self> {
        value.as_str().map(str::to_owned)
    }
}

macro_rules! scalar_edge_data {
    ($($t:ty),*) => {$(
        impl EdgeData for $t {
            const TYPE: PropertyType = <$t as Scalar>::TYPE;
            const WIDTH: Option<usize> = Some(std::mem::size_of::<<$t as Scalar>::Raw>());

            fn to_any(&self) -> Any<'_> {
                <$t as Scalar>::to_any(*self)
            }

            fn from_any(value: &Any<'_>) -> Result<Self> {
                <$t as Scalar>::from_any(value)
            }

            fn encode(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(bytemuck::bytes_of(&Scalar::to_raw(*self)));
            }

            fn decode(bytes: &[u8]) -> Self {
                <$t as Scalar>::from_raw(bytemuck::pod_read_unaligned(bytes))
            }
        }
    )*};
}

scalar_edge_data!(i32, i64, Date, Browser, Gender, Ipv4);

/// A snapshot of one source's entries.
///
/// For the multiple strategy the slice pins the epoch, so the segment it
/// points into outlives any concurrent growth.
pub struct NbrSlice<'a, E> {
    ptr: *const Nbr<E>,
    len: usize,
    _guard: Option<Guard>,
    _marker: PhantomData<&'a Nbr<E>>,
}

impl<'a, E> NbrSlice<'a, E> {
    pub(crate) fn empty() -> Self {
        Self { ptr: NonNull::dangling().as_ptr(), len: 0, _guard: None, _marker: PhantomData }
    }

    pub(crate) fn borrowed(entries: &'a [Nbr<E>]) -> Self {
        Self { ptr: entries.as_ptr(), len: entries.len(), _guard: None, _marker: PhantomData }
    }

    /// # Safety
    /// `ptr..ptr+len` must stay initialised and unmodified while `guard` is
    /// pinned and `'a` is live.
    pub(crate) unsafe fn pinned(ptr: *const Nbr<E>, len: usize, guard: Guard) -> Self {
        Self { ptr, len, _guard: Some(guard), _marker: PhantomData }
    }
}

impl<E> Deref for NbrSlice<'_, E> {
    type Target = [Nbr<E>];

    fn deref(&self) -> &[Nbr<E>] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

impl<'s, E> IntoIterator for &'s NbrSlice<'_, E> {
    type Item = &'s Nbr<E>;
    type IntoIter = std::slice::Iter<'s, Nbr<E>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Adjacency storage for one direction of one triplet.
pub enum Csr<E: EdgeData> {
    Empty { vertex_capacity: usize },
    Single(SingleCsr<E>),
    Multiple(MultipleCsr<E>),
}

impl<E: EdgeData> Csr<E> {
    pub fn new(strategy: EdgeStrategy) -> Self {
        match strategy {
            EdgeStrategy::None => Csr::Empty { vertex_capacity: 0 },
            EdgeStrategy::Single => Csr::Single(SingleCsr::new()),
            EdgeStrategy::Multiple => Csr::Multiple(MultipleCsr::new()),
        }
    }

    pub fn strategy(&self) -> EdgeStrategy {
        match self {
            Csr::Empty { .. } => EdgeStrategy::None,
            Csr::Single(_) => EdgeStrategy::Single,
            Csr::Multiple(_) => EdgeStrategy::Multiple,
        }
    }

    pub fn batch_init(&mut self, vnum: usize, degree: &[i32]) {
        match self {
            Csr::Empty { vertex_capacity } => *vertex_capacity = vnum,
            Csr::Single(c) => c.batch_init(vnum),
            Csr::Multiple(c) => c.batch_init(vnum, degree),
        }
    }

    /// Bulk-phase insert; exclusive access, no locking.
    pub fn batch_put_edge(&mut self, src: Vid, dst: Vid, data: E, ts: Timestamp) -> Result<()> {
        match self {
            Csr::Empty { .. } => Ok(()),
            Csr::Single(c) => c.batch_put_edge(src, dst, data, ts),
            Csr::Multiple(c) => c.batch_put_edge(src, dst, data, ts),
        }
    }

    /// Online insert, safe against concurrent writers and lock-free readers.
    pub fn put_edge(&self, src: Vid, dst: Vid, data: E, ts: Timestamp) -> Result<()> {
        match self {
            Csr::Empty { .. } => Ok(()),
            Csr::Single(c) => c.put_edge(src, dst, data, ts),
            Csr::Multiple(c) => c.put_edge(src, dst, data, ts),
        }
    }

    /// Claim the single-edge slot of `src`. Other strategies have nothing to claim.
    pub fn reserve_edge(&self, src: Vid) -> Result<()> {
        match self {
            Csr::Single(c) => c.reserve(src),
            _ => Ok(()),
        }
    }

    pub fn cancel_edge(&self, src: Vid) {
        if let Csr::Single(c) = self {
            c.cancel(src);
        }
    }

    /// `put_edge` after a successful [`reserve_edge`](Self::reserve_edge).
    pub fn put_reserved_edge(&self, src: Vid, dst: Vid, data: E, ts: Timestamp) -> Result<()> {
        match self {
            Csr::Single(c) => c.put_reserved(src, dst, data, ts),
            _ => self.put_edge(src, dst, data, ts),
        }
    }

    /// Whether `put_edge(src, ..)` would be accepted right now.
    pub fn can_put(&self, src: Vid) -> bool {
        match self {
            Csr::Empty { .. } => true,
            Csr::Single(c) => c.is_vacant(src),
            Csr::Multiple(c) => (src as usize) < c.vertex_capacity(),
        }
    }

    pub fn get_edges(&self, v: Vid) -> NbrSlice<'_, E> {
        match self {
            Csr::Empty { .. } => NbrSlice::empty(),
            Csr::Single(c) => c.get_edges(v),
            Csr::Multiple(c) => c.get_edges(v),
        }
    }

    pub fn get_edges_mut(&mut self, v: Vid) -> &mut [Nbr<E>] {
        match self {
            Csr::Empty { .. } => &mut [],
            Csr::Single(c) => c.get_edges_mut(v),
            Csr::Multiple(c) => c.get_edges_mut(v),
        }
    }

    pub fn vertex_capacity(&self) -> usize {
        match self {
            Csr::Empty { vertex_capacity } => *vertex_capacity,
            Csr::Single(c) => c.vertex_capacity(),
            Csr::Multiple(c) => c.vertex_capacity(),
        }
    }

    /// Grow to at least `vnum` sources. Never shrinks.
    pub fn resize(&mut self, vnum: usize) {
        match self {
            Csr::Empty { vertex_capacity } => *vertex_capacity = (*vertex_capacity).max(vnum),
            Csr::Single(c) => c.resize(vnum),
            Csr::Multiple(c) => c.resize(vnum),
        }
    }

    pub fn edge_num(&self) -> usize {
        match self {
            Csr::Empty { .. } => 0,
            Csr::Single(c) => c.edge_num(),
            Csr::Multiple(c) => c.edge_num(),
        }
    }

    /// Write `{prefix}.degree` and `{prefix}.nbr_list`. Empty structures write nothing.
    pub fn serialize(&self, prefix: &Path) -> Result<()> {
        match self {
            Csr::Empty { .. } => Ok(()),
            Csr::Single(c) => c.serialize(prefix),
            Csr::Multiple(c) => c.serialize(prefix),
        }
    }

    pub fn deserialize(strategy: EdgeStrategy, prefix: &Path, vnum: usize) -> Result<Self> {
        let csr = match strategy {
            EdgeStrategy::None => Csr::Empty { vertex_capacity: vnum },
            EdgeStrategy::Single => Csr::Single(SingleCsr::deserialize(prefix)?),
            EdgeStrategy::Multiple => Csr::Multiple(MultipleCsr::deserialize(prefix)?),
        };
        Ok(csr)
    }
}
