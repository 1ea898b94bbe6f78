//! Memory-mapped column buffers.
//!
//! Two backings implement the same indexed interface:
//! - [`AnonArray`]: growable in-memory array on an anonymous mapping.
//! - [`MappedArray`]: an existing file mapped copy-on-write. Writes never
//!   reach the file; [`Buffer::dump_to_file`] is the only way data lands on disk.
//!
//! [`Buffer`] unifies both. Resizing a mapped buffer moves it onto an
//! anonymous mapping, copying the overlapping prefix.
//!
//! Indexed writes take `&self`: callers must not write the same slot from
//! two threads, and structural changes (`resize`) need `&mut self`.

use crate::error::{GraphError, Result};
use bytemuck::{Pod, Zeroable};
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::marker::PhantomData;
use std::mem::size_of;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared read/write interface of every buffer backing.
pub trait ArrayView<T: Pod> {
    fn len(&self) -> usize;

    fn as_slice(&self) -> &[T];

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    fn get(&self, idx: usize) -> T {
        self.as_slice()[idx]
    }

    /// Write one slot. Slots written concurrently must be distinct.
    fn set(&self, idx: usize, value: T);
}

#[inline]
fn map_slice<T: Pod>(map: &Option<MmapMut>, len: usize) -> &[T] {
    match map {
        Some(m) => bytemuck::cast_slice(&m[..len * size_of::<T>()]),
        None => &[],
    }
}

#[inline]
fn map_write<T: Pod>(map: &Option<MmapMut>, len: usize, idx: usize, values: &[T]) {
    assert!(idx + values.len() <= len, "buffer write out of range: {}+{} > {}", idx, values.len(), len);
    if values.is_empty() {
        return;
    }
    if let Some(m) = map {
        // The mapping memory lives outside `MmapMut` itself; distinct-slot
        // writers never overlap.
        unsafe {
            let dest = (m.as_ptr() as *mut T).add(idx);
            std::ptr::copy_nonoverlapping(values.as_ptr(), dest, values.len());
        }
    }
}

fn anon_map(bytes: usize) -> Result<Option<MmapMut>> {
    if bytes == 0 {
        return Ok(None);
    }
    Ok(Some(MmapMut::map_anon(bytes)?))
}

/// Write `data` to a fresh file at `path` through a shared writable mapping.
pub fn dump_pod_file<T: Pod>(path: &Path, data: &[T]) -> Result<()> {
    let bytes: &[u8] = bytemuck::cast_slice(data);
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.set_len(bytes.len() as u64)?;
    if !bytes.is_empty() {
        let mut map = unsafe { MmapMut::map_mut(&file)? };
        map.copy_from_slice(bytes);
        map.flush()?;
    }
    Ok(())
}

// ── anonymous ────────────────────────────────────────────────────────────────

pub struct AnonArray<T> {
    map: Option<MmapMut>,
    len: usize,
    _marker: PhantomData<T>,
}

impl<T: Pod> AnonArray<T> {
    pub fn new() -> Self {
        Self { map: None, len: 0, _marker: PhantomData }
    }

    /// Zero-filled array of `len` elements.
    pub fn with_len(len: usize) -> Result<Self> {
        Ok(Self { map: anon_map(len * size_of::<T>())?, len, _marker: PhantomData })
    }

    pub fn from_slice(data: &[T]) -> Result<Self> {
        let arr = Self::with_len(data.len())?;
        map_write(&arr.map, arr.len, 0, data);
        Ok(arr)
    }

    /// Remap to `len` elements, keeping the overlapping prefix.
    pub fn resize(&mut self, len: usize) -> Result<()> {
        if len == self.len {
            return Ok(());
        }
        let next = Self::with_len(len)?;
        let keep = len.min(self.len);
        map_write(&next.map, next.len, 0, &self.as_slice()[..keep]);
        *self = next;
        Ok(())
    }
}

impl<T: Pod> Default for AnonArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Pod> ArrayView<T> for AnonArray<T> {
    fn len(&self) -> usize {
        self.len
    }

    fn as_slice(&self) -> &[T] {
        map_slice(&self.map, self.len)
    }

    fn set(&self, idx: usize, value: T) {
        map_write(&self.map, self.len, idx, std::slice::from_ref(&value));
    }
}

// ── file-backed ──────────────────────────────────────────────────────────────

pub struct MappedArray<T> {
    map: Option<MmapMut>,
    len: usize,
    path: PathBuf,
    _file: Option<File>,
    _marker: PhantomData<T>,
}

impl<T: Pod> MappedArray<T> {
    /// Map an existing file privately: reads are zero-copy, writes stay in memory.
    pub fn open_for_read(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let bytes = file.metadata()?.len() as usize;
        if bytes % size_of::<T>() != 0 {
            return Err(GraphError::corrupt(
                path,
                format!("length {} is not a multiple of {}", bytes, size_of::<T>()),
            ));
        }
        let map = if bytes == 0 {
            None
        } else {
            Some(unsafe { MmapOptions::new().map_copy(&file)? })
        };
        Ok(Self {
            map,
            len: bytes / size_of::<T>(),
            path: path.to_path_buf(),
            _file: Some(file),
            _marker: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T: Pod> ArrayView<T> for MappedArray<T> {
    fn len(&self) -> usize {
        self.len
    }

    fn as_slice(&self) -> &[T] {
        map_slice(&self.map, self.len)
    }

    fn set(&self, idx: usize, value: T) {
        map_write(&self.map, self.len, idx, std::slice::from_ref(&value));
    }
}

// ── unified ──────────────────────────────────────────────────────────────────

pub enum Buffer<T> {
    Anon(AnonArray<T>),
    Mapped(MappedArray<T>),
}

impl<T: Pod> Buffer<T> {
    pub fn new() -> Self {
        Buffer::Anon(AnonArray::new())
    }

    pub fn with_len(len: usize) -> Result<Self> {
        Ok(Buffer::Anon(AnonArray::with_len(len)?))
    }

    pub fn open_for_read(path: &Path) -> Result<Self> {
        Ok(Buffer::Mapped(MappedArray::open_for_read(path)?))
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self, Buffer::Mapped(_))
    }

    pub fn resize(&mut self, len: usize) -> Result<()> {
        match self {
            Buffer::Anon(arr) => arr.resize(len),
            Buffer::Mapped(arr) => {
                let next = AnonArray::with_len(len)?;
                let keep = len.min(arr.len());
                map_write(&next.map, next.len, 0, &arr.as_slice()[..keep]);
                *self = Buffer::Anon(next);
                Ok(())
            }
        }
    }

    /// Write a contiguous run starting at `idx`.
    pub fn set_range(&self, idx: usize, values: &[T]) {
        match self {
            Buffer::Anon(arr) => map_write(&arr.map, arr.len, idx, values),
            Buffer::Mapped(arr) => map_write(&arr.map, arr.len, idx, values),
        }
    }

    /// Persist the first `n` elements, independent of the live mapping mode.
    pub fn dump_to_file(&self, path: &Path, n: usize) -> Result<()> {
        let n = n.min(self.len());
        dump_pod_file(path, &self.as_slice()[..n])
    }
}

impl<T: Pod> Default for Buffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Pod> ArrayView<T> for Buffer<T> {
    fn len(&self) -> usize {
        match self {
            Buffer::Anon(arr) => arr.len(),
            Buffer::Mapped(arr) => arr.len(),
        }
    }

    fn as_slice(&self) -> &[T] {
        match self {
            Buffer::Anon(arr) => arr.as_slice(),
            Buffer::Mapped(arr) => arr.as_slice(),
        }
    }

    fn set(&self, idx: usize, value: T) {
        self.set_range(idx, std::slice::from_ref(&value));
    }
}

// ── strings ──────────────────────────────────────────────────────────────────

const ITEM_LEN_BITS: u64 = 16;
const ITEM_LEN_MASK: u64 = (1 << ITEM_LEN_BITS) - 1;
pub const MAX_STRING_LEN: usize = ITEM_LEN_MASK as usize;

/// Packed `(offset:48, length:16)` reference into the byte arena.
#[repr(transparent)]
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct StringItem(u64);

impl StringItem {
    pub fn new(offset: u64, len: usize) -> Self {
        StringItem((offset << ITEM_LEN_BITS) | (len as u64 & ITEM_LEN_MASK))
    }

    pub fn offset(self) -> usize {
        (self.0 >> ITEM_LEN_BITS) as usize
    }

    pub fn len(self) -> usize {
        (self.0 & ITEM_LEN_MASK) as usize
    }

    pub fn is_empty(self) -> bool {
        self.len() == 0
    }
}

/// Fixed-width item table plus an append-only byte arena.
///
/// `insert` reserves arena bytes with a fetch-and-add cursor, so inserts into
/// distinct slots may run concurrently. Growth goes through `&mut self`.
pub struct StringBuffer {
    items: Buffer<StringItem>,
    data: Buffer<u8>,
    pos: AtomicU64,
}

impl StringBuffer {
    pub fn new() -> Self {
        Self { items: Buffer::new(), data: Buffer::new(), pos: AtomicU64::new(0) }
    }

    pub fn with_capacity(len: usize, data_bytes: usize) -> Result<Self> {
        Ok(Self {
            items: Buffer::with_len(len)?,
            data: Buffer::with_len(data_bytes)?,
            pos: AtomicU64::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Bytes of the arena used so far.
    pub fn data_size(&self) -> usize {
        self.pos.load(Ordering::Acquire) as usize
    }

    pub fn data_capacity(&self) -> usize {
        self.data.len()
    }

    pub fn get(&self, idx: usize) -> &str {
        let item = self.items.get(idx);
        let bytes = &self.data.as_slice()[item.offset()..item.offset() + item.len()];
        std::str::from_utf8(bytes).unwrap_or("")
    }

    /// Store `value` at `idx`, reserving arena space atomically.
    pub fn insert(&self, idx: usize, value: &str) -> Result<()> {
        if value.len() > MAX_STRING_LEN {
            return Err(GraphError::StringTooLong(value.len()));
        }
        let capacity = self.data.len() as u64;
        let len = value.len() as u64;
        let offset = self
            .pos
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |pos| (pos + len <= capacity).then_some(pos + len))
            .map_err(|_| GraphError::CapacityExceeded { what: "string arena", capacity: capacity as usize })?;
        self.data.set_range(offset as usize, value.as_bytes());
        self.items.set(idx, StringItem::new(offset, value.len()));
        Ok(())
    }

    /// Like `insert`, growing the arena first when it is too small.
    pub fn set(&mut self, idx: usize, value: &str) -> Result<()> {
        self.reserve_data(value.len())?;
        self.insert(idx, value)
    }

    /// Make room for `extra` more arena bytes.
    pub fn reserve_data(&mut self, extra: usize) -> Result<()> {
        let used = self.data_size();
        let cap = self.data.len();
        if used + extra > cap {
            let grown = (cap + cap / 5).max(used + extra).max(1024);
            self.data.resize(grown)?;
        }
        Ok(())
    }

    pub fn resize(&mut self, len: usize) -> Result<()> {
        self.items.resize(len)
    }

    /// Resize to `len` slots; new slots all reference one copy of `value`.
    pub fn resize_fill(&mut self, len: usize, value: &str) -> Result<()> {
        let old = self.items.len();
        self.items.resize(len)?;
        if len > old {
            self.reserve_data(value.len())?;
            let offset = self.pos.fetch_add(value.len() as u64, Ordering::AcqRel);
            self.data.set_range(offset as usize, value.as_bytes());
            let item = StringItem::new(offset, value.len());
            for idx in old..len {
                self.items.set(idx, item);
            }
        }
        Ok(())
    }

    /// Persist the first `n` items to `<path>.items` and the used arena to `<path>.data`.
    pub fn dump_to_file(&self, path: &Path, n: usize) -> Result<()> {
        self.items.dump_to_file(&with_suffix(path, "items"), n)?;
        self.data.dump_to_file(&with_suffix(path, "data"), self.data_size())
    }

    pub fn open_for_read(path: &Path) -> Result<Self> {
        let items = Buffer::<StringItem>::open_for_read(&with_suffix(path, "items"))?;
        let data = Buffer::<u8>::open_for_read(&with_suffix(path, "data"))?;
        let data_len = data.len();
        if let Some(bad) = items.as_slice().iter().find(|it| it.offset() + it.len() > data_len) {
            return Err(GraphError::corrupt(path, format!("string item {:?} beyond arena", bad)));
        }
        Ok(Self { items, data, pos: AtomicU64::new(data_len as u64) })
    }
}

impl Default for StringBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// `<path>.<suffix>`, keeping any existing extension.
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".");
    os.push(suffix);
    PathBuf::from(os)
}
