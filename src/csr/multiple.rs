use super::io::{degree_path, nbr_list_path, read_degree, read_nbr_list, write_degree, write_nbr_list};
use super::{EdgeData, Nbr, NbrSlice};
use crate::error::{GraphError, Result};
use crate::types::{Timestamp, Vid};
use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use parking_lot::Mutex;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Smallest capacity an online append grows a list to.
const MIN_GROWN_CAPACITY: usize = 1024;

/// Fixed-capacity backing storage for one source. Only the slot at the
/// current size is ever written while readers hold the segment.
struct Segment<E> {
    slots: Box<[UnsafeCell<Nbr<E>>]>,
}

unsafe impl<E: Send + Sync> Sync for Segment<E> {}

impl<E: EdgeData> Segment<E> {
    fn with_entries(entries: impl Iterator<Item = Nbr<E>>, capacity: usize) -> Self {
        let mut slots: Vec<UnsafeCell<Nbr<E>>> = Vec::with_capacity(capacity);
        slots.extend(entries.take(capacity).map(UnsafeCell::new));
        slots.resize_with(capacity, || UnsafeCell::new(Nbr::default()));
        Self { slots: slots.into_boxed_slice() }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn as_ptr(&self) -> *const Nbr<E> {
        self.slots.as_ptr() as *const Nbr<E>
    }
}

struct AdjList<E> {
    segment: Atomic<Segment<E>>,
    /// Published entry count; the only synchronisation point with readers.
    size: AtomicUsize,
    lock: Mutex<()>,
}

impl<E: EdgeData> AdjList<E> {
    fn with_capacity(capacity: usize) -> Self {
        Self::from_entries(Vec::new(), capacity)
    }

    fn from_entries(entries: Vec<Nbr<E>>, capacity: usize) -> Self {
        let size = entries.len();
        let segment = if capacity == 0 {
            Atomic::null()
        } else {
            Atomic::new(Segment::with_entries(entries.into_iter(), capacity.max(size)))
        };
        Self { segment, size: AtomicUsize::new(size), lock: Mutex::new(()) }
    }

    /// Append one entry. The caller holds `lock` or has exclusive access.
    fn append(&self, nbr: Nbr<E>, guard: &Guard) {
        let size = self.size.load(Ordering::Relaxed);
        let mut current = self.segment.load(Ordering::Acquire, guard);
        let capacity = unsafe { current.as_ref() }.map_or(0, Segment::capacity);
        if size == capacity {
            let grown = (capacity + capacity / 5 + 1).max(MIN_GROWN_CAPACITY);
            let live = unsafe { current.as_ref() }
                .map(|seg| (0..size).map(|i| unsafe { (*seg.slots[i].get()).clone() }).collect::<Vec<_>>())
                .unwrap_or_default();
            let next = Owned::new(Segment::with_entries(live.into_iter(), grown)).into_shared(guard);
            let old = self.segment.swap(next, Ordering::AcqRel, guard);
            if !old.is_null() {
                unsafe { guard.defer_destroy(old) };
            }
            current = next;
        }
        unsafe {
            *current.deref().slots[size].get() = nbr;
        }
        self.size.store(size + 1, Ordering::Release);
    }

    fn snapshot(&self) -> NbrSlice<'_, E> {
        let guard = epoch::pin();
        let size = self.size.load(Ordering::Acquire);
        let (ptr, len) = match unsafe { self.segment.load(Ordering::Acquire, &guard).as_ref() } {
            Some(seg) => (seg.as_ptr(), size.min(seg.capacity())),
            None => return NbrSlice::empty(),
        };
        unsafe { NbrSlice::pinned(ptr, len, guard) }
    }

    fn entries_mut(&mut self) -> &mut [Nbr<E>] {
        let size = *self.size.get_mut();
        let segment: Shared<'_, Segment<E>> = self.segment.load(Ordering::Relaxed, unsafe { epoch::unprotected() });
        match unsafe { segment.as_ref() } {
            Some(seg) => unsafe { std::slice::from_raw_parts_mut(seg.as_ptr() as *mut Nbr<E>, size) },
            None => &mut [],
        }
    }

    fn capacity(&self) -> usize {
        let guard = epoch::pin();
        unsafe { self.segment.load(Ordering::Acquire, &guard).as_ref() }.map_or(0, Segment::capacity)
    }
}

impl<E> Drop for AdjList<E> {
    fn drop(&mut self) {
        unsafe {
            let segment = self.segment.load(Ordering::Relaxed, epoch::unprotected());
            if !segment.is_null() {
                drop(segment.into_owned());
            }
        }
    }
}

/// Append-only adjacency lists, one per source vertex.
pub struct MultipleCsr<E> {
    lists: Vec<AdjList<E>>,
}

impl<E: EdgeData> MultipleCsr<E> {
    pub fn new() -> Self {
        Self { lists: Vec::new() }
    }

    /// Size each source for its bulk degree plus 20% slack.
    pub fn batch_init(&mut self, vnum: usize, degree: &[i32]) {
        self.lists = (0..vnum)
            .map(|v| {
                let d = degree.get(v).copied().unwrap_or(0).max(0) as usize;
                AdjList::with_capacity(d + d / 5)
            })
            .collect();
    }

    fn list(&self, src: Vid) -> Result<&AdjList<E>> {
        self.lists
            .get(src as usize)
            .ok_or(GraphError::CapacityExceeded { what: "adjacency source", capacity: self.lists.len() })
    }

    pub fn batch_put_edge(&mut self, src: Vid, dst: Vid, data: E, ts: Timestamp) -> Result<()> {
        let list = self.list(src)?;
        let guard = epoch::pin();
        list.append(Nbr { neighbor: dst, timestamp: ts, data }, &guard);
        Ok(())
    }

    pub fn put_edge(&self, src: Vid, dst: Vid, data: E, ts: Timestamp) -> Result<()> {
        let list = self.list(src)?;
        let _lock = list.lock.lock();
        let guard = epoch::pin();
        list.append(Nbr { neighbor: dst, timestamp: ts, data }, &guard);
        Ok(())
    }

    pub fn get_edges(&self, v: Vid) -> NbrSlice<'_, E> {
        match self.lists.get(v as usize) {
            Some(list) => list.snapshot(),
            None => NbrSlice::empty(),
        }
    }

    pub fn get_edges_mut(&mut self, v: Vid) -> &mut [Nbr<E>] {
        match self.lists.get_mut(v as usize) {
            Some(list) => list.entries_mut(),
            None => &mut [],
        }
    }

    pub fn degree(&self, v: Vid) -> usize {
        self.lists.get(v as usize).map_or(0, |l| l.size.load(Ordering::Acquire))
    }

    pub fn capacity(&self, v: Vid) -> usize {
        self.lists.get(v as usize).map_or(0, AdjList::capacity)
    }

    pub fn vertex_capacity(&self) -> usize {
        self.lists.len()
    }

    pub fn resize(&mut self, vnum: usize) {
        if vnum > self.lists.len() {
            self.lists.resize_with(vnum, || AdjList::with_capacity(0));
        }
    }

    pub fn edge_num(&self) -> usize {
        self.lists.iter().map(|l| l.size.load(Ordering::Acquire)).sum()
    }

    pub fn serialize(&self, prefix: &std::path::Path) -> Result<()> {
        let snapshots: Vec<NbrSlice<'_, E>> = self.lists.iter().map(AdjList::snapshot).collect();
        let degree: Vec<i32> = snapshots.iter().map(|s| s.len() as i32).collect();
        write_degree(&degree_path(prefix), &degree)?;
        write_nbr_list(&nbr_list_path(prefix), snapshots.iter().flat_map(|s| s.iter()))
    }

    /// Rebuild from a degree file, restoring the bulk-load slack per source.
    pub fn deserialize(prefix: &std::path::Path) -> Result<Self> {
        let degree = read_degree(&degree_path(prefix))?;
        let total: usize = degree.iter().map(|&d| d as usize).sum();
        let mut entries = read_nbr_list::<E>(&nbr_list_path(prefix), total)?.into_iter();
        let lists = degree
            .iter()
            .map(|&d| {
                let d = d as usize;
                AdjList::from_entries(entries.by_ref().take(d).collect(), d + d / 5)
            })
            .collect();
        Ok(Self { lists })
    }
}

impl<E: EdgeData> Default for MultipleCsr<E> {
    fn default() -> Self {
        Self::new()
    }
}
