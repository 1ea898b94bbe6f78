use super::io::{degree_path, nbr_list_path, read_degree, read_nbr_list, write_degree, write_nbr_list};
use super::{EdgeData, Nbr, NbrSlice};
use crate::error::{GraphError, Result};
use crate::types::{Timestamp, Vid, INVALID_TIMESTAMP};
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU8, Ordering};

const VACANT: u8 = 0;
const WRITING: u8 = 1;
const OCCUPIED: u8 = 2;

struct Slot<E> {
    state: AtomicU8,
    nbr: UnsafeCell<Nbr<E>>,
}

unsafe impl<E: Send + Sync> Sync for Slot<E> {}

impl<E: EdgeData> Slot<E> {
    fn vacant() -> Self {
        Self {
            state: AtomicU8::new(VACANT),
            nbr: UnsafeCell::new(Nbr { neighbor: 0, timestamp: INVALID_TIMESTAMP, data: E::default() }),
        }
    }

    fn occupied(nbr: Nbr<E>) -> Self {
        Self { state: AtomicU8::new(OCCUPIED), nbr: UnsafeCell::new(nbr) }
    }

    fn is_occupied(&self) -> bool {
        self.state.load(Ordering::Acquire) == OCCUPIED
    }
}

/// At most one entry per source. A slot is written once and never replaced.
pub struct SingleCsr<E> {
    slots: Vec<Slot<E>>,
}

impl<E: EdgeData> SingleCsr<E> {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub fn batch_init(&mut self, vnum: usize) {
        self.slots = (0..vnum + vnum / 5).map(|_| Slot::vacant()).collect();
    }

    fn slot(&self, src: Vid) -> Result<&Slot<E>> {
        self.slots
            .get(src as usize)
            .ok_or(GraphError::CapacityExceeded { what: "adjacency source", capacity: self.slots.len() })
    }

    pub fn batch_put_edge(&mut self, src: Vid, dst: Vid, data: E, ts: Timestamp) -> Result<()> {
        let capacity = self.slots.len();
        let slot = self
            .slots
            .get_mut(src as usize)
            .ok_or(GraphError::CapacityExceeded { what: "adjacency source", capacity })?;
        if *slot.state.get_mut() != VACANT {
            return Err(GraphError::SingleEdgeOccupied(src));
        }
        *slot.nbr.get_mut() = Nbr { neighbor: dst, timestamp: ts, data };
        *slot.state.get_mut() = OCCUPIED;
        Ok(())
    }

    pub fn put_edge(&self, src: Vid, dst: Vid, data: E, ts: Timestamp) -> Result<()> {
        self.reserve(src)?;
        self.put_reserved(src, dst, data, ts)
    }

    /// Claim the slot of `src` for a later [`put_reserved`](Self::put_reserved).
    pub fn reserve(&self, src: Vid) -> Result<()> {
        let slot = self.slot(src)?;
        if slot.state.compare_exchange(VACANT, WRITING, Ordering::Acquire, Ordering::Relaxed).is_err() {
            return Err(GraphError::SingleEdgeOccupied(src));
        }
        Ok(())
    }

    /// Give back a slot claimed by [`reserve`](Self::reserve).
    pub fn cancel(&self, src: Vid) {
        if let Some(slot) = self.slots.get(src as usize) {
            let _ = slot.state.compare_exchange(WRITING, VACANT, Ordering::Release, Ordering::Relaxed);
        }
    }

    pub fn put_reserved(&self, src: Vid, dst: Vid, data: E, ts: Timestamp) -> Result<()> {
        let slot = self.slot(src)?;
        if slot.state.load(Ordering::Acquire) != WRITING {
            return Err(GraphError::SingleEdgeOccupied(src));
        }
        // The WRITING state gives this thread sole access to `nbr`.
        unsafe {
            *slot.nbr.get() = Nbr { neighbor: dst, timestamp: ts, data };
        }
        slot.state.store(OCCUPIED, Ordering::Release);
        Ok(())
    }

    pub fn is_vacant(&self, src: Vid) -> bool {
        self.slots.get(src as usize).is_some_and(|s| s.state.load(Ordering::Acquire) == VACANT)
    }

    pub fn get_edge(&self, v: Vid) -> Option<&Nbr<E>> {
        let slot = self.slots.get(v as usize)?;
        slot.is_occupied().then(|| unsafe { &*slot.nbr.get() })
    }

    pub fn get_edges(&self, v: Vid) -> NbrSlice<'_, E> {
        match self.get_edge(v) {
            Some(nbr) => NbrSlice::borrowed(std::slice::from_ref(nbr)),
            None => NbrSlice::empty(),
        }
    }

    pub fn get_edges_mut(&mut self, v: Vid) -> &mut [Nbr<E>] {
        match self.slots.get_mut(v as usize) {
            Some(slot) => {
                if *slot.state.get_mut() == OCCUPIED {
                    std::slice::from_mut(slot.nbr.get_mut())
                } else {
                    &mut []
                }
            }
            None => &mut [],
        }
    }

    pub fn vertex_capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn resize(&mut self, vnum: usize) {
        if vnum > self.slots.len() {
            self.slots.resize_with(vnum, Slot::vacant);
        }
    }

    pub fn edge_num(&self) -> usize {
        self.slots.iter().filter(|s| s.is_occupied()).count()
    }

    /// Degree file holds 0 or 1 per slot, so reload reproduces the slot count.
    pub fn serialize(&self, prefix: &std::path::Path) -> Result<()> {
        let degree: Vec<i32> = self.slots.iter().map(|s| s.is_occupied() as i32).collect();
        write_degree(&degree_path(prefix), &degree)?;
        write_nbr_list(&nbr_list_path(prefix), (0..self.slots.len() as Vid).filter_map(|v| self.get_edge(v)))
    }

    pub fn deserialize(prefix: &std::path::Path) -> Result<Self> {
        let path = degree_path(prefix);
        let degree = read_degree(&path)?;
        if degree.iter().any(|&d| d > 1) {
            return Err(GraphError::corrupt(&path, "single-edge degree above one"));
        }
        let total = degree.iter().filter(|&&d| d == 1).count();
        let mut entries = read_nbr_list::<E>(&nbr_list_path(prefix), total)?.into_iter();
        let mut slots = Vec::with_capacity(degree.len());
        for d in degree {
            if d == 1 {
                let nbr = entries.next().ok_or_else(|| GraphError::corrupt(&path, "missing single-edge entry"))?;
                slots.push(Slot::occupied(nbr));
            } else {
                slots.push(Slot::vacant());
            }
        }
        Ok(Self { slots })
    }
}

impl<E: EdgeData> Default for SingleCsr<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn test_second_insert_rejected() {
        let mut csr = SingleCsr::<i32>::new();
        csr.batch_init(10);
        assert_eq!(csr.vertex_capacity(), 12);
        csr.put_edge(3, 7, 42, 5).unwrap();
        assert!(matches!(csr.put_edge(3, 8, 1, 6), Err(GraphError::SingleEdgeOccupied(3))));
        assert!(matches!(csr.batch_put_edge(3, 8, 1, 6), Err(GraphError::SingleEdgeOccupied(3))));

        let edges = csr.get_edges(3);
        assert_eq!(&*edges, &[Nbr { neighbor: 7, timestamp: 5, data: 42 }]);
        assert!(csr.get_edges(4).is_empty());
        assert_eq!(csr.edge_num(), 1);
    }

    #[test]
    fn test_racing_writers_one_wins() {
        let mut csr = SingleCsr::<()>::new();
        csr.batch_init(1);
        let csr = Arc::new(csr);
        let wins: usize = (0..8)
            .map(|t| {
                let csr = Arc::clone(&csr);
                thread::spawn(move || csr.put_edge(0, t, (), 1).is_ok() as usize)
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .sum();
        assert_eq!(wins, 1);
        assert_eq!(csr.get_edges(0).len(), 1);
    }

    #[test]
    fn test_reserved_slot_hidden_until_written() {
        let mut csr = SingleCsr::<i32>::new();
        csr.batch_init(2);
        csr.reserve(1).unwrap();
        assert!(matches!(csr.reserve(1), Err(GraphError::SingleEdgeOccupied(1))));
        assert!(csr.put_edge(1, 0, 5, 1).is_err());
        assert!(csr.get_edges(1).is_empty());
        assert!(!csr.is_vacant(1));

        csr.cancel(1);
        assert!(csr.is_vacant(1));
        assert!(csr.put_reserved(1, 0, 5, 1).is_err());
        csr.reserve(1).unwrap();
        csr.put_reserved(1, 0, 5, 1).unwrap();
        csr.cancel(1);
        assert_eq!(csr.get_edge(1), Some(&Nbr { neighbor: 0, timestamp: 1, data: 5 }));
    }

    #[test]
    fn test_edges_mut_only_for_occupied() {
        let mut csr = SingleCsr::<i32>::new();
        csr.batch_init(3);
        csr.put_edge(1, 2, 7, 4).unwrap();
        assert!(csr.get_edges_mut(0).is_empty());
        assert!(csr.get_edges_mut(9).is_empty());
        csr.get_edges_mut(1)[0].data = 8;
        assert_eq!(csr.get_edge(1).map(|n| n.data), Some(8));
    }

    #[test]
    fn test_files() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("oe_0_1_1");
        let mut csr = SingleCsr::<i64>::new();
        csr.batch_init(5);
        csr.batch_put_edge(0, 2, -9, 1).unwrap();
        csr.batch_put_edge(4, 0, 33, 2).unwrap();
        csr.serialize(&prefix).unwrap();

        let back = SingleCsr::<i64>::deserialize(&prefix).unwrap();
        assert_eq!(back.vertex_capacity(), 6);
        assert_eq!(back.get_edge(4), Some(&Nbr { neighbor: 0, timestamp: 2, data: 33 }));
        assert!(back.get_edge(1).is_none());
        assert!(back.put_edge(0, 1, 0, 3).is_err());
        back.put_edge(1, 1, 0, 3).unwrap();
    }
}
