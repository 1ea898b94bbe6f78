//! Transactions over a [`PropertyFragment`].
//!
//! Every transaction holds exactly one timestamp from the
//! [`VersionManager`] and gives it back exactly once: on `commit`, on
//! `abort`, or when dropped, whichever happens first.

use crate::csr::EdgeCursor;
use crate::error::{GraphError, Result};
use crate::fragment::PropertyFragment;
use crate::property::Any;
use crate::types::{Direction, LabelId, Oid, Timestamp, Vid};
use crate::version::VersionManager;
use tracing::debug;

/// Forward-only cursor over the vertices of one label.
pub struct VertexIterator<'a> {
    graph: &'a PropertyFragment,
    label: LabelId,
    cur: Vid,
    num: Vid,
}

impl<'a> VertexIterator<'a> {
    pub fn is_valid(&self) -> bool {
        self.cur < self.num
    }

    pub fn next(&mut self) {
        self.cur += 1;
    }

    /// Jump to `vid`. Positions past the end leave the iterator invalid.
    pub fn goto(&mut self, vid: Vid) {
        self.cur = vid.min(self.num);
    }

    /// External id of the current vertex.
    pub fn get_id(&self) -> Option<Oid> {
        self.graph.get_oid(self.label, self.cur)
    }

    pub fn get_index(&self) -> Vid {
        self.cur
    }

    pub fn get_field(&self, col: usize) -> Option<Any<'a>> {
        if !self.is_valid() {
            return None;
        }
        self.graph.get_vertex_table(self.label).ok()?.get(self.cur as usize, col)
    }

    pub fn field_num(&self) -> usize {
        self.graph.get_vertex_table(self.label).map_or(0, |t| t.col_num())
    }
}

/// Snapshot reader. Sees exactly the writes visible when it was created.
pub struct ReadTransaction<'g> {
    graph: &'g PropertyFragment,
    version: &'g VersionManager,
    ts: Timestamp,
    released: bool,
}

impl<'g> ReadTransaction<'g> {
    pub fn new(graph: &'g PropertyFragment, version: &'g VersionManager) -> Self {
        let ts = version.acquire_read_timestamp();
        Self { graph, version, ts, released: false }
    }

    pub fn timestamp(&self) -> Timestamp {
        self.ts
    }

    pub fn graph(&self) -> &'g PropertyFragment {
        self.graph
    }

    pub fn vertex_num(&self, label: LabelId) -> usize {
        self.graph.vertex_num(label)
    }

    pub fn get_vertex_index(&self, label: LabelId, oid: Oid) -> Option<Vid> {
        self.graph.get_lid(label, oid)
    }

    pub fn get_vertex_iterator(&self, label: LabelId) -> VertexIterator<'g> {
        VertexIterator { graph: self.graph, label, cur: 0, num: self.graph.vertex_num(label) as Vid }
    }

    pub fn get_outgoing_edges(&self, label: LabelId, v: Vid, nbr_label: LabelId, edge: LabelId) -> Result<EdgeCursor<'g>> {
        self.graph.edge_cursor(Direction::Outgoing, label, v, nbr_label, edge, self.ts)
    }

    pub fn get_incoming_edges(&self, label: LabelId, v: Vid, nbr_label: LabelId, edge: LabelId) -> Result<EdgeCursor<'g>> {
        self.graph.edge_cursor(Direction::Incoming, label, v, nbr_label, edge, self.ts)
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.version.release_read_timestamp();
        }
    }

    pub fn commit(mut self) {
        self.release();
    }

    pub fn abort(mut self) {
        self.release();
    }
}

impl Drop for ReadTransaction<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Debug, Clone)]
struct PendingEdge {
    src_label: LabelId,
    src: Oid,
    dst_label: LabelId,
    dst: Oid,
    edge_label: LabelId,
    data: Any<'static>,
}

/// Buffers edges addressed by external id and applies them under one
/// insert timestamp on commit.
pub struct InsertTransaction<'g> {
    graph: &'g PropertyFragment,
    version: &'g VersionManager,
    ts: Timestamp,
    edges: Vec<PendingEdge>,
    released: bool,
}

impl<'g> InsertTransaction<'g> {
    pub fn new(graph: &'g PropertyFragment, version: &'g VersionManager) -> Self {
        let ts = version.acquire_insert_timestamp();
        Self { graph, version, ts, edges: Vec::new(), released: false }
    }

    pub fn timestamp(&self) -> Timestamp {
        self.ts
    }

    /// Queue one edge. The triplet and payload type are checked now,
    /// endpoints are resolved on commit.
    pub fn add_edge(
        &mut self,
        src_label: LabelId,
        src: Oid,
        dst_label: LabelId,
        dst: Oid,
        edge_label: LabelId,
        data: Any<'_>,
    ) -> Result<()> {
        let es = self.graph.schema().edge_schema(src_label, dst_label, edge_label)?;
        data.expect_type(es.data_type())?;
        self.edges.push(PendingEdge { src_label, src, dst_label, dst, edge_label, data: data.into_owned() });
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.edges.len()
    }

    /// Resolve every endpoint, then ingest in queue order. An unknown
    /// endpoint rejects the whole batch before anything is written.
    pub fn commit(mut self) -> Result<()> {
        let result = self.apply();
        self.release();
        result
    }

    fn apply(&mut self) -> Result<()> {
        let graph = self.graph;
        let resolved = self
            .edges
            .iter()
            .map(|e| {
                let src = graph.get_lid(e.src_label, e.src).ok_or(GraphError::VertexNotFound(e.src))?;
                let dst = graph.get_lid(e.dst_label, e.dst).ok_or(GraphError::VertexNotFound(e.dst))?;
                Ok::<_, GraphError>((e, src, dst))
            })
            .collect::<Result<Vec<_>>>()?;
        for (e, src, dst) in resolved {
            graph.ingest_edge(e.src_label, src, e.dst_label, dst, e.edge_label, self.ts, &e.data)?;
        }
        debug!(ts = self.ts, edges = self.edges.len(), "insert transaction applied");
        Ok(())
    }

    pub fn abort(mut self) {
        self.edges.clear();
        self.release();
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.version.release_insert_timestamp(self.ts);
        }
    }
}

impl Drop for InsertTransaction<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Exclusive writer. No reader or inserter runs while it is open.
pub struct UpdateTransaction<'g> {
    graph: &'g mut PropertyFragment,
    version: &'g VersionManager,
    ts: Timestamp,
    released: bool,
}

impl<'g> UpdateTransaction<'g> {
    pub fn new(graph: &'g mut PropertyFragment, version: &'g VersionManager) -> Self {
        let ts = version.acquire_update_timestamp();
        Self { graph, version, ts, released: false }
    }

    pub fn timestamp(&self) -> Timestamp {
        self.ts
    }

    pub fn graph(&self) -> &PropertyFragment {
        &*self.graph
    }

    pub fn graph_mut(&mut self) -> &mut PropertyFragment {
        &mut *self.graph
    }

    pub fn add_vertex(&mut self, label: LabelId, oid: Oid, values: &[Any<'_>]) -> Result<Vid> {
        self.graph.add_vertex(label, oid, values)
    }

    /// Insert one edge immediately, stamped with this transaction's timestamp.
    pub fn add_edge(
        &mut self,
        src_label: LabelId,
        src: Oid,
        dst_label: LabelId,
        dst: Oid,
        edge_label: LabelId,
        data: &Any<'_>,
    ) -> Result<()> {
        let src_vid = self.graph.get_lid(src_label, src).ok_or(GraphError::VertexNotFound(src))?;
        let dst_vid = self.graph.get_lid(dst_label, dst).ok_or(GraphError::VertexNotFound(dst))?;
        self.graph.ingest_edge(src_label, src_vid, dst_label, dst_vid, edge_label, self.ts, data)
    }

    /// Overwrite the payload of the `nth` outgoing edge of `src` and its
    /// incoming mirror, restamping both with this transaction's timestamp.
    pub fn set_edge_data(
        &mut self,
        src_label: LabelId,
        src: Vid,
        dst_label: LabelId,
        edge_label: LabelId,
        nth: usize,
        data: &Any<'_>,
    ) -> Result<()> {
        let ts = self.ts;
        let dst = {
            let mut cursor = self.graph.edge_cursor_mut(Direction::Outgoing, src_label, src, dst_label, edge_label)?;
            for _ in 0..nth {
                cursor.next();
            }
            if !cursor.is_valid() {
                return Err(GraphError::EdgeNotFound { vid: src, position: nth });
            }
            cursor.set_data(data, ts)?;
            cursor.get_neighbor()
        };
        let mut cursor = self.graph.edge_cursor_mut(Direction::Incoming, dst_label, dst, src_label, edge_label)?;
        while cursor.is_valid() {
            if cursor.get_neighbor() == src {
                cursor.set_data(data, ts)?;
                break;
            }
            cursor.next();
        }
        Ok(())
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.version.release_update_timestamp(self.ts);
        }
    }

    pub fn commit(mut self) {
        self.release();
    }

    pub fn abort(mut self) {
        self.release();
    }
}

impl Drop for UpdateTransaction<'_> {
    fn drop(&mut self) {
        self.release();
    }
}
