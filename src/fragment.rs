//! The property graph fragment: per-label indexers and tables plus one
//! adjacency structure per configured (src, dst, edge) triplet and
//! direction.
//!
//! # Directory layout
//! ```text
//! {dir}/schema.bin
//! {dir}/indexer/vertex_map_{label}.lfi
//! {dir}/table/vertex_table_{label}.meta, .col_{i}
//! {dir}/csr/{oe|ie}_{src}_{dst}_{edge}.degree, .nbr_list
//! ```

use crate::csr::{AdjSlice, AdjSliceMut, EdgeCursor, EdgeCursorMut, TypedCsr};
use crate::error::{GraphError, Result};
use crate::id_indexer::{IdIndexer, LfIndexer};
use crate::loader::{read_edge_file, read_vertex_file, EdgeRecord, VertexRecord};
use crate::property::Any;
use crate::schema::{EdgeTriplet, Schema};
use crate::table::Table;
use crate::types::{Direction, LabelId, Oid, PropertyType, StorageStrategy, Timestamp, Vid};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

pub const SCHEMA_FILE: &str = "schema.bin";
const INDEXER_DIR: &str = "indexer";
const TABLE_DIR: &str = "table";
const CSR_DIR: &str = "csr";

/// Run `jobs` closures on `thread_num` workers that drain a shared index.
/// Results come back in job order.
fn run_jobs<T, F>(thread_num: usize, jobs: usize, work: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize) -> Result<T> + Sync,
{
    if jobs == 0 {
        return Ok(Vec::new());
    }
    let workers = thread_num.max(1).min(jobs);
    let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;
    let next = AtomicUsize::new(0);
    let done: Mutex<Vec<(usize, Result<T>)>> = Mutex::new(Vec::with_capacity(jobs));
    pool.scope(|s| {
        for _ in 0..workers {
            s.spawn(|_| loop {
                let i = next.fetch_add(1, Ordering::Relaxed);
                if i >= jobs {
                    break;
                }
                let out = work(i);
                done.lock().push((i, out));
            });
        }
    });
    let mut done = done.into_inner();
    done.sort_by_key(|(i, _)| *i);
    done.into_iter().map(|(_, r)| r).collect()
}

/// Collects vertex and edge records, then builds a frozen fragment.
pub struct FragmentBuilder {
    schema: Schema,
    vertex_files: Vec<Vec<PathBuf>>,
    vertex_records: Vec<Vec<VertexRecord>>,
    edge_files: BTreeMap<EdgeTriplet, Vec<PathBuf>>,
    edge_records: BTreeMap<EdgeTriplet, Vec<EdgeRecord>>,
}

impl FragmentBuilder {
    pub fn new(schema: Schema) -> Self {
        let vnum = schema.vertex_label_num();
        Self {
            schema,
            vertex_files: vec![Vec::new(); vnum],
            vertex_records: vec![Vec::new(); vnum],
            edge_files: BTreeMap::new(),
            edge_records: BTreeMap::new(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn check_vertex_label(&self, label: LabelId) -> Result<()> {
        if (label as usize) < self.vertex_files.len() {
            Ok(())
        } else {
            Err(GraphError::LabelOutOfRange(label))
        }
    }

    fn check_triplet(&self, (src, dst, edge): EdgeTriplet) -> Result<()> {
        if self.schema.exist(src, dst, edge) {
            Ok(())
        } else {
            Err(GraphError::EdgeTripletNotFound { src, dst, edge })
        }
    }

    pub fn add_vertex_file(&mut self, label: LabelId, path: impl Into<PathBuf>) -> Result<&mut Self> {
        self.check_vertex_label(label)?;
        self.vertex_files[label as usize].push(path.into());
        Ok(self)
    }

    pub fn add_edge_file(&mut self, triplet: EdgeTriplet, path: impl Into<PathBuf>) -> Result<&mut Self> {
        self.check_triplet(triplet)?;
        self.edge_files.entry(triplet).or_default().push(path.into());
        Ok(self)
    }

    /// Queue one vertex; `values` follow the label's property order.
    pub fn add_vertex(&mut self, label: LabelId, oid: Oid, values: Vec<Any<'static>>) -> Result<&mut Self> {
        self.check_vertex_label(label)?;
        self.vertex_records[label as usize].push(VertexRecord { oid, values: SmallVec::from_vec(values) });
        Ok(self)
    }

    pub fn add_edge(
        &mut self,
        triplet: EdgeTriplet,
        src: Oid,
        dst: Oid,
        data: Any<'static>,
        ts: Timestamp,
    ) -> Result<&mut Self> {
        self.check_triplet(triplet)?;
        self.edge_records.entry(triplet).or_default().push(EdgeRecord { src, dst, data, ts });
        Ok(self)
    }

    pub fn build(self, thread_num: usize) -> Result<PropertyFragment> {
        let start = Instant::now();
        let schema = &self.schema;
        info!(
            vertex_labels = schema.vertex_label_num(),
            edge_triplets = schema.edge_triplets().count(),
            threads = thread_num,
            "bulk load started"
        );

        let vertex_parts = run_jobs(thread_num, schema.vertex_label_num(), |i| {
            self.build_vertex_label(i as LabelId)
        })?;
        let (lf_indexers, vertex_data): (Vec<_>, Vec<_>) = vertex_parts.into_iter().unzip();

        let triplets: Vec<EdgeTriplet> = schema.edge_triplets().map(|(t, _)| t).collect();
        let edge_parts = run_jobs(thread_num, triplets.len(), |i| {
            self.build_edge_triplet(triplets[i], &lf_indexers)
        })?;

        let mut fragment = PropertyFragment::with_schema(self.schema.clone(), lf_indexers, vertex_data);
        for (triplet, (ie, oe)) in triplets.into_iter().zip(edge_parts) {
            let idx = fragment.edge_index(triplet.0, triplet.1, triplet.2);
            fragment.ie[idx] = Some(ie);
            fragment.oe[idx] = Some(oe);
        }
        info!(
            vertices = fragment.total_vertex_num(),
            edges = fragment.total_edge_num(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "bulk load finished"
        );
        Ok(fragment)
    }

    fn build_vertex_label(&self, label: LabelId) -> Result<(LfIndexer, Table)> {
        let vs = self.schema.vertex_schema(label)?;
        let name = self.schema.get_vertex_label_name(label)?;
        let mut records = Vec::new();
        for path in &self.vertex_files[label as usize] {
            records.extend(read_vertex_file(path, &vs.property_names, &vs.properties)?);
        }
        records.extend(self.vertex_records[label as usize].iter().cloned());

        let mut indexer = IdIndexer::<Oid>::new();
        indexer.rehash(records.len());
        let mut table = Table::new();
        table.init(&vs.property_names, &vs.properties, &vs.storage, vs.max_vnum)?;
        for record in &records {
            let (vid, fresh) = indexer.insert(record.oid);
            if !fresh {
                warn!(label = name, oid = record.oid, "duplicate vertex id, keeping first record");
                continue;
            }
            table.insert(vid, &record.values)?;
        }
        debug!(label = name, vertices = indexer.size(), "vertex label loaded");
        Ok((indexer.build_lf_indexer()?, table))
    }

    fn build_edge_triplet(&self, triplet: EdgeTriplet, indexers: &[LfIndexer]) -> Result<(TypedCsr, TypedCsr)> {
        let (src, dst, edge) = triplet;
        let es = self.schema.edge_schema(src, dst, edge)?;
        let property = es.property_names.first().map(|n| (n.as_str(), es.data_type()));
        let mut records = Vec::new();
        for path in self.edge_files.get(&triplet).into_iter().flatten() {
            records.extend(read_edge_file(path, property)?);
        }
        records.extend(self.edge_records.get(&triplet).into_iter().flatten().cloned());

        let (src_index, dst_index) = (&indexers[src as usize], &indexers[dst as usize]);
        let mut resolved = Vec::with_capacity(records.len());
        let mut oe_degree = vec![0i32; src_index.size()];
        let mut ie_degree = vec![0i32; dst_index.size()];
        for record in records {
            match (src_index.get_index(record.src), dst_index.get_index(record.dst)) {
                (Some(s), Some(d)) => {
                    oe_degree[s as usize] += 1;
                    ie_degree[d as usize] += 1;
                    resolved.push((s, d, record.data, record.ts));
                }
                _ => warn!(src = record.src, dst = record.dst, ?triplet, "edge endpoint not found, skipping"),
            }
        }

        let mut oe = TypedCsr::new(es.data_type(), es.oe_strategy);
        let mut ie = TypedCsr::new(es.data_type(), es.ie_strategy);
        oe.batch_init(src_index.size(), &oe_degree);
        ie.batch_init(dst_index.size(), &ie_degree);
        for (s, d, data, ts) in &resolved {
            oe.batch_put_edge(*s, *d, data, *ts)?;
            ie.batch_put_edge(*d, *s, data, *ts)?;
        }
        debug!(?triplet, edges = resolved.len(), "edge triplet loaded");
        Ok((ie, oe))
    }
}

pub struct PropertyFragment {
    schema: Schema,
    lf_indexers: Vec<LfIndexer>,
    vertex_data: Vec<Table>,
    ie: Vec<Option<TypedCsr>>,
    oe: Vec<Option<TypedCsr>>,
    vertex_label_num: usize,
    edge_label_num: usize,
}

impl PropertyFragment {
    fn with_schema(schema: Schema, lf_indexers: Vec<LfIndexer>, vertex_data: Vec<Table>) -> Self {
        let vertex_label_num = schema.vertex_label_num();
        let edge_label_num = schema.edge_label_num();
        let slots = vertex_label_num * vertex_label_num * edge_label_num;
        Self {
            schema,
            lf_indexers,
            vertex_data,
            ie: (0..slots).map(|_| None).collect(),
            oe: (0..slots).map(|_| None).collect(),
            vertex_label_num,
            edge_label_num,
        }
    }

    /// A fragment with no vertices or edges, ready for online insertion.
    pub fn init_empty(schema: Schema) -> Result<Self> {
        FragmentBuilder::new(schema).build(1)
    }

    /// Bulk load from record files, one `(label, path)` per vertex file and
    /// one `(triplet, path)` per edge file.
    pub fn init(
        schema: Schema,
        vertex_files: &[(LabelId, PathBuf)],
        edge_files: &[(EdgeTriplet, PathBuf)],
        thread_num: usize,
    ) -> Result<Self> {
        let mut builder = FragmentBuilder::new(schema);
        for (label, path) in vertex_files {
            builder.add_vertex_file(*label, path.clone())?;
        }
        for (triplet, path) in edge_files {
            builder.add_edge_file(*triplet, path.clone())?;
        }
        builder.build(thread_num)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    #[inline]
    fn edge_index(&self, src: LabelId, dst: LabelId, edge: LabelId) -> usize {
        let (src, dst, edge) = (src as usize, dst as usize, edge as usize);
        src * self.vertex_label_num * self.edge_label_num + dst * self.edge_label_num + edge
    }

    fn checked_index(&self, src: LabelId, dst: LabelId, edge: LabelId) -> Result<usize> {
        if self.schema.exist(src, dst, edge) {
            Ok(self.edge_index(src, dst, edge))
        } else {
            Err(GraphError::EdgeTripletNotFound { src, dst, edge })
        }
    }

    /// Adjacency structure of the triplet in direction `dir`.
    pub fn csr(&self, dir: Direction, src: LabelId, dst: LabelId, edge: LabelId) -> Result<&TypedCsr> {
        let idx = self.checked_index(src, dst, edge)?;
        let slot = match dir {
            Direction::Outgoing => &self.oe[idx],
            Direction::Incoming => &self.ie[idx],
        };
        slot.as_ref().ok_or(GraphError::EdgeTripletNotFound { src, dst, edge })
    }

    pub fn csr_mut(&mut self, dir: Direction, src: LabelId, dst: LabelId, edge: LabelId) -> Result<&mut TypedCsr> {
        let idx = self.checked_index(src, dst, edge)?;
        let slot = match dir {
            Direction::Outgoing => &mut self.oe[idx],
            Direction::Incoming => &mut self.ie[idx],
        };
        slot.as_mut().ok_or(GraphError::EdgeTripletNotFound { src, dst, edge })
    }

    // ── vertices ─────────────────────────────────────────────────────────────

    fn indexer(&self, label: LabelId) -> Result<&LfIndexer> {
        self.lf_indexers.get(label as usize).ok_or(GraphError::LabelOutOfRange(label))
    }

    pub fn vertex_num(&self, label: LabelId) -> usize {
        self.lf_indexers.get(label as usize).map_or(0, LfIndexer::size)
    }

    pub fn total_vertex_num(&self) -> usize {
        self.lf_indexers.iter().map(LfIndexer::size).sum()
    }

    pub fn get_lid(&self, label: LabelId, oid: Oid) -> Option<Vid> {
        self.lf_indexers.get(label as usize)?.get_index(oid)
    }

    pub fn get_oid(&self, label: LabelId, vid: Vid) -> Option<Oid> {
        self.lf_indexers.get(label as usize)?.get_key(vid)
    }

    pub fn get_vertex_table(&self, label: LabelId) -> Result<&Table> {
        self.vertex_data.get(label as usize).ok_or(GraphError::LabelOutOfRange(label))
    }

    /// Typed property lookup. `Ok(None)` when `vid` is not a vertex of `label`
    /// or the column is declared without storage.
    pub fn get_vertex_property(
        &self,
        label: LabelId,
        vid: Vid,
        name: &str,
        expected: PropertyType,
    ) -> Result<Option<Any<'_>>> {
        let table = self.get_vertex_table(label)?;
        let col = table.get_column_id(name).ok_or_else(|| GraphError::UnknownColumn(name.to_string()))?;
        let column = &table.columns()[col];
        let declared = column.property_type();
        if declared != expected {
            return Err(GraphError::TypeMismatch { expected, found: declared });
        }
        if column.storage_strategy() == StorageStrategy::None || vid as usize >= self.vertex_num(label) {
            return Ok(None);
        }
        Ok(table.get(vid as usize, col))
    }

    /// Every property of the vertex, in column order.
    pub fn vertex_row(&self, label: LabelId, vid: Vid) -> Option<Vec<Any<'_>>> {
        if vid as usize >= self.vertex_num(label) {
            return None;
        }
        Some(self.vertex_data.get(label as usize)?.get_row(vid as usize))
    }

    /// Insert or overwrite one vertex after bulk load. Grows every adjacency
    /// structure keyed by `label`.
    pub fn add_vertex(&mut self, label: LabelId, oid: Oid, values: &[Any<'_>]) -> Result<Vid> {
        let capacity = self.get_vertex_table(label)?.row_capacity();
        let indexer = self.lf_indexers.get_mut(label as usize).ok_or(GraphError::LabelOutOfRange(label))?;
        if indexer.get_index(oid).is_none() && indexer.size() >= capacity {
            return Err(GraphError::CapacityExceeded { what: "vertex label", capacity });
        }
        let vid = indexer.insert(oid)?;
        let vnum = indexer.size();
        self.vertex_data[label as usize].insert(vid as usize, values)?;

        let triplets: Vec<EdgeTriplet> = self.schema.edge_triplets().map(|(t, _)| t).collect();
        for (src, dst, edge) in triplets {
            let idx = self.edge_index(src, dst, edge);
            if src == label {
                if let Some(csr) = self.oe[idx].as_mut() {
                    csr.resize(vnum);
                }
            }
            if dst == label {
                if let Some(csr) = self.ie[idx].as_mut() {
                    csr.resize(vnum);
                }
            }
        }
        Ok(vid)
    }

    // ── edges ────────────────────────────────────────────────────────────────

    /// Online single-edge insert. Both directions are validated and any
    /// single-edge slot on either side is claimed before either is written,
    /// so a rejected edge leaves no trace even under concurrent ingest.
    #[allow(clippy::too_many_arguments)]
    pub fn ingest_edge(
        &self,
        src_label: LabelId,
        src: Vid,
        dst_label: LabelId,
        dst: Vid,
        edge_label: LabelId,
        ts: Timestamp,
        data: &Any<'_>,
    ) -> Result<()> {
        let ie = self.csr(Direction::Incoming, src_label, dst_label, edge_label)?;
        let oe = self.csr(Direction::Outgoing, src_label, dst_label, edge_label)?;
        ie.peek_edge(dst, data)?;
        oe.peek_edge(src, data)?;
        ie.reserve_edge(dst)?;
        if let Err(e) = oe.reserve_edge(src) {
            ie.cancel_edge(dst);
            return Err(e);
        }
        if let Err(e) = ie.put_reserved_edge(dst, src, data, ts) {
            ie.cancel_edge(dst);
            oe.cancel_edge(src);
            return Err(e);
        }
        oe.put_reserved_edge(src, dst, data, ts)
    }

    pub fn get_outgoing_edges(&self, label: LabelId, v: Vid, nbr_label: LabelId, edge: LabelId) -> Result<AdjSlice<'_>> {
        Ok(self.csr(Direction::Outgoing, label, nbr_label, edge)?.get_edges(v))
    }

    pub fn get_incoming_edges(&self, label: LabelId, v: Vid, nbr_label: LabelId, edge: LabelId) -> Result<AdjSlice<'_>> {
        Ok(self.csr(Direction::Incoming, nbr_label, label, edge)?.get_edges(v))
    }

    pub fn get_outgoing_edges_mut(
        &mut self,
        label: LabelId,
        v: Vid,
        nbr_label: LabelId,
        edge: LabelId,
    ) -> Result<AdjSliceMut<'_>> {
        Ok(self.csr_mut(Direction::Outgoing, label, nbr_label, edge)?.get_edges_mut(v))
    }

    pub fn get_incoming_edges_mut(
        &mut self,
        label: LabelId,
        v: Vid,
        nbr_label: LabelId,
        edge: LabelId,
    ) -> Result<AdjSliceMut<'_>> {
        Ok(self.csr_mut(Direction::Incoming, nbr_label, label, edge)?.get_edges_mut(v))
    }

    /// Cursor over the edges of `v` visible at `read_ts`. `label` is the
    /// label of `v`, `nbr_label` the label on the other end.
    pub fn edge_cursor(
        &self,
        dir: Direction,
        label: LabelId,
        v: Vid,
        nbr_label: LabelId,
        edge: LabelId,
        read_ts: Timestamp,
    ) -> Result<EdgeCursor<'_>> {
        let csr = match dir {
            Direction::Outgoing => self.csr(dir, label, nbr_label, edge)?,
            Direction::Incoming => self.csr(dir, nbr_label, label, edge)?,
        };
        Ok(csr.edge_cursor(v, read_ts))
    }

    pub fn edge_cursor_mut(
        &mut self,
        dir: Direction,
        label: LabelId,
        v: Vid,
        nbr_label: LabelId,
        edge: LabelId,
    ) -> Result<EdgeCursorMut<'_>> {
        let csr = match dir {
            Direction::Outgoing => self.csr_mut(dir, label, nbr_label, edge)?,
            Direction::Incoming => self.csr_mut(dir, nbr_label, label, edge)?,
        };
        Ok(csr.edge_cursor_mut(v))
    }

    /// Stored edges of a triplet, counted in the outgoing direction unless
    /// that direction keeps none.
    pub fn edge_num(&self, src: LabelId, dst: LabelId, edge: LabelId) -> Result<usize> {
        let oe = self.csr(Direction::Outgoing, src, dst, edge)?;
        let ie = self.csr(Direction::Incoming, src, dst, edge)?;
        Ok(oe.edge_num().max(ie.edge_num()))
    }

    pub fn total_edge_num(&self) -> usize {
        self.schema
            .edge_triplets()
            .map(|((s, d, e), _)| self.edge_num(s, d, e).unwrap_or(0))
            .sum()
    }

    /// Largest timestamp stored on any edge.
    pub fn max_timestamp(&self) -> Timestamp {
        self.oe
            .iter()
            .chain(self.ie.iter())
            .flatten()
            .flat_map(|csr| {
                (0..csr.vertex_capacity() as Vid).map(move |v| {
                    let edges = csr.get_edges(v);
                    (0..edges.len()).map(|i| edges.timestamp(i)).max().unwrap_or(0)
                })
            })
            .max()
            .unwrap_or(0)
    }

    // ── persistence ──────────────────────────────────────────────────────────

    fn csr_prefix(&self, dir: &Path, kind: &str, (src, dst, edge): EdgeTriplet) -> Result<PathBuf> {
        Ok(dir.join(CSR_DIR).join(format!(
            "{}_{}_{}_{}",
            kind,
            self.schema.get_vertex_label_name(src)?,
            self.schema.get_vertex_label_name(dst)?,
            self.schema.get_edge_label_name(edge)?
        )))
    }

    pub fn serialize(&self, dir: &Path) -> Result<()> {
        let start = Instant::now();
        for sub in [INDEXER_DIR, TABLE_DIR, CSR_DIR] {
            fs::create_dir_all(dir.join(sub))?;
        }
        self.schema.serialize(&dir.join(SCHEMA_FILE))?;
        for label in 0..self.vertex_label_num {
            let name = self.schema.get_vertex_label_name(label as LabelId)?;
            self.lf_indexers[label].serialize(&dir.join(INDEXER_DIR).join(format!("vertex_map_{}.lfi", name)))?;
            self.vertex_data[label].serialize(
                &dir.join(TABLE_DIR).join(format!("vertex_table_{}", name)),
                self.lf_indexers[label].size(),
            )?;
        }
        for (triplet, _) in self.schema.edge_triplets() {
            let idx = self.edge_index(triplet.0, triplet.1, triplet.2);
            if let Some(csr) = &self.oe[idx] {
                csr.serialize(&self.csr_prefix(dir, "oe", triplet)?)?;
            }
            if let Some(csr) = &self.ie[idx] {
                csr.serialize(&self.csr_prefix(dir, "ie", triplet)?)?;
            }
        }
        info!(
            dir = %dir.display(),
            vertices = self.total_vertex_num(),
            edges = self.total_edge_num(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "fragment serialized"
        );
        Ok(())
    }

    pub fn deserialize(dir: &Path) -> Result<Self> {
        let start = Instant::now();
        let schema = Schema::deserialize(&dir.join(SCHEMA_FILE))?;
        let mut lf_indexers = Vec::with_capacity(schema.vertex_label_num());
        let mut vertex_data = Vec::with_capacity(schema.vertex_label_num());
        for label in 0..schema.vertex_label_num() {
            let name = schema.get_vertex_label_name(label as LabelId)?;
            let indexer = LfIndexer::deserialize(&dir.join(INDEXER_DIR).join(format!("vertex_map_{}.lfi", name)))?;
            let table = Table::deserialize(&dir.join(TABLE_DIR).join(format!("vertex_table_{}", name)))?;
            debug!(label = name, vertices = indexer.size(), "vertex label mapped");
            lf_indexers.push(indexer);
            vertex_data.push(table);
        }

        let mut fragment = PropertyFragment::with_schema(schema, lf_indexers, vertex_data);
        let triplets: Vec<(EdgeTriplet, PropertyType, _, _)> = fragment
            .schema
            .edge_triplets()
            .map(|(t, es)| (t, es.data_type(), es.oe_strategy, es.ie_strategy))
            .collect();
        for (triplet, data_type, oe_strategy, ie_strategy) in triplets {
            let (src, dst, edge) = triplet;
            let idx = fragment.edge_index(src, dst, edge);
            let oe_prefix = fragment.csr_prefix(dir, "oe", triplet)?;
            let ie_prefix = fragment.csr_prefix(dir, "ie", triplet)?;
            let mut oe = TypedCsr::deserialize(data_type, oe_strategy, &oe_prefix, fragment.vertex_num(src))?;
            let mut ie = TypedCsr::deserialize(data_type, ie_strategy, &ie_prefix, fragment.vertex_num(dst))?;
            oe.resize(fragment.vertex_num(src));
            ie.resize(fragment.vertex_num(dst));
            fragment.oe[idx] = Some(oe);
            fragment.ie[idx] = Some(ie);
        }
        info!(
            dir = %dir.display(),
            vertices = fragment.total_vertex_num(),
            edges = fragment.total_edge_num(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "fragment deserialized"
        );
        Ok(fragment)
    }
}
