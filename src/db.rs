use crate::config::{GraphConfig, VisibilityMode};
use crate::error::{GraphError, Result};
use crate::fragment::{FragmentBuilder, PropertyFragment};
use crate::schema::{EdgeTriplet, Schema};
use crate::transaction::{InsertTransaction, ReadTransaction, UpdateTransaction};
use crate::types::{LabelId, Timestamp};
use crate::version::VersionManager;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

pub const MANIFEST_FILE: &str = "manifest.json";
const FORMAT_VERSION: u32 = 1;

/// Summary written next to a serialized fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub vertex_label_num: usize,
    pub edge_label_num: usize,
    pub vertex_num: usize,
    pub edge_num: usize,
    /// Newest timestamp visible when the checkpoint was taken.
    pub timestamp: Timestamp,
}

impl Manifest {
    pub fn read(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let manifest: Manifest = serde_json::from_reader(BufReader::new(File::open(&path)?))?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(GraphError::corrupt(
                &path,
                format!("format version {} (expected {})", manifest.format_version, FORMAT_VERSION),
            ));
        }
        Ok(manifest)
    }

    fn write(&self, dir: &Path) -> Result<()> {
        let mut w = BufWriter::new(File::create(dir.join(MANIFEST_FILE))?);
        serde_json::to_writer_pretty(&mut w, self)?;
        w.flush()?;
        Ok(())
    }
}

/// One graph fragment together with the version manager that orders
/// access to it.
pub struct GraphDb {
    fragment: PropertyFragment,
    version: VersionManager,
    config: GraphConfig,
}

impl GraphDb {
    /// Empty graph over `schema`.
    pub fn new(schema: Schema, config: GraphConfig) -> Result<Self> {
        Ok(Self::from_fragment(PropertyFragment::init_empty(schema)?, config))
    }

    /// Bulk load record files with `config.thread_num` workers.
    pub fn bulk_load(
        schema: Schema,
        vertex_files: &[(LabelId, PathBuf)],
        edge_files: &[(EdgeTriplet, PathBuf)],
        config: GraphConfig,
    ) -> Result<Self> {
        let fragment = PropertyFragment::init(schema, vertex_files, edge_files, config.thread_num)?;
        Ok(Self::from_fragment(fragment, config))
    }

    pub fn from_builder(builder: FragmentBuilder, config: GraphConfig) -> Result<Self> {
        let fragment = builder.build(config.thread_num)?;
        Ok(Self::from_fragment(fragment, config))
    }

    /// Every stored edge is visible; the first writer gets a newer timestamp.
    pub fn from_fragment(fragment: PropertyFragment, config: GraphConfig) -> Self {
        Self::with_timestamp(fragment, config, 0)
    }

    fn with_timestamp(fragment: PropertyFragment, config: GraphConfig, ts: Timestamp) -> Self {
        let version = VersionManager::new(&config);
        version.init_ts(ts.max(fragment.max_timestamp()));
        if config.visibility == VisibilityMode::Background {
            version.start();
        }
        Self { fragment, version, config }
    }

    /// Reopen a directory written by [`GraphDb::checkpoint`].
    pub fn open(dir: &Path, config: GraphConfig) -> Result<Self> {
        let manifest = Manifest::read(dir)?;
        let fragment = PropertyFragment::deserialize(dir)?;
        if fragment.total_vertex_num() != manifest.vertex_num {
            return Err(GraphError::corrupt(
                &dir.join(MANIFEST_FILE),
                format!("manifest lists {} vertices, fragment holds {}", manifest.vertex_num, fragment.total_vertex_num()),
            ));
        }
        info!(dir = %dir.display(), timestamp = manifest.timestamp, "graph opened");
        Ok(Self::with_timestamp(fragment, config, manifest.timestamp))
    }

    /// Serialize the fragment and manifest into `dir` under the exclusive
    /// update timestamp. Blocks until open transactions finish, so the
    /// caller must not hold one on this thread.
    pub fn checkpoint(&self, dir: &Path) -> Result<Manifest> {
        let ts = self.version.acquire_update_timestamp();
        let result = self.write_checkpoint(dir, ts);
        self.version.release_update_timestamp(ts);
        result
    }

    fn write_checkpoint(&self, dir: &Path, ts: Timestamp) -> Result<Manifest> {
        fs::create_dir_all(dir)?;
        self.fragment.serialize(dir)?;
        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            vertex_label_num: self.fragment.schema().vertex_label_num(),
            edge_label_num: self.fragment.schema().edge_label_num(),
            vertex_num: self.fragment.total_vertex_num(),
            edge_num: self.fragment.total_edge_num(),
            timestamp: ts,
        };
        manifest.write(dir)?;
        info!(dir = %dir.display(), timestamp = ts, "checkpoint written");
        Ok(manifest)
    }

    pub fn read_transaction(&self) -> ReadTransaction<'_> {
        ReadTransaction::new(&self.fragment, &self.version)
    }

    pub fn insert_transaction(&self) -> InsertTransaction<'_> {
        InsertTransaction::new(&self.fragment, &self.version)
    }

    pub fn update_transaction(&mut self) -> UpdateTransaction<'_> {
        UpdateTransaction::new(&mut self.fragment, &self.version)
    }

    pub fn graph(&self) -> &PropertyFragment {
        &self.fragment
    }

    /// Direct mutable access, bypassing timestamps.
    pub fn graph_mut(&mut self) -> &mut PropertyFragment {
        &mut self.fragment
    }

    pub fn version_manager(&self) -> &VersionManager {
        &self.version
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::Any;
    use crate::types::{EdgeStrategy, PropertyType};
    use tempfile::tempdir;

    fn schema() -> Schema {
        let mut schema = Schema::new();
        schema.add_vertex_label("user", &[("age", PropertyType::Int32)], &[], 32).unwrap();
        schema
            .add_edge_label("user", "user", "follows", &[], EdgeStrategy::Multiple, EdgeStrategy::None)
            .unwrap();
        schema
    }

    #[test]
    fn test_checkpoint_and_open() {
        let dir = tempdir().unwrap();
        let config = GraphConfig::new(VisibilityMode::WaitVisible);
        let mut db = GraphDb::new(schema(), config.clone()).unwrap();
        for oid in 1..=3 {
            db.graph_mut().add_vertex(0, oid, &[Any::Int32(20 + oid as i32)]).unwrap();
        }
        let mut ins = db.insert_transaction();
        ins.add_edge(0, 1, 0, 2, 0, Any::Empty).unwrap();
        ins.add_edge(0, 1, 0, 3, 0, Any::Empty).unwrap();
        ins.commit().unwrap();

        let manifest = db.checkpoint(dir.path()).unwrap();
        assert_eq!(manifest.vertex_num, 3);
        assert_eq!(manifest.edge_num, 2);
        assert_eq!(manifest, Manifest::read(dir.path()).unwrap());

        let reopened = GraphDb::open(dir.path(), config).unwrap();
        assert_eq!(reopened.version_manager().read_timestamp(), manifest.timestamp);
        assert!(reopened.version_manager().next_write_timestamp() > manifest.timestamp);
        let txn = reopened.read_transaction();
        assert_eq!(txn.get_outgoing_edges(0, 0, 0, 0).unwrap().collect_edges().len(), 2);
        assert_eq!(txn.get_incoming_edges(0, 1, 0, 0).unwrap().size(), 0);
    }

    #[test]
    fn test_open_rejects_unknown_format() {
        let dir = tempdir().unwrap();
        let db = GraphDb::new(schema(), GraphConfig::new(VisibilityMode::WaitVisible)).unwrap();
        db.checkpoint(dir.path()).unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        let text = fs::read_to_string(&path).unwrap().replace("\"format_version\": 1", "\"format_version\": 9");
        fs::write(&path, text).unwrap();
        assert!(matches!(
            GraphDb::open(dir.path(), GraphConfig::default()),
            Err(GraphError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_background_mode_starts_worker() {
        let db = GraphDb::new(schema(), GraphConfig::default()).unwrap();
        assert!(db.version_manager().is_running());
        let wait = GraphDb::new(schema(), GraphConfig::new(VisibilityMode::WaitVisible)).unwrap();
        assert!(!wait.version_manager().is_running());
    }
}
