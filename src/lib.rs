// propgraph v0.1.0 - Disk-backed property graph storage engine
// Columnar vertex tables, timestamped CSR adjacency, MVCC snapshot reads

pub mod arena;
pub mod column;
pub mod config;
pub mod csr;
pub mod db;
pub mod error;
pub mod fragment;
pub mod id_indexer;
pub mod loader;
pub mod property;
pub mod schema;
pub mod table;
pub mod transaction;
pub mod types;
pub mod version;

// Re-export main types
pub use config::{GraphConfig, VisibilityMode};
pub use csr::{AdjSlice, EdgeCursor, EdgeCursorMut, EdgeRef, Nbr, TypedCsr};
pub use db::{GraphDb, Manifest};
pub use error::{GraphError, Result};
pub use fragment::{FragmentBuilder, PropertyFragment};
pub use property::Any;
pub use schema::{EdgeTriplet, Schema};
pub use transaction::{InsertTransaction, ReadTransaction, UpdateTransaction, VertexIterator};
pub use types::{
    Browser, Date, Direction, EdgeStrategy, Gender, Ipv4, LabelId, Oid, PropertyType, StorageStrategy, Timestamp,
    Vid,
};
pub use version::VersionManager;
