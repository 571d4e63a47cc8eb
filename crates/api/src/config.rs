//! The configuration loader's output shape.
//!
//! This crate doesn't read a config *file* — parsing TOML/env/CLI args is
//! an outer-surface concern, left to the host application — but it owns
//! the struct that loader is expected to hand back.
use bmdb_durability::DurabilityOptions;
use std::path::PathBuf;

/// Which [`bmdb_storage::Storage`] backend to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageKind {
    /// Zero-persistence, process-lifetime only.
    #[default]
    Memory,
    /// Human-readable reference JSON file.
    Json,
    /// Production single-file binary format.
    Binary,
}

/// Database-open configuration. Construct with [`Config::memory`],
/// [`Config::json`], or [`Config::binary`], then chain the `with_*`
/// builders for non-default knobs.
#[derive(Debug, Clone)]
pub struct Config {
    /// Which backend to open.
    pub storage_kind: StorageKind,
    /// File path for `Json`/`Binary`; ignored for `Memory`.
    pub path: Option<PathBuf>,
    /// Table query-result LRU cache capacity.
    pub cache_size: usize,
    /// When set, wrap the chosen backend in a WAL with these
    /// group-commit/lock/conflict settings. `None` opens the backend
    /// directly with no write-ahead log.
    pub wal: Option<DurabilityOptions>,
    /// When `false`, every search bypasses the cost-based planner and
    /// field indexes entirely, falling back to a predicate-filtered full
    /// scan. Indexes are still
    /// maintained on every mutation either way — this only controls
    /// whether `search`/`count` consult them.
    pub indexing_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_kind: StorageKind::default(),
            path: None,
            cache_size: 1000,
            wal: None,
            indexing_enabled: true,
        }
    }
}

impl Config {
    /// An in-memory, non-persistent database.
    pub fn memory() -> Self {
        Config::default()
    }

    /// A JSON reference file at `path`.
    pub fn json(path: impl Into<PathBuf>) -> Self {
        Config {
            storage_kind: StorageKind::Json,
            path: Some(path.into()),
            ..Config::default()
        }
    }

    /// A binary file store at `path`.
    pub fn binary(path: impl Into<PathBuf>) -> Self {
        Config {
            storage_kind: StorageKind::Binary,
            path: Some(path.into()),
            ..Config::default()
        }
    }

    /// Wrap the chosen backend in a write-ahead log with `options`.
    pub fn with_wal(mut self, options: DurabilityOptions) -> Self {
        self.wal = Some(options);
        self
    }

    /// Override the query-result cache capacity (default 1000).
    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self
    }

    /// Disable the planner/index path, forcing every search to a full scan.
    pub fn with_indexing_enabled(mut self, enabled: bool) -> Self {
        self.indexing_enabled = enabled;
        self
    }
}
