pub mod generator;

use std::{collections::HashMap, fs, io, path::Path};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
pub use generator::{is_token, Generator, YUKI_S0_VERSION};

// ── Tables ─────────────────────────────────────────────────────────────────

/// Both directions of the mapping. They live behind one lock and are only
/// ever updated together, so each is always the exact inverse of the other.
#[derive(Debug, Default)]
struct Tables {
    /// token → URL; the persisted source of truth.
    forward: HashMap<String, String>,
    /// URL → token; rebuilt from `forward` on load, never persisted.
    reverse: HashMap<String, String>,
}

// ── Snapshot layout ────────────────────────────────────────────────────────

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: &'a str,
    generator: &'a Generator,
    table: &'a HashMap<String, String>,
}

#[derive(Deserialize)]
struct SnapshotHeader {
    version: String,
}

#[derive(Deserialize)]
struct Snapshot {
    generator: Generator,
    #[serde(default)]
    table: HashMap<String, String>,
}

// ── Store ──────────────────────────────────────────────────────────────────

/// Thread-safe, disk-backed bidirectional map between URLs and short tokens.
///
/// `query` takes the lock shared. `add_link` takes it exclusively.
/// `dump_to_disk` takes an upgradable read: queries keep flowing while a
/// snapshot is written, but inserts and other dumps wait for it.
#[derive(Debug)]
pub struct Store {
    generator: Generator,
    tables: RwLock<Tables>,
}

impl Store {
    /// Create an empty store with `generator` and persist it to `path` right
    /// away, so a bad path is reported at startup instead of on first insert.
    pub fn create(path: impl AsRef<Path>, generator: Generator) -> Result<Self> {
        generator.validate()?;
        let store = Self {
            generator,
            tables: RwLock::new(Tables::default()),
        };
        store.dump_to_disk(path)?;
        Ok(store)
    }

    /// Load the snapshot at `path`, or create a fresh store there if the
    /// file does not exist.
    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!("No snapshot at {}, creating a new store", path.display());
                return Self::create(path, Generator::random());
            }
            Err(e) => return Err(e.into()),
        };

        // Check the tag before anything else: an incompatible scheme may not
        // even share the generator layout.
        let header: SnapshotHeader = serde_json::from_slice(&data)?;
        if header.version != YUKI_S0_VERSION {
            return Err(StoreError::VersionMismatch(header.version));
        }

        let snapshot: Snapshot = serde_json::from_slice(&data)?;
        let store = Self::from_snapshot(snapshot)?;
        tracing::info!(
            "Loaded {} link(s) from {}",
            store.len(),
            path.display()
        );
        Ok(store)
    }

    fn from_snapshot(snapshot: Snapshot) -> Result<Self> {
        let Snapshot { generator, table } = snapshot;
        generator.validate()?;

        let mut reverse = HashMap::with_capacity(table.len());
        for (token, url) in &table {
            if !is_token(token) {
                return Err(StoreError::CorruptSnapshot(format!(
                    "malformed token '{token}'"
                )));
            }
            if let Some(other) = reverse.insert(url.clone(), token.clone()) {
                return Err(StoreError::CorruptSnapshot(format!(
                    "'{url}' is mapped by both '{other}' and '{token}'"
                )));
            }
        }

        Ok(Self {
            generator,
            tables: RwLock::new(Tables {
                forward: table,
                reverse,
            }),
        })
    }

    /// Write the whole store to `path`, replacing whatever is there.
    ///
    /// The file is rewritten in place; a crash halfway through leaves a
    /// truncated snapshot behind.
    pub fn dump_to_disk(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let tables = self.tables.upgradable_read();
        let data = serde_json::to_vec(&SnapshotRef {
            version: YUKI_S0_VERSION,
            generator: &self.generator,
            table: &tables.forward,
        })?;
        fs::write(path, data)?;
        tracing::debug!(
            "Dumped {} link(s) to {}",
            tables.forward.len(),
            path.display()
        );
        Ok(())
    }

    /// Return the token for `url`, minting one if the URL is new.
    ///
    /// Does not persist; callers follow up with [`Store::dump_to_disk`].
    pub fn add_link(&self, url: &str) -> Result<String> {
        let mut tables = self.tables.write();

        if let Some(token) = tables.reverse.get(url) {
            return Ok(token.clone());
        }

        let token = self.generator.generate(tables.forward.len() as u64)?;
        if tables.forward.contains_key(&token) {
            return Err(StoreError::TokenCollision(token));
        }

        tables.forward.insert(token.clone(), url.to_owned());
        tables.reverse.insert(url.to_owned(), token.clone());
        Ok(token)
    }

    /// Resolve `token` back to its URL.
    pub fn query(&self, token: &str) -> Result<String> {
        self.tables
            .read()
            .forward
            .get(token)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(token.to_owned()))
    }

    pub fn len(&self) -> usize {
        self.tables.read().forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many distinct URLs this store can ever hold.
    pub fn capacity(&self) -> u64 {
        self.generator.max_entries()
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }
}
