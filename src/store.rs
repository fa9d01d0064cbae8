use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

/// The persisted collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Rooms,
    Reservations,
    /// Id high-water marks. Ids must stay burned across restarts even
    /// after every record that carried them is gone.
    Meta,
}

impl Collection {
    pub fn file_name(self) -> &'static str {
        match self {
            Collection::Rooms => "rooms.json",
            Collection::Reservations => "reservations.json",
            Collection::Meta => "meta.json",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Collection::Rooms => write!(f, "rooms"),
            Collection::Reservations => write!(f, "reservations"),
            Collection::Meta => write!(f, "meta"),
        }
    }
}

/// A collection snapshot: decimal id → serialized record.
/// BTreeMap keeps file output deterministic.
pub type Records = BTreeMap<String, Value>;

#[derive(Debug)]
pub enum StoreError {
    Io(io::Error),
    Corrupt {
        collection: Collection,
        detail: String,
    },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "store I/O error: {e}"),
            StoreError::Corrupt { collection, detail } => {
                write!(f, "corrupt {collection} snapshot: {detail}")
            }
        }
    }
}

impl std::error::Error for StoreError {}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        StoreError::Io(e)
    }
}

/// Snapshot persistence with a save-or-fail contract: `save` either makes
/// the whole mapping durable or returns an error, in which case the previous
/// snapshot is still the one a later `load` observes.
#[async_trait]
pub trait Store: Send + Sync {
    /// Load a collection. An absent collection is an empty mapping, not an error.
    async fn load(&self, collection: Collection) -> Result<Records, StoreError>;

    /// Replace a collection's durable snapshot with `records`.
    async fn save(&self, collection: Collection, records: &Records) -> Result<(), StoreError>;
}

/// One pretty-printed JSON file per collection under `dir`.
///
/// Saves go through a temp file, fsync, then an atomic rename, so a crash
/// mid-save leaves the previous snapshot intact. An unparsable file is
/// reported as corrupt, never silently treated as empty.
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, collection: Collection) -> PathBuf {
        self.dir.join(collection.file_name())
    }
}

#[async_trait]
impl Store for JsonStore {
    async fn load(&self, collection: Collection) -> Result<Records, StoreError> {
        let path = self.path(collection);
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Records::new()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&text).map_err(|e| StoreError::Corrupt {
            collection,
            detail: e.to_string(),
        })
    }

    async fn save(&self, collection: Collection, records: &Records) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(collection);
        let tmp_path = path.with_extension("json.tmp");

        let payload = serde_json::to_vec_pretty(records)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&payload)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}

/// Volatile store for tests and throwaway runs.
#[derive(Default)]
pub struct MemoryStore {
    collections: DashMap<Collection, Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load(&self, collection: Collection) -> Result<Records, StoreError> {
        Ok(self
            .collections
            .get(&collection)
            .map(|e| e.value().clone())
            .unwrap_or_default())
    }

    async fn save(&self, collection: Collection, records: &Records) -> Result<(), StoreError> {
        self.collections.insert(collection, records.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::block_on;

    fn tmp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("aula_test_store").join(name);
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn sample_records() -> Records {
        let mut records = Records::new();
        records.insert("1".into(), json!({"name": "Room A101", "capacity": 30}));
        records.insert("2".into(), json!({"name": "Room B202", "capacity": 20}));
        records
    }

    #[test]
    fn json_save_then_load_roundtrip() {
        let store = JsonStore::new(tmp_dir("roundtrip"));
        let records = sample_records();

        block_on(store.save(Collection::Rooms, &records)).unwrap();
        let loaded = block_on(store.load(Collection::Rooms)).unwrap();
        assert_eq!(loaded, records);
    }

    #[test]
    fn json_load_missing_file_is_empty() {
        let store = JsonStore::new(tmp_dir("missing"));
        let loaded = block_on(store.load(Collection::Reservations)).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn json_load_corrupt_file_errors() {
        let dir = tmp_dir("corrupt");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("rooms.json"), b"{ not json").unwrap();

        let store = JsonStore::new(dir);
        let result = block_on(store.load(Collection::Rooms));
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn json_save_replaces_previous_snapshot() {
        let dir = tmp_dir("replace");
        let store = JsonStore::new(dir.clone());

        block_on(store.save(Collection::Rooms, &sample_records())).unwrap();
        let mut second = Records::new();
        second.insert("9".into(), json!({"name": "Room Z"}));
        block_on(store.save(Collection::Rooms, &second)).unwrap();

        let loaded = block_on(store.load(Collection::Rooms)).unwrap();
        assert_eq!(loaded, second);
        // The temp file must not outlive the rename.
        assert!(!dir.join("rooms.json.tmp").exists());
    }

    #[test]
    fn json_collections_are_independent_files() {
        let dir = tmp_dir("independent");
        let store = JsonStore::new(dir.clone());

        block_on(store.save(Collection::Rooms, &sample_records())).unwrap();
        let loaded = block_on(store.load(Collection::Reservations)).unwrap();
        assert!(loaded.is_empty());
        assert!(dir.join("rooms.json").exists());
        assert!(!dir.join("reservations.json").exists());
    }

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        let records = sample_records();

        block_on(store.save(Collection::Reservations, &records)).unwrap();
        assert_eq!(
            block_on(store.load(Collection::Reservations)).unwrap(),
            records
        );
        assert!(block_on(store.load(Collection::Rooms)).unwrap().is_empty());
    }
}
