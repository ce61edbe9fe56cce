use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::models::{CachedRecord, Collection};
use crate::store::PendingQueue;

/// Snapshots older than a day are flagged in status output.
/// The data is still served; this only tells the operator it is old.
const SNAPSHOT_STALE_HOURS: i64 = 24;

const QUEUE_FILE: &str = "pending_queue";
const COUNTER_FILE: &str = "local_id_counter";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        let now = Utc::now();
        (now - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }

    pub fn is_stale(&self) -> bool {
        self.age_minutes() > SNAPSHOT_STALE_HOURS * 60
    }
}

pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create snapshot directory: {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Option<CachedData<T>>> {
        let path = self.path(name);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read snapshot file: {}", name))?;

        let cached: CachedData<T> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse snapshot file: {}", name))?;

        Ok(Some(cached))
    }

    /// Write to a temporary file first so a crash never leaves half a snapshot.
    fn save<T: Serialize>(&self, name: &str, data: &T) -> Result<()> {
        let cached = CachedData::new(data);
        let path = self.path(name);
        let tmp = path.with_extension("json.tmp");
        let contents = serde_json::to_string_pretty(&cached)?;
        std::fs::write(&tmp, contents)
            .with_context(|| format!("Failed to write snapshot file: {}", name))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace snapshot file: {}", name))?;
        debug!(snapshot = name, "Snapshot written");
        Ok(())
    }

    // ===== Collections =====

    pub fn load_collection(&self, collection: Collection) -> Result<Option<CachedData<Vec<CachedRecord>>>> {
        self.load(collection.endpoint())
    }

    pub fn save_collection(&self, collection: Collection, records: &[CachedRecord]) -> Result<()> {
        self.save(collection.endpoint(), &records)
    }

    // ===== Pending queue =====

    pub fn load_queue(&self) -> Result<Option<PendingQueue>> {
        Ok(self.load::<PendingQueue>(QUEUE_FILE)?.map(|c| c.data))
    }

    pub fn save_queue(&self, queue: &PendingQueue) -> Result<()> {
        self.save(QUEUE_FILE, queue)
    }

    // ===== Local id counter =====

    pub fn load_counter(&self) -> Result<u64> {
        Ok(self.load::<u64>(COUNTER_FILE)?.map(|c| c.data).unwrap_or(0))
    }

    pub fn save_counter(&self, counter: u64) -> Result<()> {
        self.save(COUNTER_FILE, &counter)
    }

    // ===== Ages =====

    pub fn ages(&self) -> SnapshotAges {
        let mut ages = BTreeMap::new();
        for collection in Collection::ALL {
            match self.load_collection(collection) {
                Ok(Some(cached)) => {
                    ages.insert(collection, (cached.age_display(), cached.is_stale()));
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(collection = %collection, error = %e, "Failed to load snapshot for age display");
                }
            }
        }
        SnapshotAges { ages }
    }
}

#[derive(Debug, Default)]
pub struct SnapshotAges {
    ages: BTreeMap<Collection, (String, bool)>,
}

impl SnapshotAges {
    pub fn age(&self, collection: Collection) -> String {
        match self.ages.get(&collection) {
            Some((age, true)) => format!("{} (stale)", age),
            Some((age, false)) => age.clone(),
            None => "never".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordId;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_age_display() {
        let mut cached = CachedData::new(vec![1]);
        assert_eq!(cached.age_display(), "just now");

        cached.cached_at = Utc::now() - Duration::minutes(5);
        assert_eq!(cached.age_display(), "5m ago");

        cached.cached_at = Utc::now() - Duration::minutes(95);
        assert_eq!(cached.age_display(), "2h ago");

        cached.cached_at = Utc::now() - Duration::hours(50);
        assert_eq!(cached.age_display(), "2d ago");
        assert!(cached.is_stale());
    }

    #[test]
    fn test_collection_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("snapshots")).unwrap();

        assert!(store.load_collection(Collection::Pacientes).unwrap().is_none());

        let records = vec![
            CachedRecord::from_server(json!({ "id": 1, "nombre": "Ana" })).unwrap(),
            CachedRecord::pending(RecordId::Pending(1), json!({ "nombre": "Luz" })),
        ];
        store.save_collection(Collection::Pacientes, &records).unwrap();

        let loaded = store.load_collection(Collection::Pacientes).unwrap().unwrap();
        assert_eq!(loaded.data, records);
        assert!(!dir.path().join("snapshots/pacientes.json.tmp").exists());
    }

    #[test]
    fn test_counter_defaults_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(store.load_counter().unwrap(), 0);
        store.save_counter(41).unwrap();
        assert_eq!(store.load_counter().unwrap(), 41);
    }

    #[test]
    fn test_corrupt_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().to_path_buf()).unwrap();
        std::fs::write(dir.path().join("ventas.json"), "{ not json").unwrap();
        assert!(store.load_collection(Collection::Ventas).is_err());
    }

    #[test]
    fn test_ages() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().to_path_buf()).unwrap();
        store.save_collection(Collection::Boxes, &[]).unwrap();

        let ages = store.ages();
        assert_eq!(ages.age(Collection::Boxes), "just now");
        assert_eq!(ages.age(Collection::Pagos), "never");
    }
}
