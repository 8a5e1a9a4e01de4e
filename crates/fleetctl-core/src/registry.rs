//! C4 — Instance Registry: a scoped-acquisition store backed by a JSON
//! document on disk, synced against the live marketplace set.
//!
//! Shape grounded on `original_source/llm_deploy/storage_manager.py`;
//! Rust persistence idiom grounded on `mofa-cli::store::PersistedStore`.
//! Unlike the teacher's `store.rs`, writes here are atomic
//! (write-to-temp, rename) per spec §4.4 / §8 invariant 5 — the teacher's
//! own `fs::write` is not, and the original Python's `json.dump` isn't
//! either; both are deviated from deliberately.

use crate::error::FleetResult;
use crate::types::RegistryRecord;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

pub struct InstanceRegistry {
    path: PathBuf,
    records: BTreeMap<String, RegistryRecord>,
}

impl InstanceRegistry {
    /// Loads from `path`; an absent file is an empty mapping.
    pub fn load(path: impl Into<PathBuf>) -> FleetResult<Self> {
        let path = path.into();
        let records = if path.is_file() {
            let text = std::fs::read_to_string(&path)?;
            if text.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&text)?
            }
        } else {
            BTreeMap::new()
        };
        Ok(InstanceRegistry { path, records })
    }

    pub fn get(&self, id: u64) -> Option<&RegistryRecord> {
        self.records.get(&id.to_string())
    }

    /// Upserts a record and persists.
    pub fn put(&mut self, id: u64, record: RegistryRecord) -> FleetResult<()> {
        self.records.insert(id.to_string(), record);
        self.persist()
    }

    /// Reconciles keys against the live set: deletes keys absent from
    /// `live_ids`, inserts missing ones with an empty endpoint. Persists
    /// unconditionally so the on-disk state always reflects the last sync
    /// even when nothing changed.
    pub fn sync(&mut self, live_ids: &HashSet<u64>) -> FleetResult<()> {
        let live_keys: HashSet<String> = live_ids.iter().map(u64::to_string).collect();
        self.records.retain(|k, _| live_keys.contains(k));
        for key in &live_keys {
            self.records.entry(key.clone()).or_default();
        }
        self.persist()
    }

    pub fn keys(&self) -> HashSet<u64> {
        self.records.keys().filter_map(|k| k.parse().ok()).collect()
    }

    fn persist(&self) -> FleetResult<()> {
        let json = serde_json::to_vec_pretty(&self.records)?;
        write_atomic(&self.path, &json)
    }
}

/// Writes `contents` to `path` via a sibling temp file followed by an
/// atomic rename, so a reader's `load()` never observes a partial file.
fn write_atomic(path: &Path, contents: &[u8]) -> FleetResult<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let tmp_name = format!(
        ".{}.tmp-{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("state"),
        std::process::id()
    );
    let tmp_path = dir.join(tmp_name);
    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let reg = InstanceRegistry::load(dir.path().join("state.json")).unwrap();
        assert!(reg.get(1).is_none());
        assert!(reg.keys().is_empty());
    }

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut reg = InstanceRegistry::load(&path).unwrap();
        reg.put(
            42,
            RegistryRecord {
                endpoint: "http://1.2.3.4:33333".to_string(),
            },
        )
        .unwrap();
        assert_eq!(reg.get(42).unwrap().endpoint, "http://1.2.3.4:33333");

        let reloaded = InstanceRegistry::load(&path).unwrap();
        assert_eq!(reloaded.get(42).unwrap().endpoint, "http://1.2.3.4:33333");
    }

    #[test]
    fn sync_removes_absent_and_adds_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut reg = InstanceRegistry::load(&path).unwrap();
        reg.put(1, RegistryRecord { endpoint: "e1".into() }).unwrap();
        reg.put(2, RegistryRecord { endpoint: "e2".into() }).unwrap();

        let live: HashSet<u64> = [2, 3].into_iter().collect();
        reg.sync(&live).unwrap();

        assert_eq!(reg.keys(), live);
        assert_eq!(reg.get(2).unwrap().endpoint, "e2");
        assert_eq!(reg.get(3).unwrap().endpoint, "");
        assert!(reg.get(1).is_none());
    }

    #[test]
    fn destroying_already_absent_id_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut reg = InstanceRegistry::load(&path).unwrap();
        let live: HashSet<u64> = HashSet::new();
        reg.sync(&live).unwrap();
        assert!(reg.keys().is_empty());
        reg.sync(&live).unwrap();
        assert!(reg.keys().is_empty());
    }

    #[test]
    fn endpoint_is_immutable_once_set_until_sync_removes_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut reg = InstanceRegistry::load(&path).unwrap();
        reg.put(7, RegistryRecord { endpoint: "e7".into() }).unwrap();
        assert_eq!(reg.get(7).unwrap().endpoint, "e7");
        assert_eq!(reg.get(7).unwrap().endpoint, "e7");

        let live: HashSet<u64> = HashSet::new();
        reg.sync(&live).unwrap();
        assert!(reg.get(7).is_none());
    }

    #[test]
    fn no_partial_file_survives_a_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut reg = InstanceRegistry::load(&path).unwrap();
        for i in 0..20 {
            reg.put(i, RegistryRecord { endpoint: format!("e{i}") }).unwrap();
        }
        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: BTreeMap<String, RegistryRecord> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.len(), 20);
    }
}
