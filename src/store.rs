use std::{collections::HashMap, fs, path::PathBuf, sync::Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::GeoPoint;
use crate::models::EventRecord;

/// The single on-disk JSON document. Each scrape replaces `matches`
/// wholesale; the geocoding cache lives alongside.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreData {
    pub last_scan: Option<String>,
    pub matches: Vec<EventRecord>,
    pub geo_cache: HashMap<String, GeoPoint>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

pub struct Store {
    path: PathBuf,
    lock: Mutex<()>,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// A missing file reads as an empty store.
    pub fn read(&self) -> Result<StoreData, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        self.read_unlocked()
    }

    pub fn write(&self, data: &StoreData) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        self.write_unlocked(data)
    }

    /// One read-modify-write cycle under the lock; concurrent updates
    /// cannot lose each other's writes.
    pub fn update<T, F>(&self, transform: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut StoreData) -> T,
    {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut data = self.read_unlocked()?;
        let result = transform(&mut data);
        self.write_unlocked(&data)?;
        Ok(result)
    }

    fn read_unlocked(&self) -> Result<StoreData, StoreError> {
        if !self.path.exists() {
            return Ok(StoreData::default());
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_unlocked(&self, data: &StoreData) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(tag: &str) -> Store {
        let path = std::env::temp_dir()
            .join("ipscmatch-scanner-tests")
            .join(format!("{}-{}.json", tag, std::process::id()));
        let _ = fs::remove_file(&path);
        Store::new(path)
    }

    fn sample_record() -> EventRecord {
        EventRecord {
            id: "2024-02-01:Cup A:Berlin".to_string(),
            source: "table".to_string(),
            discipline: "HG".to_string(),
            date_iso: "2024-02-01".to_string(),
            date_label: "1.2.24".to_string(),
            name: "Cup A".to_string(),
            level: "Level 2".to_string(),
            location: "Berlin".to_string(),
            auslastung: "80%".to_string(),
            url: None,
            scraped_at: "2024-01-10T12:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn missing_file_reads_as_empty_store() {
        let store = temp_store("missing");
        let data = store.read().expect("read empty");
        assert!(data.last_scan.is_none());
        assert!(data.matches.is_empty());
        assert!(data.geo_cache.is_empty());
    }

    #[test]
    fn round_trips_the_document() {
        let store = temp_store("roundtrip");
        let mut data = StoreData::default();
        data.last_scan = Some("2024-01-10T12:00:00+00:00".to_string());
        data.matches.push(sample_record());
        data.geo_cache.insert(
            "Berlin".to_string(),
            GeoPoint {
                lat: 52.52,
                lon: 13.405,
                label: "Berlin, Deutschland".to_string(),
            },
        );

        store.write(&data).expect("write");
        let loaded = store.read().expect("read back");
        assert_eq!(loaded.last_scan, data.last_scan);
        assert_eq!(loaded.matches, data.matches);
        assert_eq!(loaded.geo_cache.get("Berlin"), data.geo_cache.get("Berlin"));
    }

    #[test]
    fn update_persists_and_returns_the_closure_value() {
        let store = temp_store("update");
        let count = store
            .update(|data| {
                data.matches.push(sample_record());
                data.matches.len()
            })
            .expect("update");
        assert_eq!(count, 1);
        assert_eq!(store.read().expect("read back").matches.len(), 1);
    }

    #[test]
    fn concurrent_updates_do_not_lose_writes() {
        let store = temp_store("concurrent");
        store.write(&StoreData::default()).expect("seed");

        std::thread::scope(|scope| {
            for i in 0..8 {
                let store = &store;
                scope.spawn(move || {
                    store
                        .update(|data| {
                            data.geo_cache.insert(
                                format!("ort-{i}"),
                                GeoPoint {
                                    lat: i as f64,
                                    lon: 0.0,
                                    label: String::new(),
                                },
                            );
                        })
                        .expect("update");
                });
            }
        });

        let data = store.read().expect("read back");
        assert_eq!(data.geo_cache.len(), 8);
    }

    #[test]
    fn stored_records_use_camel_case_fields() {
        let json = serde_json::to_string(&sample_record()).expect("serialize");
        assert!(json.contains("\"dateIso\""));
        assert!(json.contains("\"dateLabel\""));
        assert!(json.contains("\"scrapedAt\""));
        assert!(json.contains("\"auslastung\""));
    }
}
