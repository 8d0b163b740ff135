use crate::error::StoreError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use toml::Value;

/// Shared by every backend so switching backends keeps the last volume.
pub const VOLUME_PREF_KEY: &str = "volume";

pub trait PreferenceStore: Send + Sync {
    fn get_f64(&self, key: &str) -> Option<f64>;
    fn set_f64(&self, key: &str, value: f64) -> Result<(), StoreError>;

    fn f64_or(&self, key: &str, default: f64) -> f64 {
        self.get_f64(key).unwrap_or(default)
    }
}

#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    values: Mutex<BTreeMap<String, f64>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get_f64(&self, key: &str) -> Option<f64> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.get(key).copied()
    }

    fn set_f64(&self, key: &str, value: f64) -> Result<(), StoreError> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value);
        Ok(())
    }
}

/// Preferences kept in a flat TOML table, rewritten on every change.
#[derive(Debug)]
pub struct TomlPreferenceStore {
    path: PathBuf,
    table: Mutex<toml::Table>,
}

impl TomlPreferenceStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let table = if path.exists() {
            let data = std::fs::read_to_string(&path).map_err(|e| StoreError::io(&path, e))?;
            toml::from_str::<toml::Table>(&data).map_err(|source| StoreError::Parse {
                path: path.clone(),
                source,
            })?
        } else {
            toml::Table::new()
        };
        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    /// Seeds `key` when the file does not carry it yet; never overwrites.
    pub fn register_default(&self, key: &str, value: f64) {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        table
            .entry(key.to_string())
            .or_insert(Value::Float(value));
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, table: &toml::Table) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let text = toml::to_string_pretty(table)?;
        std::fs::write(&self.path, text).map_err(|e| StoreError::io(&self.path, e))
    }
}

impl PreferenceStore for TomlPreferenceStore {
    fn get_f64(&self, key: &str) -> Option<f64> {
        let table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        match table.get(key)? {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    fn set_f64(&self, key: &str, value: f64) -> Result<(), StoreError> {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        table.insert(key.to_string(), Value::Float(value));
        self.persist(&table)
    }
}

#[cfg(test)]
mod tests {
    use super::{PreferenceStore, TomlPreferenceStore, VOLUME_PREF_KEY};

    #[test]
    fn volume_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.toml");

        let store = TomlPreferenceStore::open(&path).unwrap();
        store.register_default(VOLUME_PREF_KEY, 0.5);
        assert_eq!(store.get_f64(VOLUME_PREF_KEY), Some(0.5));
        store.set_f64(VOLUME_PREF_KEY, 0.25).unwrap();

        let reopened = TomlPreferenceStore::open(&path).unwrap();
        reopened.register_default(VOLUME_PREF_KEY, 0.5);
        assert_eq!(reopened.get_f64(VOLUME_PREF_KEY), Some(0.25));
    }

    #[test]
    fn integer_values_read_as_floats() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.toml");
        std::fs::write(&path, "volume = 1\n").unwrap();

        let store = TomlPreferenceStore::open(&path).unwrap();
        assert_eq!(store.f64_or(VOLUME_PREF_KEY, 0.5), 1.0);
        assert_eq!(store.f64_or("scale", 2.0), 2.0);
    }
}
