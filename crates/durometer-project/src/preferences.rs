//! Key/value user preferences kept in a JSON file.
//!
//! Known keys fall back to their defaults; keys this version does not know
//! about are kept and written back untouched.

use crate::project::ProjectIoError;
use durometer_vickers::{
    DEFAULT_LOAD_GRAMS, DEFAULT_REPETITIONS, DEFAULT_SCALE_UM_PER_PX, MAX_REPETITIONS,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

pub const PREFERENCES_FILE: &str = "preferences.json";

pub const VICKERS_CALIBRATION: &str = "vickers_calibration";
pub const VICKERS_LOAD: &str = "vickers_load";
pub const VICKERS_N_MEASUREMENTS: &str = "vickers_n_measurements";
pub const HEATMAP_CALIBRATION: &str = "heatmap_calibration";
pub const HEATMAP_FIGURE_SCALE: &str = "heatmap_figure_scale";
pub const LAST_PROJECT_FOLDER: &str = "last_project_folder";

fn defaults() -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(VICKERS_CALIBRATION.into(), json!(DEFAULT_SCALE_UM_PER_PX));
    map.insert(VICKERS_LOAD.into(), json!(DEFAULT_LOAD_GRAMS));
    map.insert(VICKERS_N_MEASUREMENTS.into(), json!(DEFAULT_REPETITIONS));
    map.insert(HEATMAP_CALIBRATION.into(), json!(0.001));
    map.insert(HEATMAP_FIGURE_SCALE.into(), json!(1.0));
    map.insert(LAST_PROJECT_FOLDER.into(), Value::Null);
    map
}

#[derive(Clone, Debug)]
pub struct PreferencesStore {
    path: PathBuf,
    values: Map<String, Value>,
}

impl PreferencesStore {
    /// Load the store at `path`.
    ///
    /// A missing file is created with the defaults. An unreadable or corrupt
    /// file yields the defaults with a warning and is left alone until the
    /// next [`Self::set`].
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut values = defaults();
        if !path.exists() {
            log::info!("no preferences at {}, writing defaults", path.display());
            let store = Self { path, values };
            if let Err(e) = store.write() {
                log::warn!("could not write default preferences: {e}");
            }
            return store;
        }
        match read_map(&path) {
            Ok(stored) => values.extend(stored),
            Err(e) => log::warn!(
                "failed to read preferences {}: {e}; using defaults",
                path.display()
            ),
        }
        Self { path, values }
    }

    /// In-memory store that is never written.
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::new(),
            values: defaults(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key).filter(|v| !v.is_null())
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    /// Store `value` under `key` and persist the whole map.
    pub fn set(&mut self, key: &str, value: impl Serialize) -> Result<(), ProjectIoError> {
        self.values.insert(key.to_string(), serde_json::to_value(value)?);
        self.write()
    }

    fn write(&self) -> Result<(), ProjectIoError> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }
        let json = serde_json::to_string_pretty(&self.values)?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    fn positive_or(&self, key: &str, default: f64) -> f64 {
        match self.get_f64(key) {
            Some(v) if v.is_finite() && v > 0.0 => v,
            Some(v) => {
                log::warn!("preference {key} = {v} is not positive, using {default}");
                default
            }
            None => default,
        }
    }

    /// µm per pixel for new micrographs.
    pub fn vickers_calibration(&self) -> f64 {
        self.positive_or(VICKERS_CALIBRATION, DEFAULT_SCALE_UM_PER_PX)
    }

    /// Indenter load in grams.
    pub fn vickers_load(&self) -> f64 {
        self.positive_or(VICKERS_LOAD, DEFAULT_LOAD_GRAMS)
    }

    /// Repetitions per point, clamped to `1..=10`.
    pub fn vickers_n_measurements(&self) -> usize {
        self.get(VICKERS_N_MEASUREMENTS)
            .and_then(Value::as_u64)
            .map(|n| (n as usize).clamp(1, MAX_REPETITIONS))
            .unwrap_or(DEFAULT_REPETITIONS)
    }

    /// mm per pixel for new surface images.
    pub fn heatmap_calibration(&self) -> f64 {
        self.positive_or(HEATMAP_CALIBRATION, 0.001)
    }

    pub fn heatmap_figure_scale(&self) -> f64 {
        self.positive_or(HEATMAP_FIGURE_SCALE, 1.0)
    }

    pub fn last_project_folder(&self) -> Option<PathBuf> {
        self.get(LAST_PROJECT_FOLDER)
            .and_then(Value::as_str)
            .map(PathBuf::from)
    }
}

fn read_map(path: &Path) -> Result<Map<String, Value>, ProjectIoError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(PREFERENCES_FILE);
        let prefs = PreferencesStore::open(&path);
        assert!(path.is_file());
        assert_relative_eq!(prefs.vickers_calibration(), 1.0);
        assert_relative_eq!(prefs.vickers_load(), 500.0);
        assert_eq!(prefs.vickers_n_measurements(), 2);
        assert_relative_eq!(prefs.heatmap_calibration(), 0.001);
        assert_eq!(prefs.last_project_folder(), None);
    }

    #[test]
    fn corrupt_file_falls_back_and_is_not_overwritten() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(PREFERENCES_FILE);
        fs::write(&path, "{ broken").expect("write");
        let prefs = PreferencesStore::open(&path);
        assert_relative_eq!(prefs.vickers_load(), 500.0);
        assert_eq!(fs::read_to_string(&path).expect("read"), "{ broken");
    }

    #[test]
    fn values_persist_and_unknown_keys_survive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(PREFERENCES_FILE);
        fs::write(&path, r#"{"viewport_width": 1280, "vickers_load": 1000.0}"#).expect("write");

        let mut prefs = PreferencesStore::open(&path);
        assert_relative_eq!(prefs.vickers_load(), 1000.0);
        prefs.set(VICKERS_CALIBRATION, 0.25).expect("set");
        prefs.set(LAST_PROJECT_FOLDER, "/data/run1").expect("set");

        let again = PreferencesStore::open(&path);
        assert_relative_eq!(again.vickers_calibration(), 0.25);
        assert_eq!(again.last_project_folder(), Some(PathBuf::from("/data/run1")));
        assert_eq!(again.get("viewport_width"), Some(&json!(1280)));
    }

    #[test]
    fn out_of_range_values_are_coerced() {
        let mut prefs = PreferencesStore::in_memory();
        prefs.set(VICKERS_N_MEASUREMENTS, 40).expect("set");
        assert_eq!(prefs.vickers_n_measurements(), 10);
        prefs.set(VICKERS_N_MEASUREMENTS, 0).expect("set");
        assert_eq!(prefs.vickers_n_measurements(), 1);
        prefs.set(VICKERS_CALIBRATION, -2.0).expect("set");
        assert_relative_eq!(prefs.vickers_calibration(), 1.0);
        prefs.set(HEATMAP_CALIBRATION, "fast").expect("set");
        assert_relative_eq!(prefs.heatmap_calibration(), 0.001);
    }
}
