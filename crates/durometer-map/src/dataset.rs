use crate::registry::{parse_point_id, point_id};
use durometer_vickers::{normalize_path, HardnessRowUpdater};
use nalgebra::Point2;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Extensions probed by [`HardnessDataset::load_default_images`], in order.
pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "png", "jpeg", "JPG", "PNG", "JPEG"];

/// Where the micrograph for point `n` is expected:
/// `<project_dir>/<images_dir>/{n} 400x.<ext>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImagePathTemplate {
    pub project_dir: PathBuf,
    pub images_dir: PathBuf,
}

impl ImagePathTemplate {
    pub fn new(project_dir: impl Into<PathBuf>, images_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            images_dir: images_dir.into(),
        }
    }

    pub fn folder(&self) -> PathBuf {
        self.project_dir.join(&self.images_dir)
    }

    pub fn stem(number: usize) -> String {
        format!("{number} 400x")
    }

    /// Path assigned to new rows before any image is chosen.
    pub fn default_path(&self, number: usize) -> PathBuf {
        self.folder().join(format!("{}.jpg", Self::stem(number)))
    }

    pub fn candidates(&self, number: usize) -> impl Iterator<Item = PathBuf> + '_ {
        let folder = self.folder();
        IMAGE_EXTENSIONS
            .iter()
            .map(move |ext| folder.join(format!("{}.{ext}", Self::stem(number))))
    }
}

fn path_or_empty<'de, D: Deserializer<'de>>(d: D) -> Result<PathBuf, D::Error> {
    Ok(Option::<PathBuf>::deserialize(d)?.unwrap_or_default())
}

/// One row of the hardness table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HardnessDataRow {
    pub id: String,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub hv: Option<f64>,
    #[serde(default)]
    pub std_dev: Option<f64>,
    #[serde(default, deserialize_with = "path_or_empty")]
    pub image_path: PathBuf,
}

impl HardnessDataRow {
    pub fn position(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }

    /// `hv` when it is usable for mapping (strictly positive).
    pub fn valid_hv(&self) -> Option<f64> {
        self.hv.filter(|&v| v > 0.0 && v.is_finite())
    }
}

/// Table of per-point hardness results keyed by point id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HardnessDataset {
    #[serde(rename = "data")]
    rows: Vec<HardnessDataRow>,
}

impl HardnessDataset {
    pub fn from_rows(rows: Vec<HardnessDataRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[HardnessDataRow] {
        &self.rows
    }

    pub fn row(&self, id: &str) -> Option<&HardnessDataRow> {
        self.rows.iter().find(|r| r.id == id)
    }

    fn row_mut(&mut self, id: &str) -> Option<&mut HardnessDataRow> {
        self.rows.iter_mut().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    /// Rows with a positive hardness.
    pub fn completed(&self) -> usize {
        self.rows.iter().filter(|r| r.valid_hv().is_some()).count()
    }

    /// Rebuild the table from the registry positions, one row per point.
    ///
    /// Coordinates always come from `source`; `hv`, `std_dev` and
    /// `image_path` carry over for ids that already existed.
    pub fn sync_from_source(&mut self, source: &[Point2<f64>], template: &ImagePathTemplate) {
        let mut existing: HashMap<String, HardnessDataRow> =
            self.rows.drain(..).map(|r| (r.id.clone(), r)).collect();
        self.rows = source
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let n = i + 1;
                let id = point_id(n);
                match existing.remove(&id) {
                    Some(old) => HardnessDataRow {
                        x: p.x,
                        y: p.y,
                        ..old
                    },
                    None => HardnessDataRow {
                        id,
                        x: p.x,
                        y: p.y,
                        hv: None,
                        std_dev: None,
                        image_path: template.default_path(n),
                    },
                }
            })
            .collect();
        if !existing.is_empty() {
            log::debug!("dropped {} rows no longer marked", existing.len());
        }
        log::info!("table synchronized with {} points", self.rows.len());
    }

    /// Append a default row for the point at 0-based `index`.
    ///
    /// An existing row with the same id only takes the new coordinates, so
    /// ids stay unique.
    pub fn add_point(
        &mut self,
        index: usize,
        position: Point2<f64>,
        template: &ImagePathTemplate,
    ) -> &HardnessDataRow {
        let n = index + 1;
        let id = point_id(n);
        let at = match self.rows.iter().position(|r| r.id == id) {
            Some(at) => {
                log::debug!("{id} already in the table, moving it");
                let row = &mut self.rows[at];
                row.x = position.x;
                row.y = position.y;
                at
            }
            None => {
                self.rows.push(HardnessDataRow {
                    id,
                    x: position.x,
                    y: position.y,
                    hv: None,
                    std_dev: None,
                    image_path: template.default_path(n),
                });
                self.rows.len() - 1
            }
        };
        &self.rows[at]
    }

    /// Drop the row at `index` and renumber the rest to `P1..Pn`. Values stay
    /// with their point.
    pub fn remove(&mut self, index: usize) -> Option<HardnessDataRow> {
        if index >= self.rows.len() {
            return None;
        }
        let removed = self.rows.remove(index);
        for (i, row) in self.rows.iter_mut().enumerate() {
            row.id = point_id(i + 1);
        }
        Some(removed)
    }

    pub fn set_image_path(&mut self, id: &str, path: impl Into<PathBuf>) -> bool {
        let Some(row) = self.row_mut(id) else {
            return false;
        };
        row.image_path = path.into();
        log::info!("{id}: image {}", row.image_path.display());
        true
    }

    /// Manual hardness entry. The deviation belongs to a measured value, so
    /// it is dropped either way.
    pub fn set_hv(&mut self, id: &str, hv: Option<f64>) -> bool {
        let Some(row) = self.row_mut(id) else {
            return false;
        };
        row.hv = hv;
        row.std_dev = None;
        true
    }

    /// For each row, pick the first existing `{n} 400x.<ext>` in the images
    /// folder. Returns how many rows were assigned.
    pub fn load_default_images(&mut self, template: &ImagePathTemplate) -> usize {
        let mut found = 0;
        for row in &mut self.rows {
            let Some(n) = parse_point_id(&row.id) else {
                log::warn!("cannot derive an image name from id {}", row.id);
                continue;
            };
            match template.candidates(n).find(|p| p.is_file()) {
                Some(path) => {
                    log::debug!("{}: {}", row.id, path.display());
                    row.image_path = path;
                    found += 1;
                }
                None => log::warn!(
                    "{}: no '{}' image in {}",
                    row.id,
                    ImagePathTemplate::stem(n),
                    template.folder().display()
                ),
            }
        }
        log::info!("default images found for {found}/{} points", self.rows.len());
        found
    }

    /// Make image paths relative to `base` where possible.
    pub fn relativize_paths(&mut self, base: &Path) {
        for row in &mut self.rows {
            if let Ok(rel) = row.image_path.strip_prefix(base) {
                row.image_path = rel.to_path_buf();
            }
        }
    }

    /// Join relative image paths onto `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for row in &mut self.rows {
            if !row.image_path.as_os_str().is_empty() && row.image_path.is_relative() {
                row.image_path = base.join(&row.image_path);
            }
        }
    }
}

impl HardnessRowUpdater for HardnessDataset {
    fn update_by_image_path(&mut self, image_path: &Path, hv: f64, std_dev: f64) -> Option<String> {
        let wanted = normalize_path(image_path);
        let row = self
            .rows
            .iter_mut()
            .find(|r| normalize_path(&r.image_path) == wanted)?;
        row.hv = Some(hv);
        row.std_dev = Some(std_dev);
        Some(row.id.clone())
    }
}
