//! JSON project file.
//!
//! Every section falls back to its defaults when missing so that files from
//! older versions still open. Image paths are written relative to the
//! project directory when they live below it and resolved against it again
//! on load.

use chrono::{DateTime, Local, NaiveDateTime};
use durometer_core::{CalibrationError, CalibrationState, Point2};
use durometer_map::{
    ColorScale, FieldParams, HardnessDataset, InterpolationMethod, RenderOptions,
};
use durometer_vickers::{
    VickersRepetition, DEFAULT_LOAD_GRAMS, DEFAULT_REPETITIONS, DEFAULT_SCALE_UM_PER_PX,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File stem used when the project name sanitizes to nothing.
pub const DEFAULT_PROJECT_NAME: &str = "proyecto";

#[derive(thiserror::Error, Debug)]
pub enum ProjectIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Free-form project header shown on reports.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectInfo {
    #[serde(alias = "nombre")]
    pub name: String,
    #[serde(alias = "descripcion")]
    pub description: String,
    #[serde(alias = "requerimiento")]
    pub requirement: String,
    #[serde(alias = "tecnico")]
    pub technician: String,
    /// `YYYY-MM-DD`
    #[serde(alias = "fecha")]
    pub date: String,
}

impl Default for ProjectInfo {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            requirement: String::new(),
            technician: String::new(),
            date: Local::now().format("%Y-%m-%d").to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VickersSection {
    /// µm per pixel of the micrographs.
    pub calibration: f64,
    /// Indenter load in grams.
    pub load: f64,
    pub measurements: Vec<VickersRepetition>,
    pub n_measurements: usize,
}

impl Default for VickersSection {
    fn default() -> Self {
        Self {
            calibration: DEFAULT_SCALE_UM_PER_PX,
            load: DEFAULT_LOAD_GRAMS,
            measurements: Vec::new(),
            n_measurements: DEFAULT_REPETITIONS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatmapSection {
    /// mm per pixel of the surface image.
    pub calibration: f64,
    pub points: Vec<[f64; 2]>,
    pub origin_offset: [f64; 2],
    #[serde(alias = "current_image_path")]
    pub image_path: Option<PathBuf>,
}

impl Default for HeatmapSection {
    fn default() -> Self {
        Self {
            calibration: 0.001,
            points: Vec::new(),
            origin_offset: [0.0, 0.0],
            image_path: None,
        }
    }
}

impl HeatmapSection {
    pub fn positions(&self) -> Vec<Point2<f64>> {
        self.points.iter().map(|&[x, y]| Point2::new(x, y)).collect()
    }

    pub fn set_positions(&mut self, positions: &[Point2<f64>]) {
        self.points = positions.iter().map(|p| [p.x, p.y]).collect();
    }

    /// Surface calibration without the image size, which comes from the
    /// image itself once it is loaded again.
    pub fn calibration_state(&self) -> Result<CalibrationState, CalibrationError> {
        CalibrationState::with_origin(self.calibration, self.origin_offset)
    }

    pub fn store_calibration(&mut self, state: &CalibrationState) {
        self.calibration = state.scale();
        let o = state.origin_offset();
        self.origin_offset = [o.x, o.y];
    }
}

/// Heat map plot settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HmPlotSection {
    pub colorscale: ColorScale,
    pub interpolation: InterpolationMethod,
    pub show_points: bool,
    pub show_lines: bool,
    pub grid_resolution: usize,
    pub contour_levels: usize,
    pub figure_scale: f64,
}

impl Default for HmPlotSection {
    fn default() -> Self {
        let field = FieldParams::default();
        let render = RenderOptions::default();
        Self {
            colorscale: render.colorscale,
            interpolation: field.method,
            show_points: false,
            show_lines: render.show_lines,
            grid_resolution: field.grid_resolution,
            contour_levels: render.contour_levels,
            figure_scale: render.figure_scale,
        }
    }
}

impl HmPlotSection {
    pub fn field_params(&self) -> FieldParams {
        FieldParams {
            grid_resolution: self.grid_resolution,
            method: self.interpolation,
            ..FieldParams::default()
        }
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            colorscale: self.colorscale,
            contour_levels: self.contour_levels,
            show_lines: self.show_lines,
            show_points: self.show_points,
            figure_scale: self.figure_scale,
            ..RenderOptions::default()
        }
    }
}

/// Everything saved for one specimen.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    pub info: ProjectInfo,
    pub vickers: VickersSection,
    pub heatmap: HeatmapSection,
    pub table: HardnessDataset,
    pub hmplot: HmPlotSection,
    pub saved_at: Option<String>,
}

impl Project {
    /// Read a project and resolve its image paths against the file's
    /// directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProjectIoError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let mut project: Project = serde_json::from_str(&raw)?;
        let dir = project_dir(path);
        if let Some(image) = project.heatmap.image_path.take() {
            let resolved = if image.is_relative() {
                dir.join(image)
            } else {
                image
            };
            if !resolved.is_file() {
                log::warn!("surface image not found: {}", resolved.display());
            }
            project.heatmap.image_path = Some(resolved);
        }
        project.table.resolve_paths(&dir);
        log::info!(
            "project loaded from {}: {} points, {} table rows, {} repetitions",
            path.display(),
            project.heatmap.points.len(),
            project.table.len(),
            project.vickers.measurements.len()
        );
        Ok(project)
    }

    /// Write the project as pretty JSON, adding a `.json` extension when
    /// missing. Returns the path actually written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<PathBuf, ProjectIoError> {
        let path = with_json_extension(path.as_ref());
        let dir = project_dir(&path);

        let mut out = self.clone();
        if let Some(image) = out.heatmap.image_path.take() {
            out.heatmap.image_path = Some(relative_to(&image, &dir));
        }
        out.table.relativize_paths(&dir);
        out.saved_at = Some(Local::now().to_rfc3339());

        let json = serde_json::to_string_pretty(&out)?;
        fs::write(&path, json)?;
        log::info!("project saved to {}", path.display());
        Ok(path)
    }

    /// Suggested file name derived from the project name.
    pub fn file_name(&self) -> String {
        format!("{}.json", sanitize_filename(&self.info.name))
    }

    /// Timestamp of the last save, RFC 3339 or the older naive ISO form.
    pub fn saved_at_time(&self) -> Option<NaiveDateTime> {
        let raw = self.saved_at.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.naive_local())
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
            .ok()
    }
}

fn project_dir(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

fn relative_to(path: &Path, base: &Path) -> PathBuf {
    match path.strip_prefix(base) {
        Ok(rel) if !base.as_os_str().is_empty() => rel.to_path_buf(),
        _ => path.to_path_buf(),
    }
}

pub fn with_json_extension(path: &Path) -> PathBuf {
    match path.extension() {
        Some(ext) if ext.eq_ignore_ascii_case("json") => path.to_path_buf(),
        _ => {
            let mut s = path.as_os_str().to_owned();
            s.push(".json");
            PathBuf::from(s)
        }
    }
}

/// Replace characters that are invalid in file names and trim dots and
/// spaces from both ends.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == ' ');
    if trimmed.is_empty() {
        DEFAULT_PROJECT_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use durometer_map::{HardnessDataRow, ImagePathTemplate};

    #[test]
    fn empty_object_gives_defaults() {
        let p: Project = serde_json::from_str("{}").expect("parses");
        assert_relative_eq!(p.vickers.calibration, 1.0);
        assert_relative_eq!(p.vickers.load, 500.0);
        assert_eq!(p.vickers.n_measurements, 2);
        assert_relative_eq!(p.heatmap.calibration, 0.001);
        assert_eq!(p.hmplot.colorscale, ColorScale::Viridis);
        assert_eq!(p.hmplot.interpolation, InterpolationMethod::Cubic);
        assert_eq!(p.hmplot.grid_resolution, 500);
        assert_eq!(p.hmplot.contour_levels, 40);
        assert!(!p.hmplot.show_points);
        assert!(p.table.is_empty());
        assert_eq!(p.info.date.len(), 10);
    }

    #[test]
    fn older_key_names_are_accepted() {
        let raw = r#"{
            "info": {"nombre": "Eje 4140", "tecnico": "R. Diaz", "fecha": "2024-03-01"},
            "heatmap": {"calibration": 0.002, "current_image_path": "/abs/surface.png",
                        "points": [[1.0, 2.0]], "origin_offset": [0.5, 0.5]},
            "hmplot": {"colorscale": "Bluered", "interpolation": "linear"},
            "table": {"data": [{"id": "P1", "x": 1.0, "y": 2.0, "hv": null,
                                "std_dev": null, "image_path": null}]}
        }"#;
        let p: Project = serde_json::from_str(raw).expect("parses");
        assert_eq!(p.info.name, "Eje 4140");
        assert_eq!(p.info.technician, "R. Diaz");
        assert_eq!(p.info.date, "2024-03-01");
        assert_eq!(p.heatmap.image_path, Some(PathBuf::from("/abs/surface.png")));
        assert_eq!(p.hmplot.colorscale, ColorScale::Cool);
        assert_eq!(p.hmplot.interpolation, InterpolationMethod::Linear);
        assert_eq!(p.table.rows()[0].image_path, PathBuf::new());
        let cal = p.heatmap.calibration_state().expect("valid");
        assert_relative_eq!(cal.origin_offset().x, 0.5);
    }

    #[test]
    fn save_and_load_keep_paths_relative_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        let template = ImagePathTemplate::new(root, "images/");

        let mut project = Project::default();
        project.info.name = "Probeta 7".to_string();
        project.heatmap.image_path = Some(root.join("surface.png"));
        project.heatmap.set_positions(&[Point2::new(1.0, 2.0), Point2::new(3.0, 4.0)]);
        project.table.sync_from_source(&project.heatmap.positions(), &template);
        project.table.set_hv("P1", Some(412.5));
        project.vickers.measurements.push(VickersRepetition::from_vertices(
            [
                Point2::new(-25.0, 0.0),
                Point2::new(0.0, 25.0),
                Point2::new(25.0, 0.0),
                Point2::new(0.0, -25.0),
            ],
            500.0,
        ));

        let written = project.save(root.join("specimen")).expect("saves");
        assert_eq!(written, root.join("specimen.json"));

        let raw = fs::read_to_string(&written).expect("readable");
        let on_disk: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(on_disk["heatmap"]["image_path"], "surface.png");
        assert_eq!(on_disk["table"]["data"][0]["image_path"], "images/1 400x.jpg");
        assert!(on_disk["saved_at"].is_string());

        let back = Project::load(&written).expect("loads");
        assert_eq!(back.heatmap.image_path, Some(root.join("surface.png")));
        assert_eq!(back.table.rows()[1].image_path, template.default_path(2));
        assert_eq!(back.table.row("P1").and_then(|r| r.hv), Some(412.5));
        assert_eq!(back.heatmap.positions(), project.heatmap.positions());
        assert_eq!(back.vickers.measurements, project.vickers.measurements);
        assert_eq!(back.info.name, "Probeta 7");
        assert!(back.saved_at_time().is_some());
    }

    #[test]
    fn paths_outside_project_stay_absolute() {
        let project_dir = tempfile::tempdir().expect("tempdir");
        let elsewhere = tempfile::tempdir().expect("tempdir");
        let mut project = Project::default();
        let image = elsewhere.path().join("far.png");
        project.heatmap.image_path = Some(image.clone());
        project.table = HardnessDataset::from_rows(vec![HardnessDataRow {
            id: "P1".to_string(),
            x: 0.0,
            y: 0.0,
            hv: None,
            std_dev: None,
            image_path: image.clone(),
        }]);
        let written = project
            .save(project_dir.path().join("p.json"))
            .expect("saves");
        let back = Project::load(written).expect("loads");
        assert_eq!(back.heatmap.image_path, Some(image.clone()));
        assert_eq!(back.table.rows()[0].image_path, image);
    }

    #[test]
    fn load_errors_are_typed() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            Project::load(dir.path().join("missing.json")),
            Err(ProjectIoError::Io(_))
        ));
        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{ not json").expect("write");
        assert!(matches!(Project::load(&bad), Err(ProjectIoError::Json(_))));
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(sanitize_filename("Eje: 4140/B?"), "Eje_ 4140_B_");
        assert_eq!(sanitize_filename("  ..informe.. "), "informe");
        assert_eq!(sanitize_filename(" ... "), DEFAULT_PROJECT_NAME);
        assert_eq!(sanitize_filename(""), DEFAULT_PROJECT_NAME);
        let mut p = Project::default();
        p.info.name = "a*b".to_string();
        assert_eq!(p.file_name(), "a_b.json");
    }

    #[test]
    fn json_extension_is_added_once() {
        assert_eq!(with_json_extension(Path::new("a/b")), PathBuf::from("a/b.json"));
        assert_eq!(with_json_extension(Path::new("a/b.JSON")), PathBuf::from("a/b.JSON"));
        assert_eq!(with_json_extension(Path::new("a/b.txt")), PathBuf::from("a/b.txt.json"));
    }

    #[test]
    fn naive_saved_at_still_parses() {
        let p = Project {
            saved_at: Some("2024-05-01T10:20:30.123456".to_string()),
            ..Project::default()
        };
        assert!(p.saved_at_time().is_some());
    }

    #[test]
    fn plot_section_maps_to_options() {
        let s = HmPlotSection {
            colorscale: ColorScale::Magma,
            interpolation: InterpolationMethod::Nearest,
            show_points: true,
            show_lines: true,
            grid_resolution: 64,
            contour_levels: 12,
            figure_scale: 2.0,
        };
        let f = s.field_params();
        assert_eq!((f.grid_resolution, f.method), (64, InterpolationMethod::Nearest));
        let r = s.render_options();
        assert_eq!(r.colorscale, ColorScale::Magma);
        assert_eq!(r.contour_levels, 12);
        assert!(r.show_lines && r.show_points);
        assert_relative_eq!(r.figure_scale, 2.0);
    }
}
