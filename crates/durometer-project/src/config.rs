//! Application defaults read from `durometer.toml`.
//!
//! ```toml
//! [paths]
//! default_image_import_path = "images/"
//! default_project_path = "."
//!
//! [heatmap]
//! grid_resolution = 500
//! contour_levels = 40
//! interpolation = "cubic"
//! colorscale = "viridis"
//! ```

use durometer_map::{ColorScale, FieldParams, InterpolationMethod, RenderOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "durometer.toml";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Micrograph folder, relative to the project directory.
    pub default_image_import_path: PathBuf,
    pub default_project_path: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            default_image_import_path: PathBuf::from("images/"),
            default_project_path: PathBuf::from("."),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatmapDefaults {
    pub grid_resolution: usize,
    pub contour_levels: usize,
    pub interpolation: InterpolationMethod,
    pub colorscale: ColorScale,
}

impl Default for HeatmapDefaults {
    fn default() -> Self {
        let field = FieldParams::default();
        let render = RenderOptions::default();
        Self {
            grid_resolution: field.grid_resolution,
            contour_levels: render.contour_levels,
            interpolation: field.method,
            colorscale: render.colorscale,
        }
    }
}

impl HeatmapDefaults {
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
            ..RenderOptions::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub heatmap: HeatmapDefaults,
}

impl AppConfig {
    /// Read `path`; a missing file gives the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("no config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
