//! Persistence for durometer: the JSON project file, the user preference
//! store and the TOML application config.

mod config;
mod preferences;
mod project;

pub use config::{AppConfig, ConfigError, HeatmapDefaults, PathsConfig, CONFIG_FILE};
pub use preferences::{
    PreferencesStore, HEATMAP_CALIBRATION, HEATMAP_FIGURE_SCALE, LAST_PROJECT_FOLDER,
    PREFERENCES_FILE, VICKERS_CALIBRATION, VICKERS_LOAD, VICKERS_N_MEASUREMENTS,
};
pub use project::{
    sanitize_filename, with_json_extension, HeatmapSection, HmPlotSection, Project,
    ProjectInfo, ProjectIoError, VickersSection, DEFAULT_PROJECT_NAME,
};
