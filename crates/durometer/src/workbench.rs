//! One open specimen: surface mapping, Vickers measurement, hardness table
//! and heat map settings, wired together.
//!
//! The workbench owns every component and passes the hardness table to the
//! Vickers session as its [`HardnessRowUpdater`]. Nothing here touches the
//! screen; callers route clicks in plot pixels and render the returned
//! outcomes.

use crate::core::{
    CalibrationError, CalibrationState, CalibrationStep, CalibrationWorkflow, ImageError,
    ImageInfo, OriginWorkflow, RecalibrationPolicy, RgbaImage, WorkflowToggle,
};
use crate::map::{
    build_field, point_rings, render_field, HardnessDataRow, HardnessDataset, HeatMapError,
    HeatMapJobs, HeatMapOutput, HeatMapRequest, ImagePathTemplate, JobError, JobEvent, JobId,
    MeasurementPoint, PointRegistry, RenderError, MIN_SAMPLES,
};
use crate::project::{
    AppConfig, ConfigError, HmPlotSection, PreferencesStore, Project, ProjectInfo,
    ProjectIoError, HEATMAP_CALIBRATION, LAST_PROJECT_FOLDER, VICKERS_CALIBRATION, VICKERS_LOAD,
    VICKERS_N_MEASUREMENTS,
};
use crate::vickers::{
    ClickOutcome, CooldownTicket, HardnessRowUpdater, PointCursor, ProcessingMode, VickersError,
    VickersSession,
};
use nalgebra::Point2;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Folder below the project directory that receives exported images.
pub const MAPS_DIR: &str = "maps";
pub const HEATMAP_FILE: &str = "heatmap.png";
pub const MAPPING_FILE: &str = "mapping_with_points.png";

#[derive(thiserror::Error, Debug)]
pub enum WorkbenchError {
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Vickers(#[from] VickersError),
    #[error(transparent)]
    HeatMap(#[from] HeatMapError),
    #[error(transparent)]
    Job(#[from] JobError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Project(#[from] ProjectIoError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("no surface image loaded")]
    NoSurfaceImage,
    #[error("no table row at index {0}")]
    NoSuchRow(usize),
}

/// What a click on the surface image did.
#[derive(Clone, Debug, PartialEq)]
pub enum SurfaceClick {
    Ignored,
    Calibration(CalibrationStep),
    OriginSet { moved_points: usize },
    PointMarked(MeasurementPoint),
}

pub struct Workbench {
    config: AppConfig,
    preferences: PreferencesStore,
    project_dir: PathBuf,
    info: ProjectInfo,
    surface: CalibrationState,
    surface_image: Option<PathBuf>,
    surface_mode: ProcessingMode,
    calibration: CalibrationWorkflow,
    origin: OriginWorkflow,
    registry: PointRegistry,
    dataset: HardnessDataset,
    session: VickersSession,
    cursor: PointCursor,
    plot: HmPlotSection,
    jobs: HeatMapJobs,
}

impl Workbench {
    /// Fresh workbench for `project_dir`, seeded from the stored preferences
    /// and the config defaults.
    pub fn new(
        config: AppConfig,
        preferences: PreferencesStore,
        project_dir: impl Into<PathBuf>,
    ) -> Result<Self, WorkbenchError> {
        let session = VickersSession::new(
            preferences.vickers_calibration(),
            preferences.vickers_load(),
            preferences.vickers_n_measurements(),
        )?;
        let surface = CalibrationState::new(preferences.heatmap_calibration())?;
        let plot = HmPlotSection {
            colorscale: config.heatmap.colorscale,
            interpolation: config.heatmap.interpolation,
            grid_resolution: config.heatmap.grid_resolution,
            contour_levels: config.heatmap.contour_levels,
            figure_scale: preferences.heatmap_figure_scale(),
            ..HmPlotSection::default()
        };
        Ok(Self {
            config,
            preferences,
            project_dir: project_dir.into(),
            info: ProjectInfo::default(),
            surface,
            surface_image: None,
            surface_mode: ProcessingMode::MarkPoints,
            calibration: CalibrationWorkflow::default(),
            origin: OriginWorkflow::default(),
            registry: PointRegistry::default(),
            dataset: HardnessDataset::default(),
            session,
            cursor: PointCursor::default(),
            plot,
            jobs: HeatMapJobs::default(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn preferences(&self) -> &PreferencesStore {
        &self.preferences
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn info(&self) -> &ProjectInfo {
        &self.info
    }

    pub fn info_mut(&mut self) -> &mut ProjectInfo {
        &mut self.info
    }

    pub fn surface(&self) -> &CalibrationState {
        &self.surface
    }

    pub fn surface_image(&self) -> Option<&Path> {
        self.surface_image.as_deref()
    }

    pub fn registry(&self) -> &PointRegistry {
        &self.registry
    }

    pub fn dataset(&self) -> &HardnessDataset {
        &self.dataset
    }

    pub fn dataset_mut(&mut self) -> &mut HardnessDataset {
        &mut self.dataset
    }

    pub fn session(&self) -> &VickersSession {
        &self.session
    }

    pub fn cursor(&self) -> PointCursor {
        self.cursor
    }

    pub fn plot(&self) -> &HmPlotSection {
        &self.plot
    }

    pub fn plot_mut(&mut self) -> &mut HmPlotSection {
        &mut self.plot
    }

    /// Micrograph names for new rows: `<project>/<images dir>/{n} 400x.jpg`.
    pub fn template(&self) -> ImagePathTemplate {
        ImagePathTemplate::new(
            &self.project_dir,
            &self.config.paths.default_image_import_path,
        )
    }

    pub fn maps_dir(&self) -> PathBuf {
        self.project_dir.join(MAPS_DIR)
    }

    fn remember(&mut self, key: &str, value: impl serde::Serialize) {
        if let Err(e) = self.preferences.set(key, value) {
            log::warn!("could not persist preference {key}: {e}");
        }
    }

    // ---- surface mapping ----

    /// Attach a freshly loaded surface image. Points and origin are kept.
    pub fn attach_surface(&mut self, info: &ImageInfo) {
        self.surface.attach_image(info.width, info.height);
        self.surface_image = Some(info.path.clone());
        log::info!(
            "surface image {} ({}x{})",
            info.path.display(),
            info.width,
            info.height
        );
    }

    pub fn set_surface_mode(&mut self, mode: ProcessingMode) {
        self.surface_mode = mode;
    }

    pub fn set_recalibration_policy(&mut self, policy: RecalibrationPolicy) {
        self.registry.set_policy(policy);
    }

    /// Replace the surface scale (mm per pixel) and remember it.
    pub fn set_surface_scale(&mut self, scale: f64) -> Result<f64, WorkbenchError> {
        let previous = self.surface.set_scale(scale)?;
        self.remember(HEATMAP_CALIBRATION, scale);
        self.registry.recalibrate(&self.surface);
        Ok(previous)
    }

    pub fn toggle_calibration(&mut self) -> Result<WorkflowToggle, WorkbenchError> {
        self.origin.cancel();
        Ok(self.calibration.toggle(&self.surface)?)
    }

    /// Finish two-point calibration with the real distance in mm.
    pub fn submit_calibration_distance(&mut self, real: f64) -> Result<f64, WorkbenchError> {
        let scale = self.calibration.submit_distance(real, &mut self.surface)?;
        self.remember(HEATMAP_CALIBRATION, scale);
        self.registry.recalibrate(&self.surface);
        Ok(scale)
    }

    pub fn toggle_origin(&mut self) -> Result<WorkflowToggle, WorkbenchError> {
        self.calibration.cancel();
        Ok(self.origin.toggle(&self.surface)?)
    }

    /// Route a click given in plot pixels (y up) on the surface image.
    pub fn surface_click(&mut self, pixel: Point2<f64>) -> SurfaceClick {
        let p = self.surface.pixel_to_physical(pixel);
        if self.origin.is_active() {
            if !self.origin.click(p, &mut self.surface) {
                return SurfaceClick::Ignored;
            }
            let moved_points = self.registry.recalibrate(&self.surface);
            return SurfaceClick::OriginSet { moved_points };
        }
        if self.calibration.is_active() {
            return SurfaceClick::Calibration(self.calibration.click(p, &self.surface));
        }
        if self.surface_mode == ProcessingMode::PanImage {
            return SurfaceClick::Ignored;
        }
        if !self.surface.has_image() {
            log::warn!("load a surface image before marking points");
            return SurfaceClick::Ignored;
        }
        let template = self.template();
        let point = self.registry.mark(pixel, &self.surface).clone();
        self.dataset
            .add_point(self.registry.len() - 1, point.position, &template);
        SurfaceClick::PointMarked(point)
    }

    /// Remove the point at `index` and its table row; later points are
    /// renumbered and keep their results.
    pub fn remove_point(&mut self, index: usize) -> Option<MeasurementPoint> {
        let removed = self.registry.remove(index)?;
        self.dataset.remove(index);
        self.cursor.clear();
        Some(removed)
    }

    /// Clear the marked points and their table rows.
    pub fn reset_points(&mut self) {
        self.registry.reset();
        self.dataset.clear();
        self.cursor.clear();
        log::info!("surface points cleared");
    }

    /// Clear points and workflows and return the origin to the image corner.
    pub fn restart_mapping(&mut self) {
        self.reset_points();
        self.calibration.cancel();
        self.origin.cancel();
        self.surface.reset_origin();
        self.surface_mode = ProcessingMode::MarkPoints;
    }

    /// Rebuild the table from the marked points.
    pub fn sync_table(&mut self) {
        let template = self.template();
        self.dataset
            .sync_from_source(&self.registry.positions(), &template);
        self.cursor.clear();
    }

    pub fn load_default_images(&mut self) -> usize {
        let template = self.template();
        self.dataset.load_default_images(&template)
    }

    /// Ring layer for the attached surface image, margin included.
    pub fn mapping_rings(&self) -> Result<RgbaImage, WorkbenchError> {
        let [w, h] = self
            .surface
            .image_size()
            .ok_or(WorkbenchError::NoSurfaceImage)?;
        Ok(point_rings(
            w as usize,
            h as usize,
            &self.registry.positions(),
            &self.surface,
        )?)
    }

    // ---- Vickers measurement ----

    pub fn set_vickers_scale(&mut self, scale_um_per_px: f64) -> Result<f64, WorkbenchError> {
        let previous = self.session.calibration_mut().set_scale(scale_um_per_px)?;
        self.remember(VICKERS_CALIBRATION, scale_um_per_px);
        Ok(previous)
    }

    pub fn set_vickers_load(&mut self, grams: f64) -> Result<(), WorkbenchError> {
        self.session.set_load(grams)?;
        self.remember(VICKERS_LOAD, grams);
        Ok(())
    }

    pub fn set_required_repetitions(&mut self, n: usize) -> Result<(), WorkbenchError> {
        self.session.set_required_repetitions(n)?;
        self.remember(VICKERS_N_MEASUREMENTS, n);
        Ok(())
    }

    pub fn set_vickers_mode(&mut self, mode: ProcessingMode) {
        self.session.set_mode(mode);
    }

    /// Switch the session to a decoded micrograph.
    pub fn load_vickers_image(&mut self, info: &ImageInfo) {
        self.session
            .load_image(info.path.clone(), info.width, info.height);
    }

    pub fn vickers_click(&mut self, pixel: Point2<f64>) -> ClickOutcome {
        self.session.click_pixel(pixel, &mut self.dataset)
    }

    pub fn fire_cooldown(&mut self, ticket: CooldownTicket) -> bool {
        self.session.fire_cooldown(ticket)
    }

    pub fn reset_measurement(&mut self) {
        self.session.reset();
    }

    /// Write a hardness result straight into the table row that references
    /// `image`, as the session does on completion.
    pub fn record_hardness(&mut self, image: &Path, hv: f64, std_dev: f64) -> Option<String> {
        self.dataset.update_by_image_path(image, hv, std_dev)
    }

    /// Row at `index` with its micrograph, when that file exists.
    fn row_with_image(&self, index: usize) -> Result<(&HardnessDataRow, bool), WorkbenchError> {
        let row = self
            .dataset
            .rows()
            .get(index)
            .ok_or(WorkbenchError::NoSuchRow(index))?;
        Ok((row, row.image_path.is_file()))
    }

    /// Select a table row for measurement. Returns its micrograph path when
    /// the file exists; the caller decodes it and calls
    /// [`Self::load_vickers_image`].
    pub fn select_point(&mut self, index: usize) -> Result<Option<PathBuf>, WorkbenchError> {
        let (row, exists) = self.row_with_image(index)?;
        let path = exists.then(|| row.image_path.clone());
        if path.is_none() {
            log::warn!("{}: image {} not found", row.id, row.image_path.display());
        }
        self.cursor.select(index, self.dataset.len());
        Ok(path)
    }

    pub fn next_point(&mut self) -> Option<(usize, Option<PathBuf>)> {
        let i = self.cursor.next(self.dataset.len())?;
        let path = self.select_point(i).ok().flatten();
        Some((i, path))
    }

    pub fn prev_point(&mut self) -> Option<(usize, Option<PathBuf>)> {
        let i = self.cursor.prev(self.dataset.len())?;
        let path = self.select_point(i).ok().flatten();
        Some((i, path))
    }

    // ---- heat map ----

    fn heatmap_request(&self) -> Result<HeatMapRequest, WorkbenchError> {
        let available = self.dataset.completed();
        if available < MIN_SAMPLES {
            return Err(HeatMapError::InsufficientData { available }.into());
        }
        let params = self.plot.field_params();
        params.validate()?;
        let render = self.plot.render_options();
        render.validate()?;
        Ok(HeatMapRequest {
            rows: self.dataset.rows().to_vec(),
            params,
            render: Some(render),
        })
    }

    /// Start background generation from a snapshot of the table.
    pub fn start_heatmap(&mut self) -> Result<JobId, WorkbenchError> {
        let request = self.heatmap_request()?;
        Ok(self.jobs.start(request)?)
    }

    pub fn heatmap_progress(&self) -> f32 {
        self.jobs.progress()
    }

    pub fn heatmap_running(&self) -> bool {
        self.jobs.is_running()
    }

    pub fn cancel_heatmap(&self) {
        self.jobs.cancel();
    }

    /// Next finished job, if any, without blocking.
    pub fn poll_heatmap(&self) -> Option<JobEvent> {
        self.jobs.events().try_recv().ok()
    }

    pub fn wait_heatmap(&mut self) -> Option<JobEvent> {
        self.jobs.wait()
    }

    pub fn latest_heatmap(&self) -> Option<(JobId, std::sync::Arc<HeatMapOutput>)> {
        self.jobs.latest()
    }

    /// Build and render on the calling thread.
    pub fn build_heatmap(&self) -> Result<HeatMapOutput, WorkbenchError> {
        let request = self.heatmap_request()?;
        let field = build_field(&request.rows, &request.params)?;
        let image = match &request.render {
            Some(opts) => Some(render_field(&field, opts)?),
            None => None,
        };
        Ok(HeatMapOutput { field, image })
    }

    // ---- projects ----

    pub fn to_project(&self) -> Project {
        let mut project = Project {
            info: self.info.clone(),
            table: self.dataset.clone(),
            hmplot: self.plot.clone(),
            ..Project::default()
        };
        project.vickers.calibration = self.session.calibration().scale();
        project.vickers.load = self.session.load_grams();
        project.vickers.measurements = self.session.repetitions().to_vec();
        project.vickers.n_measurements = self.session.required_repetitions();
        project.heatmap.store_calibration(&self.surface);
        project.heatmap.set_positions(&self.registry.positions());
        project.heatmap.image_path = self.surface_image.clone();
        project
    }

    /// Save to `path` and make its folder the project directory.
    pub fn save_project(&mut self, path: impl AsRef<Path>) -> Result<PathBuf, WorkbenchError> {
        let written = self.to_project().save(path)?;
        if let Some(dir) = written.parent() {
            self.project_dir = dir.to_path_buf();
            let folder = Value::String(dir.to_string_lossy().into_owned());
            self.remember(LAST_PROJECT_FOLDER, folder);
        }
        Ok(written)
    }

    /// Replace the in-memory state with `project`. Nothing changes when
    /// any section is invalid.
    pub fn apply_project(&mut self, project: Project) -> Result<(), WorkbenchError> {
        let surface = project.heatmap.calibration_state()?;
        let mut session = VickersSession::new(
            project.vickers.calibration,
            project.vickers.load,
            project.vickers.n_measurements,
        )?;
        session.restore(project.vickers.n_measurements, project.vickers.measurements)?;

        let mut registry = PointRegistry::with_policy(self.registry.policy());
        registry.restore(&project.heatmap.positions());

        self.remember(VICKERS_CALIBRATION, project.vickers.calibration);
        self.remember(VICKERS_LOAD, project.vickers.load);
        self.remember(HEATMAP_CALIBRATION, project.heatmap.calibration);

        self.info = project.info;
        self.surface = surface;
        self.surface_image = project.heatmap.image_path;
        self.session = session;
        self.registry = registry;
        self.dataset = project.table;
        self.plot = project.hmplot;
        self.cursor.clear();
        self.calibration.cancel();
        self.origin.cancel();
        Ok(())
    }

    /// Load `path`, apply it, and make its folder the project directory.
    /// A failed load leaves the workbench untouched.
    pub fn open_project(&mut self, path: impl AsRef<Path>) -> Result<(), WorkbenchError> {
        let path = path.as_ref();
        let project = Project::load(path)?;
        self.apply_project(project)?;
        if let Some(dir) = path.parent() {
            self.project_dir = dir.to_path_buf();
            let folder = Value::String(dir.to_string_lossy().into_owned());
            self.remember(LAST_PROJECT_FOLDER, folder);
        }
        Ok(())
    }
}

#[cfg(feature = "image")]
impl Workbench {
    /// Decode the size of the surface image at `path` and attach it.
    pub fn open_surface(&mut self, path: impl AsRef<Path>) -> Result<(), WorkbenchError> {
        let info = crate::image_io::load_image_info(path)?;
        self.attach_surface(&info);
        Ok(())
    }

    /// Decode the micrograph at `path` and start measuring on it.
    pub fn open_vickers_image(&mut self, path: impl AsRef<Path>) -> Result<(), WorkbenchError> {
        let info = crate::image_io::load_image_info(path)?;
        self.load_vickers_image(&info);
        Ok(())
    }

    /// Render the latest field and write `<project>/maps/heatmap.png`.
    pub fn export_heatmap(&self) -> Result<PathBuf, WorkbenchError> {
        let output = self.build_heatmap()?;
        let image = match output.image {
            Some(img) => img,
            None => render_field(&output.field, &self.plot.render_options())?,
        };
        let path = self.maps_dir().join(HEATMAP_FILE);
        crate::image_io::save_png(&image, &path)?;
        Ok(path)
    }

    /// Surface image with a ring on every marked point.
    pub fn mapping_overlay(&self, surface: &RgbaImage) -> Result<RgbaImage, WorkbenchError> {
        let rings = self.mapping_rings()?;
        Ok(crate::image_io::compose_overlay(surface, &rings)?)
    }

    /// Write `<project>/maps/mapping_with_points.png` from the surface image.
    pub fn export_mapping(&self) -> Result<PathBuf, WorkbenchError> {
        let source = self
            .surface_image
            .as_deref()
            .ok_or(WorkbenchError::NoSurfaceImage)?;
        let surface = crate::image_io::load_rgba(source)?;
        let overlay = self.mapping_overlay(&surface)?;
        let path = self.maps_dir().join(MAPPING_FILE);
        crate::image_io::save_png(&overlay, &path)?;
        Ok(path)
    }
}
