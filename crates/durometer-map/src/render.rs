//! Rasterization of a [`HeatMapField`] into RGBA images.

use crate::colormap::ColorScale;
use crate::heatmap::HeatMapField;
use durometer_core::{CalibrationState, Rgba, RgbaImage};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Largest edge accepted for a rendered image, in pixels.
pub const MAX_RENDER_EDGE: usize = 16_384;
/// Border added around the surface image by [`point_rings`].
pub const OVERLAY_MARGIN: usize = 50;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("cannot render an empty image")]
    EmptyImage,
}

/// Display options of the heat map plot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    pub colorscale: ColorScale,
    /// Number of filled colour bands.
    pub contour_levels: usize,
    pub show_lines: bool,
    pub show_points: bool,
    /// Output pixels per lattice node.
    pub figure_scale: f64,
    /// Alpha applied to defined cells, `0..=1`.
    pub opacity: f64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            colorscale: ColorScale::Viridis,
            contour_levels: 40,
            show_lines: false,
            show_points: true,
            figure_scale: 1.0,
            opacity: 1.0,
        }
    }
}

impl RenderOptions {
    pub fn validate(&self) -> Result<(), RenderError> {
        if self.contour_levels == 0 {
            return Err(RenderError::InvalidParameter {
                name: "contour_levels",
                reason: "must be >= 1".to_string(),
            });
        }
        if !self.figure_scale.is_finite() || self.figure_scale <= 0.0 {
            return Err(RenderError::InvalidParameter {
                name: "figure_scale",
                reason: format!("must be > 0 (got {})", self.figure_scale),
            });
        }
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(RenderError::InvalidParameter {
                name: "opacity",
                reason: format!("must be in 0..=1 (got {})", self.opacity),
            });
        }
        Ok(())
    }
}

/// Band index of `v` among `levels` equal bands over `[lo, hi]`.
fn band(v: f64, lo: f64, hi: f64, levels: usize) -> usize {
    if hi <= lo {
        return levels / 2;
    }
    let t = ((v - lo) / (hi - lo)).clamp(0.0, 1.0);
    ((t * levels as f64) as usize).min(levels - 1)
}

/// Render `field` with the top image row at the largest `y`.
///
/// Undefined cells stay fully transparent.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(field, opts), fields(nx = field.grid_x.len(), ny = field.grid_y.len()))
)]
pub fn render_field(field: &HeatMapField, opts: &RenderOptions) -> Result<RgbaImage, RenderError> {
    opts.validate()?;
    let (nx, ny) = (field.grid_x.len(), field.grid_y.len());
    if nx == 0 || ny == 0 {
        return Err(RenderError::EmptyImage);
    }
    let width = ((nx as f64 * opts.figure_scale).round() as usize).max(1);
    let height = ((ny as f64 * opts.figure_scale).round() as usize).max(1);
    if width > MAX_RENDER_EDGE || height > MAX_RENDER_EDGE {
        return Err(RenderError::InvalidParameter {
            name: "figure_scale",
            reason: format!("{width}x{height} exceeds {MAX_RENDER_EDGE} px per edge"),
        });
    }

    let levels = opts.contour_levels;
    let alpha = (opts.opacity * 255.0).round() as u8;
    let mut img = RgbaImage::new(width, height);

    // band per output pixel, None for undefined cells
    let mut bands: Vec<Option<usize>> = vec![None; width * height];
    if let Some((lo, hi)) = field.value_range() {
        for py in 0..height {
            let iy = ny - 1 - (py * ny / height).min(ny - 1);
            for px in 0..width {
                let ix = (px * nx / width).min(nx - 1);
                let Some(v) = field.value(ix, iy).filter(|v| v.is_finite()) else {
                    continue;
                };
                let b = band(v, lo, hi, levels);
                bands[py * width + px] = Some(b);
                let t = (b as f64 + 0.5) / levels as f64;
                let [r, g, bl] = opts.colorscale.sample(t);
                img.put(px as i64, py as i64, Rgba([r, g, bl, alpha]));
            }
        }
    }

    if opts.show_lines {
        let line = Rgba([0, 0, 0, 128]);
        for py in 0..height {
            for px in 0..width {
                let Some(b) = bands[py * width + px] else {
                    continue;
                };
                let right = (px + 1 < width)
                    .then(|| bands[py * width + px + 1])
                    .flatten();
                let below = (py + 1 < height)
                    .then(|| bands[(py + 1) * width + px])
                    .flatten();
                if right.is_some_and(|r| r != b) || below.is_some_and(|d| d != b) {
                    img.put(px as i64, py as i64, line);
                }
            }
        }
    }

    if opts.show_points {
        let radius = (4.0 * opts.figure_scale).max(2.0);
        for (p, _) in &field.samples {
            let (cx, cy) = field_to_image(field, *p, width, height);
            img.fill_circle(cx, cy, radius + 1.0, Rgba::WHITE);
            img.fill_circle(cx, cy, radius, Rgba::BLACK);
        }
    }
    Ok(img)
}

/// Continuous pixel position of physical point `p` in a `width × height`
/// rendering of `field`.
pub fn field_to_image(field: &HeatMapField, p: Point2<f64>, width: usize, height: usize) -> (f64, f64) {
    let bb = &field.bounds;
    let fx = if bb.width() > 0.0 {
        (p.x - bb.min[0]) / bb.width()
    } else {
        0.5
    };
    let fy = if bb.height() > 0.0 {
        (bb.max[1] - p.y) / bb.height()
    } else {
        0.5
    };
    (fx * (width as f64 - 1.0), fy * (height as f64 - 1.0))
}

/// Transparent layer with a red ring on every marked point, sized for a
/// `width × height` surface image plus [`OVERLAY_MARGIN`] on each side.
///
/// `points` are physical positions under `calibration`.
pub fn point_rings(
    width: usize,
    height: usize,
    points: &[Point2<f64>],
    calibration: &CalibrationState,
) -> Result<RgbaImage, RenderError> {
    if width == 0 || height == 0 {
        return Err(RenderError::EmptyImage);
    }
    let m = OVERLAY_MARGIN;
    let mut img = RgbaImage::new(width + 2 * m, height + 2 * m);
    let red = Rgba([255, 0, 0, 255]);
    for p in points {
        let plot_px = calibration.physical_to_pixel(*p);
        let x = plot_px.x + m as f64;
        let y = height as f64 - plot_px.y + m as f64;
        img.stroke_circle(x, y, 8.0, 3.0, red);
    }
    Ok(img)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heatmap::FieldStats;
    use crate::interpolate::InterpolationMethod;
    use durometer_core::BoundingBox;

    fn field(values: Vec<f64>, nx: usize, ny: usize) -> HeatMapField {
        HeatMapField {
            grid_x: durometer_core::linspace(0.0, 1.0, nx),
            grid_y: durometer_core::linspace(0.0, 1.0, ny),
            values,
            bounds: BoundingBox {
                min: [0.0, 0.0],
                max: [1.0, 1.0],
            },
            stats: FieldStats {
                count: 3,
                min: 0.0,
                max: 1.0,
                mean: 0.5,
            },
            samples: Vec::new(),
            method: InterpolationMethod::Linear,
        }
    }

    #[test]
    fn nan_cells_are_transparent_and_rows_flip() {
        // bottom row (y = 0) is undefined
        let f = field(vec![f64::NAN, f64::NAN, 1.0, 2.0], 2, 2);
        let img = render_field(&f, &RenderOptions::default()).expect("renders");
        assert_eq!((img.width, img.height), (2, 2));
        assert_eq!(img.get(0, 1), Some(Rgba::TRANSPARENT));
        assert_eq!(img.get(0, 0).map(|p| p.0[3]), Some(255));
    }

    #[test]
    fn extreme_bands_use_scale_ends() {
        let f = field(vec![0.0, 10.0], 2, 1);
        let opts = RenderOptions {
            contour_levels: 2,
            show_points: false,
            ..RenderOptions::default()
        };
        let img = render_field(&f, &opts).expect("renders");
        let lo = ColorScale::Viridis.sample(0.25);
        let hi = ColorScale::Viridis.sample(0.75);
        assert_eq!(img.get(0, 0), Some(Rgba([lo[0], lo[1], lo[2], 255])));
        assert_eq!(img.get(1, 0), Some(Rgba([hi[0], hi[1], hi[2], 255])));
    }

    #[test]
    fn all_nan_field_renders_transparent() {
        let f = field(vec![f64::NAN; 9], 3, 3);
        let opts = RenderOptions {
            show_points: false,
            ..RenderOptions::default()
        };
        let img = render_field(&f, &opts).expect("renders");
        assert!(img.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn contour_lines_mark_band_changes() {
        let f = field(vec![0.0, 0.0, 10.0, 10.0], 4, 1);
        let opts = RenderOptions {
            contour_levels: 2,
            show_lines: true,
            show_points: false,
            ..RenderOptions::default()
        };
        let img = render_field(&f, &opts).expect("renders");
        assert_eq!(img.get(1, 0), Some(Rgba([0, 0, 0, 128])));
        assert_ne!(img.get(0, 0), Some(Rgba([0, 0, 0, 128])));
    }

    #[test]
    fn figure_scale_sets_output_size() {
        let f = field(vec![1.0; 4], 2, 2);
        let opts = RenderOptions {
            figure_scale: 3.0,
            ..RenderOptions::default()
        };
        let img = render_field(&f, &opts).expect("renders");
        assert_eq!((img.width, img.height), (6, 6));
    }

    #[test]
    fn invalid_options_are_rejected() {
        let f = field(vec![1.0; 4], 2, 2);
        for opts in [
            RenderOptions {
                contour_levels: 0,
                ..RenderOptions::default()
            },
            RenderOptions {
                figure_scale: 0.0,
                ..RenderOptions::default()
            },
            RenderOptions {
                opacity: 1.5,
                ..RenderOptions::default()
            },
        ] {
            assert!(render_field(&f, &opts).is_err());
        }
    }

    #[test]
    fn rings_sit_on_flipped_rows_inside_the_margin() {
        let mut cal = CalibrationState::new(0.1).expect("valid");
        cal.attach_image(100, 80);
        // physical (2, 6) -> plot px (20, 60) -> image row 80 - 60 = 20
        let img = point_rings(100, 80, &[Point2::new(2.0, 6.0)], &cal).expect("renders");
        assert_eq!((img.width, img.height), (200, 180));
        assert_eq!(img.get(50 + 20 + 8, 50 + 20), Some(Rgba([255, 0, 0, 255])));
        assert_eq!(img.get(50 + 20, 50 + 20), Some(Rgba::TRANSPARENT));
        assert_eq!(img.get(0, 0), Some(Rgba::TRANSPARENT));
    }

    #[test]
    fn rings_need_a_surface() {
        let cal = CalibrationState::default();
        assert!(matches!(
            point_rings(0, 10, &[], &cal),
            Err(RenderError::EmptyImage)
        ));
    }
}
