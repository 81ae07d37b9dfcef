use std::path::PathBuf;

/// Errors raised while locating or decoding an image file.
#[derive(thiserror::Error, Debug)]
pub enum ImageError {
    #[error("image not found: {0}")]
    FileNotFound(PathBuf),
    #[error("failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
    #[error("failed to write {path}: {reason}")]
    Encode { path: PathBuf, reason: String },
    #[error("pixel buffer does not match {width}x{height}")]
    BufferSize { width: usize, height: usize },
}

/// Pixel dimensions of a decoded image plus where it came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageInfo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgba(pub [u8; 4]);

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba([0, 0, 0, 0]);
    pub const BLACK: Rgba = Rgba([0, 0, 0, 255]);
    pub const WHITE: Rgba = Rgba([255, 255, 255, 255]);
}

/// Owned RGBA raster, row-major from the top-left corner, 4 bytes per pixel.
#[derive(Clone, Debug)]
pub struct RgbaImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>, // len = w*h*4
}

impl RgbaImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height * 4],
        }
    }

    #[inline]
    fn offset(&self, x: usize, y: usize) -> Option<usize> {
        (x < self.width && y < self.height).then(|| (y * self.width + x) * 4)
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Option<Rgba> {
        let o = self.offset(x, y)?;
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.data[o..o + 4]);
        Some(Rgba(px))
    }

    /// Write a pixel; out-of-bounds writes are dropped.
    #[inline]
    pub fn put(&mut self, x: i64, y: i64, color: Rgba) {
        if x < 0 || y < 0 {
            return;
        }
        if let Some(o) = self.offset(x as usize, y as usize) {
            self.data[o..o + 4].copy_from_slice(&color.0);
        }
    }

    /// Filled disc centred on `(cx, cy)`.
    pub fn fill_circle(&mut self, cx: f64, cy: f64, radius: f64, color: Rgba) {
        let r = radius.max(0.0);
        let r2 = r * r;
        let x0 = (cx - r).floor() as i64;
        let x1 = (cx + r).ceil() as i64;
        let y0 = (cy - r).floor() as i64;
        let y1 = (cy + r).ceil() as i64;
        for y in y0..=y1 {
            for x in x0..=x1 {
                let dx = x as f64 - cx;
                let dy = y as f64 - cy;
                if dx * dx + dy * dy <= r2 {
                    self.put(x, y, color);
                }
            }
        }
    }

    /// Circle outline of the given stroke `width`, drawn inwards from `radius`.
    pub fn stroke_circle(&mut self, cx: f64, cy: f64, radius: f64, width: f64, color: Rgba) {
        let outer = radius.max(0.0);
        let inner = (outer - width).max(0.0);
        let (o2, i2) = (outer * outer, inner * inner);
        let x0 = (cx - outer).floor() as i64;
        let x1 = (cx + outer).ceil() as i64;
        let y0 = (cy - outer).floor() as i64;
        let y1 = (cy + outer).ceil() as i64;
        for y in y0..=y1 {
            for x in x0..=x1 {
                let dx = x as f64 - cx;
                let dy = y as f64 - cy;
                let d2 = dx * dx + dy * dy;
                if d2 <= o2 && d2 >= i2 {
                    self.put(x, y, color);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_bounds_writes_are_ignored() {
        let mut img = RgbaImage::new(3, 2);
        img.put(-1, 0, Rgba::WHITE);
        img.put(3, 0, Rgba::WHITE);
        img.put(2, 1, Rgba::WHITE);
        assert_eq!(img.get(2, 1), Some(Rgba::WHITE));
        assert_eq!(img.get(0, 0), Some(Rgba::TRANSPARENT));
        assert_eq!(img.get(3, 1), None);
    }

    #[test]
    fn circle_covers_centre_only_for_small_radius() {
        let mut img = RgbaImage::new(5, 5);
        img.fill_circle(2.0, 2.0, 0.5, Rgba::BLACK);
        assert_eq!(img.get(2, 2), Some(Rgba::BLACK));
        assert_eq!(img.get(0, 0), Some(Rgba::TRANSPARENT));
    }

    #[test]
    fn ring_leaves_centre_untouched() {
        let mut img = RgbaImage::new(21, 21);
        img.stroke_circle(10.0, 10.0, 8.0, 3.0, Rgba::BLACK);
        assert_eq!(img.get(10, 10), Some(Rgba::TRANSPARENT));
        assert_eq!(img.get(18, 10), Some(Rgba::BLACK));
        assert_eq!(img.get(16, 10), Some(Rgba::BLACK));
    }
}
