//! Minimal raster interface consumed by the runtimes
//!
//! The compiler core does not own raster storage: it reads and writes
//! samples through these traits. `GridImage` is a plain in-memory
//! implementation used by tests and by callers that have no external
//! tiled substrate.

use std::sync::{Arc, Mutex};

/// Read-only raster: a rectangle of pixels with one or more numeric bands.
///
/// `min_x`/`min_y` anchor the pixel grid, so valid coordinates are
/// `min_x .. min_x + width` and `min_y .. min_y + height`.
pub trait SourceImage: Send + Sync {
    fn width(&self) -> usize;
    fn height(&self) -> usize;
    fn min_x(&self) -> i64;
    fn min_y(&self) -> i64;
    fn num_bands(&self) -> usize;

    /// Read one sample. Callers must bounds-check first; implementations
    /// may panic on out-of-range coordinates.
    fn get_sample(&self, x: i64, y: i64, band: usize) -> f64;

    /// Whether the pixel coordinate lies inside the raster
    fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.min_x()
            && y >= self.min_y()
            && x < self.min_x() + self.width() as i64
            && y < self.min_y() + self.height() as i64
    }
}

/// Writable raster
pub trait DestImage: SourceImage {
    /// Write one sample. Callers must bounds-check first; implementations
    /// may panic on out-of-range coordinates.
    fn set_sample(&mut self, x: i64, y: i64, band: usize, value: f64);
}

/// Shared handle to a read-only raster
pub type SharedSourceImage = Arc<dyn SourceImage>;

/// Shared handle to a writable raster. The mutex lets the caller keep a
/// handle while a scan writes through it, and lets executor completion
/// events carry the finished rasters.
pub type SharedDestImage = Arc<Mutex<dyn DestImage + Send>>;

/// In-memory raster: row-major `f64` samples, band-interleaved by plane
#[derive(Debug, Clone)]
pub struct GridImage {
    width: usize,
    height: usize,
    min_x: i64,
    min_y: i64,
    /// One plane per band, each `width * height` long
    bands: Vec<Vec<f64>>,
}

impl GridImage {
    /// Create an image with every sample set to `fill`
    pub fn filled(width: usize, height: usize, num_bands: usize, fill: f64) -> Self {
        Self {
            width,
            height,
            min_x: 0,
            min_y: 0,
            bands: vec![vec![fill; width * height]; num_bands],
        }
    }

    /// Create a single-band image from row-major data.
    ///
    /// Panics if `data.len() != width * height`.
    pub fn from_data(width: usize, height: usize, data: Vec<f64>) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "data length must equal width * height"
        );
        Self {
            width,
            height,
            min_x: 0,
            min_y: 0,
            bands: vec![data],
        }
    }

    /// Move the grid origin away from (0, 0)
    pub fn with_origin(mut self, min_x: i64, min_y: i64) -> Self {
        self.min_x = min_x;
        self.min_y = min_y;
        self
    }

    fn index(&self, x: i64, y: i64) -> usize {
        let col = (x - self.min_x) as usize;
        let row = (y - self.min_y) as usize;
        row * self.width + col
    }

    /// Borrow one band's row-major samples
    pub fn band_data(&self, band: usize) -> &[f64] {
        &self.bands[band]
    }
}

impl SourceImage for GridImage {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn min_x(&self) -> i64 {
        self.min_x
    }

    fn min_y(&self) -> i64 {
        self.min_y
    }

    fn num_bands(&self) -> usize {
        self.bands.len()
    }

    fn get_sample(&self, x: i64, y: i64, band: usize) -> f64 {
        assert!(
            self.contains(x, y) && band < self.bands.len(),
            "sample read out of range: ({}, {}) band {}",
            x,
            y,
            band
        );
        let idx = self.index(x, y);
        self.bands[band][idx]
    }
}

impl DestImage for GridImage {
    fn set_sample(&mut self, x: i64, y: i64, band: usize, value: f64) {
        assert!(
            self.contains(x, y) && band < self.bands.len(),
            "sample write out of range: ({}, {}) band {}",
            x,
            y,
            band
        );
        let idx = self.index(x, y);
        self.bands[band][idx] = value;
    }
}

/// Wrap a concrete source image in a shared handle
pub fn shared_source(image: impl SourceImage + 'static) -> SharedSourceImage {
    Arc::new(image)
}

/// Wrap a concrete destination image in a shared handle
pub fn shared_dest(image: impl DestImage + Send + 'static) -> SharedDestImage {
    Arc::new(Mutex::new(image))
}
