//! Direct runtime: scans the whole processing area into bound rasters

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::error::RuntimeError;
use crate::image::{SharedDestImage, SharedSourceImage};
use crate::resolver::ResolvedScript;
use crate::transform::{Bounds, CoordinateTransform};

use super::eval::{run_init, run_pixel, DestWriter, EvalCtx};
use super::{lock_image, DestBinding, SourceBinding, Val, DEFAULT_MAX_LOOP_ITERATIONS};

/// Callback invoked as a scan advances, once per completed row
pub trait ProgressListener {
    fn update(&mut self, done_pixels: u64, total_pixels: u64);
}

/// Snapshot of a finished scan: final image-scope variables and the
/// destination rasters that were written
#[derive(Clone)]
pub struct ScanResult {
    pub vars: HashMap<String, Val>,
    pub destinations: Vec<(String, SharedDestImage)>,
}

/// Runtime that owns its destination rasters and evaluates the script
/// once per destination pixel, row-major.
///
/// Configuration order matters in one place only: a world extent must be
/// set before a default coordinate transform.
pub struct DirectRuntime {
    resolved: Arc<ResolvedScript>,
    sources: HashMap<String, (SharedSourceImage, Option<CoordinateTransform>)>,
    dests: Vec<DestBinding>,
    world: Option<Bounds>,
    /// World units covered by one pixel step, when a world is set
    resolution: (f64, f64),
    default_transform: Option<CoordinateTransform>,
    image_vars: HashMap<String, Val>,
    max_loop_iterations: u64,
    cancel: Arc<AtomicBool>,
}

impl DirectRuntime {
    pub(crate) fn new(resolved: Arc<ResolvedScript>) -> Self {
        Self {
            resolved,
            sources: HashMap::new(),
            dests: Vec::new(),
            world: None,
            resolution: (1.0, 1.0),
            default_transform: None,
            image_vars: HashMap::new(),
            max_loop_iterations: DEFAULT_MAX_LOOP_ITERATIONS,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /* ===================== Configuration ===================== */

    pub fn source_var_names(&self) -> &[String] {
        &self.resolved.source_names
    }

    pub fn destination_var_names(&self) -> &[String] {
        &self.resolved.dest_names
    }

    /// Bind a source raster, addressed through the default transform
    pub fn set_source_image(
        &mut self,
        name: &str,
        image: SharedSourceImage,
    ) -> Result<(), RuntimeError> {
        self.check_source_name(name)?;
        self.sources.insert(name.to_string(), (image, None));
        Ok(())
    }

    /// Bind a source raster with its own world-to-pixel transform
    pub fn set_source_image_with_transform(
        &mut self,
        name: &str,
        image: SharedSourceImage,
        transform: CoordinateTransform,
    ) -> Result<(), RuntimeError> {
        if self.world.is_none() {
            return Err(RuntimeError::WorldNotSet);
        }
        self.check_source_name(name)?;
        self.sources
            .insert(name.to_string(), (image, Some(transform)));
        Ok(())
    }

    /// Bind a destination raster
    pub fn set_destination_image(
        &mut self,
        name: &str,
        image: SharedDestImage,
    ) -> Result<(), RuntimeError> {
        if !self.resolved.dest_names.iter().any(|n| n == name) {
            return Err(RuntimeError::BadArgument(format!(
                "'{}' is not a destination image of this script",
                name
            )));
        }
        self.dests.retain(|b| b.name != name);
        self.dests.push(DestBinding {
            name: name.to_string(),
            image,
        });
        Ok(())
    }

    /// Define the world extent with an explicit pixel step per axis
    pub fn set_world_by_resolution(
        &mut self,
        world: Bounds,
        xres: f64,
        yres: f64,
    ) -> Result<(), RuntimeError> {
        if !world.is_valid() || xres <= 0.0 || yres <= 0.0 {
            return Err(RuntimeError::InvalidWorldBounds);
        }
        self.world = Some(world);
        self.resolution = (xres, yres);
        Ok(())
    }

    /// Define the world extent divided into a fixed number of pixels
    pub fn set_world_by_num_pixels(
        &mut self,
        world: Bounds,
        num_x: usize,
        num_y: usize,
    ) -> Result<(), RuntimeError> {
        if !world.is_valid() || num_x == 0 || num_y == 0 {
            return Err(RuntimeError::InvalidWorldBounds);
        }
        self.world = Some(world);
        self.resolution = (world.width / num_x as f64, world.height / num_y as f64);
        Ok(())
    }

    /// Transform applied to sources bound without one of their own.
    /// Requires a world extent.
    pub fn set_default_transform(
        &mut self,
        transform: CoordinateTransform,
    ) -> Result<(), RuntimeError> {
        if self.world.is_none() {
            return Err(RuntimeError::WorldNotSet);
        }
        self.default_transform = Some(transform);
        Ok(())
    }

    /// Change the per-pixel loop iteration cap
    pub fn set_max_loop_iterations(&mut self, max: u64) {
        self.max_loop_iterations = max;
    }

    /// Flag checked between pixels; setting it aborts the scan with
    /// [`RuntimeError::Cancelled`]. The abort clears the flag again.
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /* ===================== Evaluation ===================== */

    /// Scan every destination pixel, evaluating the script at each one
    pub fn evaluate_all(
        &mut self,
        mut progress: Option<&mut dyn ProgressListener>,
    ) -> Result<(), RuntimeError> {
        let (width, height, min_x, min_y) = self.check_bindings()?;

        let world = self.world.unwrap_or(Bounds::new(
            min_x as f64,
            min_y as f64,
            width as f64,
            height as f64,
        ));
        let (xres, yres) = if self.world.is_some() {
            self.resolution
        } else {
            (1.0, 1.0)
        };

        let default_transform = self
            .default_transform
            .unwrap_or_else(CoordinateTransform::identity);
        let sources: HashMap<String, SourceBinding> = self
            .sources
            .iter()
            .map(|(name, (image, transform))| {
                (
                    name.clone(),
                    SourceBinding {
                        image: Arc::clone(image),
                        transform: transform.unwrap_or(default_transform),
                    },
                )
            })
            .collect();

        debug!(
            width,
            height,
            sources = sources.len(),
            dests = self.dests.len(),
            "starting scan"
        );

        self.image_vars.clear();
        let total = (width as u64) * (height as u64);
        let resolved = Arc::clone(&self.resolved);
        let world_size = (world.width, world.height);

        let mut ctx = EvalCtx {
            program: &resolved.program,
            sources: &sources,
            dest: DestWriter::Rasters(&self.dests),
            image_vars: &mut self.image_vars,
            outside: resolved.outside,
            max_loop_iterations: self.max_loop_iterations,
            wx: world.x,
            wy: world.y,
            px: min_x,
            py: min_y,
            world_size: Some(world_size),
        };
        run_init(&mut ctx)?;

        let mut done: u64 = 0;
        for row in 0..height {
            ctx.wy = world.y + row as f64 * yres;
            ctx.py = min_y + row as i64;
            for col in 0..width {
                if self.cancel.load(Ordering::Relaxed) {
                    // The abort consumes the request so the runtime can
                    // scan again after being reclaimed.
                    self.cancel.store(false, Ordering::Relaxed);
                    return Err(RuntimeError::Cancelled);
                }
                ctx.wx = world.x + col as f64 * xres;
                ctx.px = min_x + col as i64;
                run_pixel(&mut ctx)?;
            }
            done += width as u64;
            if let Some(listener) = progress.as_deref_mut() {
                listener.update(done, total);
            }
        }

        debug!(pixels = total, "scan complete");
        Ok(())
    }

    /// Final value of an image-scope variable, once a scan has run
    pub fn get_var(&self, name: &str) -> Option<&Val> {
        self.image_vars.get(name)
    }

    /// Snapshot the scan outputs
    pub fn scan_result(&self) -> ScanResult {
        ScanResult {
            vars: self.image_vars.clone(),
            destinations: self
                .dests
                .iter()
                .map(|b| (b.name.clone(), Arc::clone(&b.image)))
                .collect(),
        }
    }

    /* ===================== Checks ===================== */

    fn check_source_name(&self, name: &str) -> Result<(), RuntimeError> {
        if !self.resolved.source_names.iter().any(|n| n == name) {
            return Err(RuntimeError::BadArgument(format!(
                "'{}' is not a source image of this script",
                name
            )));
        }
        Ok(())
    }

    /// Verify all declared images are bound and destinations agree on
    /// shape; returns (width, height, min_x, min_y) of the scan area.
    fn check_bindings(&self) -> Result<(usize, usize, i64, i64), RuntimeError> {
        for name in &self.resolved.source_names {
            if !self.sources.contains_key(name) {
                return Err(RuntimeError::ImageNotBound(name.clone()));
            }
        }
        for name in &self.resolved.dest_names {
            if !self.dests.iter().any(|b| b.name == *name) {
                return Err(RuntimeError::ImageNotBound(name.clone()));
            }
        }
        let first = self.dests.first().ok_or(RuntimeError::NoDestination)?;

        let (width, height, min_x, min_y) = {
            let image = lock_image(&*first.image);
            (image.width(), image.height(), image.min_x(), image.min_y())
        };
        for binding in &self.dests[1..] {
            let image = lock_image(&*binding.image);
            if image.width() != width
                || image.height() != height
                || image.min_x() != min_x
                || image.min_y() != min_y
            {
                return Err(RuntimeError::DestinationBoundsMismatch);
            }
        }
        Ok((width, height, min_x, min_y))
    }
}
