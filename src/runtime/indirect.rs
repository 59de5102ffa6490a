//! Indirect runtime: evaluates one position per call into a caller buffer

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::RuntimeError;
use crate::image::SharedSourceImage;
use crate::resolver::ResolvedScript;
use crate::transform::{Bounds, CoordinateTransform};

use super::eval::{run_init, run_pixel, DestWriter, EvalCtx};
use super::{SourceBinding, Val, DEFAULT_MAX_LOOP_ITERATIONS};

/// Runtime that computes values on demand instead of scanning.
///
/// Each [`evaluate`](IndirectRuntime::evaluate) call takes a world
/// position and fills `out` with band 0 of every destination variable,
/// in declaration order. The caller owns all output storage.
pub struct IndirectRuntime {
    resolved: Arc<ResolvedScript>,
    sources: HashMap<String, (SharedSourceImage, Option<CoordinateTransform>)>,
    world: Option<Bounds>,
    default_transform: Option<CoordinateTransform>,
    image_vars: HashMap<String, Val>,
    init_done: bool,
    max_loop_iterations: u64,
}

impl IndirectRuntime {
    pub(crate) fn new(resolved: Arc<ResolvedScript>) -> Self {
        Self {
            resolved,
            sources: HashMap::new(),
            world: None,
            default_transform: None,
            image_vars: HashMap::new(),
            init_done: false,
            max_loop_iterations: DEFAULT_MAX_LOOP_ITERATIONS,
        }
    }

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

    /// Bind a source raster with its own world-to-pixel transform.
    /// Requires a world extent.
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

    /// Evaluate the script at world position `(x, y)`.
    ///
    /// `out` must hold at least one slot per destination variable. Slots
    /// the script does not write stay NoData.
    pub fn evaluate(&mut self, x: f64, y: f64, out: &mut [f64]) -> Result<(), RuntimeError> {
        let needed = self.resolved.dest_names.len();
        if out.len() < needed {
            return Err(RuntimeError::ResultsTooSmall {
                needed,
                got: out.len(),
            });
        }
        for name in &self.resolved.source_names {
            if !self.sources.contains_key(name) {
                return Err(RuntimeError::ImageNotBound(name.clone()));
            }
        }

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

        for slot in out[..needed].iter_mut() {
            *slot = f64::NAN;
        }

        let world_size = self.world.map(|w| (w.width, w.height));
        let (px, py) = default_transform.world_to_pixel(x, y);
        let resolved = Arc::clone(&self.resolved);

        let mut ctx = EvalCtx {
            program: &resolved.program,
            sources: &sources,
            dest: DestWriter::Buffer {
                names: &resolved.dest_names,
                out: &mut out[..needed],
            },
            image_vars: &mut self.image_vars,
            outside: resolved.outside,
            max_loop_iterations: self.max_loop_iterations,
            wx: x,
            wy: y,
            px,
            py,
            world_size,
        };

        if !self.init_done {
            run_init(&mut ctx)?;
            self.init_done = true;
        }

        run_pixel(&mut ctx)
    }

    /// Current value of an image-scope variable
    pub fn get_var(&self, name: &str) -> Option<&Val> {
        self.image_vars.get(name)
    }

    fn check_source_name(&self, name: &str) -> Result<(), RuntimeError> {
        if !self.resolved.source_names.iter().any(|n| n == name) {
            return Err(RuntimeError::BadArgument(format!(
                "'{}' is not a source image of this script",
                name
            )));
        }
        Ok(())
    }
}
