//! Coordinate transforms between continuous world space and pixel space
//!
//! Every transform is an affine map applied as
//! `pixel = round(M * world + t)` with round-half-up, so scripts can
//! address images defined over different extents and resolutions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransformError {
    #[error("Degenerate rectangle: width and height must be nonzero")]
    DegenerateRect,
}

/// An axis-aligned rectangle in world or pixel space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the rectangle has usable positive extent
    pub fn is_valid(&self) -> bool {
        self.width > 0.0 && self.height > 0.0 && self.width.is_finite() && self.height.is_finite()
    }
}

/// An immutable world-to-pixel mapping.
///
/// Stored as the six coefficients of a 2D affine map:
/// `px = m00 * wx + m01 * wy + m02`, `py = m10 * wx + m11 * wy + m12`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateTransform {
    m00: f64,
    m01: f64,
    m02: f64,
    m10: f64,
    m11: f64,
    m12: f64,
}

impl CoordinateTransform {
    /// pixel = world
    pub fn identity() -> Self {
        Self::affine(1.0, 0.0, 0.0, 0.0, 1.0, 0.0)
    }

    /// pixel = world + (tx, ty)
    pub fn translation(tx: f64, ty: f64) -> Self {
        Self::affine(1.0, 0.0, tx, 0.0, 1.0, ty)
    }

    /// pixel = world * (sx, sy)
    pub fn scale(sx: f64, sy: f64) -> Self {
        Self::affine(sx, 0.0, 0.0, 0.0, sy, 0.0)
    }

    /// Arbitrary affine map (rotation, shear and friends)
    pub fn affine(m00: f64, m01: f64, m02: f64, m10: f64, m11: f64, m12: f64) -> Self {
        Self {
            m00,
            m01,
            m02,
            m10,
            m11,
            m12,
        }
    }

    /// Maps the unit square [0,1] x [0,1] onto `rect`
    pub fn unit_bounds(rect: Bounds) -> Result<Self, TransformError> {
        if !rect.is_valid() {
            return Err(TransformError::DegenerateRect);
        }
        Ok(Self::affine(
            rect.width, 0.0, rect.x, 0.0, rect.height, rect.y,
        ))
    }

    /// Maps `world` onto `image` linearly per axis.
    ///
    /// A reverse flag mirrors that axis: the world's far edge maps to the
    /// image's near edge. Used for images whose Y axis increases downward
    /// while world Y increases upward.
    pub fn world_to_image(
        world: Bounds,
        image: Bounds,
        reverse_x: bool,
        reverse_y: bool,
    ) -> Result<Self, TransformError> {
        if !world.is_valid() || !image.is_valid() {
            return Err(TransformError::DegenerateRect);
        }

        let sx = image.width / world.width;
        let sy = image.height / world.height;

        let (m00, m02) = if reverse_x {
            (-sx, image.x + (world.x + world.width) * sx)
        } else {
            (sx, image.x - world.x * sx)
        };
        let (m11, m12) = if reverse_y {
            (-sy, image.y + (world.y + world.height) * sy)
        } else {
            (sy, image.y - world.y * sy)
        };

        Ok(Self::affine(m00, 0.0, m02, 0.0, m11, m12))
    }

    /// Map a world position to the pixel that contains it.
    ///
    /// Rounds half-up on both axes: 10.5 and 10.6 both land in pixel 11.
    pub fn world_to_pixel(&self, wx: f64, wy: f64) -> (i64, i64) {
        let px = self.m00 * wx + self.m01 * wy + self.m02;
        let py = self.m10 * wx + self.m11 * wy + self.m12;
        (round_half_up(px), round_half_up(py))
    }
}

pub(crate) fn round_half_up(v: f64) -> i64 {
    (v + 0.5).floor() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let t = CoordinateTransform::identity();
        assert_eq!(t.world_to_pixel(3.0, -4.0), (3, -4));
        assert_eq!(t.world_to_pixel(10.6, 10.4), (11, 10));
        assert_eq!(t.world_to_pixel(10.5, -10.5), (11, -10));
    }

    #[test]
    fn test_translation() {
        let t = CoordinateTransform::translation(10.0, -10.0);
        assert_eq!(t.world_to_pixel(100.0, 100.0), (110, 90));
    }

    #[test]
    fn test_scale() {
        let t = CoordinateTransform::scale(0.1, 0.2);
        assert_eq!(t.world_to_pixel(100.0, 100.0), (10, 20));
    }

    #[test]
    fn test_unit_bounds_corners() {
        let rect = Bounds::new(5.0, 10.0, 20.0, 40.0);
        let t = CoordinateTransform::unit_bounds(rect).unwrap();
        assert_eq!(t.world_to_pixel(0.0, 0.0), (5, 10));
        assert_eq!(t.world_to_pixel(1.0, 1.0), (25, 50));
    }

    #[test]
    fn test_unit_bounds_rejects_degenerate_rect() {
        let rect = Bounds::new(0.0, 0.0, 0.0, 10.0);
        assert_eq!(
            CoordinateTransform::unit_bounds(rect),
            Err(TransformError::DegenerateRect)
        );
    }

    #[test]
    fn test_world_to_image() {
        let world = Bounds::new(0.0, 0.0, 100.0, 100.0);
        let image = Bounds::new(0.0, 0.0, 10.0, 10.0);
        let t = CoordinateTransform::world_to_image(world, image, false, false).unwrap();
        assert_eq!(t.world_to_pixel(0.0, 0.0), (0, 0));
        assert_eq!(t.world_to_pixel(100.0, 100.0), (10, 10));
        assert_eq!(t.world_to_pixel(50.0, 10.0), (5, 1));
    }

    #[test]
    fn test_world_to_image_reversed_y() {
        // World Y grows upward, image Y grows downward.
        let world = Bounds::new(0.0, 0.0, 100.0, 100.0);
        let image = Bounds::new(0.0, 0.0, 10.0, 10.0);
        let t = CoordinateTransform::world_to_image(world, image, false, true).unwrap();
        assert_eq!(t.world_to_pixel(0.0, 100.0), (0, 0));
        assert_eq!(t.world_to_pixel(0.0, 0.0), (0, 10));
    }

    #[test]
    fn test_affine_rotation() {
        // 90-degree counter-clockwise rotation: (x, y) -> (-y, x)
        let t = CoordinateTransform::affine(0.0, -1.0, 0.0, 1.0, 0.0, 0.0);
        assert_eq!(t.world_to_pixel(3.0, 2.0), (-2, 3));
    }
}
