//! Geometric types shared across the crate, aliased from euclid.
//!
//! Positions are double precision (CityGML coordinates routinely live in
//! projected CRS ranges), everything derived from them - normals, texture
//! coordinates, colors - is single precision.

/// Double-precision 3-d point used for vertex positions and envelope bounds.
pub type Point3 = euclid::default::Point3D<f64>;

/// Double-precision 3-d vector.
pub type Vector3 = euclid::default::Vector3D<f64>;

/// Single-precision 3-d vector used for normals and color triples.
pub type Vec3f = euclid::default::Vector3D<f32>;

/// Single-precision 2-d texture coordinate.
pub type TexCoord = euclid::default::Point2D<f32>;

/// Shorthand for `Point3::new`.
#[inline]
pub fn point3(x: f64, y: f64, z: f64) -> Point3 {
    Point3::new(x, y, z)
}

/// Shorthand for `Vec3f::new`.
#[inline]
pub fn vec3f(x: f32, y: f32, z: f32) -> Vec3f {
    Vec3f::new(x, y, z)
}

/// An RGBA color with components in `[0, 1]`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Color { r, g, b, a }
    }

    /// An opaque color from 8-bit channels.
    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Color {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
            a: 1.0,
        }
    }
}
