//! Polygon tessellation for CityGML surface meshes.
//!
//! CityGML polygons are planar faces made of one exterior contour and any
//! number of interior (hole) contours, expressed with 3-d coordinates. This
//! crate turns such a face into an indexed triangle list suitable for
//! rendering or export:
//!
//! * feed the contours to a [`Tessellator`](struct.Tessellator.html)
//!   (exterior first, holes after),
//! * `compute()` fills the face with the odd (even-odd) winding rule,
//! * read back a vertex list and a flat list of triangle indices.
//!
//! The output vertex list is exactly the union of the accepted input
//! contours: holes are connected to the exterior contour with index bridges,
//! so no new positions are synthesized.
//!
//! ```
//! use citygml_tess::Tessellator;
//! use citygml_tess::math::{point, vector};
//!
//! let mut tess = Tessellator::new();
//! tess.begin(4, vector(0.0, 0.0, 1.0));
//! tess.add_contour(&[
//!     point(0.0, 0.0, 0.0),
//!     point(1.0, 0.0, 0.0),
//!     point(1.0, 1.0, 0.0),
//!     point(0.0, 1.0, 0.0),
//! ]);
//! tess.compute().unwrap();
//! assert_eq!(tess.indices().len(), 6);
//! ```

pub mod math {
    //! Shared geometric types, aliased from euclid.

    /// Double-precision 3-d point used for contour vertices.
    pub type Point = euclid::default::Point3D<f64>;

    /// Double-precision 3-d vector.
    pub type Vector = euclid::default::Vector3D<f64>;

    /// Shorthand for `Point::new`.
    #[inline]
    pub fn point(x: f64, y: f64, z: f64) -> Point {
        Point::new(x, y, z)
    }

    /// Shorthand for `Vector::new`.
    #[inline]
    pub fn vector(x: f64, y: f64, z: f64) -> Vector {
        Vector::new(x, y, z)
    }
}

mod tessellator;


pub use crate::tessellator::Tessellator;

/// The primitive kinds the fill stage hands to the triangle emitter.
///
/// The emitter flattens everything into loose triangles, so consumers of the
/// tessellator only ever see a triangle list.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Primitive {
    Triangles,
    TriangleFan,
    TriangleStrip,
}

/// The reasons a fill computation can give up on a polygon.
///
/// A failed polygon keeps its vertex list (the union of the contours fed in)
/// but ends up with no triangle indices.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TessError {
    /// The contours do not span a plane, so no projection exists.
    DegeneratePolygon,
    /// A hole contour could not be connected to the exterior contour.
    UnreachableHole,
    /// The fill could not consume the whole contour, usually because the
    /// input self-intersects.
    Incomplete,
}
