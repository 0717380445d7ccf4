//! A streaming reader for CityGML documents (versions 0.3 to 1.0).
//!
//! CityGML is an OGC XML schema for 3-d city models: semantically typed
//! city objects (buildings, roads, vegetation, ...) carrying geometry at up
//! to five levels of detail, plus surface appearances (materials and
//! textures) declared in separate blocks and attached by `gml:id`
//! references.
//!
//! This crate ingests such a document in one streaming pass and returns a
//! [`CityModel`](model/struct.CityModel.html): a tree of typed city objects
//! whose polygons are triangulated (see the companion `citygml_tess` crate),
//! carry per-vertex normals and, where the document provides them, texture
//! coordinates and resolved appearances. Downstream converters walk the
//! model to emit other 3-d formats.
//!
//! # Loading a document
//!
//! ```no_run
//! use citygml::{load, CityObjectsMask, ParserOptions};
//!
//! let options = ParserOptions::new()
//!     .with_objects_mask(CityObjectsMask::from_expression("All&~LandUse"))
//!     .with_min_lod(2);
//! let model = load("frankfurt.gml", &options).unwrap();
//! for &id in model.roots() {
//!     println!("{}", model.object(id));
//! }
//! ```
//!
//! Filtering happens while the document streams by: masked-out object
//! classes and out-of-range LODs never materialize geometry. Malformed
//! pieces of an otherwise readable document degrade locally and are
//! reported through the `log` facade; only a malformed XML stream makes
//! `load` fail.

pub mod appearance;
pub mod math;
pub mod model;
mod parser;


pub use citygml_tess as tess;

pub use crate::appearance::{Appearance, AppearanceId, AppearanceResolver, Material, Texture};
pub use crate::model::{
    CityModel, CityObject, CityObjectId, CityObjectsMask, CityObjectsType, Envelope, Geometry,
    GeometryType, LinearRing, Polygon,
};
pub use crate::parser::{load, load_from, Error, ParserOptions};
