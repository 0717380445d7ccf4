//! The in-memory city model: typed city objects, their geometric boundaries
//! and the post-parse finalization passes.
//!
//! Ownership is strictly top down. The [`CityModel`](struct.CityModel.html)
//! is an arena for city objects (addressed by `CityObjectId`); each object
//! owns its geometries by value, each geometry its polygons, and each
//! polygon its rings while the document is being read. Finalizing a polygon
//! consumes the rings and leaves the flat vertex/normal/index arrays behind.
//! Appearances are owned by the model's resolver and referenced through
//! `AppearanceId`, so the graph has no ownership cycles.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use citygml_tess::Tessellator;
use log::warn;

use crate::appearance::{Appearance, AppearanceId, AppearanceResolver};
use crate::math::{Color, Point3, TexCoord, Vec3f, Vector3};

// Consecutive ring vertices closer than this (squared) are duplicates.
const RING_EPSILON_SQ: f64 = 1e-8;

/// An axis-aligned bounding box.
///
/// `lower <= upper` holds componentwise once the model is finalized; it is
/// not enforced at construction.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Envelope {
    pub lower: Point3,
    pub upper: Point3,
}

impl Envelope {
    pub fn new(lower: Point3, upper: Point3) -> Self {
        Envelope { lower, upper }
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Envelope {
            lower: Point3::origin(),
            upper: Point3::origin(),
        }
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "({} {} {}) ({} {} {})",
            self.lower.x, self.lower.y, self.lower.z, self.upper.x, self.upper.y, self.upper.z
        )
    }
}

/// An ordered contour of 3-d vertices, exterior or interior.
#[derive(Clone, Debug)]
pub struct LinearRing {
    id: String,
    exterior: bool,
    vertices: Vec<Point3>,
}

impl LinearRing {
    pub fn new(id: String, exterior: bool) -> Self {
        LinearRing {
            id,
            exterior,
            vertices: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_exterior(&self) -> bool {
        self.exterior
    }

    pub fn vertices(&self) -> &[Point3] {
        &self.vertices
    }

    pub fn add_vertex(&mut self, v: Point3) {
        self.vertices.push(v);
    }

    pub(crate) fn into_vertices(self) -> Vec<Point3> {
        self.vertices
    }

    /// Remove consecutive duplicate vertices (the ring is treated as closed,
    /// so the last/first pair counts) until none remain.
    pub fn finish(&mut self) {
        loop {
            let len = self.vertices.len();
            if len < 2 {
                return;
            }
            let mut duplicate = None;
            for i in 0..len {
                let j = (i + 1) % len;
                if (self.vertices[i] - self.vertices[j]).square_length() < RING_EPSILON_SQ {
                    duplicate = Some(i);
                    break;
                }
            }
            match duplicate {
                Some(i) => {
                    self.vertices.remove(i);
                }
                None => return,
            }
        }
    }

    /// The ring normal by Newell's method, normalized.
    ///
    /// Returns the zero vector for rings of fewer than 3 vertices or fully
    /// degenerate ones.
    pub fn compute_normal(&self) -> Vector3 {
        let len = self.vertices.len();
        if len < 3 {
            return Vector3::zero();
        }
        let mut n = Vector3::zero();
        for i in 0..len {
            let p = self.vertices[i];
            let q = self.vertices[(i + 1) % len];
            n.x += (p.y - q.y) * (p.z + q.z);
            n.y += (p.z - q.z) * (p.x + q.x);
            n.z += (p.x - q.x) * (p.y + q.y);
        }
        if n.square_length() < 1e-24 {
            return Vector3::zero();
        }
        n.normalize()
    }
}

/// A planar face: one optional exterior ring plus interior rings before
/// finalization, flat vertex/normal/index arrays after.
#[derive(Clone, Debug, Default)]
pub struct Polygon {
    id: String,
    vertices: Vec<Point3>,
    normals: Vec<Vec3f>,
    indices: Vec<u32>,
    tex_coords: Option<Vec<TexCoord>>,
    appearance: Option<AppearanceId>,
    exterior_ring: Option<LinearRing>,
    interior_rings: Vec<LinearRing>,
    negate_normal: bool,
}

impl Polygon {
    pub fn new(id: String) -> Self {
        Polygon {
            id,
            ..Self::default()
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn vertices(&self) -> &[Point3] {
        &self.vertices
    }

    /// Per-vertex normals; every entry equals the face normal.
    pub fn normals(&self) -> &[Vec3f] {
        &self.normals
    }

    /// Triangle-list indices, three per triangle.
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn tex_coords(&self) -> Option<&[TexCoord]> {
        self.tex_coords.as_deref()
    }

    pub fn appearance(&self) -> Option<AppearanceId> {
        self.appearance
    }

    /// Record the orientation of the enclosing surface element; `-` flips
    /// the computed normal.
    pub fn set_negate_normal(&mut self, negate: bool) {
        self.negate_normal = negate;
    }

    /// Take ownership of a finished ring; the exterior slot holds at most
    /// one.
    pub fn add_ring(&mut self, mut ring: LinearRing) {
        ring.finish();
        if ring.is_exterior() {
            self.exterior_ring = Some(ring);
        } else {
            self.interior_rings.push(ring);
        }
    }

    /// The face normal: Newell's method over the exterior ring, flipped when
    /// the enclosing surface was negatively oriented.
    pub fn compute_normal(&self) -> Vector3 {
        let n = self
            .exterior_ring
            .as_ref()
            .map_or(Vector3::zero(), |r| r.compute_normal());
        if self.negate_normal {
            -n
        } else {
            n
        }
    }

    /// Consume the rings into the final mesh arrays.
    pub fn build(&mut self, triangulate: bool, tess: &mut Tessellator) {
        let normal = self.compute_normal();
        if triangulate {
            self.tessellate(tess, normal);
        } else {
            self.merge_rings();
        }
        let n = normal.cast::<f32>();
        self.normals = vec![n; self.vertices.len()];
    }

    fn tessellate(&mut self, tess: &mut Tessellator, normal: Vector3) {
        self.indices.clear();

        let exterior_len = self.exterior_ring.as_ref().map_or(0, |r| r.vertices().len());
        if exterior_len < 3 {
            warn!("citygml: degenerate exterior ring on polygon {}", self.id);
            self.merge_rings();
            return;
        }

        let total = exterior_len
            + self
                .interior_rings
                .iter()
                .map(|r| r.vertices().len())
                .sum::<usize>();
        tess.begin(total, normal);
        if let Some(ring) = &self.exterior_ring {
            tess.add_contour(ring.vertices());
        }
        for ring in &self.interior_rings {
            tess.add_contour(ring.vertices());
        }

        match tess.compute() {
            Ok(()) => {
                self.vertices = tess.vertices().to_vec();
                self.indices = tess.indices().to_vec();
            }
            Err(e) => {
                warn!("citygml: cannot triangulate polygon {}: {:?}", self.id, e);
                self.vertices = tess.vertices().to_vec();
                self.indices.clear();
            }
        }
        self.clear_rings();
    }

    // The pass-through path: concatenate the ring vertices and index them as
    // a trivial fan.
    fn merge_rings(&mut self) {
        if let Some(ring) = self.exterior_ring.take() {
            self.vertices.extend(ring.into_vertices());
        }
        for ring in self.interior_rings.drain(..) {
            self.vertices.extend(ring.into_vertices());
        }
        self.indices.clear();
        if self.vertices.len() < 3 {
            return;
        }
        for i in 1..self.vertices.len() as u32 - 1 {
            self.indices.push(0);
            self.indices.push(i);
            self.indices.push(i + 1);
        }
    }

    fn clear_rings(&mut self) {
        self.exterior_ring = None;
        self.interior_rings.clear();
    }

    /// Bind the appearance and texture coordinates recorded for this polygon
    /// (or, failing that, for its geometry) by the resolver.
    pub(crate) fn resolve_appearance(
        &mut self,
        resolver: &AppearanceResolver,
        geometry_id: &str,
        fallback: Option<AppearanceId>,
    ) {
        let coords = resolver
            .tex_coords(&self.id)
            .or_else(|| resolver.tex_coords(geometry_id));
        if let Some(coords) = coords {
            let mut coords = coords.to_vec();
            coords.resize(self.vertices.len(), TexCoord::origin());
            self.tex_coords = Some(coords);
        }
        self.appearance = resolver.appearance_id(&self.id).or(fallback);
    }

    /// Append `other`'s mesh to this polygon, leaving `other` empty.
    ///
    /// Only polygons with the same appearance reference may merge (both
    /// unset counts as the same). Existing texture coordinates are padded,
    /// never truncated.
    pub fn merge(&mut self, other: &mut Polygon) -> bool {
        if self.appearance != other.appearance {
            return false;
        }
        let offset = self.vertices.len();
        let added = other.vertices.len();
        self.vertices.append(&mut other.vertices);
        self.normals.append(&mut other.normals);
        if self.tex_coords.is_some() || other.tex_coords.is_some() {
            let coords = self.tex_coords.get_or_insert_with(Vec::new);
            coords.resize(offset, TexCoord::origin());
            match other.tex_coords.take() {
                Some(mut more) => {
                    more.resize(added, TexCoord::origin());
                    coords.append(&mut more);
                }
                None => coords.resize(offset + added, TexCoord::origin()),
            }
        }
        self.indices
            .extend(other.indices.drain(..).map(|i| i + offset as u32));
        self.id = format!("{}+{}", self.id, other.id);
        true
    }
}

/// The semantic type of a geometry's surfaces.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GeometryType {
    Unknown,
    Roof,
    Wall,
    Ground,
    Closure,
    Floor,
    InteriorWall,
    Ceiling,
}

impl Default for GeometryType {
    fn default() -> Self {
        GeometryType::Unknown
    }
}

/// A LOD-tagged collection of polygons sharing a semantic type.
#[derive(Clone, Debug)]
pub struct Geometry {
    id: String,
    geometry_type: GeometryType,
    lod: u8,
    polygons: Vec<Polygon>,
}

impl Geometry {
    pub fn new(id: String, geometry_type: GeometryType, lod: u8) -> Self {
        Geometry {
            id,
            geometry_type,
            lod,
            polygons: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn geometry_type(&self) -> GeometryType {
        self.geometry_type
    }

    pub fn lod(&self) -> u8 {
        self.lod
    }

    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    pub fn add_polygon(&mut self, polygon: Polygon) {
        self.polygons.push(polygon);
    }

    /// Move every polygon of `other` into this geometry. Requires matching
    /// LOD and semantic type.
    pub fn merge(&mut self, other: &mut Geometry) -> bool {
        if self.lod != other.lod || self.geometry_type != other.geometry_type {
            return false;
        }
        self.polygons.append(&mut other.polygons);
        self.id = format!("{}+{}", self.id, other.id);
        true
    }

    pub(crate) fn finish(
        &mut self,
        resolver: &AppearanceResolver,
        fallback: Option<AppearanceId>,
        optimize: bool,
    ) {
        let own = resolver.appearance_id(&self.id).or(fallback);
        for polygon in &mut self.polygons {
            polygon.resolve_appearance(resolver, &self.id, own);
        }
        if optimize {
            merge_pairs(&mut self.polygons, |a, b| a.merge(b));
        }
    }
}

bitflags::bitflags! {
    /// A selection of city-object classes, used to filter a document while
    /// it is being read.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct CityObjectsMask: u32 {
        const GENERIC_CITY_OBJECT          = 1 << 0;
        const BUILDING                     = 1 << 1;
        const ROOM                         = 1 << 2;
        const BUILDING_INSTALLATION        = 1 << 3;
        const BUILDING_FURNITURE           = 1 << 4;
        const CITY_FURNITURE               = 1 << 5;
        const TRACK                        = 1 << 6;
        const ROAD                         = 1 << 7;
        const RAILWAY                      = 1 << 8;
        const SQUARE                       = 1 << 9;
        const PLANT_COVER                  = 1 << 10;
        const SOLITARY_VEGETATION_OBJECT   = 1 << 11;
        const WATER_BODY                   = 1 << 12;
        const TIN_RELIEF                   = 1 << 13;
        const LAND_USE                     = 1 << 14;
        const DOOR                         = 1 << 15;
        const WINDOW                       = 1 << 16;
        const BUILDING_PART                = 1 << 17;
        const TUNNEL                       = 1 << 18;
        const BRIDGE                       = 1 << 19;
        const BRIDGE_PART                  = 1 << 20;
        const BRIDGE_CONSTRUCTION_ELEMENT  = 1 << 21;
        const BRIDGE_INSTALLATION          = 1 << 22;
    }
}

impl CityObjectsMask {
    /// Parse a mask expression: class names joined with `|` or `&`, a `~` or
    /// `!` prefix negating a name, and `All` standing for every class.
    ///
    /// `"Building|Road"` selects two classes, `"All&~LandUse"` everything
    /// but one. Unknown names are reported and contribute nothing.
    pub fn from_expression(expression: &str) -> CityObjectsMask {
        let mut mask = CityObjectsMask::empty();
        let mut op = '|';
        let mut token = String::new();
        for c in expression.chars().chain(std::iter::once('|')) {
            if c == '|' || c == '&' {
                apply_token(&mut mask, op, token.trim());
                token.clear();
                op = c;
            } else {
                token.push(c);
            }
        }
        mask
    }
}

fn apply_token(mask: &mut CityObjectsMask, op: char, token: &str) {
    if token.is_empty() {
        return;
    }
    let (negated, name) = match token.strip_prefix('~').or_else(|| token.strip_prefix('!')) {
        Some(rest) => (true, rest.trim()),
        None => (false, token),
    };
    let mut flag = match mask_from_name(name) {
        Some(flag) => flag,
        None => {
            warn!("citygml: unknown city object class {:?} in mask expression", name);
            return;
        }
    };
    if negated {
        flag = !flag;
    }
    match op {
        '&' => *mask &= flag,
        _ => *mask |= flag,
    }
}

fn mask_from_name(name: &str) -> Option<CityObjectsMask> {
    if name == "All" {
        return Some(CityObjectsMask::all());
    }
    CityObjectsType::ALL
        .iter()
        .find(|t| t.name() == name)
        .map(|t| t.mask())
}

impl fmt::Display for CityObjectsMask {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for t in CityObjectsType::ALL.iter() {
            if self.contains(t.mask()) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", t.name())?;
                first = false;
            }
        }
        Ok(())
    }
}

/// The semantic class of a city object.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CityObjectsType {
    GenericCityObject,
    Building,
    Room,
    BuildingInstallation,
    BuildingFurniture,
    CityFurniture,
    Track,
    Road,
    Railway,
    Square,
    PlantCover,
    SolitaryVegetationObject,
    WaterBody,
    TINRelief,
    LandUse,
    Door,
    Window,
    BuildingPart,
    Tunnel,
    Bridge,
    BridgePart,
    BridgeConstructionElement,
    BridgeInstallation,
}

impl CityObjectsType {
    pub const ALL: [CityObjectsType; 23] = [
        CityObjectsType::GenericCityObject,
        CityObjectsType::Building,
        CityObjectsType::Room,
        CityObjectsType::BuildingInstallation,
        CityObjectsType::BuildingFurniture,
        CityObjectsType::CityFurniture,
        CityObjectsType::Track,
        CityObjectsType::Road,
        CityObjectsType::Railway,
        CityObjectsType::Square,
        CityObjectsType::PlantCover,
        CityObjectsType::SolitaryVegetationObject,
        CityObjectsType::WaterBody,
        CityObjectsType::TINRelief,
        CityObjectsType::LandUse,
        CityObjectsType::Door,
        CityObjectsType::Window,
        CityObjectsType::BuildingPart,
        CityObjectsType::Tunnel,
        CityObjectsType::Bridge,
        CityObjectsType::BridgePart,
        CityObjectsType::BridgeConstructionElement,
        CityObjectsType::BridgeInstallation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CityObjectsType::GenericCityObject => "GenericCityObject",
            CityObjectsType::Building => "Building",
            CityObjectsType::Room => "Room",
            CityObjectsType::BuildingInstallation => "BuildingInstallation",
            CityObjectsType::BuildingFurniture => "BuildingFurniture",
            CityObjectsType::CityFurniture => "CityFurniture",
            CityObjectsType::Track => "Track",
            CityObjectsType::Road => "Road",
            CityObjectsType::Railway => "Railway",
            CityObjectsType::Square => "Square",
            CityObjectsType::PlantCover => "PlantCover",
            CityObjectsType::SolitaryVegetationObject => "SolitaryVegetationObject",
            CityObjectsType::WaterBody => "WaterBody",
            CityObjectsType::TINRelief => "TINRelief",
            CityObjectsType::LandUse => "LandUse",
            CityObjectsType::Door => "Door",
            CityObjectsType::Window => "Window",
            CityObjectsType::BuildingPart => "BuildingPart",
            CityObjectsType::Tunnel => "Tunnel",
            CityObjectsType::Bridge => "Bridge",
            CityObjectsType::BridgePart => "BridgePart",
            CityObjectsType::BridgeConstructionElement => "BridgeConstructionElement",
            CityObjectsType::BridgeInstallation => "BridgeInstallation",
        }
    }

    pub fn mask(self) -> CityObjectsMask {
        match self {
            CityObjectsType::GenericCityObject => CityObjectsMask::GENERIC_CITY_OBJECT,
            CityObjectsType::Building => CityObjectsMask::BUILDING,
            CityObjectsType::Room => CityObjectsMask::ROOM,
            CityObjectsType::BuildingInstallation => CityObjectsMask::BUILDING_INSTALLATION,
            CityObjectsType::BuildingFurniture => CityObjectsMask::BUILDING_FURNITURE,
            CityObjectsType::CityFurniture => CityObjectsMask::CITY_FURNITURE,
            CityObjectsType::Track => CityObjectsMask::TRACK,
            CityObjectsType::Road => CityObjectsMask::ROAD,
            CityObjectsType::Railway => CityObjectsMask::RAILWAY,
            CityObjectsType::Square => CityObjectsMask::SQUARE,
            CityObjectsType::PlantCover => CityObjectsMask::PLANT_COVER,
            CityObjectsType::SolitaryVegetationObject => {
                CityObjectsMask::SOLITARY_VEGETATION_OBJECT
            }
            CityObjectsType::WaterBody => CityObjectsMask::WATER_BODY,
            CityObjectsType::TINRelief => CityObjectsMask::TIN_RELIEF,
            CityObjectsType::LandUse => CityObjectsMask::LAND_USE,
            CityObjectsType::Door => CityObjectsMask::DOOR,
            CityObjectsType::Window => CityObjectsMask::WINDOW,
            CityObjectsType::BuildingPart => CityObjectsMask::BUILDING_PART,
            CityObjectsType::Tunnel => CityObjectsMask::TUNNEL,
            CityObjectsType::Bridge => CityObjectsMask::BRIDGE,
            CityObjectsType::BridgePart => CityObjectsMask::BRIDGE_PART,
            CityObjectsType::BridgeConstructionElement => {
                CityObjectsMask::BRIDGE_CONSTRUCTION_ELEMENT
            }
            CityObjectsType::BridgeInstallation => CityObjectsMask::BRIDGE_INSTALLATION,
        }
    }

    fn default_color(self) -> Color {
        match self {
            CityObjectsType::Building
            | CityObjectsType::BuildingPart
            | CityObjectsType::Room
            | CityObjectsType::BuildingInstallation
            | CityObjectsType::BuildingFurniture
            | CityObjectsType::CityFurniture => Color::from_rgb(186, 184, 135),
            CityObjectsType::Door => Color::from_rgb(145, 53, 13),
            CityObjectsType::Window => Color::new(0.58, 0.67, 0.82, 0.6),
            CityObjectsType::WaterBody => Color::from_rgb(48, 133, 187),
            CityObjectsType::PlantCover => Color::from_rgb(0, 184, 0),
            CityObjectsType::SolitaryVegetationObject => Color::from_rgb(10, 184, 10),
            CityObjectsType::Track => Color::from_rgb(171, 131, 46),
            CityObjectsType::Road | CityObjectsType::Square => Color::from_rgb(159, 159, 159),
            CityObjectsType::Railway => Color::from_rgb(180, 180, 180),
            CityObjectsType::TINRelief => Color::from_rgb(100, 230, 10),
            CityObjectsType::LandUse => Color::from_rgb(10, 230, 1),
            CityObjectsType::GenericCityObject => Color::from_rgb(100, 130, 0),
            CityObjectsType::Tunnel => Color::from_rgb(180, 180, 150),
            CityObjectsType::Bridge
            | CityObjectsType::BridgePart
            | CityObjectsType::BridgeConstructionElement
            | CityObjectsType::BridgeInstallation => Color::from_rgb(190, 190, 185),
        }
    }
}

impl fmt::Display for CityObjectsType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An index into the model's city-object arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CityObjectId(pub u32);

/// A semantically typed city entity holding geometries and child objects.
#[derive(Clone, Debug)]
pub struct CityObject {
    id: String,
    object_type: CityObjectsType,
    envelope: Envelope,
    properties: HashMap<String, String>,
    geometries: Vec<Geometry>,
    children: Vec<CityObjectId>,
}

impl CityObject {
    pub fn new(id: String, object_type: CityObjectsType) -> Self {
        CityObject {
            id,
            object_type,
            envelope: Envelope::default(),
            properties: HashMap::new(),
            geometries: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn object_type(&self) -> CityObjectsType {
        self.object_type
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn geometries(&self) -> &[Geometry] {
        &self.geometries
    }

    pub fn children(&self) -> &[CityObjectId] {
        &self.children
    }

    pub fn prop(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn set_prop(&mut self, name: &str, value: String) {
        self.properties.insert(name.to_string(), value);
    }

    /// The default diffuse color of this object's class.
    ///
    /// LandUse consults its `class` property for the land-use band before
    /// falling back to the generic color.
    pub fn default_color(&self) -> Color {
        if self.object_type == CityObjectsType::LandUse {
            if let Some(class) = self.prop("class").and_then(|c| c.parse::<u32>().ok()) {
                match class {
                    1000 => return Color::from_rgb(150, 143, 134), // settlement
                    1100 => return Color::from_rgb(133, 83, 101),  // undeveloped
                    2000 => return Color::from_rgb(159, 159, 159), // traffic
                    3000 => return Color::from_rgb(79, 212, 53),   // vegetation
                    4000 => return Color::from_rgb(67, 109, 247),  // water
                    _ => {}
                }
            }
        }
        self.object_type.default_color()
    }

    pub(crate) fn set_envelope(&mut self, envelope: Envelope) {
        self.envelope = envelope;
    }

    pub(crate) fn add_geometry(&mut self, geometry: Geometry) {
        self.geometries.push(geometry);
    }

    pub(crate) fn add_child(&mut self, child: CityObjectId) {
        self.children.push(child);
    }

    pub(crate) fn finish(&mut self, resolver: &AppearanceResolver, optimize: bool) {
        let own = resolver.appearance_id(&self.id);
        for geometry in &mut self.geometries {
            geometry.finish(resolver, own, optimize);
        }
        if optimize {
            merge_pairs(&mut self.geometries, |a, b| a.merge(b));
        }
    }
}

impl fmt::Display for CityObject {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}: {}", self.object_type, self.id)?;
        writeln!(f, "  BBox: {}", self.envelope)?;
        let mut props: Vec<_> = self.properties.iter().collect();
        props.sort();
        for (name, value) in props {
            writeln!(f, "  + {}: {}", name, value)?;
        }
        for geometry in &self.geometries {
            write!(f, "{}", geometry)?;
        }
        writeln!(f, "  * {} geometries.", self.geometries.len())
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let vertices: usize = self.polygons.iter().map(|p| p.vertices().len()).sum();
        writeln!(
            f,
            "  @ {} polys [{} vertices]",
            self.polygons.len(),
            vertices
        )
    }
}

/// The root container: every parsed entity is owned, directly or
/// transitively, by the model.
#[derive(Debug, Default)]
pub struct CityModel {
    id: String,
    envelope: Envelope,
    objects: Vec<CityObject>,
    objects_by_type: BTreeMap<CityObjectsType, Vec<CityObjectId>>,
    roots: Vec<CityObjectId>,
    resolver: AppearanceResolver,
}

impl CityModel {
    pub fn new(id: String) -> Self {
        CityModel {
            id,
            ..Self::default()
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Every city object in the model, in insertion order.
    pub fn objects(&self) -> &[CityObject] {
        &self.objects
    }

    pub fn object(&self, id: CityObjectId) -> &CityObject {
        &self.objects[id.0 as usize]
    }

    /// The objects of one class, in document order.
    pub fn objects_of_type(&self, object_type: CityObjectsType) -> &[CityObjectId] {
        self.objects_by_type
            .get(&object_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The objects that have no parent.
    pub fn roots(&self) -> &[CityObjectId] {
        &self.roots
    }

    /// The total number of city objects.
    pub fn size(&self) -> usize {
        self.objects.len()
    }

    pub fn appearances(&self) -> &[Appearance] {
        self.resolver.appearances()
    }

    pub fn appearance(&self, id: AppearanceId) -> &Appearance {
        self.resolver.appearance(id)
    }

    pub(crate) fn resolver_mut(&mut self) -> &mut AppearanceResolver {
        &mut self.resolver
    }

    pub(crate) fn set_envelope(&mut self, envelope: Envelope) {
        self.envelope = envelope;
    }

    pub(crate) fn add_object(&mut self, object: CityObject) -> CityObjectId {
        let id = CityObjectId(self.objects.len() as u32);
        self.objects_by_type
            .entry(object.object_type())
            .or_insert_with(Vec::new)
            .push(id);
        self.objects.push(object);
        id
    }

    pub(crate) fn add_root(&mut self, id: CityObjectId) {
        self.roots.push(id);
    }

    /// Bind appearances onto every polygon, optionally run the merge passes,
    /// and drop the resolver's scratch maps.
    pub(crate) fn finish(&mut self, optimize: bool) {
        let resolver = &self.resolver;
        for object in &mut self.objects {
            object.finish(resolver, optimize);
        }
        self.resolver.finish();
    }
}

impl fmt::Display for CityModel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for ids in self.objects_by_type.values() {
            for &id in ids {
                write!(f, "{}", self.object(id))?;
            }
        }
        writeln!(f, "{} city objects.", self.size())
    }
}

// Repeatedly scan all pairs i < j, merging the second item into the first,
// until a full pass performs no merge.
fn merge_pairs<T>(items: &mut Vec<T>, mut try_merge: impl FnMut(&mut T, &mut T) -> bool) {
    loop {
        let mut merged = false;
        'scan: for i in 0..items.len() {
            for j in i + 1..items.len() {
                let (head, tail) = items.split_at_mut(j);
                if try_merge(&mut head[i], &mut tail[0]) {
                    items.remove(j);
                    merged = true;
                    break 'scan;
                }
            }
        }
        if !merged {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::point3;

    fn ring(points: &[(f64, f64, f64)], exterior: bool) -> LinearRing {
        let mut ring = LinearRing::new("r".into(), exterior);
        for &(x, y, z) in points {
            ring.add_vertex(point3(x, y, z));
        }
        ring
    }

    #[test]
    fn ring_finish_removes_consecutive_duplicates() {
        let mut r = ring(
            &[
                (0.0, 0.0, 0.0),
                (0.0, 0.0, 0.0),
                (1.0, 0.0, 0.0),
                (1.0, 1.0, 0.0),
                (0.0, 1.0, 0.0),
                (0.0, 1.0, 0.00001),
                // closing duplicate of the first vertex
                (0.0, 0.0, 0.0),
            ],
            true,
        );
        r.finish();
        assert_eq!(r.vertices().len(), 4);
    }

    #[test]
    fn ring_finish_is_idempotent() {
        let mut r = ring(
            &[
                (0.0, 0.0, 0.0),
                (0.0, 0.0, 0.0),
                (1.0, 0.0, 0.0),
                (1.0, 1.0, 0.0),
                (0.0, 0.0, 0.0),
            ],
            true,
        );
        r.finish();
        let once = r.vertices().to_vec();
        r.finish();
        assert_eq!(r.vertices(), once.as_slice());
    }

    #[test]
    fn newell_normal_of_ccw_square_points_up() {
        let r = ring(
            &[
                (0.0, 0.0, 0.0),
                (1.0, 0.0, 0.0),
                (1.0, 1.0, 0.0),
                (0.0, 1.0, 0.0),
            ],
            true,
        );
        let n = r.compute_normal();
        assert!((n - Vector3::new(0.0, 0.0, 1.0)).square_length() < 1e-12);
    }

    #[test]
    fn degenerate_ring_has_zero_normal() {
        let r = ring(&[(0.0, 0.0, 0.0), (1.0, 0.0, 0.0)], true);
        assert_eq!(r.compute_normal(), Vector3::zero());
    }

    #[test]
    fn polygon_build_fans_per_vertex_normals() {
        let mut polygon = Polygon::new("p".into());
        polygon.add_ring(ring(
            &[
                (0.0, 0.0, 0.0),
                (1.0, 0.0, 0.0),
                (1.0, 1.0, 0.0),
                (0.0, 1.0, 0.0),
            ],
            true,
        ));
        let mut tess = Tessellator::new();
        polygon.build(true, &mut tess);
        assert_eq!(polygon.vertices().len(), 4);
        assert_eq!(polygon.normals().len(), 4);
        assert_eq!(polygon.indices().len(), 6);
        for n in polygon.normals() {
            assert_eq!(*n, Vec3f::new(0.0, 0.0, 1.0));
        }
    }

    #[test]
    fn negated_polygon_normals_are_exact_negations() {
        let points = [
            (0.0, 0.0, 0.0),
            (1.0, 0.0, 0.0),
            (1.0, 1.0, 0.0),
            (0.0, 1.0, 0.0),
        ];
        let mut tess = Tessellator::new();

        let mut plus = Polygon::new("p".into());
        plus.add_ring(ring(&points, true));
        plus.build(true, &mut tess);

        let mut minus = Polygon::new("m".into());
        minus.add_ring(ring(&points, true));
        minus.set_negate_normal(true);
        minus.build(true, &mut tess);

        for (a, b) in plus.normals().iter().zip(minus.normals()) {
            assert_eq!(*a, -*b);
        }
    }

    #[test]
    fn degenerate_exterior_falls_back_to_the_ring_union() {
        let mut polygon = Polygon::new("p".into());
        polygon.add_ring(ring(&[(0.0, 0.0, 0.0), (1.0, 0.0, 0.0)], true));
        polygon.add_ring(ring(&[(5.0, 5.0, 0.0), (6.0, 5.0, 0.0)], false));
        let mut tess = Tessellator::new();
        polygon.build(true, &mut tess);
        // Union of the ring points, indexed as a trivial fan.
        assert_eq!(polygon.vertices().len(), 4);
        assert_eq!(polygon.indices(), &[0, 1, 2, 0, 2, 3]);
        assert_eq!(polygon.normals().len(), 4);
    }

    #[test]
    fn two_point_polygon_has_no_indices() {
        let mut polygon = Polygon::new("p".into());
        polygon.add_ring(ring(&[(0.0, 0.0, 0.0), (1.0, 0.0, 0.0)], true));
        let mut tess = Tessellator::new();
        polygon.build(true, &mut tess);
        assert_eq!(polygon.vertices().len(), 2);
        assert!(polygon.indices().is_empty());
    }

    #[test]
    fn pass_through_build_uses_a_trivial_fan() {
        let mut polygon = Polygon::new("p".into());
        polygon.add_ring(ring(
            &[
                (0.0, 0.0, 0.0),
                (1.0, 0.0, 0.0),
                (1.0, 1.0, 0.0),
                (0.0, 1.0, 0.0),
            ],
            true,
        ));
        let mut tess = Tessellator::new();
        polygon.build(false, &mut tess);
        assert_eq!(polygon.indices(), &[0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn polygon_merge_requires_matching_appearance() {
        let mut tess = Tessellator::new();
        let square = [
            (0.0, 0.0, 0.0),
            (1.0, 0.0, 0.0),
            (1.0, 1.0, 0.0),
            (0.0, 1.0, 0.0),
        ];

        let mut a = Polygon::new("a".into());
        a.add_ring(ring(&square, true));
        a.build(true, &mut tess);
        let mut b = Polygon::new("b".into());
        b.add_ring(ring(&square, true));
        b.build(true, &mut tess);

        b.appearance = Some(AppearanceId(0));
        assert!(!a.merge(&mut b));

        b.appearance = None;
        assert!(a.merge(&mut b));
        assert_eq!(a.id(), "a+b");
        assert_eq!(a.vertices().len(), 8);
        assert_eq!(a.normals().len(), 8);
        assert_eq!(a.indices().len(), 12);
        // Appended indices are biased by the pre-merge vertex count.
        assert!(a.indices()[6..].iter().all(|&i| i >= 4));
        assert!(b.vertices().is_empty());
    }

    #[test]
    fn polygon_merge_pads_texture_coordinates() {
        let mut tess = Tessellator::new();
        let square = [
            (0.0, 0.0, 0.0),
            (1.0, 0.0, 0.0),
            (1.0, 1.0, 0.0),
            (0.0, 1.0, 0.0),
        ];
        let mut a = Polygon::new("a".into());
        a.add_ring(ring(&square, true));
        a.build(true, &mut tess);
        a.tex_coords = Some(vec![TexCoord::new(1.0, 1.0); 4]);

        let mut b = Polygon::new("b".into());
        b.add_ring(ring(&square, true));
        b.build(true, &mut tess);

        assert!(a.merge(&mut b));
        let coords = a.tex_coords().unwrap();
        assert_eq!(coords.len(), 8);
        assert_eq!(coords[0], TexCoord::new(1.0, 1.0));
        assert_eq!(coords[4], TexCoord::origin());
    }

    #[test]
    fn geometry_merge_requires_matching_lod_and_type() {
        let mut a = Geometry::new("a".into(), GeometryType::Wall, 2);
        let mut b = Geometry::new("b".into(), GeometryType::Wall, 3);
        assert!(!a.merge(&mut b));
        let mut c = Geometry::new("c".into(), GeometryType::Roof, 2);
        assert!(!a.merge(&mut c));
        let mut d = Geometry::new("d".into(), GeometryType::Wall, 2);
        d.add_polygon(Polygon::new("p".into()));
        assert!(a.merge(&mut d));
        assert_eq!(a.id(), "a+d");
        assert_eq!(a.polygons().len(), 1);
    }

    #[test]
    fn mask_expressions() {
        assert_eq!(
            CityObjectsMask::from_expression("Building"),
            CityObjectsMask::BUILDING
        );
        assert_eq!(
            CityObjectsMask::from_expression("Building|Road"),
            CityObjectsMask::BUILDING | CityObjectsMask::ROAD
        );
        assert_eq!(CityObjectsMask::from_expression("All"), CityObjectsMask::all());
        assert_eq!(
            CityObjectsMask::from_expression("All&~Road"),
            CityObjectsMask::all() - CityObjectsMask::ROAD
        );
        assert_eq!(
            CityObjectsMask::from_expression("!Road"),
            CityObjectsMask::all() - CityObjectsMask::ROAD
        );
        assert_eq!(
            CityObjectsMask::from_expression("NoSuchClass"),
            CityObjectsMask::empty()
        );
    }

    #[test]
    fn mask_renders_class_names() {
        let mask = CityObjectsMask::BUILDING | CityObjectsMask::ROAD;
        assert_eq!(mask.to_string(), "Building|Road");
    }

    #[test]
    fn land_use_color_follows_the_class_property() {
        let mut land = CityObject::new("l".into(), CityObjectsType::LandUse);
        land.set_prop("class", "4000".to_string());
        assert_eq!(land.default_color(), Color::from_rgb(67, 109, 247));
        land.set_prop("class", "junk".to_string());
        assert_eq!(land.default_color(), Color::from_rgb(10, 230, 1));
    }

    #[test]
    fn merge_pairs_restarts_until_stable() {
        // Numbers merge when equal; 4 equal items collapse into one.
        let mut items = vec![1, 1, 1, 1];
        merge_pairs(&mut items, |a, b| *a == *b);
        assert_eq!(items, vec![1]);

        let mut items = vec![1, 2, 1, 2];
        merge_pairs(&mut items, |a, b| *a == *b);
        assert_eq!(items, vec![1, 2]);
    }
}
