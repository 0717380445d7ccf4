//! The streaming CityGML reader.
//!
//! A pull loop over the XML reader feeds start/end/text events to a handler
//! state machine that mirrors the document structure: a path of local
//! element names, the current LOD, the enclosing city object (with a stack
//! for nesting), the polygon and ring being assembled, and the appearance
//! block being read. Cross references by `gml:id` are recorded in the
//! model's resolver and bound once the document ends.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use citygml_tess::Tessellator;
use log::{error, warn};
use xml::attribute::OwnedAttribute;
use xml::name::OwnedName;
use xml::reader::{ParserConfig, XmlEvent};

use crate::appearance::{Appearance, AppearanceId, Material, Texture};
use crate::math::{point3, Point3, TexCoord, Vec3f};
use crate::model::{
    CityModel, CityObject, CityObjectsMask, CityObjectsType, Envelope, Geometry, GeometryType,
    LinearRing, Polygon,
};

/// What a `load` can fail with. Per-element problems (bad numbers, a polygon
/// the tessellator gives up on) degrade the element and are only logged.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot open CityGML input: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed CityGML document: {0}")]
    Xml(#[from] xml::reader::Error),
    #[error("the document does not contain a CityModel")]
    NoCityModel,
}

/// Options controlling what a parse materializes.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ParserOptions {
    /// The city-object classes to materialize; see
    /// [`CityObjectsMask::from_expression`](../model/struct.CityObjectsMask.html#method.from_expression)
    /// for the string grammar.
    pub objects_mask: CityObjectsMask,
    /// Geometry below this LOD is dropped.
    pub min_lod: u8,
    /// Geometry above this LOD is dropped.
    pub max_lod: u8,
    /// Run the polygon/geometry merge passes after parsing.
    pub optimize: bool,
    /// Drop city objects that end up without geometry or children.
    pub prune_empty_objects: bool,
    /// Triangulate polygons; when off, rings are concatenated and indexed as
    /// a trivial fan.
    pub triangulate: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        ParserOptions {
            objects_mask: CityObjectsMask::all(),
            min_lod: 0,
            max_lod: 4,
            optimize: true,
            prune_empty_objects: true,
            triangulate: true,
        }
    }
}

impl ParserOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_objects_mask(mut self, mask: CityObjectsMask) -> Self {
        self.objects_mask = mask;
        self
    }

    pub fn with_min_lod(mut self, lod: u8) -> Self {
        self.min_lod = lod;
        self
    }

    pub fn with_max_lod(mut self, lod: u8) -> Self {
        self.max_lod = lod;
        self
    }

    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    pub fn with_prune_empty_objects(mut self, prune: bool) -> Self {
        self.prune_empty_objects = prune;
        self
    }

    pub fn with_triangulate(mut self, triangulate: bool) -> Self {
        self.triangulate = triangulate;
        self
    }
}

/// Read a CityGML document from a file.
pub fn load<P: AsRef<Path>>(path: P, options: &ParserOptions) -> Result<CityModel, Error> {
    let file = File::open(path.as_ref())?;
    load_from(BufReader::new(file), options)
}

/// Read a CityGML document from an arbitrary byte stream.
pub fn load_from<R: Read>(input: R, options: &ParserOptions) -> Result<CityModel, Error> {
    let reader = ParserConfig::new()
        .cdata_to_characters(true)
        .ignore_comments(true)
        .create_reader(input);

    let mut handler = Handler::new(*options);
    for event in reader {
        match event {
            Ok(XmlEvent::StartElement {
                name, attributes, ..
            }) => handler.start_element(&name, &attributes),
            Ok(XmlEvent::EndElement { name }) => handler.end_element(&name),
            Ok(XmlEvent::Characters(text)) => handler.characters(&text),
            Ok(XmlEvent::Whitespace(text)) => handler.characters(&text),
            Ok(XmlEvent::CData(text)) => handler.characters(&text),
            Ok(XmlEvent::EndDocument) => break,
            Ok(_) => {}
            Err(e) => {
                error!(
                    "citygml: fatal parse error at {}: {}",
                    handler.full_path(),
                    e
                );
                return Err(Error::Xml(e));
            }
        }
    }
    handler.into_model().ok_or(Error::NoCityModel)
}

// Namespace prefixes whose qualification is dropped from element names;
// anything else keeps its prefix.
const KNOWN_NAMESPACES: [&str; 15] = [
    "gml", "citygml", "core", "app", "bldg", "frn", "grp", "gen", "luse", "dem", "tran", "trans",
    "veg", "wtr", "tex",
];

fn local_name(name: &OwnedName) -> String {
    match &name.prefix {
        Some(prefix) if KNOWN_NAMESPACES.contains(&prefix.as_str()) => name.local_name.clone(),
        Some(prefix) => format!("{}:{}", prefix, name.local_name),
        None => name.local_name.clone(),
    }
}

fn attribute<'a>(attributes: &'a [OwnedAttribute], name: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|a| a.name.local_name == name)
        .map(|a| a.value.as_str())
}

fn gml_id(attributes: &[OwnedAttribute]) -> Option<String> {
    attributes
        .iter()
        .find(|a| a.name.local_name == "id" && a.name.prefix.as_deref() == Some("gml"))
        .map(|a| a.value.clone())
}

// Whitespace-separated numeric list; a malformed token drops the whole list.
fn parse_numbers<T: FromStr>(text: &str, what: &str) -> Vec<T> {
    let mut values = Vec::new();
    for token in text.split_whitespace() {
        match token.parse::<T>() {
            Ok(v) => values.push(v),
            Err(_) => {
                warn!("citygml: malformed numeric content {:?} in {}", token, what);
                return Vec::new();
            }
        }
    }
    values
}

fn parse_point3(text: &str, what: &str) -> Option<Point3> {
    let values = parse_numbers::<f64>(text, what);
    if values.len() < 3 {
        return None;
    }
    Some(point3(values[0], values[1], values[2]))
}

fn parse_vec3f(text: &str, what: &str) -> Option<Vec3f> {
    let values = parse_numbers::<f32>(text, what);
    if values.len() < 3 {
        return None;
    }
    Some(Vec3f::new(values[0], values[1], values[2]))
}

/// The closed set of element kinds the handler reacts to. Several element
/// names can map to one kind; names outside the table are `Unknown` and are
/// traversed without effect.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum NodeType {
    Unknown,

    // core
    CityModel,
    CityObjectMember,
    CreationDate,
    TerminationDate,

    // gml
    Description,
    Name,
    Pos,
    PosList,
    BoundedBy,
    Envelope,
    LowerCorner,
    UpperCorner,
    Solid,
    CompositeSurface,
    /// `surfaceMember` and `TriangulatedSurface`, both of which open a
    /// geometry.
    SurfaceMember,
    TexturedSurface,
    OrientableSurface,
    Triangle,
    Polygon,
    LinearRing,
    Interior,
    Exterior,
    /// `lod{1..4}Solid` and `lod{1..4}Geometry`; the LOD digit itself is
    /// tracked by name prefix.
    LodGeometry,

    // bldg
    Class,
    Function,
    Usage,
    MeasuredHeight,
    BoundarySurface(GeometryType),
    CityObject(CityObjectsType),

    // dem
    Lod,

    // app
    /// `SimpleTexture`, `ParameterizedTexture` and `GeoreferencedTexture`.
    TextureDecl,
    /// `Material` and `X3DMaterial`.
    MaterialDecl,
    AppearanceMember,
    SurfaceDataMember,
    /// `imageURI` and `textureMap`.
    TextureUri,
    TextureType,
    Repeat,
    Target,
    TextureCoordinates,
    DiffuseColor,
    EmissiveColor,
    SpecularColor,
    AmbientIntensity,
    Shininess,
    Transparency,
}

fn node_type(local_name: &str) -> NodeType {
    use crate::model::CityObjectsType as Cot;
    use crate::model::GeometryType as Gt;

    match local_name {
        "CityModel" => NodeType::CityModel,
        "cityObjectMember" => NodeType::CityObjectMember,
        "creationDate" => NodeType::CreationDate,
        "terminationDate" => NodeType::TerminationDate,

        "description" => NodeType::Description,
        "name" => NodeType::Name,
        "pos" => NodeType::Pos,
        "posList" => NodeType::PosList,
        "boundedBy" => NodeType::BoundedBy,
        "Envelope" => NodeType::Envelope,
        "lowerCorner" => NodeType::LowerCorner,
        "upperCorner" => NodeType::UpperCorner,
        "Solid" => NodeType::Solid,
        "CompositeSurface" => NodeType::CompositeSurface,
        "surfaceMember" | "TriangulatedSurface" => NodeType::SurfaceMember,
        "TexturedSurface" => NodeType::TexturedSurface,
        "OrientableSurface" => NodeType::OrientableSurface,
        "Triangle" => NodeType::Triangle,
        "Polygon" => NodeType::Polygon,
        "LinearRing" => NodeType::LinearRing,
        "interior" => NodeType::Interior,
        "exterior" => NodeType::Exterior,
        "lod1Solid" | "lod2Solid" | "lod3Solid" | "lod4Solid" | "lod1Geometry"
        | "lod2Geometry" | "lod3Geometry" | "lod4Geometry" => NodeType::LodGeometry,

        "class" => NodeType::Class,
        "function" => NodeType::Function,
        "usage" => NodeType::Usage,
        "measuredHeight" => NodeType::MeasuredHeight,

        "WallSurface" => NodeType::BoundarySurface(Gt::Wall),
        "RoofSurface" => NodeType::BoundarySurface(Gt::Roof),
        "GroundSurface" => NodeType::BoundarySurface(Gt::Ground),
        "ClosureSurface" => NodeType::BoundarySurface(Gt::Closure),
        "FloorSurface" => NodeType::BoundarySurface(Gt::Floor),
        "InteriorWallSurface" => NodeType::BoundarySurface(Gt::InteriorWall),
        "CeilingSurface" => NodeType::BoundarySurface(Gt::Ceiling),

        "GenericCityObject" => NodeType::CityObject(Cot::GenericCityObject),
        "Building" => NodeType::CityObject(Cot::Building),
        "Room" => NodeType::CityObject(Cot::Room),
        "BuildingInstallation" => NodeType::CityObject(Cot::BuildingInstallation),
        "BuildingFurniture" => NodeType::CityObject(Cot::BuildingFurniture),
        "Door" => NodeType::CityObject(Cot::Door),
        "Window" => NodeType::CityObject(Cot::Window),
        "BuildingPart" => NodeType::CityObject(Cot::BuildingPart),
        "CityFurniture" => NodeType::CityObject(Cot::CityFurniture),
        "Track" => NodeType::CityObject(Cot::Track),
        "Road" => NodeType::CityObject(Cot::Road),
        "Railway" => NodeType::CityObject(Cot::Railway),
        "Square" => NodeType::CityObject(Cot::Square),
        "PlantCover" => NodeType::CityObject(Cot::PlantCover),
        "SolitaryVegetationObject" => NodeType::CityObject(Cot::SolitaryVegetationObject),
        "WaterBody" => NodeType::CityObject(Cot::WaterBody),
        "TINRelief" => NodeType::CityObject(Cot::TINRelief),
        "LandUse" => NodeType::CityObject(Cot::LandUse),
        "Tunnel" => NodeType::CityObject(Cot::Tunnel),
        "Bridge" => NodeType::CityObject(Cot::Bridge),
        "BridgePart" => NodeType::CityObject(Cot::BridgePart),
        "BridgeConstructionElement" => NodeType::CityObject(Cot::BridgeConstructionElement),
        "BridgeInstallation" => NodeType::CityObject(Cot::BridgeInstallation),

        "lod" => NodeType::Lod,

        "SimpleTexture" | "ParameterizedTexture" | "GeoreferencedTexture" => NodeType::TextureDecl,
        "Material" | "X3DMaterial" => NodeType::MaterialDecl,
        "appearanceMember" => NodeType::AppearanceMember,
        "surfaceDataMember" => NodeType::SurfaceDataMember,
        "imageURI" | "textureMap" => NodeType::TextureUri,
        "textureType" => NodeType::TextureType,
        "repeat" => NodeType::Repeat,
        "target" => NodeType::Target,
        "textureCoordinates" => NodeType::TextureCoordinates,
        "diffuseColor" => NodeType::DiffuseColor,
        "emissiveColor" => NodeType::EmissiveColor,
        "specularColor" => NodeType::SpecularColor,
        "ambientIntensity" => NodeType::AmbientIntensity,
        "shininess" => NodeType::Shininess,
        "transparency" => NodeType::Transparency,

        _ => NodeType::Unknown,
    }
}

struct Handler {
    options: ParserOptions,

    node_path: Vec<String>,
    buffer: String,

    model: Option<CityModel>,

    current_object: Option<CityObject>,
    object_stack: Vec<Option<CityObject>>,
    current_geometry: Option<Geometry>,
    current_polygon: Option<Polygon>,
    current_ring: Option<LinearRing>,
    current_appearance: Option<AppearanceId>,
    current_geometry_type: GeometryType,

    current_lod: u8,
    filter_node_type: bool,
    filter_depth: usize,

    points: Vec<Point3>,
    corners: Vec<Point3>,
    orientation: char,
    exterior: bool,
    appearance_assigned: bool,

    tess: Tessellator,
    synthesized_ids: u32,
}

impl Handler {
    fn new(options: ParserOptions) -> Self {
        Handler {
            current_lod: options.min_lod,
            options,
            node_path: Vec::new(),
            buffer: String::new(),
            model: None,
            current_object: None,
            object_stack: Vec::new(),
            current_geometry: None,
            current_polygon: None,
            current_ring: None,
            current_appearance: None,
            current_geometry_type: GeometryType::Unknown,
            filter_node_type: false,
            filter_depth: 0,
            points: Vec::new(),
            corners: Vec::new(),
            orientation: '+',
            exterior: true,
            appearance_assigned: false,
            tess: Tessellator::new(),
            synthesized_ids: 0,
        }
    }

    fn into_model(self) -> Option<CityModel> {
        self.model
    }

    fn full_path(&self) -> String {
        let mut path = String::new();
        for name in &self.node_path {
            path.push_str(name);
            path.push('/');
        }
        path
    }

    fn characters(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    // Everything at or beneath the depth of a masked-out city object is
    // ignored until its end element pops the filter.
    fn node_filtered(&self) -> bool {
        self.filter_node_type && self.node_path.len() >= self.filter_depth
    }

    fn lod_in_range(&self) -> bool {
        self.current_lod >= self.options.min_lod && self.current_lod <= self.options.max_lod
    }

    fn synthesize_id(&mut self, kind: &str) -> String {
        self.synthesized_ids += 1;
        format!("{}_{}", kind, self.synthesized_ids)
    }

    fn element_id(&mut self, attributes: &[OwnedAttribute], kind: &str) -> String {
        gml_id(attributes).unwrap_or_else(|| self.synthesize_id(kind))
    }

    fn start_element(&mut self, name: &OwnedName, attributes: &[OwnedAttribute]) {
        let local = local_name(name);
        self.node_path.push(local.clone());

        // The LOD follows the element names: lod2Solid, lod3Geometry, ...
        if local.len() > 3 && local.starts_with("lod") {
            if let Some(digit) = (local.as_bytes()[3] as char).to_digit(10) {
                self.current_lod = digit as u8;
            }
        }

        if self.node_filtered() {
            return;
        }

        match node_type(&local) {
            NodeType::CityModel => {
                let id = gml_id(attributes).unwrap_or_else(|| "CityModel".to_string());
                self.model = Some(CityModel::new(id));
            }

            NodeType::CityObject(object_type) => self.begin_city_object(object_type, attributes),

            NodeType::BoundarySurface(geometry_type) => {
                self.current_geometry_type = geometry_type;
            }

            NodeType::TexturedSurface | NodeType::OrientableSurface => {
                self.orientation = attribute(attributes, "orientation")
                    .and_then(|s| s.chars().next())
                    .unwrap_or('+');
            }

            NodeType::SurfaceMember => {
                if self.lod_in_range() {
                    self.orientation = '+';
                    let id = self.element_id(attributes, "Geometry");
                    self.current_geometry = Some(Geometry::new(
                        id,
                        self.current_geometry_type,
                        self.current_lod,
                    ));
                }
            }

            NodeType::Triangle | NodeType::Polygon => {
                if self.lod_in_range() {
                    let id = self.element_id(attributes, "Polygon");
                    self.current_polygon = Some(Polygon::new(id));
                }
            }

            NodeType::PosList => {
                if self.lod_in_range() {
                    let srs_dimension = attribute(attributes, "srsDimension")
                        .and_then(|s| s.parse::<u32>().ok())
                        .unwrap_or(3);
                    if srs_dimension != 3 {
                        // Triples are still assumed, for compatibility.
                        warn!(
                            "citygml: srsDimension of gml:posList is {}, not 3",
                            srs_dimension
                        );
                    }
                }
            }

            NodeType::Interior => self.exterior = false,
            NodeType::Exterior => self.exterior = true,

            NodeType::LinearRing => {
                if self.lod_in_range() {
                    let id = self.element_id(attributes, "Ring");
                    self.current_ring = Some(LinearRing::new(id, self.exterior));
                }
            }

            NodeType::Target => {
                if self.current_appearance.is_some() {
                    if let Some(model) = self.model.as_mut() {
                        if let Some(uri) = attribute(attributes, "uri") {
                            let uri = uri.strip_prefix('#').unwrap_or(uri);
                            if !uri.is_empty() {
                                model.resolver_mut().assign(uri);
                            }
                        }
                        self.appearance_assigned = true;
                    }
                }
            }

            NodeType::TextureDecl => {
                let id = self.element_id(attributes, "Texture");
                if let Some(model) = self.model.as_mut() {
                    let resolver = model.resolver_mut();
                    resolver.refresh();
                    self.current_appearance =
                        Some(resolver.add_appearance(Appearance::Texture(Texture::new(id))));
                    self.appearance_assigned = false;
                }
            }

            NodeType::MaterialDecl => {
                let id = self.element_id(attributes, "Material");
                if let Some(model) = self.model.as_mut() {
                    let resolver = model.resolver_mut();
                    resolver.refresh();
                    self.current_appearance =
                        Some(resolver.add_appearance(Appearance::Material(Material::new(id))));
                    self.appearance_assigned = false;
                }
            }

            _ => {}
        }
    }

    fn end_element(&mut self, name: &OwnedName) {
        let local = local_name(name);
        self.node_path.pop();

        if self.node_filtered() {
            self.buffer.clear();
            return;
        }

        // Leaving any lod-qualified element reverts to the configured floor,
        // whether the name is in the node table (lod2Solid) or not
        // (lod2MultiSurface); a dem:lod element re-raises it from its own
        // content below.
        if local.starts_with("lod") {
            self.current_lod = self.options.min_lod;
        }

        let node = node_type(&local);
        if node == NodeType::Unknown {
            // Skip the buffer trimming pass for opaque elements.
            self.buffer.clear();
            return;
        }

        let buffer = std::mem::take(&mut self.buffer);
        let text = buffer.trim();

        match node {
            NodeType::CityModel => {
                if let Some(model) = self.model.as_mut() {
                    model.finish(self.options.optimize);
                }
            }

            NodeType::CityObject(_) => self.end_city_object(),

            NodeType::Envelope => {
                if self.model.is_some() && self.corners.len() >= 2 {
                    let envelope = Envelope::new(self.corners[0], self.corners[1]);
                    if self.node_path.len() == 2 {
                        // Directly under the CityModel root.
                        self.model.as_mut().unwrap().set_envelope(envelope);
                    } else if let Some(object) = self.current_object.as_mut() {
                        object.set_envelope(envelope);
                    }
                }
                self.corners.clear();
            }

            NodeType::LowerCorner | NodeType::UpperCorner => {
                if let Some(p) = parse_point3(text, &local) {
                    if node == NodeType::LowerCorner {
                        self.corners.insert(0, p);
                    } else {
                        self.corners.push(p);
                    }
                }
            }

            NodeType::Lod => {
                if let Ok(lod) = text.parse::<u8>() {
                    self.current_lod = lod;
                }
            }

            NodeType::Class
            | NodeType::Function
            | NodeType::Usage
            | NodeType::MeasuredHeight
            | NodeType::Name
            | NodeType::Description
            | NodeType::CreationDate
            | NodeType::TerminationDate => {
                if let Some(object) = self.current_object.as_mut() {
                    object.set_prop(&local, text.to_string());
                }
            }

            NodeType::BoundarySurface(_) => {
                self.current_geometry_type = GeometryType::Unknown;
            }

            NodeType::SurfaceMember => {
                match (self.current_object.as_mut(), self.current_geometry.take()) {
                    (Some(object), Some(geometry)) => object.add_geometry(geometry),
                    _ => {}
                }
            }

            NodeType::Triangle | NodeType::Polygon => {
                let polygon = self.current_polygon.take();
                if let (Some(geometry), Some(mut polygon)) =
                    (self.current_geometry.as_mut(), polygon)
                {
                    // Triangle elements are already triangles.
                    let triangulate = node != NodeType::Triangle && self.options.triangulate;
                    polygon.build(triangulate, &mut self.tess);
                    geometry.add_polygon(polygon);
                }
            }

            NodeType::Pos => {
                if self.current_object.is_some() {
                    if let Some(p) = parse_point3(text, "gml:pos") {
                        if self.current_polygon.is_none() {
                            self.points.push(p);
                        } else if let Some(ring) = self.current_ring.as_mut() {
                            ring.add_vertex(p);
                        }
                    }
                }
            }

            NodeType::PosList => {
                if let Some(polygon) = self.current_polygon.as_mut() {
                    polygon.set_negate_normal(self.orientation != '+');
                    if let Some(ring) = self.current_ring.as_mut() {
                        let values = parse_numbers::<f64>(text, "gml:posList");
                        let triples = values.chunks_exact(3);
                        if !triples.remainder().is_empty() {
                            warn!(
                                "citygml: gml:posList length {} is not a multiple of 3",
                                values.len()
                            );
                        }
                        for triple in triples {
                            ring.add_vertex(point3(triple[0], triple[1], triple[2]));
                        }
                    }
                }
            }

            NodeType::Interior | NodeType::Exterior => self.exterior = true,

            NodeType::LinearRing => {
                let ring = self.current_ring.take();
                if let (Some(polygon), Some(ring)) = (self.current_polygon.as_mut(), ring) {
                    polygon.add_ring(ring);
                }
            }

            NodeType::TextureUri => {
                if let Some(texture) = self.current_texture() {
                    texture.url = text.replace('\\', "/");
                }
            }

            NodeType::Repeat => {
                let repeat = text == "1" || text.eq_ignore_ascii_case("true");
                if let Some(texture) = self.current_texture() {
                    texture.repeat = repeat;
                }
            }

            NodeType::Target => {
                if self.current_appearance.is_some() && !text.is_empty() {
                    let uri = text.strip_prefix('#').unwrap_or(text);
                    if !uri.is_empty() {
                        if let Some(model) = self.model.as_mut() {
                            model.resolver_mut().assign(uri);
                        }
                    }
                }
            }

            NodeType::TextureCoordinates => {
                if self.current_texture().is_some() {
                    let values = parse_numbers::<f32>(text, "app:textureCoordinates");
                    let pairs = values.chunks_exact(2);
                    if !pairs.remainder().is_empty() {
                        warn!(
                            "citygml: textureCoordinates length {} is not a multiple of 2",
                            values.len()
                        );
                    }
                    let coords: Vec<TexCoord> =
                        pairs.map(|pair| TexCoord::new(pair[0], pair[1])).collect();
                    if let Some(model) = self.model.as_mut() {
                        model.resolver_mut().assign_tex_coords(coords);
                    }
                }
            }

            NodeType::TextureDecl | NodeType::MaterialDecl => {
                if self.current_appearance.is_some() && !self.appearance_assigned {
                    // An appearance block without a target applies to the
                    // geometry it is nested in.
                    let geometry_id = self.current_geometry.as_ref().map(|g| g.id().to_string());
                    if let (Some(model), Some(id)) = (self.model.as_mut(), geometry_id) {
                        model.resolver_mut().assign(&id);
                    }
                }
                self.current_appearance = None;
            }

            NodeType::DiffuseColor | NodeType::EmissiveColor | NodeType::SpecularColor => {
                if let Some(color) = parse_vec3f(text, &local) {
                    if let Some(material) = self.current_material() {
                        match node {
                            NodeType::DiffuseColor => material.diffuse = color,
                            NodeType::EmissiveColor => material.emissive = color,
                            _ => material.specular = color,
                        }
                    }
                }
            }

            NodeType::AmbientIntensity | NodeType::Shininess | NodeType::Transparency => {
                if let Ok(value) = text.parse::<f32>() {
                    if let Some(material) = self.current_material() {
                        match node {
                            NodeType::AmbientIntensity => material.ambient_intensity = value,
                            NodeType::Shininess => material.shininess = value,
                            _ => material.transparency = value,
                        }
                    }
                }
            }

            _ => {}
        }
    }

    fn begin_city_object(&mut self, object_type: CityObjectsType, attributes: &[OwnedAttribute]) {
        let parent = self.current_object.take();
        self.object_stack.push(parent);
        if self.options.objects_mask.contains(object_type.mask()) {
            let id = self.element_id(attributes, object_type.name());
            self.current_object = Some(CityObject::new(id, object_type));
        } else {
            // Keep the stacks balanced with a hole, and ignore everything
            // until this element closes.
            self.filter_node_type = true;
            self.filter_depth = self.node_path.len();
        }
    }

    fn end_city_object(&mut self) {
        let object = self.current_object.take();
        let is_root = self.object_stack.len() == 1;

        if let (Some(model), Some(object)) = (self.model.as_mut(), object) {
            let keep = !object.geometries().is_empty()
                || !object.children().is_empty()
                || !self.options.prune_empty_objects;
            if keep {
                let id = model.add_object(object);
                if is_root {
                    model.add_root(id);
                } else if let Some(Some(parent)) = self.object_stack.last_mut() {
                    parent.add_child(id);
                }
            }
        }

        self.current_object = self.object_stack.pop().unwrap_or(None);
        self.filter_node_type = false;
    }

    fn current_texture(&mut self) -> Option<&mut Texture> {
        let id = self.current_appearance?;
        match self.model.as_mut()?.resolver_mut().appearance_mut(id) {
            Appearance::Texture(texture) => Some(texture),
            _ => None,
        }
    }

    fn current_material(&mut self) -> Option<&mut Material> {
        let id = self.current_appearance?;
        match self.model.as_mut()?.resolver_mut().appearance_mut(id) {
            Appearance::Material(material) => Some(material),
            _ => None,
        }
    }
}
