//! Surface appearances and their deferred resolution.
//!
//! CityGML declares appearances in dedicated blocks that reference the
//! surfaces they apply to by `gml:id`, in either document order. The
//! [`AppearanceResolver`](struct.AppearanceResolver.html) owns every parsed
//! appearance and records the id assignments as they stream by; polygons and
//! geometries are bound to their appearance only once the document has been
//! read completely.

use std::collections::HashMap;

use crate::math::{TexCoord, Vec3f};

/// An index into the appearance list owned by the resolver (and therefore by
/// the model).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct AppearanceId(pub u32);

/// A surface appearance: either a material or a texture.
#[derive(Clone, Debug)]
pub enum Appearance {
    Material(Material),
    Texture(Texture),
}

impl Appearance {
    pub fn id(&self) -> &str {
        match self {
            Appearance::Material(m) => &m.id,
            Appearance::Texture(t) => &t.id,
        }
    }

    pub fn as_material(&self) -> Option<&Material> {
        match self {
            Appearance::Material(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_texture(&self) -> Option<&Texture> {
        match self {
            Appearance::Texture(t) => Some(t),
            _ => None,
        }
    }
}

/// An X3D-style material.
#[derive(Clone, Debug)]
pub struct Material {
    pub id: String,
    pub diffuse: Vec3f,
    pub emissive: Vec3f,
    pub specular: Vec3f,
    pub ambient_intensity: f32,
    pub shininess: f32,
    pub transparency: f32,
}

impl Material {
    pub fn new(id: String) -> Self {
        Material {
            id,
            diffuse: Vec3f::zero(),
            emissive: Vec3f::zero(),
            specular: Vec3f::zero(),
            ambient_intensity: 0.0,
            shininess: 0.0,
            transparency: 0.0,
        }
    }
}

/// A texture referenced by URL.
#[derive(Clone, Debug)]
pub struct Texture {
    pub id: String,
    pub url: String,
    pub repeat: bool,
}

impl Texture {
    pub fn new(id: String) -> Self {
        Texture {
            id,
            url: String::new(),
            repeat: false,
        }
    }
}

/// Owns the parsed appearances and resolves the deferred id references.
///
/// Two maps are keyed by target id: one to appearances and one to
/// texture-coordinate arrays. A `textureCoordinates` element may precede or
/// follow the `target` naming the surface it applies to, so the resolver
/// holds a pending (last id, last coordinates) pair and binds whichever half
/// arrives second.
#[derive(Debug, Default)]
pub struct AppearanceResolver {
    appearances: Vec<Appearance>,
    appearance_map: HashMap<String, AppearanceId>,
    tex_coords_map: HashMap<String, Vec<TexCoord>>,
    last_id: Option<String>,
    pending_coords: Option<Vec<TexCoord>>,
}

impl AppearanceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every appearance declared by the document, in declaration order.
    pub fn appearances(&self) -> &[Appearance] {
        &self.appearances
    }

    pub fn appearance(&self, id: AppearanceId) -> &Appearance {
        &self.appearances[id.0 as usize]
    }

    /// The appearance assigned to a node id, if any.
    pub fn appearance_id(&self, node_id: &str) -> Option<AppearanceId> {
        self.appearance_map.get(node_id).copied()
    }

    pub(crate) fn appearance_mut(&mut self, id: AppearanceId) -> &mut Appearance {
        &mut self.appearances[id.0 as usize]
    }

    pub(crate) fn add_appearance(&mut self, appearance: Appearance) -> AppearanceId {
        let id = AppearanceId(self.appearances.len() as u32);
        self.appearances.push(appearance);
        id
    }

    /// Assign the most recently declared appearance to `node_id`.
    ///
    /// The first assignment wins if the id is already mapped. A pending
    /// texture-coordinate array is bound to the id right away; otherwise the
    /// id is remembered for the array that may still follow.
    pub(crate) fn assign(&mut self, node_id: &str) {
        if let Some(last) = self.appearances.len().checked_sub(1) {
            self.appearance_map
                .entry(node_id.to_string())
                .or_insert(AppearanceId(last as u32));
        }
        match self.pending_coords.take() {
            Some(coords) => {
                self.tex_coords_map.insert(node_id.to_string(), coords);
                self.last_id = None;
            }
            None => self.last_id = Some(node_id.to_string()),
        }
    }

    /// Hand over a texture-coordinate array; it binds to the pending target
    /// id if one was seen, and is held back otherwise.
    pub(crate) fn assign_tex_coords(&mut self, coords: Vec<TexCoord>) {
        match self.last_id.take() {
            Some(id) => {
                self.tex_coords_map.insert(id, coords);
            }
            None => self.pending_coords = Some(coords),
        }
    }

    /// Drop any half-bound state so it cannot leak into the next appearance
    /// block.
    pub(crate) fn refresh(&mut self) {
        self.last_id = None;
        self.pending_coords = None;
    }

    pub(crate) fn tex_coords(&self, node_id: &str) -> Option<&[TexCoord]> {
        self.tex_coords_map.get(node_id).map(Vec::as_slice)
    }

    /// Clear the scratch maps once every binding has been applied.
    pub(crate) fn finish(&mut self) {
        self.appearance_map.clear();
        self.tex_coords_map.clear();
        self.last_id = None;
        self.pending_coords = None;
    }
}
