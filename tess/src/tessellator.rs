use std::cmp::Ordering;
use std::mem;

use euclid::default::Point2D;

use crate::math::{Point, Vector};
use crate::{Primitive, TessError};

/// A fill tessellator for planar polygons with holes, using the odd
/// (even-odd) winding rule.
///
/// The instance is reusable: `begin` resets it, then the exterior contour is
/// added first and the interior ones after, and `compute` fills the face.
/// The vertex and index buffers stay readable until the next `begin`.
///
/// Holes are connected to the exterior contour with index bridges and the
/// resulting contour is ear-clipped, so every output index refers to an
/// input vertex. Convex faces without holes take a fast path that emits a
/// single triangle fan; the emitter flattens fans and strips into the loose
/// triangle list exposed by `indices`.
pub struct Tessellator {
    vertices: Vec<Point>,
    indices: Vec<u32>,
    contours: Vec<(u32, u32)>,
    normal: Vector,
    cur_indices: Vec<u32>,
}

impl Tessellator {
    pub fn new() -> Self {
        Tessellator {
            vertices: Vec::new(),
            indices: Vec::new(),
            contours: Vec::new(),
            normal: Vector::zero(),
            cur_indices: Vec::new(),
        }
    }

    /// Reset the tessellator for a polygon of roughly `vertex_count`
    /// vertices lying in the plane of `normal`.
    ///
    /// The normal is a hint used to pick the projection plane; passing a
    /// zero vector makes the tessellator derive one from the first contour.
    pub fn begin(&mut self, vertex_count: usize, normal: Vector) {
        self.vertices.clear();
        self.indices.clear();
        self.contours.clear();
        self.cur_indices.clear();
        self.vertices.reserve(vertex_count);
        self.normal = normal;
    }

    /// Add a contour - the exterior one first, then the interiors.
    ///
    /// Contours with fewer than 3 vertices contribute nothing.
    pub fn add_contour(&mut self, points: &[Point]) {
        if points.len() < 3 {
            return;
        }
        let first = self.vertices.len() as u32;
        self.vertices.extend_from_slice(points);
        self.contours.push((first, points.len() as u32));
    }

    /// Fill the contours added since `begin`.
    ///
    /// On failure the vertex list is still the union of the accepted
    /// contours but the index list is empty.
    pub fn compute(&mut self) -> Result<(), TessError> {
        if self.contours.is_empty() {
            return Ok(());
        }

        let plane = self.projection_plane()?;
        let projected: Vec<Point2D<f64>> =
            self.vertices.iter().map(|p| plane.project(p)).collect();

        let mut rings: Vec<Vec<u32>> = self
            .contours
            .iter()
            .map(|&(first, count)| (first..first + count).collect())
            .collect();

        // Normalize the orientations: exterior counter-clockwise, holes
        // clockwise in the projected plane.
        let mut outer = rings.remove(0);
        if signed_area(&projected, &outer) < 0.0 {
            outer.reverse();
        }
        for hole in &mut rings {
            if signed_area(&projected, hole) > 0.0 {
                hole.reverse();
            }
        }

        if rings.is_empty() && is_convex(&projected, &outer) {
            self.cur_indices = outer;
            self.emit(Primitive::TriangleFan);
            return Ok(());
        }

        // Bridge the holes right-to-left so that earlier bridges cannot
        // block the visibility of the remaining ones.
        rings.sort_by(|a, b| {
            let xa = max_x(&projected, a);
            let xb = max_x(&projected, b);
            xb.partial_cmp(&xa).unwrap_or(Ordering::Equal)
        });
        for k in 0..rings.len() {
            let hole = rings[k].clone();
            bridge_hole(&mut outer, &hole, &rings[k + 1..], &projected)?;
        }

        self.ear_clip(outer, &projected)
    }

    /// The union of the accepted input contours.
    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    /// The triangle list produced by `compute`, three indices per triangle.
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    fn projection_plane(&self) -> Result<Plane, TessError> {
        let mut n = self.normal;
        if n.square_length() < 1e-12 {
            let (first, count) = self.contours[0];
            n = newell(&self.vertices[first as usize..(first + count) as usize]);
        }
        if n.square_length() < 1e-24 {
            return Err(TessError::DegeneratePolygon);
        }
        let (ax, ay, az) = (n.x.abs(), n.y.abs(), n.z.abs());
        let (mut u, mut v, dominant) = if az >= ax && az >= ay {
            (0, 1, n.z)
        } else if ay >= ax {
            (2, 0, n.y)
        } else {
            (1, 2, n.x)
        };
        // Keep the projection right-handed with respect to the normal so
        // that the output triangles wind counter-clockwise around it.
        if dominant < 0.0 {
            mem::swap(&mut u, &mut v);
        }
        Ok(Plane { u, v })
    }

    fn ear_clip(
        &mut self,
        mut ring: Vec<u32>,
        points: &[Point2D<f64>],
    ) -> Result<(), TessError> {
        let eps = area_epsilon(points, &ring);
        let mut i = 0;
        let mut stalled = 0;
        let mut relaxed = false;
        while ring.len() > 3 {
            let n = ring.len();
            if stalled > n {
                if relaxed {
                    self.cur_indices.clear();
                    return Err(TessError::Incomplete);
                }
                // No strict ear in a full scan: allow collinear corners so
                // that zero-area spikes can be consumed.
                relaxed = true;
                stalled = 0;
            }
            if is_ear(points, &ring, i, eps, relaxed) {
                self.cur_indices.push(ring[(i + n - 1) % n]);
                self.cur_indices.push(ring[i]);
                self.cur_indices.push(ring[(i + 1) % n]);
                ring.remove(i);
                stalled = 0;
                if i >= ring.len() {
                    i = 0;
                }
            } else {
                i = (i + 1) % n;
                stalled += 1;
            }
        }
        self.cur_indices.extend_from_slice(&ring);
        self.emit(Primitive::Triangles);
        Ok(())
    }

    fn emit(&mut self, mode: Primitive) {
        let ids = mem::take(&mut self.cur_indices);
        flatten_primitive(mode, &ids, &mut self.indices);
        self.cur_indices = ids;
        self.cur_indices.clear();
    }
}

impl Default for Tessellator {
    fn default() -> Self {
        Self::new()
    }
}

/// Flatten a primitive into loose triangles, three indices each.
pub(crate) fn flatten_primitive(mode: Primitive, ids: &[u32], out: &mut Vec<u32>) {
    if ids.len() < 3 {
        return;
    }
    match mode {
        Primitive::Triangles => out.extend_from_slice(ids),
        Primitive::TriangleFan | Primitive::TriangleStrip => {
            let mut first = ids[0];
            let mut prev = ids[1];
            for &id in &ids[2..] {
                out.push(first);
                out.push(prev);
                if mode == Primitive::TriangleStrip {
                    first = prev;
                }
                prev = id;
                out.push(prev);
            }
        }
    }
}

struct Plane {
    u: usize,
    v: usize,
}

impl Plane {
    fn project(&self, p: &Point) -> Point2D<f64> {
        let a = p.to_array();
        Point2D::new(a[self.u], a[self.v])
    }
}

fn newell(points: &[Point]) -> Vector {
    let mut n = Vector::zero();
    for i in 0..points.len() {
        let p = points[i];
        let q = points[(i + 1) % points.len()];
        n.x += (p.y - q.y) * (p.z + q.z);
        n.y += (p.z - q.z) * (p.x + q.x);
        n.z += (p.x - q.x) * (p.y + q.y);
    }
    n
}

fn orient(a: Point2D<f64>, b: Point2D<f64>, c: Point2D<f64>) -> f64 {
    (b - a).cross(c - a)
}

fn signed_area(points: &[Point2D<f64>], ring: &[u32]) -> f64 {
    let mut area = 0.0;
    for i in 0..ring.len() {
        let p = points[ring[i] as usize];
        let q = points[ring[(i + 1) % ring.len()] as usize];
        area += p.x * q.y - q.x * p.y;
    }
    0.5 * area
}

fn max_x(points: &[Point2D<f64>], ring: &[u32]) -> f64 {
    ring.iter()
        .map(|&id| points[id as usize].x)
        .fold(f64::MIN, f64::max)
}

// The tolerance scales with the bounding extent of the ring, not with the
// coordinate magnitudes: CityGML positions are routinely in projected CRS
// ranges (millions of meters) while the faces themselves are small.
fn area_epsilon(points: &[Point2D<f64>], ring: &[u32]) -> f64 {
    let mut min = Point2D::new(f64::MAX, f64::MAX);
    let mut max = Point2D::new(f64::MIN, f64::MIN);
    for &id in ring {
        let p = points[id as usize];
        min = min.min(p);
        max = max.max(p);
    }
    let extent = (max.x - min.x).max(max.y - min.y);
    extent * extent * 1e-12
}

fn is_convex(points: &[Point2D<f64>], ring: &[u32]) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let eps = area_epsilon(points, ring);
    for i in 0..n {
        let a = points[ring[i] as usize];
        let b = points[ring[(i + 1) % n] as usize];
        let c = points[ring[(i + 2) % n] as usize];
        if orient(a, b, c) < -eps {
            return false;
        }
    }
    true
}

fn is_ear(points: &[Point2D<f64>], ring: &[u32], i: usize, eps: f64, relaxed: bool) -> bool {
    let n = ring.len();
    let prev = ring[(i + n - 1) % n];
    let curr = ring[i];
    let next = ring[(i + 1) % n];
    let pa = points[prev as usize];
    let pb = points[curr as usize];
    let pc = points[next as usize];
    let min_cross = if relaxed { -eps } else { eps };
    if orient(pa, pb, pc) <= min_cross {
        return false;
    }
    let eps_pos = eps * 1e-8;
    for j in 0..n {
        let id = ring[j];
        if id == prev || id == curr || id == next {
            continue;
        }
        let p = points[id as usize];
        let o1 = orient(pa, pb, p);
        let o2 = orient(pb, pc, p);
        let o3 = orient(pc, pa, p);
        if o1 > eps && o2 > eps && o3 > eps {
            // Strictly inside the candidate triangle.
            return false;
        }
        if o1 > -eps && o2 > -eps && o3 > -eps {
            // On the triangle boundary. A convex vertex there is harmless
            // (bridge duplicates in particular), but a reflex or collinear
            // one means the contour re-enters the triangle through it.
            if (p - pa).square_length() < eps_pos
                || (p - pb).square_length() < eps_pos
                || (p - pc).square_length() < eps_pos
            {
                continue;
            }
            let turn = orient(
                points[ring[(j + n - 1) % n] as usize],
                p,
                points[ring[(j + 1) % n] as usize],
            );
            if turn <= eps {
                return false;
            }
        }
    }
    true
}

fn bridge_hole(
    outer: &mut Vec<u32>,
    hole: &[u32],
    pending: &[Vec<u32>],
    points: &[Point2D<f64>],
) -> Result<(), TessError> {
    let eps = area_epsilon(points, outer);

    let mut hole_at = 0;
    for (i, &id) in hole.iter().enumerate() {
        if points[id as usize].x > points[hole[hole_at] as usize].x {
            hole_at = i;
        }
    }
    let m = points[hole[hole_at] as usize];

    let mut candidates: Vec<usize> = (0..outer.len()).collect();
    candidates.sort_by(|&a, &b| {
        let da = (points[outer[a] as usize] - m).square_length();
        let db = (points[outer[b] as usize] - m).square_length();
        da.partial_cmp(&db).unwrap_or(Ordering::Equal)
    });

    let chosen = candidates.into_iter().find(|&c| {
        let p = points[outer[c] as usize];
        bridge_is_clear(m, p, outer, hole, pending, points, eps)
    });

    match chosen {
        Some(at) => {
            let mut insert: Vec<u32> = Vec::with_capacity(hole.len() + 2);
            insert.extend_from_slice(&hole[hole_at..]);
            insert.extend_from_slice(&hole[..hole_at]);
            insert.push(hole[hole_at]);
            insert.push(outer[at]);
            outer.splice(at + 1..at + 1, insert);
            Ok(())
        }
        None => Err(TessError::UnreachableHole),
    }
}

fn bridge_is_clear(
    from: Point2D<f64>,
    to: Point2D<f64>,
    outer: &[u32],
    hole: &[u32],
    pending: &[Vec<u32>],
    points: &[Point2D<f64>],
    eps: f64,
) -> bool {
    if (to - from).square_length() == 0.0 {
        // The hole touches the contour; a zero-length bridge is always fine.
        return true;
    }
    ring_clear(from, to, outer, points, eps)
        && ring_clear(from, to, hole, points, eps)
        && pending.iter().all(|h| ring_clear(from, to, h, points, eps))
}

fn ring_clear(
    from: Point2D<f64>,
    to: Point2D<f64>,
    ring: &[u32],
    points: &[Point2D<f64>],
    eps: f64,
) -> bool {
    for i in 0..ring.len() {
        let a = points[ring[i] as usize];
        let b = points[ring[(i + 1) % ring.len()] as usize];
        if crosses(from, to, a, b, eps) {
            return false;
        }
    }
    true
}

// Proper crossing only: segments that merely touch at an endpoint or run
// along each other do not count.
fn crosses(
    p1: Point2D<f64>,
    p2: Point2D<f64>,
    q1: Point2D<f64>,
    q2: Point2D<f64>,
    eps: f64,
) -> bool {
    let d1 = orient(q1, q2, p1);
    let d2 = orient(q1, q2, p2);
    let d3 = orient(p1, p2, q1);
    let d4 = orient(p1, p2, q2);
    ((d1 > eps && d2 < -eps) || (d1 < -eps && d2 > eps))
        && ((d3 > eps && d4 < -eps) || (d3 < -eps && d4 > eps))
}
