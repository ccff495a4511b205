//! Closed spherical regions.
//!
//! A polygon is an ordered boundary of unit vectors joined by great-circle
//! edges, used to mask or query subsets of a grid. Membership testing
//! counts great-circle crossings between a stored reference point (whose
//! inside/outside sense is known) and the query point. Points that fall on
//! the boundary are inside, deterministically.
//!
//! Polygons are independent of any model and may outlive the models they
//! filter. A polygon shared behind `Arc` must be cloned before calling
//! [`Polygon::invert`]; [`Polygon::is_shared`] reports whether other
//! holders currently reference it.

use std::sync::Arc;

use thiserror::Error;

use crate::earth::{angle, normalize};

/// Angular slack, in radians, for deciding that a point sits on an edge.
const BOUNDARY_TOLERANCE: f64 = 1e-10;

/// Angular slack for arc-crossing tests.
const CROSSING_TOLERANCE: f64 = 1e-9;

/// Problems constructing a polygon.
#[derive(Debug, Error)]
pub enum PolygonError {
    #[error("a polygon needs at least 3 distinct boundary points, found {found}")]
    TooFewPoints { found: usize },

    #[error("boundary point {index} is too short to normalize")]
    ZeroLengthPoint { index: usize },

    #[error("boundary centroid is degenerate; supply a reference point explicitly")]
    DegenerateReference,

    #[error("small-circle radius must lie in (0, pi), got {radius}")]
    InvalidRadius { radius: f64 },
}

/// A closed region on the unit sphere.
#[derive(Debug, Clone)]
pub struct Polygon {
    points: Vec<[f64; 3]>,
    reference: [f64; 3],
    reference_in: bool,
}

impl Polygon {
    /// Build a polygon from an ordered boundary.
    ///
    /// Points are normalized; consecutive duplicates and a repeated closing
    /// point are dropped. The reference point is the normalized boundary
    /// centroid and is taken to be inside, which holds for any simple
    /// polygon smaller than a hemisphere. Use
    /// [`with_reference`](Self::with_reference) for larger regions.
    pub fn new(points: Vec<[f64; 3]>) -> Result<Polygon, PolygonError> {
        let points = Self::clean_boundary(points)?;
        let mut reference = [0.0; 3];
        for p in &points {
            reference[0] += p[0];
            reference[1] += p[1];
            reference[2] += p[2];
        }
        if !normalize(&mut reference) {
            return Err(PolygonError::DegenerateReference);
        }
        Ok(Polygon {
            points,
            reference,
            reference_in: true,
        })
    }

    /// Build a polygon with an explicit reference point whose containment
    /// sense is already known.
    pub fn with_reference(
        points: Vec<[f64; 3]>,
        mut reference: [f64; 3],
        inside: bool,
    ) -> Result<Polygon, PolygonError> {
        let points = Self::clean_boundary(points)?;
        if !normalize(&mut reference) {
            return Err(PolygonError::DegenerateReference);
        }
        Ok(Polygon {
            points,
            reference,
            reference_in: inside,
        })
    }

    /// Approximate a small circle of angular `radius` (radians) around
    /// `center` with `edges` great-circle edges.
    pub fn small_circle(
        mut center: [f64; 3],
        radius: f64,
        edges: usize,
    ) -> Result<Polygon, PolygonError> {
        if !(0.0..std::f64::consts::PI).contains(&radius) || radius == 0.0 {
            return Err(PolygonError::InvalidRadius { radius });
        }
        if !normalize(&mut center) {
            return Err(PolygonError::ZeroLengthPoint { index: 0 });
        }
        let edges = edges.max(3);

        // Orthonormal basis perpendicular to the center direction.
        let pivot = if center[0].abs() < 0.9 {
            [1.0, 0.0, 0.0]
        } else {
            [0.0, 1.0, 0.0]
        };
        let mut u = cross(&center, &pivot);
        normalize(&mut u);
        let w = cross(&center, &u);

        let (sin_r, cos_r) = radius.sin_cos();
        let mut points = Vec::with_capacity(edges);
        for k in 0..edges {
            let theta = 2.0 * std::f64::consts::PI * (k as f64) / (edges as f64);
            let (sin_t, cos_t) = theta.sin_cos();
            points.push([
                cos_r * center[0] + sin_r * (cos_t * u[0] + sin_t * w[0]),
                cos_r * center[1] + sin_r * (cos_t * u[1] + sin_t * w[1]),
                cos_r * center[2] + sin_r * (cos_t * u[2] + sin_t * w[2]),
            ]);
        }
        Polygon::with_reference(points, center, true)
    }

    fn clean_boundary(mut points: Vec<[f64; 3]>) -> Result<Vec<[f64; 3]>, PolygonError> {
        for (index, p) in points.iter_mut().enumerate() {
            if !normalize(p) {
                return Err(PolygonError::ZeroLengthPoint { index });
            }
        }
        points.dedup_by(|a, b| angle(a, b) < BOUNDARY_TOLERANCE);
        if points.len() > 1 && angle(&points[0], &points[points.len() - 1]) < BOUNDARY_TOLERANCE {
            points.pop();
        }
        if points.len() < 3 {
            return Err(PolygonError::TooFewPoints {
                found: points.len(),
            });
        }
        Ok(points)
    }

    /// Number of boundary points.
    pub fn size(&self) -> usize {
        self.points.len()
    }

    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    pub fn point(&self, index: usize) -> &[f64; 3] {
        &self.points[index]
    }

    pub fn reference_point(&self) -> &[f64; 3] {
        &self.reference
    }

    /// Whether the reference point currently counts as inside.
    pub fn reference_inside(&self) -> bool {
        self.reference_in
    }

    /// Toggle the inside/outside sense in place. Involutive: calling twice
    /// restores the original containment results exactly.
    pub fn invert(&mut self) {
        self.reference_in = !self.reference_in;
    }

    /// True when other holders share this polygon through `Arc`, in which
    /// case it must be cloned before mutation.
    pub fn is_shared(this: &Arc<Polygon>) -> bool {
        Arc::strong_count(this) > 1
    }

    /// True when `v` lies within the region (boundary included).
    pub fn contains(&self, v: &[f64; 3]) -> bool {
        if self.on_boundary(v) {
            return true;
        }
        // The arc from the reference point is ill-defined when the query
        // is (nearly) antipodal to it; route through a waypoint a quarter
        // turn away from both endpoints instead.
        let crossings = if angle(&self.reference, v) > std::f64::consts::PI - 1e-6 {
            let w = self.waypoint();
            self.edge_crossings(&self.reference, &w) + self.edge_crossings(&w, v)
        } else {
            self.edge_crossings(&self.reference, v)
        };
        if crossings % 2 == 0 {
            self.reference_in
        } else {
            !self.reference_in
        }
    }

    /// Crossings of the arc `from`-`to` with the boundary edges.
    fn edge_crossings(&self, from: &[f64; 3], to: &[f64; 3]) -> usize {
        let mut crossings = 0;
        for i in 0..self.points.len() {
            let a = &self.points[i];
            let b = &self.points[(i + 1) % self.points.len()];
            if arcs_cross(from, to, a, b) {
                crossings += 1;
            }
        }
        crossings
    }

    /// A unit vector a quarter turn from the reference point.
    fn waypoint(&self) -> [f64; 3] {
        let pivot = if self.reference[0].abs() < 0.9 {
            [1.0, 0.0, 0.0]
        } else {
            [0.0, 1.0, 0.0]
        };
        let mut w = cross(&self.reference, &pivot);
        normalize(&mut w);
        w
    }

    /// True when `v` lies on a boundary edge or vertex, within tolerance.
    pub fn on_boundary(&self, v: &[f64; 3]) -> bool {
        for i in 0..self.points.len() {
            let a = &self.points[i];
            let b = &self.points[(i + 1) % self.points.len()];
            if angle(a, v) + angle(v, b) - angle(a, b) < BOUNDARY_TOLERANCE {
                return true;
            }
        }
        false
    }

    /// True when any of `points` is contained.
    pub fn contains_any(&self, points: &[[f64; 3]]) -> bool {
        points.iter().any(|p| self.contains(p))
    }

    /// True when all of `points` are contained.
    pub fn contains_all(&self, points: &[[f64; 3]]) -> bool {
        points.iter().all(|p| self.contains(p))
    }
}

fn cross(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Whether the great-circle arcs `a`-`b` and `c`-`d` (each shorter than
/// half the sphere) cross. Arcs lying on the same great circle report no
/// crossing; queries that close to the boundary are resolved by
/// [`Polygon::on_boundary`] before parity counting.
fn arcs_cross(a: &[f64; 3], b: &[f64; 3], c: &[f64; 3], d: &[f64; 3]) -> bool {
    let n1 = cross(a, b);
    let n2 = cross(c, d);
    let mut t = cross(&n1, &n2);
    if !normalize(&mut t) {
        return false;
    }
    let anti = [-t[0], -t[1], -t[2]];
    for candidate in [t, anti] {
        if on_arc(&candidate, a, b) && on_arc(&candidate, c, d) {
            return true;
        }
    }
    false
}

/// Whether `p`, known to lie on the arc's great circle, sits between the
/// arc endpoints.
fn on_arc(p: &[f64; 3], a: &[f64; 3], b: &[f64; 3]) -> bool {
    angle(a, p) + angle(p, b) <= angle(a, b) + CROSSING_TOLERANCE
}
