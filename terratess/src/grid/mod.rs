//! The multi-level triangular tessellation.
//!
//! A grid owns its vertices (unit direction vectors) and a single arena of
//! triangle records organized into refinement levels: level 0 is the
//! coarsest closed mesh and each finer level replaces a subset of the
//! previous level's triangles with their subdivisions, carrying the rest
//! forward. Neighbor and level lookups are array-indexed; point location
//! exploits spatial coherence through the walk in [`crate::position`]
//! rather than through any auxiliary spatial index.
//!
//! Grids are read-mostly: once built (or loaded) and passed through
//! [`Grid::initialize`], they are shared immutably behind `Arc` and may be
//! queried from many threads at once. Editing a shared grid requires
//! cloning it first.

mod builder;
pub(crate) mod io;
mod registry;
mod triangle;

pub use builder::GridBuilder;
pub use io::{GRID_FORMAT_VERSION, GRID_MAGIC};
pub use registry::GridRegistry;
pub use triangle::{Level, Triangle, NO_TRIANGLE};

use thiserror::Error;
use tracing::debug;

use crate::earth::scalar_triple;

/// Containment tolerance for the walk predicates. A scalar triple product
/// down to this far below zero still counts as inside, which is what makes
/// edge and vertex hits deterministic: the first triangle tested that
/// accepts the point owns it.
pub(crate) const WALK_TOLERANCE: f64 = 1e-15;

/// Structural invariant violations detected by [`Grid::initialize`].
#[derive(Debug, Error)]
pub enum GridError {
    #[error("grid must have at least one vertex, one triangle and one level")]
    EmptyGrid,

    #[error("triangle {triangle} references vertex {vertex}, but the grid has {count} vertices")]
    VertexOutOfRange {
        triangle: u32,
        vertex: u32,
        count: usize,
    },

    #[error("vertex {vertex} is not unit length (|v| = {length})")]
    NonUnitVertex { vertex: u32, length: f64 },

    #[error("triangle {triangle} is degenerate or wound clockwise (orientation {orientation})")]
    BadOrientation { triangle: u32, orientation: f64 },

    #[error("level {level} does not start where the previous level ended")]
    LevelsNotContiguous { level: usize },

    #[error("levels cover {covered} triangles but the arena holds {total}")]
    LevelCoverageMismatch { covered: u32, total: usize },

    #[error("triangle {triangle} records level {recorded} but lies in the range of level {actual}")]
    LevelMismatch {
        triangle: u32,
        recorded: u32,
        actual: u32,
    },

    #[error("neighbor link of triangle {triangle} across edge {edge} is not symmetric")]
    AsymmetricNeighbor { triangle: u32, edge: usize },

    #[error("neighbor {neighbor} of triangle {triangle} does not share its edge {edge}")]
    NeighborEdgeMismatch {
        triangle: u32,
        edge: usize,
        neighbor: u32,
    },

    #[error("neighbor {neighbor} of triangle {triangle} lies on a different level")]
    NeighborLevelMismatch { triangle: u32, neighbor: u32 },
}

/// Outcome of a bounded walk within one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WalkOutcome {
    /// Containing triangle, plus the number of steps taken.
    Found { triangle: u32, steps: u32 },
    /// Step budget exhausted without finding the point.
    BudgetExhausted,
    /// Walk stepped off the edge of a partial grid.
    ExitedDomain,
}

/// The triangulated, multi-level tessellation.
#[derive(Debug, Clone)]
pub struct Grid {
    vertices: Vec<[f64; 3]>,
    triangles: Vec<Triangle>,
    levels: Vec<Level>,
    fingerprint: String,
    software_version: String,
    generation_date: String,
}

impl Grid {
    /// Assemble a grid from parts. The result must pass through
    /// [`initialize`](Self::initialize) before it is queried.
    pub fn new(vertices: Vec<[f64; 3]>, triangles: Vec<Triangle>, levels: Vec<Level>) -> Self {
        Self {
            vertices,
            triangles,
            levels,
            fingerprint: String::new(),
            software_version: format!("terratess.{}", crate::VERSION),
            generation_date: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn vertex(&self, index: usize) -> &[f64; 3] {
        &self.vertices[index]
    }

    pub fn vertices(&self) -> &[[f64; 3]] {
        &self.vertices
    }

    pub fn triangle(&self, id: u32) -> &Triangle {
        &self.triangles[id as usize]
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn level(&self, index: usize) -> &Level {
        &self.levels[index]
    }

    /// Finest level index.
    pub fn last_level(&self) -> usize {
        self.levels.len() - 1
    }

    /// Content fingerprint, stable across platforms and byte orders.
    /// Empty until the grid has been initialized.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn software_version(&self) -> &str {
        &self.software_version
    }

    pub fn generation_date(&self) -> &str {
        &self.generation_date
    }

    pub(crate) fn set_provenance(&mut self, software_version: String, generation_date: String) {
        self.software_version = software_version;
        self.generation_date = generation_date;
    }

    /// The three vertex positions of a triangle.
    pub fn corners(&self, id: u32) -> [&[f64; 3]; 3] {
        let t = &self.triangles[id as usize];
        [
            &self.vertices[t.vertices[0] as usize],
            &self.vertices[t.vertices[1] as usize],
            &self.vertices[t.vertices[2] as usize],
        ]
    }

    /// Unit-normalized centroid of a triangle.
    pub fn centroid(&self, id: u32) -> [f64; 3] {
        let [a, b, c] = self.corners(id);
        let mut v = [a[0] + b[0] + c[0], a[1] + b[1] + c[1], a[2] + b[2] + c[2]];
        crate::earth::normalize(&mut v);
        v
    }

    /// Scalar triple products of `v` against the three edges of a triangle.
    ///
    /// Entry `k` corresponds to the edge opposite vertex `k`; it is
    /// non-negative exactly when `v` is on the triangle's side of that
    /// edge, and the three entries are the unnormalized barycentric
    /// coordinates of `v`.
    pub fn edge_signs(&self, id: u32, v: &[f64; 3]) -> [f64; 3] {
        let [a, b, c] = self.corners(id);
        [
            scalar_triple(b, c, v),
            scalar_triple(c, a, v),
            scalar_triple(a, b, v),
        ]
    }

    /// True when `v` lies inside (or on the boundary of) triangle `id`.
    pub fn contains(&self, id: u32, v: &[f64; 3]) -> bool {
        self.edge_signs(id, v)
            .iter()
            .all(|&s| s >= -WALK_TOLERANCE)
    }

    /// Walk within the level containing `start`, stepping across the edge
    /// with the most negative sign until the triangle containing `v` is
    /// found or `budget` steps have been taken.
    pub(crate) fn walk_from(&self, start: u32, v: &[f64; 3], budget: u32) -> WalkOutcome {
        let mut current = start;
        let mut steps = 0;
        loop {
            let signs = self.edge_signs(current, v);
            let mut exit_edge = None;
            let mut worst = -WALK_TOLERANCE;
            for (k, &s) in signs.iter().enumerate() {
                if s < worst {
                    worst = s;
                    exit_edge = Some(k);
                }
            }
            let Some(edge) = exit_edge else {
                return WalkOutcome::Found {
                    triangle: current,
                    steps,
                };
            };
            match self.triangle(current).neighbor(edge) {
                Some(next) => current = next,
                None => return WalkOutcome::ExitedDomain,
            }
            steps += 1;
            if steps > budget {
                return WalkOutcome::BudgetExhausted;
            }
        }
    }

    /// Step budget for a walk within `level`, proportional to the mesh
    /// diameter of that level.
    pub(crate) fn walk_budget(&self, level: usize) -> u32 {
        let count = self.levels[level].count as f64;
        32 + (4.0 * count.sqrt()) as u32
    }

    /// Exhaustive scan of one level; the fallback when a walk exhausts its
    /// budget. Returns the lowest-id containing triangle, keeping edge and
    /// vertex ownership deterministic.
    pub(crate) fn scan_level(&self, level: usize, v: &[f64; 3]) -> Option<u32> {
        let range = self.levels[level].range();
        (range.start as u32..range.end as u32).find(|&id| self.contains(id, v))
    }

    /// Validate structural invariants, derive descendant links and compute
    /// the content fingerprint. Must be called after construction or any
    /// structural edit, and is called by the loaders before a grid is
    /// exposed.
    pub fn initialize(&mut self) -> Result<(), GridError> {
        if self.vertices.is_empty() || self.triangles.is_empty() || self.levels.is_empty() {
            return Err(GridError::EmptyGrid);
        }

        self.check_levels()?;
        self.check_vertices()?;
        self.check_triangles()?;
        self.check_neighbors()?;
        self.link_descendants();

        self.fingerprint = self.compute_fingerprint();
        debug!(
            vertices = self.vertices.len(),
            triangles = self.triangles.len(),
            levels = self.levels.len(),
            fingerprint = %self.fingerprint,
            "grid initialized"
        );
        Ok(())
    }

    fn check_levels(&self) -> Result<(), GridError> {
        let mut expected_first = 0u32;
        for (i, level) in self.levels.iter().enumerate() {
            if level.first != expected_first || level.count == 0 {
                return Err(GridError::LevelsNotContiguous { level: i });
            }
            expected_first = level.end();
        }
        if expected_first as usize != self.triangles.len() {
            return Err(GridError::LevelCoverageMismatch {
                covered: expected_first,
                total: self.triangles.len(),
            });
        }
        Ok(())
    }

    fn check_vertices(&self) -> Result<(), GridError> {
        for (i, v) in self.vertices.iter().enumerate() {
            let length = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
            if (length - 1.0).abs() > 1e-6 {
                return Err(GridError::NonUnitVertex {
                    vertex: i as u32,
                    length,
                });
            }
        }
        Ok(())
    }

    fn check_triangles(&self) -> Result<(), GridError> {
        for (id, t) in self.triangles.iter().enumerate() {
            let id = id as u32;
            for &vid in &t.vertices {
                if vid as usize >= self.vertices.len() {
                    return Err(GridError::VertexOutOfRange {
                        triangle: id,
                        vertex: vid,
                        count: self.vertices.len(),
                    });
                }
            }
            let actual = self
                .levels
                .iter()
                .position(|l| l.contains(id))
                .expect("levels cover the arena") as u32;
            if t.level != actual {
                return Err(GridError::LevelMismatch {
                    triangle: id,
                    recorded: t.level,
                    actual,
                });
            }
            let [a, b, c] = self.corners(id);
            let orientation = scalar_triple(a, b, c);
            if orientation <= 0.0 {
                return Err(GridError::BadOrientation {
                    triangle: id,
                    orientation,
                });
            }
        }
        Ok(())
    }

    fn check_neighbors(&self) -> Result<(), GridError> {
        for (id, t) in self.triangles.iter().enumerate() {
            let id = id as u32;
            for edge in 0..3 {
                let Some(n) = t.neighbor(edge) else {
                    continue;
                };
                if n == id {
                    return Err(GridError::AsymmetricNeighbor { triangle: id, edge });
                }
                let neighbor = self
                    .triangles
                    .get(n as usize)
                    .filter(|other| other.level == t.level)
                    .ok_or(GridError::NeighborLevelMismatch {
                        triangle: id,
                        neighbor: n,
                    })?;
                if !neighbor.neighbors.contains(&(id as i32)) {
                    return Err(GridError::AsymmetricNeighbor {
                        triangle: id,
                        edge,
                    });
                }
                let (ea, eb) = t.edge_vertices(edge);
                if !neighbor.vertices.contains(&ea) || !neighbor.vertices.contains(&eb) {
                    return Err(GridError::NeighborEdgeMismatch {
                        triangle: id,
                        edge,
                        neighbor: n,
                    });
                }
            }
        }
        Ok(())
    }

    /// Derive descendant links by locating each triangle's centroid on the
    /// next finer level. Walks hot-start from the previous triangle's
    /// descendant, which keeps this pass close to linear.
    fn link_descendants(&mut self) {
        for level in 0..self.levels.len().saturating_sub(1) {
            let finer = level + 1;
            let budget = self.walk_budget(finer);
            let mut hint = self.levels[finer].first;
            for id in self.levels[level].range() {
                let centroid = self.centroid(id as u32);
                let found = match self.walk_from(hint, &centroid, budget) {
                    WalkOutcome::Found { triangle, .. } => Some(triangle),
                    // Partial refinement or an unlucky hint: fall back to
                    // the exhaustive scan before giving up.
                    _ => self.scan_level(finer, &centroid),
                };
                self.triangles[id].descendant = match found {
                    Some(t) => {
                        hint = t;
                        t as i32
                    }
                    None => NO_TRIANGLE,
                };
            }
        }
        for id in self.levels[self.last_level()].range() {
            self.triangles[id].descendant = NO_TRIANGLE;
        }
    }

    /// FNV-1a 64 over the structural content. Descendants are excluded
    /// because they are derived, not stored.
    fn compute_fingerprint(&self) -> String {
        const FNV_OFFSET: u64 = 0xcbf29ce484222325;
        const FNV_PRIME: u64 = 0x00000100000001b3;

        let mut hash = FNV_OFFSET;
        let mut eat = |bytes: &[u8]| {
            for &b in bytes {
                hash ^= b as u64;
                hash = hash.wrapping_mul(FNV_PRIME);
            }
        };

        eat(&(self.vertices.len() as u64).to_le_bytes());
        eat(&(self.triangles.len() as u64).to_le_bytes());
        eat(&(self.levels.len() as u64).to_le_bytes());
        for level in &self.levels {
            eat(&level.first.to_le_bytes());
            eat(&level.count.to_le_bytes());
        }
        for v in &self.vertices {
            for &x in v {
                eat(&x.to_bits().to_le_bytes());
            }
        }
        for t in &self.triangles {
            for &vid in &t.vertices {
                eat(&vid.to_le_bytes());
            }
            eat(&t.level.to_le_bytes());
            for &n in &t.neighbors {
                eat(&n.to_le_bytes());
            }
        }
        format!("{hash:016x}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tetrahedron() -> Grid {
        let mut grid = GridBuilder::tetrahedron().build();
        grid.initialize().unwrap();
        grid
    }

    #[test]
    fn test_tetrahedron_structure() {
        let grid = tetrahedron();
        assert_eq!(grid.vertex_count(), 4);
        assert_eq!(grid.triangle_count(), 4);
        assert_eq!(grid.level_count(), 1);
    }

    #[test]
    fn test_initialize_rejects_asymmetric_neighbors() {
        let mut grid = GridBuilder::tetrahedron().build();
        // Point triangle 0's first neighbor at the triangle across a
        // different edge; the shared-edge check must catch it.
        grid.triangles[0].neighbors[0] = grid.triangles[0].neighbors[1];
        let err = grid.initialize().unwrap_err();
        assert!(
            matches!(
                err,
                GridError::AsymmetricNeighbor { .. } | GridError::NeighborEdgeMismatch { .. }
            ),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_initialize_rejects_clockwise_winding() {
        let mut grid = GridBuilder::tetrahedron().build();
        grid.triangles[2].vertices.swap(1, 2);
        let err = grid.initialize().unwrap_err();
        assert!(matches!(err, GridError::BadOrientation { triangle: 2, .. }));
    }

    #[test]
    fn test_initialize_rejects_non_unit_vertex() {
        let mut grid = GridBuilder::tetrahedron().build();
        grid.vertices[1] = [0.5, 0.0, 0.0];
        let err = grid.initialize().unwrap_err();
        assert!(matches!(err, GridError::NonUnitVertex { vertex: 1, .. }));
    }

    #[test]
    fn test_every_point_is_contained_somewhere() {
        let grid = tetrahedron();
        let probes = [
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, -1.0],
            [-0.577, 0.577, 0.577],
        ];
        for p in probes {
            let mut v = p;
            crate::earth::normalize(&mut v);
            assert!(
                grid.scan_level(0, &v).is_some(),
                "point {v:?} not contained by any triangle"
            );
        }
    }

    #[test]
    fn test_walk_agrees_with_scan() {
        let mut grid = GridBuilder::icosahedron().subdivide(3).build();
        grid.initialize().unwrap();
        let finest = grid.last_level();
        let budget = grid.walk_budget(finest);
        let start = grid.level(finest).first;
        for seed in 0..50u32 {
            // Deterministic pseudo-random probes.
            let a = (seed as f64) * 0.7511;
            let b = (seed as f64) * 2.83 + 0.4;
            let mut v = [a.sin() * b.cos(), a.sin() * b.sin(), a.cos()];
            crate::earth::normalize(&mut v);
            let walked = match grid.walk_from(start, &v, budget) {
                WalkOutcome::Found { triangle, .. } => triangle,
                other => panic!("walk failed for probe {seed}: {other:?}"),
            };
            assert!(grid.contains(walked, &v));
        }
    }

    #[test]
    fn test_descendants_link_into_next_level() {
        let mut grid = GridBuilder::icosahedron().subdivide(2).build();
        grid.initialize().unwrap();
        for level in 0..grid.last_level() {
            for id in grid.level(level).range() {
                let d = grid
                    .triangle(id as u32)
                    .descendant()
                    .expect("complete levels leave no triangle without a descendant");
                assert!(grid.level(level + 1).contains(d));
                let centroid = grid.centroid(id as u32);
                assert!(grid.contains(d, &centroid));
            }
        }
        for id in grid.level(grid.last_level()).range() {
            assert_eq!(grid.triangle(id as u32).descendant(), None);
        }
    }

    #[test]
    fn test_fingerprint_stable_and_content_sensitive() {
        let a = tetrahedron();
        let b = tetrahedron();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 16);

        let mut c = GridBuilder::icosahedron().build();
        c.initialize().unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
