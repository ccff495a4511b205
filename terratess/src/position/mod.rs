//! Point-query interpolation cursor.
//!
//! A [`Position`] is a transient, stateful cursor bound to one model. Each
//! query locates the triangle containing the query direction by walking
//! the tessellation from the previously resolved triangle (the hot-start
//! cache), computes barycentric weights against the triangle's vertices,
//! and combines per-vertex profile values at the query radius.
//!
//! Cursors are cheap to construct and cloneable, so spatially coherent
//! query streams each carry their own cursor; a cursor must not be shared
//! across concurrent callers. Query faults are scoped to the failing query
//! and never corrupt the cursor or the model.

use thiserror::Error;
use tracing::warn;

use crate::grid::WalkOutcome;
use crate::model::Model;
use crate::profile::{RadiusPolicy, RangeError};

/// Per-cursor query configuration.
#[derive(Debug, Clone, Copy)]
pub struct PositionConfig {
    radius_out_of_range_allowed: bool,
}

impl PositionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a query radius outside a profile's stored interval clamps
    /// to the nearest endpoint (true, the default) or faults (false).
    pub fn with_radius_out_of_range_allowed(mut self, allowed: bool) -> Self {
        self.radius_out_of_range_allowed = allowed;
        self
    }

    pub fn is_radius_out_of_range_allowed(&self) -> bool {
        self.radius_out_of_range_allowed
    }

    fn policy(&self) -> RadiusPolicy {
        if self.radius_out_of_range_allowed {
            RadiusPolicy::Clamp
        } else {
            RadiusPolicy::Strict
        }
    }
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            radius_out_of_range_allowed: true,
        }
    }
}

/// Recoverable faults raised by individual queries.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The query direction lies outside the tessellated domain. Cannot
    /// occur on a closed mesh, only on partial/regional grids.
    #[error("query point is outside the tessellated domain")]
    OutsideDomain,

    /// The query radius violated a contributing profile's interval while
    /// out-of-range radii were disallowed.
    #[error(transparent)]
    RadiusOutOfRange(#[from] RangeError),

    /// The attribute index does not exist in this model.
    #[error("attribute {index} is out of range (model defines {count})")]
    AttributeOutOfRange { index: usize, count: usize },

    /// `value` was called before a query point was set.
    #[error("no query point has been set on this cursor")]
    NotSet,
}

/// Resolution state of a cursor, explicit so cursors can be reset and
/// resumed deliberately rather than through hidden mutable fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkState {
    /// No prior hint; the next query searches from level 0.
    Unresolved,
    /// The last query resolved this triangle; interpolation state is valid
    /// and the next query walks from here.
    Located { triangle: u32 },
    /// A hint survives from an earlier query, but interpolation state is
    /// no longer valid (after `reset` or a failed query).
    Stale { hint: u32 },
}

/// Interpolation cursor over one model.
#[derive(Debug, Clone)]
pub struct Position<'m> {
    model: &'m Model,
    config: PositionConfig,
    state: WalkState,
    unit_vector: [f64; 3],
    radius: f64,
    vertex_ids: [u32; 3],
    weights: [f64; 3],
    last_walk_steps: u32,
    last_walk_fell_back: bool,
}

impl<'m> Position<'m> {
    pub(crate) fn new(model: &'m Model, config: PositionConfig) -> Self {
        Self {
            model,
            config,
            state: WalkState::Unresolved,
            unit_vector: [0.0; 3],
            radius: 0.0,
            vertex_ids: [0; 3],
            weights: [0.0; 3],
            last_walk_steps: 0,
            last_walk_fell_back: false,
        }
    }

    pub fn model(&self) -> &'m Model {
        self.model
    }

    pub fn config(&self) -> &PositionConfig {
        &self.config
    }

    pub fn state(&self) -> WalkState {
        self.state
    }

    /// Set the query point from geographic coordinates (degrees) and a
    /// radius in km, resolving the containing triangle.
    pub fn set(&mut self, lat_deg: f64, lon_deg: f64, radius_km: f64) -> Result<(), QueryError> {
        let v = self
            .model
            .metadata()
            .earth_shape()
            .unit_vector(lat_deg, lon_deg);
        self.set_unit_vector(v, radius_km)
    }

    /// Set the query point from a direction vector and a radius in km.
    pub fn set_unit_vector(&mut self, mut v: [f64; 3], radius_km: f64) -> Result<(), QueryError> {
        if !crate::earth::normalize(&mut v) {
            self.demote();
            return Err(QueryError::OutsideDomain);
        }
        match self.locate(&v) {
            Ok(triangle) => {
                self.resolve(triangle, &v, radius_km);
                Ok(())
            }
            Err(e) => {
                self.demote();
                Err(e)
            }
        }
    }

    /// Invalidate interpolation state while keeping the walk hint, so the
    /// cursor can be reused for an unrelated query stream.
    pub fn reset(&mut self) {
        self.demote();
    }

    /// Interpolated value of `attribute` at the current query point.
    ///
    /// NaN propagates from Empty profiles: a query over uncovered vertices
    /// reports NaN rather than inventing a value.
    pub fn value(&self, attribute: usize) -> Result<f64, QueryError> {
        let count = self.model.metadata().attribute_count();
        if attribute >= count {
            return Err(QueryError::AttributeOutOfRange {
                index: attribute,
                count,
            });
        }
        if !matches!(self.state, WalkState::Located { .. }) {
            return Err(QueryError::NotSet);
        }
        let policy = self.config.policy();
        let mut acc = 0.0;
        for k in 0..3 {
            let profile = self.model.profile(self.vertex_ids[k] as usize);
            acc += self.weights[k] * profile.value(attribute, self.radius, policy)?;
        }
        Ok(acc)
    }

    /// True when the interpolated value of `attribute` would be NaN.
    pub fn is_nan(&self, attribute: usize) -> bool {
        self.value(attribute).map(f64::is_nan).unwrap_or(false)
    }

    /// The raw interpolation basis: the three vertex ids with their
    /// barycentric weights, for callers composing their own combination.
    pub fn coefficients(&self) -> Result<[(u32, f64); 3], QueryError> {
        if !matches!(self.state, WalkState::Located { .. }) {
            return Err(QueryError::NotSet);
        }
        Ok([
            (self.vertex_ids[0], self.weights[0]),
            (self.vertex_ids[1], self.weights[1]),
            (self.vertex_ids[2], self.weights[2]),
        ])
    }

    /// Triangle resolved by the last successful query.
    pub fn triangle(&self) -> Option<u32> {
        match self.state {
            WalkState::Located { triangle } => Some(triangle),
            _ => None,
        }
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn unit_vector(&self) -> &[f64; 3] {
        &self.unit_vector
    }

    /// Steps taken by the walk of the last successful query.
    pub fn last_walk_steps(&self) -> u32 {
        self.last_walk_steps
    }

    /// Whether the last query exhausted its hot-start budget and degraded
    /// to the hierarchical search.
    pub fn last_walk_fell_back(&self) -> bool {
        self.last_walk_fell_back
    }

    fn demote(&mut self) {
        if let WalkState::Located { triangle } = self.state {
            self.state = WalkState::Stale { hint: triangle };
        }
    }

    fn resolve(&mut self, triangle: u32, v: &[f64; 3], radius_km: f64) {
        let grid = self.model.grid();
        let mut weights = grid.edge_signs(triangle, v);
        // Inside the triangle every sign is non-negative up to the walk
        // tolerance; squash that tolerance band to exact zero.
        for w in &mut weights {
            if *w < 0.0 {
                *w = 0.0;
            }
        }
        let sum: f64 = weights.iter().sum();
        for w in &mut weights {
            *w /= sum;
        }
        self.vertex_ids = grid.triangle(triangle).vertices;
        self.weights = weights;
        self.unit_vector = *v;
        self.radius = radius_km;
        self.state = WalkState::Located { triangle };
    }

    fn locate(&mut self, v: &[f64; 3]) -> Result<u32, QueryError> {
        let grid = self.model.grid();
        let finest = grid.last_level();
        let hint = match self.state {
            WalkState::Located { triangle } => Some(triangle),
            WalkState::Stale { hint } => Some(hint),
            WalkState::Unresolved => None,
        };

        if let Some(start) = hint {
            match grid.walk_from(start, v, grid.walk_budget(finest)) {
                WalkOutcome::Found { triangle, steps } => {
                    self.last_walk_steps = steps;
                    self.last_walk_fell_back = false;
                    return Ok(triangle);
                }
                WalkOutcome::BudgetExhausted => {
                    warn!(
                        start,
                        budget = grid.walk_budget(finest),
                        "walk budget exhausted, degrading to hierarchical search"
                    );
                }
                WalkOutcome::ExitedDomain => {}
            }
            self.last_walk_fell_back = true;
        } else {
            self.last_walk_fell_back = false;
        }

        self.hierarchical(v)
    }

    /// Full search restarted from level 0: walk the coarsest level, then
    /// descend descendant links, walking locally at each finer level.
    fn hierarchical(&mut self, v: &[f64; 3]) -> Result<u32, QueryError> {
        let grid = self.model.grid();
        let mut total_steps = 0;

        let mut current = match grid.walk_from(grid.level(0).first, v, grid.walk_budget(0)) {
            WalkOutcome::Found { triangle, steps } => {
                total_steps += steps;
                triangle
            }
            _ => grid.scan_level(0, v).ok_or(QueryError::OutsideDomain)?,
        };

        while let Some(descendant) = grid.triangle(current).descendant() {
            let level = grid.triangle(descendant).level as usize;
            let next = match grid.walk_from(descendant, v, grid.walk_budget(level)) {
                WalkOutcome::Found { triangle, steps } => {
                    total_steps += steps;
                    Some(triangle)
                }
                _ => grid.scan_level(level, v),
            };
            match next {
                Some(t) => current = t,
                // The refined region of the finer level does not cover the
                // point; the current level is the finest applicable one.
                None => break,
            }
        }

        self.last_walk_steps = total_steps;
        Ok(current)
    }
}

/// A pool of cursors for worker loops that prefer recycling warmed-up
/// cursors over constructing fresh ones.
///
/// A checked-out cursor is exclusively owned until released, which is what
/// makes pooled reuse safe; a released cursor keeps its walk hint, so the
/// next session hot-starts where the last one ended.
pub struct PositionPool<'m> {
    model: &'m Model,
    config: PositionConfig,
    idle: std::sync::Mutex<Vec<Position<'m>>>,
}

impl<'m> PositionPool<'m> {
    pub fn new(model: &'m Model, config: PositionConfig) -> Self {
        Self {
            model,
            config,
            idle: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Take an idle cursor, or construct one when none is free.
    pub fn acquire(&self) -> Position<'m> {
        let recycled = self.idle.lock().expect("pool lock poisoned").pop();
        recycled.unwrap_or_else(|| Position::new(self.model, self.config))
    }

    /// Return a cursor to the pool, invalidating its interpolation state
    /// but keeping its walk hint.
    pub fn release(&self, mut position: Position<'m>) {
        position.reset();
        self.idle.lock().expect("pool lock poisoned").push(position);
    }

    /// Number of cursors currently idle in the pool.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().expect("pool lock poisoned").len()
    }
}
