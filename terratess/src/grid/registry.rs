//! Process-wide grid reuse registry.
//!
//! Many models frequently share one grid file. The registry keys loaded
//! grids by content fingerprint so later loads receive a reference to the
//! already-resident instance instead of constructing a duplicate. Entries
//! hold weak references: the registry never keeps a grid alive on its own.
//!
//! Lookup-or-insert is mutually exclusive per fingerprint, so concurrent
//! model loads racing on the same grid converge on the winner's instance.
//! A reused grid is immutable for the lifetime of every model referencing
//! it; editing requires cloning the grid first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::error::LoadError;

use super::Grid;

static GLOBAL: OnceLock<GridRegistry> = OnceLock::new();

/// Fingerprint-keyed cache of resident grids.
pub struct GridRegistry {
    entries: DashMap<String, Weak<Grid>>,
    reuse_enabled: AtomicBool,
}

impl GridRegistry {
    /// Fresh registry with reuse enabled.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            reuse_enabled: AtomicBool::new(true),
        }
    }

    /// The process-wide registry used by default model loads. Tests and
    /// embedders that need isolation construct their own registry and pass
    /// it explicitly instead.
    pub fn global() -> &'static GridRegistry {
        GLOBAL.get_or_init(GridRegistry::new)
    }

    /// Whether fingerprint-based reuse is currently on.
    pub fn is_reuse_enabled(&self) -> bool {
        self.reuse_enabled.load(Ordering::Relaxed)
    }

    /// Toggle reuse. With reuse off every load constructs a private grid.
    pub fn set_reuse_enabled(&self, enabled: bool) {
        self.reuse_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Number of live entries (dead weak references excluded).
    pub fn resident_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.value().strong_count() > 0)
            .count()
    }

    /// Drop entries whose grids are no longer resident.
    pub fn purge(&self) {
        self.entries.retain(|_, weak| weak.strong_count() > 0);
    }

    /// Return the resident grid for `fingerprint`, or run `load` to bring
    /// it in. The entry stays locked while `load` runs, so a concurrent
    /// load of the same fingerprint blocks and then receives the winner's
    /// instance.
    pub fn get_or_load<F>(&self, fingerprint: &str, load: F) -> Result<Arc<Grid>, LoadError>
    where
        F: FnOnce() -> Result<Grid, LoadError>,
    {
        if !self.is_reuse_enabled() {
            return Ok(Arc::new(load()?));
        }
        match self.entries.entry(fingerprint.to_owned()) {
            Entry::Occupied(mut entry) => {
                if let Some(grid) = entry.get().upgrade() {
                    debug!(fingerprint, "grid reused from registry");
                    return Ok(grid);
                }
                let grid = Arc::new(load()?);
                entry.insert(Arc::downgrade(&grid));
                Ok(grid)
            }
            Entry::Vacant(entry) => {
                let grid = Arc::new(load()?);
                entry.insert(Arc::downgrade(&grid));
                Ok(grid)
            }
        }
    }
}

impl Default for GridRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridBuilder;

    fn make_grid() -> Result<Grid, LoadError> {
        let mut grid = GridBuilder::tetrahedron().build();
        grid.initialize()?;
        Ok(grid)
    }

    #[test]
    fn test_reuse_returns_same_instance() {
        let registry = GridRegistry::new();
        let a = registry.get_or_load("fp-1", make_grid).unwrap();
        let b = registry.get_or_load("fp-1", || panic!("must not reload")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.resident_count(), 1);
    }

    #[test]
    fn test_distinct_fingerprints_load_separately() {
        let registry = GridRegistry::new();
        let a = registry.get_or_load("fp-1", make_grid).unwrap();
        let b = registry.get_or_load("fp-2", make_grid).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.resident_count(), 2);
    }

    #[test]
    fn test_reuse_disabled_loads_private_copies() {
        let registry = GridRegistry::new();
        registry.set_reuse_enabled(false);
        assert!(!registry.is_reuse_enabled());
        let a = registry.get_or_load("fp-1", make_grid).unwrap();
        let b = registry.get_or_load("fp-1", make_grid).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.resident_count(), 0);
    }

    #[test]
    fn test_dropped_grid_is_reloaded() {
        let registry = GridRegistry::new();
        let first = registry.get_or_load("fp-1", make_grid).unwrap();
        drop(first);
        let reloaded = registry.get_or_load("fp-1", make_grid).unwrap();
        assert_eq!(reloaded.vertex_count(), 4);
    }

    #[test]
    fn test_purge_drops_dead_entries() {
        let registry = GridRegistry::new();
        let grid = registry.get_or_load("fp-1", make_grid).unwrap();
        registry.purge();
        assert_eq!(registry.resident_count(), 1);
        drop(grid);
        registry.purge();
        assert_eq!(registry.resident_count(), 0);
    }

    #[test]
    fn test_load_failure_leaves_no_entry() {
        let registry = GridRegistry::new();
        let result = registry.get_or_load("fp-bad", || {
            Err(LoadError::UnknownEarthShape {
                name: "nowhere".into(),
            })
        });
        assert!(result.is_err());
        let ok = registry.get_or_load("fp-bad", make_grid).unwrap();
        assert_eq!(ok.vertex_count(), 4);
    }
}
