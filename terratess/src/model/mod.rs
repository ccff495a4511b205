//! The assembled Earth model.
//!
//! A model binds one grid (shared by reference count, so many models can
//! sit on the same geometry without duplicating it) to an array of
//! profiles indexed 1:1 with the grid's vertices, plus a metadata block.
//! Grids and profiles are built once at load time and are read-mostly
//! thereafter; edits go through the explicit APIs here, which uphold the
//! vertex/profile correspondence and attribute-count agreement.

mod io;
mod metadata;

pub use io::{MODEL_FORMAT_VERSION, MODEL_MAGIC};
pub use metadata::{Metadata, MetadataError};

use std::sync::Arc;

use thiserror::Error;

use crate::grid::Grid;
use crate::position::{Position, PositionConfig};
use crate::profile::Profile;

/// Problems applying an edit to a model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("vertex {vertex} is out of range (grid has {count} vertices)")]
    VertexOutOfRange { vertex: usize, count: usize },

    #[error("profile stores values for {found} attributes, model defines {expected}")]
    AttributeCountMismatch { expected: usize, found: usize },
}

/// One grid plus per-vertex profiles plus metadata.
#[derive(Debug, Clone)]
pub struct Model {
    metadata: Metadata,
    grid: Arc<Grid>,
    profiles: Vec<Profile>,
}

impl Model {
    /// Create a model over `grid` with every profile Empty. Vertices gain
    /// data through [`set_profile`](Self::set_profile).
    pub fn new(metadata: Metadata, grid: Arc<Grid>) -> Model {
        let profiles = vec![Profile::Empty; grid.vertex_count()];
        Model {
            metadata,
            grid,
            profiles,
        }
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// The shared grid. Clone the `Arc` to share geometry with another
    /// model; clone the `Grid` itself before any structural edit.
    pub fn grid(&self) -> &Arc<Grid> {
        &self.grid
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    pub fn profile(&self, vertex: usize) -> &Profile {
        &self.profiles[vertex]
    }

    /// Replace the profile at `vertex`, enforcing attribute agreement.
    pub fn set_profile(&mut self, vertex: usize, profile: Profile) -> Result<(), ModelError> {
        if vertex >= self.profiles.len() {
            return Err(ModelError::VertexOutOfRange {
                vertex,
                count: self.profiles.len(),
            });
        }
        if let Some(found) = profile.attribute_count() {
            let expected = self.metadata.attribute_count();
            if found != expected {
                return Err(ModelError::AttributeCountMismatch { expected, found });
            }
        }
        self.profiles[vertex] = profile;
        Ok(())
    }

    /// New interpolation cursor with the default configuration.
    pub fn position(&self) -> Position<'_> {
        Position::new(self, PositionConfig::default())
    }

    /// New interpolation cursor with an explicit configuration.
    pub fn position_with_config(&self, config: PositionConfig) -> Position<'_> {
        Position::new(self, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridBuilder;
    use crate::profile::Profile;

    fn tetra_model() -> Model {
        let mut grid = GridBuilder::tetrahedron().build();
        grid.initialize().unwrap();
        let metadata = Metadata::with_attributes(&["vp"], &["km/s"]).unwrap();
        Model::new(metadata, Arc::new(grid))
    }

    #[test]
    fn test_new_model_has_one_empty_profile_per_vertex() {
        let model = tetra_model();
        assert_eq!(model.profiles().len(), model.grid().vertex_count());
        assert!(model.profiles().iter().all(|p| matches!(p, Profile::Empty)));
    }

    #[test]
    fn test_set_profile_validates_vertex() {
        let mut model = tetra_model();
        let err = model
            .set_profile(99, Profile::constant(vec![1.0], 1).unwrap())
            .unwrap_err();
        assert!(matches!(
            err,
            ModelError::VertexOutOfRange {
                vertex: 99,
                count: 4
            }
        ));
    }

    #[test]
    fn test_set_profile_validates_attribute_count() {
        let mut model = tetra_model();
        let err = model
            .set_profile(0, Profile::constant(vec![1.0, 2.0], 2).unwrap())
            .unwrap_err();
        assert!(matches!(
            err,
            ModelError::AttributeCountMismatch {
                expected: 1,
                found: 2
            }
        ));
    }

    #[test]
    fn test_models_can_share_one_grid() {
        let model_a = tetra_model();
        let metadata = Metadata::with_attributes(&["vs"], &["km/s"]).unwrap();
        let model_b = Model::new(metadata, Arc::clone(model_a.grid()));
        assert!(Arc::ptr_eq(model_a.grid(), model_b.grid()));
    }
}
