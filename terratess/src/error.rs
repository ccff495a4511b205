//! Load/save fault taxonomy.
//!
//! Faults during persistence are terminal: no partial model or grid is ever
//! exposed to the caller. Query-time faults live with the query types
//! instead ([`crate::position::QueryError`]) and never invalidate a loaded
//! model.

use std::path::PathBuf;

use thiserror::Error;

use crate::grid::GridError;
use crate::io::StreamError;
use crate::model::MetadataError;
use crate::profile::ProfileError;

/// Terminal failure while loading or saving a model or grid file.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Underlying stream fault (truncation, malformed token, I/O).
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// The file does not start with a recognized magic marker.
    #[error("unrecognized file magic '{found}' in {path}")]
    BadMagic { path: PathBuf, found: String },

    /// The file's byte-order flag is not a known value.
    #[error("unrecognized byte-order flag {flag}")]
    BadByteOrder { flag: u8 },

    /// The file was written by a newer format revision.
    #[error("unsupported format version {version} (this build reads up to {supported})")]
    UnsupportedVersion { version: i32, supported: i32 },

    /// The metadata names an unknown reference shape.
    #[error("unknown earth shape '{name}'")]
    UnknownEarthShape { name: String },

    /// A structural marker line or token was missing where required.
    #[error("expected {expected}, found '{found}'")]
    UnexpectedToken {
        expected: &'static str,
        found: String,
    },

    /// A profile record carries an unknown variant tag.
    #[error("unknown profile type '{tag}' for vertex {vertex}")]
    UnknownProfileType { vertex: usize, tag: String },

    /// The model's vertex count disagrees with its grid.
    #[error("model stores {profiles} profiles but its grid has {vertices} vertices")]
    VertexCountMismatch { profiles: usize, vertices: usize },

    /// The grid content does not hash to the fingerprint recorded with it.
    #[error("grid fingerprint mismatch: recorded {recorded}, computed {computed}")]
    FingerprintMismatch { recorded: String, computed: String },

    /// A model references an external grid file that cannot be found.
    #[error("referenced grid file not found: {path}")]
    GridFileMissing { path: PathBuf },

    /// Structural invariant violation discovered after parsing.
    #[error(transparent)]
    Grid(#[from] GridError),

    /// A parsed profile record is internally inconsistent.
    #[error(transparent)]
    Profile(#[from] ProfileError),

    /// Parsed metadata is internally inconsistent.
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}
