//! Error types for the core crate.
//!
//! This module is the single source of truth for errors raised while
//! loading, validating, or storing pipeline artifacts. Downstream crates
//! wrap these in their own stage-specific error enums via `#[from]`.
//!
//! ## Hierarchy
//!
//! ```text
//! CoreError (top-level)
//! ├── ArtifactError   (file I/O, NPZ container, metadata)
//! ├── DataError       (shape / ordering invariant violations)
//! └── ConfigError     (pipeline parameter validation)
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Convenient `Result` alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

// ---------------------------------------------------------------------------
// CoreError — top-level aggregator
// ---------------------------------------------------------------------------

/// Top-level error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An artifact could not be read or written.
    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    /// An in-memory entity violated one of its invariants.
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    /// A pipeline configuration value is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// ArtifactError
// ---------------------------------------------------------------------------

/// Errors raised by the single-file NPZ artifact container.
///
/// Every variant carries the path of the offending file so a failing stage
/// reports exactly which handoff broke. Stages do not recover from these;
/// the error aborts the stage (the pipeline is deliberately fragile).
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// A low-level I/O failure while opening, reading, or renaming.
    #[error("I/O error on `{path}`: {source}")]
    Io {
        /// Path being accessed when the error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The NPZ container itself is malformed or a member failed to
    /// (de)serialize.
    #[error("NPZ error in `{path}`: {message}")]
    Npz {
        /// Path of the artifact.
        path: PathBuf,
        /// Description from the NPZ layer.
        message: String,
    },

    /// A required member is missing from the container.
    #[error("Artifact `{path}` has no member `{member}`")]
    MissingMember {
        /// Path of the artifact.
        path: PathBuf,
        /// The member that was expected.
        member: String,
    },

    /// The `meta.json` member is missing or does not parse.
    #[error("Malformed metadata in `{path}`: {message}")]
    Metadata {
        /// Path of the artifact.
        path: PathBuf,
        /// Parse error description.
        message: String,
    },

    /// An array member has the wrong dimensionality.
    #[error("Member `{member}` of `{path}` has unexpected shape: {message}")]
    Shape {
        /// Path of the artifact.
        path: PathBuf,
        /// Offending member name.
        member: String,
        /// Description of the mismatch.
        message: String,
    },
}

impl ArtifactError {
    /// Construct an [`ArtifactError::Io`].
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArtifactError::Io { path: path.into(), source }
    }

    /// Construct an [`ArtifactError::Npz`].
    pub fn npz<S: Into<String>>(path: impl Into<PathBuf>, msg: S) -> Self {
        ArtifactError::Npz { path: path.into(), message: msg.into() }
    }

    /// Construct an [`ArtifactError::Metadata`].
    pub fn metadata<S: Into<String>>(path: impl Into<PathBuf>, msg: S) -> Self {
        ArtifactError::Metadata { path: path.into(), message: msg.into() }
    }

    /// Construct an [`ArtifactError::Shape`].
    pub fn shape<S: Into<String>>(
        path: impl Into<PathBuf>,
        member: impl Into<String>,
        msg: S,
    ) -> Self {
        ArtifactError::Shape {
            path: path.into(),
            member: member.into(),
            message: msg.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// DataError
// ---------------------------------------------------------------------------

/// Invariant violations on in-memory entities.
#[derive(Debug, Error)]
pub enum DataError {
    /// Two related containers disagree on a dimension.
    #[error("Shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// What was being checked.
        what: &'static str,
        /// Expected shape.
        expected: Vec<usize>,
        /// Actual shape.
        actual: Vec<usize>,
    },

    /// A channel name was looked up but does not exist.
    #[error("Unknown channel `{name}`")]
    UnknownChannel {
        /// The missing channel name.
        name: String,
    },

    /// Channel names are not unique within a recording.
    #[error("Duplicate channel name `{name}`")]
    DuplicateChannel {
        /// The duplicated name.
        name: String,
    },

    /// A sampling rate is zero or negative.
    #[error("Invalid sampling rate {sfreq} Hz")]
    InvalidSamplingRate {
        /// The offending rate.
        sfreq: f64,
    },

    /// Event sample indices are not strictly increasing.
    #[error("Event list is not sorted by sample index (row {row})")]
    UnsortedEvents {
        /// First offending row.
        row: usize,
    },

    /// Source-space vertex ids are not strictly increasing.
    #[error("Source-space vertices are not strictly increasing")]
    UnsortedVertices,

    /// A label references vertices outside its hemisphere's source space.
    #[error("Label `{name}` contains vertex {vertex} not present in the {hemi} source space")]
    LabelVertexOutOfSpace {
        /// Label name.
        name: String,
        /// Offending vertex id.
        vertex: u32,
        /// Hemisphere short name (`lh`/`rh`).
        hemi: &'static str,
    },

    /// An entity that must be non-empty is empty.
    #[error("{what} is empty")]
    Empty {
        /// What was empty.
        what: &'static str,
    },
}

impl DataError {
    /// Construct a [`DataError::ShapeMismatch`].
    pub fn shape_mismatch(what: &'static str, expected: Vec<usize>, actual: Vec<usize>) -> Self {
        DataError::ShapeMismatch { what, expected, actual }
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors produced when validating or loading a
/// [`PipelineConfig`](crate::config::PipelineConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field has an invalid value.
    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Name of the field.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// A configuration file could not be read from disk.
    #[error("Cannot read config file `{path}`: {source}")]
    FileRead {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration file contains malformed JSON.
    #[error("Cannot parse config file `{path}`: {source}")]
    Parse {
        /// Path that was being parsed.
        path: PathBuf,
        /// Underlying JSON parse error.
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    /// Construct a [`ConfigError::InvalidValue`].
    pub fn invalid_value<S: Into<String>>(field: &'static str, reason: S) -> Self {
        ConfigError::InvalidValue { field, reason: reason.into() }
    }
}
