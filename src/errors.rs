//! Error Types
//!
//! This module defines the error types used throughout the pipeline.
//!
//! # Overview
//!
//! [`PipelineError`] only covers conditions a caller can act on:
//! - Pool misuse (releasing something that was never handed out)
//! - Configuration that cannot be parsed
//! - Collaborator failures surfaced as values
//!
//! Per-frame "skip this piece of work" conditions (a camera that cannot be
//! culled, shadows that cannot be derived, lights over capacity) are not
//! errors; they are logged and reported through
//! [`CameraOutcome`](crate::renderer::CameraOutcome).
//!
//! # Usage
//!
//! ```rust,ignore
//! use xrp::errors::{PipelineError, Result};
//!
//! fn load() -> Result<PipelineSettings> {
//!     PipelineSettings::from_json(text)
//! }
//! ```

use thiserror::Error;

/// The main error type for the frame pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    // ========================================================================
    // Pool Misuse
    // ========================================================================
    /// A command list was returned to a pool that does not have it checked out.
    ///
    /// Either the list was never acquired from this pool or it was already
    /// given back once.
    #[error("Command list #{id} ('{name}') was not checked out from this pool")]
    CommandListNotAcquired {
        /// Pool-assigned serial of the offending list
        id: u64,
        /// Debug name the list carried when it was returned
        name: String,
    },

    /// A transient slot was acquired while its previous acquisition was still live.
    #[error("Transient target '{slot}' is already acquired this frame")]
    TransientAlreadyAcquired {
        /// Symbolic slot name
        slot: &'static str,
    },

    /// A transient slot was released without a matching acquire.
    #[error("Transient target '{slot}' is not acquired")]
    TransientNotAcquired {
        /// Symbolic slot name
        slot: &'static str,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Pipeline settings could not be parsed.
    #[error("Failed to parse pipeline settings: {0}")]
    ConfigParse(#[from] serde_json::Error),

    // ========================================================================
    // Collaborator Errors
    // ========================================================================
    /// The scene query could not produce culling results for a camera.
    #[error("Culling failed for camera '{camera}'")]
    CullingFailed {
        /// Debug name of the camera
        camera: String,
    },
}

/// Alias for `Result<T, PipelineError>`.
pub type Result<T> = std::result::Result<T, PipelineError>;
