//! Render error taxonomy
//!
//! Resource-level failures are returned from the creating call and logged
//! at the table boundary; they never unwind a frame. Device creation failure
//! is the only error that aborts start-up.

use crate::backend::BackendError;
use crate::config::ConfigError;

/// Errors raised by the render context and its resource tables
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    /// Native object creation failed
    ///
    /// The caller receives no handle and the renderer keeps running with the
    /// resource missing.
    #[error("Allocation failed for {resource}: {reason}")]
    AllocationFailure {
        /// Resource being created
        resource: String,
        /// What the native side reported
        reason: String,
    },

    /// A file could not be opened or decoded
    #[error("Resource not found: {path} ({reason})")]
    ResourceNotFound {
        /// Path that was tried last
        path: String,
        /// Decode or IO failure description
        reason: String,
    },

    /// The device is lost and the requested object has no native backing
    #[error("Device lost")]
    DeviceLost,

    /// A fixed-capacity slot table has no free slot left
    #[error("{table} table exhausted ({capacity} slots)")]
    TableExhausted {
        /// Table label
        table: &'static str,
        /// Capacity of the table
        capacity: usize,
    },

    /// A handle was released more times than it was acquired
    #[error("{table} slot {index} released more times than acquired")]
    OverRelease {
        /// Table label
        table: &'static str,
        /// Slot index
        index: u32,
    },

    /// The handle's generation no longer matches its slot
    #[error("Stale {table} handle {index}:{generation}")]
    StaleHandle {
        /// Table label
        table: &'static str,
        /// Slot index
        index: u32,
        /// Generation carried by the handle
        generation: u32,
    },

    /// The handle does not address any slot of the table
    #[error("Invalid {table} handle {index}")]
    InvalidHandle {
        /// Table label
        table: &'static str,
        /// Slot index
        index: u32,
    },

    /// No device could be created at start-up
    #[error("Renderer initialization failed: {0}")]
    Initialization(String),

    /// Native API failure not covered by a more specific variant
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Filesystem error outside resource decoding
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for render operations
pub type RenderResult<T> = Result<T, RenderError>;

impl RenderError {
    /// Build an [`RenderError::AllocationFailure`]
    pub fn allocation(resource: impl Into<String>, reason: impl ToString) -> Self {
        Self::AllocationFailure {
            resource: resource.into(),
            reason: reason.to_string(),
        }
    }

    /// Build a [`RenderError::ResourceNotFound`]
    pub fn not_found(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::ResourceNotFound {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Map a native error, keeping device loss distinguishable
    pub fn from_device(error: BackendError) -> Self {
        match error {
            BackendError::DeviceLost => Self::DeviceLost,
            other => Self::Backend(other),
        }
    }

    /// Whether the error means the handle itself is unusable
    pub const fn is_handle_error(&self) -> bool {
        matches!(
            self,
            Self::OverRelease { .. } | Self::StaleHandle { .. } | Self::InvalidHandle { .. }
        )
    }
}
