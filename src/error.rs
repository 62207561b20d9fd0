use thiserror::Error;

/// Errors returned by the clustering pipeline in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Input slice is empty.
    #[error("empty input")]
    EmptyInput,

    /// Invalid parameter value.
    #[error("invalid parameter {name}: {message}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Human-readable explanation.
        message: &'static str,
    },

    /// A selected column has no precomputed `[min, max]` domain.
    #[error("missing domain for axis {axis}: compute column domains before clustering")]
    MissingDomain {
        /// Axis (selected column position).
        axis: usize,
    },

    /// A column domain is not a finite, ordered interval.
    #[error("invalid domain for axis {axis}: [{min}, {max}]")]
    InvalidDomain {
        /// Axis (selected column position).
        axis: usize,
        /// Lower bound.
        min: f32,
        /// Upper bound.
        max: f32,
    },

    /// A row value lies outside its column domain.
    #[error("value {value} on axis {axis} is outside the domain [{min}, {max}]")]
    OutOfDomain {
        /// Axis (selected column position).
        axis: usize,
        /// Offending value.
        value: f32,
        /// Lower bound.
        min: f32,
        /// Upper bound.
        max: f32,
    },

    /// Points in a dataset have inconsistent dimensionality.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Expected dimensionality.
        expected: usize,
        /// Found dimensionality.
        found: usize,
    },

    /// Indexing finished but no cell reached the density threshold.
    #[error(
        "no dense cells among {cells} occupied cells: all data would be noise, \
         reconsider sigma and xi"
    )]
    NoDenseCells {
        /// Number of occupied cells.
        cells: usize,
    },

    /// The caller raised the cancellation flag.
    #[error("clustering cancelled")]
    Cancelled,
}

impl Error {
    /// Whether this error reports bad parameters or column domains.
    ///
    /// Configuration errors are raised before any indexing work starts.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::InvalidParameter { .. } | Error::MissingDomain { .. } | Error::InvalidDomain { .. }
        )
    }
}

/// Result type used by this crate.
pub type Result<T> = std::result::Result<T, Error>;
