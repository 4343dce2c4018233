//! Error types for this crate.

use thiserror::Error;

/// Catch-all error for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// The process mesh has at least as many dimensions as the domain.
    #[error("mesh dimension ({mesh}) must be lower than domain dimension ({domain})")]
    MeshDimension {
        /// Number of effective (size > 1) mesh dimensions.
        mesh: usize,
        /// Number of domain dimensions.
        domain: usize,
    },
    /// The product of the mesh entries does not match the communicator size.
    #[error("wrong number of processes ({size}) for specified mesh ({mesh:?})")]
    MeshSize {
        /// Communicator size.
        size: usize,
        /// Effective process mesh.
        mesh: Vec<usize>,
    },
    /// Two consecutive subbases of a compound basis do not share an endpoint.
    #[error("subbases not adjacent: interval ending at {left} followed by interval starting at {right}")]
    SubbasesNotAdjacent {
        /// Right endpoint of the leading subbasis.
        left: f64,
        /// Left endpoint of the trailing subbasis.
        right: f64,
    },
    /// The subbases of a compound basis disagree on the coefficient dtype.
    #[error("subbases returned different coefficient dtypes")]
    SubbasisDtypeMismatch,
    /// A grid scale does not produce an integer number of grid points.
    #[error("scaled grid size is not an integer: {0}")]
    NonIntegerGridSize(f64),
    /// A grid scale is zero, negative, or not finite.
    #[error("invalid grid scale: {0}")]
    InvalidScale(f64),
    /// An array does not have the expected extent along the transformed axis.
    #[error("{context} does not match expected size: got {actual}, expected {expected}")]
    ShapeMismatch {
        /// What was being checked.
        context: &'static str,
        /// Size found along the axis.
        actual: usize,
        /// Size required along the axis.
        expected: usize,
    },
    /// An array does not have the expected dtype.
    #[error("{context} does not match expected dtype")]
    DtypeMismatch {
        /// What was being checked.
        context: &'static str,
    },
    /// A parity-aware operation was invoked without a definite parity.
    #[error("operation requires a definite parity along the axis")]
    UndefinedParity,
    /// A symbolic caller attempted to linearize a nonlinear operator.
    #[error("operator is nonlinear in the target field")]
    NonlinearOperator,
    /// An interpolation position lies outside every subbasis interval.
    #[error("position {0} outside any subbasis interval")]
    PositionOutsideInterval(f64),
    /// A layout was requested under an unrecognized name.
    #[error("unknown layout name: {0:?}")]
    UnknownLayout(String),
    /// The basis kind does not define the requested operator data.
    #[error("{0} is not defined for this basis")]
    Unsupported(&'static str),
}

/// Short-hand for `Result` with this crate's [`enum@Error`].
pub type Result<T> = std::result::Result<T, Error>;
