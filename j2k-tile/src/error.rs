//! Error types for tile processing.

use core::fmt;

/// The main error type for tile processing operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileError {
    /// Errors related to regions, windows and decomposition geometry.
    Geometry(GeometryError),
    /// Errors related to the windowed tile buffer.
    Buffer(BufferError),
    /// Errors related to reserving memory or worker-local coders.
    Allocation(AllocationError),
    /// Errors reported by the entropy coder for a single code-block.
    Coding(CoderError),
    /// Errors related to the DC shift and component transforms.
    Transform(TransformError),
}

/// Errors related to regions, windows and decomposition geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryError {
    /// The requested window does not intersect the tile.
    EmptyWindow,
    /// The tile-component has no samples.
    InvalidDimensions,
    /// The sample precision is out of range.
    InvalidPrecision,
    /// The number of resolutions is out of range.
    InvalidResolutionCount,
    /// More resolutions were discarded than the component has.
    InvalidReduction,
    /// The code-block size exponents are out of range.
    InvalidCodeBlockSize,
    /// The precinct size exponents are out of range.
    InvalidPrecinctSize,
    /// Not enough quantization step sizes were provided.
    MissingStepSize,
}

/// Errors related to the windowed tile buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    /// The buffer has no backing storage yet.
    Unallocated,
    /// The storage was transferred out of the buffer.
    Detached,
    /// The stride is smaller than the buffer width.
    StrideTooSmall,
    /// The supplied storage is too small for the given stride.
    StorageTooSmall,
    /// The operation requires unified storage.
    NotUnified,
    /// The operation is not possible on storage the buffer does not own.
    NotOwned,
    /// Two code-block regions overlap.
    Overlap,
    /// A code-block region lies outside its band.
    OutOfBounds,
}

/// Errors related to reserving memory or worker-local coders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationError {
    /// Sample storage could not be reserved.
    Buffer,
    /// A worker-local coder could not be created.
    Coder,
}

/// Errors reported by the entropy coder for a single code-block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoderError {
    /// The coded data ended too early.
    Truncated,
    /// The coded data is inconsistent with the code-block.
    Corrupt,
    /// The code-block uses a feature the coder does not support.
    Unsupported,
    /// The coder panicked while processing the code-block.
    Panicked,
}

/// Errors related to the DC shift and component transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformError {
    /// The multi-component transform requires at least three components.
    TooFewComponents,
    /// The number of shift descriptors does not match the number of planes.
    ComponentMismatch,
    /// The component planes have different sizes.
    PlaneSizeMismatch,
    /// The sample precision is out of range.
    InvalidPrecision,
    /// The custom transform matrix does not match the component count.
    InvalidMatrix,
}

impl fmt::Display for TileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Geometry(e) => write!(f, "{e}"),
            Self::Buffer(e) => write!(f, "{e}"),
            Self::Allocation(e) => write!(f, "{e}"),
            Self::Coding(e) => write!(f, "{e}"),
            Self::Transform(e) => write!(f, "{e}"),
        }
    }
}

impl fmt::Display for GeometryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyWindow => write!(f, "window does not intersect the tile"),
            Self::InvalidDimensions => write!(f, "invalid tile-component dimensions"),
            Self::InvalidPrecision => write!(f, "invalid sample precision"),
            Self::InvalidResolutionCount => write!(f, "invalid number of resolutions"),
            Self::InvalidReduction => write!(f, "cannot discard that many resolutions"),
            Self::InvalidCodeBlockSize => write!(f, "invalid code-block size"),
            Self::InvalidPrecinctSize => write!(f, "invalid precinct size"),
            Self::MissingStepSize => write!(f, "missing quantization step size"),
        }
    }
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unallocated => write!(f, "buffer is not allocated"),
            Self::Detached => write!(f, "buffer storage was transferred"),
            Self::StrideTooSmall => write!(f, "stride is smaller than the buffer width"),
            Self::StorageTooSmall => write!(f, "storage is too small for the buffer"),
            Self::NotUnified => write!(f, "operation requires unified storage"),
            Self::NotOwned => write!(f, "buffer does not own its storage"),
            Self::Overlap => write!(f, "code-block regions overlap"),
            Self::OutOfBounds => write!(f, "code-block region lies outside its band"),
        }
    }
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffer => write!(f, "failed to allocate sample storage"),
            Self::Coder => write!(f, "failed to create block coder"),
        }
    }
}

impl fmt::Display for CoderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "code-block data is truncated"),
            Self::Corrupt => write!(f, "code-block data is corrupt"),
            Self::Unsupported => write!(f, "code-block uses an unsupported feature"),
            Self::Panicked => write!(f, "block coder panicked"),
        }
    }
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooFewComponents => {
                write!(f, "multi-component transform needs at least three components")
            }
            Self::ComponentMismatch => write!(f, "shift descriptors do not match components"),
            Self::PlaneSizeMismatch => write!(f, "component planes differ in size"),
            Self::InvalidPrecision => write!(f, "invalid sample precision"),
            Self::InvalidMatrix => write!(f, "invalid transform matrix"),
        }
    }
}

impl std::error::Error for TileError {}
impl std::error::Error for GeometryError {}
impl std::error::Error for BufferError {}
impl std::error::Error for AllocationError {}
impl std::error::Error for CoderError {}
impl std::error::Error for TransformError {}

impl From<GeometryError> for TileError {
    fn from(e: GeometryError) -> Self {
        Self::Geometry(e)
    }
}

impl From<BufferError> for TileError {
    fn from(e: BufferError) -> Self {
        Self::Buffer(e)
    }
}

impl From<AllocationError> for TileError {
    fn from(e: AllocationError) -> Self {
        Self::Allocation(e)
    }
}

impl From<CoderError> for TileError {
    fn from(e: CoderError) -> Self {
        Self::Coding(e)
    }
}

impl From<TransformError> for TileError {
    fn from(e: TransformError) -> Self {
        Self::Transform(e)
    }
}

/// Result type for tile processing operations.
pub type Result<T> = core::result::Result<T, TileError>;

macro_rules! bail {
    ($err:expr) => {
        return Err($err.into())
    };
}

macro_rules! err {
    ($err:expr) => {
        Err($err.into())
    };
}

pub(crate) use bail;
pub(crate) use err;
