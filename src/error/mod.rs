use std::fmt::{Display, Debug, Formatter, Result};


/// Error set for potential LFP setup and sampling errors
pub enum LFPError {
    /// Cell with the given gid is expected on this rank but cannot be found
    CellNotFound(u64),
    /// Cell with the given gid has no soma section to position it with
    SomaNotFound(u64),
    /// Section does not have any 3D points to interpolate from
    SectionHasNoPoints(u64),
    /// Number of membrane currents does not match the number of segments of a section
    SegmentCountMismatch(u64),
    /// Sampling interval must be positive
    InvalidSamplingInterval,
    /// Fraction of distal cells must be within (0, 1]
    InvalidDistalFraction,
    /// Extracellular resistivity must be positive
    InvalidResistivity,
    /// Recorded network could not be parsed
    NetworkParseFailure(String),
}

impl Display for LFPError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            LFPError::CellNotFound(gid) => write!(f, "Cell {} not found on this rank", gid),
            LFPError::SomaNotFound(gid) => write!(f, "Cell {} has no soma section", gid),
            LFPError::SectionHasNoPoints(gid) => write!(f, "Cell {} has a section without 3D points", gid),
            LFPError::SegmentCountMismatch(gid) => write!(
                f, "Cell {} has a section where membrane currents do not match its segment count", gid
            ),
            LFPError::InvalidSamplingInterval => write!(f, "LFP sampling interval must be positive"),
            LFPError::InvalidDistalFraction => write!(f, "Fraction of distal cells must be within (0, 1]"),
            LFPError::InvalidResistivity => write!(f, "Extracellular resistivity must be positive"),
            LFPError::NetworkParseFailure(msg) => write!(f, "Cannot parse recorded network: {}", msg),
        }
    }
}

impl Debug for LFPError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(f, "file: {}, line: {}, error: {}", file!(), line!(), self)
    }
}

/// Error set for potential stimulation protocol errors
pub enum ProtocolError {
    /// Protocol name is not registered
    NotImplemented(String),
    /// Cycles must either be a single on duration or a list of `[on, off]` pairs
    UnexpectedCyclesType,
    /// Parameter has an unexpected type (for example a scalar where a list is needed)
    UnexpectedParameterType(String),
    /// Parameter required by the protocol is missing
    MissingParameter(String),
    /// Parameter list must not be empty
    EmptyParameter(String),
    /// Total duration must be long enough to hold the delay and the pulse
    InsufficientTotalDuration,
    /// Run index is out of bounds
    RunOutOfBounds(usize),
    /// Light intensity index is out of bounds
    IntensityOutOfBounds(usize),
    /// Sampling interval must be positive
    InvalidTimestep,
}

impl Display for ProtocolError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            ProtocolError::NotImplemented(name) => write!(f, "Protocol not implemented: {}", name),
            ProtocolError::UnexpectedCyclesType => write!(f, "Unexpected type for cycles, expected a list or array"),
            ProtocolError::UnexpectedParameterType(name) => write!(f, "Unexpected data type for {}", name),
            ProtocolError::MissingParameter(name) => write!(f, "Missing parameter: {}", name),
            ProtocolError::EmptyParameter(name) => write!(f, "Parameter must not be empty: {}", name),
            ProtocolError::InsufficientTotalDuration => write!(f, "Total duration must be at least the delay plus the on duration"),
            ProtocolError::RunOutOfBounds(run) => write!(f, "Run {} is out of bounds", run),
            ProtocolError::IntensityOutOfBounds(index) => write!(f, "Light intensity index {} is out of bounds", index),
            ProtocolError::InvalidTimestep => write!(f, "Timestep must be positive"),
        }
    }
}

impl Debug for ProtocolError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(f, "file: {}, line: {}, error: {}", file!(), line!(), self)
    }
}

/// Error set for potential fitting errors
pub enum FittingError {
    /// Objective function could not be evaluated
    ObjectiveFunctionFailure(String),
    /// Number of bounds does not match the encoded bitstring
    BoundsMismatch,
    /// Bitstring contains a non binary character
    NonBinary(String),
    /// Not enough data points to fit against
    InsufficientData,
}

impl Display for FittingError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            FittingError::ObjectiveFunctionFailure(msg) => write!(f, "Objective function failure: {}", msg),
            FittingError::BoundsMismatch => write!(f, "Bounds length does not match n_bits"),
            FittingError::NonBinary(string) => write!(f, "Non binary found: {}", string),
            FittingError::InsufficientData => write!(f, "Not enough data points to fit"),
        }
    }
}

impl Debug for FittingError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(f, "file: {}, line: {}, error: {}", file!(), line!(), self)
    }
}

/// Error set for potential spectral analysis errors
pub enum SpectrumError {
    /// Time series must not be empty
    EmptyTimeSeries,
    /// Time series must be the same length to be compared
    TimeSeriesAreNotSameLength,
}

impl Display for SpectrumError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        let err_msg = match self {
            SpectrumError::EmptyTimeSeries => "Time series must not be empty",
            SpectrumError::TimeSeriesAreNotSameLength => "Lengths of input time series are not the same",
        };

        write!(f, "{}", err_msg)
    }
}

impl Debug for SpectrumError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(f, "file: {}, line: {}, error: {}", file!(), line!(), self)
    }
}

/// A set of errors that may occur when using the library
pub enum LfpOpsinError {
    /// Errors related to the LFP estimator
    LFPRelatedError(LFPError),
    /// Errors related to stimulation protocols
    ProtocolRelatedError(ProtocolError),
    /// Errors related to parameter fitting
    FittingRelatedError(FittingError),
    /// Errors related to spectral analysis
    SpectrumRelatedError(SpectrumError),
}

impl Display for LfpOpsinError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            LfpOpsinError::LFPRelatedError(err) => write!(f, "{}", err),
            LfpOpsinError::ProtocolRelatedError(err) => write!(f, "{}", err),
            LfpOpsinError::FittingRelatedError(err) => write!(f, "{}", err),
            LfpOpsinError::SpectrumRelatedError(err) => write!(f, "{}", err),
        }
    }
}

impl Debug for LfpOpsinError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(f, "file: {}, line: {}, error: {}", file!(), line!(), self)
    }
}

impl std::error::Error for LfpOpsinError {}

impl From<LFPError> for LfpOpsinError {
    fn from(err: LFPError) -> LfpOpsinError {
        LfpOpsinError::LFPRelatedError(err)
    }
}

impl From<ProtocolError> for LfpOpsinError {
    fn from(err: ProtocolError) -> LfpOpsinError {
        LfpOpsinError::ProtocolRelatedError(err)
    }
}

impl From<FittingError> for LfpOpsinError {
    fn from(err: FittingError) -> LfpOpsinError {
        LfpOpsinError::FittingRelatedError(err)
    }
}

impl From<SpectrumError> for LfpOpsinError {
    fn from(err: SpectrumError) -> LfpOpsinError {
        LfpOpsinError::SpectrumRelatedError(err)
    }
}
