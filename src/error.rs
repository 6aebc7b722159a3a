//! Error module for the spiking MNIST front-end.
use std::error::Error;
use std::fmt;

/// Error types for the library.
#[derive(Debug, PartialEq)]
pub enum SNNError {
    /// Error for lengths that disagree with the configured shapes, e.g., an image with the wrong number of pixels.
    DimensionMismatch {
        what: String,
        expected: usize,
        found: usize,
    },
    /// Error for a counter hand-off file with the wrong number of lines or non-integer content.
    MalformedHandoffFile {
        line: usize,
        reason: String,
    },
    /// Error raised when the external simulator fails, times out or exits abnormally.
    SimulatorFailure(String),
    /// The simulator call was abandoned because a shutdown was requested.
    Cancelled,
    /// Error for invalid parameters
    InvalidParameter(String),
    /// Error for invalid operation, e.g., evaluating a window out of order.
    InvalidOperation(String),
    /// Error for out of bounds access, e.g., image index beyond the dataset.
    OutOfBounds(String),
    /// Error for I/O operations.
    IOError(String),
    /// Error raised while processing a given cycle, with the image it was working on.
    CycleFailure {
        cycle: usize,
        image: usize,
        source: Box<SNNError>,
    },
}

impl SNNError {
    /// Attach the cycle and image index to an error raised inside the processing loop.
    pub fn in_cycle(self, cycle: usize, image: usize) -> Self {
        SNNError::CycleFailure {
            cycle,
            image,
            source: Box::new(self),
        }
    }
}

impl fmt::Display for SNNError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SNNError::DimensionMismatch {
                what,
                expected,
                found,
            } => write!(
                f,
                "Dimension mismatch for {}: expected {}, found {}",
                what, expected, found
            ),
            SNNError::MalformedHandoffFile { line, reason } => {
                write!(f, "Malformed hand-off file at line {}: {}", line, reason)
            }
            SNNError::SimulatorFailure(e) => write!(f, "Simulator failure: {}", e),
            SNNError::Cancelled => write!(f, "Simulator call cancelled by shutdown request"),
            SNNError::InvalidParameter(e) => write!(f, "Invalid parameters: {}", e),
            SNNError::InvalidOperation(e) => write!(f, "Invalid operation: {}", e),
            SNNError::OutOfBounds(e) => write!(f, "Index out of bounds: {}", e),
            SNNError::IOError(e) => write!(f, "I/O error: {}", e),
            SNNError::CycleFailure {
                cycle,
                image,
                source,
            } => write!(f, "Cycle {} (image {}) failed: {}", cycle, image, source),
        }
    }
}

impl Error for SNNError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SNNError::CycleFailure { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SNNError {
    fn from(e: std::io::Error) -> Self {
        SNNError::IOError(e.to_string())
    }
}
