use std::{error, fmt};

// -------------------------------------------------------------------------------------------------

/// Provides an enumeration of all possible errors reported by grainflux.
#[derive(Debug, Clone, PartialEq)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    SampleError(String),
    ParameterError(String),
    SendError(String),
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SampleError(str) => write!(f, "Invalid sample data: {str}"),
            Self::ParameterError(str) => write!(f, "Invalid parameter: {str}"),
            Self::SendError(str) => write!(f, "Failed to send message: {str}"),
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        let err = Error::ParameterError("Gain out of range".to_string());
        assert_eq!(err.to_string(), "Invalid parameter: Gain out of range");
        let err = Error::SendError("Queue is full".to_string());
        assert_eq!(err.to_string(), "Failed to send message: Queue is full");
    }
}
