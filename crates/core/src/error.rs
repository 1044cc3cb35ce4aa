//! Errors reported by the RDP accountant.

/// Failure of an accounting operation.
///
/// Argument errors are always raised before any numerical work starts.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DpError {
    /// An argument lies outside its domain.
    #[error("invalid parameter: {msg}")]
    InvalidParameters {
        /// What was rejected and why.
        msg: String,
    },

    /// A series or log-space operation left the representable range.
    #[error("numerical error: {msg}")]
    NumericalError {
        /// Which computation failed.
        msg: String,
    },

    /// An accountant configuration could not be applied.
    #[error("configuration error: {msg}")]
    ConfigError {
        /// The offending setting.
        msg: String,
    },

    /// The requested composition has no RDP bound in this crate.
    #[error("unsupported feature: {msg}")]
    UnsupportedFeature {
        /// The unsupported event shape.
        msg: String,
    },
}

/// Result type for accounting operations.
pub type Result<T> = std::result::Result<T, DpError>;

impl DpError {
    /// Rejected argument.
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        Self::InvalidParameters { msg: msg.into() }
    }

    /// Numerical failure.
    pub fn numerical<S: Into<String>>(msg: S) -> Self {
        Self::NumericalError { msg: msg.into() }
    }

    /// Configuration failure.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError { msg: msg.into() }
    }

    /// Unsupported composition.
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Self::UnsupportedFeature { msg: msg.into() }
    }

    /// Whether this error reports a rejected argument.
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::InvalidParameters { .. })
    }
}
