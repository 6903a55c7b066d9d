use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Platform-specific error: {0}")]
    PlatformError(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Element is not enabled: {0}")]
    ElementNotEnabled(String),

    #[error("Element is stale: {0}")]
    StaleElement(String),
}

impl AutomationError {
    /// Short type label recorded as `exceptionType` in step log error details.
    pub fn type_name(&self) -> &'static str {
        match self {
            AutomationError::ElementNotFound(_) => "ElementNotFound",
            AutomationError::Timeout(_) => "Timeout",
            AutomationError::PlatformError(_) => "PlatformError",
            AutomationError::UnsupportedOperation(_) => "UnsupportedOperation",
            AutomationError::UnsupportedPlatform(_) => "UnsupportedPlatform",
            AutomationError::InvalidArgument(_) => "InvalidArgument",
            AutomationError::Internal(_) => "Internal",
            AutomationError::ElementNotEnabled(_) => "ElementNotEnabled",
            AutomationError::StaleElement(_) => "StaleElement",
        }
    }
}
