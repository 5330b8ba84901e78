/*!
 * Error types for sessions, events, locks and resources.
 */
use thiserror::Error;

use mockvisa_core::error::Error as CoreError;

use crate::event::EventKind;

/// Error type for simulated VISA operations
#[derive(Error, Debug)]
pub enum VisaError {
    /// The session does not support this event kind
    #[error("Event {0} is not supported by this session")]
    NotSupported(EventKind),

    /// The event kind is not enabled
    #[error("Event {0} is not enabled")]
    NotEnabled(EventKind),

    /// The event kind is already enabled
    #[error("Event {0} is already enabled")]
    AlreadyEnabled(EventKind),

    /// A wait or lock acquisition ran out of time
    #[error("Timeout: {0}")]
    Timeout(String),

    /// No resource is registered under the name
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// The resource name could not be parsed
    #[error("Invalid resource name: {0}")]
    InvalidResourceName(String),

    /// No open session has this handle
    #[error("Invalid session: {0}")]
    InvalidSession(u32),

    /// The requested mode is not simulated
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Release of a lock nobody holds
    #[error("Resource {0} is not locked")]
    NotLocked(String),

    /// A device-side helper needs a session and none is attached
    #[error("Device {0} is not attached to a session")]
    NotAttached(String),

    /// Unknown attribute id
    #[error("Unsupported attribute: {0:#x}")]
    UnsupportedAttribute(u32),

    /// Attribute is read-only
    #[error("Attribute {0:#x} is read-only")]
    ReadOnlyAttribute(u32),

    /// Attribute value has the wrong type
    #[error("Invalid state for attribute {0:#x}: {1}")]
    InvalidAttributeState(u32, String),

    /// Error raised while dispatching a command
    #[error("Command error: {0}")]
    Command(#[from] CoreError),
}

/// Result type for simulated VISA operations
pub type Result<T> = std::result::Result<T, VisaError>;

impl VisaError {
    /// Create a new timeout error
    pub fn timeout<S: AsRef<str>>(msg: S) -> Self {
        VisaError::Timeout(msg.as_ref().to_string())
    }

    /// Create a new resource-not-found error
    pub fn resource_not_found<S: AsRef<str>>(name: S) -> Self {
        VisaError::ResourceNotFound(name.as_ref().to_string())
    }

    /// Create a new invalid-resource-name error
    pub fn invalid_resource_name<S: AsRef<str>>(name: S) -> Self {
        VisaError::InvalidResourceName(name.as_ref().to_string())
    }

    /// Create a new not-implemented error
    pub fn not_implemented<S: AsRef<str>>(msg: S) -> Self {
        VisaError::NotImplemented(msg.as_ref().to_string())
    }

    /// Whether this is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, VisaError::Timeout(_))
    }

    /// The dispatch error, if this wraps one
    pub fn as_command(&self) -> Option<&CoreError> {
        match self {
            VisaError::Command(e) => Some(e),
            _ => None,
        }
    }
}
