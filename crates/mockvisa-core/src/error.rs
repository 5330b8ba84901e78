/*!
 * Error types for the MockVISA core crate.
 */
use thiserror::Error;

/// An instrument type declares a command set that cannot be compiled.
///
/// These are definition bugs. They surface the first time the dispatch table
/// of the offending type is built.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The template did not compile to a valid regular expression
    #[error("invalid command pattern {template:?}: {reason}")]
    InvalidPattern {
        /// The declaring template
        template: String,
        /// Reason reported by the regex compiler
        reason: String,
    },

    /// Capture groups and operation parameters do not line up
    #[error("pattern {template:?} captures {captures} argument(s) but the operation takes {params}")]
    ArgumentCount {
        /// The declaring template
        template: String,
        /// Number of capture groups in the compiled pattern
        captures: usize,
        /// Number of parameters of the bound operation
        params: usize,
    },

    /// A raw pattern was used to route into a sub-device
    #[error("raw pattern {0:?} cannot route to a sub-device")]
    RawSubsystem(String),

    /// Two bindings of one type compile to the same pattern
    #[error("pattern {0:?} is declared more than once")]
    DuplicatePattern(String),
}

/// Error type for MockVISA core operations
#[derive(Error, Debug)]
pub enum Error {
    /// The command set of an instrument type is malformed
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// No declared pattern matches the command
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// More than one declared pattern matches the command
    #[error("Command {command:?} matches multiple patterns: {patterns:?}")]
    AmbiguousCommand {
        /// The command as received
        command: String,
        /// Templates of every matching entry
        patterns: Vec<String>,
    },

    /// A captured argument could not be converted to its declared type
    #[error("Argument error: {0}")]
    Argument(String),

    /// A route addressed a sub-device that does not exist
    #[error("No such unit: {0}")]
    NoSuchUnit(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Runtime error
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for MockVISA core operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new unknown command error
    pub fn unknown_command<S: AsRef<str>>(command: S) -> Self {
        Error::UnknownCommand(command.as_ref().to_string())
    }

    /// Create a new argument error
    pub fn argument<S: AsRef<str>>(msg: S) -> Self {
        Error::Argument(msg.as_ref().to_string())
    }

    /// Create a new no-such-unit error
    pub fn no_such_unit<S: AsRef<str>>(msg: S) -> Self {
        Error::NoSuchUnit(msg.as_ref().to_string())
    }

    /// Create a new configuration error
    pub fn config<S: AsRef<str>>(msg: S) -> Self {
        Error::Config(msg.as_ref().to_string())
    }

    /// Create a new runtime error
    pub fn runtime<S: AsRef<str>>(msg: S) -> Self {
        Error::Runtime(msg.as_ref().to_string())
    }

    /// Create a new other error
    pub fn other<S: AsRef<str>>(msg: S) -> Self {
        Error::Other(msg.as_ref().to_string())
    }

    /// Whether this error is a definition bug rather than a bad command
    pub fn is_schema(&self) -> bool {
        matches!(self, Error::Schema(_))
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}
