/*!
 * Prelude module for MockVISA Core.
 *
 * This module re-exports commonly used types and functions from the MockVISA
 * Core crate to make them easier to import.
 */

// Re-export error types
pub use crate::error::{Error, Result, SchemaError};

// Re-export value types
pub use crate::types::{Arg, Value, ValueType};

// Re-export the command engine
pub use crate::dispatch::{CallDelays, CommandRegistry, CommandSet, Commands, DispatchTable};
pub use crate::handler::{Combinator, Handler, Reply, Route, Signature, SubDevice};
pub use crate::pattern::CommandPattern;

// Re-export config types
pub use crate::config::{Config, ConfigBuilder, SharedConfig};

// Re-export logging macros
pub use tracing::{debug, error, info, trace, warn};

// Re-export core initialization
pub use crate::init;
