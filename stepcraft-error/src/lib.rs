//! # stepcraft-error
//!
//! Unified error handling for stepcraft.
//!
//! ## Design Philosophy
//!
//! - **ErrorKind**: Know what error occurred (e.g., ConfigInvalid, InferenceFailed)
//! - **ErrorStatus**: Decide how to handle it (Permanent, Temporary, Persistent)
//! - **Error Context**: Assist in locating the cause with rich context
//! - **Error Source**: Wrap underlying errors without leaking raw types
//!
//! ## Usage
//!
//! ```rust
//! use stepcraft_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::ConfigInvalid, "no API key for provider 'anthropic'")
//!         .with_operation("interpreter::step")
//!         .with_context("agent", "planner")
//!         .with_context("model", "claude-sonnet-4-20250514"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All fallible engine functions return `Result<T, stepcraft_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - Same error handled once, subsequent ops only append context
//! - Recoverable conditions (denied tools, parse failures) are data, not errors

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using stepcraft Error
pub type Result<T> = std::result::Result<T, Error>;
