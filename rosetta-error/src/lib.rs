//! # rosetta-error
//!
//! Unified error handling for the rosetta solver - following OpenDAL's error handling practices.
//!
//! ## Design Philosophy
//!
//! - **ErrorKind**: Know what error occurred (e.g., ExtractionFailed, SchemaInvalid)
//! - **ErrorStatus**: Decide how to handle it (Permanent, Temporary, Persistent)
//! - **Error Context**: Assist in locating the cause with rich context
//! - **Error Source**: Wrap underlying errors without leaking raw types
//!
//! ## Usage
//!
//! ```rust
//! use rosetta_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::ExtractionFailed, "no paired examples found")
//!         .with_operation("extract::run")
//!         .with_context("input_chars", "412"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All functions return `Result<T, rosetta_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - Same error handled once, subsequent ops only append context
//! - Don't abuse `From<OtherError>` to prevent raw error leakage

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using the rosetta Error
pub type Result<T> = std::result::Result<T, Error>;
