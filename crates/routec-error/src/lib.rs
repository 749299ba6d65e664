//! Error type shared by the routec crates.
//!
//! An [`Error`] carries a [`ErrorKind`] saying what went wrong, an
//! [`ErrorStatus`] saying whether a retry could help, the operation that
//! raised it, and key/value context (class, attribute, path) appended as it
//! travels up.
//!
//! ```rust
//! use routec_error::{Error, ErrorKind};
//!
//! let err = Error::duplicate_attribute("App\\Controllers\\Http\\Blog", "Prefix")
//!     .with_operation("scanner::scan_source")
//!     .with_context("path", "app/Controllers/Http/Blog.php");
//! assert_eq!(err.kind(), ErrorKind::DuplicateAttribute);
//! assert!(err.is_configuration());
//! ```
//!
//! Configuration kinds stop a compile. Cache and IO failures are logged by
//! the caller and treated as a miss.

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

pub type Result<T> = std::result::Result<T, Error>;
