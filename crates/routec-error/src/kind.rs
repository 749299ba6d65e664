use strum_macros::{Display, IntoStaticStr};

/// What went wrong.
///
/// Configuration kinds point at a defect in the application's controller
/// declarations; the rest are IO, parse and cache trouble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr, Display)]
#[non_exhaustive]
pub enum ErrorKind {
    Unexpected,

    // Configuration
    ConfigInvalid,
    /// `Prefix` or `Group` declared twice on one class.
    DuplicateAttribute,
    /// `Route` middleware that does not fit the route's HTTP/CLI context.
    InvalidMiddleware,
    /// Command group outside `^[a-z][a-z0-9_:-]*$`.
    InvalidGroupName,
    /// The scanner matched a class that reflection cannot find.
    ClassNotFound,

    // Source
    SyntaxError,

    // Filesystem
    FileNotFound,
    PermissionDenied,
    IoFailed,
    TraversalFailed,

    // Cache files
    SerializationFailed,
    DeserializationFailed,

    // Validation
    InvalidArgument,
    /// A route pattern that is not a valid regular expression.
    InvalidPattern,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        (*self).into()
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::IoFailed)
    }

    /// Kinds that stop route compilation for the current scope.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ErrorKind::ConfigInvalid
                | ErrorKind::DuplicateAttribute
                | ErrorKind::InvalidMiddleware
                | ErrorKind::InvalidGroupName
                | ErrorKind::ClassNotFound
        )
    }
}
