use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;

/// Error kinds for map unit operations.
///
/// Each kind names one failure category of the registry, the containers it
/// opens, or the queries that run over them.
///
/// # Examples
///
/// ```rust
/// use mapunit::errors::{ErrorKind, MapError, MapResult};
///
/// fn example() -> MapResult<()> {
///     Err(MapError::new("Unit not found", ErrorKind::UnknownUnit))
/// }
/// assert_eq!(example().unwrap_err().kind(), &ErrorKind::UnknownUnit);
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    // Registry Errors
    /// An active unit with the same name is already registered
    DuplicateUnit,
    /// The unit does not exist or has been removed
    UnknownUnit,

    // Container Errors
    /// The backing container could not be opened or read
    OpenFailed,
    /// The container header is missing or malformed
    HeaderParseFailed,
    /// The scale index section is missing or malformed
    IndexDecodeFailed,

    // Feature Errors
    /// A feature record could not be decoded
    DecodeFailed,

    /// A caller supplied an invalid value
    InvalidArgument,
    /// Generic IO error
    IOError,
    /// Internal error (usually indicates a bug)
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::DuplicateUnit => write!(f, "Duplicate unit"),
            ErrorKind::UnknownUnit => write!(f, "Unknown unit"),
            ErrorKind::OpenFailed => write!(f, "Open failed"),
            ErrorKind::HeaderParseFailed => write!(f, "Header parse failed"),
            ErrorKind::IndexDecodeFailed => write!(f, "Index decode failed"),
            ErrorKind::DecodeFailed => write!(f, "Decode failed"),
            ErrorKind::InvalidArgument => write!(f, "Invalid argument"),
            ErrorKind::IOError => write!(f, "IO error"),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Error type shared by every fallible operation of this crate.
///
/// `MapError` carries a message, its [`ErrorKind`], an optional cause and the
/// backtrace of the place where it was created.
#[derive(Clone)]
pub struct MapError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<MapError>>,
    backtrace: Backtrace,
}

impl MapError {
    /// Creates a new `MapError` with the specified message and error kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        MapError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: Backtrace::new_unresolved(),
        }
    }

    /// Creates a new `MapError` that keeps `cause` as its source.
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: MapError) -> Self {
        MapError {
            message: message.to_string(),
            error_kind,
            cause: Some(Box::new(cause)),
            backtrace: Backtrace::new_unresolved(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&MapError> {
        self.cause.as_deref()
    }
}

impl Display for MapError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for MapError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}\nCaused by: {:?}", self.message, cause),
            None => {
                let mut backtrace = self.backtrace.clone();
                backtrace.resolve();
                write!(f, "{}\n{:?}", self.message, backtrace)
            }
        }
    }
}

impl Error for MapError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// `MapResult<T>` is shorthand for `Result<T, MapError>`.
pub type MapResult<T> = Result<T, MapError>;

impl From<std::io::Error> for MapError {
    fn from(err: std::io::Error) -> Self {
        let error_kind = match err.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                ErrorKind::OpenFailed
            }
            _ => ErrorKind::IOError,
        };
        MapError::new(&format!("IO error: {}", err), error_kind)
    }
}
