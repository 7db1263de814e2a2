//! Errors generated by the backend.
use crate::Id;
use thiserror::Error as ThisError;

/// Convenience wrapper to represent success or meaningful backend error.
pub type FpgaResult<T> = std::result::Result<T, Error>;

/// Errors generated by the backend. The kind is boxed so that results stay
/// one pointer wide.
pub struct Error {
    kind: Box<ErrorKind>,
    post_msg: Option<String>,
}

/// Standard error type for P4FPGA errors.
#[derive(ThisError)]
pub enum ErrorKind {
    /// The top-level block has no package instance with the expected name.
    #[error("Could not locate top-level block; is there a `{0}` module?")]
    MissingEntryPoint(Id),
    /// Construction of the program model failed.
    #[error("Program model construction failed: {0}")]
    ModelBuildFailure(#[source] Error),
    /// No output directory was configured.
    #[error("Must specify output directory")]
    MissingOutputPath,

    /// The input program is structurally invalid for the hardware target.
    #[error("Malformed structure: {0}")]
    MalformedStructure(String),
    /// A name was used without being declared.
    #[error("Undefined {kind} name: {name}")]
    Undefined { name: Id, kind: String },
    /// A name was declared twice.
    #[error("Name already bound by {kind}: {name}")]
    AlreadyBound { name: Id, kind: String },

    /// The input file could not be read or decoded.
    #[error("Invalid file: {0}")]
    InvalidFile(String),
    /// An output could not be written.
    #[error("{0}")]
    WriteError(String),
    /// Miscellaneous error message
    #[error("{0}")]
    Misc(String),
}

impl Error {
    fn new(kind: ErrorKind) -> Self {
        Self {
            kind: Box::new(kind),
            post_msg: None,
        }
    }

    /// Attach a note that is printed after the main message.
    pub fn with_post_msg(mut self, msg: Option<String>) -> Self {
        self.post_msg = msg;
        self
    }

    pub fn missing_entry_point<S: Into<Id>>(name: S) -> Self {
        Self::new(ErrorKind::MissingEntryPoint(name.into()))
    }
    pub fn model_build(cause: Error) -> Self {
        Self::new(ErrorKind::ModelBuildFailure(cause))
    }
    pub fn missing_output_path() -> Self {
        Self::new(ErrorKind::MissingOutputPath)
    }
    pub fn malformed_structure<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::MalformedStructure(msg.to_string()))
    }
    pub fn undefined<S: ToString>(name: Id, kind: S) -> Self {
        Self::new(ErrorKind::Undefined {
            name,
            kind: kind.to_string(),
        })
    }
    pub fn already_bound<S: ToString>(name: Id, kind: S) -> Self {
        Self::new(ErrorKind::AlreadyBound {
            name,
            kind: kind.to_string(),
        })
    }
    pub fn invalid_file<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::InvalidFile(msg.to_string()))
    }
    pub fn write_error<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::WriteError(msg.to_string()))
    }
    pub fn misc<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::Misc(msg.to_string()))
    }

    /// The kind of this error.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// The full message for this error, including any trailing note.
    pub fn message(&self) -> String {
        match &self.post_msg {
            Some(post) => format!("{}\n{}", self.kind, post),
            None => self.kind.to_string(),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.kind.source()
    }
}

// Conversions from other error types to our error type so that
// we can use `?` in all the places.
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::write_error(format!("IO Error: {}", e))
    }
}

impl From<std::fmt::Error> for Error {
    fn from(e: std::fmt::Error) -> Self {
        Error::write_error(format!("Formatting Error: {}", e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::invalid_file(format!("JSON Error: {}", e))
    }
}
