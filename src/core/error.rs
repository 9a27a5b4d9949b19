use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    CorruptFile,
    InvalidSchema,
    LockFailure,
    UnknownField,
    DecodeError,
    UnsupportedFormat,
    BadArgument,
    Internal,
}

/// Single error channel for every recoverable failure. `frames` records the
/// subsystem boundaries the error crossed on its way up.
#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    pub frames: Vec<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error {
            kind,
            message: message.into(),
            frames: Vec::new(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Io, message)
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::CorruptFile, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::DecodeError, message)
    }

    pub fn bad_argument(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::BadArgument, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Internal, message)
    }

    /// Record a frame as the error propagates across a subsystem boundary.
    pub fn add_frame(mut self, frame: impl Into<String>) -> Self {
        self.frames.push(frame.into());
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)?;
        for frame in &self.frames {
            write!(f, "\n  via {}", frame)?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            kind: ErrorKind::Io,
            message: err.to_string(),
            frames: Vec::new(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            kind: ErrorKind::DecodeError,
            message: format!("JSON error: {}", err),
            frames: Vec::new(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
