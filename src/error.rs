use std::fmt::Display;

#[derive(Debug)]
pub enum Error {
    NotFound,
    PermissionDenied,
    Io(std::io::Error),
    InvalidPath,
    FileExists,
    NoSpace,
    InvalidConfig,
    NotImplemented,
    InvalidSession,
    DirectoryNotEmpty,
    InvalidOperation,
    Utf8(std::str::Utf8Error),
}

impl Error {
    /// Stable numeric code exposed at the operation surface
    pub fn code(&self) -> i32 {
        match self {
            Self::NotFound => 1,
            Self::PermissionDenied => 2,
            Self::Io(_) => 3,
            Self::InvalidPath => 4,
            Self::FileExists => 5,
            Self::NoSpace => 6,
            Self::InvalidConfig => 7,
            Self::NotImplemented => 8,
            Self::InvalidSession => 9,
            Self::DirectoryNotEmpty => 10,
            Self::InvalidOperation => 11,
            Self::Utf8(_) => 3,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "File, directory, or user not found"),
            Self::PermissionDenied => write!(f, "Permission denied - insufficient privileges"),
            Self::Io(e) => write!(f, "Input/output error occurred: {e}"),
            Self::InvalidPath => write!(f, "Invalid path format"),
            Self::FileExists => write!(f, "File or directory already exists"),
            Self::NoSpace => write!(f, "Insufficient space in file system"),
            Self::InvalidConfig => write!(f, "Invalid configuration file"),
            Self::NotImplemented => write!(f, "Feature not yet implemented"),
            Self::InvalidSession => write!(f, "Invalid or expired session"),
            Self::DirectoryNotEmpty => write!(f, "Directory is not empty"),
            Self::InvalidOperation => write!(f, "Invalid operation"),
            Self::Utf8(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(value: std::str::Utf8Error) -> Self {
        Self::Utf8(value)
    }
}
