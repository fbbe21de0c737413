use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    PvfsError(pvfs::Error),
    IoError(std::io::Error),
    NotFound(String),
    Generic(String),
    CliInputError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::PvfsError(err) => write!(f, "{}", err),
            Error::IoError(err) => write!(f, "IO error: {}", err),
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::Generic(msg) => write!(f, "Error: {}", msg),
            Error::CliInputError(msg) => write!(f, "CLI input error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::PvfsError(err) => Some(err),
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl std::convert::From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Error {
        Error::IoError(error)
    }
}

impl std::convert::From<pvfs::Error> for Error {
    fn from(error: pvfs::Error) -> Error {
        Error::PvfsError(error)
    }
}
