use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum Error {
    /// A line in a .config or defconfig matched none of the known productions.
    Parse { path: PathBuf, line: String },
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Manifest { path: PathBuf, msg: String },
    /// Invalid combination of command line and manifest inputs.
    Usage(String),
    Msg(String),
}

impl Error {
    pub fn msg<M: Into<String>>(msg: M) -> Self {
        Self::Msg(msg.into())
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse { path, line } => {
                write!(f, "Unexpected line in {}: {}", path.display(), line)
            }
            Self::Io { path, source } => write!(f, "failed to read {}: {source}", path.display()),
            Self::Manifest { path, msg } => {
                write!(f, "invalid check manifest {}: {msg}", path.display())
            }
            Self::Usage(msg) | Self::Msg(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::msg(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
