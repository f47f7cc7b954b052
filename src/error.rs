pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("source unavailable: {name}: {reason}")]
    SourceUnavailable { name: String, reason: String },

    #[error("not a {what} file: expected magic {expected:#x}, found {found:#x}")]
    BadMagic {
        what: &'static str,
        expected: u32,
        found: u32,
    },

    #[error("unsupported {what} version: {version}")]
    UnsupportedVersion { what: &'static str, version: u32 },

    #[error("unknown type {type_code:?} for tag {tag}")]
    UnknownTagType { tag: String, type_code: char },

    #[error("unknown array type {subtype:?} for tag {tag}")]
    UnknownArrayType { tag: String, subtype: char },

    #[error("malformed data: {0}")]
    Format(String),

    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Broad classes of failure, used to decide how an error is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Format,
    Coordinate,
    NotFound,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::SourceUnavailable { .. } => ErrorKind::Transport,
            Error::BadMagic { .. }
            | Error::UnsupportedVersion { .. }
            | Error::UnknownTagType { .. }
            | Error::UnknownArrayType { .. }
            | Error::Format(_)
            | Error::CorruptIndex(_) => ErrorKind::Format,
            Error::InvalidRange(_) => ErrorKind::Coordinate,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Io(_) | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn unavailable(name: &str, reason: impl std::fmt::Display) -> Self {
        Error::SourceUnavailable {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Maps a short read inside an in-memory buffer to a format error.
    pub(crate) fn truncated(what: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::Format(format!("{} truncated", what))
        } else {
            Error::Io(err)
        }
    }
}
