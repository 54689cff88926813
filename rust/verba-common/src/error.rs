use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

pub type StdErrorBoxed = Box<dyn std::error::Error + Send + Sync + 'static>;

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    pub fn invalid_format(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidFormat {
                element: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidArgument {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_operation(name: impl Into<String>) -> Error {
        Error(ErrorKind::InvalidOperation { name: name.into() }.into())
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Error {
        Error(
            ErrorKind::Io {
                context: context.into(),
                source,
            }
            .into(),
        )
    }

    pub fn already_closed() -> Error {
        Error(ErrorKind::AlreadyClosed.into())
    }

    pub fn lock_obtain_failed(lock: impl Into<String>) -> Error {
        Error(ErrorKind::LockObtainFailed { lock: lock.into() }.into())
    }

    pub fn aborted(reason: impl Into<String>) -> Error {
        Error(
            ErrorKind::Aborted {
                reason: reason.into(),
            }
            .into(),
        )
    }

    pub fn analysis(field: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::Analysis {
                field: field.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    /// Wraps an arbitrary error raised by an external collaborator (analyzer, reader
    /// value) while processing the given field.
    pub fn external<E>(field: impl Into<String>, source: E) -> Error
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error(
            ErrorKind::External {
                field: field.into(),
                source: Box::new(source),
            }
            .into(),
        )
    }

    /// Returns `true` if this error originates from the storage layer.
    pub fn is_io(&self) -> bool {
        matches!(self.kind(), ErrorKind::Io { .. })
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("invalid operation {name}")]
    InvalidOperation { name: String },

    #[error("invalid storage format for '{element}': {message}")]
    InvalidFormat { element: String, message: String },

    #[error("IO error for '{context}': {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },

    #[error("this index writer is closed")]
    AlreadyClosed,

    #[error("failed to obtain lock '{lock}'")]
    LockObtainFailed { lock: String },

    #[error("indexing aborted: {reason}")]
    Aborted { reason: String },

    #[error("analysis failed for field '{field}': {message}")]
    Analysis { field: String, message: String },

    #[error("error while processing field '{field}': {source}")]
    External {
        field: String,
        source: StdErrorBoxed,
    },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::io("", e)
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(_: std::convert::Infallible) -> Self {
        Error::invalid_operation("conversion")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = Error::lock_obtain_failed("write.lock");
        assert!(matches!(err.kind(), ErrorKind::LockObtainFailed { .. }));
        assert_eq!(err.to_string(), "failed to obtain lock 'write.lock'");

        let err: Error = std::io::Error::other("disk full").into();
        assert!(err.is_io());
        assert!(!Error::already_closed().is_io());
    }
}
