use thiserror::Error;

/// Recoverable file-system failures.
///
/// Anything not expressible here — double frees, refcount underflow,
/// table exhaustion mid-lookup — is an invariant violation and panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FsError {
    #[error("bad file descriptor")]
    BadFileDescriptor,
    #[error("file descriptor not readable")]
    NotReadable,
    #[error("file descriptor not writable")]
    NotWritable,
    #[error("file system entry not found")]
    NotFound,
    #[error("non-directory component in path")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("link crosses devices")]
    CrossDevice,
    #[error("entry already exists")]
    AlreadyExists,
    #[error("cannot unlink \".\" or \"..\"")]
    DotDirectory,
    #[error("directory not empty")]
    DirectoryNotEmpty,
    #[error("no free file table entry")]
    TooManyFiles,
    #[error("no free file descriptor")]
    TooManyOpenFiles,
    #[error("write offset past end of file")]
    BadOffset,
    #[error("file too large")]
    FileTooLarge,
    #[error("broken pipe")]
    BrokenPipe,
    #[error("no such device")]
    NoDevice,
    #[error("path too long")]
    PathTooLong,
    #[error("invalid file system image")]
    InvalidImage,
}
