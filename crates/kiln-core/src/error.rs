//! Error types for kiln-core

use crate::sniff::Compression;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Core error types for the kiln library
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// I/O operation on a known path failed
    #[error("{op} {}: {source}", .path.display())]
    IoAt {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The install destination is already present
    #[error("destination {} already exists", .0.display())]
    DestinationExists(PathBuf),

    /// An install option that the chosen format cannot honour
    #[error("Unsupported option: {0}")]
    UnsupportedOption(String),

    /// Configuration or package plan is incomplete or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reading or decoding the head of the source failed
    #[error("could not sniff {}: {source}", .path.display())]
    Sniff {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A compression wrapper decoded to nothing
    #[error("{compression} stream in {} is empty", .path.display())]
    EmptyStream {
        path: PathBuf,
        compression: Compression,
    },

    /// Archive structure rejected by a format reader
    #[error("{format} archive error: {message}")]
    Archive {
        format: &'static str,
        message: String,
    },

    /// ZIP-specific error
    #[error("Zip error: {0}")]
    Zip(String),

    /// No extractor exists for the sniffed content type
    #[error("don't know how to extract archive {} of type {content_type}", .path.display())]
    UnsupportedFormat { path: PathBuf, content_type: String },

    /// Invalid file or directory path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// An external tool exited unsuccessfully
    #[error("{program} failed ({status}): {stderr}")]
    Command {
        program: String,
        status: String,
        stderr: String,
    },

    /// An external tool could not be located on PATH
    #[error("required tool {0} not found on PATH")]
    ToolNotFound(String),

    /// Packages nested inside packages beyond the configured budget
    #[error("{} is nested {depth} levels deep, limit is {limit}", .path.display())]
    NestingTooDeep {
        path: PathBuf,
        depth: usize,
        limit: usize,
    },

    /// Operation not supported on this platform
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
}

impl Error {
    pub(crate) fn archive(format: &'static str, err: impl std::fmt::Display) -> Self {
        Error::Archive {
            format,
            message: err.to_string(),
        }
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::Zip(err.to_string())
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(Path::to_path_buf);
        match (path, err.into_io_error()) {
            (Some(path), Some(source)) => Error::IoAt {
                op: "walk",
                path,
                source,
            },
            (_, Some(source)) => Error::Io(source),
            (path, None) => Error::InvalidPath(format!("filesystem loop at {:?}", path)),
        }
    }
}

/// Attach the failing operation and path to an I/O result
pub(crate) trait IoContext<T> {
    fn at(self, op: &'static str, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn at(self, op: &'static str, path: &Path) -> Result<T> {
        self.map_err(|source| Error::IoAt {
            op,
            path: path.to_path_buf(),
            source,
        })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
