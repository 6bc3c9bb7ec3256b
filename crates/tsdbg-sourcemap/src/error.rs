use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceMapError {
    #[error("Malformed position map: {0}")]
    MalformedMap(String),
    #[error("Failed to read position map '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("No position map found for '{0}'")]
    MapNotFound(String),
}

pub type Result<T> = std::result::Result<T, SourceMapError>;
