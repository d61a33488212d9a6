use thiserror::Error;

use super::ImageError;

/// Errors raised while turning an on-disk artifact (raw blob, ELF object,
/// perf-event sideband record) into image sections.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("I/O error reading `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse ELF object `{path}`: {source}")]
    Elf {
        path: String,
        #[source]
        source: goblin::error::Error,
    },

    #[error("malformed loader argument: {0}")]
    BadArgument(String),

    #[error(transparent)]
    Image(#[from] ImageError),
}
