use thiserror::Error;

/// Errors produced by the section/image core.
///
/// Mirrors the error kinds of the traced-image contract: read misses and
/// missing-remove-targets are expected outcomes, not fatal conditions, and
/// callers are expected to match on them rather than propagate blindly.
#[derive(Error, Debug)]
pub enum ImageError {
    /// A precondition the core itself is responsible for upholding was
    /// violated: a malformed clone range, a duplicate-range match with an
    /// empty filename on either side, or corrupt internal list linkage.
    #[error("internal error: {0}")]
    Internal(&'static str),

    /// Malformed caller-facing input, e.g. an empty filename or a
    /// zero-sized section passed to a convenience constructor.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),

    /// Allocation failed while growing the section list. Ordinary Rust
    /// allocation aborts rather than returning an error; this variant
    /// exists so fallible-allocation test seams can exercise the same
    /// rollback path the original implementation relies on.
    #[error("allocation failed")]
    NoMem,

    /// No mapped or cold section covered the requested address in the
    /// given ASID, and no read callback was installed (or the callback
    /// itself reported a miss).
    #[error("no mapping covers the requested address")]
    NoMap,

    /// `remove` did not find a matching entry.
    #[error("section not present in image")]
    BadImage,

    /// A map/read against the backing file failed.
    #[error("I/O error on `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ImageError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        ImageError::Io {
            path: path.into(),
            source,
        }
    }
}
