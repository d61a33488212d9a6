//! The traced image: an ordered collection of mapped sections for one
//! address space, plus the bounded read-through cache described in the
//! module-level design. See [`store`] for insertion/removal/copy and
//! [`read`] for the hot/cold read path and cache pruning.

mod entry;
mod read;
mod store;

use shared::errors::ImageError;

use crate::asid::Asid;
use entry::SectionListEntry;

pub use read::ReadKind;

/// Default number of sections the read path keeps mapped at once.
pub const DEFAULT_CACHE_LIMIT: u32 = 10;

/// A callback consulted when no section in the image covers a requested
/// address. Mirrors the original design's function-pointer-plus-context
/// callback as a boxed closure.
pub type ReadCallback = Box<dyn FnMut(&mut [u8], &Asid, u64) -> Result<usize, ImageError>>;

/// A traced image: a sparse collection of file-backed memory regions,
/// stamped with an ASID, plus an optional fallback callback.
///
/// Every public operation assumes exclusive access (see the crate's
/// concurrency note); `Image` is neither `Sync` nor intended to be shared
/// across threads without external serialization.
pub struct Image {
    name: Option<String>,
    pub(crate) entries: Vec<SectionListEntry>,
    pub(crate) cache_limit: u32,
    pub(crate) mapped_count: u32,
    pub(crate) evictions: u64,
    pub(crate) callback: Option<ReadCallback>,
}

impl Image {
    /// Create a new, empty image with an optional name.
    pub fn new(name: Option<&str>) -> Self {
        Self {
            name: name.map(str::to_owned),
            entries: Vec::new(),
            cache_limit: DEFAULT_CACHE_LIMIT,
            mapped_count: 0,
            evictions: 0,
            callback: None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Number of sections currently tracked by the image (mapped and
    /// unmapped combined). Exposed mainly for tests and diagnostics.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries currently mapped (`M` in the design notes).
    pub fn mapped_len(&self) -> u32 {
        self.mapped_count
    }

    /// Total number of entries unmapped by [`prune`](Image::prune) over the
    /// image's lifetime. Monotonic; exposed for `--stat` reporting.
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// The cache bound `C`. Default 10.
    pub fn cache_limit(&self) -> u32 {
        self.cache_limit
    }

    /// Change the cache bound. Does not itself evict; the next cold read
    /// that pushes `M` past the new bound will prune down to it. Intended
    /// to be set before heavy use, per the design's tuning note.
    pub fn set_cache_limit(&mut self, limit: u32) {
        self.cache_limit = limit;
    }

    /// Install (or clear, with `None`) the fallback read callback.
    pub fn set_callback(&mut self, callback: Option<ReadCallback>) {
        self.callback = callback;
    }
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("name", &self.name)
            .field("entries", &self.entries.len())
            .field("mapped", &self.mapped_count)
            .field("cache_limit", &self.cache_limit)
            .finish()
    }
}

pub(crate) fn ranges_overlap(b: u64, e: u64, lbegin: u64, lend: u64) -> bool {
    !(e <= lbegin || lend <= b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_image_is_empty_and_named() {
        let image = Image::new(Some("test"));
        assert_eq!(image.name(), Some("test"));
        assert!(image.is_empty());
        assert_eq!(image.mapped_len(), 0);
        assert_eq!(image.cache_limit(), DEFAULT_CACHE_LIMIT);
    }

    #[test]
    fn unnamed_image_has_no_name() {
        let image = Image::new(None);
        assert_eq!(image.name(), None);
    }
}
