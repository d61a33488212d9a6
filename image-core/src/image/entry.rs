use crate::mapped_section::MappedSection;

/// One slot in the image's section list: a mapped section plus whether a
/// `map()` is currently outstanding *from this entry*.
///
/// Dropping an entry releases exactly the reference and (if `mapped`) the
/// map it holds, which is how the crate satisfies the reference- and
/// map-balance invariants without any manual bookkeeping: `Section`'s
/// `Clone`/`Drop` and this type's `Drop` do the accounting.
pub(crate) struct SectionListEntry {
    pub(crate) msec: MappedSection,
    pub(crate) mapped: bool,
}

impl SectionListEntry {
    pub(crate) fn new(msec: MappedSection) -> Self {
        Self { msec, mapped: false }
    }
}

impl Drop for SectionListEntry {
    fn drop(&mut self) {
        if self.mapped {
            self.msec.section().unmap();
        }
    }
}
