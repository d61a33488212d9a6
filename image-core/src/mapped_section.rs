//! A [`Section`] placed at a virtual address within an [`Asid`].

use shared::errors::ImageError;

use crate::asid::Asid;
use crate::section::Section;

/// A (section, ASID, virtual address) triple. Never owns the section beyond
/// the one reference it holds.
#[derive(Clone)]
pub struct MappedSection {
    section: Section,
    asid: Asid,
    vaddr: u64,
}

impl MappedSection {
    pub fn new(section: Section, asid: Asid, vaddr: u64) -> Self {
        Self { section, asid, vaddr }
    }

    pub fn section(&self) -> &Section {
        &self.section
    }

    pub fn asid(&self) -> &Asid {
        &self.asid
    }

    pub fn begin(&self) -> u64 {
        self.vaddr
    }

    pub fn end(&self) -> u64 {
        self.vaddr + self.section.size()
    }

    /// True if `query` and this section's ASID match per the wildcard rule.
    pub fn matches_asid(&self, query: &Asid) -> bool {
        self.asid.matches(query)
    }

    /// Read from the underlying section, requiring both an ASID match and
    /// `addr` to fall within `[begin, end)`. The section must already be
    /// mapped; this never maps or unmaps on its own.
    pub fn read_mapped(
        &self,
        buffer: &mut [u8],
        asid: &Asid,
        addr: u64,
    ) -> Result<usize, ImageError> {
        if !self.matches_asid(asid) {
            return Err(ImageError::NoMap);
        }
        if addr < self.begin() || self.end() <= addr {
            return Err(ImageError::NoMap);
        }
        self.section.read_mapped(buffer, addr - self.begin())
    }
}
