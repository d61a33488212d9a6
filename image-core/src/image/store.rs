//! Insertion (with overlap resolution), removal, and copy.
//!
//! `add` is the one operation in the crate that has to be atomic in its
//! observable state across a fallible multi-step rewrite: see the
//! module-level design notes for the two-scratch-list technique used below.

use log::debug;

use shared::errors::ImageError;

use crate::asid::Asid;
use crate::mapped_section::MappedSection;
use crate::section::Section;

use super::entry::SectionListEntry;
use super::{ranges_overlap, Image};

impl Image {
    /// Add `section` at `vaddr` in `asid`, splitting or shrinking whatever
    /// already occupies that range in the same address space.
    ///
    /// On success the image absorbs `section`'s overlap set atomically: the
    /// whole rewrite happens, or (on a per-entry failure) none of it does.
    pub fn add(&mut self, section: Section, asid: Asid, vaddr: u64) -> Result<(), ImageError> {
        let size = section.size();
        let begin = vaddr;
        let end = vaddr
            .checked_add(size)
            .ok_or(ImageError::Invalid("vaddr + section size overflows u64"))?;

        let mut fresh = vec![SectionListEntry::new(MappedSection::new(section, asid, vaddr))];
        let mut removed: Vec<SectionListEntry> = Vec::new();

        let mut i = 0;
        let outcome: Result<(), ImageError> = loop {
            if i >= self.entries.len() {
                break Ok(());
            }

            if !self.entries[i].msec.matches_asid(&asid) {
                i += 1;
                continue;
            }

            let lbegin = self.entries[i].msec.begin();
            let lend = self.entries[i].msec.end();
            if !ranges_overlap(begin, end, lbegin, lend) {
                i += 1;
                continue;
            }

            // `self.entries[i]` overlaps the new section.
            if begin == lbegin && end == lend {
                let fname = fresh[0].msec.section().filename();
                let lfname = self.entries[i].msec.section().filename();

                if fname.is_empty() || lfname.is_empty() {
                    break Err(ImageError::Internal(
                        "identical-range add with an anonymous section",
                    ));
                }

                if fname == lfname {
                    if !removed.is_empty() || fresh.len() > 1 {
                        break Err(ImageError::Internal(
                            "identical-range add observed mid-traversal",
                        ));
                    }
                    // Duplicate of what's already there: drop the seed and
                    // report success without touching the image.
                    return Ok(());
                }
            }

            let mut current = self.entries.remove(i);
            if current.mapped {
                current.msec.section().unmap();
                current.mapped = false;
                self.mapped_count -= 1;
            }

            let asid_for_clones = *current.msec.asid();
            let sec_offset = current.msec.section().offset();

            if lbegin < begin {
                match current.msec.section().clone_range(sec_offset, sec_offset + (begin - lbegin)) {
                    Ok(left) => fresh.insert(
                        0,
                        SectionListEntry::new(MappedSection::new(left, asid_for_clones, lbegin)),
                    ),
                    Err(e) => {
                        removed.push(current);
                        break Err(e);
                    }
                }
            }

            if end < lend {
                let file_start = sec_offset + (end - lbegin);
                let file_end = sec_offset + (lend - lbegin);
                match current.msec.section().clone_range(file_start, file_end) {
                    Ok(right) => fresh.insert(
                        0,
                        SectionListEntry::new(MappedSection::new(right, asid_for_clones, end)),
                    ),
                    Err(e) => {
                        removed.push(current);
                        break Err(e);
                    }
                }
            }

            removed.push(current);
            // `remove(i)` shifted the next entry into position `i`.
        };

        match outcome {
            Ok(()) => {
                debug!(
                    "image add: {} fresh section(s), {} replaced at [{:#x}, {:#x})",
                    fresh.len(),
                    removed.len(),
                    begin,
                    end
                );
                self.entries.extend(fresh);
                Ok(())
            }
            Err(e) => {
                // `fresh` (including the seed) drops here; `removed` goes
                // back to the tail, unmapped, which still satisfies the
                // ordering invariant.
                self.entries.extend(removed);
                Err(e)
            }
        }
    }

    /// Convenience wrapper: build a `Section` over `filename` and add it.
    pub fn add_file(
        &mut self,
        filename: impl Into<String>,
        offset: u64,
        size: u64,
        asid: Asid,
        vaddr: u64,
    ) -> Result<(), ImageError> {
        let section = Section::make(filename, offset, size)?;
        self.add(section, asid, vaddr)
    }

    /// Remove the first entry whose section identity, vaddr, and ASID match
    /// all coincide.
    pub fn remove(&mut self, section: &Section, asid: &Asid, vaddr: u64) -> Result<(), ImageError> {
        let pos = self.entries.iter().position(|e| {
            e.msec.section().is_same_allocation(section)
                && e.msec.begin() == vaddr
                && e.msec.matches_asid(asid)
        });

        match pos {
            Some(i) => {
                if self.entries[i].mapped {
                    self.mapped_count -= 1;
                }
                self.entries.remove(i);
                Ok(())
            }
            None => Err(ImageError::BadImage),
        }
    }

    /// Remove every entry whose ASID matches and whose backing filename
    /// equals `filename`. Returns the number removed.
    pub fn remove_by_filename(&mut self, filename: &str, asid: &Asid) -> u32 {
        let mut removed = 0u32;
        let mut i = 0;
        while i < self.entries.len() {
            let matches = self.entries[i].msec.matches_asid(asid)
                && self.entries[i].msec.section().filename() == filename;
            if matches {
                if self.entries[i].mapped {
                    self.mapped_count -= 1;
                }
                self.entries.remove(i);
                removed += 1;
            } else {
                i += 1;
            }
        }
        removed
    }

    /// Remove every entry whose ASID matches. Returns the number removed.
    pub fn remove_by_asid(&mut self, asid: &Asid) -> u32 {
        let mut removed = 0u32;
        let mut i = 0;
        while i < self.entries.len() {
            if self.entries[i].msec.matches_asid(asid) {
                if self.entries[i].mapped {
                    self.mapped_count -= 1;
                }
                self.entries.remove(i);
                removed += 1;
            } else {
                i += 1;
            }
        }
        removed
    }

    /// Add every entry of `src` to `self`, in order. `src` is left
    /// untouched. Per-entry failures are tolerated; the return value is the
    /// number of entries `self` declined to accept, so callers can treat
    /// copy as best-effort.
    pub fn copy_from(&mut self, src: &Image) -> u32 {
        let mut declined = 0u32;
        for entry in &src.entries {
            let section = entry.msec.section().clone();
            let asid = *entry.msec.asid();
            let vaddr = entry.msec.begin();
            if self.add(section, asid, vaddr).is_err() {
                declined += 1;
            }
        }
        declined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(contents: &[u8]) -> String {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents).unwrap();
        f.flush().unwrap();
        let (_file, path) = f.keep().unwrap();
        path.to_string_lossy().into_owned()
    }

    // S2: overlapping add splits the existing section and keeps both the
    // remainder and the new section as distinct entries.
    #[test]
    fn add_splits_overlapping_section() {
        let mut image = Image::new(None);
        let a = temp_file(&[0xAAu8; 0x200]);
        let b = temp_file(&[0xBBu8; 0x200]);

        image.add_file(&a, 0, 0x100, Asid::any(), 0x1000).unwrap();
        image.add_file(&b, 0, 0x100, Asid::any(), 0x1080).unwrap();

        assert_eq!(image.len(), 2);

        let mut buf = [0u8; 4];
        let n = image.read(&mut buf, &Asid::any(), 0x1040).unwrap();
        assert_eq!(n, 4);
        assert_eq!(buf, [0xAA; 4]);

        let n = image.read(&mut buf, &Asid::any(), 0x1080).unwrap();
        assert_eq!(n, 4);
        assert_eq!(buf, [0xBB; 4]);
    }

    // S3: re-adding the identical range from the identical file is a no-op.
    #[test]
    fn add_identical_range_is_idempotent() {
        let mut image = Image::new(None);
        let a = temp_file(&[0x11u8; 0x100]);

        image.add_file(&a, 0, 0x100, Asid::any(), 0x1000).unwrap();
        image.add_file(&a, 0, 0x100, Asid::any(), 0x1000).unwrap();

        assert_eq!(image.len(), 1);
    }

    // S5 / property 6: a failing clone during overlap resolution leaves the
    // image exactly as it was before the call.
    #[test]
    fn add_rolls_back_on_clone_failure() {
        let mut image = Image::new(None);
        let a_path = temp_file(&[0xAAu8; 0x300]);
        let a = Section::make(&a_path, 0, 0x200).unwrap();
        image.add(a.clone(), Asid::any(), 0x1000).unwrap();
        drop(a);

        // `a` covers [0x1000, 0x1200). Adding `b` at [0x1080, 0x1280) forces
        // a left-remainder clone of `a`; make that clone fail.
        let original = image.entries[0].msec.section().clone();
        original.fail_clone_after(0);

        let b = Section::make(temp_file(&[0xBBu8; 0x200]), 0, 0x200).unwrap();
        let before_refcount = original.refcount();

        let err = image.add(b, Asid::any(), 0x1080).unwrap_err();
        assert!(matches!(err, ImageError::Io { .. }));

        assert_eq!(image.len(), 1);
        assert_eq!(image.entries[0].msec.begin(), 0x1000);
        assert_eq!(original.refcount(), before_refcount);
    }

    #[test]
    fn remove_by_filename_filters_by_asid() {
        let mut image = Image::new(None);
        let a = temp_file(&[0u8; 0x100]);

        image
            .add_file(&a, 0, 0x10, Asid::new(Some(1), None), 0x1000)
            .unwrap();
        image
            .add_file(&a, 0, 0x10, Asid::new(Some(1), None), 0x2000)
            .unwrap();
        image
            .add_file(&a, 0, 0x10, Asid::new(Some(2), None), 0x3000)
            .unwrap();

        let removed = image.remove_by_filename(&a, &Asid::new(Some(1), None));
        assert_eq!(removed, 2);
        assert_eq!(image.len(), 1);
        assert!(image.entries[0].msec.matches_asid(&Asid::new(Some(2), None)));
    }

    // Property 7: copying twice is the same as copying once.
    #[test]
    fn copy_is_idempotent() {
        let mut src = Image::new(None);
        let a = temp_file(&[0u8; 0x100]);
        src.add_file(&a, 0, 0x100, Asid::any(), 0x1000).unwrap();

        let mut dst = Image::new(None);
        let declined_first = dst.copy_from(&src);
        let declined_second = dst.copy_from(&src);

        assert_eq!(declined_first, 0);
        assert_eq!(declined_second, 0);
        assert_eq!(dst.len(), 1);
    }
}
