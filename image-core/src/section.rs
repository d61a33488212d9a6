//! Reference-counted view of a byte range within a file.
//!
//! A [`Section`] is deliberately cheap to hand around: cloning it is the
//! *acquire* of the original design, and dropping the last clone is the
//! *release* that tears the backing file down. Rust's `Rc` already gives us
//! that discipline for free, so `Section::clone`/`Drop` stand in for the
//! explicit acquire/release pair. What `Rc` does *not* give us is the
//! separate, nestable map/unmap counter: a section can be acquired by many
//! image entries while being mapped (i.e. have an open file) by only the
//! ones actually serving reads right now. That counter is tracked here by
//! hand.

use std::cell::{Cell, RefCell};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::rc::Rc;

use shared::errors::ImageError;

struct SectionInner {
    filename: String,
    /// Byte offset of this handle's range within `filename`.
    offset: u64,
    /// Size in bytes of this handle's range.
    size: u64,
    /// Nesting depth of outstanding `map()` calls.
    map_count: u32,
    /// Open file, present only while `map_count > 0`.
    file: Option<File>,
    /// Test-only fault injector for clone(): `Some(0)` makes the next clone
    /// fail, `Some(n)` for n > 0 lets n more clones through before failing.
    #[cfg(test)]
    fail_clone_after: Cell<Option<u32>>,
}

/// A reference-counted handle to a byte range of a file.
///
/// `Section::make` starts a fresh file at reference count 1; cloning the
/// `Section` value (an ordinary [`Clone`]) is the acquire of the original
/// design, and letting a clone drop is the release. [`Section::clone_range`]
/// is the distinct "sub-range view" operation from the design (`clone(start,
/// size)`), not to be confused with `Clone::clone`.
#[derive(Clone)]
pub struct Section(Rc<RefCell<SectionInner>>);

impl Section {
    /// Create a handle over `[offset, offset + size)` of `filename`.
    pub fn make(filename: impl Into<String>, offset: u64, size: u64) -> Result<Section, ImageError> {
        let filename = filename.into();
        if filename.is_empty() {
            return Err(ImageError::Invalid("section filename must not be empty"));
        }
        if size == 0 {
            return Err(ImageError::Invalid("section size must not be zero"));
        }

        Ok(Section(Rc::new(RefCell::new(SectionInner {
            filename,
            offset,
            size,
            map_count: 0,
            file: None,
            #[cfg(test)]
            fail_clone_after: Cell::new(None),
        }))))
    }

    /// Number of live references to this section (the refcount of §3/§4.1).
    pub fn refcount(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    /// Whether a `map()` is currently outstanding.
    pub fn is_mapped(&self) -> bool {
        self.0.borrow().map_count > 0
    }

    pub fn map_count(&self) -> u32 {
        self.0.borrow().map_count
    }

    pub fn filename(&self) -> String {
        self.0.borrow().filename.clone()
    }

    pub fn offset(&self) -> u64 {
        self.0.borrow().offset
    }

    pub fn size(&self) -> u64 {
        self.0.borrow().size
    }

    /// Identity comparison: do these two handles refer to the same
    /// allocation? Used by `remove` to find "this exact section".
    pub fn is_same_allocation(&self, other: &Section) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Bracket the period during which `read_mapped` may succeed. Nested:
    /// only the first `map()` opens the file.
    pub fn map(&self) -> Result<(), ImageError> {
        let mut inner = self.0.borrow_mut();
        if inner.map_count == 0 {
            let file = File::open(&inner.filename).map_err(|e| ImageError::io(inner.filename.clone(), e))?;
            inner.file = Some(file);
        }
        inner.map_count += 1;
        Ok(())
    }

    /// Balance a prior `map()`. Only the last unmap releases the open file.
    pub fn unmap(&self) {
        let mut inner = self.0.borrow_mut();
        if inner.map_count == 0 {
            return;
        }
        inner.map_count -= 1;
        if inner.map_count == 0 {
            inner.file = None;
        }
    }

    /// Copy at most `buffer.len()` bytes starting at `offset` (relative to
    /// this handle's range) into `buffer`. Requires the section to be
    /// currently mapped. Returns the number of bytes copied, which may be
    /// less than `buffer.len()` at the end of the range, but is always at
    /// least 1 on success.
    pub fn read_mapped(&self, buffer: &mut [u8], offset: u64) -> Result<usize, ImageError> {
        let mut inner = self.0.borrow_mut();
        if offset >= inner.size {
            return Err(ImageError::NoMap);
        }
        let file = match inner.file.as_mut() {
            Some(f) => f,
            None => return Err(ImageError::NoMap),
        };

        let available = inner.size - offset;
        let want = (buffer.len() as u64).min(available) as usize;
        let abs_offset = inner.offset + offset;

        file.seek(SeekFrom::Start(abs_offset))
            .map_err(|e| ImageError::io(inner.filename.clone(), e))?;

        let mut total = 0usize;
        while total < want {
            match file.read(&mut buffer[total..want]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) => return Err(ImageError::io(inner.filename.clone(), e)),
            }
        }

        if total == 0 {
            return Err(ImageError::NoMap);
        }
        Ok(total)
    }

    /// Produce a new handle viewing `[file_start, file_end)` of the same
    /// file. `file_start` must lie in `[self.offset, self.offset +
    /// self.size)` and `file_end` in `(self.offset, self.offset +
    /// self.size]`. The clone starts out with its own reference count of 1
    /// and is not mapped.
    pub(crate) fn clone_range(&self, file_start: u64, file_end: u64) -> Result<Section, ImageError> {
        let inner = self.0.borrow();

        if file_end <= file_start {
            return Err(ImageError::Internal("clone: end must be after start"));
        }
        if file_start < inner.offset || file_end > inner.offset + inner.size {
            return Err(ImageError::Internal("clone: range outside section"));
        }

        #[cfg(test)]
        {
            if let Some(budget) = inner.fail_clone_after.get() {
                if budget == 0 {
                    return Err(ImageError::io(
                        inner.filename.clone(),
                        std::io::Error::other("injected clone failure"),
                    ));
                }
                inner.fail_clone_after.set(Some(budget - 1));
            }
        }

        Section::make(inner.filename.clone(), file_start, file_end - file_start)
    }

    /// Test-only: make the `n`-th future `clone_range` call on this section
    /// (and sections cloned from it share no fault budget of their own)
    /// fail. `n = 0` fails the very next call.
    #[cfg(test)]
    pub(crate) fn fail_clone_after(&self, n: u32) {
        self.0.borrow().fail_clone_after.set(Some(n));
    }
}
