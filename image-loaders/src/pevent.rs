//! Minimal perf-event sideband reader.
//!
//! Full sideband parsing (perf ring buffer framing, kernel module records,
//! tid/pid scheduling switches) is out of scope; this covers the subset the
//! original sideband decoder uses to keep an image in sync with a trace:
//! `PERF_RECORD_MMAP2`-shaped image-load records and their unload
//! counterpart, each scoped to the process that issued them.

use image_core::{Asid, Image};
use shared::errors::LoaderError;

/// What a sideband record tells the image to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidebandKind {
    /// `PERF_RECORD_MMAP2`-shaped: a process mapped part of a file.
    Load,
    /// The process later unmapped it.
    Unload,
}

/// One decoded sideband record.
#[derive(Debug, Clone)]
pub struct SidebandRecord {
    pub kind: SidebandKind,
    pub filename: String,
    pub offset: u64,
    pub size: u64,
    pub vaddr: u64,
    pub pid: u32,
}

impl SidebandRecord {
    /// The ASID a record scopes to: `pid` stands in for the process's
    /// address space, the one key this reduced model tracks (the original
    /// sideband decoder also keys on CR3/VMCS, which requires following the
    /// trace's scheduling switches; out of scope here).
    fn asid(&self) -> Asid {
        Asid::new(Some(self.pid as u64), None)
    }
}

/// Apply one record to `image`: add a section on `Load`, remove matching
/// sections by filename on `Unload`.
pub fn apply(image: &mut Image, record: &SidebandRecord) -> Result<(), LoaderError> {
    let asid = record.asid();
    match record.kind {
        SidebandKind::Load => {
            image.add_file(&record.filename, record.offset, record.size, asid, record.vaddr)?;
        }
        SidebandKind::Unload => {
            image.remove_by_filename(&record.filename, &asid);
        }
    }
    Ok(())
}

/// Apply every record in `records`, in order. Returns the number of `Load`
/// records that failed to add (an `Unload` of something not present is not
/// an error: the image may simply never have observed the matching load).
pub fn apply_all(image: &mut Image, records: &[SidebandRecord]) -> usize {
    let mut declined = 0;
    for record in records {
        if apply(image, record).is_err() {
            declined += 1;
        }
    }
    declined
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

    #[test]
    fn load_then_unload_round_trips() {
        let path = temp_file(&[0x7u8; 0x20]);
        let mut image = Image::new(None);

        let load = SidebandRecord {
            kind: SidebandKind::Load,
            filename: path.clone(),
            offset: 0,
            size: 0x20,
            vaddr: 0x5000,
            pid: 42,
        };
        apply(&mut image, &load).unwrap();
        assert_eq!(image.len(), 1);

        let mut buf = [0u8; 1];
        let n = image.read(&mut buf, &Asid::new(Some(42), None), 0x5000).unwrap();
        assert_eq!(n, 1);
        assert_eq!(buf[0], 0x7);

        let unload = SidebandRecord {
            kind: SidebandKind::Unload,
            ..load
        };
        apply(&mut image, &unload).unwrap();
        assert_eq!(image.len(), 0);
    }

    #[test]
    fn distinct_pids_stay_isolated() {
        let path = temp_file(&[0u8; 0x10]);
        let mut image = Image::new(None);

        apply_all(
            &mut image,
            &[
                SidebandRecord {
                    kind: SidebandKind::Load,
                    filename: path.clone(),
                    offset: 0,
                    size: 0x10,
                    vaddr: 0x6000,
                    pid: 1,
                },
                SidebandRecord {
                    kind: SidebandKind::Load,
                    filename: path,
                    offset: 0,
                    size: 0x10,
                    vaddr: 0x6000,
                    pid: 2,
                },
            ],
        );

        assert_eq!(image.len(), 2);
        let removed = image.remove_by_asid(&Asid::new(Some(1), None));
        assert_eq!(removed, 1);
        assert_eq!(image.len(), 1);
    }
}
