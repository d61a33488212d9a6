//! ELF object loader: one section per `PT_LOAD` segment, the `--elf`
//! counterpart of the original driver's `load_elf`.

use std::fs;

use goblin::elf::Elf;
use goblin::elf::program_header::PT_LOAD;
use log::info;

use image_core::{Asid, Image};
use shared::errors::LoaderError;

use crate::split_base;

/// Parse the ELF object named by `arg` (`path[:base]`) and add one section
/// per loadable segment, at `base + p_vaddr`.
///
/// When `track_image` is set, every segment load is logged at `info`,
/// mirroring the original's `--track-image` section-load tracing.
pub fn load_elf(image: &mut Image, arg: &str, asid: Asid, track_image: bool) -> Result<(), LoaderError> {
    let (path, base) = split_base(arg);
    let base = base.map_err(|b| LoaderError::BadArgument(format!("bad base address: {b}")))?;

    let bytes = fs::read(path).map_err(|e| LoaderError::Io {
        path: path.to_owned(),
        source: e,
    })?;

    let elf = Elf::parse(&bytes).map_err(|e| LoaderError::Elf {
        path: path.to_owned(),
        source: e,
    })?;

    let mut loaded = 0usize;
    for phdr in elf.program_headers.iter().filter(|p| p.p_type == PT_LOAD) {
        if phdr.p_filesz == 0 {
            continue;
        }

        let vaddr = base.wrapping_add(phdr.p_vaddr);
        image.add_file(path, phdr.p_offset, phdr.p_filesz, asid, vaddr)?;
        loaded += 1;

        if track_image {
            info!(
                "elf: loaded {path} segment at {:#x}, offset {:#x}, size {:#x}",
                vaddr, phdr.p_offset, phdr.p_filesz
            );
        }
    }

    if loaded == 0 {
        return Err(LoaderError::BadArgument(format!(
            "{path}: no loadable (PT_LOAD) segments"
        )));
    }

    Ok(())
}
