//! Whole-file raw binary loader, the `--raw` counterpart of the original
//! driver's `load_raw`.

use std::fs;

use image_core::{Asid, Image};
use shared::errors::LoaderError;

use crate::split_base;

/// Load the whole file named by `arg` (`path[:base]`) as one section at
/// `base`, in the given ASID.
pub fn load_raw(image: &mut Image, arg: &str, asid: Asid) -> Result<(), LoaderError> {
    let (path, base) = split_base(arg);
    let base = base.map_err(|b| LoaderError::BadArgument(format!("bad base address: {b}")))?;

    let size = fs::metadata(path)
        .map_err(|e| LoaderError::Io {
            path: path.to_owned(),
            source: e,
        })?
        .len();

    if size == 0 {
        return Err(LoaderError::BadArgument(format!("{path}: empty file")));
    }

    image.add_file(path, 0, size, asid, base)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn loads_whole_file_at_base() {
        let f = temp_file(&[0xAAu8; 0x40]);
        let arg = format!("{}:0x2000", f.path().display());

        let mut image = Image::new(None);
        load_raw(&mut image, &arg, Asid::any()).unwrap();

        let mut buf = [0u8; 4];
        let n = image.read(&mut buf, &Asid::any(), 0x2000).unwrap();
        assert_eq!(n, 4);
        assert_eq!(buf, [0xAA; 4]);
    }

    #[test]
    fn rejects_missing_file() {
        let err = load_raw(&mut Image::new(None), "/no/such/file:0", Asid::any()).unwrap_err();
        assert!(matches!(err, LoaderError::Io { .. }));
    }
}
