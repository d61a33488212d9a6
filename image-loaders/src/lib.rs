//! Turns on-disk artifacts into sections and feeds them to an [`image_core::Image`].
//!
//! Three loaders, one per artifact kind the driver understands: a [`raw`] loader
//! for whole-file blobs, an [`elf`] loader that adds one section per `PT_LOAD`
//! segment, and a [`pevent`] loader for the subset of perf-event sideband
//! records needed to add and remove ASID-scoped images as a trace runs.

pub mod elf;
pub mod pevent;
pub mod raw;

pub use pevent::{SidebandKind, SidebandRecord};

/// Parse a loader argument of the form `path[:base]`, the same shorthand
/// the original driver's `extract_base` accepts for `--raw`/`--elf`.
///
/// Returns the bare path and the base address (0 if no `:base` suffix is
/// present).
fn split_base(arg: &str) -> (&str, Result<u64, &str>) {
    match arg.rsplit_once(':') {
        Some((path, base)) => (path, parse_u64(base).ok_or(base)),
        None => (arg, Ok(0)),
    }
}

fn parse_u64(s: &str) -> Option<u64> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}
