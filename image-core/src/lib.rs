//! Reconstructs the memory an execution trace ran against.
//!
//! The crate models a *traced image*: a sparse collection of file-backed
//! memory regions, each stamped with an address-space identifier, plus an
//! optional fallback callback consulted when nothing in the image answers a
//! read. See [`Image`] for the entry point.

pub mod asid;
pub mod image;
pub mod mapped_section;
pub mod section;

pub use asid::Asid;
pub use image::{Image, ReadCallback, ReadKind, DEFAULT_CACHE_LIMIT};
pub use mapped_section::MappedSection;
pub use section::Section;

pub use shared::errors::ImageError;
