//! Zero-copy memory layer
//!
//! Values are laid out at their natural alignment inside a fixed-capacity
//! region so a reader can borrow them in place as `&T` / `&[T]`.
//!
//! Files written here set the `ALIGNED` header flag. Their data section holds
//! alignment padding and headerless values, so `DocumentReader` and
//! `StreamingReader` reject them and structure validation checks only the
//! header; read them with `ZeroCopyReader`.
//!
//! # Module Structure
//!
//! - `region`: Bump allocator over aligned storage
//! - `mapped`: Read-only and writable memory maps
//! - `writer`: Header-reserving writer over a region
//! - `reader`: Bounds- and alignment-checked borrowing reader

pub mod mapped;
pub mod reader;
pub mod region;
pub mod writer;

pub use mapped::{MappedFile, MappedFileMut};
pub use reader::ZeroCopyReader;
pub use region::{AlignedBuffer, MemoryRegion, RegionStorage};
pub use writer::ZeroCopyWriter;
