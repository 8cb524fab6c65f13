//! Vellum - binary persistence for 2D vector-graphics scenes
//!
//! Vellum serializes scene objects (points, shapes, containers, references)
//! into a compact versioned binary format, with optional compression,
//! integrity checks, streaming for large scenes and zero-copy reads.
//!
//! # Quick Start
//!
//! ```ignore
//! use vellum::{DocumentReader, DocumentWriter, TypeId};
//!
//! let mut doc = DocumentWriter::new();
//! doc.write_pod(TypeId::POINT2D, 1, &[1.0f32, 2.0f32])?;
//! let bytes = doc.finish()?;
//!
//! let reader = DocumentReader::from_bytes(&bytes)?;
//! for object in reader.objects() {
//!     let (header, payload) = object?;
//! }
//! ```
//!
//! # Architecture
//!
//! Shared value types and the error enum live in `vellum-core`; every layer
//! that produces or consumes bytes lives in `vellum-durability`. This crate
//! re-exports both.

pub use vellum_core::*;
pub use vellum_durability::*;
