//! Shared value types for the binary format
//!
//! These types appear in headers, reports, and public APIs of every layer.
//! None of them perform I/O; byte-level encoding lives in the durability crate.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Version
// ============================================================================

/// Format version.
///
/// Ordering is lexicographic: major first, then minor. The field order of
/// the struct is what makes the derived `Ord` correct.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Version {
    /// Major version; a newer major cannot be read by older builds
    pub major: u16,
    /// Minor version; newer minors are readable with a warning
    pub minor: u16,
}

impl Version {
    /// Create a version.
    pub const fn new(major: u16, minor: u16) -> Self {
        Version { major, minor }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

// ============================================================================
// TypeId
// ============================================================================

/// Category of an object type, derived from the numeric range of its tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeCategory {
    /// Points, colors, transforms, bounding boxes (1..=9)
    CoreMath,
    /// Circles, rectangles, lines, ellipses (10..=19)
    Shape,
    /// Groups, layers, drawings (20..=29)
    Container,
    /// References and arrays (30..=39)
    Special,
}

/// Object type tag stored in every object header.
///
/// The tag space is partitioned into disjoint ranges per category so that a
/// type introduced by a newer writer can still be range-checked by an older
/// reader. Unknown tags inside a known range are valid; tags outside every
/// range (including `NONE` and `RESERVED`) are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeId(pub u8);

impl TypeId {
    /// Null type
    pub const NONE: TypeId = TypeId(0);
    /// 2D point
    pub const POINT2D: TypeId = TypeId(1);
    /// RGBA color
    pub const COLOR: TypeId = TypeId(2);
    /// Affine 2D transform
    pub const TRANSFORM2D: TypeId = TypeId(3);
    /// Axis-aligned bounding box
    pub const BOUNDING_BOX: TypeId = TypeId(4);
    /// Circle shape
    pub const CIRCLE: TypeId = TypeId(10);
    /// Rectangle shape
    pub const RECTANGLE: TypeId = TypeId(11);
    /// Line shape
    pub const LINE: TypeId = TypeId(12);
    /// Ellipse shape
    pub const ELLIPSE: TypeId = TypeId(13);
    /// Group container
    pub const GROUP: TypeId = TypeId(20);
    /// Layer container
    pub const LAYER: TypeId = TypeId(21);
    /// Drawing (root container)
    pub const DRAWING: TypeId = TypeId(22);
    /// Reference to another object by id
    pub const REFERENCE: TypeId = TypeId(30);
    /// Homogeneous array
    pub const ARRAY: TypeId = TypeId(31);
    /// Reserved for future use
    pub const RESERVED: TypeId = TypeId(255);

    /// Raw tag value.
    pub const fn as_u8(self) -> u8 {
        self.0
    }

    /// Category of this tag, or `None` when it lies outside every known range.
    pub fn category(self) -> Option<TypeCategory> {
        match self.0 {
            1..=9 => Some(TypeCategory::CoreMath),
            10..=19 => Some(TypeCategory::Shape),
            20..=29 => Some(TypeCategory::Container),
            30..=39 => Some(TypeCategory::Special),
            _ => None,
        }
    }

    /// Whether the tag lies in a known range.
    pub fn is_known_range(self) -> bool {
        self.category().is_some()
    }

    /// Human-readable name for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            TypeId::NONE => "None",
            TypeId::POINT2D => "Point2D",
            TypeId::COLOR => "Color",
            TypeId::TRANSFORM2D => "Transform2D",
            TypeId::BOUNDING_BOX => "BoundingBox",
            TypeId::CIRCLE => "Circle",
            TypeId::RECTANGLE => "Rectangle",
            TypeId::LINE => "Line",
            TypeId::ELLIPSE => "Ellipse",
            TypeId::GROUP => "Group",
            TypeId::LAYER => "Layer",
            TypeId::DRAWING => "Drawing",
            TypeId::REFERENCE => "Reference",
            TypeId::ARRAY => "Array",
            TypeId::RESERVED => "Reserved",
            _ => "Unknown",
        }
    }
}

impl From<u8> for TypeId {
    fn from(tag: u8) -> Self {
        TypeId(tag)
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.0)
    }
}

// ============================================================================
// FormatFlags
// ============================================================================

/// File-level feature bits stored in the header `flags` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FormatFlags(u32);

impl FormatFlags {
    /// No flags
    pub const NONE: FormatFlags = FormatFlags(0);
    /// Data section (or each chunk) is compressed
    pub const COMPRESSED: FormatFlags = FormatFlags(1 << 0);
    /// Object references are resolved through an index
    pub const INDEXED: FormatFlags = FormatFlags(1 << 1);
    /// Data section is a sequence of chunks
    pub const STREAMING: FormatFlags = FormatFlags(1 << 2);
    /// Header checksum covers the data section
    pub const CHECKSUM_PRESENT: FormatFlags = FormatFlags(1 << 3);
    /// Data section is an aligned zero-copy layout, not an object stream
    pub const ALIGNED: FormatFlags = FormatFlags(1 << 4);

    /// Build from raw bits (unknown bits are preserved).
    pub const fn from_bits(bits: u32) -> Self {
        FormatFlags(bits)
    }

    /// Raw bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set.
    pub const fn contains(self, other: FormatFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set the bits of `other`.
    pub fn insert(&mut self, other: FormatFlags) {
        self.0 |= other.0;
    }

    /// Clear the bits of `other`.
    pub fn remove(&mut self, other: FormatFlags) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for FormatFlags {
    type Output = FormatFlags;

    fn bitor(self, rhs: FormatFlags) -> FormatFlags {
        FormatFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for FormatFlags {
    fn bitor_assign(&mut self, rhs: FormatFlags) {
        self.0 |= rhs.0;
    }
}

// ============================================================================
// Compression
// ============================================================================

/// Compression kind recorded in file and chunk headers.
///
/// `Fast` and `HighRatio` reserve wire values for a speed-priority and a
/// ratio-priority codec. Until those codecs exist both resolve to the
/// run-length codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum CompressionKind {
    /// Stored as-is
    #[default]
    None = 0,
    /// Speed-priority codec
    Fast = 1,
    /// Ratio-priority codec
    HighRatio = 2,
}

impl CompressionKind {
    /// Wire value.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parse a wire value; `None` for undefined bytes.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionKind::None),
            1 => Some(CompressionKind::Fast),
            2 => Some(CompressionKind::HighRatio),
            _ => None,
        }
    }

    /// Whether this kind applies any codec at all.
    pub fn is_compressed(self) -> bool {
        self != CompressionKind::None
    }
}

/// Requested compression effort. Codecs without levels ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CompressionLevel {
    /// No effort
    None = 0,
    /// Lowest latency
    Fastest = 1,
    /// Fast
    Fast = 3,
    /// Balanced
    #[default]
    Default = 6,
    /// Better ratio
    Better = 9,
    /// Best ratio
    Best = 12,
}

impl CompressionLevel {
    /// Numeric level.
    pub const fn as_i32(self) -> i32 {
        self as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_version_ordering_major_first() {
        assert!(Version::new(1, 9) < Version::new(2, 0));
        assert!(Version::new(1, 0) < Version::new(1, 1));
        assert_eq!(Version::new(3, 4), Version::new(3, 4));
        assert_eq!(Version::new(1, 1).to_string(), "1.1");
    }

    proptest! {
        #[test]
        fn prop_version_order_is_lexicographic(a in any::<(u16, u16)>(), b in any::<(u16, u16)>()) {
            let va = Version::new(a.0, a.1);
            let vb = Version::new(b.0, b.1);
            prop_assert_eq!(va.cmp(&vb), a.cmp(&b));
        }
    }

    #[test]
    fn test_type_id_categories() {
        assert_eq!(TypeId::POINT2D.category(), Some(TypeCategory::CoreMath));
        assert_eq!(TypeId::ELLIPSE.category(), Some(TypeCategory::Shape));
        assert_eq!(TypeId::DRAWING.category(), Some(TypeCategory::Container));
        assert_eq!(TypeId::ARRAY.category(), Some(TypeCategory::Special));
        assert_eq!(TypeId::NONE.category(), None);
        assert_eq!(TypeId::RESERVED.category(), None);
        assert_eq!(TypeId(40).category(), None);
    }

    #[test]
    fn test_unknown_tag_in_known_range_is_valid() {
        let future_shape = TypeId(17);
        assert!(future_shape.is_known_range());
        assert_eq!(future_shape.name(), "Unknown");
    }

    #[test]
    fn test_format_flags_combine() {
        let mut flags = FormatFlags::STREAMING | FormatFlags::CHECKSUM_PRESENT;
        assert!(flags.contains(FormatFlags::STREAMING));
        assert!(!flags.contains(FormatFlags::COMPRESSED));
        flags.insert(FormatFlags::COMPRESSED);
        assert_eq!(flags.bits(), 0b1101);
        flags.remove(FormatFlags::STREAMING);
        assert!(!flags.contains(FormatFlags::STREAMING));
    }

    #[test]
    fn test_compression_kind_wire_values() {
        assert_eq!(CompressionKind::from_u8(0), Some(CompressionKind::None));
        assert_eq!(CompressionKind::from_u8(2), Some(CompressionKind::HighRatio));
        assert_eq!(CompressionKind::from_u8(3), None);
        assert_eq!(CompressionKind::Fast.as_u8(), 1);
        assert!(!CompressionKind::None.is_compressed());
    }

    #[test]
    fn test_version_serde_roundtrip() {
        let v = Version::new(2, 7);
        let json = serde_json::to_string(&v).unwrap();
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(v, back);
    }
}
