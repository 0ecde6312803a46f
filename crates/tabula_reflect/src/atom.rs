use core::fmt;

// -----------------------------------------------------------------------------
// Atom

/// The format-agnostic tag identifying a value's serializable shape.
///
/// Every [`Serial`](crate::Serial) type resolves to exactly one atom, and
/// every concrete archive maps each atom to its own wire representation.
/// The set is closed: there is no way to introduce a new wire shape without
/// teaching every codec about it, which is intentional.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Atom {
    /// Single boolean value.
    Bool,
    /// Signed integer, 1 byte.
    I8,
    /// Unsigned integer, 1 byte.
    U8,
    /// Signed integer, 2 bytes.
    I16,
    /// Unsigned integer, 2 bytes.
    U16,
    /// Signed integer, 4 bytes.
    I32,
    /// Unsigned integer, 4 bytes.
    U32,
    /// Signed integer, 8 bytes.
    I64,
    /// Unsigned integer, 8 bytes.
    U64,
    /// 32-bit floating point.
    F32,
    /// 64-bit floating point.
    F64,
    /// 80-bit extended floating point. Kept for wire compatibility with
    /// producers whose `long double` is a distinct type; no Rust type
    /// resolves to it.
    F80,
    /// Length-counted character data.
    String,
    /// Fixed- or variable-length sequence of one element shape.
    Array,
    /// Associative key/value container.
    Map,
    /// An object embedded by value, described by its own
    /// [`Descriptor`](crate::info::Descriptor).
    Descriptor,
    /// An object referenced by pointer, carrying an ownership mode.
    Reference,
    /// Internal utility tag. Never valid in a value position; archives
    /// reject it.
    Ignored,
}

impl Atom {
    /// Returns the natural byte width of a scalar atom, or `None` for
    /// non-scalar shapes.
    ///
    /// The width doubles as the scalar's natural alignment requirement in
    /// the table codec.
    #[inline]
    pub const fn width(self) -> Option<u8> {
        match self {
            Atom::Bool | Atom::I8 | Atom::U8 => Some(1),
            Atom::I16 | Atom::U16 => Some(2),
            Atom::I32 | Atom::U32 | Atom::F32 => Some(4),
            Atom::I64 | Atom::U64 | Atom::F64 => Some(8),
            Atom::F80 => Some(10),
            _ => None,
        }
    }

    /// True for the signed fixed-width integer atoms.
    #[inline]
    pub const fn is_signed(self) -> bool {
        matches!(self, Atom::I8 | Atom::I16 | Atom::I32 | Atom::I64)
    }

    /// True for any fixed-width integer or boolean atom.
    #[inline]
    pub const fn is_integral(self) -> bool {
        matches!(
            self,
            Atom::Bool
                | Atom::I8
                | Atom::U8
                | Atom::I16
                | Atom::U16
                | Atom::I32
                | Atom::U32
                | Atom::I64
                | Atom::U64
        )
    }

    /// True if values of this atom are stored inline in a table slot;
    /// false if the slot holds a forward offset to separate content.
    #[inline]
    pub const fn is_inline(self) -> bool {
        self.width().is_some()
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Atom::Bool => "bool",
            Atom::I8 => "i8",
            Atom::U8 => "u8",
            Atom::I16 => "i16",
            Atom::U16 => "u16",
            Atom::I32 => "i32",
            Atom::U32 => "u32",
            Atom::I64 => "i64",
            Atom::U64 => "u64",
            Atom::F32 => "f32",
            Atom::F64 => "f64",
            Atom::F80 => "f80",
            Atom::String => "string",
            Atom::Array => "array",
            Atom::Map => "map",
            Atom::Descriptor => "object",
            Atom::Reference => "reference",
            Atom::Ignored => "ignored",
        };
        f.write_str(name)
    }
}
