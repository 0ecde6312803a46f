use tabula_reflect::{Atom, Error, Result};

// -----------------------------------------------------------------------------
// Wire types

/// The four payload classes of the tag/length/value grammar. The numeric
/// values are the low three bits of a field tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WireType {
    /// Base-128 variable-length integer.
    Varint = 0,
    /// Fixed 8-byte little-endian payload.
    QuadWord = 1,
    /// Varint byte length followed by that many bytes.
    LenDelimit = 2,
    /// Fixed 4-byte little-endian payload.
    DoubleWord = 5,
}

impl WireType {
    #[inline]
    pub(crate) fn bits(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::Varint),
            1 => Some(Self::QuadWord),
            2 => Some(Self::LenDelimit),
            5 => Some(Self::DoubleWord),
            _ => None,
        }
    }
}

/// Maps an atom to its payload class. [`Atom::Ignored`] has no wire
/// mapping and is rejected.
pub(crate) fn wire_type(atom: Atom) -> Result<WireType> {
    match atom {
        _ if atom.is_integral() => Ok(WireType::Varint),
        Atom::F32 => Ok(WireType::DoubleWord),
        Atom::F64 | Atom::F80 => Ok(WireType::QuadWord),
        Atom::String | Atom::Array | Atom::Map | Atom::Descriptor | Atom::Reference => {
            Ok(WireType::LenDelimit)
        }
        _ => Err(Error::UnsupportedAtom { atom }),
    }
}

/// The tag preceding every field payload: identifier in the high bits,
/// payload class in the low three.
#[inline]
pub(crate) fn tag(ident: u32, wire: WireType) -> u64 {
    (u64::from(ident) << 3) | u64::from(wire.bits())
}

// -----------------------------------------------------------------------------
// Varint / zigzag

/// Encoded length of `v` as a varint, in bytes.
#[inline]
pub(crate) fn varint_len(v: u64) -> u64 {
    if v == 0 {
        return 1;
    }
    (64 - u64::from(v.leading_zeros())).div_ceil(7)
}

/// Appends the varint encoding of `v` to `out`.
pub(crate) fn put_varint(out: &mut Vec<u8>, mut v: u64) {
    loop {
        let byte = (v & 0x7F) as u8;
        v >>= 7;
        if v == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Folds a signed value into the unsigned space so small magnitudes of
/// either sign encode short.
#[inline]
pub(crate) fn zigzag(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

#[inline]
pub(crate) fn unzigzag(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}
