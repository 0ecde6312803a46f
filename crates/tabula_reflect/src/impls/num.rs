use crate::archive::{InArchiveRegistry, OutArchiveRegistry};
use crate::{Atom, Result, Serial};

// Integers transit the protocol bit-cast through `i64`; the atom carries
// the width and signedness each codec needs to encode them correctly.
macro_rules! impl_serial_integer {
    ($($ty:ty => $atom:ident),* $(,)?) => {$(
        impl Serial for $ty {
            #[inline]
            fn atom() -> Atom {
                Atom::$atom
            }

            fn size(&self, ar: &dyn OutArchiveRegistry) -> Result<u64> {
                Ok(ar.size_integer(*self as i64, Atom::$atom))
            }

            fn serialize(&self, ar: &mut dyn OutArchiveRegistry) -> Result<()> {
                ar.write_integer(*self as i64, Atom::$atom)
            }

            fn deserialize(&mut self, ar: &mut dyn InArchiveRegistry, _ncb: u64) -> Result<()> {
                *self = ar.read_integer(Atom::$atom)? as $ty;
                Ok(())
            }
        }
    )*};
}

impl_serial_integer! {
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
}

impl Serial for bool {
    #[inline]
    fn atom() -> Atom {
        Atom::Bool
    }

    fn size(&self, ar: &dyn OutArchiveRegistry) -> Result<u64> {
        Ok(ar.size_bool(*self))
    }

    fn serialize(&self, ar: &mut dyn OutArchiveRegistry) -> Result<()> {
        ar.write_bool(*self)
    }

    fn deserialize(&mut self, ar: &mut dyn InArchiveRegistry, _ncb: u64) -> Result<()> {
        *self = ar.read_bool()?;
        Ok(())
    }
}

impl Serial for f32 {
    #[inline]
    fn atom() -> Atom {
        Atom::F32
    }

    fn size(&self, ar: &dyn OutArchiveRegistry) -> Result<u64> {
        Ok(ar.size_float32(*self))
    }

    fn serialize(&self, ar: &mut dyn OutArchiveRegistry) -> Result<()> {
        ar.write_float32(*self)
    }

    fn deserialize(&mut self, ar: &mut dyn InArchiveRegistry, _ncb: u64) -> Result<()> {
        *self = ar.read_float32()?;
        Ok(())
    }
}

impl Serial for f64 {
    #[inline]
    fn atom() -> Atom {
        Atom::F64
    }

    fn size(&self, ar: &dyn OutArchiveRegistry) -> Result<u64> {
        Ok(ar.size_float64(*self))
    }

    fn serialize(&self, ar: &mut dyn OutArchiveRegistry) -> Result<()> {
        ar.write_float64(*self)
    }

    fn deserialize(&mut self, ar: &mut dyn InArchiveRegistry, _ncb: u64) -> Result<()> {
        *self = ar.read_float64()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{Atom, Serial};

    #[test]
    fn atoms_carry_width_and_sign() {
        assert_eq!(<i8 as Serial>::atom(), Atom::I8);
        assert_eq!(<u16 as Serial>::atom(), Atom::U16);
        assert_eq!(<i64 as Serial>::atom(), Atom::I64);
        assert_eq!(<f32 as Serial>::atom(), Atom::F32);
        assert_eq!(<bool as Serial>::atom(), Atom::Bool);
    }

    #[test]
    fn primitives_are_mandatory_and_passive() {
        assert!(!<u32 as Serial>::is_optional());
        assert!(!<u32 as Serial>::allocates());
        assert!(!<f64 as Serial>::is_optional());
    }
}
