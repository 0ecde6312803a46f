use crate::archive::{InArchiveRegistry, OutArchiveRegistry};
use crate::{Atom, Error, Result, Serial};

// Rust strings are always UTF-8 byte data: char_size is 1 and the
// character count equals the byte count.
impl Serial for String {
    #[inline]
    fn atom() -> Atom {
        Atom::String
    }

    #[inline]
    fn is_optional() -> bool {
        true
    }

    fn size(&self, ar: &dyn OutArchiveRegistry) -> Result<u64> {
        Ok(ar.size_string(self.as_bytes(), self.len() as u64, 1))
    }

    fn serialize(&self, ar: &mut dyn OutArchiveRegistry) -> Result<()> {
        ar.write_string(self.as_bytes(), self.len() as u64, 1)
    }

    fn deserialize(&mut self, ar: &mut dyn InArchiveRegistry, ncb: u64) -> Result<()> {
        let bytes = ar.read_string(1, ncb)?;
        *self = String::from_utf8(bytes).map_err(|_| Error::Malformed {
            what: "string data is not valid UTF-8",
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{Atom, Serial};

    #[test]
    fn string_is_optional() {
        assert_eq!(<String as Serial>::atom(), Atom::String);
        assert!(<String as Serial>::is_optional());
        assert!(!<String as Serial>::allocates());
    }
}
