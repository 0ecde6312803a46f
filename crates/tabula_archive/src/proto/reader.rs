use core::any::Any;
use std::io::Read;
use std::sync::Arc;

use tabula_reflect::archive::{
    ArrayAppender, CreateDelete, InArchive, InArchiveRegistry, MapInserter,
};
use tabula_reflect::info::Descriptor;
use tabula_reflect::{Atom, Described, Error, FieldSerializer, Result};

use super::wire::{WireType, unzigzag, wire_type};

// -----------------------------------------------------------------------------
// ProtoReader

/// Reconstructs objects from a tag/length/value stream.
///
/// The field loop drives everything: each iteration reads a tag, resolves
/// the identifier against the descriptor and dispatches to the field's
/// serializer, or skips the payload by wire type when the identifier is
/// unknown, which is how producers with extra fields stay readable.
/// Fields the producer never wrote keep their defaults.
///
/// References were flattened to embedded copies on the write side, so
/// each occurrence reconstructs independently; shared identity does not
/// survive this format.
pub struct ProtoReader {
    data: Vec<u8>,
    cursor: usize,
    /// Length of the delimited block whose payload is about to be read.
    /// Set by the dispatch loops for every length-delimited value and
    /// consumed by the operation that reads the payload; `None` means the
    /// value carries its own length prefix.
    pending: Option<u64>,
    failed: bool,
}

impl ProtoReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            cursor: 0,
            pending: None,
            failed: false,
        }
    }

    /// Buffers the stream's remaining bytes and wraps them.
    pub fn from_reader(mut stream: impl Read) -> Result<Self> {
        let mut data = Vec::new();
        stream.read_to_end(&mut data)?;
        Ok(Self::new(data))
    }

    /// Reconstructs a root object from the remainder of the input.
    pub fn read_root<T: Described + Default>(&mut self) -> Result<T> {
        if self.failed {
            return Err(Error::Poisoned);
        }
        match self.read_root_inner() {
            Ok(obj) => Ok(obj),
            Err(err) => {
                self.failed = true;
                Err(err)
            }
        }
    }

    fn read_root_inner<T: Described + Default>(&mut self) -> Result<T> {
        let mut obj = T::default();
        let remaining = (self.data.len() - self.cursor) as u64;
        self.read_fields(T::descriptor(), &mut obj, remaining)?;
        Ok(obj)
    }

    // ---- primitives ----

    fn read_varint(&mut self) -> Result<u64> {
        let mut value = 0u64;
        for i in 0..10 {
            let byte = *self.data.get(self.cursor).ok_or(Error::Malformed {
                what: "truncated varint",
            })?;
            self.cursor += 1;
            value |= u64::from(byte & 0x7F) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(Error::Malformed {
            what: "varint exceeds 64 bits",
        })
    }

    fn take(&mut self, n: usize) -> Result<&[u8]> {
        let end = self.cursor.checked_add(n).ok_or(Error::Malformed {
            what: "length overflows the input",
        })?;
        let bytes = self.data.get(self.cursor..end).ok_or(Error::Malformed {
            what: "payload extends past end of input",
        })?;
        self.cursor = end;
        Ok(bytes)
    }

    // ---- field loop ----

    /// Reads tagged fields into `obj` until `ncb` bytes are consumed.
    fn read_fields(&mut self, desc: &'static Descriptor, obj: &mut dyn Any, ncb: u64) -> Result<()> {
        let end = self
            .cursor
            .checked_add(ncb as usize)
            .filter(|&end| end <= self.data.len())
            .ok_or(Error::Malformed {
                what: "field block extends past end of input",
            })?;
        while self.cursor < end {
            let tag = self.read_varint()?;
            let ident = (tag >> 3) as u32;
            let wire = WireType::from_bits((tag & 7) as u8).ok_or(Error::Malformed {
                what: "unrecognized wire type",
            })?;
            match desc.field_by_ident(ident) {
                Some(field) => {
                    let ser = field.serializer();
                    if wire_type(ser.atom())? != wire {
                        return Err(Error::Malformed {
                            what: "field wire type does not match its declared shape",
                        });
                    }
                    self.dispatch(ser, field.get_mut(obj)?, wire)?;
                }
                None => self.skip_value(wire)?,
            }
        }
        if self.cursor != end {
            return Err(Error::Malformed {
                what: "field payload overran its block",
            });
        }
        Ok(())
    }

    /// Reads one tagged value whose tag has already been consumed.
    fn dispatch(
        &mut self,
        ser: &'static dyn FieldSerializer,
        val: &mut dyn Any,
        wire: WireType,
    ) -> Result<()> {
        match wire {
            WireType::LenDelimit => {
                let len = self.read_varint()?;
                self.pending = Some(len);
                ser.deserialize(self, val, len)
            }
            _ => {
                self.pending = None;
                ser.deserialize(self, val, 0)
            }
        }
    }

    /// Skips one value of an unknown field.
    fn skip_value(&mut self, wire: WireType) -> Result<()> {
        match wire {
            WireType::Varint => {
                self.read_varint()?;
            }
            WireType::DoubleWord => {
                self.take(4)?;
            }
            WireType::QuadWord => {
                self.take(8)?;
            }
            WireType::LenDelimit => {
                let len = self.read_varint()?;
                self.take(len as usize)?;
            }
        }
        Ok(())
    }

    /// Reads one bare (untagged) value, as found inside sequence bodies.
    fn read_element(&mut self, ser: &'static dyn FieldSerializer, val: &mut dyn Any) -> Result<()> {
        match wire_type(ser.atom())? {
            WireType::LenDelimit => {
                let len = self.read_varint()?;
                self.pending = Some(len);
                ser.deserialize(self, val, len)
            }
            _ => {
                self.pending = None;
                ser.deserialize(self, val, 0)
            }
        }
    }
}

// -----------------------------------------------------------------------------
// Archive protocol

impl InArchive for ProtoReader {
    fn read_integer(&mut self, atom: Atom) -> Result<i64> {
        if !atom.is_integral() {
            return Err(Error::UnsupportedAtom { atom });
        }
        let raw = self.read_varint()?;
        Ok(if atom.is_signed() {
            unzigzag(raw)
        } else {
            raw as i64
        })
    }

    fn read_float32(&mut self) -> Result<f32> {
        let bytes = self.take(4)?;
        Ok(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_float64(&mut self) -> Result<f64> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(f64::from_le_bytes(raw))
    }

    fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_varint()? != 0)
    }

    fn read_byte_array(&mut self, buf: &mut [u8]) -> Result<()> {
        let bytes = self.take(buf.len())?;
        buf.copy_from_slice(bytes);
        Ok(())
    }

    fn read_string(&mut self, _char_size: u8, _ncb: u64) -> Result<Vec<u8>> {
        // The dispatch loops consume the length for every delimited value,
        // including zero-length ones; only a string read outside those
        // loops still carries its own prefix.
        let n = match self.pending.take() {
            Some(len) => len,
            None => self.read_varint()?,
        };
        Ok(self.take(n as usize)?.to_vec())
    }

    fn skip(&mut self, ncb: u64) -> Result<()> {
        self.take(ncb as usize)?;
        Ok(())
    }

    fn count(&self) -> u64 {
        self.cursor as u64
    }
}

impl InArchiveRegistry for ProtoReader {
    fn read_object(&mut self, desc: &'static Descriptor, obj: &mut dyn Any, ncb: u64) -> Result<()> {
        self.read_fields(desc, obj, ncb)
    }

    fn read_array(&mut self, ary: &mut dyn ArrayAppender) -> Result<()> {
        let count = self.read_varint()? as usize;
        ary.reserve(count)?;
        let elem = ary.element();
        for _ in 0..count {
            let slot = ary.allocate()?;
            self.read_element(elem, slot)?;
        }
        Ok(())
    }

    fn read_map(&mut self, map: &mut dyn MapInserter) -> Result<()> {
        // `pending` holds the block length: one entry when this map field
        // arrived tagged, the whole pair list when it arrived bare.
        let block = self.pending.take().unwrap_or(0);
        let end = self
            .cursor
            .checked_add(block as usize)
            .filter(|&end| end <= self.data.len())
            .ok_or(Error::Malformed {
                what: "map block extends past end of input",
            })?;
        let key_ser = map.key_serializer();
        let value_ser = map.value_serializer();
        while self.cursor < end {
            self.expect_entry_tag(1, key_ser)?;
            self.read_element(key_ser, map.key())?;
            self.expect_entry_tag(2, value_ser)?;
            let slot = map.insert()?;
            self.read_element(value_ser, slot)?;
        }
        Ok(())
    }

    fn read_reference_unique(
        &mut self,
        desc: &'static Descriptor,
        create: fn() -> Box<dyn Any>,
    ) -> Result<Option<Box<dyn Any>>> {
        let block = self.pending.take().unwrap_or(0);
        if block == 0 {
            return Ok(None);
        }
        let mut storage = create();
        self.read_fields(desc, &mut *storage, block)?;
        Ok(Some(storage))
    }

    fn read_reference_shared(
        &mut self,
        desc: &'static Descriptor,
        create: fn() -> Arc<dyn Any + Send + Sync>,
    ) -> Result<Option<Arc<dyn Any + Send + Sync>>> {
        let block = self.pending.take().unwrap_or(0);
        if block == 0 {
            return Ok(None);
        }
        // Embedded copy: each occurrence reconstructs its own instance.
        let mut handle = create();
        {
            let obj = Arc::get_mut(&mut handle).ok_or(Error::Malformed {
                what: "freshly created shared handle is already aliased",
            })?;
            self.read_fields(desc, obj, block)?;
        }
        Ok(Some(handle))
    }

    fn read_reference_raw(
        &mut self,
        desc: &'static Descriptor,
        lifecycle: &CreateDelete,
    ) -> Result<Option<Box<dyn Any>>> {
        let block = self.pending.take().unwrap_or(0);
        if block == 0 {
            return Ok(None);
        }
        let mut storage = (lifecycle.create)();
        self.read_fields(desc, &mut *storage, block)?;
        Ok(Some(storage))
    }
}

impl ProtoReader {
    /// Consumes the tag of a map entry component and checks its reserved
    /// identifier.
    fn expect_entry_tag(&mut self, ident: u32, ser: &'static dyn FieldSerializer) -> Result<()> {
        let tag = self.read_varint()?;
        if (tag >> 3) as u32 != ident {
            return Err(Error::Malformed {
                what: "map entry component out of order",
            });
        }
        let wire = WireType::from_bits((tag & 7) as u8).ok_or(Error::Malformed {
            what: "unrecognized wire type",
        })?;
        if wire_type(ser.atom())? != wire {
            return Err(Error::Malformed {
                what: "map entry wire type does not match its declared shape",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_reflect::describe;

    #[derive(Default, PartialEq, Debug)]
    struct Point {
        x: i32,
        y: u32,
    }

    describe! {
        Point {
            x => 3,
            y => 4,
        }
    }

    #[test]
    fn unknown_identifiers_are_skipped() {
        // ident 1 (unknown, varint), ident 3 = x, ident 9 (unknown,
        // length-delimited), ident 4 = y.
        let bytes = vec![
            0x08, 0x7F, // unknown varint
            0x18, 0x05, // x, zigzag-encoded
            0x4A, 0x02, 0xAB, 0xCD, // unknown 2-byte block
            0x20, 0x2A, // y = 42
        ];
        let mut reader = ProtoReader::new(bytes);
        let point: Point = reader.read_root().unwrap();
        assert_eq!(point.x, -3);
        assert_eq!(point.y, 42);
    }

    #[test]
    fn truncated_block_is_malformed() {
        // x field announced as varint but input ends mid-tag.
        let mut reader = ProtoReader::new(vec![0x18]);
        assert!(matches!(
            reader.read_root::<Point>(),
            Err(Error::Malformed { .. })
        ));
        assert!(matches!(
            reader.read_root::<Point>(),
            Err(Error::Poisoned)
        ));
    }

    #[test]
    fn mismatched_wire_type_is_rejected() {
        // x declared varint but arrives as a 4-byte word.
        let mut reader = ProtoReader::new(vec![0x1D, 0, 0, 0, 0]);
        assert!(matches!(
            reader.read_root::<Point>(),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn missing_fields_keep_defaults() {
        let mut reader = ProtoReader::new(Vec::new());
        let point: Point = reader.read_root().unwrap();
        assert_eq!(point, Point::default());
    }
}
