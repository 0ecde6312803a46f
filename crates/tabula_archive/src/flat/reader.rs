use core::any::Any;
use std::io::Read;
use std::sync::Arc;

use hashbrown::HashMap;

use tabula_reflect::archive::{
    ArrayAppender, CreateDelete, InArchive, InArchiveRegistry, MapInserter,
};
use tabula_reflect::info::Descriptor;
use tabula_reflect::{Atom, Described, Error, Result};

// -----------------------------------------------------------------------------
// FlatReader

/// Reconstructs objects from a buffer produced by
/// [`FlatWriter`](super::FlatWriter).
///
/// Reading is random access: the cursor jumps to each table slot named by
/// a vtable and follows forward offsets from there. A slot the producer's
/// vtable does not cover leaves the target field at its default, which is
/// what lets older producers feed newer consumers.
///
/// Every offset is bounds-checked before use; a buffer that walks outside
/// itself reports [`Error::Malformed`] rather than panicking, and the
/// session is poisoned afterwards.
pub struct FlatReader {
    data: Vec<u8>,
    cursor: usize,
    consumed: u64,
    shared: HashMap<usize, Arc<dyn Any + Send + Sync>>,
    failed: bool,
}

impl FlatReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            cursor: 0,
            consumed: 0,
            shared: HashMap::new(),
            failed: false,
        }
    }

    /// Buffers the stream's remaining bytes and wraps them.
    pub fn from_reader(mut stream: impl Read) -> Result<Self> {
        let mut data = Vec::new();
        stream.read_to_end(&mut data)?;
        Ok(Self::new(data))
    }

    /// Reconstructs the root object the buffer was written with.
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
        self.cursor = 0;
        let table = self.follow_offset()?.ok_or(Error::Malformed {
            what: "root offset is null",
        })?;
        let mut obj = T::default();
        self.read_table_at(T::descriptor(), &mut obj, table)?;
        Ok(obj)
    }

    // ---- bounds-checked accessors ----

    fn slice_at(&self, pos: usize, n: usize) -> Result<&[u8]> {
        self.data
            .get(pos..pos + n)
            .ok_or(Error::Malformed {
                what: "offset beyond end of buffer",
            })
    }

    fn u16_at(&self, pos: usize) -> Result<u16> {
        let bytes = self.slice_at(pos, 2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32_at(&self, pos: usize) -> Result<u32> {
        let bytes = self.slice_at(pos, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn i32_at(&self, pos: usize) -> Result<i32> {
        Ok(self.u32_at(pos)? as i32)
    }

    /// Reads the forward offset at the cursor and resolves its target.
    /// A zero offset means an absent value.
    fn follow_offset(&mut self) -> Result<Option<usize>> {
        let base = self.cursor;
        let v = self.u32_at(base)?;
        self.cursor = base + 4;
        self.consumed += 4;
        if v == 0 {
            return Ok(None);
        }
        let target = base + v as usize;
        if target >= self.data.len() {
            return Err(Error::Malformed {
                what: "forward offset beyond end of buffer",
            });
        }
        Ok(Some(target))
    }

    /// Reads one table into `obj`: resolve the vtable, then visit every
    /// field the vtable covers with a non-zero slot.
    fn read_table_at(
        &mut self,
        desc: &'static Descriptor,
        obj: &mut dyn Any,
        table_pos: usize,
    ) -> Result<()> {
        let soff = self.i32_at(table_pos)? as i64;
        let vt_pos = table_pos as i64 + soff;
        if vt_pos < 0 || vt_pos as usize >= self.data.len() {
            return Err(Error::Malformed {
                what: "vtable offset beyond end of buffer",
            });
        }
        let vt_pos = vt_pos as usize;
        let vt_size = self.u16_at(vt_pos)? as usize;

        for (i, field) in desc.fields().iter().enumerate() {
            let entry = 4 + 2 * i;
            let slot = if entry + 2 <= vt_size {
                self.u16_at(vt_pos + entry)? as usize
            } else {
                0
            };
            if slot == 0 {
                // Absent in this producer's layout; the field keeps its
                // default.
                continue;
            }
            self.cursor = table_pos + slot;
            field
                .serializer()
                .deserialize(self, field.get_mut(obj)?, 0)?;
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Archive protocol

impl InArchive for FlatReader {
    fn read_integer(&mut self, atom: Atom) -> Result<i64> {
        let width = match atom.width() {
            Some(w) if w <= 8 => w as usize,
            _ => return Err(Error::UnsupportedAtom { atom }),
        };
        let bytes = self.slice_at(self.cursor, width)?;
        let mut raw = [0u8; 8];
        raw[..width].copy_from_slice(bytes);
        let mut value = i64::from_le_bytes(raw);
        if atom.is_signed() && width < 8 {
            let shift = 64 - 8 * width as u32;
            value = value << shift >> shift;
        }
        self.cursor += width;
        self.consumed += width as u64;
        Ok(value)
    }

    fn read_float32(&mut self) -> Result<f32> {
        let bytes = self.slice_at(self.cursor, 4)?;
        let value = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        self.cursor += 4;
        self.consumed += 4;
        Ok(value)
    }

    fn read_float64(&mut self) -> Result<f64> {
        let bytes = self.slice_at(self.cursor, 8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        self.cursor += 8;
        self.consumed += 8;
        Ok(f64::from_le_bytes(raw))
    }

    fn read_bool(&mut self) -> Result<bool> {
        let byte = self.slice_at(self.cursor, 1)?[0];
        self.cursor += 1;
        self.consumed += 1;
        Ok(byte != 0)
    }

    fn read_byte_array(&mut self, buf: &mut [u8]) -> Result<()> {
        let bytes = self.slice_at(self.cursor, buf.len())?;
        buf.copy_from_slice(bytes);
        self.cursor += buf.len();
        self.consumed += buf.len() as u64;
        Ok(())
    }

    fn read_string(&mut self, _char_size: u8, _ncb: u64) -> Result<Vec<u8>> {
        // The slot holds a forward offset; the stored length is
        // authoritative, so the block length hint is unused.
        let Some(pos) = self.follow_offset()? else {
            return Ok(Vec::new());
        };
        let n = self.u32_at(pos)? as usize;
        let bytes = self.slice_at(pos + 4, n)?.to_vec();
        self.consumed += 4 + n as u64;
        Ok(bytes)
    }

    fn skip(&mut self, ncb: u64) -> Result<()> {
        let end = self
            .cursor
            .checked_add(ncb as usize)
            .filter(|&end| end <= self.data.len())
            .ok_or(Error::Malformed {
                what: "skip beyond end of buffer",
            })?;
        self.cursor = end;
        self.consumed += ncb;
        Ok(())
    }

    fn count(&self) -> u64 {
        self.consumed
    }
}

impl InArchiveRegistry for FlatReader {
    fn read_object(
        &mut self,
        desc: &'static Descriptor,
        obj: &mut dyn Any,
        _ncb: u64,
    ) -> Result<()> {
        match self.follow_offset()? {
            Some(pos) => self.read_table_at(desc, obj, pos),
            None => Ok(()),
        }
    }

    fn read_array(&mut self, ary: &mut dyn ArrayAppender) -> Result<()> {
        let Some(pos) = self.follow_offset()? else {
            return ary.reserve(0);
        };
        let count = self.u32_at(pos)? as usize;
        ary.reserve(count)?;
        let elem = ary.element();
        let stride = elem.atom().width().map(|w| w as usize).unwrap_or(4);
        for i in 0..count {
            self.cursor = pos + 4 + stride * i;
            elem.deserialize(self, ary.allocate()?, 0)?;
        }
        Ok(())
    }

    fn read_map(&mut self, map: &mut dyn MapInserter) -> Result<()> {
        let Some(pair_pos) = self.follow_offset()? else {
            return Ok(());
        };
        let keys_pos = pair_pos + self.u32_at(pair_pos)? as usize;
        let values_pos = pair_pos + 4 + self.u32_at(pair_pos + 4)? as usize;

        let key_count = self.u32_at(keys_pos)? as usize;
        let value_count = self.u32_at(values_pos)? as usize;
        if key_count != value_count {
            return Err(Error::Malformed {
                what: "map key and value sequences disagree on length",
            });
        }

        let key_ser = map.key_serializer();
        let value_ser = map.value_serializer();
        let key_stride = key_ser.atom().width().map(|w| w as usize).unwrap_or(4);
        let value_stride = value_ser.atom().width().map(|w| w as usize).unwrap_or(4);
        for i in 0..key_count {
            self.cursor = keys_pos + 4 + key_stride * i;
            key_ser.deserialize(self, map.key(), 0)?;
            let slot = map.insert()?;
            self.cursor = values_pos + 4 + value_stride * i;
            value_ser.deserialize(self, slot, 0)?;
        }
        Ok(())
    }

    fn read_reference_unique(
        &mut self,
        desc: &'static Descriptor,
        create: fn() -> Box<dyn Any>,
    ) -> Result<Option<Box<dyn Any>>> {
        let Some(pos) = self.follow_offset()? else {
            return Ok(None);
        };
        let mut storage = create();
        self.read_table_at(desc, &mut *storage, pos)?;
        Ok(Some(storage))
    }

    fn read_reference_shared(
        &mut self,
        desc: &'static Descriptor,
        create: fn() -> Arc<dyn Any + Send + Sync>,
    ) -> Result<Option<Arc<dyn Any + Send + Sync>>> {
        let Some(pos) = self.follow_offset()? else {
            return Ok(None);
        };
        // One live instance per distinct buffer position: references that
        // aliased on the write side alias again after reconstruction.
        if let Some(existing) = self.shared.get(&pos) {
            return Ok(Some(existing.clone()));
        }
        let mut handle = create();
        {
            let obj = Arc::get_mut(&mut handle).ok_or(Error::Malformed {
                what: "freshly created shared handle is already aliased",
            })?;
            self.read_table_at(desc, obj, pos)?;
        }
        self.shared.insert(pos, handle.clone());
        Ok(Some(handle))
    }

    fn read_reference_raw(
        &mut self,
        desc: &'static Descriptor,
        lifecycle: &CreateDelete,
    ) -> Result<Option<Box<dyn Any>>> {
        let Some(pos) = self.follow_offset()? else {
            return Ok(None);
        };
        let mut storage = (lifecycle.create)();
        self.read_table_at(desc, &mut *storage, pos)?;
        Ok(Some(storage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_buffer_is_malformed() {
        let mut reader = FlatReader::new(vec![8, 0]);
        #[derive(Default)]
        struct Empty;
        tabula_reflect::describe! {
            Empty {}
        }
        assert!(matches!(
            reader.read_root::<Empty>(),
            Err(Error::Malformed { .. })
        ));
        // Poisoned from here on.
        assert!(matches!(
            reader.read_root::<Empty>(),
            Err(Error::Poisoned)
        ));
    }

    #[test]
    fn oversized_skip_is_malformed() {
        let mut reader = FlatReader::new(vec![0; 8]);
        assert!(matches!(
            reader.skip(u64::MAX),
            Err(Error::Malformed { .. })
        ));
        assert!(matches!(reader.skip(9), Err(Error::Malformed { .. })));
        reader.skip(8).unwrap();
        assert_eq!(reader.count(), 8);
    }

    #[test]
    fn sign_extension_on_narrow_integers() {
        let mut reader = FlatReader::new(vec![0xFF, 0x7F]);
        assert_eq!(reader.read_integer(Atom::I8).unwrap(), -1);
        assert_eq!(reader.read_integer(Atom::U8).unwrap(), 0x7F);
        assert_eq!(reader.count(), 2);
    }
}
