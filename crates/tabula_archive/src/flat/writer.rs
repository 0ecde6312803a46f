use core::any::Any;
use std::io::Write;

use hashbrown::HashMap;

use tabula_reflect::archive::{
    ArrayReader, MapReader, OutArchive, OutArchiveRegistry, RefSource, SourceId,
};
use tabula_reflect::info::Descriptor;
use tabula_reflect::{Atom, Described, Error, FieldSerializer, Result};

use super::buffer::{BackBuffer, pad_for};
use super::vtable::{VTableKey, VTableSet};

// -----------------------------------------------------------------------------
// Layout helpers

#[inline]
fn round_up(x: usize, align: usize) -> usize {
    x.next_multiple_of(align)
}

/// Natural alignment of an inline scalar slot. Widths that are not powers
/// of two align on 2-byte boundaries.
#[inline]
fn slot_align(width: usize) -> usize {
    if width.is_power_of_two() { width } else { 2 }
}

/// What a table slot will hold once the layout is known.
enum Slot {
    /// Captured little-endian scalar bytes.
    Inline(Vec<u8>),
    /// End offset of separately written content, or `None` for a null
    /// reference.
    Indirect(Option<u32>),
}

// -----------------------------------------------------------------------------
// FlatWriter

/// Serializes a described object graph into a single offset-table buffer.
///
/// Content is assembled back to front in memory and flushed to the stream
/// once by [`finish`](FlatWriter::finish); nothing reaches the stream
/// before then. Every table's layout is recorded as a vtable, and tables
/// with identical layouts share one vtable in the output.
///
/// Each distinct referenced object is written once per session and
/// addressed by its buffer offset thereafter. The offset bookkeeping
/// refuses to register one address twice; a session that trips over that
/// (or any other error) is poisoned and must be discarded.
pub struct FlatWriter<W: Write> {
    stream: W,
    buf: BackBuffer,
    vtables: VTableSet,
    offsets: HashMap<SourceId, u32>,
    largest_align: usize,
    last_offset: u32,
    last_ref_null: bool,
    inline: Option<Vec<u8>>,
    root: Option<u32>,
    failed: bool,
}

impl<W: Write> FlatWriter<W> {
    pub fn new(stream: W) -> Self {
        Self {
            stream,
            buf: BackBuffer::new(),
            vtables: VTableSet::new(),
            offsets: HashMap::new(),
            largest_align: 4,
            last_offset: 0,
            last_ref_null: false,
            inline: None,
            root: None,
            failed: false,
        }
    }

    /// Serializes the root object. The session accepts exactly one root.
    pub fn write_root<T: Described>(&mut self, obj: &T) -> Result<()> {
        if self.failed {
            return Err(Error::Poisoned);
        }
        match self.write_root_inner(obj) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.failed = true;
                Err(err)
            }
        }
    }

    fn write_root_inner<T: Described>(&mut self, obj: &T) -> Result<()> {
        let desc = T::descriptor();
        let eo = self.write_table(desc, obj)?;
        self.save_offset(SourceId::of(obj), eo, desc.type_name())?;
        self.root = Some(eo);
        Ok(())
    }

    /// Pads the buffer out to its final alignment, prepends the root
    /// offset and flushes everything to the stream.
    pub fn finish(mut self) -> Result<W> {
        if self.failed {
            return Err(Error::Poisoned);
        }
        let root = self.root.ok_or(Error::Malformed {
            what: "no root object was written",
        })?;
        self.buf.align_for(4, self.largest_align.max(4));
        let eo = self.buf.len() + 4;
        self.buf.prepend(&(eo as u32 - root).to_le_bytes());

        let Self { mut stream, buf, .. } = self;
        stream.write_all(&buf.into_bytes())?;
        stream.flush()?;
        Ok(stream)
    }

    /// Distinct table layouts emitted so far.
    #[inline]
    pub fn vtable_count(&self) -> usize {
        self.vtables.len()
    }

    fn save_offset(&mut self, id: SourceId, eo: u32, type_name: &'static str) -> Result<()> {
        if self.offsets.insert(id, eo).is_some() {
            return Err(Error::DuplicateOffset { type_name });
        }
        Ok(())
    }

    /// Captures the little-endian image of one inline value by routing its
    /// scalar writes into a side buffer instead of the back buffer.
    fn capture_inline(&mut self, ser: &'static dyn FieldSerializer, val: &dyn Any) -> Result<Vec<u8>> {
        self.inline = Some(Vec::new());
        let outcome = ser.serialize(self, val);
        let bytes = self.inline.take().unwrap_or_default();
        outcome?;
        Ok(bytes)
    }

    /// Writes one table and its (possibly shared) vtable. Returns the
    /// table's end offset.
    fn write_table(&mut self, desc: &'static Descriptor, obj: &dyn Any) -> Result<u32> {
        // First pass: children. Everything reached through an offset is
        // written before the table so the table's slots can point at it.
        let mut slots = Vec::with_capacity(desc.fields().len());
        for field in desc.fields() {
            let ser = field.serializer();
            let atom = ser.atom();
            if atom == Atom::Ignored {
                return Err(Error::UnsupportedAtom { atom });
            }
            let val = field.get(obj)?;
            if atom.is_inline() {
                slots.push(Slot::Inline(self.capture_inline(ser, val)?));
            } else {
                self.last_ref_null = false;
                ser.serialize(self, val)?;
                let child = if self.last_ref_null {
                    None
                } else {
                    Some(self.last_offset)
                };
                slots.push(Slot::Indirect(child));
            }
        }

        // Second pass: layout. Slots go in declaration order at their
        // natural alignment, after the 4-byte vtable offset.
        let mut off = 4usize;
        let mut table_align = 4usize;
        let mut field_offsets = Vec::with_capacity(slots.len());
        for slot in &slots {
            let (width, align) = match slot {
                Slot::Inline(bytes) => (bytes.len(), slot_align(bytes.len())),
                Slot::Indirect(_) => (4, 4),
            };
            off = round_up(off, align);
            field_offsets.push(off as u16);
            off += width;
            table_align = table_align.max(align);
        }
        if off > u16::MAX as usize {
            return Err(Error::Malformed {
                what: "table layout exceeds the 16-bit offset range",
            });
        }
        let table_size = off;
        let key = VTableKey {
            table_size: table_size as u16,
            field_offsets,
        };

        // The table's own position, and the vtable's if a new one is
        // needed, are both known before a byte is placed.
        let pad1 = pad_for(self.buf.len(), table_size, 0, table_align);
        let table_eo = self.buf.len() + pad1 + table_size;
        let (vt_eo, new_vtable) = match self.vtables.lookup(&key) {
            Some(eo) => (eo as usize, false),
            None => {
                let pad2 = table_eo & 1;
                (table_eo + pad2 + key.vt_size() as usize, true)
            }
        };

        let mut image = vec![0u8; table_size];
        image[..4].copy_from_slice(&((table_eo as i64 - vt_eo as i64) as i32).to_le_bytes());
        for (slot, &slot_off) in slots.iter().zip(&key.field_offsets) {
            let at = slot_off as usize;
            match slot {
                Slot::Inline(bytes) => image[at..at + bytes.len()].copy_from_slice(bytes),
                Slot::Indirect(Some(child_eo)) => {
                    let slot_eo = (table_eo - at) as u32;
                    image[at..at + 4].copy_from_slice(&(slot_eo - child_eo).to_le_bytes());
                }
                Slot::Indirect(None) => {}
            }
        }

        self.buf.pad(pad1);
        self.buf.prepend(&image);
        debug_assert_eq!(self.buf.len(), table_eo);
        if new_vtable {
            self.buf.pad(table_eo & 1);
            self.buf.prepend(&key.image());
            debug_assert_eq!(self.buf.len(), vt_eo);
            self.vtables.insert(key, vt_eo as u32);
        }
        self.largest_align = self.largest_align.max(table_align);
        Ok(table_eo as u32)
    }

    /// Writes a sequence of `n` homogeneous elements as a count-prefixed
    /// block. Scalar elements pack inline at their natural width; anything
    /// else gets a slot of forward offsets to per-element content.
    fn write_sequence<'a>(
        &mut self,
        elem: &'static dyn FieldSerializer,
        n: usize,
        get: &dyn Fn(usize) -> &'a dyn Any,
    ) -> Result<usize> {
        let atom = elem.atom();
        if atom == Atom::Ignored {
            return Err(Error::UnsupportedAtom { atom });
        }

        let eo = if atom.is_inline() {
            self.inline = Some(Vec::new());
            let mut outcome = Ok(());
            for i in 0..n {
                outcome = elem.serialize(self, get(i));
                if outcome.is_err() {
                    break;
                }
            }
            let bytes = self.inline.take().unwrap_or_default();
            outcome?;

            let img_len = 4 + bytes.len();
            let data_align = atom.width().map(|w| slot_align(w as usize)).unwrap_or(1);
            if data_align > 4 {
                self.buf.align_interior(img_len, 4, data_align);
            } else {
                self.buf.align_for(img_len, 4);
            }
            let eo = self.buf.len() + img_len;
            let mut image = Vec::with_capacity(img_len);
            image.extend_from_slice(&(n as u32).to_le_bytes());
            image.extend_from_slice(&bytes);
            self.buf.prepend(&image);
            self.largest_align = self.largest_align.max(data_align.max(4));
            eo
        } else {
            let mut children = Vec::with_capacity(n);
            for i in 0..n {
                self.last_ref_null = false;
                elem.serialize(self, get(i))?;
                children.push(if self.last_ref_null {
                    None
                } else {
                    Some(self.last_offset)
                });
            }

            let img_len = 4 + 4 * n;
            self.buf.align_for(img_len, 4);
            let eo = self.buf.len() + img_len;
            let mut image = Vec::with_capacity(img_len);
            image.extend_from_slice(&(n as u32).to_le_bytes());
            for (i, child) in children.iter().enumerate() {
                let slot_eo = (eo - 4 - 4 * i) as u32;
                let value = match child {
                    Some(child_eo) => slot_eo - child_eo,
                    None => 0,
                };
                image.extend_from_slice(&value.to_le_bytes());
            }
            self.buf.prepend(&image);
            eo
        };

        self.last_offset = eo as u32;
        self.last_ref_null = false;
        Ok(eo)
    }
}

// -----------------------------------------------------------------------------
// Archive protocol

impl<W: Write> OutArchive for FlatWriter<W> {
    // Size queries report slot costs: an inline scalar costs its width,
    // anything reached by offset costs the 4-byte offset.

    fn size_integer(&self, _value: i64, atom: Atom) -> u64 {
        atom.width().map(u64::from).unwrap_or(0)
    }

    fn size_float32(&self, _value: f32) -> u64 {
        4
    }

    fn size_float64(&self, _value: f64) -> u64 {
        8
    }

    fn size_bool(&self, _value: bool) -> u64 {
        1
    }

    fn size_string(&self, _bytes: &[u8], _char_count: u64, _char_size: u8) -> u64 {
        4
    }

    fn write_integer(&mut self, value: i64, atom: Atom) -> Result<()> {
        let width = match atom.width() {
            Some(w) if w <= 8 => w as usize,
            _ => return Err(Error::UnsupportedAtom { atom }),
        };
        let sink = self.inline.as_mut().ok_or(Error::Malformed {
            what: "scalar value outside an enclosing table or sequence",
        })?;
        sink.extend_from_slice(&value.to_le_bytes()[..width]);
        Ok(())
    }

    fn write_float32(&mut self, value: f32) -> Result<()> {
        let sink = self.inline.as_mut().ok_or(Error::Malformed {
            what: "scalar value outside an enclosing table or sequence",
        })?;
        sink.extend_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn write_float64(&mut self, value: f64) -> Result<()> {
        let sink = self.inline.as_mut().ok_or(Error::Malformed {
            what: "scalar value outside an enclosing table or sequence",
        })?;
        sink.extend_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn write_bool(&mut self, value: bool) -> Result<()> {
        let sink = self.inline.as_mut().ok_or(Error::Malformed {
            what: "scalar value outside an enclosing table or sequence",
        })?;
        sink.push(value as u8);
        Ok(())
    }

    fn write_byte_array(&mut self, bytes: &[u8], write_size: bool) -> Result<()> {
        let eo = if write_size {
            let img_len = 4 + bytes.len();
            self.buf.align_for(img_len, 4);
            let eo = self.buf.len() + img_len;
            let mut image = Vec::with_capacity(img_len);
            image.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            image.extend_from_slice(bytes);
            self.buf.prepend(&image);
            eo
        } else {
            self.buf.prepend(bytes);
            self.buf.len()
        };
        self.last_offset = eo as u32;
        Ok(())
    }

    fn write_string(&mut self, bytes: &[u8], _char_count: u64, _char_size: u8) -> Result<()> {
        // Length prefix, character data, then a terminating NUL that is
        // not part of the stored length.
        let img_len = 4 + bytes.len() + 1;
        self.buf.align_for(img_len, 4);
        let eo = self.buf.len() + img_len;
        let mut image = Vec::with_capacity(img_len);
        image.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        image.extend_from_slice(bytes);
        image.push(0);
        self.buf.prepend(&image);
        self.last_offset = eo as u32;
        Ok(())
    }
}

impl<W: Write> OutArchiveRegistry for FlatWriter<W> {
    fn size_object(&self, _desc: &'static Descriptor, _obj: &dyn Any) -> Result<u64> {
        Ok(4)
    }

    fn size_array(&self, _ary: &dyn ArrayReader) -> Result<u64> {
        Ok(4)
    }

    fn size_map(&self, _map: &dyn MapReader) -> Result<u64> {
        Ok(4)
    }

    fn size_reference(
        &self,
        _desc: &'static Descriptor,
        _source: Option<RefSource<'_>>,
    ) -> Result<u64> {
        Ok(4)
    }

    fn write_object(&mut self, desc: &'static Descriptor, obj: &dyn Any) -> Result<()> {
        self.last_offset = self.write_table(desc, obj)?;
        // A null reference deeper in the table must not leak up into the
        // caller's slot bookkeeping.
        self.last_ref_null = false;
        Ok(())
    }

    fn write_array(&mut self, ary: &dyn ArrayReader) -> Result<()> {
        self.write_sequence(ary.element(), ary.len(), &|i| ary.get(i))?;
        Ok(())
    }

    fn write_map(&mut self, map: &dyn MapReader) -> Result<()> {
        // A map is a pair of parallel sequences reached through one extra
        // indirection: [keys offset][values offset].
        let keys_eo = self.write_sequence(map.key_serializer(), map.len(), &|i| map.key(i))?;
        let values_eo = self.write_sequence(map.value_serializer(), map.len(), &|i| map.value(i))?;

        self.buf.align_for(8, 4);
        let eo = self.buf.len() + 8;
        let mut image = Vec::with_capacity(8);
        image.extend_from_slice(&((eo - keys_eo) as u32).to_le_bytes());
        image.extend_from_slice(&((eo - 4 - values_eo) as u32).to_le_bytes());
        self.buf.prepend(&image);
        self.last_offset = eo as u32;
        self.last_ref_null = false;
        Ok(())
    }

    fn write_reference(
        &mut self,
        desc: &'static Descriptor,
        source: Option<RefSource<'_>>,
    ) -> Result<()> {
        let Some(src) = source else {
            self.last_ref_null = true;
            return Ok(());
        };
        if let Some(&eo) = self.offsets.get(&src.id) {
            // Already in the buffer; alias the existing copy.
            self.last_offset = eo;
            self.last_ref_null = false;
            return Ok(());
        }
        let eo = self.write_table(desc, src.obj)?;
        self.save_offset(src.id, eo, desc.type_name())?;
        self.last_offset = eo;
        self.last_ref_null = false;
        Ok(())
    }
}
